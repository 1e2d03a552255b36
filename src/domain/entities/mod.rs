pub mod action;
pub mod table;
