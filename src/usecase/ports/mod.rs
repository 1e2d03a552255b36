pub mod table_api;
