pub mod repo;
pub mod transport;
pub mod wire;
