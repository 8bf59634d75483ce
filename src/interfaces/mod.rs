pub mod processing;
pub mod transport;
