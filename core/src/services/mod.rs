pub mod log;
pub mod power;
