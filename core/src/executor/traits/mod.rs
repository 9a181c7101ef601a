pub mod runner;
pub mod sink;
pub mod strategy;

pub use runner::*;
pub use sink::*;
pub use strategy::*;
