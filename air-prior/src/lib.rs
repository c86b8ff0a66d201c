pub mod candle_safe_ops;
pub mod cli;
pub mod num_steps;

pub use candle_core;
pub use candle_nn;
