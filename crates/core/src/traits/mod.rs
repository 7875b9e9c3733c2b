pub mod coordination;
pub mod execution;
pub mod log_sink;

pub use coordination::*;
pub use execution::*;
pub use log_sink::*;
