pub mod bridge;
pub mod grading;
pub mod interpreter;

pub use bridge::*;
pub use grading::*;
pub use interpreter::*;
