//! Debug output and execution statistics.

pub mod debug;
pub mod recorder;

pub use debug::{Debugger, MapperDebugger};
pub use recorder::{ExecutionRecorder, ExecutionStats};
