pub mod ast;
pub mod error;
pub mod executor;
pub mod image;
pub mod parser;
pub mod resolver;
pub mod runtime;
pub mod script;
pub mod transform;

// Re-export main types
pub use error::{CompileError, ExecutorError, RuntimeError};
pub use image::{shared_dest, shared_source, GridImage, SharedDestImage, SharedSourceImage};
pub use runtime::{DirectRuntime, IndirectRuntime, ProgressListener, ScanResult, Val};
pub use script::{compile, CompiledScript, Script};
pub use transform::{Bounds, CoordinateTransform};

// Re-export executor API for convenience
pub use executor::{JobEvent, JobEventListener, JobId, JobOutcome, JobState, ScriptExecutor};
