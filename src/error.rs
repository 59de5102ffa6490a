//! Error types shared across the compiler and runtimes

use thiserror::Error;

use crate::parser::ParseError;
use crate::resolver::CompileProblem;
use crate::transform::TransformError;

/// Compile-time failure: the script never produces a runtime.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{}", summarize(.0))]
    Semantic(Vec<CompileProblem>),
}

impl CompileError {
    /// All semantic problems, empty for parse errors
    pub fn problems(&self) -> &[CompileProblem] {
        match self {
            CompileError::Parse(_) => &[],
            CompileError::Semantic(problems) => problems,
        }
    }
}

fn summarize(problems: &[CompileProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runtime failure: aborts the current scan or evaluation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Exceeded maximum allowed loop iterations per pixel")]
    LoopIterationLimit,

    #[error("Read outside bounds of image '{image}' at ({x}, {y}) band {band}")]
    OutOfBounds {
        image: String,
        x: i64,
        y: i64,
        band: usize,
    },

    #[error("Image '{0}' has not been bound")]
    ImageNotBound(String),

    #[error("World extent must be set before binding a coordinate transform")]
    WorldNotSet,

    #[error("Invalid world bounds: width and height must be positive")]
    InvalidWorldBounds,

    #[error("Band index {band} is invalid for image '{image}'")]
    InvalidBand { image: String, band: f64 },

    #[error("Destination rasters must share the same bounds")]
    DestinationBoundsMismatch,

    #[error("No destination image bound")]
    NoDestination,

    #[error("Results buffer too small: need {needed}, got {got}")]
    ResultsTooSmall { needed: usize, got: usize },

    #[error("Variable '{0}' has no value")]
    UndefinedVariable(String),

    #[error("A list value cannot be used {0}")]
    ListNotAllowed(String),

    #[error("Expected a list value for {0}")]
    NotAList(String),

    #[error("Wrong argument type for {0}")]
    BadArgument(String),

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Errors raised by the asynchronous executor's submission surface
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor is shut down and not accepting jobs")]
    ShutDown,

    #[error("Failed to start executor runtime: {0}")]
    Init(#[source] std::io::Error),
}
