//! Compilation front door: script text in, runtimes out

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::ImageRole;
use crate::error::CompileError;
use crate::parser::parse_program;
use crate::resolver::{resolve, CompileProblem, ResolvedScript};
use crate::runtime::{DirectRuntime, IndirectRuntime};

/// Builder for compiling a script with caller-declared image roles.
///
/// Roles can come from here, from an in-script `images {}` block, or
/// both; declaration order fixes the output order of indirect
/// evaluation.
pub struct Script {
    text: String,
    roles: Vec<(String, ImageRole)>,
}

impl Script {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            roles: Vec::new(),
        }
    }

    /// Declare a source (read-only) image variable
    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.roles.push((name.into(), ImageRole::Source));
        self
    }

    /// Declare a destination (write-only) image variable
    pub fn dest(mut self, name: impl Into<String>) -> Self {
        self.roles.push((name.into(), ImageRole::Dest));
        self
    }

    /// Parse and resolve the script
    pub fn compile(self) -> Result<CompiledScript, CompileError> {
        compile(&self.text, &self.roles)
    }
}

/// Parse and resolve a script against explicit image role declarations
pub fn compile(
    text: &str,
    roles: &[(String, ImageRole)],
) -> Result<CompiledScript, CompileError> {
    let program = parse_program(text)?;
    let resolved = resolve(program, roles)?;

    debug!(
        sources = resolved.source_names.len(),
        dests = resolved.dest_names.len(),
        "script compiled"
    );
    for problem in &resolved.warnings {
        warn!(%problem, "compile warning");
    }

    Ok(CompiledScript {
        resolved: Arc::new(resolved),
    })
}

/// A compiled script, cheap to clone and to mint runtimes from
#[derive(Clone)]
pub struct CompiledScript {
    resolved: Arc<ResolvedScript>,
}

impl CompiledScript {
    /// Non-fatal problems found at compile time
    pub fn warnings(&self) -> &[CompileProblem] {
        &self.resolved.warnings
    }

    pub fn source_names(&self) -> &[String] {
        &self.resolved.source_names
    }

    pub fn dest_names(&self) -> &[String] {
        &self.resolved.dest_names
    }

    /// Create a runtime that scans destination rasters
    pub fn direct_runtime(&self) -> DirectRuntime {
        DirectRuntime::new(Arc::clone(&self.resolved))
    }

    /// Create a runtime that evaluates single positions on demand
    pub fn indirect_runtime(&self) -> IndirectRuntime {
        IndirectRuntime::new(Arc::clone(&self.resolved))
    }
}
