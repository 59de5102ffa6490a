//! Scope and role resolution for parsed scripts
//!
//! Runs after parsing to catch the errors the grammar cannot enforce:
//! invalid or missing image declarations, misuse of source/destination
//! images, `break` outside a loop, unknown functions and bad arities,
//! and unknown script options.
//!
//! # Architecture
//!
//! 1. **ResolveRule trait** - each rule checks one aspect of the script
//! 2. **Resolver** - collects and runs all rules
//! 3. **CompileProblem** - the output of resolution (errors and warnings)
//!
//! Adding a rule means creating a file in `resolver/rules/`, implementing
//! `ResolveRule`, and registering it in `Resolver::new()`.

pub mod rules;

#[cfg(test)]
mod tests;

use crate::ast::{ImageRole, OptionValue, Program, Span};
use crate::error::CompileError;
use crate::parser::named_constant;

// ============================================================================
// Compile Problem Types
// ============================================================================

/// A problem produced by semantic resolution
#[derive(Debug, Clone)]
pub struct CompileProblem {
    /// The source location of the issue
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Which rule produced this problem
    pub rule_id: &'static str,
}

/// Severity levels for compile problems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed - the script cannot compile
    Error,
    /// Probably a mistake, but compilation proceeds
    Warning,
}

impl CompileProblem {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for CompileProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity,
            self.span.start_line + 1,
            self.span.start_col + 1,
            self.message,
            self.rule_id
        )
    }
}

impl std::error::Error for CompileProblem {}

// ============================================================================
// Image Role Set
// ============================================================================

/// The merged image declarations a script runs against: in-script
/// `images {}` entries plus the caller's role map, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
    pub sources: Vec<String>,
    pub dests: Vec<String>,
}

impl RoleSet {
    pub fn is_source(&self, name: &str) -> bool {
        self.sources.iter().any(|n| n == name)
    }

    pub fn is_dest(&self, name: &str) -> bool {
        self.dests.iter().any(|n| n == name)
    }

    pub fn is_image(&self, name: &str) -> bool {
        self.is_source(name) || self.is_dest(name)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.dests.is_empty()
    }
}

// ============================================================================
// ResolveRule Trait
// ============================================================================

/// Trait that all resolution rules implement.
///
/// Rules are independent of each other and each checks one aspect of
/// the script.
pub trait ResolveRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "break-outside-loop")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    /// Run the check and return any problems found
    fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem>;
}

// ============================================================================
// Resolver - Runs All Rules
// ============================================================================

/// The main resolver that orchestrates all rules
pub struct Resolver {
    rules: Vec<Box<dyn ResolveRule>>,
}

impl Resolver {
    /// Create a resolver with all built-in rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                // Error rules
                Box::new(rules::ImageNameRule),
                Box::new(rules::DeclaredImagesRule),
                Box::new(rules::ImageUsageRule),
                Box::new(rules::BreakOutsideLoopRule),
                Box::new(rules::KnownFunctionRule),
                Box::new(rules::OptionsRule),
                Box::new(rules::UseBeforeAssignRule),
                // Warning rules
                Box::new(rules::UnusedInitVariableRule),
            ],
        }
    }

    /// Run all rules and collect problems
    pub fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem> {
        self.rules
            .iter()
            .flat_map(|rule| rule.check(program, roles))
            .collect()
    }

    /// All registered rules (useful for documentation)
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Resolved Script
// ============================================================================

/// The output of resolution: the program plus everything the runtimes
/// need to evaluate it. Owned by the compiled script and never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedScript {
    pub program: Program,
    /// Source image names in declaration order
    pub source_names: Vec<String>,
    /// Destination image names in declaration order
    pub dest_names: Vec<String>,
    /// Out-of-bounds fallback from the `outside` option; `None` means an
    /// out-of-bounds read is a runtime error
    pub outside: Option<f64>,
    /// Non-fatal problems found during resolution
    pub warnings: Vec<CompileProblem>,
}

// ============================================================================
// Public API
// ============================================================================

/// Resolve a parsed program against the caller's image role declarations.
///
/// `declared` preserves insertion order; that order (after the in-script
/// `images {}` block) fixes the layout of indirect-evaluation results.
pub fn resolve(
    program: Program,
    declared: &[(String, ImageRole)],
) -> Result<ResolvedScript, CompileError> {
    let mut problems = Vec::new();
    let roles = merge_roles(&program, declared, &mut problems);

    // A script with no images anywhere has nothing to evaluate.
    if roles.is_empty() {
        problems.push(CompileProblem::error(
            program.span,
            "Script declares no source or destination images",
            "image-roles",
        ));
    }

    problems.extend(Resolver::new().check(&program, &roles));

    if problems.iter().any(|p| p.is_error()) {
        return Err(CompileError::Semantic(problems));
    }

    let outside = outside_value(&program);
    let (warnings, _) = split_problems(problems);

    Ok(ResolvedScript {
        source_names: roles.sources,
        dest_names: roles.dests,
        outside,
        warnings,
        program,
    })
}

/// Merge in-script image declarations with the caller's role map,
/// reporting duplicates and conflicts
fn merge_roles(
    program: &Program,
    declared: &[(String, ImageRole)],
    problems: &mut Vec<CompileProblem>,
) -> RoleSet {
    let mut roles = RoleSet::default();
    let mut seen: Vec<(String, ImageRole, Span)> = Vec::new();

    let script_decls = program
        .images
        .iter()
        .map(|d| (d.name.clone(), d.role, d.span));
    let caller_decls = declared
        .iter()
        .map(|(name, role)| (name.clone(), *role, Span::default()));

    for (name, role, span) in script_decls.chain(caller_decls) {
        if let Some((_, prev_role, _)) = seen.iter().find(|(n, _, _)| *n == name) {
            if *prev_role != role {
                problems.push(CompileProblem::error(
                    span,
                    format!("Image '{}' declared with conflicting roles", name),
                    "image-roles",
                ));
            }
            // Same-role re-declaration from the caller map is harmless.
            continue;
        }
        seen.push((name.clone(), role, span));
        match role {
            ImageRole::Source => roles.sources.push(name),
            ImageRole::Dest => roles.dests.push(name),
        }
    }

    roles
}

/// Extract the `outside` option value; rules have already validated it
fn outside_value(program: &Program) -> Option<f64> {
    program
        .options
        .iter()
        .find(|o| o.name == "outside")
        .map(|o| match &o.value {
            OptionValue::Number { v } => *v,
            OptionValue::Name { name } => named_constant(name).unwrap_or(f64::NAN),
        })
}

fn split_problems(problems: Vec<CompileProblem>) -> (Vec<CompileProblem>, Vec<CompileProblem>) {
    problems.into_iter().partition(|p| !p.is_error())
}
