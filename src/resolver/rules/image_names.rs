//! Rule: declared image names must be usable as script variables

use crate::ast::Program;
use crate::parser::named_constant;
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};
use crate::runtime::builtins;

pub struct ImageNameRule;

impl ResolveRule for ImageNameRule {
    fn id(&self) -> &'static str {
        "image-names"
    }

    fn description(&self) -> &'static str {
        "Image names must be valid identifiers and must not shadow constants or functions"
    }

    fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();

        for name in &roles.sources {
            if !valid_image_name(name) {
                problems.push(CompileProblem::error(
                    decl_span(program, name),
                    format!("Invalid source image name: {}", name),
                    self.id(),
                ));
            }
        }
        for name in &roles.dests {
            if !valid_image_name(name) {
                problems.push(CompileProblem::error(
                    decl_span(program, name),
                    format!("Invalid destination image name: {}", name),
                    self.id(),
                ));
            }
        }

        problems
    }
}

/// Caller-supplied names never carry a span; in-script declarations do
fn decl_span(program: &Program, name: &str) -> crate::ast::Span {
    program
        .images
        .iter()
        .find(|d| d.name == name)
        .map(|d| d.span)
        .unwrap_or_default()
}

fn valid_image_name(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    head_ok && tail_ok && named_constant(name).is_none() && builtins::lookup(name).is_none()
}
