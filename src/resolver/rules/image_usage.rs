//! Rule: images are used according to their declared role
//!
//! Source images are read-only, destination images are write-only, and
//! neither may stand in for an ordinary variable.

use crate::ast::{AssignOp, Expr, Program, Stmt};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

use super::{walk_stmt, walk_stmt_exprs};

pub struct ImageUsageRule;

const ID: &str = "image-usage";

impl ResolveRule for ImageUsageRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Source images cannot be written, destination images cannot be read"
    }

    fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();

        for entry in &program.init {
            if roles.is_image(&entry.name) {
                problems.push(CompileProblem::error(
                    entry.span,
                    format!("Image '{}' cannot be declared in init", entry.name),
                    ID,
                ));
            }
        }

        for stmt in &program.body {
            walk_stmt(stmt, &mut |s| check_stmt(s, roles, &mut problems));
            walk_stmt_exprs(stmt, &mut |e| check_expr(e, roles, &mut problems));
        }

        problems
    }
}

fn check_stmt(stmt: &Stmt, roles: &RoleSet, problems: &mut Vec<CompileProblem>) {
    match stmt {
        Stmt::Assign {
            var,
            var_span,
            band,
            op,
            ..
        } => {
            if roles.is_source(var) {
                problems.push(CompileProblem::error(
                    *var_span,
                    format!("Cannot write to source image '{}'", var),
                    ID,
                ));
            }
            if band.is_some() && !roles.is_dest(var) {
                problems.push(CompileProblem::error(
                    *var_span,
                    "Band index assignment is only valid on a destination image".to_string(),
                    ID,
                ));
            }
            // Compound assignment reads the current value first.
            if roles.is_dest(var) && *op != AssignOp::Set {
                problems.push(CompileProblem::error(
                    *var_span,
                    format!("Cannot read from destination image '{}'", var),
                    ID,
                ));
            }
        }
        Stmt::Append { var, var_span, .. } => {
            if roles.is_image(var) {
                problems.push(CompileProblem::error(
                    *var_span,
                    format!("Cannot append to image '{}'", var),
                    ID,
                ));
            }
        }
        Stmt::ForeachRange {
            binding,
            binding_span,
            ..
        }
        | Stmt::ForeachList {
            binding,
            binding_span,
            ..
        } => {
            if roles.is_image(binding) {
                problems.push(CompileProblem::error(
                    *binding_span,
                    format!("Image '{}' cannot be used as a loop variable", binding),
                    ID,
                ));
            }
        }
        _ => {}
    }
}

fn check_expr(expr: &Expr, roles: &RoleSet, problems: &mut Vec<CompileProblem>) {
    match expr {
        Expr::Ident { name, span } if roles.is_dest(name) => {
            problems.push(CompileProblem::error(
                *span,
                format!("Cannot read from destination image '{}'", name),
                ID,
            ));
        }
        Expr::ImageRead { image, span, .. } | Expr::BandCount { image, span }
            if roles.is_dest(image) =>
        {
            problems.push(CompileProblem::error(
                *span,
                format!("Cannot read from destination image '{}'", image),
                ID,
            ));
        }
        _ => {}
    }
}
