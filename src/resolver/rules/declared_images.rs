//! Rule: band- and pixel-addressed reads must name a declared image

use crate::ast::{Expr, Program};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

use super::walk_stmt_exprs;

pub struct DeclaredImagesRule;

impl ResolveRule for DeclaredImagesRule {
    fn id(&self) -> &'static str {
        "declared-images"
    }

    fn description(&self) -> &'static str {
        "img[...] and img->bands are only valid on a declared image"
    }

    fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();

        let mut visit = |expr: &Expr| match expr {
            Expr::ImageRead { image, span, .. } | Expr::BandCount { image, span } => {
                if !roles.is_image(image) {
                    problems.push(CompileProblem::error(
                        *span,
                        format!("Unknown image: {}", image),
                        "declared-images",
                    ));
                }
            }
            _ => {}
        };

        for stmt in &program.body {
            walk_stmt_exprs(stmt, &mut visit);
        }
        for entry in &program.init {
            if let Some(expr) = &entry.init {
                super::walk_expr(expr, &mut visit);
            }
        }

        problems
    }
}
