//! Rule (warning): init-block variables that the body never touches

use std::collections::HashSet;

use crate::ast::{Expr, Program, Stmt};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

use super::{walk_stmt, walk_stmt_exprs};

pub struct UnusedInitVariableRule;

const ID: &str = "unused-init-variable";

impl ResolveRule for UnusedInitVariableRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Warns when an init-block variable is never used in the body"
    }

    fn check(&self, program: &Program, _roles: &RoleSet) -> Vec<CompileProblem> {
        let mut used: HashSet<&str> = HashSet::new();

        for stmt in &program.body {
            walk_stmt_exprs(stmt, &mut |e| {
                if let Expr::Ident { name, .. } = e {
                    used.insert(name.as_str());
                }
            });
            walk_stmt(stmt, &mut |s| match s {
                Stmt::Assign { var, .. } | Stmt::Append { var, .. } => {
                    used.insert(var.as_str());
                }
                _ => {}
            });
        }

        program
            .init
            .iter()
            .filter(|entry| !used.contains(entry.name.as_str()))
            .map(|entry| {
                CompileProblem::warning(
                    entry.span,
                    format!("Variable '{}' is declared in init but never used", entry.name),
                    ID,
                )
            })
            .collect()
    }
}
