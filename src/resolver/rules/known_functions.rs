//! Rule: function calls name a built-in and pass an acceptable arg count

use crate::ast::{Expr, Program};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};
use crate::runtime::builtins;

use super::{walk_expr, walk_stmt_exprs};

pub struct KnownFunctionRule;

const ID: &str = "known-functions";

impl ResolveRule for KnownFunctionRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Calls must name a known function with a valid number of arguments"
    }

    fn check(&self, program: &Program, _roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();

        let mut visit = |expr: &Expr| {
            if let Expr::Call {
                name,
                name_span,
                args,
                ..
            } = expr
            {
                match builtins::lookup(name) {
                    None => problems.push(CompileProblem::error(
                        *name_span,
                        format!("Unknown function: {}", name),
                        ID,
                    )),
                    Some(def) if !def.accepts(args.len()) => {
                        problems.push(CompileProblem::error(
                            *name_span,
                            format!(
                                "Wrong number of arguments to {}: expected {}, got {}",
                                name,
                                def.describe_arity(),
                                args.len()
                            ),
                            ID,
                        ));
                    }
                    Some(_) => {}
                }
            }
        };

        for stmt in &program.body {
            walk_stmt_exprs(stmt, &mut visit);
        }
        for entry in &program.init {
            if let Some(expr) = &entry.init {
                walk_expr(expr, &mut visit);
            }
        }

        problems
    }
}
