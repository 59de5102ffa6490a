//! Rule: break and breakif must appear inside a loop body

use crate::ast::{Program, Stmt};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

pub struct BreakOutsideLoopRule;

const ID: &str = "break-outside-loop";

impl ResolveRule for BreakOutsideLoopRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "'break' and 'breakif' are only valid inside a loop"
    }

    fn check(&self, program: &Program, _roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();
        for stmt in &program.body {
            check_stmt(stmt, false, &mut problems);
        }
        problems
    }
}

fn check_stmt(stmt: &Stmt, in_loop: bool, problems: &mut Vec<CompileProblem>) {
    match stmt {
        Stmt::Break { span } if !in_loop => {
            problems.push(CompileProblem::error(
                *span,
                "'break' outside of a loop".to_string(),
                ID,
            ));
        }
        Stmt::BreakIf { span, .. } if !in_loop => {
            problems.push(CompileProblem::error(
                *span,
                "'breakif' outside of a loop".to_string(),
                ID,
            ));
        }
        Stmt::Block { body, .. } => {
            for s in body {
                check_stmt(s, in_loop, problems);
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            check_stmt(then_s, in_loop, problems);
            if let Some(e) = else_s {
                check_stmt(e, in_loop, problems);
            }
        }
        Stmt::While { body, .. }
        | Stmt::Until { body, .. }
        | Stmt::ForeachRange { body, .. }
        | Stmt::ForeachList { body, .. } => check_stmt(body, true, problems),
        _ => {}
    }
}
