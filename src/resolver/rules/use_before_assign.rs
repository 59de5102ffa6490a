//! Rule: variables must be assigned before they are read
//!
//! The language has a single flat scope per pixel, so an assignment
//! anywhere earlier in the source (including inside a branch that may
//! not execute) counts as defining the variable. That keeps the rule
//! free of false positives on the common guard-then-use pattern.

use std::collections::HashSet;

use crate::ast::{AssignOp, Expr, Program, Stmt};
use crate::resolver::{CompileProblem, ResolveRule, RoleSet};

pub struct UseBeforeAssignRule;

const ID: &str = "use-before-assign";

impl ResolveRule for UseBeforeAssignRule {
    fn id(&self) -> &'static str {
        ID
    }

    fn description(&self) -> &'static str {
        "Variables must be assigned a value before being read"
    }

    fn check(&self, program: &Program, roles: &RoleSet) -> Vec<CompileProblem> {
        let mut problems = Vec::new();
        let mut defined: HashSet<String> = HashSet::new();

        // Image names resolve to image reads, never to plain variables.
        defined.extend(roles.sources.iter().cloned());
        defined.extend(roles.dests.iter().cloned());

        // Init entries may reference earlier init entries.
        for entry in &program.init {
            if let Some(expr) = &entry.init {
                check_expr(expr, &defined, &mut problems);
            }
            defined.insert(entry.name.clone());
        }

        for stmt in &program.body {
            check_stmt(stmt, &mut defined, &mut problems);
        }

        problems
    }
}

fn check_stmt(stmt: &Stmt, defined: &mut HashSet<String>, problems: &mut Vec<CompileProblem>) {
    match stmt {
        Stmt::Block { body, .. } => {
            for s in body {
                check_stmt(s, defined, problems);
            }
        }
        Stmt::Assign {
            var,
            var_span,
            band,
            op,
            value,
            ..
        } => {
            if let Some(b) = band {
                check_expr(b, defined, problems);
            }
            check_expr(value, defined, problems);
            if *op != AssignOp::Set && !defined.contains(var) {
                problems.push(CompileProblem::error(
                    *var_span,
                    format!("Variable '{}' used before being assigned a value", var),
                    ID,
                ));
            }
            defined.insert(var.clone());
        }
        Stmt::Append {
            var,
            var_span,
            value,
            ..
        } => {
            check_expr(value, defined, problems);
            if !defined.contains(var) {
                problems.push(CompileProblem::error(
                    *var_span,
                    format!("Variable '{}' used before being assigned a value", var),
                    ID,
                ));
            }
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            check_expr(test, defined, problems);
            check_stmt(then_s, defined, problems);
            if let Some(e) = else_s {
                check_stmt(e, defined, problems);
            }
        }
        Stmt::While { test, body, .. } | Stmt::Until { test, body, .. } => {
            check_expr(test, defined, problems);
            check_stmt(body, defined, problems);
        }
        Stmt::ForeachRange {
            binding,
            lo,
            hi,
            body,
            ..
        } => {
            check_expr(lo, defined, problems);
            check_expr(hi, defined, problems);
            defined.insert(binding.clone());
            check_stmt(body, defined, problems);
        }
        Stmt::ForeachList {
            binding, list, body, ..
        } => {
            check_expr(list, defined, problems);
            defined.insert(binding.clone());
            check_stmt(body, defined, problems);
        }
        Stmt::BreakIf { test, .. } => check_expr(test, defined, problems),
        Stmt::Expr { expr, .. } => check_expr(expr, defined, problems),
        Stmt::Break { .. } => {}
    }
}

fn check_expr(expr: &Expr, defined: &HashSet<String>, problems: &mut Vec<CompileProblem>) {
    super::walk_expr(expr, &mut |e| {
        if let Expr::Ident { name, span } = e {
            if !defined.contains(name) {
                problems.push(CompileProblem::error(
                    *span,
                    format!("Variable '{}' used before being assigned a value", name),
                    ID,
                ));
            }
        }
    });
}
