//! Individual resolution rules
//!
//! Each rule lives in its own file and checks one aspect of the script.

mod break_outside_loop;
mod declared_images;
mod image_names;
mod image_usage;
mod known_functions;
mod options;
mod unused_init_variable;
mod use_before_assign;

pub use break_outside_loop::BreakOutsideLoopRule;
pub use declared_images::DeclaredImagesRule;
pub use image_names::ImageNameRule;
pub use image_usage::ImageUsageRule;
pub use known_functions::KnownFunctionRule;
pub use options::OptionsRule;
pub use unused_init_variable::UnusedInitVariableRule;
pub use use_before_assign::UseBeforeAssignRule;

use crate::ast::{Expr, Stmt};

/* ===================== Shared AST Walkers ===================== */

/// Visit a statement and all statements nested inside it
pub(crate) fn walk_stmt<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Stmt)) {
    f(stmt);
    match stmt {
        Stmt::Block { body, .. } => {
            for s in body {
                walk_stmt(s, f);
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            walk_stmt(then_s, f);
            if let Some(e) = else_s {
                walk_stmt(e, f);
            }
        }
        Stmt::While { body, .. }
        | Stmt::Until { body, .. }
        | Stmt::ForeachRange { body, .. }
        | Stmt::ForeachList { body, .. } => walk_stmt(body, f),
        Stmt::Assign { .. }
        | Stmt::Append { .. }
        | Stmt::Break { .. }
        | Stmt::BreakIf { .. }
        | Stmt::Expr { .. } => {}
    }
}

/// Visit every expression contained in a statement, recursively
pub(crate) fn walk_stmt_exprs<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Expr)) {
    walk_stmt(stmt, &mut |s| match s {
        Stmt::Assign { band, value, .. } => {
            if let Some(b) = band {
                walk_expr(b, f);
            }
            walk_expr(value, f);
        }
        Stmt::Append { value, .. } => walk_expr(value, f),
        Stmt::If { test, .. } | Stmt::While { test, .. } | Stmt::Until { test, .. } => {
            walk_expr(test, f)
        }
        Stmt::ForeachRange { lo, hi, .. } => {
            walk_expr(lo, f);
            walk_expr(hi, f);
        }
        Stmt::ForeachList { list, .. } => walk_expr(list, f),
        Stmt::BreakIf { test, .. } => walk_expr(test, f),
        Stmt::Expr { expr, .. } => walk_expr(expr, f),
        Stmt::Block { .. } | Stmt::Break { .. } => {}
    });
}

/// Visit an expression and all of its sub-expressions
pub(crate) fn walk_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match expr {
        Expr::LitNum { .. } | Expr::Ident { .. } | Expr::BandCount { .. } => {}
        Expr::LitList { elements, .. } => {
            for e in elements {
                walk_expr(e, f);
            }
        }
        Expr::ImageRead { band, pixel, .. } => {
            if let Some(b) = band {
                walk_expr(b, f);
            }
            if let Some(p) = pixel {
                walk_expr(&p.x.expr, f);
                walk_expr(&p.y.expr, f);
            }
        }
        Expr::Call { args, .. } => {
            for a in args {
                walk_expr(a, f);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, f),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
    }
}
