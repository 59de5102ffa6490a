//! Per-pixel evaluation core shared by both runtimes
//!
//! NoData is `f64::NAN` throughout: it propagates through arithmetic,
//! comparisons and logical operators rather than short-circuiting, so
//! `null && 0` is NaN, not false.

use std::collections::HashMap;

use rand::Rng;

use crate::ast::{AssignOp, BinaryOp, CoordRef, Expr, Program, Stmt, UnaryOp};
use crate::error::RuntimeError;
use crate::transform::round_half_up;

use super::{lock_image, DestBinding, SourceBinding, Val};

/* ===================== Control Flow ===================== */

/// Result of executing a statement
pub(crate) enum Control {
    Normal,
    Break,
}

/* ===================== Destination Writer ===================== */

/// Where destination assignments land
pub(crate) enum DestWriter<'a> {
    /// Direct style: write straight into bound rasters
    Rasters(&'a [DestBinding]),
    /// Indirect style: band 0 of each destination goes into the caller's
    /// buffer, in declaration order; other bands are discarded
    Buffer {
        names: &'a [String],
        out: &'a mut [f64],
    },
}

impl DestWriter<'_> {
    fn write(
        &mut self,
        name: &str,
        band: usize,
        px: i64,
        py: i64,
        value: f64,
    ) -> Result<(), RuntimeError> {
        match self {
            DestWriter::Rasters(bindings) => {
                let binding = bindings
                    .iter()
                    .find(|b| b.name == name)
                    .ok_or_else(|| RuntimeError::ImageNotBound(name.to_string()))?;
                let mut image = lock_image(&*binding.image);
                if !image.contains(px, py) || band >= image.num_bands() {
                    return Err(RuntimeError::OutOfBounds {
                        image: name.to_string(),
                        x: px,
                        y: py,
                        band,
                    });
                }
                image.set_sample(px, py, band, value);
                Ok(())
            }
            DestWriter::Buffer { names, out } => {
                if band != 0 {
                    return Ok(());
                }
                let idx = names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| RuntimeError::ImageNotBound(name.to_string()))?;
                out[idx] = value;
                Ok(())
            }
        }
    }
}

/* ===================== Evaluation Context ===================== */

/// Everything one pixel's evaluation needs. Built fresh per pixel by
/// the runtimes; `image_vars` is the only state that outlives it.
pub(crate) struct EvalCtx<'a> {
    pub program: &'a Program,
    pub sources: &'a HashMap<String, SourceBinding>,
    pub dest: DestWriter<'a>,
    /// Image-scope variables from the init block
    pub image_vars: &'a mut HashMap<String, Val>,
    /// Out-of-bounds read fallback; `None` makes such reads an error
    pub outside: Option<f64>,
    pub max_loop_iterations: u64,
    /// World position of the current pixel
    pub wx: f64,
    pub wy: f64,
    /// Destination pixel being written
    pub px: i64,
    pub py: i64,
    /// World extent of the processing area, when one is known
    pub world_size: Option<(f64, f64)>,
}

/// Per-pixel mutable state
struct PixelState {
    vars: HashMap<String, Val>,
    iterations: u64,
}

/// Evaluate the script body once for the current pixel
pub(crate) fn run_pixel(ctx: &mut EvalCtx<'_>) -> Result<(), RuntimeError> {
    let mut state = PixelState {
        vars: HashMap::new(),
        iterations: 0,
    };
    for stmt in &ctx.program.body {
        exec_stmt(ctx, &mut state, stmt)?;
    }
    Ok(())
}

/// Evaluate the init block, producing the image-scope variables. Runs
/// once per scan, positioned at the first pixel.
pub(crate) fn run_init(ctx: &mut EvalCtx<'_>) -> Result<(), RuntimeError> {
    let mut state = PixelState {
        vars: HashMap::new(),
        iterations: 0,
    };
    for entry in &ctx.program.init {
        let value = match &entry.init {
            Some(expr) => eval_expr(ctx, &mut state, expr)?,
            None => Val::Num(f64::NAN),
        };
        ctx.image_vars.insert(entry.name.clone(), value);
    }
    Ok(())
}

/* ===================== Statements ===================== */

fn exec_stmt(
    ctx: &mut EvalCtx<'_>,
    state: &mut PixelState,
    stmt: &Stmt,
) -> Result<Control, RuntimeError> {
    match stmt {
        Stmt::Block { body, .. } => {
            for s in body {
                if let Control::Break = exec_stmt(ctx, state, s)? {
                    return Ok(Control::Break);
                }
            }
            Ok(Control::Normal)
        }
        Stmt::Assign {
            var,
            band,
            op,
            value,
            ..
        } => {
            exec_assign(ctx, state, var, band.as_ref(), *op, value)?;
            Ok(Control::Normal)
        }
        Stmt::Append { var, value, .. } => {
            let value = eval_num(ctx, state, value, "in a list append")?;
            let slot = lookup_var_mut(ctx, state, var)
                .ok_or_else(|| RuntimeError::UndefinedVariable(var.clone()))?;
            match slot {
                Val::List(items) => {
                    items.push(value);
                    Ok(Control::Normal)
                }
                Val::Num(_) => Err(RuntimeError::NotAList(format!("'{}'", var))),
            }
        }
        Stmt::If {
            test,
            then_s,
            else_s,
            ..
        } => {
            let t = eval_num(ctx, state, test, "as a condition")?;
            if truthy(t) {
                exec_stmt(ctx, state, then_s)
            } else if let Some(e) = else_s {
                exec_stmt(ctx, state, e)
            } else {
                Ok(Control::Normal)
            }
        }
        Stmt::While { test, body, .. } => loop {
            let t = eval_num(ctx, state, test, "as a condition")?;
            if !truthy(t) {
                return Ok(Control::Normal);
            }
            count_iteration(ctx, state)?;
            if let Control::Break = exec_stmt(ctx, state, body)? {
                return Ok(Control::Normal);
            }
        },
        Stmt::Until { test, body, .. } => loop {
            let t = eval_num(ctx, state, test, "as a condition")?;
            if truthy(t) {
                return Ok(Control::Normal);
            }
            count_iteration(ctx, state)?;
            if let Control::Break = exec_stmt(ctx, state, body)? {
                return Ok(Control::Normal);
            }
        },
        Stmt::ForeachRange {
            binding,
            lo,
            hi,
            body,
            ..
        } => {
            let lo = eval_num(ctx, state, lo, "as a range bound")?;
            let hi = eval_num(ctx, state, hi, "as a range bound")?;
            if lo.is_nan() || hi.is_nan() {
                return Err(RuntimeError::BadArgument("foreach range bound".to_string()));
            }
            let mut i = lo as i64;
            let hi = hi as i64;
            while i <= hi {
                count_iteration(ctx, state)?;
                state.vars.insert(binding.clone(), Val::Num(i as f64));
                if let Control::Break = exec_stmt(ctx, state, body)? {
                    break;
                }
                i += 1;
            }
            Ok(Control::Normal)
        }
        Stmt::ForeachList {
            binding,
            list,
            body,
            ..
        } => {
            let items = match eval_expr(ctx, state, list)? {
                Val::List(items) => items,
                Val::Num(_) => {
                    return Err(RuntimeError::NotAList("the foreach set".to_string()))
                }
            };
            for item in items {
                count_iteration(ctx, state)?;
                state.vars.insert(binding.clone(), Val::Num(item));
                if let Control::Break = exec_stmt(ctx, state, body)? {
                    break;
                }
            }
            Ok(Control::Normal)
        }
        Stmt::Break { .. } => Ok(Control::Break),
        Stmt::BreakIf { test, .. } => {
            let t = eval_num(ctx, state, test, "as a condition")?;
            if truthy(t) {
                Ok(Control::Break)
            } else {
                Ok(Control::Normal)
            }
        }
        Stmt::Expr { expr, .. } => {
            eval_expr(ctx, state, expr)?;
            Ok(Control::Normal)
        }
    }
}

fn exec_assign(
    ctx: &mut EvalCtx<'_>,
    state: &mut PixelState,
    var: &str,
    band: Option<&Expr>,
    op: AssignOp,
    value: &Expr,
) -> Result<(), RuntimeError> {
    let is_dest = match &ctx.dest {
        DestWriter::Rasters(bindings) => bindings.iter().any(|b| b.name == var),
        DestWriter::Buffer { names, .. } => names.iter().any(|n| n == var),
    };

    if is_dest {
        let band = match band {
            Some(expr) => {
                let b = eval_num(ctx, state, expr, "as a band index")?;
                if b.is_nan() || b < 0.0 {
                    return Err(RuntimeError::InvalidBand {
                        image: var.to_string(),
                        band: b,
                    });
                }
                b as usize
            }
            None => 0,
        };
        let value = eval_num(ctx, state, value, "as an image sample")?;
        let (px, py) = (ctx.px, ctx.py);
        return ctx.dest.write(var, band, px, py, value);
    }

    let value = eval_expr(ctx, state, value)?;

    let new = match op {
        AssignOp::Set => value,
        compound => {
            let current = lookup_var(ctx, state, var)
                .ok_or_else(|| RuntimeError::UndefinedVariable(var.to_string()))?;
            let current = current
                .as_num()
                .ok_or_else(|| RuntimeError::ListNotAllowed("in arithmetic".to_string()))?;
            let rhs = value
                .as_num()
                .ok_or_else(|| RuntimeError::ListNotAllowed("in arithmetic".to_string()))?;
            Val::Num(match compound {
                AssignOp::Add => current + rhs,
                AssignOp::Sub => current - rhs,
                AssignOp::Mul => current * rhs,
                AssignOp::Div => current / rhs,
                AssignOp::Set => unreachable!(),
            })
        }
    };

    // Image-scope variables keep their slot; everything else is per-pixel.
    if ctx.image_vars.contains_key(var) {
        ctx.image_vars.insert(var.to_string(), new);
    } else {
        state.vars.insert(var.to_string(), new);
    }
    Ok(())
}

fn count_iteration(ctx: &EvalCtx<'_>, state: &mut PixelState) -> Result<(), RuntimeError> {
    state.iterations += 1;
    if state.iterations > ctx.max_loop_iterations {
        return Err(RuntimeError::LoopIterationLimit);
    }
    Ok(())
}

/* ===================== Expressions ===================== */

fn eval_expr(
    ctx: &mut EvalCtx<'_>,
    state: &mut PixelState,
    expr: &Expr,
) -> Result<Val, RuntimeError> {
    match expr {
        Expr::LitNum { v, .. } => Ok(Val::Num(*v)),
        Expr::LitList { elements, .. } => {
            let mut items = Vec::with_capacity(elements.len());
            for e in elements {
                items.push(eval_num(ctx, state, e, "inside a list literal")?);
            }
            Ok(Val::List(items))
        }
        Expr::Ident { name, .. } => {
            if let Some(v) = lookup_var(ctx, state, name) {
                return Ok(v.clone());
            }
            if ctx.sources.contains_key(name) {
                return read_source(ctx, name, None, None).map(Val::Num);
            }
            Err(RuntimeError::UndefinedVariable(name.clone()))
        }
        Expr::ImageRead {
            image, band, pixel, ..
        } => {
            let band = match band {
                Some(expr) => Some(eval_num(ctx, state, expr, "as a band index")?),
                None => None,
            };
            let pixel = match pixel {
                Some(spec) => {
                    let x = eval_coord(ctx, state, &spec.x)?;
                    let y = eval_coord(ctx, state, &spec.y)?;
                    Some((x, y, spec.x.absolute))
                }
                None => None,
            };
            read_source(ctx, image, band, pixel).map(Val::Num)
        }
        Expr::BandCount { image, .. } => {
            let binding = ctx
                .sources
                .get(image)
                .ok_or_else(|| RuntimeError::ImageNotBound(image.clone()))?;
            Ok(Val::Num(binding.image.num_bands() as f64))
        }
        Expr::Call { name, args, .. } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval_expr(ctx, state, a)?);
            }
            call_builtin(ctx, name, values)
        }
        Expr::Unary { op, operand, .. } => {
            let v = eval_num(ctx, state, operand, "in arithmetic")?;
            Ok(Val::Num(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => {
                    if v.is_nan() {
                        f64::NAN
                    } else if truthy(v) {
                        0.0
                    } else {
                        1.0
                    }
                }
            }))
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let l = eval_num(ctx, state, left, "in arithmetic")?;
            let r = eval_num(ctx, state, right, "in arithmetic")?;
            Ok(Val::Num(apply_binary(*op, l, r)))
        }
    }
}

/// Evaluate an expression that must be a number
fn eval_num(
    ctx: &mut EvalCtx<'_>,
    state: &mut PixelState,
    expr: &Expr,
    context: &str,
) -> Result<f64, RuntimeError> {
    eval_expr(ctx, state, expr)?
        .as_num()
        .ok_or_else(|| RuntimeError::ListNotAllowed(context.to_string()))
}

/// Evaluate one coordinate of a pixel specifier, NaN rejected
fn eval_coord(
    ctx: &mut EvalCtx<'_>,
    state: &mut PixelState,
    coord: &CoordRef,
) -> Result<f64, RuntimeError> {
    let v = eval_num(ctx, state, &coord.expr, "as a coordinate")?;
    if v.is_nan() {
        return Err(RuntimeError::BadArgument("pixel coordinate".to_string()));
    }
    Ok(v)
}

/// NoData-aware truthiness: NaN and zero are false
fn truthy(v: f64) -> bool {
    !v.is_nan() && v != 0.0
}

fn apply_binary(op: BinaryOp, l: f64, r: f64) -> f64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Mod => l % r,
        BinaryOp::Pow => l.powf(r),
        // Logical and comparison operators propagate NoData. Both sides
        // are always evaluated; there is no short-circuit.
        BinaryOp::And => logical(l, r, |a, b| a && b),
        BinaryOp::Or => logical(l, r, |a, b| a || b),
        BinaryOp::Eq => compare(l, r, |a, b| a == b),
        BinaryOp::Ne => compare(l, r, |a, b| a != b),
        BinaryOp::Lt => compare(l, r, |a, b| a < b),
        BinaryOp::Le => compare(l, r, |a, b| a <= b),
        BinaryOp::Gt => compare(l, r, |a, b| a > b),
        BinaryOp::Ge => compare(l, r, |a, b| a >= b),
    }
}

fn logical(l: f64, r: f64, f: impl Fn(bool, bool) -> bool) -> f64 {
    if l.is_nan() || r.is_nan() {
        f64::NAN
    } else if f(truthy(l), truthy(r)) {
        1.0
    } else {
        0.0
    }
}

fn compare(l: f64, r: f64, f: impl Fn(f64, f64) -> bool) -> f64 {
    if l.is_nan() || r.is_nan() {
        f64::NAN
    } else if f(l, r) {
        1.0
    } else {
        0.0
    }
}

/* ===================== Variable Lookup ===================== */

fn lookup_var<'a>(
    ctx: &'a EvalCtx<'_>,
    state: &'a PixelState,
    name: &str,
) -> Option<&'a Val> {
    state.vars.get(name).or_else(|| ctx.image_vars.get(name))
}

fn lookup_var_mut<'a>(
    ctx: &'a mut EvalCtx<'_>,
    state: &'a mut PixelState,
    name: &str,
) -> Option<&'a mut Val> {
    if state.vars.contains_key(name) {
        state.vars.get_mut(name)
    } else {
        ctx.image_vars.get_mut(name)
    }
}

/* ===================== Source Reads ===================== */

/// Read a sample from a source image.
///
/// With no pixel specifier the read is at the current position. Relative
/// coordinates are pixel offsets from there; absolute coordinates are a
/// world position mapped through the image's transform.
fn read_source(
    ctx: &EvalCtx<'_>,
    name: &str,
    band: Option<f64>,
    pixel: Option<(f64, f64, bool)>,
) -> Result<f64, RuntimeError> {
    let binding = ctx
        .sources
        .get(name)
        .ok_or_else(|| RuntimeError::ImageNotBound(name.to_string()))?;

    let band = match band {
        Some(b) => {
            if b.is_nan() || b < 0.0 || (b as usize) >= binding.image.num_bands() {
                return Err(RuntimeError::InvalidBand {
                    image: name.to_string(),
                    band: b,
                });
            }
            b as usize
        }
        None => 0,
    };

    let (px, py) = match pixel {
        None => binding.transform.world_to_pixel(ctx.wx, ctx.wy),
        Some((x, y, true)) => binding.transform.world_to_pixel(x, y),
        Some((dx, dy, false)) => {
            let (bx, by) = binding.transform.world_to_pixel(ctx.wx, ctx.wy);
            (bx + round_half_up(dx), by + round_half_up(dy))
        }
    };

    if !binding.image.contains(px, py) {
        return match ctx.outside {
            Some(v) => Ok(v),
            None => Err(RuntimeError::OutOfBounds {
                image: name.to_string(),
                x: px,
                y: py,
                band,
            }),
        };
    }

    Ok(binding.image.get_sample(px, py, band))
}

/* ===================== Built-in Functions ===================== */

fn call_builtin(
    ctx: &mut EvalCtx<'_>,
    name: &str,
    args: Vec<Val>,
) -> Result<Val, RuntimeError> {
    match name {
        "con" => con(args),
        "isnull" | "isnan" => Ok(Val::Num(bool_num(num_arg(&args, 0, name)?.is_nan()))),
        "isinf" => Ok(Val::Num(bool_num(num_arg(&args, 0, name)?.is_infinite()))),
        "rand" => {
            let x = num_arg(&args, 0, name)?;
            if x.is_nan() {
                return Ok(Val::Num(f64::NAN));
            }
            Ok(Val::Num(rand::thread_rng().gen::<f64>() * x))
        }
        "randInt" => {
            let x = num_arg(&args, 0, name)?;
            if x.is_nan() {
                return Ok(Val::Num(f64::NAN));
            }
            Ok(Val::Num((rand::thread_rng().gen::<f64>() * x).floor()))
        }
        "abs" => map_num(&args, name, f64::abs),
        "sqrt" => map_num(&args, name, f64::sqrt),
        "exp" => map_num(&args, name, f64::exp),
        "log" => {
            let x = num_arg(&args, 0, name)?;
            if args.len() == 2 {
                let base = num_arg(&args, 1, name)?;
                Ok(Val::Num(x.log(base)))
            } else {
                Ok(Val::Num(x.ln()))
            }
        }
        "floor" => map_num(&args, name, f64::floor),
        "ceil" => map_num(&args, name, f64::ceil),
        "round" => map_num(&args, name, f64::round),
        "sin" => map_num(&args, name, f64::sin),
        "cos" => map_num(&args, name, f64::cos),
        "tan" => map_num(&args, name, f64::tan),
        "asin" => map_num(&args, name, f64::asin),
        "acos" => map_num(&args, name, f64::acos),
        "atan" => map_num(&args, name, f64::atan),
        "degToRad" => map_num(&args, name, f64::to_radians),
        "radToDeg" => map_num(&args, name, f64::to_degrees),
        "min" => extremum(args, name, |a, b| a.min(b)),
        "max" => extremum(args, name, |a, b| a.max(b)),
        "sum" => {
            let items = list_arg(&args, 0, name)?;
            Ok(Val::Num(items.iter().sum()))
        }
        "mean" => {
            let items = list_arg(&args, 0, name)?;
            if items.is_empty() {
                return Ok(Val::Num(f64::NAN));
            }
            Ok(Val::Num(items.iter().sum::<f64>() / items.len() as f64))
        }
        "concat" => {
            let mut out = Vec::new();
            for arg in &args {
                match arg {
                    Val::Num(v) => out.push(*v),
                    Val::List(items) => out.extend_from_slice(items),
                }
            }
            Ok(Val::List(out))
        }
        "x" => Ok(Val::Num(ctx.wx)),
        "y" => Ok(Val::Num(ctx.wy)),
        "width" => Ok(Val::Num(ctx.world_size.map(|(w, _)| w).unwrap_or(f64::NAN))),
        "height" => Ok(Val::Num(ctx.world_size.map(|(_, h)| h).unwrap_or(f64::NAN))),
        other => Err(RuntimeError::BadArgument(format!(
            "unknown function '{}'",
            other
        ))),
    }
}

/// Conditional selection. With a NoData condition every form yields NoData.
///
/// - `con(c)`: 1 if c > 0, else 0
/// - `con(c, a)`: a if c > 0, else 0
/// - `con(c, a, b)`: a if c > 0, else b
/// - `con(c, a, b, d)`: a if c > 0, b if c == 0, d if c < 0
fn con(args: Vec<Val>) -> Result<Val, RuntimeError> {
    let c = num_arg(&args, 0, "con")?;
    if c.is_nan() {
        return Ok(Val::Num(f64::NAN));
    }
    let pick = |i: usize| num_arg(&args, i, "con");
    let v = match args.len() {
        1 => bool_num(c > 0.0),
        2 => {
            if c > 0.0 {
                pick(1)?
            } else {
                0.0
            }
        }
        3 => {
            if c > 0.0 {
                pick(1)?
            } else {
                pick(2)?
            }
        }
        _ => {
            if c > 0.0 {
                pick(1)?
            } else if c == 0.0 {
                pick(2)?
            } else {
                pick(3)?
            }
        }
    };
    Ok(Val::Num(v))
}

/// min/max: two scalars, or a single list reduced element-wise
fn extremum(
    args: Vec<Val>,
    name: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Val, RuntimeError> {
    if args.len() == 2 {
        let a = num_arg(&args, 0, name)?;
        let b = num_arg(&args, 1, name)?;
        if a.is_nan() || b.is_nan() {
            return Ok(Val::Num(f64::NAN));
        }
        return Ok(Val::Num(f(a, b)));
    }
    let items = list_arg(&args, 0, name)?;
    if items.is_empty() || items.iter().any(|v| v.is_nan()) {
        return Ok(Val::Num(f64::NAN));
    }
    let mut acc = items[0];
    for &v in &items[1..] {
        acc = f(acc, v);
    }
    Ok(Val::Num(acc))
}

fn map_num(args: &[Val], name: &str, f: impl Fn(f64) -> f64) -> Result<Val, RuntimeError> {
    Ok(Val::Num(f(num_arg(args, 0, name)?)))
}

fn num_arg(args: &[Val], index: usize, name: &str) -> Result<f64, RuntimeError> {
    args.get(index)
        .and_then(Val::as_num)
        .ok_or_else(|| RuntimeError::BadArgument(name.to_string()))
}

fn list_arg<'a>(args: &'a [Val], index: usize, name: &str) -> Result<&'a [f64], RuntimeError> {
    match args.get(index) {
        Some(Val::List(items)) => Ok(items),
        _ => Err(RuntimeError::NotAList(format!("argument of {}", name))),
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
