//! Pest-based parser for the bandscript raster-algebra language
//!
//! Produces the AST consumed by the resolver and both runtimes, with span
//! information for error reporting.

use pest::Parser;
use pest_derive::Parser;

use crate::ast::{
    AssignOp, BinaryOp, CoordRef, Expr, ImageDecl, ImageRole, OptionDecl, OptionValue, PixelSpec,
    Program, Span, Stmt, UnaryOp, VarInit,
};


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/bandscript.pest"]
struct BandScriptParser;

/* ===================== Named Constants ===================== */

/// Constants recognized wherever an expression is expected. `null` and
/// `NaN` both resolve to the NoData sentinel.
const NAMED_CONSTANTS: &[(&str, f64)] = &[
    ("M_PI", std::f64::consts::PI),
    ("M_PI_2", std::f64::consts::FRAC_PI_2),
    ("M_PI_4", std::f64::consts::FRAC_PI_4),
    ("M_SQRT2", std::f64::consts::SQRT_2),
    ("M_E", std::f64::consts::E),
    ("NaN", f64::NAN),
    ("null", f64::NAN),
    ("NULL", f64::NAN),
];

/// Look up a named constant by identifier
pub fn named_constant(name: &str) -> Option<f64> {
    NAMED_CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/* ===================== Error Types ===================== */

#[derive(Debug)]
pub enum ParseError {
    PestError(String, Option<Span>),
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::PestError(msg, _) => write!(f, "{}", msg),
            ParseError::BuildError(msg, _) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &pest::iterators::Pair<Rule>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/* ===================== Public API ===================== */

/// Parse a bandscript source string into a program
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut pairs = BandScriptParser::parse(Rule::program, source)?;

    let program = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("Empty parse result".to_string(), None))?;
    let program_span = pair_to_span(&program, source);

    let mut options = Vec::new();
    let mut images = Vec::new();
    let mut init = Vec::new();
    let mut body = Vec::new();
    let mut seen_options = false;
    let mut seen_images = false;
    let mut seen_init = false;

    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::options_block => {
                if seen_options {
                    return Err(ParseError::BuildError(
                        "Duplicate options block".to_string(),
                        Some(pair_to_span(&pair, source)),
                    ));
                }
                seen_options = true;
                for entry in pair.into_inner() {
                    options.push(build_option_entry(entry, source)?);
                }
            }
            Rule::images_block => {
                if seen_images {
                    return Err(ParseError::BuildError(
                        "Duplicate images block".to_string(),
                        Some(pair_to_span(&pair, source)),
                    ));
                }
                seen_images = true;
                for entry in pair.into_inner() {
                    images.push(build_image_entry(entry, source)?);
                }
            }
            Rule::init_block => {
                if seen_init {
                    return Err(ParseError::BuildError(
                        "Duplicate init block".to_string(),
                        Some(pair_to_span(&pair, source)),
                    ));
                }
                seen_init = true;
                for entry in pair.into_inner() {
                    init.push(build_var_init(entry, source)?);
                }
            }
            Rule::statement => {
                body.push(build_statement(pair, source)?);
            }
            Rule::EOI => {}
            _ => {
                return Err(ParseError::BuildError(
                    format!("Unexpected program content: {:?}", pair.as_rule()),
                    Some(pair_to_span(&pair, source)),
                ))
            }
        }
    }

    Ok(Program {
        options,
        images,
        init,
        body,
        span: program_span,
    })
}

/* ===================== Special Block Builders ===================== */

fn build_option_entry(
    pair: pest::iterators::Pair<Rule>,
    source: &str,
) -> ParseResult<OptionDecl> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let name_pair = next_pair(&mut inner, span)?;
    let name = name_pair.as_str().to_string();

    let value_pair = next_pair(&mut inner, span)?;
    let value_text = value_pair.as_str().trim();
    let looks_numeric = value_text
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '-')
        .unwrap_or(false);
    let value = if looks_numeric {
        let compact: String = value_text.chars().filter(|c| !c.is_whitespace()).collect();
        let v = compact.parse::<f64>().map_err(|e| {
            ParseError::BuildError(
                format!("Failed to parse option value '{}': {}", value_text, e),
                Some(span),
            )
        })?;
        OptionValue::Number { v }
    } else {
        OptionValue::Name {
            name: value_text.to_string(),
        }
    };

    Ok(OptionDecl { name, value, span })
}

fn build_image_entry(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<ImageDecl> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let name_pair = next_pair(&mut inner, span)?;
    let name = name_pair.as_str().to_string();

    let role_pair = next_pair(&mut inner, span)?;
    let role = match role_pair.as_str() {
        "read" => ImageRole::Source,
        "write" => ImageRole::Dest,
        other => {
            return Err(ParseError::BuildError(
                format!("Expected 'read' or 'write', got: {}", other),
                Some(pair_to_span(&role_pair, source)),
            ))
        }
    };

    Ok(ImageDecl { name, role, span })
}

fn build_var_init(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<VarInit> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let name_pair = next_pair(&mut inner, span)?;
    let name = name_pair.as_str().to_string();

    let init = if let Some(expr_pair) = inner.next() {
        Some(build_expression(expr_pair, source)?)
    } else {
        None
    };

    Ok(VarInit { name, init, span })
}

/* ===================== Statement Builders ===================== */

fn build_statement(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Stmt> {
    let span = pair_to_span(&pair, source);

    match pair.as_rule() {
        Rule::statement => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::BuildError("Empty statement".to_string(), Some(span)))?;
            build_statement(inner, source)
        }
        Rule::block => {
            let body: Result<Vec<Stmt>, ParseError> = pair
                .into_inner()
                .map(|stmt_pair| build_statement(stmt_pair, source))
                .collect();
            Ok(Stmt::Block { body: body?, span })
        }
        Rule::if_stmt => build_if_stmt(pair, source),
        Rule::while_stmt => {
            let mut inner = pair.into_inner();
            let test = build_expression(next_pair(&mut inner, span)?, source)?;
            let body = build_statement(next_pair(&mut inner, span)?, source)?;
            Ok(Stmt::While {
                test,
                body: Box::new(body),
                span,
            })
        }
        Rule::until_stmt => {
            let mut inner = pair.into_inner();
            let test = build_expression(next_pair(&mut inner, span)?, source)?;
            let body = build_statement(next_pair(&mut inner, span)?, source)?;
            Ok(Stmt::Until {
                test,
                body: Box::new(body),
                span,
            })
        }
        Rule::foreach_stmt => build_foreach_stmt(pair, source),
        Rule::breakif_stmt => {
            let mut inner = pair.into_inner();
            let test = build_expression(next_pair(&mut inner, span)?, source)?;
            Ok(Stmt::BreakIf { test, span })
        }
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::append_stmt => {
            let mut inner = pair.into_inner();
            let var_pair = next_pair(&mut inner, span)?;
            let var_span = pair_to_span(&var_pair, source);
            let var = var_pair.as_str().to_string();
            let value = build_expression(next_pair(&mut inner, span)?, source)?;
            Ok(Stmt::Append {
                var,
                var_span,
                value,
                span,
            })
        }
        Rule::assign_stmt => build_assign_stmt(pair, source),
        Rule::expr_stmt => {
            let expr_pair = pair.into_inner().next().ok_or_else(|| {
                ParseError::BuildError("Empty expression statement".to_string(), Some(span))
            })?;
            let expr = build_expression(expr_pair, source)?;
            Ok(Stmt::Expr { expr, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected statement rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_if_stmt(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Stmt> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let test = build_expression(next_pair(&mut inner, span)?, source)?;
    let then_s = build_statement(next_pair(&mut inner, span)?, source)?;

    let else_s = if let Some(else_clause_pair) = inner.next() {
        let else_inner = else_clause_pair
            .into_inner()
            .next()
            .ok_or_else(|| ParseError::BuildError("Empty else clause".to_string(), Some(span)))?;
        Some(Box::new(build_statement(else_inner, source)?))
    } else {
        None
    };

    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
        span,
    })
}

fn build_foreach_stmt(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Stmt> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let binding_pair = next_pair(&mut inner, span)?;
    let binding_span = pair_to_span(&binding_pair, source);
    let binding = binding_pair.as_str().to_string();

    let set_pair = next_pair(&mut inner, span)?;
    let set_inner = set_pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::BuildError("Empty loop set".to_string(), Some(span)))?;

    let body_pair = next_pair(&mut inner, span)?;
    let body = Box::new(build_statement(body_pair, source)?);

    match set_inner.as_rule() {
        Rule::range_set => {
            let mut range_inner = set_inner.into_inner();
            let lo = build_expression(next_pair(&mut range_inner, span)?, source)?;
            let hi = build_expression(next_pair(&mut range_inner, span)?, source)?;
            Ok(Stmt::ForeachRange {
                binding,
                binding_span,
                lo,
                hi,
                body,
                span,
            })
        }
        Rule::expression => {
            let list = build_expression(set_inner, source)?;
            Ok(Stmt::ForeachList {
                binding,
                binding_span,
                list,
                body,
                span,
            })
        }
        other => Err(ParseError::BuildError(
            format!("Unexpected loop set rule: {:?}", other),
            Some(span),
        )),
    }
}

fn build_assign_stmt(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Stmt> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let var_pair = next_pair(&mut inner, span)?;
    let var_span = pair_to_span(&var_pair, source);
    let var = var_pair.as_str().to_string();

    let mut band = None;
    let mut op_pair = next_pair(&mut inner, span)?;
    if op_pair.as_rule() == Rule::band_index {
        let band_expr_pair = op_pair
            .into_inner()
            .next()
            .ok_or_else(|| ParseError::BuildError("Empty band index".to_string(), Some(span)))?;
        band = Some(build_expression(band_expr_pair, source)?);
        op_pair = next_pair(&mut inner, span)?;
    }

    let op = match op_pair.as_str().trim() {
        "=" => AssignOp::Set,
        "+=" => AssignOp::Add,
        "-=" => AssignOp::Sub,
        "*=" => AssignOp::Mul,
        "/=" => AssignOp::Div,
        other => {
            return Err(ParseError::BuildError(
                format!("Unexpected assignment operator: {}", other),
                Some(pair_to_span(&op_pair, source)),
            ))
        }
    };

    let value = build_expression(next_pair(&mut inner, span)?, source)?;

    Ok(Stmt::Assign {
        var,
        var_span,
        band,
        op,
        value,
        span,
    })
}

/* ===================== Expression Builders ===================== */

fn build_expression(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);

    match pair.as_rule() {
        Rule::expression => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ParseError::BuildError("Empty expression".to_string(), Some(span)))?;
            build_expression(inner, source)
        }
        Rule::or_expr
        | Rule::and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary_expr(pair, source),
        Rule::power_expr => build_power_expr(pair, source),
        Rule::unary_expr => {
            let inner = pair.into_inner().next().ok_or_else(|| {
                ParseError::BuildError("Empty unary expression".to_string(), Some(span))
            })?;
            build_expression(inner, source)
        }
        Rule::unary_prefix => {
            let mut inner = pair.into_inner();
            let op_pair = next_pair(&mut inner, span)?;
            let op = match op_pair.as_rule() {
                Rule::op_not => UnaryOp::Not,
                Rule::op_neg => UnaryOp::Neg,
                other => {
                    return Err(ParseError::BuildError(
                        format!("Unexpected unary operator: {:?}", other),
                        Some(span),
                    ))
                }
            };
            let operand = build_expression(next_pair(&mut inner, span)?, source)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            })
        }
        Rule::postfix_expr => build_postfix_expr(pair, source),
        Rule::primary => {
            let inner = pair.into_inner().next().ok_or_else(|| {
                ParseError::BuildError("Empty primary expression".to_string(), Some(span))
            })?;
            build_expression(inner, source)
        }
        Rule::number => {
            let num_str = pair.as_str();
            let v = num_str.parse::<f64>().map_err(|e| {
                ParseError::BuildError(
                    format!("Failed to parse number '{}': {}", num_str, e),
                    Some(span),
                )
            })?;
            Ok(Expr::LitNum { v, span })
        }
        Rule::identifier => {
            let name = pair.as_str();
            if let Some(v) = named_constant(name) {
                Ok(Expr::LitNum { v, span })
            } else {
                Ok(Expr::Ident {
                    name: name.to_string(),
                    span,
                })
            }
        }
        Rule::band_count => {
            let mut inner = pair.into_inner();
            let image_pair = next_pair(&mut inner, span)?;
            Ok(Expr::BandCount {
                image: image_pair.as_str().to_string(),
                span,
            })
        }
        Rule::call_expr => {
            let mut inner = pair.into_inner();
            let name_pair = next_pair(&mut inner, span)?;
            let name_span = pair_to_span(&name_pair, source);
            let name = name_pair.as_str().to_string();
            let args = if let Some(arg_list_pair) = inner.next() {
                build_arg_list(arg_list_pair, source)?
            } else {
                vec![]
            };
            Ok(Expr::Call {
                name,
                name_span,
                args,
                span,
            })
        }
        Rule::list_lit => {
            let elements = if let Some(arg_list_pair) = pair.into_inner().next() {
                build_arg_list(arg_list_pair, source)?
            } else {
                vec![]
            };
            Ok(Expr::LitList { elements, span })
        }
        Rule::paren_expr => {
            let inner = pair.into_inner().next().ok_or_else(|| {
                ParseError::BuildError("Empty parenthesised expression".to_string(), Some(span))
            })?;
            build_expression(inner, source)
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected expression rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_binary_expr(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let inner_pairs: Vec<_> = pair.into_inner().collect();

    if inner_pairs.is_empty() {
        return Err(ParseError::BuildError(
            "Empty binary expression".to_string(),
            Some(span),
        ));
    }

    let mut left = build_expression(inner_pairs[0].clone(), source)?;

    let mut i = 1;
    while i < inner_pairs.len() {
        let op = match inner_pairs[i].as_rule() {
            Rule::op_or => BinaryOp::Or,
            Rule::op_and => BinaryOp::And,
            Rule::op_eq => BinaryOp::Eq,
            Rule::op_ne => BinaryOp::Ne,
            Rule::op_le => BinaryOp::Le,
            Rule::op_lt => BinaryOp::Lt,
            Rule::op_ge => BinaryOp::Ge,
            Rule::op_gt => BinaryOp::Gt,
            Rule::op_add => BinaryOp::Add,
            Rule::op_sub => BinaryOp::Sub,
            Rule::op_mul => BinaryOp::Mul,
            Rule::op_div => BinaryOp::Div,
            Rule::op_mod => BinaryOp::Mod,
            other => {
                return Err(ParseError::BuildError(
                    format!("Expected operator rule at index {}, got {:?}", i, other),
                    Some(span),
                ))
            }
        };

        i += 1;
        if i >= inner_pairs.len() {
            return Err(ParseError::BuildError(
                "Missing right operand after operator".to_string(),
                Some(span),
            ));
        }

        let right = build_expression(inner_pairs[i].clone(), source)?;
        let new_span = left.span().merge(&right.span());

        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: new_span,
        };

        i += 1;
    }

    Ok(left)
}

/// Power is right-associative: `2^3^2` parses as `2^(3^2)`
fn build_power_expr(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let operands: Result<Vec<Expr>, ParseError> = pair
        .into_inner()
        .filter(|p| p.as_rule() != Rule::op_pow)
        .map(|p| build_expression(p, source))
        .collect();
    let mut operands = operands?;

    let mut result = operands.pop().ok_or_else(|| {
        ParseError::BuildError("Empty power expression".to_string(), Some(span))
    })?;
    while let Some(base) = operands.pop() {
        let new_span = base.span().merge(&result.span());
        result = Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(result),
            span: new_span,
        };
    }

    Ok(result)
}

fn build_postfix_expr(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();

    let primary_pair = next_pair(&mut inner, span)?;
    let primary = build_expression(primary_pair, source)?;

    let groups: Vec<_> = inner.collect();
    if groups.is_empty() {
        return Ok(primary);
    }

    // Brackets are only meaningful on an image variable.
    let image = match &primary {
        Expr::Ident { name, .. } => name.clone(),
        _ => {
            return Err(ParseError::BuildError(
                "Band or pixel addressing is only valid on an image variable".to_string(),
                Some(span),
            ))
        }
    };

    let mut band: Option<Box<Expr>> = None;
    let mut pixel: Option<PixelSpec> = None;

    for group_pair in groups {
        let group_span = pair_to_span(&group_pair, source);
        let coords: Result<Vec<CoordRef>, ParseError> = group_pair
            .into_inner()
            .map(|coord_pair| build_coord(coord_pair, source))
            .collect();
        let mut coords = coords?;

        match coords.len() {
            1 => {
                let coord = coords.remove(0);
                if coord.absolute {
                    return Err(ParseError::BuildError(
                        "'$' cannot be used in a band index".to_string(),
                        Some(group_span),
                    ));
                }
                if band.is_some() {
                    return Err(ParseError::BuildError(
                        "Duplicate band index".to_string(),
                        Some(group_span),
                    ));
                }
                if pixel.is_some() {
                    return Err(ParseError::BuildError(
                        "Band index must precede the pixel specifier".to_string(),
                        Some(group_span),
                    ));
                }
                band = Some(coord.expr);
            }
            2 => {
                if pixel.is_some() {
                    return Err(ParseError::BuildError(
                        "Duplicate pixel specifier".to_string(),
                        Some(group_span),
                    ));
                }
                let y = coords.remove(1);
                let x = coords.remove(0);
                if x.absolute != y.absolute {
                    return Err(ParseError::BuildError(
                        "Cannot mix relative and absolute coordinates in a pixel specifier"
                            .to_string(),
                        Some(group_span),
                    ));
                }
                pixel = Some(PixelSpec { x, y });
            }
            n => {
                return Err(ParseError::BuildError(
                    format!("Expected 1 or 2 coordinates in brackets, got {}", n),
                    Some(group_span),
                ))
            }
        }
    }

    Ok(Expr::ImageRead {
        image,
        band,
        pixel,
        span,
    })
}

fn build_coord(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<CoordRef> {
    let span = pair_to_span(&pair, source);
    let mut absolute = false;
    let mut expr = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::abs_marker => absolute = true,
            Rule::expression => expr = Some(build_expression(inner, source)?),
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected coordinate rule: {:?}", other),
                    Some(span),
                ))
            }
        }
    }

    let expr = expr.ok_or_else(|| {
        ParseError::BuildError("Missing coordinate expression".to_string(), Some(span))
    })?;

    Ok(CoordRef {
        expr: Box::new(expr),
        absolute,
    })
}

fn build_arg_list(pair: pest::iterators::Pair<Rule>, source: &str) -> ParseResult<Vec<Expr>> {
    pair.into_inner()
        .map(|expr_pair| build_expression(expr_pair, source))
        .collect()
}

/// Pull the next inner pair or fail with a build error
fn next_pair<'a>(
    inner: &mut pest::iterators::Pairs<'a, Rule>,
    span: Span,
) -> ParseResult<pest::iterators::Pair<'a, Rule>> {
    inner.next().ok_or_else(|| {
        ParseError::BuildError("Unexpected end of parse pairs".to_string(), Some(span))
    })
}
