//! Abstract Syntax Tree node types for band algebra scripts

use serde::{Deserialize, Serialize};

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line: if self.start <= other.start {
                self.start_line
            } else {
                other.start_line
            },
            start_col: if self.start <= other.start {
                self.start_col
            } else {
                other.start_col
            },
            end_line: if self.end >= other.end {
                self.end_line
            } else {
                other.end_line
            },
            end_col: if self.end >= other.end {
                self.end_col
            } else {
                other.end_col
            },
        }
    }
}

/// Helper function for serde to skip serializing default spans
fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/// A complete parsed script: special blocks followed by the per-pixel body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Entries of the `options { ... }` block, in source order
    pub options: Vec<OptionDecl>,
    /// Entries of the `images { ... }` block, in source order
    pub images: Vec<ImageDecl>,
    /// Entries of the `init { ... }` block, in source order
    pub init: Vec<VarInit>,
    /// Per-pixel statements
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// One `name = value;` entry of an options block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDecl {
    pub name: String,
    pub value: OptionValue,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// The right-hand side of an option entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum OptionValue {
    Number { v: f64 },
    /// `null`, `NaN` or a named constant
    Name { name: String },
}

/// Role assigned to an image variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRole {
    /// Read-only input raster (`read`)
    Source,
    /// Output raster (`write`)
    Dest,
}

/// One `name = read|write;` entry of an images block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDecl {
    pub name: String,
    pub role: ImageRole,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// One image-scope variable declaration of an init block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarInit {
    pub name: String,
    /// Missing initializer means the variable starts as NaN
    pub init: Option<Expr>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Block {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Assign {
        var: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        var_span: Span,
        /// Band index expression for `dest[i] = v` writes
        band: Option<Expr>,
        op: AssignOp,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// List append: `lst << expr;`
    Append {
        var: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        var_span: Span,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    If {
        test: Expr,
        then_s: Box<Stmt>,
        else_s: Option<Box<Stmt>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Loop that runs while the condition is NOT truthy
    Until {
        test: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `foreach (id in lo:hi) s` over an inclusive ascending integer range
    ForeachRange {
        binding: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        binding_span: Span,
        lo: Expr,
        hi: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `foreach (id in listExpr) s` over the elements of a list value
    ForeachList {
        binding: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        binding_span: Span,
        list: Expr,
        body: Box<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Break {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    BreakIf {
        test: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. } => *span,
            Stmt::Assign { span, .. } => *span,
            Stmt::Append { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::Until { span, .. } => *span,
            Stmt::ForeachRange { span, .. } => *span,
            Stmt::ForeachList { span, .. } => *span,
            Stmt::Break { span } => *span,
            Stmt::BreakIf { span, .. } => *span,
            Stmt::Expr { span, .. } => *span,
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// One coordinate of a pixel specifier; `$`-prefixed coordinates are
/// absolute world positions, unprefixed ones are offsets from the
/// current pixel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordRef {
    pub expr: Box<Expr>,
    pub absolute: bool,
}

/// A two-coordinate pixel specifier: `[dx, dy]` or `[$wx, $wy]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelSpec {
    pub x: CoordRef,
    pub y: CoordRef,
}

/// serde mapping for the NaN-capable numeric literal. JSON has no NaN,
/// so NoData crosses the wire as `null`; every other value is a plain
/// number.
mod nodata_literal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if v.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitNum {
        #[serde(with = "nodata_literal")]
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// Band/pixel-addressed image read: `img[b]`, `img[dx,dy]`,
    /// `img[b][dx,dy]`, `img[$wx,$wy]`. A bare image name parses as
    /// `Ident` and is resolved to a band-0 read at evaluation time.
    ImageRead {
        image: String,
        band: Option<Box<Expr>>,
        pixel: Option<PixelSpec>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `img->bands`
    BandCount {
        image: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Call {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        name_span: Span,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitNum { span, .. } => *span,
            Expr::LitList { span, .. } => *span,
            Expr::Ident { span, .. } => *span,
            Expr::ImageRead { span, .. } => *span,
            Expr::BandCount { span, .. } => *span,
            Expr::Call { span, .. } => *span,
            Expr::Unary { span, .. } => *span,
            Expr::Binary { span, .. } => *span,
        }
    }
}
