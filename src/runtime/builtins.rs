//! Built-in function table
//!
//! The resolver checks call names and arities against this table at
//! compile time; dispatch happens in the evaluation core.

/// Arity and name of one built-in function
#[derive(Debug, Clone, Copy)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
}

impl BuiltinDef {
    /// Whether a call with `count` arguments is acceptable
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && count <= self.max_args
    }

    /// Human-readable arity for error messages
    pub fn describe_arity(&self) -> String {
        if self.min_args == self.max_args {
            format!("{}", self.min_args)
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        }
    }
}

const fn def(name: &'static str, min_args: usize, max_args: usize) -> BuiltinDef {
    BuiltinDef {
        name,
        min_args,
        max_args,
    }
}

/// Every function a script may call
pub const BUILTINS: &[BuiltinDef] = &[
    // conditional selection
    def("con", 1, 4),
    // NoData tests
    def("isnull", 1, 1),
    def("isnan", 1, 1),
    def("isinf", 1, 1),
    // pseudo-random
    def("rand", 1, 1),
    def("randInt", 1, 1),
    // scalar math
    def("abs", 1, 1),
    def("sqrt", 1, 1),
    def("exp", 1, 1),
    def("log", 1, 2),
    def("floor", 1, 1),
    def("ceil", 1, 1),
    def("round", 1, 1),
    def("sin", 1, 1),
    def("cos", 1, 1),
    def("tan", 1, 1),
    def("asin", 1, 1),
    def("acos", 1, 1),
    def("atan", 1, 1),
    def("degToRad", 1, 1),
    def("radToDeg", 1, 1),
    // list reductions; min/max also take two scalars
    def("min", 1, 2),
    def("max", 1, 2),
    def("sum", 1, 1),
    def("mean", 1, 1),
    def("concat", 2, 2),
    // current pixel position and destination raster size
    def("x", 0, 0),
    def("y", 0, 0),
    def("width", 0, 0),
    def("height", 0, 0),
];

/// Look up a built-in by name
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|b| b.name == name)
}
