//! AST produced by [`super::parser::parse`].

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    /// Bare identifier resolved against the evaluation context.
    Name(String),
    /// `value.attr` — attribute access on a dict-like or struct-like value.
    Attribute(Box<Expr>, String),
    /// `value[index]`
    Subscript(Box<Expr>, Box<Expr>),
    /// Chained comparison: `a < b <= c` requires both `a < b` and `b <= c`.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    BoolOp(BoolOp, Vec<Expr>),
    Not(Box<Expr>),
    /// A bare function call, e.g. `contains_pii(parameters)`.
    Call { func: String, args: Vec<Expr> },
    /// A method call on a value, e.g. `path.startswith("/etc")`.
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    /// `body if test else orelse`
    Ternary {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}
