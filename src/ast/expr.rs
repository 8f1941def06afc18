//! Expression AST nodes.
//!
//! Expressions are constructs that evaluate to a value: literals,
//! identifier references, operator applications, `read`, and the record
//! and pointer forms (`r.f`, `p^`, `new T`, `T{ e1, ..., en }`).
//!
//! Identifier references are deliberately unresolved here. At parse time
//! one cannot tell whether an identifier names a constant or a variable;
//! the static checker looks each one up and rewrites it into the
//! appropriate typed node.

use super::Span;

/// An expression with its source location.
#[derive(Debug, Clone)]
pub struct Expr {
    /// The kind of expression.
    pub kind: ExprKind,
    /// Source location of this expression.
    pub span: Span,
}

impl Expr {
    /// Creates a new expression with the given kind and span.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The different kinds of expressions in PL0.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal: `42`
    IntLiteral(i32),

    /// Constant or variable reference: `x`, `limit`
    Identifier(String),

    /// Binary operation: `left op right`
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: `op operand`
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// `read` - reads an integer from standard input.
    Read,

    /// Field access on a record lvalue: `r.f`
    FieldAccess { object: Box<Expr>, field: String },

    /// Pointer dereference: `p^`
    PointerDeref(Box<Expr>),

    /// Heap allocation: `new T` where `T` names a pointer type.
    New { type_name: String },

    /// Record construction: `T{ e1, ..., en }` with one expression per
    /// field, matched by position.
    RecordConstructor { type_name: String, fields: Vec<Expr> },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` - Addition
    Add,
    /// `-` - Subtraction
    Subtract,
    /// `*` - Multiplication
    Multiply,
    /// `/` - Division
    Divide,
    /// `=` - Equality (overloaded over integers and booleans)
    Equal,
    /// `!=` - Inequality (overloaded over integers and booleans)
    NotEqual,
    /// `<` - Less than
    Less,
    /// `<=` - Less than or equal
    LessEq,
    /// `>` - Greater than
    Greater,
    /// `>=` - Greater than or equal
    GreaterEq,
}

impl BinaryOp {
    /// Returns a string representation of the operator for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-` - Numeric negation
    Negate,
}

impl UnaryOp {
    /// Returns a string representation of the operator for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_as_str() {
        assert_eq!(BinaryOp::Add.as_str(), "+");
        assert_eq!(BinaryOp::NotEqual.as_str(), "!=");
        assert_eq!(BinaryOp::GreaterEq.as_str(), ">=");
    }

    #[test]
    fn test_create_int_literal() {
        let expr = Expr::new(ExprKind::IntLiteral(42), Span::new(0, 2));
        assert!(matches!(expr.kind, ExprKind::IntLiteral(42)));
    }

    #[test]
    fn test_create_binary_expr() {
        let left = Box::new(Expr::new(ExprKind::IntLiteral(1), Span::new(0, 1)));
        let right = Box::new(Expr::new(ExprKind::IntLiteral(2), Span::new(4, 5)));
        let expr = Expr::new(
            ExprKind::Binary {
                left,
                op: BinaryOp::Add,
                right,
            },
            Span::new(0, 5),
        );
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }
}
