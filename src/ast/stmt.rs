//! Statement AST nodes.
//!
//! Statements perform actions but don't produce values. PL0 statements
//! are assignments (possibly multi-target), `write`, procedure calls,
//! `if`, `while`, `case`, compound statement lists, and the empty
//! statement. The parser may also produce an error statement as a
//! recovery placeholder; the checker passes it through and the code
//! generator refuses it.

use super::{Expr, Span};
use crate::semantic::symbols::ProcId;

/// A statement with its source location.
#[derive(Debug, Clone)]
pub struct Statement {
    /// The kind of statement.
    pub kind: StatementKind,
    /// Source location of this statement.
    pub span: Span,
}

impl Statement {
    /// Creates a new statement with the given kind and span.
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The different kinds of statements in PL0.
#[derive(Debug, Clone)]
pub enum StatementKind {
    /// `v1, ..., vn := e1, ..., en`
    ///
    /// Multi-assignment. All right-hand sides are evaluated left to right
    /// before any store happens; see the code generator for the store
    /// order that makes `a, b := e1, e2` assign `e1` to `a`.
    Assignment(Vec<SingleAssign>),

    /// `write expr` - writes an integer to standard output.
    Write(Expr),

    /// `call name` - PL0 procedures take no parameters.
    Call { name: String },

    /// `if condition then ... [else ...]`
    If {
        /// The condition to test.
        condition: Expr,
        /// Statement to execute if the condition is true.
        then_branch: Box<Statement>,
        /// Statement to execute if the condition is false.
        else_branch: Option<Box<Statement>>,
    },

    /// `while condition do ...`
    While {
        /// Loop condition.
        condition: Expr,
        /// Loop body.
        body: Box<Statement>,
    },

    /// `case expr of label: ... | label: ... [default: ...] end`
    Case {
        /// The expression dispatched on.
        scrutinee: Expr,
        /// The labelled branches, in source order.
        branches: Vec<CaseBranch>,
        /// The `default` branch, if declared.
        default: Option<Vec<Statement>>,
    },

    /// `begin s1; ...; sn end`
    Compound(Vec<Statement>),

    /// The empty statement.
    Skip,

    /// Placeholder produced by parser error recovery.
    Error,
}

/// One `target := value` pair of a (multi-)assignment.
#[derive(Debug, Clone)]
pub struct SingleAssign {
    /// The left side, which must check to an lvalue.
    pub target: Expr,
    /// The right side expression.
    pub value: Expr,
}

impl SingleAssign {
    /// Creates a new assignment pair.
    pub fn new(target: Expr, value: Expr) -> Self {
        Self { target, value }
    }
}

/// One labelled branch of a `case` statement.
#[derive(Debug, Clone)]
pub struct CaseBranch {
    /// The branch label; must check to an integer constant.
    pub label: Expr,
    /// The branch body.
    pub body: Vec<Statement>,
    /// Source location of the branch.
    pub span: Span,
}

impl CaseBranch {
    /// Creates a new case branch.
    pub fn new(label: Expr, body: Vec<Statement>, span: Span) -> Self {
        Self { label, body, span }
    }
}

/// A block: the nested procedure declarations and the body of a
/// procedure (or of the main program).
///
/// Constant, type, and variable declarations do not appear here; the
/// parser records those directly in the symbol table.
#[derive(Debug, Clone)]
pub struct Block {
    /// Nested procedure declarations, in source order.
    pub procedures: Vec<ProcedureDecl>,
    /// The body statements.
    pub body: Vec<Statement>,
}

impl Block {
    /// Creates a new block.
    pub fn new(procedures: Vec<ProcedureDecl>, body: Vec<Statement>) -> Self {
        Self { procedures, body }
    }
}

/// A nested procedure declaration.
///
/// The parser has already created the procedure's symbol entry and local
/// scope; the declaration carries the entry id so the checker can
/// re-enter the right scope.
#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    /// The declared name, kept for diagnostics.
    pub name: String,
    /// The procedure entry created at parse time.
    pub proc: ProcId,
    /// The procedure's block.
    pub block: Block,
    /// Source location of the declaration.
    pub span: Span,
}

impl ProcedureDecl {
    /// Creates a new procedure declaration.
    pub fn new(name: impl Into<String>, proc: ProcId, block: Block, span: Span) -> Self {
        Self {
            name: name.into(),
            proc,
            block,
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;

    #[test]
    fn test_create_statement() {
        let stmt = Statement::new(StatementKind::Skip, Span::new(0, 4));
        assert!(matches!(stmt.kind, StatementKind::Skip));
        assert_eq!(stmt.span, Span::new(0, 4));
    }

    #[test]
    fn test_single_assign() {
        let target = Expr::new(ExprKind::Identifier("x".to_string()), Span::new(0, 1));
        let value = Expr::new(ExprKind::IntLiteral(3), Span::new(5, 6));
        let assign = SingleAssign::new(target, value);
        assert!(matches!(assign.target.kind, ExprKind::Identifier(_)));
        assert!(matches!(assign.value.kind, ExprKind::IntLiteral(3)));
    }

    #[test]
    fn test_empty_block() {
        let block = Block::new(vec![], vec![]);
        assert!(block.procedures.is_empty());
        assert!(block.body.is_empty());
    }
}
