//! Semantic analysis error types.
//!
//! These errors represent problems found during symbol resolution and
//! type checking. Each carries source location information for accurate
//! diagnostics. The checker never aborts on one of these: it records the
//! error, types the offending node `error`, and continues, so a single
//! run reports every problem in the program.

use crate::ast::Span;
use thiserror::Error;

/// A semantic analysis error with location and description.
#[derive(Debug, Error, Clone)]
pub enum SemanticError {
    // === Resolution Errors ===
    /// Reference to a name that isn't declared in any enclosing scope.
    #[error("undefined identifier `{name}`")]
    UndefinedIdentifier { name: String, span: Span },

    /// A `call` naming something that isn't declared.
    #[error("undefined procedure `{name}`")]
    UndefinedProcedure { name: String, span: Span },

    /// Reference to a type name that isn't declared.
    #[error("undefined type `{name}`")]
    UndefinedType { name: String, span: Span },

    /// A chain of type aliases that refers back to itself outside a
    /// pointer.
    #[error("type `{name}` is defined in terms of itself")]
    CircularType { name: String, span: Span },

    /// A name declared more than once in the same scope.
    #[error("`{name}` already defined in this scope")]
    DuplicateDefinition {
        name: String,
        original_span: Span,
        duplicate_span: Span,
    },

    /// An identifier used in an expression that names neither a constant
    /// nor a variable.
    #[error("constant or variable identifier required")]
    ConstantOrVariableRequired { name: String, span: Span },

    /// A `call` naming something that isn't a procedure.
    #[error("procedure identifier required")]
    ProcedureRequired { name: String, span: Span },

    // === Type Errors ===
    /// No implicit coercion chain reaches the required type.
    #[error("cannot coerce {found} to {expected}")]
    IncompatibleTypes {
        expected: String,
        found: String,
        span: Span,
    },

    /// The left side of an assignment is not an lvalue.
    #[error("variable expected, type = {found}")]
    VariableExpected { found: String, span: Span },

    /// No member of an overloaded operator's type accepts the argument.
    #[error("type of argument {found} does not match {expected}")]
    OperatorTypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    /// An operator with no signature in any enclosing scope. Cannot
    /// happen with the predefined environment in place.
    #[error("no signature in scope for operator `{op}`")]
    UndefinedOperator { op: String, span: Span },

    /// Field access on something that isn't a record.
    #[error("{found} is not a record type")]
    NotARecord { found: String, span: Span },

    /// Field access naming a field the record doesn't have.
    #[error("record type {record} does not have field {field}")]
    NoSuchField {
        record: String,
        field: String,
        span: Span,
    },

    /// Pointer dereference of something that isn't a pointer.
    #[error("type must be a pointer")]
    NotAPointer { found: String, span: Span },

    /// `new` with a type identifier that isn't a pointer type.
    #[error("`{name}` is not a pointer type")]
    NotAPointerType { name: String, span: Span },

    /// Record construction with a type identifier that isn't a record
    /// type.
    #[error("cannot construct a record from `{name}`, which is not a record type")]
    NotARecordType { name: String, span: Span },

    // === Structural Errors ===
    /// Record construction with the wrong number of field expressions.
    #[error("record type {record} has {expected} fields, but {found} were given")]
    RecordArityMismatch {
        record: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    /// A case label that doesn't resolve to an integer constant.
    #[error("case label must be an integer constant")]
    CaseLabelNotConstant { span: Span },

    /// Two case branches with the same label value.
    #[error("duplicate case label {label}")]
    DuplicateCaseLabel { label: i32, span: Span },
}

impl SemanticError {
    /// Returns the primary span of this error.
    pub fn span(&self) -> Span {
        match self {
            SemanticError::UndefinedIdentifier { span, .. } => *span,
            SemanticError::UndefinedProcedure { span, .. } => *span,
            SemanticError::UndefinedType { span, .. } => *span,
            SemanticError::CircularType { span, .. } => *span,
            SemanticError::DuplicateDefinition { duplicate_span, .. } => *duplicate_span,
            SemanticError::ConstantOrVariableRequired { span, .. } => *span,
            SemanticError::ProcedureRequired { span, .. } => *span,
            SemanticError::IncompatibleTypes { span, .. } => *span,
            SemanticError::VariableExpected { span, .. } => *span,
            SemanticError::OperatorTypeMismatch { span, .. } => *span,
            SemanticError::UndefinedOperator { span, .. } => *span,
            SemanticError::NotARecord { span, .. } => *span,
            SemanticError::NoSuchField { span, .. } => *span,
            SemanticError::NotAPointer { span, .. } => *span,
            SemanticError::NotAPointerType { span, .. } => *span,
            SemanticError::NotARecordType { span, .. } => *span,
            SemanticError::RecordArityMismatch { span, .. } => *span,
            SemanticError::CaseLabelNotConstant { span } => *span,
            SemanticError::DuplicateCaseLabel { span, .. } => *span,
        }
    }

    /// Creates an undefined identifier error.
    pub fn undefined_identifier(name: impl Into<String>, span: Span) -> Self {
        SemanticError::UndefinedIdentifier {
            name: name.into(),
            span,
        }
    }

    /// Creates an incompatible types error.
    pub fn incompatible_types(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        SemanticError::IncompatibleTypes {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }
}
