//! Code generation error types.
//!
//! Checking is supposed to stop anything invalid from reaching the code
//! generator, so most of these indicate a broken invariant between the
//! two passes. Unlike checker diagnostics they are fatal: generation
//! stops at the first one.

use crate::ast::Span;
use std::fmt;

/// An error that occurred during code generation.
#[derive(Debug, Clone)]
pub struct CodeGenError {
    /// The kind of error.
    pub kind: CodeGenErrorKind,
    /// Source location where the error occurred.
    pub span: Option<Span>,
    /// Additional context about the error.
    pub context: Option<String>,
}

impl CodeGenError {
    /// Creates a new code generation error.
    pub fn new(kind: CodeGenErrorKind) -> Self {
        Self {
            kind,
            span: None,
            context: None,
        }
    }

    /// Adds a source span to the error.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Adds context information to the error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Creates an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::new(CodeGenErrorKind::UnsupportedFeature(feature.into()))
    }

    /// Creates an internal error: a checker/generator invariant broke.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CodeGenErrorKind::Internal(message.into()))
    }
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "[{}..{}] ", span.start, span.end)?;
        }
        write!(f, "cannot generate code: {}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ", {}", ctx)?;
        }
        Ok(())
    }
}

impl std::error::Error for CodeGenError {}

/// The specific kind of code generation error.
#[derive(Debug, Clone)]
pub enum CodeGenErrorKind {
    /// A checked construct the stack machine has no instructions for.
    UnsupportedFeature(String),

    /// Generation reached a node the checker should have rejected, or
    /// an invariant between the passes broke.
    Internal(String),
}

impl fmt::Display for CodeGenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenErrorKind::UnsupportedFeature(feature) => {
                write!(f, "the stack machine cannot express {}", feature)
            }
            CodeGenErrorKind::Internal(msg) => {
                write!(f, "internal inconsistency, {}", msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_names_the_feature() {
        let err = CodeGenError::unsupported("pointer allocation");
        let text = err.to_string();
        assert!(text.contains("cannot express"), "{text}");
        assert!(text.contains("pointer allocation"), "{text}");
    }

    #[test]
    fn test_span_leads_the_message() {
        let err = CodeGenError::internal("error node").with_span(Span::new(3, 9));
        assert!(err.to_string().starts_with("[3..9]"));
    }

    #[test]
    fn test_context_trails_the_message() {
        let err = CodeGenError::internal("missing branch offset")
            .with_context("while lowering a case statement");
        let text = err.to_string();
        assert!(text.ends_with("while lowering a case statement"), "{text}");
        assert!(text.contains("internal inconsistency"), "{text}");
    }
}
