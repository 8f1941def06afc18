//! Semantic analysis for PL0.
//!
//! This module performs the static-checking phase of compilation, which
//! occurs after parsing and before code generation. It handles:
//!
//! - **Symbol resolution**: Linking identifier uses to their symbol
//!   table entries
//! - **Type checking**: Ensuring operations have compatible types
//! - **Tree rewriting**: Making the implicit conversions of the type
//!   system explicit as dereference, widen and narrow nodes
//! - **Validation**: Enforcing language rules beyond syntax
//!
//! # Architecture
//!
//! The parser (an external collaborator) produces the raw AST and a
//! symbol table with an entry for every declaration; entry types may
//! still mention named aliases. The checker walks the tree once,
//! resolving each procedure's scope before checking its body, and
//! produces a [`TypedProgram`] ready for code generation.
//!
//! # Usage
//!
//! ```ignore
//! use pl0c::semantic::SemanticAnalyzer;
//!
//! let mut analyzer = SemanticAnalyzer::new(symbols);
//! let typed_program = analyzer.analyze(&program)?;
//! // typed_program is ready for codegen
//! ```

pub mod checker;
pub mod error;
pub mod symbols;
pub mod typed_ir;
pub mod types;

pub use checker::StaticChecker;
pub use error::SemanticError;
pub use symbols::{ProcId, ScopeId, Symbol, SymbolKind, SymbolTable};
pub use typed_ir::TypedProgram;
pub use types::Type;

use crate::ast::Program;

/// Main entry point for semantic analysis.
///
/// The analyzer owns the parser-populated symbol table for the duration
/// of compilation; the code generator reads it afterwards through
/// [`SemanticAnalyzer::symbols`].
pub struct SemanticAnalyzer {
    /// The symbol table for this compilation unit.
    symbols: SymbolTable,
    /// Accumulated errors.
    errors: Vec<SemanticError>,
}

impl SemanticAnalyzer {
    /// Creates an analyzer around a parser-populated symbol table.
    pub fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            errors: Vec::new(),
        }
    }

    /// Checks a program and produces its typed tree.
    ///
    /// Returns `Err` with every diagnostic, in source order, when any
    /// were reported; the driver must not generate code in that case.
    pub fn analyze(&mut self, program: &Program) -> Result<TypedProgram, Vec<SemanticError>> {
        let mut checker = StaticChecker::new(&mut self.symbols);
        let typed = checker.check_program(program);
        self.errors.append(&mut checker.errors);

        if self.errors.is_empty() {
            Ok(typed)
        } else {
            let mut errors = std::mem::take(&mut self.errors);
            errors.sort_by_key(|e| e.span().start);
            Err(errors)
        }
    }

    /// Read access to the symbol table, for the code generator.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Releases the symbol table.
    pub fn into_symbols(self) -> SymbolTable {
        self.symbols
    }
}
