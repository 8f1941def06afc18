//! Code generation for PL0.
//!
//! This module turns the typed tree produced by semantic analysis into
//! code for the target stack machine. The architecture uses a
//! trait-based backend so that another target could be added without
//! touching the existing one.
//!
//! # Architecture
//!
//! ```text
//! TypedProgram + SymbolTable → CodeGenerator → Procedures
//!                                   ↑
//!                              StackBackend
//! ```
//!
//! The output is a [`Procedures`] table mapping each procedure entry to
//! its compiled body. Final code addresses are bound by the VM loader
//! (an external collaborator), not here.
//!
//! # Example
//!
//! ```ignore
//! use pl0c::codegen::{CodeGenerator, StackBackend};
//!
//! let backend = StackBackend::new();
//! let procedures = backend.generate(&typed_program, analyzer.symbols())?;
//! for (proc, code) in procedures.iter() {
//!     println!("proc#{}:\n{}", proc.0, code);
//! }
//! ```

pub mod code;
mod error;
mod stack_backend;

pub use code::{Code, Instruction, CASE_LABEL_MISSING, SIZE_JUMP_ALWAYS};
pub use error::{CodeGenError, CodeGenErrorKind};
pub use stack_backend::StackBackend;

use crate::semantic::symbols::ProcId;
use crate::semantic::typed_ir::TypedProgram;
use crate::semantic::SymbolTable;

/// The compiled output: one code body per procedure entry.
///
/// Insertion order is preserved for reproducible output. Nested
/// procedures are inserted before their parents, and the main program
/// (the procedure at static level 1) comes last.
#[derive(Debug, Default)]
pub struct Procedures {
    procedures: Vec<(ProcId, Code)>,
}

impl Procedures {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the compiled body of a procedure.
    pub fn add_procedure(&mut self, proc: ProcId, code: Code) {
        self.procedures.push((proc, code));
    }

    /// Looks up a procedure's compiled body.
    pub fn get(&self, proc: ProcId) -> Option<&Code> {
        self.procedures
            .iter()
            .find(|(p, _)| *p == proc)
            .map(|(_, code)| code)
    }

    /// Iterates the table in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ProcId, &Code)> {
        self.procedures.iter().map(|(p, code)| (*p, code))
    }

    /// The number of compiled procedures.
    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    /// True when nothing has been compiled.
    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

/// Trait for code generation backends.
///
/// A backend translates a checked program into its target form. The
/// symbol table is the one the checker completed: the backend reads
/// variable space and procedure levels from it.
pub trait CodeGenerator {
    /// Generates code for a checked program.
    ///
    /// # Errors
    ///
    /// Fails when generation reaches a node the checker should have
    /// rejected, or a checked construct the target cannot express.
    fn generate(
        &self,
        program: &TypedProgram,
        symbols: &SymbolTable,
    ) -> Result<Procedures, CodeGenError>;

    /// Returns the name of this backend for diagnostics.
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedures_preserve_insertion_order() {
        let mut procedures = Procedures::new();
        let mut first = Code::new();
        first.emit(Instruction::Return);
        procedures.add_procedure(ProcId(1), first);
        procedures.add_procedure(ProcId(0), Code::new());

        let order: Vec<ProcId> = procedures.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![ProcId(1), ProcId(0)]);
        assert_eq!(procedures.len(), 2);
        assert_eq!(
            procedures.get(ProcId(1)).unwrap().instructions(),
            &[Instruction::Return]
        );
    }

    #[test]
    fn test_stack_backend_name() {
        let backend = StackBackend::new();
        assert_eq!(backend.backend_name(), "stack");
    }
}
