//! Stack-machine code generation backend.
//!
//! The backend traverses the checked tree once and emits a [`Code`]
//! buffer per procedure, collected into the [`Procedures`] table. The
//! traversal tracks the current static level; a procedure's nested
//! procedures are generated one level deeper, and their code is added to
//! the table before the parent's, with the main program last.
//!
//! # Module Structure
//!
//! - this module - the backend driver (program, procedure, block)
//! - `stmt` - statement emission, including the case dispatch table
//! - `expr` - expression emission
//!
//! Anything the checker flagged must not reach this backend: error
//! nodes are reported as internal errors and abort generation.

mod expr;
mod stmt;

use crate::codegen::code::{Code, Instruction};
use crate::codegen::error::CodeGenError;
use crate::codegen::{CodeGenerator, Procedures};
use crate::semantic::typed_ir::{TypedProcedure, TypedProgram};
use crate::semantic::SymbolTable;

/// The stack-machine backend.
#[derive(Debug, Default)]
pub struct StackBackend;

impl StackBackend {
    /// Creates a new backend.
    pub fn new() -> Self {
        Self
    }
}

impl CodeGenerator for StackBackend {
    fn generate(
        &self,
        program: &TypedProgram,
        symbols: &SymbolTable,
    ) -> Result<Procedures, CodeGenError> {
        let mut emitter = Emitter {
            symbols,
            procedures: Procedures::new(),
            static_level: 1,
            node_stack: Vec::new(),
        };
        emitter.begin_gen("Program");
        // The main program is the procedure at static level 1.
        emitter.gen_procedure(&program.main)?;
        emitter.end_gen("Program");
        Ok(emitter.procedures)
    }

    fn backend_name(&self) -> &str {
        "stack"
    }
}

/// Traversal state shared by the statement and expression emitters.
pub(super) struct Emitter<'a> {
    /// The checker-completed symbol table.
    pub(super) symbols: &'a SymbolTable,
    /// Compiled procedures, in insertion order.
    pub(super) procedures: Procedures,
    /// Static level of the procedure currently being generated.
    pub(super) static_level: u32,
    /// Stack of node names currently being generated, for trace output.
    pub(super) node_stack: Vec<&'static str>,
}

impl<'a> Emitter<'a> {
    /// Generates one procedure: the frame prologue, the body, a return,
    /// and then every nested procedure one static level deeper.
    fn gen_procedure(&mut self, procedure: &TypedProcedure) -> Result<(), CodeGenError> {
        self.begin_gen("Procedure");
        let scope = self.symbols.procedure(procedure.proc).scope;

        let mut code = Code::new();
        code.alloc_stack(self.symbols.variable_space(scope));
        code.append(self.gen_statements(&procedure.block.body)?);
        code.emit(Instruction::Return);

        self.static_level += 1;
        for nested in &procedure.block.procedures {
            self.gen_procedure(nested)?;
        }
        self.static_level -= 1;

        self.procedures.add_procedure(procedure.proc, code);
        self.end_gen("Procedure");
        Ok(())
    }

    /// Push the node onto the trace stack and emit an indented message.
    pub(super) fn begin_gen(&mut self, node: &'static str) {
        log::trace!(
            "{:indent$}generating {}",
            "",
            node,
            indent = self.node_stack.len()
        );
        self.node_stack.push(node);
    }

    /// Pop the trace stack, complaining when entry and exit disagree.
    pub(super) fn end_gen(&mut self, node: &'static str) {
        let popped = self.node_stack.pop();
        if popped != Some(node) {
            log::trace!("end node {} does not match start node {:?}", node, popped);
        }
        log::trace!(
            "{:indent$}end generation of {}",
            "",
            node,
            indent = self.node_stack.len()
        );
    }
}
