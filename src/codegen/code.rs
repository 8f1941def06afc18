//! The instruction set and code buffer for the target stack machine.
//!
//! The machine is a word-addressed stack machine. Variables are
//! addressed by static level and frame offset; procedure calls carry a
//! static-link depth and their target is bound by the VM loader from the
//! procedure entry. Jump offsets are signed and **relative to the end of
//! the jump instruction**: a forward jump encodes the size of the code to
//! skip, a backward jump a negative value covering the code emitted so
//! far plus the jump itself.
//!
//! [`Code`] is a growable sequence of instructions that tracks its total
//! word size as it grows, so offsets for branches can be computed from
//! the sizes of already-built fragments. All offset arithmetic is in
//! words and self-consistent with [`Instruction::size`].

use std::fmt;

use crate::semantic::symbols::ProcId;
use crate::semantic::types::Type;

/// The in-stream size of an unconditional jump, in words. Conditional
/// jumps have the same size, which keeps branch offset formulas uniform.
pub const SIZE_JUMP_ALWAYS: i32 = 2;

/// Reserved stop code pushed when a case statement's scrutinee matches
/// no label and no default branch was declared. Agreed with the VM.
pub const CASE_LABEL_MISSING: i32 = 7;

/// One stack-machine instruction.
///
/// Operands are carried in the instruction stream; an instruction's word
/// size is one plus its number of operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Allocate the given number of words of local variable space.
    AllocStack(i32),
    /// Return from the current procedure.
    Return,
    /// Push a constant.
    LoadConstant(i32),
    /// Push 0 (dedicated short form).
    Zero,
    /// Push 1 (dedicated short form).
    One,
    /// Pop two, push their sum.
    Add,
    /// Negate the top of stack.
    Negate,
    /// Pop two, push their product.
    Mpy,
    /// Pop two, push their quotient.
    Div,
    /// Pop two, push 1 if equal else 0.
    Equal,
    /// Pop two, push 1 if second < top else 0.
    Less,
    /// Pop two, push 1 if second <= top else 0.
    LessEq,
    /// Pop two booleans, push their conjunction.
    And,
    /// Swap the top two words.
    Swap,
    /// Duplicate the top word.
    Dup,
    /// Pop a word offset and branch by it, relative to the end of this
    /// instruction.
    Br,
    /// Unconditional relative jump.
    JumpAlways(i32),
    /// Pop a boolean; jump when it is false.
    JumpIfFalse(i32),
    /// Read an integer from input and push it.
    Read,
    /// Pop an integer and write it to output.
    Write,
    /// Stop the machine; the top of stack is the stop code.
    Stop,
    /// Pop an address, push the value of the given word size stored
    /// there.
    Load(i32),
    /// Pop an address, then pop and store a value of the given word
    /// size.
    Store(i32),
    /// Check that the top of stack lies in the closed interval; the
    /// machine stops with a range error otherwise. The value stays on
    /// the stack.
    BoundsCheck(i32, i32),
    /// Push the absolute address of a frame slot, chasing the static
    /// link the given number of levels.
    MemRef { levels: i32, offset: i32 },
    /// Call a procedure. The static link is `levels` frames up; the code
    /// address is bound from the entry by the VM loader.
    Call { levels: i32, proc: ProcId },
}

impl Instruction {
    /// The number of words this instruction occupies in the stream.
    pub fn size(&self) -> i32 {
        match self {
            Instruction::AllocStack(_)
            | Instruction::LoadConstant(_)
            | Instruction::JumpAlways(_)
            | Instruction::JumpIfFalse(_)
            | Instruction::Load(_)
            | Instruction::Store(_) => 2,
            Instruction::BoundsCheck(_, _)
            | Instruction::MemRef { .. }
            | Instruction::Call { .. } => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::AllocStack(n) => write!(f, "ALLOC_STACK {}", n),
            Instruction::Return => write!(f, "RETURN"),
            Instruction::LoadConstant(v) => write!(f, "LOAD_CON {}", v),
            Instruction::Zero => write!(f, "ZERO"),
            Instruction::One => write!(f, "ONE"),
            Instruction::Add => write!(f, "ADD"),
            Instruction::Negate => write!(f, "NEGATE"),
            Instruction::Mpy => write!(f, "MPY"),
            Instruction::Div => write!(f, "DIV"),
            Instruction::Equal => write!(f, "EQUAL"),
            Instruction::Less => write!(f, "LESS"),
            Instruction::LessEq => write!(f, "LESSEQ"),
            Instruction::And => write!(f, "AND"),
            Instruction::Swap => write!(f, "SWAP"),
            Instruction::Dup => write!(f, "DUP"),
            Instruction::Br => write!(f, "BR"),
            Instruction::JumpAlways(off) => write!(f, "JUMP {}", off),
            Instruction::JumpIfFalse(off) => write!(f, "JUMP_FALSE {}", off),
            Instruction::Read => write!(f, "READ"),
            Instruction::Write => write!(f, "WRITE"),
            Instruction::Stop => write!(f, "STOP"),
            Instruction::Load(size) => write!(f, "LOAD {}", size),
            Instruction::Store(size) => write!(f, "STORE {}", size),
            Instruction::BoundsCheck(lo, hi) => write!(f, "BOUND {} {}", lo, hi),
            Instruction::MemRef { levels, offset } => write!(f, "MEM_REF {} {}", levels, offset),
            Instruction::Call { levels, proc } => write!(f, "CALL {} proc#{}", levels, proc.0),
        }
    }
}

/// A growable sequence of stack-machine words.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Code {
    instructions: Vec<Instruction>,
    words: i32,
}

impl Code {
    /// Creates an empty code buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current size in words. Branch offsets are computed from this.
    pub fn size(&self) -> i32 {
        self.words
    }

    /// The emitted instructions.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Appends a single instruction.
    pub fn emit(&mut self, instruction: Instruction) {
        self.words += instruction.size();
        self.instructions.push(instruction);
    }

    /// Appends another code fragment.
    pub fn append(&mut self, other: Code) {
        self.words += other.words;
        self.instructions.extend(other.instructions);
    }

    /// Emits a constant load.
    pub fn load_constant(&mut self, value: i32) {
        self.emit(Instruction::LoadConstant(value));
    }

    /// Emits an unconditional relative jump. Forward offsets are the
    /// size of the code to skip; backward offsets are negative.
    pub fn jump_always(&mut self, offset: i32) {
        self.emit(Instruction::JumpAlways(offset));
    }

    /// Emits a conditional forward jump taken when the popped boolean is
    /// false.
    pub fn jump_if_false(&mut self, offset: i32) {
        self.emit(Instruction::JumpIfFalse(offset));
    }

    /// Emits a subrange bounds check.
    pub fn bounds_check(&mut self, lower: i32, upper: i32) {
        self.emit(Instruction::BoundsCheck(lower, upper));
    }

    /// Emits a frame-relative address computation.
    pub fn mem_ref(&mut self, levels: i32, offset: i32) {
        self.emit(Instruction::MemRef { levels, offset });
    }

    /// Emits a call with the given static-link depth.
    pub fn call(&mut self, levels: i32, proc: ProcId) {
        self.emit(Instruction::Call { levels, proc });
    }

    /// Emits the frame-allocation prologue.
    pub fn alloc_stack(&mut self, words: i32) {
        self.emit(Instruction::AllocStack(words));
    }

    /// Emits a load sized from a type.
    pub fn load(&mut self, ty: &Type) {
        self.emit(Instruction::Load(ty.space()));
    }

    /// Emits a store sized from a type.
    pub fn store(&mut self, ty: &Type) {
        self.emit(Instruction::Store(ty.space()));
    }

    /// Emits the boolean-not sequence over a 0/1 value.
    pub fn bool_not(&mut self) {
        self.emit(Instruction::Negate);
        self.emit(Instruction::One);
        self.emit(Instruction::Add);
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        for instruction in &self.instructions {
            writeln!(f, "{:4}: {}", offset, instruction)?;
            offset += instruction.size();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::types::{subrange, RecordType};

    #[test]
    fn test_instruction_sizes() {
        assert_eq!(Instruction::Add.size(), 1);
        assert_eq!(Instruction::LoadConstant(5).size(), 2);
        assert_eq!(Instruction::JumpAlways(0).size(), SIZE_JUMP_ALWAYS);
        assert_eq!(Instruction::JumpIfFalse(0).size(), SIZE_JUMP_ALWAYS);
        assert_eq!(Instruction::BoundsCheck(1, 10).size(), 3);
        assert_eq!(
            Instruction::MemRef {
                levels: 0,
                offset: 0
            }
            .size(),
            3
        );
    }

    #[test]
    fn test_size_tracks_words() {
        let mut code = Code::new();
        code.emit(Instruction::Zero);
        code.load_constant(42);
        code.jump_always(4);
        assert_eq!(code.size(), 1 + 2 + 2);
        assert_eq!(code.instructions().len(), 3);
    }

    #[test]
    fn test_append_accumulates() {
        let mut a = Code::new();
        a.emit(Instruction::One);
        let mut b = Code::new();
        b.load_constant(3);
        b.emit(Instruction::Add);
        a.append(b);
        assert_eq!(a.size(), 4);
        assert_eq!(
            a.instructions(),
            &[
                Instruction::One,
                Instruction::LoadConstant(3),
                Instruction::Add
            ]
        );
    }

    #[test]
    fn test_sized_load_store() {
        let record = Type::Record(RecordType::new(
            "pair",
            vec![
                ("a".to_string(), Type::Int),
                ("b".to_string(), subrange(1, 10)),
            ],
        ));
        let mut code = Code::new();
        code.load(&Type::Int);
        code.store(&record);
        assert_eq!(
            code.instructions(),
            &[Instruction::Load(1), Instruction::Store(2)]
        );
    }

    #[test]
    fn test_bool_not_sequence() {
        let mut code = Code::new();
        code.bool_not();
        assert_eq!(
            code.instructions(),
            &[Instruction::Negate, Instruction::One, Instruction::Add]
        );
        assert_eq!(code.size(), 3);
    }

    #[test]
    fn test_display_offsets() {
        let mut code = Code::new();
        code.load_constant(1);
        code.emit(Instruction::Add);
        let listing = code.to_string();
        assert!(listing.contains("   0: LOAD_CON 1"));
        assert!(listing.contains("   2: ADD"));
    }
}
