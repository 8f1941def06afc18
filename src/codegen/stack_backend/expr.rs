//! Expression code generation for the stack backend.
//!
//! Expression code always leaves its result on the stack: a value for
//! r-values, an absolute address for lvalues (variable references, field
//! accesses, pointer dereferences). The checker-inserted coercion nodes
//! drive the interesting cases: a `Dereference` turns an address into a
//! value with a sized load, a `NarrowSubrange` adds a runtime bounds
//! check, and a `WidenSubrange` costs nothing at all.

use crate::codegen::code::{Code, Instruction};
use crate::codegen::error::CodeGenError;
use crate::semantic::typed_ir::{Operator, TypedExpr, TypedExprKind};
use crate::semantic::types::Type;

use super::Emitter;

impl<'a> Emitter<'a> {
    /// Emits code for an expression.
    pub(super) fn gen_expr(&mut self, exp: &TypedExpr) -> Result<Code, CodeGenError> {
        match &exp.kind {
            TypedExprKind::Const { value } => {
                self.begin_gen("Const");
                let mut code = Code::new();
                match value {
                    0 => code.emit(Instruction::Zero),
                    1 => code.emit(Instruction::One),
                    _ => code.load_constant(*value),
                }
                self.end_gen("Const");
                Ok(code)
            }

            TypedExprKind::Variable { level, offset } => {
                self.begin_gen("Variable");
                let mut code = Code::new();
                code.mem_ref(self.static_level as i32 - *level as i32, *offset);
                self.end_gen("Variable");
                Ok(code)
            }

            TypedExprKind::Read => {
                self.begin_gen("Read");
                let mut code = Code::new();
                code.emit(Instruction::Read);
                self.end_gen("Read");
                Ok(code)
            }

            TypedExprKind::Operator { op, arg } => self.gen_operator(*op, arg, exp),

            TypedExprKind::Arguments(args) => {
                self.begin_gen("Arguments");
                let mut code = Code::new();
                for arg in args {
                    code.append(self.gen_expr(arg)?);
                }
                self.end_gen("Arguments");
                Ok(code)
            }

            TypedExprKind::Dereference(inner) => {
                self.begin_gen("Dereference");
                let mut code = self.gen_expr(inner)?;
                // The node's type is the base type of the lvalue.
                code.load(&exp.ty);
                self.end_gen("Dereference");
                Ok(code)
            }

            TypedExprKind::NarrowSubrange(inner) => {
                self.begin_gen("NarrowSubrange");
                let mut code = self.gen_expr(inner)?;
                let Type::Subrange { lower, upper, .. } = &exp.ty else {
                    return Err(CodeGenError::internal(
                        "narrow node without a subrange type",
                    )
                    .with_span(exp.span));
                };
                code.bounds_check(*lower, *upper);
                self.end_gen("NarrowSubrange");
                Ok(code)
            }

            TypedExprKind::WidenSubrange(inner) => {
                self.begin_gen("WidenSubrange");
                // Widening needs no code; the value is already there.
                let code = self.gen_expr(inner)?;
                self.end_gen("WidenSubrange");
                Ok(code)
            }

            TypedExprKind::FieldAccess { object, offset, .. } => {
                self.begin_gen("FieldAccess");
                if !matches!(object.ty, Type::Reference(_)) {
                    return Err(CodeGenError::unsupported(
                        "field access on a record value",
                    )
                    .with_span(exp.span));
                }
                let mut code = self.gen_expr(object)?;
                code.load_constant(*offset);
                code.emit(Instruction::Add);
                self.end_gen("FieldAccess");
                Ok(code)
            }

            TypedExprKind::PointerDeref(object) => {
                self.begin_gen("PointerDereference");
                let mut code = self.gen_expr(object)?;
                // A pointer held in an lvalue is loaded first; the
                // pointer value itself is the pointee's address.
                if let Type::Reference(base) = &object.ty {
                    code.load(base);
                }
                self.end_gen("PointerDereference");
                Ok(code)
            }

            TypedExprKind::New => Err(CodeGenError::unsupported("pointer allocation (new)")
                .with_span(exp.span)),

            TypedExprKind::RecordConstructor { fields } => {
                self.begin_gen("RecordConstructor");
                let mut code = Code::new();
                for field in fields {
                    code.append(self.gen_expr(field)?);
                }
                self.end_gen("RecordConstructor");
                Ok(code)
            }

            TypedExprKind::ErrorExp => Err(CodeGenError::internal(
                "generate code for an error expression",
            )
            .with_span(exp.span)),
        }
    }

    /// Emits code for an operator application.
    ///
    /// Comparisons the machine only knows as `<` and `<=` reverse their
    /// argument evaluation order instead of needing extra opcodes, and
    /// inequality is equality followed by a boolean not.
    fn gen_operator(
        &mut self,
        op: Operator,
        arg: &TypedExpr,
        exp: &TypedExpr,
    ) -> Result<Code, CodeGenError> {
        self.begin_gen("Operator");
        let mut code;
        match op {
            Operator::Add => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Add);
            }
            Operator::Subtract => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Negate);
                code.emit(Instruction::Add);
            }
            Operator::Multiply => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Mpy);
            }
            Operator::Divide => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Div);
            }
            Operator::Equal => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Equal);
            }
            Operator::NotEqual => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Equal);
                code.bool_not();
            }
            Operator::Less => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Less);
            }
            Operator::LessEq => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::LessEq);
            }
            Operator::Greater => {
                code = self.gen_args_reversed(arg, exp)?;
                code.emit(Instruction::Less);
            }
            Operator::GreaterEq => {
                code = self.gen_args_reversed(arg, exp)?;
                code.emit(Instruction::LessEq);
            }
            Operator::Negate => {
                code = self.gen_expr(arg)?;
                code.emit(Instruction::Negate);
            }
        }
        self.end_gen("Operator");
        Ok(code)
    }

    /// Emits an operator's operands in reverse order.
    fn gen_args_reversed(
        &mut self,
        arg: &TypedExpr,
        exp: &TypedExpr,
    ) -> Result<Code, CodeGenError> {
        self.begin_gen("ArgsInReverse");
        let TypedExprKind::Arguments(args) = &arg.kind else {
            return Err(
                CodeGenError::internal("reversed operands require an argument list")
                    .with_span(exp.span),
            );
        };
        let mut code = Code::new();
        for a in args.iter().rev() {
            code.append(self.gen_expr(a)?);
        }
        self.end_gen("ArgsInReverse");
        Ok(code)
    }
}
