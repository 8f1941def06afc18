//! Statement code generation for the stack backend.
//!
//! Branch offsets are relative to the end of the jump instruction, so a
//! statement's code is assembled from fully built fragments whose sizes
//! are known. The case statement is the involved one: it is emitted as
//! three regions (entry, jump table, branch bodies) whose internal jumps
//! are computed only once all three have been built.

use std::collections::HashMap;

use crate::codegen::code::{Code, Instruction, CASE_LABEL_MISSING, SIZE_JUMP_ALWAYS};
use crate::codegen::error::CodeGenError;
use crate::semantic::typed_ir::{
    TypedCaseBranch, TypedExpr, TypedSingleAssign, TypedStatement, TypedStatementKind,
};
use crate::semantic::types::Type;

use super::Emitter;

impl<'a> Emitter<'a> {
    /// Emits code for a statement list, in order.
    pub(super) fn gen_statements(
        &mut self,
        statements: &[TypedStatement],
    ) -> Result<Code, CodeGenError> {
        let mut code = Code::new();
        for statement in statements {
            code.append(self.gen_statement(statement)?);
        }
        Ok(code)
    }

    /// Emits code for a single statement.
    pub(super) fn gen_statement(&mut self, stmt: &TypedStatement) -> Result<Code, CodeGenError> {
        match &stmt.kind {
            TypedStatementKind::Assignment(assignments) => self.gen_assignment(assignments),

            TypedStatementKind::Write(exp) => {
                self.begin_gen("Write");
                let mut code = self.gen_expr(exp)?;
                code.emit(Instruction::Write);
                self.end_gen("Write");
                Ok(code)
            }

            TypedStatementKind::Call { proc } => {
                self.begin_gen("Call");
                let entry = self.symbols.procedure(*proc);
                let mut code = Code::new();
                // The target address is bound from the entry at load
                // time; only the static-link depth is emitted here.
                code.call(self.static_level as i32 - entry.level as i32, *proc);
                self.end_gen("Call");
                Ok(code)
            }

            TypedStatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.begin_gen("If");
                let mut code = self.gen_expr(condition)?;
                let then_code = self.gen_statement(then_branch)?;
                let else_code = match else_branch {
                    Some(s) => self.gen_statement(s)?,
                    None => Code::new(),
                };
                // Branch over the then part, then over the else part.
                code.jump_if_false(then_code.size() + SIZE_JUMP_ALWAYS);
                code.append(then_code);
                code.jump_always(else_code.size());
                code.append(else_code);
                self.end_gen("If");
                Ok(code)
            }

            TypedStatementKind::While { condition, body } => {
                self.begin_gen("While");
                let mut code = self.gen_expr(condition)?;
                let body_code = self.gen_statement(body)?;
                code.jump_if_false(body_code.size() + SIZE_JUMP_ALWAYS);
                code.append(body_code);
                // Back to the condition: everything emitted so far plus
                // the jump being emitted.
                code.jump_always(-(code.size() + SIZE_JUMP_ALWAYS));
                self.end_gen("While");
                Ok(code)
            }

            TypedStatementKind::Case {
                scrutinee,
                branches,
                default,
            } => self.gen_case(scrutinee, branches, default.as_deref()),

            TypedStatementKind::Compound(statements) => {
                self.begin_gen("StatementList");
                let code = self.gen_statements(statements)?;
                self.end_gen("StatementList");
                Ok(code)
            }

            TypedStatementKind::Skip => {
                self.begin_gen("Skip");
                self.end_gen("Skip");
                Ok(Code::new())
            }

            TypedStatementKind::Error => Err(CodeGenError::internal(
                "generate code for an error statement",
            )
            .with_span(stmt.span)),
        }
    }

    /// Emits a (multi-)assignment.
    ///
    /// Every source is evaluated in listed order, pushing its value;
    /// then, for each pair in reverse listed order, the target's address
    /// and a typed store. The first listed target thereby stores the
    /// value evaluated first, with left-to-right evaluation and all
    /// stores after all evaluations.
    fn gen_assignment(&mut self, assignments: &[TypedSingleAssign]) -> Result<Code, CodeGenError> {
        self.begin_gen("Assignment");
        let mut code = Code::new();
        for assign in assignments {
            code.append(self.gen_expr(&assign.value)?);
        }
        for assign in assignments.iter().rev() {
            code.append(self.gen_expr(&assign.target)?);
            let Type::Reference(base) = &assign.target.ty else {
                return Err(CodeGenError::internal("assignment target is not an lvalue")
                    .with_span(assign.target.span));
            };
            code.store(base);
        }
        self.end_gen("Assignment");
        Ok(code)
    }

    /// Emits a case statement.
    ///
    /// Layout, in emission order:
    ///
    /// ```text
    /// entry:    scrutinee; range check; JUMP_FALSE default;
    ///           normalize; computed branch into the table
    /// table:    one JUMP per value in min..=max
    /// branches: each branch body followed by a JUMP past the whole
    ///           statement, then the default (or trap) branch
    /// ```
    ///
    /// The table and the final jump offsets depend on the sizes of all
    /// three regions, so the regions are built in memory first and the
    /// per-label branch offsets recorded as the branch region grows.
    fn gen_case(
        &mut self,
        scrutinee: &TypedExpr,
        branches: &[TypedCaseBranch],
        default: Option<&[TypedStatement]>,
    ) -> Result<Code, CodeGenError> {
        self.begin_gen("Case");

        let mut sorted: Vec<&TypedCaseBranch> = branches.iter().collect();
        sorted.sort_by_key(|b| b.label);

        let (min, max) = match (sorted.first(), sorted.last()) {
            (Some(first), Some(last)) => (first.label, last.label),
            // With no branches the bounds are impossible to satisfy and
            // no table is emitted; every value takes the default path.
            _ => (i32::MAX, i32::MIN),
        };
        let range = max as i64 - min as i64;

        // Branch labels normalized by -min so the table is indexed from
        // zero; the sentinel stands for "no label matched".
        const NO_MATCH: i64 = i64::MAX;
        let mut labels: Vec<i64> = sorted.iter().map(|b| b.label as i64).collect();
        let mut codes = sorted
            .iter()
            .map(|b| self.gen_statements(&b.body))
            .collect::<Result<Vec<_>, _>>()?;

        labels.push(NO_MATCH);
        match default {
            Some(statements) => codes.push(self.gen_statements(statements)?),
            None => {
                let mut trap = Code::new();
                trap.load_constant(CASE_LABEL_MISSING);
                trap.emit(Instruction::Stop);
                codes.push(trap);
            }
        }

        // Lay the branches down, each followed by a jump past all the
        // branches that come after it (and their jumps).
        let sizes: Vec<i32> = codes.iter().map(Code::size).collect();
        let count = codes.len();
        let mut branch_region = Code::new();
        let mut offsets: HashMap<i64, i32> = HashMap::new();
        for (i, code) in codes.into_iter().enumerate() {
            offsets.insert(labels[i].wrapping_sub(min as i64), branch_region.size());
            branch_region.append(code);
            let over_remaining: i32 =
                sizes[i + 1..].iter().sum::<i32>() + (count - 1 - i) as i32 * SIZE_JUMP_ALWAYS;
            branch_region.jump_always(over_remaining);
        }
        let default_offset = offsets[&NO_MATCH.wrapping_sub(min as i64)];

        // One table slot per value in min..=max: jump over the rest of
        // the table, then to the branch for that value (or the default).
        let mut table = Code::new();
        if range >= 0 {
            for i in 0..=range {
                let over_remaining_table = (range - i) as i32 * SIZE_JUMP_ALWAYS;
                let target = offsets.get(&i).copied().unwrap_or(default_offset);
                table.jump_always(over_remaining_table + target);
            }
        }

        // Normalize the scrutinee and branch into the table.
        let mut dispatch = Code::new();
        dispatch.load_constant(min.wrapping_neg());
        dispatch.emit(Instruction::Add);
        dispatch.load_constant(SIZE_JUMP_ALWAYS);
        dispatch.emit(Instruction::Mpy);
        dispatch.emit(Instruction::Br);

        // Entry: three copies of the scrutinee, min <= s <= max, and on
        // failure a jump over the dispatch and the table straight to the
        // default branch.
        let mut code = self.gen_expr(scrutinee)?;
        code.emit(Instruction::Dup);
        code.emit(Instruction::Dup);
        code.load_constant(max);
        code.emit(Instruction::LessEq);
        code.emit(Instruction::Swap);
        code.load_constant(min);
        code.emit(Instruction::Swap);
        code.emit(Instruction::LessEq);
        code.emit(Instruction::And);
        code.jump_if_false(dispatch.size() + table.size() + default_offset);

        code.append(dispatch);
        code.append(table);
        code.append(branch_region);

        self.end_gen("Case");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Block, CaseBranch, Expr, ExprKind, Program, SingleAssign, Span, Statement, StatementKind,
    };
    use crate::codegen::{CodeGenerator, Procedures, StackBackend};
    use crate::semantic::symbols::{ProcId, SymbolTable};
    use crate::semantic::types::{subrange, Type};
    use crate::semantic::SemanticAnalyzer;
    use Instruction::*;

    fn span() -> Span {
        Span::new(0, 1)
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Identifier(name.to_string()), span())
    }

    fn int_lit(value: i32) -> Expr {
        Expr::new(ExprKind::IntLiteral(value), span())
    }

    fn assign(target: &str, value: Expr) -> Statement {
        Statement::new(
            StatementKind::Assignment(vec![SingleAssign::new(ident(target), value)]),
            span(),
        )
    }

    /// Checks and generates a main program with the given variables and
    /// body, returning the procedures table and the main entry.
    fn compile(vars: &[(&str, Type)], body: Vec<Statement>) -> (Procedures, ProcId) {
        let mut symbols = SymbolTable::new();
        let main = symbols.define_procedure("main", span()).unwrap();
        let scope = symbols.procedure(main).scope;
        symbols.reenter_scope(scope);
        for (name, ty) in vars {
            symbols.define_variable(*name, ty.clone(), span()).unwrap();
        }
        symbols.leave_scope();

        let program = Program::new(main, Block::new(vec![], body), span());
        let mut analyzer = SemanticAnalyzer::new(symbols);
        let typed = analyzer.analyze(&program).expect("program should check");
        let procedures = StackBackend::new()
            .generate(&typed, analyzer.symbols())
            .expect("program should generate");
        (procedures, main)
    }

    fn main_code(procedures: &Procedures, main: ProcId) -> &[Instruction] {
        procedures.get(main).unwrap().instructions()
    }

    #[test]
    fn test_write_constant() {
        let (procedures, main) = compile(&[], vec![Statement::new(
            StatementKind::Write(int_lit(42)),
            span(),
        )]);
        assert_eq!(
            main_code(&procedures, main),
            &[AllocStack(0), LoadConstant(42), Write, Return]
        );
    }

    #[test]
    fn test_zero_and_one_use_short_forms() {
        let (procedures, main) = compile(
            &[("a", Type::Int), ("b", Type::Int)],
            vec![assign("a", int_lit(0)), assign("b", int_lit(1))],
        );
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(2),
                Zero,
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Store(1),
                One,
                MemRef {
                    levels: 0,
                    offset: 1
                },
                Store(1),
                Return
            ]
        );
    }

    #[test]
    fn test_multi_assignment_evaluates_forward_stores_reverse() {
        let stmt = Statement::new(
            StatementKind::Assignment(vec![
                SingleAssign::new(ident("a"), int_lit(7)),
                SingleAssign::new(ident("b"), int_lit(8)),
            ]),
            span(),
        );
        let (procedures, main) = compile(&[("a", Type::Int), ("b", Type::Int)], vec![stmt]);
        // Both values are pushed first; then b (listed second) consumes
        // the top of stack, so a receives the value evaluated first.
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(2),
                LoadConstant(7),
                LoadConstant(8),
                MemRef {
                    levels: 0,
                    offset: 1
                },
                Store(1),
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Store(1),
                Return
            ]
        );
    }

    #[test]
    fn test_widen_is_free() {
        // y := x with x: 1..10, y: int. No bounds check in the code.
        let (procedures, main) = compile(
            &[("x", subrange(1, 10)), ("y", Type::Int)],
            vec![assign("y", ident("x"))],
        );
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(2),
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Load(1),
                MemRef {
                    levels: 0,
                    offset: 1
                },
                Store(1),
                Return
            ]
        );
    }

    #[test]
    fn test_narrow_emits_bounds_check() {
        // y := x with x: int, y: 1..10.
        let (procedures, main) = compile(
            &[("x", Type::Int), ("y", subrange(1, 10))],
            vec![assign("y", ident("x"))],
        );
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(2),
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Load(1),
                BoundsCheck(1, 10),
                MemRef {
                    levels: 0,
                    offset: 1
                },
                Store(1),
                Return
            ]
        );
    }

    #[test]
    fn test_if_else_offsets() {
        let stmt = Statement::new(
            StatementKind::If {
                condition: ident("true"),
                then_branch: Box::new(Statement::new(
                    StatementKind::Write(int_lit(1)),
                    span(),
                )),
                else_branch: Some(Box::new(Statement::new(
                    StatementKind::Write(int_lit(2)),
                    span(),
                ))),
            },
            span(),
        );
        let (procedures, main) = compile(&[], vec![stmt]);
        // The false-jump skips the then code plus the jump over the
        // else; the always-jump skips exactly the else code.
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(0),
                One,
                JumpIfFalse(4),
                One,
                Write,
                JumpAlways(3),
                LoadConstant(2),
                Write,
                Return
            ]
        );
    }

    #[test]
    fn test_if_without_else_jumps_zero() {
        let stmt = Statement::new(
            StatementKind::If {
                condition: ident("false"),
                then_branch: Box::new(Statement::new(StatementKind::Skip, span())),
                else_branch: None,
            },
            span(),
        );
        let (procedures, main) = compile(&[], vec![stmt]);
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(0),
                Zero,
                JumpIfFalse(2),
                JumpAlways(0),
                Return
            ]
        );
    }

    #[test]
    fn test_while_offsets() {
        // while x < 10 do x := x + 1
        let condition = Expr::new(
            ExprKind::Binary {
                left: Box::new(ident("x")),
                op: crate::ast::BinaryOp::Less,
                right: Box::new(int_lit(10)),
            },
            span(),
        );
        let body = assign(
            "x",
            Expr::new(
                ExprKind::Binary {
                    left: Box::new(ident("x")),
                    op: crate::ast::BinaryOp::Add,
                    right: Box::new(int_lit(1)),
                },
                span(),
            ),
        );
        let stmt = Statement::new(
            StatementKind::While {
                condition,
                body: Box::new(body),
            },
            span(),
        );
        let (procedures, main) = compile(&[("x", Type::Int)], vec![stmt]);
        let code = main_code(&procedures, main);
        assert_eq!(
            code,
            &[
                AllocStack(1),
                // condition: 8 words
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Load(1),
                LoadConstant(10),
                Less,
                JumpIfFalse(14),
                // body: 12 words
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Load(1),
                One,
                Add,
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Store(1),
                // back over condition, both jumps, and the body
                JumpAlways(-24),
                Return
            ]
        );
    }

    #[test]
    fn test_case_with_gaps_and_no_default() {
        // case x of 2: | 5: | 7: end  (empty branch bodies)
        let stmt = Statement::new(
            StatementKind::Case {
                scrutinee: ident("x"),
                branches: vec![
                    CaseBranch::new(int_lit(2), vec![], span()),
                    CaseBranch::new(int_lit(5), vec![], span()),
                    CaseBranch::new(int_lit(7), vec![], span()),
                ],
                default: None,
            },
            span(),
        );
        let (procedures, main) = compile(&[("x", Type::Int)], vec![stmt]);
        assert_eq!(
            main_code(&procedures, main),
            &[
                AllocStack(1),
                // entry: scrutinee, range check, jump to trap on miss
                MemRef {
                    levels: 0,
                    offset: 0
                },
                Load(1),
                Dup,
                Dup,
                LoadConstant(7),
                LessEq,
                Swap,
                LoadConstant(2),
                Swap,
                LessEq,
                And,
                JumpIfFalse(25),
                // dispatch: normalize and branch into the table
                LoadConstant(-2),
                Add,
                LoadConstant(SIZE_JUMP_ALWAYS),
                Mpy,
                Br,
                // table: values 2..=7; gaps route to the trap at
                // branch offset 6
                JumpAlways(10),
                JumpAlways(14),
                JumpAlways(12),
                JumpAlways(6),
                JumpAlways(8),
                JumpAlways(4),
                // branches: three empty bodies, then the trap
                JumpAlways(9),
                JumpAlways(7),
                JumpAlways(5),
                LoadConstant(CASE_LABEL_MISSING),
                Stop,
                JumpAlways(0),
                Return
            ]
        );
    }

    #[test]
    fn test_case_dispatch_targets() {
        // Walk the emitted case code and confirm the dispatch law for
        // every scrutinee value: in-range labels land on their branch,
        // gaps and out-of-range values land on the trap.
        let stmt = Statement::new(
            StatementKind::Case {
                scrutinee: ident("x"),
                branches: vec![
                    CaseBranch::new(
                        int_lit(2),
                        vec![Statement::new(StatementKind::Write(int_lit(20)), span())],
                        span(),
                    ),
                    CaseBranch::new(
                        int_lit(5),
                        vec![Statement::new(StatementKind::Write(int_lit(50)), span())],
                        span(),
                    ),
                ],
                default: None,
            },
            span(),
        );
        let (procedures, main) = compile(&[("x", Type::Int)], vec![stmt]);
        let code = main_code(&procedures, main);

        // Locate the regions from known shapes: the dispatch `Br` ends
        // the entry; the table is (5 - 2 + 1) jumps.
        let br_index = code
            .iter()
            .position(|i| *i == Br)
            .expect("dispatch Br present");
        let table_start_word: i32 = code[..=br_index].iter().map(|i| i.size()).sum::<i32>() - 2;
        // AllocStack is 2 words; subtract it to talk in case-local
        // offsets, then simulate each table slot's jump chain.
        let case_base = 2;
        let word_of = |index: usize| -> i32 {
            code[..index].iter().map(|i| i.size()).sum::<i32>() - case_base
        };
        let index_at = |word: i32| -> usize {
            let mut acc = -case_base;
            for (i, instr) in code.iter().enumerate() {
                if acc == word {
                    return i;
                }
                acc += instr.size();
            }
            panic!("no instruction at case-local word {word}");
        };

        let table_start = table_start_word;
        for (value, expect_write) in [(2, Some(20)), (3, None), (4, None), (5, Some(50))] {
            // The computed branch lands (value - 2) * SIZE_JUMP_ALWAYS
            // words past the end of the Br.
            let slot_word = table_start + (value - 2) * SIZE_JUMP_ALWAYS;
            let slot_index = index_at(slot_word);
            let JumpAlways(offset) = &code[slot_index] else {
                panic!("table slot is not a jump");
            };
            let target_word = slot_word + SIZE_JUMP_ALWAYS + offset;
            let target_index = index_at(target_word);
            match expect_write {
                Some(value) => {
                    assert_eq!(
                        code[target_index],
                        LoadConstant(value),
                        "label {value} lands on its branch"
                    );
                }
                None => {
                    assert_eq!(
                        code[target_index],
                        LoadConstant(CASE_LABEL_MISSING),
                        "gap value {value} lands on the trap"
                    );
                }
            }
        }

        // Branch tails jump to just past the whole case statement.
        let end_word = word_of(code.len() - 1);
        for (i, instr) in code.iter().enumerate() {
            if i > br_index
                && let JumpAlways(offset) = instr
            {
                let from = word_of(i) + SIZE_JUMP_ALWAYS;
                let target = from + offset;
                assert!(
                    target <= end_word,
                    "intra-case jump escapes the statement"
                );
            }
        }
    }

    #[test]
    fn test_case_with_default_routes_misses_to_it() {
        let stmt = Statement::new(
            StatementKind::Case {
                scrutinee: int_lit(9),
                branches: vec![CaseBranch::new(
                    int_lit(3),
                    vec![Statement::new(StatementKind::Write(int_lit(30)), span())],
                    span(),
                )],
                default: Some(vec![Statement::new(
                    StatementKind::Write(int_lit(99)),
                    span(),
                )]),
            },
            span(),
        );
        let (procedures, main) = compile(&[], vec![stmt]);
        let code = main_code(&procedures, main);
        // No trap when a default exists.
        assert!(!code.contains(&LoadConstant(CASE_LABEL_MISSING)));
        assert!(!code.contains(&Stop));
        assert!(code.contains(&LoadConstant(99)));
    }

    #[test]
    fn test_case_with_no_branches_emits_no_table() {
        let stmt = Statement::new(
            StatementKind::Case {
                scrutinee: int_lit(1),
                branches: vec![],
                default: None,
            },
            span(),
        );
        let (procedures, main) = compile(&[], vec![stmt]);
        let code = main_code(&procedures, main);
        // The impossible range check routes everything to the trap; the
        // jump over the (empty) table reaches the branch region head.
        assert!(code.contains(&JumpIfFalse(7)));
        assert!(code.contains(&LoadConstant(CASE_LABEL_MISSING)));
        assert!(code.contains(&Stop));
    }

    #[test]
    fn test_error_statement_is_fatal() {
        let mut symbols = SymbolTable::new();
        let main = symbols.define_procedure("main", span()).unwrap();
        let program = Program::new(
            main,
            Block::new(
                vec![],
                vec![Statement::new(StatementKind::Error, span())],
            ),
            span(),
        );
        // The checker passes error statements through untouched.
        let mut analyzer = SemanticAnalyzer::new(symbols);
        let typed = analyzer.analyze(&program).expect("error nodes check fine");
        let result = StackBackend::new().generate(&typed, analyzer.symbols());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("internal inconsistency"));
    }
}
