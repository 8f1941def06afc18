//! The static checker for PL0.
//!
//! The checker is a tree transformer: it walks the raw AST once and
//! produces the typed tree the code generator consumes. Along the way it
//!
//! - resolves every identifier use against the symbol table, rewriting
//!   it into a constant or variable node,
//! - gives every expression a resolved type, inserting dereference,
//!   widen-subrange and narrow-subrange nodes where the coercion rules
//!   call for them,
//! - selects the matching member of an overloaded operator's
//!   intersection type (first match in declaration order wins),
//! - validates assignment targets, conditions, case labels, record
//!   constructions, and field and pointer accesses.
//!
//! # Error Recovery
//!
//! The checker never aborts. Diagnostics accumulate in `errors`; a node
//! that fails to check is typed `error`, and the error type absorbs all
//! further coercions so one mistake produces one message.

use crate::ast::{
    BinaryOp, Block, CaseBranch, Expr, ExprKind, Program, SingleAssign, Span, Statement,
    StatementKind, UnaryOp,
};
use crate::semantic::{
    error::SemanticError,
    symbols::{ProcId, Symbol, SymbolKind, SymbolTable},
    typed_ir::*,
    types::{reference, Type},
};

/// The static checker. Holds the current scope through the symbol table
/// it borrows; the tree itself carries no upward links.
pub struct StaticChecker<'a> {
    /// The symbol table populated by the parser.
    symbols: &'a mut SymbolTable,
    /// Accumulated diagnostics.
    pub errors: Vec<SemanticError>,
    /// Stack of node names currently being checked, for trace output.
    node_stack: Vec<&'static str>,
}

impl<'a> StaticChecker<'a> {
    /// Creates a new checker over a parser-populated symbol table.
    pub fn new(symbols: &'a mut SymbolTable) -> Self {
        Self {
            symbols,
            errors: Vec::new(),
            node_stack: Vec::new(),
        }
    }

    /// Checks a whole program. The main program is treated as the
    /// outermost procedure, at static level 1.
    pub fn check_program(&mut self, program: &Program) -> TypedProgram {
        self.begin_check("Program");
        let main = self.check_procedure(program.proc, &program.block);
        self.end_check("Program");
        TypedProgram { main }
    }

    /// Checks one procedure: re-enters its local scope, resolves the
    /// scope's declarations, and checks the block.
    fn check_procedure(&mut self, proc: ProcId, block: &Block) -> TypedProcedure {
        self.begin_check("Procedure");
        let scope = self.symbols.procedure(proc).scope;
        self.symbols.reenter_scope(scope);
        let resolve_errors = self.symbols.resolve_scope();
        self.errors.extend(resolve_errors);
        let block = self.check_block(block);
        self.symbols.leave_scope();
        self.end_check("Procedure");
        TypedProcedure { proc, block }
    }

    /// Checks a block: nested procedures first (in order), then the
    /// body.
    fn check_block(&mut self, block: &Block) -> TypedBlock {
        self.begin_check("Block");
        let procedures = block
            .procedures
            .iter()
            .map(|p| self.check_procedure(p.proc, &p.block))
            .collect();
        let body = self.check_statements(&block.body);
        self.end_check("Block");
        TypedBlock { procedures, body }
    }

    // ========================================================================
    // Statement checking
    // ========================================================================

    /// Checks a list of statements in order.
    pub fn check_statements(&mut self, statements: &[Statement]) -> Vec<TypedStatement> {
        statements.iter().map(|s| self.check_statement(s)).collect()
    }

    /// Checks a single statement.
    pub fn check_statement(&mut self, stmt: &Statement) -> TypedStatement {
        match &stmt.kind {
            StatementKind::Assignment(assignments) => self.check_assignment(assignments, stmt.span),

            StatementKind::Write(exp) => self.check_write(exp, stmt.span),

            StatementKind::Call { name } => self.check_call(name, stmt.span),

            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.check_if(condition, then_branch, else_branch.as_deref(), stmt.span),

            StatementKind::While { condition, body } => self.check_while(condition, body, stmt.span),

            StatementKind::Case {
                scrutinee,
                branches,
                default,
            } => self.check_case(scrutinee, branches, default.as_deref(), stmt.span),

            StatementKind::Compound(statements) => {
                self.begin_check("StatementList");
                let checked = self.check_statements(statements);
                self.end_check("StatementList");
                TypedStatement::new(TypedStatementKind::Compound(checked), stmt.span)
            }

            StatementKind::Skip => TypedStatement::new(TypedStatementKind::Skip, stmt.span),

            // Already invalid; nothing to check.
            StatementKind::Error => TypedStatement::new(TypedStatementKind::Error, stmt.span),
        }
    }

    /// Checks a (multi-)assignment. Each target/source pair is checked
    /// independently: the target must be an lvalue and the source is
    /// coerced to the target's base type.
    fn check_assignment(&mut self, assignments: &[SingleAssign], span: Span) -> TypedStatement {
        self.begin_check("Assignment");
        let checked = assignments
            .iter()
            .map(|assign| {
                let target = self.check_expr(&assign.target);
                let value = self.check_expr(&assign.value);
                let value = match &target.ty {
                    Type::Reference(base) => {
                        let base = (**base).clone();
                        self.coerce(&base, value)
                    }
                    ty if ty.is_error() => value,
                    ty => {
                        self.errors.push(SemanticError::VariableExpected {
                            found: ty.to_string(),
                            span: target.span,
                        });
                        value
                    }
                };
                TypedSingleAssign { target, value }
            })
            .collect();
        self.end_check("Assignment");
        TypedStatement::new(TypedStatementKind::Assignment(checked), span)
    }

    /// Checks a `write`; the expression must coerce to integer.
    fn check_write(&mut self, exp: &Expr, span: Span) -> TypedStatement {
        self.begin_check("Write");
        let checked = self.check_expr(exp);
        let checked = self.coerce(&Type::Int, checked);
        self.end_check("Write");
        TypedStatement::new(TypedStatementKind::Write(checked), span)
    }

    /// Checks a `call`; the name must resolve to a procedure entry,
    /// which is stored on the node.
    fn check_call(&mut self, name: &str, span: Span) -> TypedStatement {
        self.begin_check("Call");
        let kind = match self.symbols.lookup(name) {
            Some(Symbol {
                kind: SymbolKind::Procedure(proc),
                ..
            }) => TypedStatementKind::Call { proc: *proc },
            Some(_) => {
                self.errors.push(SemanticError::ProcedureRequired {
                    name: name.to_string(),
                    span,
                });
                TypedStatementKind::Error
            }
            None => {
                self.errors.push(SemanticError::UndefinedProcedure {
                    name: name.to_string(),
                    span,
                });
                TypedStatementKind::Error
            }
        };
        self.end_check("Call");
        TypedStatement::new(kind, span)
    }

    /// Transforms a condition and coerces it to boolean.
    fn check_condition(&mut self, condition: &Expr) -> TypedExpr {
        let checked = self.check_expr(condition);
        self.coerce(&Type::Bool, checked)
    }

    fn check_if(
        &mut self,
        condition: &Expr,
        then_branch: &Statement,
        else_branch: Option<&Statement>,
        span: Span,
    ) -> TypedStatement {
        self.begin_check("If");
        let condition = self.check_condition(condition);
        let then_branch = Box::new(self.check_statement(then_branch));
        let else_branch = else_branch.map(|s| Box::new(self.check_statement(s)));
        self.end_check("If");
        TypedStatement::new(
            TypedStatementKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        )
    }

    fn check_while(&mut self, condition: &Expr, body: &Statement, span: Span) -> TypedStatement {
        self.begin_check("While");
        let condition = self.check_condition(condition);
        let body = Box::new(self.check_statement(body));
        self.end_check("While");
        TypedStatement::new(TypedStatementKind::While { condition, body }, span)
    }

    /// Checks a `case`: the scrutinee coerces to integer, every label
    /// must resolve to a distinct integer constant, and the branch
    /// bodies and optional default are checked as statement lists.
    fn check_case(
        &mut self,
        scrutinee: &Expr,
        branches: &[CaseBranch],
        default: Option<&[Statement]>,
        span: Span,
    ) -> TypedStatement {
        self.begin_check("Case");
        let scrutinee = {
            let checked = self.check_expr(scrutinee);
            self.coerce(&Type::Int, checked)
        };
        let mut seen = Vec::new();
        let checked_branches = branches
            .iter()
            .map(|branch| {
                let label = self.check_case_label(&branch.label);
                if let Some(value) = label {
                    if seen.contains(&value) {
                        self.errors.push(SemanticError::DuplicateCaseLabel {
                            label: value,
                            span: branch.label.span,
                        });
                    } else {
                        seen.push(value);
                    }
                }
                TypedCaseBranch {
                    label: label.unwrap_or(0),
                    body: self.check_statements(&branch.body),
                    span: branch.span,
                }
            })
            .collect();
        let default = default.map(|stmts| self.check_statements(stmts));
        self.end_check("Case");
        TypedStatement::new(
            TypedStatementKind::Case {
                scrutinee,
                branches: checked_branches,
                default,
            },
            span,
        )
    }

    /// Resolves a case label to its integer value. Integer literals and
    /// named integer constants qualify; anything else is a diagnostic.
    fn check_case_label(&mut self, label: &Expr) -> Option<i32> {
        let checked = self.check_expr(label);
        match (&checked.kind, &checked.ty) {
            (TypedExprKind::Const { value }, Type::Int)
            | (TypedExprKind::Const { value }, Type::Subrange { .. }) => Some(*value),
            (_, ty) if ty.is_error() => None,
            _ => {
                self.errors.push(SemanticError::CaseLabelNotConstant {
                    span: checked.span,
                });
                None
            }
        }
    }

    // ========================================================================
    // Expression checking
    // ========================================================================

    /// Checks an expression, producing its typed counterpart.
    pub fn check_expr(&mut self, expr: &Expr) -> TypedExpr {
        match &expr.kind {
            ExprKind::IntLiteral(value) => TypedExpr::int_const(*value, expr.span),

            ExprKind::Identifier(name) => self.check_identifier(name, expr.span),

            ExprKind::Binary { left, op, right } => {
                self.check_binary(left, *op, right, expr.span)
            }

            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expr.span),

            ExprKind::Read => {
                self.begin_check("Read");
                self.end_check("Read");
                TypedExpr::new(TypedExprKind::Read, Type::Int, expr.span)
            }

            ExprKind::FieldAccess { object, field } => {
                self.check_field_access(object, field, expr.span)
            }

            ExprKind::PointerDeref(object) => self.check_pointer_deref(object, expr.span),

            ExprKind::New { type_name } => self.check_new(type_name, expr.span),

            ExprKind::RecordConstructor { type_name, fields } => {
                self.check_record_constructor(type_name, fields, expr.span)
            }
        }
    }

    /// Resolves an identifier use. Constants become constant nodes;
    /// variables become variable nodes whose type is a reference to the
    /// declared type, preserving lvalue-ness for later coercion.
    fn check_identifier(&mut self, name: &str, span: Span) -> TypedExpr {
        self.begin_check("Identifier");
        let result = match self.symbols.lookup(name) {
            Some(Symbol {
                kind: SymbolKind::Constant { ty, value },
                ..
            }) => {
                log::trace!("transformed {} to constant", name);
                TypedExpr::new(
                    TypedExprKind::Const { value: *value },
                    ty.clone(),
                    span,
                )
            }
            Some(Symbol {
                kind: SymbolKind::Variable { ty, level, offset },
                ..
            }) => {
                log::trace!("transformed {} to variable", name);
                TypedExpr::new(
                    TypedExprKind::Variable {
                        level: *level,
                        offset: *offset,
                    },
                    reference(ty.clone()),
                    span,
                )
            }
            Some(_) => {
                self.errors.push(SemanticError::ConstantOrVariableRequired {
                    name: name.to_string(),
                    span,
                });
                TypedExpr::error(span)
            }
            None => {
                self.errors
                    .push(SemanticError::undefined_identifier(name, span));
                TypedExpr::error(span)
            }
        };
        self.end_check("Identifier");
        result
    }

    /// Checks a binary operator application. The two operands become an
    /// arguments node of product type, which is then matched against the
    /// operator's signature.
    fn check_binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr, span: Span) -> TypedExpr {
        let left = self.check_expr(left);
        let right = self.check_expr(right);
        let product = Type::Product(vec![left.ty.clone(), right.ty.clone()]);
        let arg = TypedExpr::new(TypedExprKind::Arguments(vec![left, right]), product, span);
        self.check_operator(operator_for_binary(op), arg, span)
    }

    /// Checks a unary operator application.
    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> TypedExpr {
        let operand = self.check_expr(operand);
        self.check_operator(operator_for_unary(op), operand, span)
    }

    /// Matches an operator application against the operator's signature.
    ///
    /// A plain function type coerces the argument (with narrowing
    /// allowed) to its argument type. An intersection type tries each
    /// member in declaration order with the safe coercion and takes the
    /// first that fits; if none does the node is typed `error`.
    fn check_operator(&mut self, op: Operator, arg: TypedExpr, span: Span) -> TypedExpr {
        self.begin_check("Operator");
        let Some(op_type) = self.symbols.lookup_operator(op).cloned() else {
            self.errors.push(SemanticError::UndefinedOperator {
                op: op.to_string(),
                span,
            });
            self.end_check("Operator");
            return TypedExpr::error(span);
        };
        let result = match &op_type {
            Type::Function {
                arg: arg_type,
                result,
            } => {
                let coerced = self.coerce(arg_type, arg);
                TypedExpr::new(
                    TypedExprKind::Operator {
                        op,
                        arg: Box::new(coerced),
                    },
                    (**result).clone(),
                    span,
                )
            }
            Type::Intersection(members) => {
                log::trace!("coercing {} to {}", arg.ty, op_type);
                let mut selected = None;
                for member in members {
                    let Type::Function {
                        arg: arg_type,
                        result,
                    } = member
                    else {
                        continue;
                    };
                    if let Ok(coerced) = arg_type.coerce_to_type(&arg) {
                        selected = Some((coerced, (**result).clone()));
                        break;
                    }
                }
                match selected {
                    Some((coerced, result)) => TypedExpr::new(
                        TypedExprKind::Operator {
                            op,
                            arg: Box::new(coerced),
                        },
                        result,
                        span,
                    ),
                    None => {
                        log::trace!("failed to coerce {} to {}", arg.ty, op_type);
                        self.errors.push(SemanticError::OperatorTypeMismatch {
                            expected: op_type.to_string(),
                            found: arg.ty.to_string(),
                            span,
                        });
                        TypedExpr::new(
                            TypedExprKind::Operator {
                                op,
                                arg: Box::new(arg),
                            },
                            Type::Error,
                            span,
                        )
                    }
                }
            }
            _ => {
                self.errors.push(SemanticError::UndefinedOperator {
                    op: op.to_string(),
                    span,
                });
                TypedExpr::error(span)
            }
        };
        self.end_check("Operator");
        result
    }

    /// Checks a field access. The inner expression must be (a reference
    /// to) a record; the access itself is an lvalue of the field type.
    fn check_field_access(&mut self, object: &Expr, field: &str, span: Span) -> TypedExpr {
        self.begin_check("FieldAccess");
        let object = self.check_expr(object);
        let result = if object.ty.is_error() {
            TypedExpr::error(span)
        } else {
            match object.ty.record_type().cloned() {
                Some(record) => match (record.field_type(field), record.field_offset(field)) {
                    (Some(field_type), Some(offset)) => {
                        let field_type = field_type.clone();
                        TypedExpr::new(
                            TypedExprKind::FieldAccess {
                                object: Box::new(object),
                                field: field.to_string(),
                                offset,
                            },
                            reference(field_type),
                            span,
                        )
                    }
                    _ => {
                        self.errors.push(SemanticError::NoSuchField {
                            record: record.name.clone(),
                            field: field.to_string(),
                            span,
                        });
                        TypedExpr::error(span)
                    }
                },
                None => {
                    self.errors.push(SemanticError::NotARecord {
                        found: object.ty.to_string(),
                        span,
                    });
                    TypedExpr::error(span)
                }
            }
        };
        self.end_check("FieldAccess");
        result
    }

    /// Checks a pointer dereference. The inner expression must be (a
    /// reference to) a pointer; the result is an lvalue of the pointee
    /// type.
    fn check_pointer_deref(&mut self, object: &Expr, span: Span) -> TypedExpr {
        self.begin_check("PointerDereference");
        let object = self.check_expr(object);
        let result = if object.ty.is_error() {
            TypedExpr::error(span)
        } else {
            match object.ty.pointer_type().cloned() {
                Some(target) => {
                    let target = self.ground_named(target, span);
                    TypedExpr::new(
                        TypedExprKind::PointerDeref(Box::new(object)),
                        reference(target),
                        span,
                    )
                }
                None => {
                    self.errors.push(SemanticError::NotAPointer {
                        found: object.ty.to_string(),
                        span,
                    });
                    TypedExpr::error(span)
                }
            }
        };
        self.end_check("PointerDereference");
        result
    }

    /// Checks a `new`. The named type must be a pointer type alias; the
    /// node takes the alias's type and produces a value, not an lvalue.
    fn check_new(&mut self, type_name: &str, span: Span) -> TypedExpr {
        self.begin_check("New");
        let result = match self.symbols.lookup_type(type_name).cloned() {
            Some(ty @ Type::Pointer(_)) => TypedExpr::new(TypedExprKind::New, ty, span),
            Some(Type::Error) => TypedExpr::error(span),
            Some(_) => {
                self.errors.push(SemanticError::NotAPointerType {
                    name: type_name.to_string(),
                    span,
                });
                TypedExpr::error(span)
            }
            None => {
                self.errors.push(SemanticError::UndefinedType {
                    name: type_name.to_string(),
                    span,
                });
                TypedExpr::error(span)
            }
        };
        self.end_check("New");
        result
    }

    /// Checks a record constructor. Field expressions are matched to the
    /// record's fields by position and coerced to the declared field
    /// types; an arity mismatch is a diagnostic.
    fn check_record_constructor(
        &mut self,
        type_name: &str,
        fields: &[Expr],
        span: Span,
    ) -> TypedExpr {
        self.begin_check("RecordConstructor");
        let checked: Vec<TypedExpr> = fields.iter().map(|f| self.check_expr(f)).collect();
        let result = match self.symbols.lookup_type(type_name).cloned() {
            Some(ty) => {
                let ty = self.ground_named(ty, span);
                match ty.record_type().cloned() {
                    Some(record) => {
                        if checked.len() != record.fields.len() {
                            self.errors.push(SemanticError::RecordArityMismatch {
                                record: record.name.clone(),
                                expected: record.fields.len(),
                                found: checked.len(),
                                span,
                            });
                            TypedExpr::new(
                                TypedExprKind::RecordConstructor { fields: checked },
                                Type::Error,
                                span,
                            )
                        } else {
                            let coerced = record
                                .fields
                                .iter()
                                .zip(checked)
                                .map(|(field, exp)| self.coerce(&field.ty, exp))
                                .collect();
                            TypedExpr::new(
                                TypedExprKind::RecordConstructor { fields: coerced },
                                Type::Record(record),
                                span,
                            )
                        }
                    }
                    None => {
                        if !ty.is_error() {
                            self.errors.push(SemanticError::NotARecordType {
                                name: type_name.to_string(),
                                span,
                            });
                        }
                        TypedExpr::error(span)
                    }
                }
            }
            None => {
                self.errors.push(SemanticError::UndefinedType {
                    name: type_name.to_string(),
                    span,
                });
                TypedExpr::error(span)
            }
        };
        self.end_check("RecordConstructor");
        result
    }

    // ========================================================================
    // Support
    // ========================================================================

    /// Coerces an expression to a target type, reporting failure as a
    /// diagnostic and typing the node `error` so downstream checking
    /// absorbs it.
    fn coerce(&mut self, target: &Type, exp: TypedExpr) -> TypedExpr {
        match target.coerce_exp(&exp) {
            Ok(coerced) => coerced,
            Err(err) => {
                self.errors.push(SemanticError::IncompatibleTypes {
                    expected: err.expected,
                    found: err.found,
                    span: exp.span,
                });
                TypedExpr {
                    ty: Type::Error,
                    ..exp
                }
            }
        }
    }

    /// Follows named type aliases until a structural type is reached.
    /// Used when a pointer target's shape is needed.
    fn ground_named(&mut self, mut ty: Type, span: Span) -> Type {
        let mut steps = 0;
        while let Type::Named(name) = &ty {
            match self.symbols.lookup_type(name).cloned() {
                Some(resolved) => {
                    ty = resolved;
                }
                None => {
                    self.errors.push(SemanticError::UndefinedType {
                        name: name.clone(),
                        span,
                    });
                    return Type::Error;
                }
            }
            steps += 1;
            if steps > 64 {
                return Type::Error;
            }
        }
        ty
    }

    /// Push the node onto the trace stack and emit an indented message.
    fn begin_check(&mut self, node: &'static str) {
        log::trace!(
            "{:indent$}checking {}",
            "",
            node,
            indent = self.node_stack.len()
        );
        self.node_stack.push(node);
    }

    /// Pop the trace stack, complaining when entry and exit disagree.
    fn end_check(&mut self, node: &'static str) {
        let popped = self.node_stack.pop();
        if popped != Some(node) {
            log::trace!("end node {} does not match start node {:?}", node, popped);
        }
        log::trace!(
            "{:indent$}end check of {}",
            "",
            node,
            indent = self.node_stack.len()
        );
    }
}

/// Maps a parsed binary operator to its resolved tag.
fn operator_for_binary(op: BinaryOp) -> Operator {
    match op {
        BinaryOp::Add => Operator::Add,
        BinaryOp::Subtract => Operator::Subtract,
        BinaryOp::Multiply => Operator::Multiply,
        BinaryOp::Divide => Operator::Divide,
        BinaryOp::Equal => Operator::Equal,
        BinaryOp::NotEqual => Operator::NotEqual,
        BinaryOp::Less => Operator::Less,
        BinaryOp::LessEq => Operator::LessEq,
        BinaryOp::Greater => Operator::Greater,
        BinaryOp::GreaterEq => Operator::GreaterEq,
    }
}

/// Maps a parsed unary operator to its resolved tag.
fn operator_for_unary(op: UnaryOp) -> Operator {
    match op {
        UnaryOp::Negate => Operator::Negate,
    }
}
