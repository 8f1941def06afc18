//! Symbol table for PL0 semantic analysis.
//!
//! The symbol table tracks all named entities and their properties. It is
//! populated by the external parser (declarations become entries as they
//! are parsed) and consulted and completed by the static checker. It
//! supports:
//!
//! - **Lexically nested scopes**: a tree of scopes whose parent edges
//!   mirror procedure nesting, held in an arena and addressed by
//!   [`ScopeId`] so that scopes never borrow from one another.
//! - **Static levels**: each scope records its nesting level; the
//!   predefined scope is level 0 and the main program level 1.
//! - **A separate operator namespace**: operator signatures are keyed by
//!   [`Operator`] tag, so user identifiers can never shadow them.
//! - **Deferred type resolution**: an entry's type may mention a named
//!   alias; [`SymbolTable::resolve_scope`] grounds every entry of a scope
//!   and lays out its variables before the checker touches the body.
//!
//! # Scope Rules
//!
//! Lookup walks parent scopes; definition only inspects the current
//! scope, and duplicate names within one scope are rejected.

use std::collections::HashMap;

use crate::ast::Span;
use crate::semantic::error::SemanticError;
use crate::semantic::typed_ir::Operator;
use crate::semantic::types::{binary_function, function, RecordType, Type};

/// Unique identifier for a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The predefined scope (always 0, static level 0).
    pub const PREDEFINED: ScopeId = ScopeId(0);
}

/// Unique identifier for a procedure entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub usize);

/// A single named symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// The symbol's name.
    pub name: String,
    /// What kind of symbol this is.
    pub kind: SymbolKind,
    /// Where the symbol was declared.
    pub span: Span,
}

/// The kind of symbol.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    /// A named constant with its value.
    Constant { ty: Type, value: i32 },

    /// A variable with its frame location. `level` is the static level
    /// of the declaring scope; `offset` is the word offset within that
    /// frame, assigned during scope resolution.
    Variable { ty: Type, level: u32, offset: i32 },

    /// A procedure, pointing at its entry record.
    Procedure(ProcId),

    /// A named type alias.
    TypeAlias(Type),
}

/// A procedure entry: the procedure's local scope and static level.
///
/// The compiled entry address is resolved by the VM loader, not here.
#[derive(Debug, Clone)]
pub struct ProcedureEntry {
    /// Procedure name, kept for diagnostics and reproducible output.
    pub name: String,
    /// The procedure's local scope.
    pub scope: ScopeId,
    /// The static level of the procedure's frame.
    pub level: u32,
}

/// A single scope: insertion-ordered symbols plus the operator namespace.
#[derive(Debug)]
struct Scope {
    /// Static nesting level of this scope.
    level: u32,
    /// Symbols in declaration order.
    symbols: Vec<Symbol>,
    /// Name to symbol index, for lookup.
    index: HashMap<String, usize>,
    /// Operator signatures. Only the predefined scope populates this,
    /// but lookup walks parents like any other.
    operators: HashMap<Operator, Type>,
    /// Parent scope (None for the predefined scope).
    parent: Option<ScopeId>,
    /// Total words of local variable space, known after resolution.
    variable_space: i32,
    /// Whether this scope has been resolved.
    resolved: bool,
}

/// The complete symbol table.
pub struct SymbolTable {
    /// All scopes, indexed by [`ScopeId`].
    scopes: Vec<Scope>,
    /// Stack of open scopes; the last entry is the current scope.
    open: Vec<ScopeId>,
    /// All procedure entries, indexed by [`ProcId`].
    procedures: Vec<ProcedureEntry>,
}

impl SymbolTable {
    /// Creates a symbol table holding only the predefined scope, seeded
    /// with the predefined types, constants, and operators.
    pub fn new() -> Self {
        let mut table = Self {
            scopes: vec![Scope {
                level: 0,
                symbols: Vec::new(),
                index: HashMap::new(),
                operators: HashMap::new(),
                parent: None,
                variable_space: 0,
                resolved: true,
            }],
            open: vec![ScopeId::PREDEFINED],
            procedures: Vec::new(),
        };
        table.register_predefined();
        table
    }

    /// Seeds the predefined scope.
    fn register_predefined(&mut self) {
        let span = Span::default();
        self.define_type("int", Type::Int, span).unwrap();
        self.define_type("boolean", Type::Bool, span).unwrap();
        self.define_constant("false", Type::Bool, 0, span).unwrap();
        self.define_constant("true", Type::Bool, 1, span).unwrap();

        let arith = binary_function(Type::Int, Type::Int);
        self.define_operator(Operator::Add, arith.clone());
        self.define_operator(Operator::Subtract, arith.clone());
        self.define_operator(Operator::Multiply, arith.clone());
        self.define_operator(Operator::Divide, arith);

        let relational = binary_function(Type::Int, Type::Bool);
        self.define_operator(Operator::Less, relational.clone());
        self.define_operator(Operator::LessEq, relational.clone());
        self.define_operator(Operator::Greater, relational.clone());
        self.define_operator(Operator::GreaterEq, relational);

        // Equality is overloaded; the integer form is tried first.
        let equality = Type::Intersection(vec![
            binary_function(Type::Int, Type::Bool),
            binary_function(Type::Bool, Type::Bool),
        ]);
        self.define_operator(Operator::Equal, equality.clone());
        self.define_operator(Operator::NotEqual, equality);

        self.define_operator(Operator::Negate, function(Type::Int, Type::Int));
    }

    // ========================================================================
    // Scope management
    // ========================================================================

    /// Opens a fresh scope as a child of the current one, at the next
    /// static level, and makes it current.
    pub fn enter_scope(&mut self) -> ScopeId {
        let parent = self.current_scope();
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            level: self.scopes[parent.0].level + 1,
            symbols: Vec::new(),
            index: HashMap::new(),
            operators: HashMap::new(),
            parent: Some(parent),
            variable_space: 0,
            resolved: false,
        });
        self.open.push(id);
        id
    }

    /// Leaves the current scope, returning to the one that was current
    /// before it was entered or re-entered.
    ///
    /// The predefined scope is never left.
    pub fn leave_scope(&mut self) {
        if self.open.len() > 1 {
            self.open.pop();
        }
    }

    /// Makes an existing scope current again. Used by the checker to
    /// step into a procedure's local scope created at parse time.
    pub fn reenter_scope(&mut self, scope: ScopeId) {
        self.open.push(scope);
    }

    /// Returns the current scope.
    pub fn current_scope(&self) -> ScopeId {
        *self.open.last().expect("the predefined scope is always open")
    }

    /// Returns the static level of the current scope.
    pub fn current_level(&self) -> u32 {
        self.scopes[self.current_scope().0].level
    }

    /// Returns the static level of a scope.
    pub fn level(&self, scope: ScopeId) -> u32 {
        self.scopes[scope.0].level
    }

    /// Returns the words of local variable space of a scope. Only
    /// meaningful once the scope has been resolved.
    pub fn variable_space(&self, scope: ScopeId) -> i32 {
        self.scopes[scope.0].variable_space
    }

    // ========================================================================
    // Definition
    // ========================================================================

    fn define(&mut self, symbol: Symbol) -> Result<(), SemanticError> {
        let current_scope = self.current_scope().0;
        let scope = &mut self.scopes[current_scope];
        if let Some(&existing) = scope.index.get(&symbol.name) {
            return Err(SemanticError::DuplicateDefinition {
                name: symbol.name,
                original_span: scope.symbols[existing].span,
                duplicate_span: symbol.span,
            });
        }
        scope.index.insert(symbol.name.clone(), scope.symbols.len());
        scope.symbols.push(symbol);
        Ok(())
    }

    /// Defines a named constant in the current scope.
    pub fn define_constant(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        value: i32,
        span: Span,
    ) -> Result<(), SemanticError> {
        self.define(Symbol {
            name: name.into(),
            kind: SymbolKind::Constant { ty, value },
            span,
        })
    }

    /// Defines a variable in the current scope. Its frame offset is
    /// assigned when the scope is resolved.
    pub fn define_variable(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        span: Span,
    ) -> Result<(), SemanticError> {
        let level = self.current_level();
        self.define(Symbol {
            name: name.into(),
            kind: SymbolKind::Variable {
                ty,
                level,
                offset: 0,
            },
            span,
        })
    }

    /// Defines a type alias in the current scope.
    pub fn define_type(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        span: Span,
    ) -> Result<(), SemanticError> {
        self.define(Symbol {
            name: name.into(),
            kind: SymbolKind::TypeAlias(ty),
            span,
        })
    }

    /// Defines a procedure in the current scope, creating its local
    /// scope one level below and its entry record. The current scope is
    /// unchanged afterwards; re-enter the returned entry's scope to
    /// populate its locals.
    pub fn define_procedure(
        &mut self,
        name: impl Into<String>,
        span: Span,
    ) -> Result<ProcId, SemanticError> {
        let name = name.into();
        let scope = self.enter_scope();
        self.leave_scope();
        let proc = ProcId(self.procedures.len());
        self.procedures.push(ProcedureEntry {
            name: name.clone(),
            scope,
            level: self.scopes[scope.0].level,
        });
        self.define(Symbol {
            name,
            kind: SymbolKind::Procedure(proc),
            span,
        })?;
        Ok(proc)
    }

    /// Defines an operator signature in the current scope.
    pub fn define_operator(&mut self, op: Operator, ty: Type) {
        let current_scope = self.current_scope().0;
        let scope = &mut self.scopes[current_scope];
        scope.operators.insert(op, ty);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Looks up a symbol by name, walking parent scopes from the current
    /// one.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut scope = Some(self.current_scope());
        while let Some(id) = scope {
            let s = &self.scopes[id.0];
            if let Some(&i) = s.index.get(name) {
                return Some(&s.symbols[i]);
            }
            scope = s.parent;
        }
        None
    }

    /// Looks up a type alias by name, walking parent scopes.
    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        match self.lookup(name) {
            Some(Symbol {
                kind: SymbolKind::TypeAlias(ty),
                ..
            }) => Some(ty),
            _ => None,
        }
    }

    /// Looks up an operator's signature, walking parent scopes. The
    /// operator namespace is separate from the value namespace.
    pub fn lookup_operator(&self, op: Operator) -> Option<&Type> {
        let mut scope = Some(self.current_scope());
        while let Some(id) = scope {
            let s = &self.scopes[id.0];
            if let Some(ty) = s.operators.get(&op) {
                return Some(ty);
            }
            scope = s.parent;
        }
        None
    }

    /// Returns the entry record of a procedure.
    pub fn procedure(&self, proc: ProcId) -> &ProcedureEntry {
        &self.procedures[proc.0]
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves the current scope: grounds every entry's type and lays
    /// out variable offsets sequentially in declaration order,
    /// accumulating the scope's variable space.
    ///
    /// Applied once per scope before its body is checked; later calls
    /// are no-ops. Named aliases survive only inside pointer targets,
    /// which is what allows recursive record declarations.
    pub fn resolve_scope(&mut self) -> Vec<SemanticError> {
        let scope = self.current_scope();
        if self.scopes[scope.0].resolved {
            return Vec::new();
        }
        let mut errors = Vec::new();
        let mut space = 0;
        for i in 0..self.scopes[scope.0].symbols.len() {
            let symbol = self.scopes[scope.0].symbols[i].clone();
            let kind = match symbol.kind {
                SymbolKind::Variable { ty, level, .. } => {
                    let ty = self.ground(&ty, symbol.span, &mut errors);
                    let offset = space;
                    space += ty.space();
                    SymbolKind::Variable { ty, level, offset }
                }
                SymbolKind::Constant { ty, value } => SymbolKind::Constant {
                    ty: self.ground(&ty, symbol.span, &mut errors),
                    value,
                },
                SymbolKind::TypeAlias(ty) => {
                    SymbolKind::TypeAlias(self.ground(&ty, symbol.span, &mut errors))
                }
                kind @ SymbolKind::Procedure(_) => kind,
            };
            self.scopes[scope.0].symbols[i].kind = kind;
        }
        self.scopes[scope.0].variable_space = space;
        self.scopes[scope.0].resolved = true;
        errors
    }

    /// Grounds a type, replacing named aliases by their definitions
    /// everywhere except inside pointer targets.
    fn ground(&self, ty: &Type, span: Span, errors: &mut Vec<SemanticError>) -> Type {
        let mut seen = Vec::new();
        self.ground_inner(ty, span, errors, &mut seen)
    }

    fn ground_inner(
        &self,
        ty: &Type,
        span: Span,
        errors: &mut Vec<SemanticError>,
        seen: &mut Vec<String>,
    ) -> Type {
        match ty {
            Type::Named(name) => {
                if seen.iter().any(|s| s == name) {
                    errors.push(SemanticError::CircularType {
                        name: name.clone(),
                        span,
                    });
                    return Type::Error;
                }
                match self.lookup_type(name) {
                    Some(resolved) => {
                        let resolved = resolved.clone();
                        seen.push(name.clone());
                        let ty = self.ground_inner(&resolved, span, errors, seen);
                        seen.pop();
                        ty
                    }
                    None => {
                        errors.push(SemanticError::UndefinedType {
                            name: name.clone(),
                            span,
                        });
                        Type::Error
                    }
                }
            }
            Type::Subrange {
                lower,
                upper,
                base,
            } => Type::Subrange {
                lower: *lower,
                upper: *upper,
                base: Box::new(self.ground_inner(base, span, errors, seen)),
            },
            Type::Reference(base) => Type::Reference(Box::new(self.ground_inner(
                base, span, errors, seen,
            ))),
            Type::Record(record) => Type::Record(RecordType {
                name: record.name.clone(),
                fields: record
                    .fields
                    .iter()
                    .map(|f| crate::semantic::types::Field {
                        name: f.name.clone(),
                        ty: self.ground_inner(&f.ty, span, errors, seen),
                    })
                    .collect(),
            }),
            // Pointer targets stay symbolic; they are looked up on
            // demand when the pointer is dereferenced.
            other => other.clone(),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
