//! Type system for PL0 semantic analysis.
//!
//! This module defines the internal type representation used during type
//! checking, together with the implicit-coercion machinery the checker
//! relies on to rewrite the tree.
//!
//! # PL0 Type System Overview
//!
//! - `int` and `boolean` are the predefined scalars.
//! - A subrange `lo..hi` widens to its base type for free and narrows
//!   from it under a runtime bounds check.
//! - An assignable location has a *reference* type `ref(T)`; using it
//!   where a value is needed inserts a dereference.
//! - Operators have function types; an overloaded operator has an
//!   intersection of function types, tried in declaration order.
//! - `error` absorbs every coercion in both directions so that one
//!   diagnostic does not cascade.
//!
//! # Implicit Coercions
//!
//! The checker may insert, per expression, at most a short chain of
//! nodes: a dereference, then a widen, then (only where a checked
//! conversion is allowed) a narrow. [`Type::coerce_to_type`] is the
//! narrow-free variant used when probing the members of an intersection
//! type; [`Type::coerce_exp`] additionally falls back to a runtime-checked
//! narrow when the target is a subrange.

use std::fmt;

use thiserror::Error;

use crate::semantic::typed_ir::{TypedExpr, TypedExprKind};

/// Internal type representation for semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// The predefined integer type.
    Int,
    /// The predefined boolean type.
    Bool,

    /// An integer subrange `lower..upper` over `base`.
    Subrange {
        lower: i32,
        upper: i32,
        base: Box<Type>,
    },

    /// The type of an assignable location holding a value of the base
    /// type. Every variable reference initially has this type.
    Reference(Box<Type>),

    /// The signature of an operator or procedure: argument to result.
    Function { arg: Box<Type>, result: Box<Type> },

    /// The type of an argument list.
    Product(Vec<Type>),

    /// A record with ordered, named fields.
    Record(RecordType),

    /// A heap reference to a value of the target type.
    Pointer(Box<Type>),

    /// A not-yet-resolved reference to a named type alias. After scope
    /// resolution these survive only inside pointer targets, which is
    /// what permits recursive record declarations.
    Named(String),

    /// An ordered set of function types for an overloaded operator.
    Intersection(Vec<Type>),

    /// The absorbing error type. Using it suppresses cascading
    /// diagnostics.
    Error,
}

/// A record type: a name plus its ordered field list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    /// The declared type name, used in diagnostics.
    pub name: String,
    /// The fields in declaration order. Names are unique.
    pub fields: Vec<Field>,
}

/// A single record field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: Type,
}

impl RecordType {
    /// Creates a record type from `(name, type)` pairs.
    pub fn new(name: impl Into<String>, fields: Vec<(String, Type)>) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(name, ty)| Field { name, ty })
                .collect(),
        }
    }

    /// Looks up a field's type by name.
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    /// Returns the word offset of a field within the record value.
    pub fn field_offset(&self, name: &str) -> Option<i32> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.ty.space();
        }
        None
    }
}

/// Failure to coerce an expression to a target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce {found} to {expected}")]
pub struct IncompatibleTypes {
    /// The target type's display name.
    pub expected: String,
    /// The source type's display name.
    pub found: String,
}

impl IncompatibleTypes {
    fn new(expected: &Type, found: &Type) -> Self {
        Self {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl Type {
    /// Returns true for the absorbing error type.
    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// The number of stack-machine words a value of this type occupies.
    ///
    /// Addresses (references, pointers) are one word; records are the sum
    /// of their fields.
    pub fn space(&self) -> i32 {
        match self {
            Type::Record(record) => record.fields.iter().map(|f| f.ty.space()).sum(),
            _ => 1,
        }
    }

    /// Returns the base type if this is a reference, otherwise the type
    /// itself. Used where the context accepts either a value or an
    /// lvalue.
    pub fn opt_dereference(&self) -> &Type {
        match self {
            Type::Reference(base) => base,
            other => other,
        }
    }

    /// Returns the underlying record type if this is (a reference to) a
    /// record.
    pub fn record_type(&self) -> Option<&RecordType> {
        match self.opt_dereference() {
            Type::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the pointee type if this is (a reference to) a pointer.
    pub fn pointer_type(&self) -> Option<&Type> {
        match self.opt_dereference() {
            Type::Pointer(target) => Some(target),
            _ => None,
        }
    }

    /// Coerces `exp` to this type without ever inserting a runtime
    /// bounds check.
    ///
    /// The permitted chain is: identity, or a dereference, or a widen, or
    /// a dereference followed by a widen. A `Product` target coerces an
    /// `Arguments` expression element-wise. Either side being `error`
    /// succeeds with the expression unchanged.
    pub fn coerce_to_type(&self, exp: &TypedExpr) -> Result<TypedExpr, IncompatibleTypes> {
        if self.is_error() || exp.ty.is_error() {
            return Ok(exp.clone());
        }
        if *self == exp.ty {
            return Ok(exp.clone());
        }
        if let Type::Product(targets) = self {
            return self.coerce_arguments(targets, exp, false);
        }

        let mut exp = exp.clone();
        if let Type::Reference(base) = &exp.ty {
            let base = (**base).clone();
            let span = exp.span;
            exp = TypedExpr::new(TypedExprKind::Dereference(Box::new(exp)), base, span);
            if *self == exp.ty {
                return Ok(exp);
            }
        }
        if let Type::Subrange { base, .. } = &exp.ty {
            let base = (**base).clone();
            let span = exp.span;
            exp = TypedExpr::new(TypedExprKind::WidenSubrange(Box::new(exp)), base, span);
            if *self == exp.ty {
                return Ok(exp);
            }
        }
        Err(IncompatibleTypes::new(self, &exp.ty))
    }

    /// Coerces `exp` to this type, inserting a runtime-checked narrow
    /// when the target is a subrange and the safe chain alone does not
    /// reach it.
    pub fn coerce_exp(&self, exp: &TypedExpr) -> Result<TypedExpr, IncompatibleTypes> {
        if self.is_error() || exp.ty.is_error() {
            return Ok(exp.clone());
        }
        if let Type::Product(targets) = self {
            return self.coerce_arguments(targets, exp, true);
        }
        match self.coerce_to_type(exp) {
            Ok(exp) => Ok(exp),
            Err(err) => {
                if let Type::Subrange { base, .. } = self {
                    let inner = base.coerce_to_type(exp)?;
                    let span = inner.span;
                    Ok(TypedExpr::new(
                        TypedExprKind::NarrowSubrange(Box::new(inner)),
                        self.clone(),
                        span,
                    ))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Element-wise coercion of an argument list to a product type.
    fn coerce_arguments(
        &self,
        targets: &[Type],
        exp: &TypedExpr,
        narrow: bool,
    ) -> Result<TypedExpr, IncompatibleTypes> {
        let TypedExprKind::Arguments(args) = &exp.kind else {
            return Err(IncompatibleTypes::new(self, &exp.ty));
        };
        if targets.len() != args.len() {
            return Err(IncompatibleTypes::new(self, &exp.ty));
        }
        let coerced = targets
            .iter()
            .zip(args)
            .map(|(target, arg)| {
                if narrow {
                    target.coerce_exp(arg)
                } else {
                    target.coerce_to_type(arg)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypedExpr::new(
            TypedExprKind::Arguments(coerced),
            self.clone(),
            exp.span,
        ))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "boolean"),
            Type::Subrange { lower, upper, .. } => write!(f, "{}..{}", lower, upper),
            Type::Reference(base) => write!(f, "ref({})", base),
            Type::Function { arg, result } => write!(f, "({} -> {})", arg, result),
            Type::Product(types) => {
                write!(f, "(")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            Type::Record(record) => write!(f, "{}", record.name),
            Type::Pointer(target) => write!(f, "^{}", target),
            Type::Named(name) => write!(f, "{}", name),
            Type::Intersection(types) => {
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                Ok(())
            }
            Type::Error => write!(f, "error"),
        }
    }
}

/// Builds the subrange `lower..upper` over `int`.
pub fn subrange(lower: i32, upper: i32) -> Type {
    Type::Subrange {
        lower,
        upper,
        base: Box::new(Type::Int),
    }
}

/// Builds `ref(base)`.
pub fn reference(base: Type) -> Type {
    Type::Reference(Box::new(base))
}

/// Builds the function type `arg -> result`.
pub fn function(arg: Type, result: Type) -> Type {
    Type::Function {
        arg: Box::new(arg),
        result: Box::new(result),
    }
}

/// Builds the signature of a binary operator over `operand` values.
pub fn binary_function(operand: Type, result: Type) -> Type {
    function(Type::Product(vec![operand.clone(), operand]), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn int_exp(value: i32) -> TypedExpr {
        TypedExpr::new(TypedExprKind::Const { value }, Type::Int, Span::new(0, 1))
    }

    fn var_exp(ty: Type) -> TypedExpr {
        TypedExpr::new(
            TypedExprKind::Variable {
                level: 1,
                offset: 0,
            },
            reference(ty),
            Span::new(0, 1),
        )
    }

    #[test]
    fn test_space() {
        assert_eq!(Type::Int.space(), 1);
        assert_eq!(subrange(1, 10).space(), 1);
        assert_eq!(Type::Pointer(Box::new(Type::Int)).space(), 1);
        let record = Type::Record(RecordType::new(
            "r",
            vec![
                ("a".to_string(), Type::Int),
                ("b".to_string(), subrange(1, 10)),
            ],
        ));
        assert_eq!(record.space(), 2);
    }

    #[test]
    fn test_field_offsets() {
        let record = RecordType::new(
            "r",
            vec![
                ("a".to_string(), Type::Int),
                ("b".to_string(), Type::Int),
                ("c".to_string(), Type::Bool),
            ],
        );
        assert_eq!(record.field_offset("a"), Some(0));
        assert_eq!(record.field_offset("b"), Some(1));
        assert_eq!(record.field_offset("c"), Some(2));
        assert_eq!(record.field_offset("d"), None);
    }

    #[test]
    fn test_identity_coercion() {
        let exp = int_exp(3);
        let coerced = Type::Int.coerce_to_type(&exp).unwrap();
        assert!(matches!(coerced.kind, TypedExprKind::Const { value: 3 }));
    }

    #[test]
    fn test_dereference_insertion() {
        let exp = var_exp(Type::Int);
        let coerced = Type::Int.coerce_to_type(&exp).unwrap();
        assert!(matches!(coerced.kind, TypedExprKind::Dereference(_)));
        assert_eq!(coerced.ty, Type::Int);
    }

    #[test]
    fn test_dereference_then_widen() {
        let exp = var_exp(subrange(1, 10));
        let coerced = Type::Int.coerce_to_type(&exp).unwrap();
        let TypedExprKind::WidenSubrange(inner) = &coerced.kind else {
            panic!("expected widen, got {:?}", coerced.kind);
        };
        assert!(matches!(inner.kind, TypedExprKind::Dereference(_)));
        assert_eq!(coerced.ty, Type::Int);
    }

    #[test]
    fn test_narrow_insertion() {
        let target = subrange(1, 10);
        let coerced = target.coerce_exp(&int_exp(3)).unwrap();
        assert!(matches!(coerced.kind, TypedExprKind::NarrowSubrange(_)));
        assert_eq!(coerced.ty, target);
    }

    #[test]
    fn test_no_narrow_in_safe_coercion() {
        let target = subrange(1, 10);
        assert!(target.coerce_to_type(&int_exp(3)).is_err());
    }

    #[test]
    fn test_widen_then_narrow() {
        // A value of one subrange assigned into another goes through the
        // base type with a fresh bounds check.
        let source = TypedExpr::new(
            TypedExprKind::Const { value: 5 },
            subrange(1, 20),
            Span::new(0, 1),
        );
        let target = subrange(1, 10);
        let coerced = target.coerce_exp(&source).unwrap();
        let TypedExprKind::NarrowSubrange(inner) = &coerced.kind else {
            panic!("expected narrow, got {:?}", coerced.kind);
        };
        assert!(matches!(inner.kind, TypedExprKind::WidenSubrange(_)));
    }

    #[test]
    fn test_error_absorbs_both_ways() {
        let exp = int_exp(3);
        assert!(Type::Error.coerce_exp(&exp).is_ok());

        let error_exp = TypedExpr::new(TypedExprKind::ErrorExp, Type::Error, Span::new(0, 1));
        assert!(Type::Bool.coerce_exp(&error_exp).is_ok());
    }

    #[test]
    fn test_incompatible() {
        let err = Type::Bool.coerce_exp(&int_exp(3)).unwrap_err();
        assert_eq!(err.expected, "boolean");
        assert_eq!(err.found, "int");
    }

    #[test]
    fn test_product_coercion() {
        let args = TypedExpr::new(
            TypedExprKind::Arguments(vec![var_exp(Type::Int), int_exp(2)]),
            Type::Product(vec![reference(Type::Int), Type::Int]),
            Span::new(0, 5),
        );
        let target = Type::Product(vec![Type::Int, Type::Int]);
        let coerced = target.coerce_to_type(&args).unwrap();
        assert_eq!(coerced.ty, target);
        let TypedExprKind::Arguments(elems) = &coerced.kind else {
            panic!("expected arguments node");
        };
        assert!(matches!(elems[0].kind, TypedExprKind::Dereference(_)));
        assert!(matches!(elems[1].kind, TypedExprKind::Const { value: 2 }));
    }

    #[test]
    fn test_product_arity_mismatch() {
        let args = TypedExpr::new(
            TypedExprKind::Arguments(vec![int_exp(1)]),
            Type::Product(vec![Type::Int]),
            Span::new(0, 1),
        );
        let target = Type::Product(vec![Type::Int, Type::Int]);
        assert!(target.coerce_to_type(&args).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::Bool.to_string(), "boolean");
        assert_eq!(subrange(1, 10).to_string(), "1..10");
        assert_eq!(reference(Type::Int).to_string(), "ref(int)");
        assert_eq!(
            binary_function(Type::Int, Type::Bool).to_string(),
            "((int * int) -> boolean)"
        );
        assert_eq!(Type::Pointer(Box::new(Type::Named("list".into()))).to_string(), "^list");
    }
}
