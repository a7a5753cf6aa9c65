// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type expression model.
//!
//! [`TypeExpr`] is the static shape read from the schema: type applications, natural-number
//! constants, references to combinator-local variables, and repeated tuples. [`ResultTree`] is its
//! runtime mirror with every variable resolved; store programs build one for the function being
//! called and fetch programs check the response against it.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Application is written without its wire tag.
pub const FLAG_BARE: u32 = 1 << 0;
/// Constructor name is not reported when a value of this type is fetched.
pub const FLAG_NOCONS: u32 = 1 << 1;
/// Implicit argument (`{t:Type}`), bound by unification rather than stored.
pub const FLAG_OPT_VAR: u32 = 1 << 17;
/// Exclamation argument (`!X`): a nested function call.
pub const FLAG_EXCL: u32 = 1 << 18;
/// Argument presence is gated by a bit of an earlier `#` variable.
pub const FLAG_OPT_FIELD: u32 = 1 << 20;
/// Expression does not depend on any variable.
pub const FLAG_NOVAR: u32 = 1 << 21;
/// Type falls back to its last constructor when the wire tag matches none.
pub const FLAG_DEFAULT_CONSTRUCTOR: u32 = 1 << 25;
/// Flags that survive into result trees.
pub const FLAGS_MASK: u32 = (1 << 16) - 1;

/// Handle of a type in a [`Schema`](crate::schema::Schema).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Arena index of this type.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a constructor or function in a [`Schema`](crate::schema::Schema).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombinatorId(pub u32);

impl CombinatorId {
    /// Arena index of this combinator.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static type expression.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    /// `target child0 child1 ...`; `children.len()` equals the target's arity.
    Apply {
        /// Applied type.
        target: TypeId,
        /// `FLAG_*` bits (`FLAG_BARE`, `FLAG_NOVAR`, ...).
        flags: u32,
        /// Type or natural-number arguments.
        children: Vec<TypeExpr>,
    },
    /// Literal natural number.
    NatConst(i32),
    /// Natural-number variable, read as its bound value plus `diff`.
    NatVar {
        /// Combinator-local slot.
        var: u32,
        /// Constant offset.
        diff: i32,
    },
    /// Type variable.
    TypeVar {
        /// Combinator-local slot.
        var: u32,
        /// `FLAG_*` bits of the reference.
        flags: u32,
    },
    /// Repeated tuple `multiplicity * [fields]`.
    Array {
        /// Repetition count, a `NatConst` or `NatVar`.
        multiplicity: Box<TypeExpr>,
        /// Named tuple fields.
        fields: Vec<Arg>,
        /// `FLAG_*` bits.
        flags: u32,
    },
}

impl TypeExpr {
    /// Returns `true` when the expression references no variable.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Apply { flags, .. } | Self::Array { flags, .. } => flags & FLAG_NOVAR != 0,
            Self::NatConst(_) => true,
            Self::NatVar { .. } | Self::TypeVar { .. } => false,
        }
    }

    /// Returns `true` when the expression is written without a wire tag.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        match self {
            Self::Apply { flags, .. } | Self::TypeVar { flags, .. } | Self::Array { flags, .. } => {
                flags & FLAG_BARE != 0
            }
            Self::NatConst(_) | Self::NatVar { .. } => false,
        }
    }

    /// Field names of an array expression.
    pub(crate) fn field_names(fields: &[Arg]) -> Arc<[Box<str>]> {
        fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Combinator argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Arg {
    /// Field name; may be empty for anonymous fields.
    pub name: Box<str>,
    /// Normalized `FLAG_*` bits.
    pub flags: u32,
    /// Variable slot this argument binds (for `#`- and `Type`-typed arguments).
    pub var: Option<u32>,
    /// `(variable, bit)` gating presence of an optional argument.
    pub exist: Option<(u32, u32)>,
    /// Argument type.
    pub ty: TypeExpr,
}

impl Arg {
    /// Returns `true` for implicit arguments that never appear on the wire.
    #[inline]
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.flags & FLAG_OPT_VAR != 0
    }

    /// Returns `true` for exclamation (nested function) arguments.
    #[inline]
    #[must_use]
    pub fn is_exclamation(&self) -> bool {
        self.flags & FLAG_EXCL != 0
    }
}

/// Resolved type witness.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResultTree {
    /// Type application with resolved arguments.
    Type {
        /// Applied type.
        ty: TypeId,
        /// Written without a wire tag.
        bare: bool,
        /// Resolved arguments.
        children: Vec<ResultTree>,
    },
    /// Resolved natural number.
    Nat(i32),
    /// Repeated tuple.
    Array {
        /// Resolved repetition count.
        multiplicity: Box<ResultTree>,
        /// Tuple field names.
        names: Arc<[Box<str>]>,
        /// Resolved field types, parallel to `names`.
        fields: Vec<ResultTree>,
    },
}

impl ResultTree {
    /// Resolves an expression that references no variables.
    ///
    /// Returns `None` if any part of `expr` depends on a variable.
    #[must_use]
    pub fn from_closed(expr: &TypeExpr) -> Option<Self> {
        match expr {
            TypeExpr::Apply {
                target,
                flags,
                children,
            } => Some(Self::Type {
                ty: *target,
                bare: flags & FLAG_BARE != 0,
                children: children
                    .iter()
                    .map(Self::from_closed)
                    .collect::<Option<_>>()?,
            }),
            TypeExpr::NatConst(n) => Some(Self::Nat(*n)),
            TypeExpr::Array {
                multiplicity,
                fields,
                ..
            } => Some(Self::Array {
                multiplicity: Box::new(Self::from_closed(multiplicity)?),
                names: TypeExpr::field_names(fields),
                fields: fields
                    .iter()
                    .map(|f| Self::from_closed(&f.ty))
                    .collect::<Option<_>>()?,
            }),
            TypeExpr::NatVar { .. } | TypeExpr::TypeVar { .. } => None,
        }
    }

    /// Applies `ty` to `children` as a boxed application.
    #[must_use]
    pub fn apply(ty: TypeId, children: Vec<Self>) -> Self {
        Self::Type {
            ty,
            bare: false,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn int() -> TypeExpr {
        TypeExpr::Apply {
            target: TypeId(1),
            flags: FLAG_BARE | FLAG_NOVAR,
            children: vec![],
        }
    }

    #[test]
    fn closed_expression_resolves() {
        let vec_of_int = TypeExpr::Apply {
            target: TypeId(2),
            flags: FLAG_NOVAR,
            children: vec![int()],
        };
        assert!(vec_of_int.is_closed());
        assert_eq!(
            ResultTree::from_closed(&vec_of_int),
            Some(ResultTree::apply(
                TypeId(2),
                vec![ResultTree::Type {
                    ty: TypeId(1),
                    bare: true,
                    children: vec![]
                }]
            ))
        );
    }

    #[test]
    fn variables_block_resolution() {
        let open = TypeExpr::Apply {
            target: TypeId(2),
            flags: 0,
            children: vec![TypeExpr::TypeVar { var: 0, flags: 0 }],
        };
        assert!(!open.is_closed());
        assert_eq!(ResultTree::from_closed(&open), None);
    }

    #[test]
    fn array_trees_compare_names() {
        let a = TypeExpr::Array {
            multiplicity: Box::new(TypeExpr::NatConst(2)),
            fields: vec![Arg {
                name: "x".into(),
                flags: FLAG_NOVAR,
                var: None,
                exist: None,
                ty: int(),
            }],
            flags: FLAG_NOVAR,
        };
        let mut b = a.clone();
        if let TypeExpr::Array { fields, .. } = &mut b {
            fields[0].name = "y".into();
        }
        assert_ne!(ResultTree::from_closed(&a), ResultTree::from_closed(&b));
    }
}
