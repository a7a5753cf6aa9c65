// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loaded TL schema: types, constructors and functions.
//!
//! A [`Schema`] is immutable once loaded. The only interior mutability is the per-combinator
//! program cache: [`Schema::programs`] compiles a combinator on first use and publishes the result
//! atomically, so a schema can be shared across threads and every caller observes the same
//! programs.

mod builder;
mod loader;
pub mod tags;

pub use builder::{ArgDecl, CombinatorDecl, ExprDecl, SchemaBuilder, SchemaVersion, TypeDecl};
pub use builder::prelude;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use once_cell::race::OnceBox;

use crate::compile::{self, CompileError, CompiledCombinator};
use crate::expr::{Arg, CombinatorId, FLAG_DEFAULT_CONSTRUCTOR, FLAG_NOCONS, ResultTree, TypeExpr, TypeId};
use crate::wire::DecodeError;

/// Errors produced while loading a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// The buffer ended early or held a malformed string.
    Decode(DecodeError),
    /// The header tag names no supported schema version.
    BadVersionTag(u32),
    /// A record tag was not the one the format requires here.
    UnexpectedTag {
        /// What was being read.
        context: &'static str,
        /// Tag found on the wire.
        found: u32,
    },
    /// A count or arity was negative.
    NegativeCount(i32),
    /// A name was not valid UTF-8.
    InvalidName,
    /// A record referenced a type id that was never declared.
    UnknownType(i32),
    /// Two types share a wire id.
    DuplicateType(i32),
    /// Two functions share a wire id.
    DuplicateFunction(i32),
    /// A type application's argument count differs from the type's arity.
    ArityMismatch {
        /// Applied type.
        ty: Box<str>,
        /// Declared arity.
        expected: u32,
        /// Arity found in the expression.
        found: i32,
    },
    /// A variable index or presence bit is out of range.
    BadVariable(i32),
    /// Expressions are nested deeper than the loader accepts.
    TooDeep,
    /// `ReqResult` is missing or does not take exactly one parameter.
    MissingReqResult,
    /// A type declares a different number of constructors than the schema provides.
    ConstructorCountMismatch {
        /// Offending type.
        ty: Box<str>,
        /// Declared count.
        declared: u32,
        /// Constructors actually attached.
        found: usize,
    },
    /// Bytes remain after the last function record.
    TrailingData(usize),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "schema decode error: {e}"),
            Self::BadVersionTag(tag) => write!(f, "unsupported schema version tag {tag:#010x}"),
            Self::UnexpectedTag { context, found } => {
                write!(f, "unexpected tag {found:#010x} while reading {context}")
            }
            Self::NegativeCount(n) => write!(f, "negative count {n}"),
            Self::InvalidName => write!(f, "name is not valid UTF-8"),
            Self::UnknownType(id) => write!(f, "reference to undeclared type {id:#010x}"),
            Self::DuplicateType(id) => write!(f, "duplicate type id {id:#010x}"),
            Self::DuplicateFunction(id) => write!(f, "duplicate function id {id:#010x}"),
            Self::ArityMismatch {
                ty,
                expected,
                found,
            } => write!(f, "type {ty} takes {expected} parameters, applied to {found}"),
            Self::BadVariable(v) => write!(f, "invalid variable reference {v}"),
            Self::TooDeep => write!(f, "type expression nesting too deep"),
            Self::MissingReqResult => write!(f, "schema has no ReqResult type of arity 1"),
            Self::ConstructorCountMismatch {
                ty,
                declared,
                found,
            } => write!(
                f,
                "type {ty} declares {declared} constructors but {found} were provided"
            ),
            Self::TrailingData(n) => write!(f, "{n} trailing bytes after schema"),
        }
    }
}

impl core::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for SchemaError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// A declared type.
#[derive(Clone, Debug)]
pub struct TlType {
    /// Wire id.
    pub wire_id: i32,
    /// Type name.
    pub name: Box<str>,
    /// Number of parameters.
    pub arity: u32,
    /// `FLAG_*` bits.
    pub flags: u32,
    /// Constructors in declaration order.
    pub constructors: Vec<CombinatorId>,
}

impl TlType {
    /// Returns `true` if fetched values omit the constructor name.
    #[must_use]
    pub fn hides_constructor(&self) -> bool {
        self.flags & FLAG_NOCONS != 0
    }

    /// Returns the fallback constructor used when no tag matches, if the type has one.
    #[must_use]
    pub fn default_constructor(&self) -> Option<CombinatorId> {
        if self.flags & FLAG_DEFAULT_CONSTRUCTOR != 0 {
            self.constructors.last().copied()
        } else {
            None
        }
    }
}

/// A constructor or function.
pub struct Combinator {
    /// Wire tag.
    pub wire_id: i32,
    /// Name (`"_"` for anonymous constructors, which never write their tag).
    pub name: Box<str>,
    /// Number of local variable slots.
    pub var_count: u32,
    /// Owning type for constructors; `None` for functions.
    pub owner: Option<TypeId>,
    /// Arguments in declaration order.
    pub args: Vec<Arg>,
    /// Result type.
    pub result: TypeExpr,
    handle: CombinatorId,
    programs: OnceBox<CompiledCombinator>,
}

impl Combinator {
    /// Handle of this combinator in its schema.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> CombinatorId {
        self.handle
    }

    /// Returns `true` for functions (combinators without an owning type).
    #[inline]
    #[must_use]
    pub const fn is_function(&self) -> bool {
        self.owner.is_none()
    }

    /// Returns `true` once the store and fetch programs have been built.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.programs.get().is_some()
    }
}

impl fmt::Debug for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combinator")
            .field("wire_id", &format_args!("{:#010x}", self.wire_id))
            .field("name", &self.name)
            .field("var_count", &self.var_count)
            .field("owner", &self.owner)
            .field("args", &self.args)
            .field("result", &self.result)
            .field("handle", &self.handle)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// A loaded schema.
#[derive(Debug)]
pub struct Schema {
    version: u32,
    schema_version: i32,
    date: i32,
    types: Vec<TlType>,
    combinators: Vec<Combinator>,
    functions: Vec<CombinatorId>,
    type_by_wire_id: HashMap<i32, TypeId>,
    type_by_name: HashMap<Box<str>, TypeId>,
    function_by_wire_id: HashMap<i32, CombinatorId>,
    function_by_name: HashMap<Box<str>, CombinatorId>,
    constructor_by_name: HashMap<Box<str>, CombinatorId>,
    req_result: TypeId,
    compile_count: AtomicUsize,
}

impl Schema {
    /// Format version of the schema (2 or 3).
    #[must_use]
    pub const fn format_version(&self) -> u32 {
        self.version
    }

    /// Version number recorded by the schema producer.
    #[must_use]
    pub const fn schema_version(&self) -> i32 {
        self.schema_version
    }

    /// Build date recorded by the schema producer.
    #[must_use]
    pub const fn date(&self) -> i32 {
        self.date
    }

    /// All types in declaration order.
    pub fn types(&self) -> impl ExactSizeIterator<Item = &TlType> {
        self.types.iter()
    }

    /// All functions in declaration order.
    pub fn functions(&self) -> impl ExactSizeIterator<Item = &Combinator> {
        self.functions
            .iter()
            .map(|&id| &self.combinators[id.index()])
    }

    /// Looks up a type by handle.
    #[inline]
    #[must_use]
    pub fn ty(&self, id: TypeId) -> Option<&TlType> {
        self.types.get(id.index())
    }

    /// Looks up a type by wire id.
    #[must_use]
    pub fn type_by_wire_id(&self, wire_id: i32) -> Option<TypeId> {
        self.type_by_wire_id.get(&wire_id).copied()
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.type_by_name.get(name).copied()
    }

    /// Looks up a combinator by handle.
    #[inline]
    #[must_use]
    pub fn combinator(&self, id: CombinatorId) -> Option<&Combinator> {
        self.combinators.get(id.index())
    }

    /// Looks up a function by wire id.
    #[must_use]
    pub fn function_by_wire_id(&self, wire_id: i32) -> Option<CombinatorId> {
        self.function_by_wire_id.get(&wire_id).copied()
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<CombinatorId> {
        self.function_by_name.get(name).copied()
    }

    /// Looks up a constructor by name.
    #[must_use]
    pub fn constructor_by_name(&self, name: &str) -> Option<CombinatorId> {
        self.constructor_by_name.get(name).copied()
    }

    /// The `ReqResult` type every function response is wrapped in.
    #[must_use]
    pub const fn req_result(&self) -> TypeId {
        self.req_result
    }

    /// Wraps a function's result witness in `ReqResult`.
    #[must_use]
    pub fn wrap_response(&self, result: ResultTree) -> ResultTree {
        ResultTree::apply(self.req_result, alloc::vec![result])
    }

    /// Returns the compiled programs of `id`, building them on first use.
    ///
    /// Failed compilations are not cached; later calls report the same error again.
    pub fn programs(&self, id: CombinatorId) -> Result<&CompiledCombinator, CompileError> {
        let comb = self
            .combinator(id)
            .ok_or(CompileError::UnknownCombinator(id))?;
        comb.programs.get_or_try_init(|| {
            self.compile_count.fetch_add(1, Ordering::Relaxed);
            compile::compile_combinator(self, comb).map(Box::new)
        })
    }

    /// Number of combinator compilations performed so far.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compile_count.load(Ordering::Relaxed)
    }

    /// Renders a witness with type names, for diagnostics.
    #[must_use]
    pub fn display_tree<'a>(&'a self, tree: &'a ResultTree) -> TreeDisplay<'a> {
        TreeDisplay { schema: self, tree }
    }
}

/// [`fmt::Display`] adapter returned by [`Schema::display_tree`].
#[derive(Debug)]
pub struct TreeDisplay<'a> {
    schema: &'a Schema,
    tree: &'a ResultTree,
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tree {
            ResultTree::Type { ty, bare, children } => {
                if *bare {
                    write!(f, "%")?;
                }
                match self.schema.ty(*ty) {
                    Some(t) => write!(f, "{}", t.name)?,
                    None => write!(f, "<type {}>", ty.0)?,
                }
                if !children.is_empty() {
                    write!(f, "<")?;
                    for (i, c) in children.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.schema.display_tree(c))?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            ResultTree::Nat(n) => write!(f, "{n}"),
            ResultTree::Array {
                multiplicity,
                names,
                fields,
            } => {
                write!(f, "{} * [", self.schema.display_tree(multiplicity))?;
                for (i, (name, ty)) in names.iter().zip(fields).enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{name}:{}", self.schema.display_tree(ty))?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn trees_render_with_type_names() {
        let schema =
            Schema::load(&SchemaBuilder::with_prelude(SchemaVersion::V3).build().unwrap()).unwrap();
        let int = schema.type_by_name("Int").unwrap();
        let vector = schema.type_by_name("Vector").unwrap();
        let tree = ResultTree::apply(
            vector,
            vec![ResultTree::Type {
                ty: int,
                bare: true,
                children: Vec::new(),
            }],
        );
        assert_eq!(schema.display_tree(&tree).to_string(), "Vector<%Int>");
        assert_eq!(
            schema.display_tree(&schema.wrap_response(tree)).to_string(),
            "ReqResult<Vector<%Int>>"
        );
    }
}
