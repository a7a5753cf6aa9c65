// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Programmatic schema encoder.
//!
//! [`SchemaBuilder`] writes the same binary format that [`Schema::load`](super::Schema::load)
//! reads. It is meant for tests, benchmarks and tooling that need a schema without running an
//! external TL compiler. Argument flags are given in the normalized in-memory layout
//! (`FLAG_OPT_FIELD`, `FLAG_OPT_VAR`, ...); the builder packs them for the selected version.

use alloc::string::String;
use alloc::vec::Vec;

use super::tags::{
    ArgFlagLayout, TLS_ARG_V2, TLS_ARRAY, TLS_COMBINATOR, TLS_COMBINATOR_LEFT,
    TLS_COMBINATOR_LEFT_BUILTIN, TLS_COMBINATOR_RIGHT_V2, TLS_EXPR_NAT, TLS_EXPR_TYPE,
    TLS_NAT_CONST, TLS_NAT_VAR, TLS_SCHEMA_V2, TLS_SCHEMA_V3, TLS_TYPE, TLS_TYPE_EXPR,
    TLS_TYPE_VAR,
};
use crate::expr::{FLAG_BARE, FLAG_EXCL, FLAG_OPT_FIELD, FLAG_OPT_VAR};
use crate::ids::{ID_VAR_NUM, ID_VAR_TYPE};
use crate::wire::{EncodeError, WireWriter};

/// Schema format version to emit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Version 2 flag layout.
    V2,
    /// Version 3 flag layout.
    V3,
}

impl SchemaVersion {
    const fn number(self) -> u32 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    const fn tag(self) -> u32 {
        match self {
            Self::V2 => TLS_SCHEMA_V2,
            Self::V3 => TLS_SCHEMA_V3,
        }
    }
}

/// Type declaration.
#[derive(Clone, Debug)]
pub struct TypeDecl {
    /// Wire id.
    pub wire_id: i32,
    /// Name.
    pub name: String,
    /// Parameter count.
    pub arity: u32,
    /// `FLAG_*` bits.
    pub flags: u32,
    /// Constructor count to declare; `None` counts the constructors actually added.
    pub declared_constructors: Option<u32>,
}

impl TypeDecl {
    /// Declares a type with no flags.
    #[must_use]
    pub fn new(wire_id: i32, name: &str, arity: u32) -> Self {
        Self {
            wire_id,
            name: name.into(),
            arity,
            flags: 0,
            declared_constructors: None,
        }
    }

    /// Adds `FLAG_*` bits.
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Overrides the declared constructor count.
    #[must_use]
    pub fn declared_constructors(mut self, n: u32) -> Self {
        self.declared_constructors = Some(n);
        self
    }
}

/// Expression declaration.
#[derive(Clone, Debug)]
pub enum ExprDecl {
    /// Type application by type wire id.
    Type {
        /// Applied type.
        type_wire_id: i32,
        /// `FLAG_*` bits.
        flags: u32,
        /// Arguments.
        children: Vec<ExprDecl>,
    },
    /// Type variable.
    TypeVar {
        /// Slot.
        var: i32,
        /// `FLAG_*` bits.
        flags: u32,
    },
    /// Natural-number constant.
    NatConst(i32),
    /// Natural-number variable plus offset.
    NatVar {
        /// Slot.
        var: i32,
        /// Offset.
        diff: i32,
    },
    /// Repeated tuple.
    Array {
        /// Repetition count (`NatConst` or `NatVar`).
        multiplicity: alloc::boxed::Box<ExprDecl>,
        /// Tuple fields.
        fields: Vec<ArgDecl>,
    },
}

impl ExprDecl {
    /// Boxed application of a parameterless type.
    #[must_use]
    pub fn ty(type_wire_id: i32) -> Self {
        Self::apply(type_wire_id, Vec::new())
    }

    /// Bare application of a parameterless type.
    #[must_use]
    pub fn bare(type_wire_id: i32) -> Self {
        Self::Type {
            type_wire_id,
            flags: FLAG_BARE,
            children: Vec::new(),
        }
    }

    /// Boxed application with arguments.
    #[must_use]
    pub fn apply(type_wire_id: i32, children: Vec<Self>) -> Self {
        Self::Type {
            type_wire_id,
            flags: 0,
            children,
        }
    }

    /// Boxed reference to a type variable.
    #[must_use]
    pub fn var(var: i32) -> Self {
        Self::TypeVar { var, flags: 0 }
    }

    /// Repeated tuple `multiplicity * [fields]`.
    #[must_use]
    pub fn array(multiplicity: Self, fields: Vec<ArgDecl>) -> Self {
        Self::Array {
            multiplicity: alloc::boxed::Box::new(multiplicity),
            fields,
        }
    }
}

/// Argument declaration.
#[derive(Clone, Debug)]
pub struct ArgDecl {
    /// Field name.
    pub name: String,
    /// Normalized `FLAG_*` bits.
    pub flags: u32,
    /// Variable slot bound by this argument.
    pub var: Option<i32>,
    /// `(variable, bit)` gating presence.
    pub exist: Option<(i32, i32)>,
    /// Argument type.
    pub ty: ExprDecl,
}

impl ArgDecl {
    /// Plain argument.
    #[must_use]
    pub fn new(name: &str, ty: ExprDecl) -> Self {
        Self {
            name: name.into(),
            flags: 0,
            var: None,
            exist: None,
            ty,
        }
    }

    /// Implicit type parameter `{name:Type}` bound to slot `var`.
    #[must_use]
    pub fn implicit(name: &str, var: i32) -> Self {
        Self {
            flags: FLAG_OPT_VAR,
            var: Some(var),
            ..Self::new(name, ExprDecl::ty(ID_VAR_TYPE))
        }
    }

    /// Natural-number argument `name:#` bound to slot `var`.
    #[must_use]
    pub fn nat(name: &str, var: i32) -> Self {
        Self {
            var: Some(var),
            ..Self::new(name, ExprDecl::ty(ID_VAR_NUM))
        }
    }

    /// Makes the argument present only when `bit` of slot `var` is set.
    #[must_use]
    pub fn optional(mut self, var: i32, bit: i32) -> Self {
        self.exist = Some((var, bit));
        self.flags |= FLAG_OPT_FIELD;
        self
    }

    /// Marks the argument as a nested function call (`!X`).
    #[must_use]
    pub fn exclamation(mut self) -> Self {
        self.flags |= FLAG_EXCL;
        self
    }
}

/// Constructor or function declaration.
#[derive(Clone, Debug)]
pub struct CombinatorDecl {
    /// Wire id.
    pub wire_id: i32,
    /// Name.
    pub name: String,
    /// Owning type (constructors) or result type (functions).
    pub type_wire_id: i32,
    /// Arguments; `None` declares a built-in combinator.
    pub args: Option<Vec<ArgDecl>>,
    /// Result expression.
    pub result: ExprDecl,
}

impl CombinatorDecl {
    /// Combinator with an empty argument list.
    #[must_use]
    pub fn new(wire_id: i32, name: &str, type_wire_id: i32, result: ExprDecl) -> Self {
        Self {
            wire_id,
            name: name.into(),
            type_wire_id,
            args: Some(Vec::new()),
            result,
        }
    }

    /// Built-in combinator (`int ? = Int` and friends).
    #[must_use]
    pub fn builtin(wire_id: i32, name: &str, type_wire_id: i32) -> Self {
        Self {
            args: None,
            ..Self::new(wire_id, name, type_wire_id, ExprDecl::ty(type_wire_id))
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: ArgDecl) -> Self {
        self.args.get_or_insert_with(Vec::new).push(arg);
        self
    }
}

/// Wire ids used by [`SchemaBuilder::with_prelude`].
pub mod prelude {
    /// `Int`.
    pub const TYPE_INT: i32 = 0x57af_6425;
    /// `Long`.
    pub const TYPE_LONG: i32 = 0x2a4c_3a0b;
    /// `Double`.
    pub const TYPE_DOUBLE: i32 = 0x2d4c_35b0;
    /// `String`.
    pub const TYPE_STRING: i32 = 0x3fed_d339;
    /// `Vector t`.
    pub const TYPE_VECTOR: i32 = 0x3d64_fa4b;
    /// `Maybe t`.
    pub const TYPE_MAYBE: i32 = 0x1a2f_0b5e;
    /// `Dictionary t`.
    pub const TYPE_DICTIONARY: i32 = 0x1b7c_2a81;
    /// `IntKeyDictionary t`.
    pub const TYPE_INT_KEY_DICTIONARY: i32 = 0x1b7c_2a82;
    /// `LongKeyDictionary t`.
    pub const TYPE_LONG_KEY_DICTIONARY: i32 = 0x1b7c_2a83;
    /// `ReqResult X`.
    pub const TYPE_REQ_RESULT: i32 = 0x0b5e_4c1d;

    /// `reqError {X:Type} error_code:int error:string = ReqResult X`.
    pub const REQ_ERROR: i32 = 0xb527_877d_u32 as i32;
    /// `reqResultHeader {X:Type} flags:# result:X = ReqResult X`.
    pub const REQ_RESULT_HEADER: i32 = 0x8cc8_4ce1_u32 as i32;
    /// `_ {X:Type} result:X = ReqResult X`, the default constructor.
    pub const REQ_RESULT_PLAIN: i32 = 0x2cbe_4d29;
}

/// Builds schema bytes.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    version: SchemaVersion,
    schema_version: i32,
    date: i32,
    types: Vec<TypeDecl>,
    constructors: Vec<CombinatorDecl>,
    functions: Vec<CombinatorDecl>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            schema_version: 1,
            date: 0,
            types: Vec::new(),
            constructors: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Creates a builder pre-populated with the standard built-in types and `ReqResult`.
    ///
    /// See [`prelude`] for the wire ids it assigns.
    #[must_use]
    pub fn with_prelude(version: SchemaVersion) -> Self {
        use crate::expr::FLAG_DEFAULT_CONSTRUCTOR;
        use crate::ids::{
            ID_BOOL_FALSE, ID_BOOL_TRUE, ID_DICTIONARY, ID_DOUBLE, ID_INT, ID_INT_KEY_DICTIONARY,
            ID_LONG, ID_LONG_KEY_DICTIONARY, ID_MAYBE_FALSE, ID_MAYBE_TRUE, ID_STRING, ID_VECTOR,
            TYPE_ID_BOOL,
        };
        use prelude::*;

        let mut b = Self::new(version);
        b.ty(TypeDecl::new(ID_VAR_NUM, "#", 0));
        b.ty(TypeDecl::new(ID_VAR_TYPE, "Type", 0));

        for (type_id, type_name, ctor_id, ctor_name) in [
            (TYPE_INT, "Int", ID_INT, "int"),
            (TYPE_LONG, "Long", ID_LONG, "long"),
            (TYPE_DOUBLE, "Double", ID_DOUBLE, "double"),
            (TYPE_STRING, "String", ID_STRING, "string"),
        ] {
            b.ty(TypeDecl::new(type_id, type_name, 0));
            b.constructor(CombinatorDecl::builtin(ctor_id, ctor_name, type_id));
        }

        b.ty(TypeDecl::new(TYPE_ID_BOOL, "Bool", 0));
        b.constructor(CombinatorDecl::new(
            ID_BOOL_FALSE,
            "boolFalse",
            TYPE_ID_BOOL,
            ExprDecl::ty(TYPE_ID_BOOL),
        ));
        b.constructor(CombinatorDecl::new(
            ID_BOOL_TRUE,
            "boolTrue",
            TYPE_ID_BOOL,
            ExprDecl::ty(TYPE_ID_BOOL),
        ));

        for (type_id, type_name, ctor_id, ctor_name) in [
            (TYPE_VECTOR, "Vector", ID_VECTOR, "vector"),
            (TYPE_DICTIONARY, "Dictionary", ID_DICTIONARY, "dictionary"),
            (
                TYPE_INT_KEY_DICTIONARY,
                "IntKeyDictionary",
                ID_INT_KEY_DICTIONARY,
                "intKeyDictionary",
            ),
            (
                TYPE_LONG_KEY_DICTIONARY,
                "LongKeyDictionary",
                ID_LONG_KEY_DICTIONARY,
                "longKeyDictionary",
            ),
        ] {
            b.ty(TypeDecl::new(type_id, type_name, 1));
            b.constructor(
                CombinatorDecl::new(
                    ctor_id,
                    ctor_name,
                    type_id,
                    ExprDecl::apply(type_id, alloc::vec![ExprDecl::var(0)]),
                )
                .arg(ArgDecl::implicit("t", 0)),
            );
        }

        let maybe_t = || ExprDecl::apply(TYPE_MAYBE, alloc::vec![ExprDecl::var(0)]);
        b.ty(TypeDecl::new(TYPE_MAYBE, "Maybe", 1));
        b.constructor(
            CombinatorDecl::new(ID_MAYBE_TRUE, "maybeTrue", TYPE_MAYBE, maybe_t())
                .arg(ArgDecl::implicit("t", 0))
                .arg(ArgDecl::new("value", ExprDecl::var(0))),
        );
        b.constructor(
            CombinatorDecl::new(ID_MAYBE_FALSE, "maybeFalse", TYPE_MAYBE, maybe_t())
                .arg(ArgDecl::implicit("t", 0)),
        );

        let req_x = || ExprDecl::apply(TYPE_REQ_RESULT, alloc::vec![ExprDecl::var(0)]);
        b.ty(TypeDecl::new(TYPE_REQ_RESULT, "ReqResult", 1).flags(FLAG_DEFAULT_CONSTRUCTOR));
        b.constructor(
            CombinatorDecl::new(REQ_ERROR, "reqError", TYPE_REQ_RESULT, req_x())
                .arg(ArgDecl::implicit("X", 0))
                .arg(ArgDecl::new("error_code", ExprDecl::bare(TYPE_INT)))
                .arg(ArgDecl::new("error", ExprDecl::bare(TYPE_STRING))),
        );
        b.constructor(
            CombinatorDecl::new(REQ_RESULT_HEADER, "reqResultHeader", TYPE_REQ_RESULT, req_x())
                .arg(ArgDecl::implicit("X", 0))
                .arg(ArgDecl::nat("flags", 1))
                .arg(ArgDecl::new("result", ExprDecl::var(0))),
        );
        b.constructor(
            CombinatorDecl::new(REQ_RESULT_PLAIN, "_", TYPE_REQ_RESULT, req_x())
                .arg(ArgDecl::implicit("X", 0))
                .arg(ArgDecl::new("result", ExprDecl::var(0))),
        );
        b
    }

    /// Sets the producer version and date recorded in the header.
    pub fn header(&mut self, schema_version: i32, date: i32) -> &mut Self {
        self.schema_version = schema_version;
        self.date = date;
        self
    }

    /// Adds a type.
    pub fn ty(&mut self, decl: TypeDecl) -> &mut Self {
        self.types.push(decl);
        self
    }

    /// Adds a constructor.
    pub fn constructor(&mut self, decl: CombinatorDecl) -> &mut Self {
        self.constructors.push(decl);
        self
    }

    /// Adds a function.
    pub fn function(&mut self, decl: CombinatorDecl) -> &mut Self {
        self.functions.push(decl);
        self
    }

    /// Encodes the schema.
    pub fn build(&self) -> Result<Vec<u8>, EncodeError> {
        let mut enc = Encoder {
            w: WireWriter::new(),
            layout: ArgFlagLayout::for_version(self.version.number()),
        };
        enc.w.write_u32(self.version.tag());
        enc.w.write_i32(self.schema_version);
        enc.w.write_i32(self.date);

        enc.count(self.types.len());
        for t in &self.types {
            let attached = self
                .constructors
                .iter()
                .filter(|c| c.type_wire_id == t.wire_id)
                .count();
            enc.w.write_u32(TLS_TYPE);
            enc.w.write_i32(t.wire_id);
            enc.w.write_string(t.name.as_bytes())?;
            match t.declared_constructors {
                Some(n) => enc.w.write_u32(n),
                None => enc.count(attached),
            }
            enc.w.write_u32(t.flags);
            enc.w.write_u32(t.arity);
            enc.w.write_i64(0);
        }

        enc.count(self.constructors.len());
        for c in &self.constructors {
            enc.combinator(c)?;
        }
        enc.count(self.functions.len());
        for c in &self.functions {
            enc.combinator(c)?;
        }
        Ok(enc.w.into_bytes())
    }
}

struct Encoder {
    w: WireWriter,
    layout: ArgFlagLayout,
}

impl Encoder {
    fn count(&mut self, n: usize) {
        self.w.write_i32(i32::try_from(n).unwrap_or(i32::MAX));
    }

    fn combinator(&mut self, c: &CombinatorDecl) -> Result<(), EncodeError> {
        self.w.write_u32(TLS_COMBINATOR);
        self.w.write_i32(c.wire_id);
        self.w.write_string(c.name.as_bytes())?;
        self.w.write_i32(c.type_wire_id);
        match &c.args {
            Some(args) => {
                self.w.write_u32(TLS_COMBINATOR_LEFT);
                self.args(args)?;
            }
            None => self.w.write_u32(TLS_COMBINATOR_LEFT_BUILTIN),
        }
        self.w.write_u32(TLS_COMBINATOR_RIGHT_V2);
        self.type_expr(&c.result)
    }

    fn args(&mut self, args: &[ArgDecl]) -> Result<(), EncodeError> {
        self.count(args.len());
        for a in args {
            let mut flags = a.flags & !FLAG_OPT_FIELD;
            if a.exist.is_some() {
                flags |= self.layout.opt_field;
            }
            if a.var.is_some() {
                flags |= self.layout.has_vars;
            }
            self.w.write_u32(TLS_ARG_V2);
            self.w.write_string(a.name.as_bytes())?;
            self.w.write_u32(flags);
            if let Some(var) = a.var {
                self.w.write_i32(var);
            }
            if let Some((var, bit)) = a.exist {
                self.w.write_i32(var);
                self.w.write_i32(bit);
            }
            self.type_expr(&a.ty)?;
        }
        Ok(())
    }

    fn type_expr(&mut self, e: &ExprDecl) -> Result<(), EncodeError> {
        match e {
            ExprDecl::Type {
                type_wire_id,
                flags,
                children,
            } => {
                self.w.write_u32(TLS_TYPE_EXPR);
                self.w.write_i32(*type_wire_id);
                self.w.write_u32(*flags);
                self.count(children.len());
                for child in children {
                    self.expr(child)?;
                }
            }
            ExprDecl::TypeVar { var, flags } => {
                self.w.write_u32(TLS_TYPE_VAR);
                self.w.write_i32(*var);
                self.w.write_u32(*flags);
            }
            ExprDecl::Array {
                multiplicity,
                fields,
            } => {
                self.w.write_u32(TLS_ARRAY);
                self.nat_expr(multiplicity)?;
                self.args(fields)?;
            }
            ExprDecl::NatConst(_) | ExprDecl::NatVar { .. } => self.nat_expr(e)?,
        }
        Ok(())
    }

    fn expr(&mut self, e: &ExprDecl) -> Result<(), EncodeError> {
        match e {
            ExprDecl::NatConst(_) | ExprDecl::NatVar { .. } => {
                self.w.write_u32(TLS_EXPR_NAT);
                self.nat_expr(e)
            }
            _ => {
                self.w.write_u32(TLS_EXPR_TYPE);
                self.type_expr(e)
            }
        }
    }

    fn nat_expr(&mut self, e: &ExprDecl) -> Result<(), EncodeError> {
        match e {
            ExprDecl::NatConst(n) => {
                self.w.write_u32(TLS_NAT_CONST);
                self.w.write_i32(*n);
                Ok(())
            }
            ExprDecl::NatVar { var, diff } => {
                self.w.write_u32(TLS_NAT_VAR);
                self.w.write_i32(*diff);
                self.w.write_i32(*var);
                Ok(())
            }
            _ => self.type_expr(e),
        }
    }
}
