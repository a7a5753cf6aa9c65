// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode compiler.
//!
//! Every combinator compiles to a store program and a fetch program. Both start with a
//! *unification prefix* that consumes the expected [`ResultTree`] from the tree stack and binds the
//! combinator's variables; the rest walks the arguments in declaration order. Function store
//! programs have no prefix: they write the call and leave the result witness on the tree stack.
//!
//! Programs are flat instruction slices. Optional fields are a forward jump
//! ([`Instr::CheckBit`]); repeated structures own their element body as a nested [`Program`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::expr::{Arg, CombinatorId, ResultTree, TypeExpr, TypeId};
use crate::ids::{
    ID_BOOL_FALSE, ID_BOOL_TRUE, ID_DICTIONARY, ID_DOUBLE, ID_INT, ID_INT_KEY_DICTIONARY, ID_LONG,
    ID_LONG_KEY_DICTIONARY, ID_MAYBE_FALSE, ID_MAYBE_TRUE, ID_STRING, ID_VAR_NUM, ID_VECTOR,
    TYPE_ID_BOOL,
};
use crate::schema::{Combinator, Schema};
use crate::value::Key;

/// Upper bound on instructions generated for one combinator, nested bodies included.
pub const MAX_PROGRAM_LEN: usize = 10_000;

/// Errors produced while compiling a combinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// The handle does not name a combinator of this schema.
    UnknownCombinator(CombinatorId),
    /// An expression references a type handle the schema does not have.
    UnknownType(TypeId),
    /// A variable is used both as a number and as a type.
    VariableKind {
        /// Combinator being compiled.
        combinator: Box<str>,
        /// Offending slot.
        var: u32,
    },
    /// A variable is read before anything binds it.
    UnboundVariable {
        /// Combinator being compiled.
        combinator: Box<str>,
        /// Offending slot.
        var: u32,
    },
    /// An argument has a shape the engine cannot store or fetch.
    UnsupportedArgument {
        /// Combinator being compiled.
        combinator: Box<str>,
        /// Argument name.
        arg: Box<str>,
    },
    /// A field stores a type that has no constructors.
    NoConstructors(Box<str>),
    /// The generated program exceeds [`MAX_PROGRAM_LEN`].
    ProgramTooLong(Box<str>),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCombinator(id) => write!(f, "unknown combinator handle {}", id.0),
            Self::UnknownType(id) => write!(f, "unknown type handle {}", id.0),
            Self::VariableKind { combinator, var } => {
                write!(f, "{combinator}: variable {var} used as both number and type")
            }
            Self::UnboundVariable { combinator, var } => {
                write!(f, "{combinator}: variable {var} read before it is bound")
            }
            Self::UnsupportedArgument { combinator, arg } => {
                write!(f, "{combinator}: argument `{arg}` has an unsupported type")
            }
            Self::NoConstructors(ty) => write!(f, "type {ty} has no constructors"),
            Self::ProgramTooLong(name) => {
                write!(f, "{name}: program exceeds {MAX_PROGRAM_LEN} instructions")
            }
        }
    }
}

impl core::error::Error for CompileError {}

/// Key kind of a dictionary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DictKey {
    /// String keys (`dictionary`).
    Str,
    /// 32-bit keys (`intKeyDictionary`).
    Int,
    /// 64-bit keys (`longKeyDictionary`).
    Long,
}

/// One interpreter instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    // Unification against the expected tree.
    /// Pops a type node of `ty` and pushes its children, first child on top.
    UniType {
        /// Expected type.
        ty: TypeId,
    },
    /// Pops a number and checks it equals `value`.
    UniNat {
        /// Expected number.
        value: i32,
    },
    /// Pops an array node with these field names and pushes its fields, then its multiplicity.
    UniArray {
        /// Expected field names.
        names: Arc<[Box<str>]>,
    },
    /// Pops a tree into slot `var`.
    BindTypeVar {
        /// Slot.
        var: u32,
    },
    /// Pops a tree and checks it equals slot `var`, binding it if empty.
    CheckTypeVar {
        /// Slot.
        var: u32,
    },
    /// Pops a number `n` and binds slot `var` to `n - diff`.
    BindNatVar {
        /// Slot.
        var: u32,
        /// Offset.
        diff: i32,
    },
    /// Pops a number `n` and checks slot `var` equals `n - diff`, binding it if empty.
    CheckNatVar {
        /// Slot.
        var: u32,
        /// Offset.
        diff: i32,
    },

    // Tree construction.
    /// Pushes a constant tree.
    PushTree(ResultTree),
    /// Pushes the tree bound to slot `var`, marked bare if `bare`.
    PushTypeVar {
        /// Slot.
        var: u32,
        /// Force a bare application.
        bare: bool,
    },
    /// Pushes slot `var` plus `diff` as a number.
    PushNatVar {
        /// Slot.
        var: u32,
        /// Offset.
        diff: i32,
    },
    /// Pops the arity of `ty` children and pushes the application.
    CreateType {
        /// Applied type.
        ty: TypeId,
        /// Bare application.
        bare: bool,
    },
    /// Pops one tree per field, then the multiplicity, and pushes an array node.
    CreateArray {
        /// Field names.
        names: Arc<[Box<str>]>,
    },

    // Control.
    /// Skips the next `skip` instructions unless `bit` of number slot `var` is set.
    CheckBit {
        /// Slot holding the flags word.
        var: u32,
        /// Bit index.
        bit: u32,
        /// Instructions to skip.
        skip: usize,
    },
    /// Ends the program.
    Return,

    // Store.
    /// Writes a constructor tag.
    StoreTag(i32),
    /// Descends into a field of the current map, by name with positional fallback.
    StoreField {
        /// Field name.
        name: Key,
        /// Positional fallback.
        index: Key,
    },
    /// Leaves the field entered by the last `StoreField` or element loop.
    PopValue,
    /// Writes the current value as a 32-bit integer.
    StoreInt,
    /// Writes the current value as a 64-bit integer.
    StoreLong,
    /// Writes the current value as a double.
    StoreDouble,
    /// Writes the current value as a string.
    StoreString,
    /// Writes the current value as a boxed `Bool`.
    StoreBool,
    /// Writes the current value as a `#` and binds slot `var` to it.
    StoreVarNum {
        /// Slot.
        var: u32,
    },
    /// Pops a tree and stores the current value as that type.
    StoreType,
    /// Runs the body of `ctor`'s store program in a fresh variable frame.
    StoreInline {
        /// Inlined constructor.
        ctor: CombinatorId,
    },
    /// Pops a multiplicity and stores that many list elements with `body`.
    StoreArray {
        /// Element program.
        body: Box<Program>,
    },
    /// Stores the current list as a count and its elements.
    StoreVector {
        /// Element program.
        body: Box<Program>,
    },
    /// Stores the current map as a count and key/value pairs.
    StoreDictionary {
        /// Key encoding.
        key: DictKey,
        /// Element program.
        body: Box<Program>,
    },
    /// Stores the current value as a nested function call and pushes its result tree.
    StoreFunction,

    // Fetch.
    /// Reads a tag and checks it.
    ExpectTag(i32),
    /// Pops the fetched value into the map below it.
    EndField {
        /// Field key.
        key: Key,
    },
    /// Reads a 32-bit integer.
    FetchInt,
    /// Reads a 64-bit integer.
    FetchLong,
    /// Reads a double.
    FetchDouble,
    /// Reads a string.
    FetchString,
    /// Pushes `true`.
    FetchTrue,
    /// Pushes `false`.
    FetchFalse,
    /// Pushes an empty map.
    FetchMap,
    /// Reads a `#` and binds slot `var` to it.
    FetchVarNum {
        /// Slot.
        var: u32,
    },
    /// Reads a `#` and checks it against slot `var`.
    FetchCheckVarNum {
        /// Slot.
        var: u32,
    },
    /// Pops a tree and fetches a value of that type.
    FetchType,
    /// Runs the body of `ctor`'s fetch program in a fresh variable frame.
    FetchInline {
        /// Inlined constructor.
        ctor: CombinatorId,
    },
    /// Pops a multiplicity and fetches that many elements with `body`.
    FetchArray {
        /// Element program.
        body: Box<Program>,
    },
    /// Reads a count and that many elements.
    FetchVector {
        /// Element program.
        body: Box<Program>,
    },
    /// Reads a count and that many key/value pairs.
    FetchDictionary {
        /// Key encoding.
        key: DictKey,
        /// Element program.
        body: Box<Program>,
    },
}

/// Compiled instruction sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    instrs: Box<[Instr]>,
    prefix: usize,
}

impl Program {
    /// Every instruction, unification prefix included.
    #[inline]
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Length of the unification prefix.
    #[inline]
    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix
    }

    /// Instructions after the unification prefix.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &[Instr] {
        self.instrs.get(self.prefix..).unwrap_or_default()
    }
}

/// Store and fetch programs of one combinator.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledCombinator {
    /// Serializes a value of the combinator (or a call of the function).
    pub store: Program,
    /// Deserializes a value of the combinator (or the function's response).
    pub fetch: Program,
}

/// Compiles both programs of `comb`.
pub fn compile_combinator(
    schema: &Schema,
    comb: &Combinator,
) -> Result<CompiledCombinator, CompileError> {
    let compiled = if comb.is_function() {
        CompiledCombinator {
            store: Gen::new(schema, comb).function_store()?,
            fetch: Program {
                instrs: Box::new([Instr::FetchType, Instr::Return]),
                prefix: 0,
            },
        }
    } else {
        CompiledCombinator {
            store: Gen::new(schema, comb).constructor_store()?,
            fetch: Gen::new(schema, comb).constructor_fetch()?,
        }
    };
    tracing::debug!(
        combinator = &*comb.name,
        store = compiled.store.instrs.len(),
        fetch = compiled.fetch.instrs.len(),
        "compiled combinator"
    );
    Ok(compiled)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VarState {
    Unbound,
    Nat,
    Type,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Direction {
    Store,
    Fetch,
}

/// Leaf opcodes of a built-in scalar constructor.
fn leaf_ops(wire_id: i32) -> Option<(Instr, Instr)> {
    match wire_id {
        ID_INT => Some((Instr::StoreInt, Instr::FetchInt)),
        ID_LONG => Some((Instr::StoreLong, Instr::FetchLong)),
        ID_DOUBLE => Some((Instr::StoreDouble, Instr::FetchDouble)),
        ID_STRING => Some((Instr::StoreString, Instr::FetchString)),
        _ => None,
    }
}

fn dict_key(wire_id: i32) -> Option<DictKey> {
    match wire_id {
        ID_DICTIONARY => Some(DictKey::Str),
        ID_INT_KEY_DICTIONARY => Some(DictKey::Int),
        ID_LONG_KEY_DICTIONARY => Some(DictKey::Long),
        _ => None,
    }
}

fn position(index: usize) -> Key {
    Key::Int(i64::try_from(index).unwrap_or(i64::MAX))
}

fn is_builtin(wire_id: i32) -> bool {
    leaf_ops(wire_id).is_some()
        || dict_key(wire_id).is_some()
        || matches!(
            wire_id,
            ID_VECTOR | ID_MAYBE_TRUE | ID_MAYBE_FALSE | ID_BOOL_TRUE | ID_BOOL_FALSE
        )
}

struct Gen<'s> {
    schema: &'s Schema,
    comb: &'s Combinator,
    vars: Vec<VarState>,
    out: Vec<Instr>,
    emitted: usize,
}

impl<'s> Gen<'s> {
    fn new(schema: &'s Schema, comb: &'s Combinator) -> Self {
        Self {
            schema,
            comb,
            vars: alloc::vec![VarState::Unbound; comb.var_count as usize],
            out: Vec::new(),
            emitted: 0,
        }
    }

    fn emit(&mut self, instr: Instr) -> Result<(), CompileError> {
        self.emitted += 1;
        if self.emitted > MAX_PROGRAM_LEN {
            return Err(CompileError::ProgramTooLong(self.comb.name.clone()));
        }
        self.out.push(instr);
        Ok(())
    }

    fn finish(mut self, prefix: usize) -> Result<Program, CompileError> {
        self.emit(Instr::Return)?;
        Ok(Program {
            instrs: self.out.into_boxed_slice(),
            prefix,
        })
    }

    /// Generates a nested program sharing this generator's variable state.
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), CompileError>,
    ) -> Result<Box<Program>, CompileError> {
        let outer = core::mem::take(&mut self.out);
        let res = f(self).and_then(|()| self.emit(Instr::Return));
        let body = core::mem::replace(&mut self.out, outer);
        res?;
        Ok(Box::new(Program {
            instrs: body.into_boxed_slice(),
            prefix: 0,
        }))
    }

    fn var_state(&mut self, var: u32) -> Result<&mut VarState, CompileError> {
        let name = &self.comb.name;
        self.vars
            .get_mut(var as usize)
            .ok_or_else(|| CompileError::UnboundVariable {
                combinator: name.clone(),
                var,
            })
    }

    /// Marks `var` as `kind`, returning whether it was already bound.
    fn bind(&mut self, var: u32, kind: VarState) -> Result<bool, CompileError> {
        let combinator = self.comb.name.clone();
        let state = self.var_state(var)?;
        match *state {
            VarState::Unbound => {
                *state = kind;
                Ok(false)
            }
            s if s == kind => Ok(true),
            _ => Err(CompileError::VariableKind { combinator, var }),
        }
    }

    fn require(&mut self, var: u32, kind: VarState) -> Result<(), CompileError> {
        let combinator = self.comb.name.clone();
        match *self.var_state(var)? {
            VarState::Unbound => Err(CompileError::UnboundVariable { combinator, var }),
            s if s == kind => Ok(()),
            _ => Err(CompileError::VariableKind { combinator, var }),
        }
    }

    fn unsupported(&self, arg: &Arg) -> CompileError {
        CompileError::UnsupportedArgument {
            combinator: self.comb.name.clone(),
            arg: arg.name.clone(),
        }
    }

    /// Emits instructions that consume a tree matching `expr`.
    fn unify(&mut self, expr: &TypeExpr) -> Result<(), CompileError> {
        match expr {
            TypeExpr::Apply {
                target, children, ..
            } => {
                self.emit(Instr::UniType { ty: *target })?;
                for child in children {
                    self.unify(child)?;
                }
            }
            TypeExpr::NatConst(value) => self.emit(Instr::UniNat { value: *value })?,
            TypeExpr::NatVar { var, diff } => {
                let (var, diff) = (*var, *diff);
                if self.bind(var, VarState::Nat)? {
                    self.emit(Instr::CheckNatVar { var, diff })?;
                } else {
                    self.emit(Instr::BindNatVar { var, diff })?;
                }
            }
            TypeExpr::TypeVar { var, .. } => {
                let var = *var;
                if self.bind(var, VarState::Type)? {
                    self.emit(Instr::CheckTypeVar { var })?;
                } else {
                    self.emit(Instr::BindTypeVar { var })?;
                }
            }
            TypeExpr::Array {
                multiplicity,
                fields,
                ..
            } => {
                self.emit(Instr::UniArray {
                    names: TypeExpr::field_names(fields),
                })?;
                self.unify(multiplicity)?;
                for f in fields {
                    self.unify(&f.ty)?;
                }
            }
        }
        Ok(())
    }

    /// Emits instructions that push the tree `expr` resolves to.
    fn create(&mut self, expr: &TypeExpr) -> Result<(), CompileError> {
        if let Some(tree) = ResultTree::from_closed(expr) {
            return self.emit(Instr::PushTree(tree));
        }
        match expr {
            TypeExpr::Apply {
                target, children, ..
            } => {
                for child in children {
                    self.create(child)?;
                }
                self.emit(Instr::CreateType {
                    ty: *target,
                    bare: expr.is_bare(),
                })
            }
            TypeExpr::NatConst(n) => self.emit(Instr::PushTree(ResultTree::Nat(*n))),
            TypeExpr::NatVar { var, diff } => {
                self.require(*var, VarState::Nat)?;
                self.emit(Instr::PushNatVar {
                    var: *var,
                    diff: *diff,
                })
            }
            TypeExpr::TypeVar { var, .. } => {
                self.require(*var, VarState::Type)?;
                self.emit(Instr::PushTypeVar {
                    var: *var,
                    bare: expr.is_bare(),
                })
            }
            TypeExpr::Array {
                multiplicity,
                fields,
                ..
            } => {
                self.create(multiplicity)?;
                for f in fields {
                    self.create(&f.ty)?;
                }
                self.emit(Instr::CreateArray {
                    names: TypeExpr::field_names(fields),
                })
            }
        }
    }

    fn constructor_store(mut self) -> Result<Program, CompileError> {
        let comb = self.comb;
        self.unify(&comb.result)?;
        let prefix = self.out.len();
        let wire_id = self.comb.wire_id;
        if let Some((store, _)) = leaf_ops(wire_id) {
            self.emit(store)?;
        } else if wire_id == ID_VECTOR {
            let body = self.element_body(Direction::Store)?;
            self.emit(Instr::StoreVector { body })?;
        } else if let Some(key) = dict_key(wire_id) {
            let body = self.element_body(Direction::Store)?;
            self.emit(Instr::StoreDictionary { key, body })?;
        } else if wire_id == ID_MAYBE_TRUE {
            self.require(0, VarState::Type)?;
            self.emit(Instr::PushTypeVar { var: 0, bare: false })?;
            self.emit(Instr::StoreType)?;
        } else if wire_id != ID_MAYBE_FALSE {
            let flat = self.is_flat();
            for (i, arg) in comb.args.iter().enumerate() {
                if !arg.is_implicit() {
                    self.field(Direction::Store, arg, i + 1, flat)?;
                }
            }
        }
        self.finish(prefix)
    }

    fn constructor_fetch(mut self) -> Result<Program, CompileError> {
        let comb = self.comb;
        self.unify(&comb.result)?;
        let prefix = self.out.len();
        let wire_id = self.comb.wire_id;
        if let Some((_, fetch)) = leaf_ops(wire_id) {
            self.emit(fetch)?;
        } else if wire_id == ID_VECTOR {
            let body = self.element_body(Direction::Fetch)?;
            self.emit(Instr::FetchVector { body })?;
        } else if let Some(key) = dict_key(wire_id) {
            let body = self.element_body(Direction::Fetch)?;
            self.emit(Instr::FetchDictionary { key, body })?;
        } else if wire_id == ID_MAYBE_TRUE {
            self.require(0, VarState::Type)?;
            self.emit(Instr::PushTypeVar { var: 0, bare: false })?;
            self.emit(Instr::FetchType)?;
        } else if wire_id == ID_MAYBE_FALSE || wire_id == ID_BOOL_FALSE {
            self.emit(Instr::FetchFalse)?;
        } else if wire_id == ID_BOOL_TRUE {
            self.emit(Instr::FetchTrue)?;
        } else {
            let flat = self.is_flat();
            if !flat {
                self.emit(Instr::FetchMap)?;
            }
            for (i, arg) in comb.args.iter().enumerate() {
                if !arg.is_implicit() {
                    self.field(Direction::Fetch, arg, i + 1, flat)?;
                }
            }
        }
        self.finish(prefix)
    }

    fn function_store(mut self) -> Result<Program, CompileError> {
        let comb = self.comb;
        self.emit(Instr::StoreTag(comb.wire_id))?;
        for (i, arg) in comb.args.iter().enumerate() {
            if arg.is_implicit() {
                continue;
            }
            if arg.is_exclamation() {
                self.emit(Instr::StoreField {
                    name: Key::name(&arg.name),
                    index: position(i + 1),
                })?;
                self.emit(Instr::StoreFunction)?;
                self.unify(&arg.ty)?;
                self.emit(Instr::PopValue)?;
            } else {
                self.field(Direction::Store, arg, i + 1, false)?;
            }
        }
        self.create(&comb.result)?;
        self.finish(0)
    }

    /// Single-constructor types with one explicit argument store that argument in place.
    fn is_flat(&self) -> bool {
        let single = self
            .comb
            .owner
            .and_then(|t| self.schema.ty(t))
            .is_some_and(|t| t.constructors.len() == 1);
        single && self.comb.args.iter().filter(|a| !a.is_implicit()).count() == 1
    }

    fn element_body(&mut self, dir: Direction) -> Result<Box<Program>, CompileError> {
        self.require(0, VarState::Type)?;
        self.nested(|g| {
            g.emit(Instr::PushTypeVar { var: 0, bare: false })?;
            g.emit(match dir {
                Direction::Store => Instr::StoreType,
                Direction::Fetch => Instr::FetchType,
            })
        })
    }

    fn field(
        &mut self,
        dir: Direction,
        arg: &Arg,
        index: usize,
        flat: bool,
    ) -> Result<(), CompileError> {
        let check = match arg.exist {
            Some((var, bit)) => {
                self.emit(Instr::CheckBit { var, bit, skip: 0 })?;
                Some(self.out.len())
            }
            None => None,
        };
        let name = Key::name(&arg.name);
        let index = position(index);
        if !flat && dir == Direction::Store {
            self.emit(Instr::StoreField {
                name: name.clone(),
                index: index.clone(),
            })?;
        }
        self.arg_body(dir, arg)?;
        if !flat {
            self.emit(match dir {
                Direction::Store => Instr::PopValue,
                Direction::Fetch => Instr::EndField {
                    key: if arg.name.is_empty() { index } else { name },
                },
            })?;
        }
        if let Some(start) = check {
            let skip = self.out.len() - start;
            if let Some(Instr::CheckBit { skip: s, .. }) = self.out.get_mut(start - 1) {
                *s = skip;
            }
        }
        Ok(())
    }

    fn arg_body(&mut self, dir: Direction, arg: &Arg) -> Result<(), CompileError> {
        if let Some(var) = arg.var {
            if !self.is_nat_type(&arg.ty) {
                return Err(self.unsupported(arg));
            }
            let bound = self.bind(var, VarState::Nat)?;
            return self.emit(match (dir, bound) {
                (Direction::Store, _) => Instr::StoreVarNum { var },
                (Direction::Fetch, false) => Instr::FetchVarNum { var },
                (Direction::Fetch, true) => Instr::FetchCheckVarNum { var },
            });
        }
        match &arg.ty {
            TypeExpr::Apply { .. } | TypeExpr::TypeVar { .. } => self.typed(dir, &arg.ty),
            TypeExpr::Array {
                multiplicity,
                fields,
                ..
            } => {
                self.create(multiplicity)?;
                let flat = fields.len() == 1;
                let body = self.nested(|g| {
                    if !flat && dir == Direction::Fetch {
                        g.emit(Instr::FetchMap)?;
                    }
                    for (j, f) in fields.iter().enumerate() {
                        g.field(dir, f, j, flat)?;
                    }
                    Ok(())
                })?;
                self.emit(match dir {
                    Direction::Store => Instr::StoreArray { body },
                    Direction::Fetch => Instr::FetchArray { body },
                })
            }
            TypeExpr::NatConst(_) | TypeExpr::NatVar { .. } => Err(self.unsupported(arg)),
        }
    }

    fn is_nat_type(&self, ty: &TypeExpr) -> bool {
        matches!(ty, TypeExpr::Apply { target, .. }
            if self.schema.ty(*target).is_some_and(|t| t.wire_id == ID_VAR_NUM))
    }

    /// Stores or fetches a value of a type application or type variable.
    fn typed(&mut self, dir: Direction, expr: &TypeExpr) -> Result<(), CompileError> {
        if let TypeExpr::Apply { target, .. } = expr {
            let t = self
                .schema
                .ty(*target)
                .ok_or(CompileError::UnknownType(*target))?;
            let bare = expr.is_bare();
            if t.wire_id == TYPE_ID_BOOL && dir == Direction::Store && !bare {
                return self.emit(Instr::StoreBool);
            }
            if t.constructors.is_empty() {
                return Err(CompileError::NoConstructors(t.name.clone()));
            }
            if let [only] = t.constructors.as_slice()
                && t.default_constructor().is_none()
            {
                let ctor = self
                    .schema
                    .combinator(*only)
                    .ok_or(CompileError::UnknownCombinator(*only))?;
                if let Some((store, fetch)) = leaf_ops(ctor.wire_id) {
                    self.tag(dir, ctor, bare)?;
                    return self.emit(match dir {
                        Direction::Store => store,
                        Direction::Fetch => fetch,
                    });
                }
                if t.arity == 0 && !is_builtin(ctor.wire_id) {
                    self.tag(dir, ctor, bare)?;
                    return self.emit(match dir {
                        Direction::Store => Instr::StoreInline { ctor: *only },
                        Direction::Fetch => Instr::FetchInline { ctor: *only },
                    });
                }
            }
        }
        self.create(expr)?;
        self.emit(match dir {
            Direction::Store => Instr::StoreType,
            Direction::Fetch => Instr::FetchType,
        })
    }

    fn tag(&mut self, dir: Direction, ctor: &Combinator, bare: bool) -> Result<(), CompileError> {
        if bare || &*ctor.name == "_" {
            return Ok(());
        }
        self.emit(match dir {
            Direction::Store => Instr::StoreTag(ctor.wire_id),
            Direction::Fetch => Instr::ExpectTag(ctor.wire_id),
        })
    }
}
