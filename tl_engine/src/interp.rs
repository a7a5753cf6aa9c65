// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode interpreter.
//!
//! One [`Exec`] runs one top-level store or fetch. It owns three stacks:
//!
//! - values: borrowed request values during store, decoded values during fetch,
//! - result trees: witnesses being unified or built,
//! - variable slots: one window per combinator invocation.
//!
//! Failures come in two strengths. A [`Mismatch`] is local: constructor dispatch rewinds to a
//! checkpoint and tries the next alternative. An [`ExecError`] aborts the whole call.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::compile::{CompileError, CompiledCombinator, DictKey, Instr, Program};
use crate::expr::{CombinatorId, ResultTree};
use crate::ids::{ID_BOOL_FALSE, ID_BOOL_TRUE, ID_MAYBE_FALSE, ID_MAYBE_TRUE, TYPE_ID_BOOL};
use crate::schema::Schema;
use crate::trace::{Direction, ScopeKind, TraceMask, TraceSink};
use crate::value::{Key, Map, Value};
use crate::wire::{DecodeError, EncodeError, WireReader, WireWriter};

/// Execution limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum combinator nesting depth.
    pub max_depth: usize,
    /// Maximum live variable slots across all nested invocations.
    pub max_var_slots: usize,
    /// Try every constructor when a union value has no `_` discriminator.
    pub allow_constructor_guess: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_var_slots: 1 << 16,
            allow_constructor_guess: true,
        }
    }
}

/// Reusable per-call working memory.
///
/// A scratch is cleared at the start of every call; reusing one across calls only saves
/// allocations. Concurrent calls need separate scratches.
#[derive(Debug, Default)]
pub struct Scratch {
    trees: Vec<ResultTree>,
    slots: Vec<Option<ResultTree>>,
    fetched: Vec<Value>,
}

impl Scratch {
    /// Creates an empty scratch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.trees.clear();
        self.slots.clear();
        self.fetched.clear();
    }
}

/// A local failure: the data does not fit the type being processed.
#[derive(Clone, Debug, PartialEq)]
pub enum Mismatch {
    /// The response ended early.
    Decode(DecodeError),
    /// A value cannot be encoded.
    Encode(EncodeError),
    /// A tree does not unify with the combinator's declared type.
    Witness,
    /// A fixed tag was expected.
    UnexpectedTag {
        /// Expected tag.
        expected: i32,
        /// Tag found on the wire.
        found: i32,
    },
    /// No constructor of a boxed type has this tag and the type has no default.
    UnknownTag {
        /// Type being fetched.
        ty: Box<str>,
        /// Tag found on the wire.
        tag: i32,
    },
    /// The type has no constructors.
    NoConstructors(Box<str>),
    /// Every constructor of a union was tried and none fit.
    NoConstructorMatched(Box<str>),
    /// The `_` discriminator names no constructor of the type.
    UnknownConstructor(Box<[u8]>),
    /// A multi-constructor value has no `_` discriminator and guessing is disabled.
    MissingDiscriminator(Box<str>),
    /// A nested call names no function of the schema.
    UnknownFunction(Box<[u8]>),
    /// A required field is absent.
    MissingField(Key),
    /// A map was required.
    NotAMap,
    /// A scalar was required.
    NotAScalar,
    /// An integer does not fit its wire width.
    IntOutOfRange(i64),
    /// A dictionary key does not fit the dictionary's key kind.
    BadKey(Key),
    /// A `#` field disagrees with the value its variable is already bound to.
    VariableMismatch(u32),
    /// A list has more elements than a count word can carry.
    TooManyElements(usize),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{e}"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Witness => write!(f, "value does not match the expected type"),
            Self::UnexpectedTag { expected, found } => {
                write!(f, "expected tag {expected:#010x}, found {found:#010x}")
            }
            Self::UnknownTag { ty, tag } => write!(f, "unknown tag {tag:#010x} for type {ty}"),
            Self::NoConstructors(ty) => write!(f, "type {ty} has no constructors"),
            Self::NoConstructorMatched(ty) => write!(f, "no constructor of {ty} matches"),
            Self::UnknownConstructor(name) => {
                write!(f, "unknown constructor {}", alloc::string::String::from_utf8_lossy(name))
            }
            Self::MissingDiscriminator(ty) => {
                write!(f, "value of {ty} does not name its constructor")
            }
            Self::UnknownFunction(name) => {
                write!(f, "unknown function {}", alloc::string::String::from_utf8_lossy(name))
            }
            Self::MissingField(key) => write!(f, "field \"{key}\" not found"),
            Self::NotAMap => write!(f, "expected an array value"),
            Self::NotAScalar => write!(f, "expected a scalar value"),
            Self::IntOutOfRange(v) => write!(f, "integer {v} out of range"),
            Self::BadKey(key) => write!(f, "invalid dictionary key \"{key}\""),
            Self::VariableMismatch(var) => write!(f, "variable {var} bound to a different value"),
            Self::TooManyElements(n) => write!(f, "{n} elements do not fit a count word"),
        }
    }
}

impl core::error::Error for Mismatch {}

impl From<DecodeError> for Mismatch {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// A failure that aborts the whole call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecError {
    /// Malformed data that no alternative can recover from.
    Decode(DecodeError),
    /// A repetition count is negative.
    NegativeCount(i32),
    /// Nesting exceeded [`Limits::max_depth`].
    DepthExceeded(usize),
    /// Live variable slots exceeded [`Limits::max_var_slots`].
    TooManyVariables(usize),
    /// A program read a variable nothing has bound.
    UnboundVariable(u32),
    /// A variable holds a type where a number was needed, or the reverse.
    VariableKind(u32),
    /// A program popped an empty stack.
    StackUnderflow,
    /// A tree of the wrong shape reached a type dispatch.
    MalformedTree,
    /// A combinator could not be compiled.
    Compile(CompileError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{e}"),
            Self::NegativeCount(n) => write!(f, "negative count {n}"),
            Self::DepthExceeded(d) => write!(f, "nesting depth {d} exceeded"),
            Self::TooManyVariables(n) => write!(f, "{n} variable slots exceeded"),
            Self::UnboundVariable(v) => write!(f, "variable {v} is unbound"),
            Self::VariableKind(v) => write!(f, "variable {v} has the wrong kind"),
            Self::StackUnderflow => write!(f, "interpreter stack underflow"),
            Self::MalformedTree => write!(f, "malformed type tree"),
            Self::Compile(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Compile(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Fault {
    Mismatch(Mismatch),
    Fatal(ExecError),
}

impl From<Mismatch> for Fault {
    fn from(m: Mismatch) -> Self {
        Self::Mismatch(m)
    }
}

impl From<ExecError> for Fault {
    fn from(e: ExecError) -> Self {
        Self::Fatal(e)
    }
}

impl From<DecodeError> for Fault {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::BadStringPrefix => Self::Fatal(ExecError::Decode(e)),
            DecodeError::UnexpectedEof => Self::Mismatch(Mismatch::Decode(e)),
        }
    }
}

struct Checkpoint {
    read: usize,
    write: usize,
    trees: usize,
    values: usize,
    fetched: usize,
}

/// State of one top-level call.
pub(crate) struct Exec<'a, 't> {
    schema: &'a Schema,
    limits: &'a Limits,
    scratch: &'a mut Scratch,
    reader: WireReader<'a>,
    writer: WireWriter,
    values: Vec<&'a Value>,
    base: usize,
    depth: usize,
    trace: Option<&'t mut dyn TraceSink>,
    traced: bool,
}

impl<'a, 't> Exec<'a, 't> {
    pub(crate) fn new(
        schema: &'a Schema,
        limits: &'a Limits,
        scratch: &'a mut Scratch,
        input: &'a [u8],
        trace: Option<&'t mut dyn TraceSink>,
    ) -> Self {
        scratch.clear();
        let traced = trace
            .as_deref()
            .is_some_and(|t| t.mask().contains(TraceMask::COMBINATOR));
        Self {
            schema,
            limits,
            scratch,
            reader: WireReader::new(input),
            writer: WireWriter::new(),
            values: Vec::new(),
            base: 0,
            depth: 0,
            trace,
            traced,
        }
    }

    /// Writes a call of `function` with arguments from `value`; returns the result witness.
    pub(crate) fn store_call(
        &mut self,
        function: CombinatorId,
        value: &'a Value,
    ) -> Result<ResultTree, Fault> {
        self.values.push(value);
        self.call_store(function, false)?;
        self.pop_tree()
    }

    /// Reads a response of `function` matching `witness`.
    pub(crate) fn fetch_call(
        &mut self,
        function: CombinatorId,
        witness: ResultTree,
    ) -> Result<Value, Fault> {
        self.scratch.trees.push(witness);
        self.call_fetch(function, false)?;
        self.pop_fetched()
    }

    pub(crate) fn remaining_input(&self) -> usize {
        self.reader.remaining()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.writer.into_bytes()
    }

    fn programs(&self, id: CombinatorId) -> Result<&'a CompiledCombinator, Fault> {
        self.schema
            .programs(id)
            .map_err(|e| Fault::Fatal(ExecError::Compile(e)))
    }

    fn call_store(&mut self, id: CombinatorId, skip_prefix: bool) -> Result<(), Fault> {
        let program = &self.programs(id)?.store;
        self.invoke(id, Direction::Store, program, skip_prefix)
    }

    fn call_fetch(&mut self, id: CombinatorId, skip_prefix: bool) -> Result<(), Fault> {
        let program = &self.programs(id)?.fetch;
        self.invoke(id, Direction::Fetch, program, skip_prefix)
    }

    fn invoke(
        &mut self,
        id: CombinatorId,
        direction: Direction,
        program: &'a Program,
        skip_prefix: bool,
    ) -> Result<(), Fault> {
        let var_count = self
            .schema
            .combinator(id)
            .ok_or(ExecError::Compile(CompileError::UnknownCombinator(id)))?
            .var_count;
        let instrs = if skip_prefix {
            program.body()
        } else {
            program.instrs()
        };
        let kind = ScopeKind::Combinator { id, direction };
        let depth = self.depth;
        if self.traced
            && let Some(sink) = self.trace.as_deref_mut()
        {
            sink.scope_enter(self.schema, kind, depth);
        }
        let res = self.with_frame(var_count, |ex| ex.run(instrs));
        if self.traced
            && let Some(sink) = self.trace.as_deref_mut()
        {
            sink.scope_exit(self.schema, kind, depth);
        }
        res
    }

    /// Runs `f` in a fresh variable window; the window is released on every exit path.
    fn with_frame<R>(
        &mut self,
        var_count: u32,
        f: impl FnOnce(&mut Self) -> Result<R, Fault>,
    ) -> Result<R, Fault> {
        if self.depth >= self.limits.max_depth {
            return Err(ExecError::DepthExceeded(self.limits.max_depth).into());
        }
        let base = self.scratch.slots.len();
        let top = base + var_count as usize;
        if top > self.limits.max_var_slots {
            return Err(ExecError::TooManyVariables(self.limits.max_var_slots).into());
        }
        self.scratch.slots.resize(top, None);
        let saved = core::mem::replace(&mut self.base, base);
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        self.base = saved;
        self.scratch.slots.truncate(base);
        res
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            read: self.reader.position(),
            write: self.writer.len(),
            trees: self.scratch.trees.len(),
            values: self.values.len(),
            fetched: self.scratch.fetched.len(),
        }
    }

    fn rewind(&mut self, cp: &Checkpoint) {
        self.reader.set_position(cp.read);
        self.writer.truncate(cp.write);
        self.scratch.trees.truncate(cp.trees);
        self.values.truncate(cp.values);
        self.scratch.fetched.truncate(cp.fetched);
    }

    fn pop_tree(&mut self) -> Result<ResultTree, Fault> {
        self.scratch
            .trees
            .pop()
            .ok_or(Fault::Fatal(ExecError::StackUnderflow))
    }

    fn pop_nat(&mut self) -> Result<i32, Fault> {
        match self.pop_tree()? {
            ResultTree::Nat(n) => Ok(n),
            _ => Err(Mismatch::Witness.into()),
        }
    }

    fn pop_count(&mut self) -> Result<i32, Fault> {
        let n = self.pop_nat()?;
        if n < 0 {
            return Err(ExecError::NegativeCount(n).into());
        }
        Ok(n)
    }

    fn read_count(&mut self) -> Result<i32, Fault> {
        let n = self.reader.read_i32()?;
        if n < 0 {
            return Err(ExecError::NegativeCount(n).into());
        }
        Ok(n)
    }

    /// Capacity worth reserving for `n` elements, bounded by the words left to read.
    fn capacity(&self, n: i32) -> usize {
        usize::try_from(n)
            .unwrap_or_default()
            .min(self.reader.remaining_words())
    }

    fn split_trees(&mut self, n: usize) -> Result<Vec<ResultTree>, Fault> {
        let len = self.scratch.trees.len();
        let at = len
            .checked_sub(n)
            .ok_or(Fault::Fatal(ExecError::StackUnderflow))?;
        Ok(self.scratch.trees.split_off(at))
    }

    fn top_value(&self) -> Result<&'a Value, Fault> {
        self.values
            .last()
            .copied()
            .ok_or(Fault::Fatal(ExecError::StackUnderflow))
    }

    fn pop_fetched(&mut self) -> Result<Value, Fault> {
        self.scratch
            .fetched
            .pop()
            .ok_or(Fault::Fatal(ExecError::StackUnderflow))
    }

    fn slot_mut(&mut self, var: u32) -> Result<&mut Option<ResultTree>, Fault> {
        self.scratch
            .slots
            .get_mut(self.base + var as usize)
            .ok_or(Fault::Fatal(ExecError::UnboundVariable(var)))
    }

    fn bound(&self, var: u32) -> Result<&ResultTree, Fault> {
        self.scratch
            .slots
            .get(self.base + var as usize)
            .and_then(Option::as_ref)
            .ok_or(Fault::Fatal(ExecError::UnboundVariable(var)))
    }

    fn bind_nat(&mut self, var: u32, n: i32) -> Result<(), Fault> {
        let slot = self.slot_mut(var)?;
        match slot {
            None => *slot = Some(ResultTree::Nat(n)),
            Some(ResultTree::Nat(m)) if *m == n => {}
            Some(ResultTree::Nat(_)) => return Err(Mismatch::VariableMismatch(var).into()),
            Some(_) => return Err(ExecError::VariableKind(var).into()),
        }
        Ok(())
    }

    fn bit_set(&self, var: u32, bit: u32) -> Result<bool, Fault> {
        match self
            .scratch
            .slots
            .get(self.base + var as usize)
            .ok_or(Fault::Fatal(ExecError::UnboundVariable(var)))?
        {
            None => Ok(false),
            Some(ResultTree::Nat(n)) => Ok(n.checked_shr(bit).is_some_and(|v| v & 1 != 0)),
            Some(_) => Err(ExecError::VariableKind(var).into()),
        }
    }

    fn run(&mut self, instrs: &'a [Instr]) -> Result<(), Fault> {
        let mut pc = 0;
        while let Some(instr) = instrs.get(pc) {
            pc += 1;
            match instr {
                Instr::UniType { ty } => match self.pop_tree()? {
                    ResultTree::Type {
                        ty: found,
                        children,
                        ..
                    } if found == *ty => self.scratch.trees.extend(children.into_iter().rev()),
                    _ => return Err(Mismatch::Witness.into()),
                },
                Instr::UniNat { value } => {
                    if self.pop_nat()? != *value {
                        return Err(Mismatch::Witness.into());
                    }
                }
                Instr::UniArray { names } => match self.pop_tree()? {
                    ResultTree::Array {
                        multiplicity,
                        names: found,
                        fields,
                    } if found == *names => {
                        self.scratch.trees.extend(fields.into_iter().rev());
                        self.scratch.trees.push(*multiplicity);
                    }
                    _ => return Err(Mismatch::Witness.into()),
                },
                Instr::BindTypeVar { var } => {
                    let tree = self.pop_tree()?;
                    *self.slot_mut(*var)? = Some(tree);
                }
                Instr::CheckTypeVar { var } => {
                    let tree = self.pop_tree()?;
                    let slot = self.slot_mut(*var)?;
                    match slot {
                        None => *slot = Some(tree),
                        Some(bound) if *bound == tree => {}
                        Some(_) => return Err(Mismatch::Witness.into()),
                    }
                }
                Instr::BindNatVar { var, diff } | Instr::CheckNatVar { var, diff } => {
                    let n = self.pop_nat()?;
                    let v = n
                        .checked_sub(*diff)
                        .filter(|v| *v >= 0)
                        .ok_or(Mismatch::Witness)?;
                    match self.bind_nat(*var, v) {
                        Err(Fault::Mismatch(_)) => return Err(Mismatch::Witness.into()),
                        res => res?,
                    }
                }
                Instr::PushTree(tree) => self.scratch.trees.push(tree.clone()),
                Instr::PushTypeVar { var, bare } => {
                    let mut tree = self.bound(*var)?.clone();
                    if *bare && let ResultTree::Type { bare: b, .. } = &mut tree {
                        *b = true;
                    }
                    self.scratch.trees.push(tree);
                }
                Instr::PushNatVar { var, diff } => {
                    let ResultTree::Nat(n) = self.bound(*var)? else {
                        return Err(ExecError::VariableKind(*var).into());
                    };
                    let v = n.checked_add(*diff).ok_or(Mismatch::Witness)?;
                    self.scratch.trees.push(ResultTree::Nat(v));
                }
                Instr::CreateType { ty, bare } => {
                    let arity = self
                        .schema
                        .ty(*ty)
                        .ok_or(ExecError::Compile(CompileError::UnknownType(*ty)))?
                        .arity;
                    let children = self.split_trees(arity as usize)?;
                    self.scratch.trees.push(ResultTree::Type {
                        ty: *ty,
                        bare: *bare,
                        children,
                    });
                }
                Instr::CreateArray { names } => {
                    let fields = self.split_trees(names.len())?;
                    let multiplicity = self.pop_tree()?;
                    self.scratch.trees.push(ResultTree::Array {
                        multiplicity: Box::new(multiplicity),
                        names: names.clone(),
                        fields,
                    });
                }
                Instr::CheckBit { var, bit, skip } => {
                    if !self.bit_set(*var, *bit)? {
                        pc += *skip;
                    }
                }
                Instr::Return => return Ok(()),

                Instr::StoreTag(tag) => self.writer.write_i32(*tag),
                Instr::StoreField { name, index } => {
                    let map = self.top_value()?.as_map().ok_or(Mismatch::NotAMap)?;
                    let field = map
                        .get_field(name, index)
                        .ok_or_else(|| Mismatch::MissingField(name.clone()))?;
                    self.values.push(field);
                }
                Instr::PopValue => {
                    self.values
                        .pop()
                        .ok_or(Fault::Fatal(ExecError::StackUnderflow))?;
                }
                Instr::StoreInt => {
                    let v = self.top_value()?.to_i64().ok_or(Mismatch::NotAScalar)?;
                    let v = i32::try_from(v).map_err(|_| Mismatch::IntOutOfRange(v))?;
                    self.writer.write_i32(v);
                }
                Instr::StoreLong => {
                    let v = self.top_value()?.to_i64().ok_or(Mismatch::NotAScalar)?;
                    self.writer.write_i64(v);
                }
                Instr::StoreDouble => {
                    let v = self.top_value()?.to_f64().ok_or(Mismatch::NotAScalar)?;
                    self.writer.write_f64(v);
                }
                Instr::StoreString => {
                    let v = self.top_value()?.to_bytes().ok_or(Mismatch::NotAScalar)?;
                    self.writer.write_string(&v).map_err(Mismatch::Encode)?;
                }
                Instr::StoreBool => {
                    let v = self.top_value()?;
                    self.store_bool(v, false)?;
                }
                Instr::StoreVarNum { var } => {
                    let raw = self.top_value()?.to_i64().ok_or(Mismatch::NotAScalar)?;
                    let n = i32::try_from(raw)
                        .or_else(|_| u32::try_from(raw).map(u32::cast_signed))
                        .map_err(|_| Mismatch::IntOutOfRange(raw))?;
                    self.bind_nat(*var, n)?;
                    self.writer.write_i32(n);
                }
                Instr::StoreType => {
                    let tree = self.pop_tree()?;
                    self.store_type(tree)?;
                }
                Instr::StoreInline { ctor } => self.call_store(*ctor, true)?,
                Instr::StoreArray { body } => {
                    let n = self.pop_count()?;
                    let list = self.top_value()?.as_map().ok_or(Mismatch::NotAMap)?;
                    for i in 0..i64::from(n) {
                        let item = list
                            .get(&Key::Int(i))
                            .ok_or(Mismatch::MissingField(Key::Int(i)))?;
                        self.values.push(item);
                        self.run(body.instrs())?;
                        self.values.pop();
                    }
                }
                Instr::StoreVector { body } => {
                    let list = self.top_value()?.as_map().ok_or(Mismatch::NotAMap)?;
                    let n = self.write_count(list.len())?;
                    for i in 0..i64::from(n) {
                        let item = list
                            .get(&Key::Int(i))
                            .ok_or(Mismatch::MissingField(Key::Int(i)))?;
                        self.values.push(item);
                        self.run(body.instrs())?;
                        self.values.pop();
                    }
                }
                Instr::StoreDictionary { key, body } => {
                    let map = self.top_value()?.as_map().ok_or(Mismatch::NotAMap)?;
                    self.write_count(map.len())?;
                    for (k, item) in map.iter() {
                        self.write_key(*key, k)?;
                        self.values.push(item);
                        self.run(body.instrs())?;
                        self.values.pop();
                    }
                }
                Instr::StoreFunction => {
                    let call = self.top_value()?;
                    let function = self.called_function(call)?;
                    self.call_store(function, false)?;
                }

                Instr::ExpectTag(expected) => {
                    let found = self.reader.read_i32()?;
                    if found != *expected {
                        return Err(Mismatch::UnexpectedTag {
                            expected: *expected,
                            found,
                        }
                        .into());
                    }
                }
                Instr::EndField { key } => {
                    let v = self.pop_fetched()?;
                    let parent = self
                        .scratch
                        .fetched
                        .last_mut()
                        .and_then(Value::as_map_mut)
                        .ok_or(Fault::Fatal(ExecError::StackUnderflow))?;
                    parent.insert(key.clone(), v);
                }
                Instr::FetchInt => {
                    let v = self.reader.read_i32()?;
                    self.scratch.fetched.push(Value::Int(i64::from(v)));
                }
                Instr::FetchLong => {
                    let v = self.reader.read_i64()?;
                    self.scratch.fetched.push(Value::Int(v));
                }
                Instr::FetchDouble => {
                    let v = self.reader.read_f64()?;
                    self.scratch.fetched.push(Value::Float(v));
                }
                Instr::FetchString => {
                    let v = self.reader.read_string()?;
                    self.scratch.fetched.push(Value::Str(v.to_vec()));
                }
                Instr::FetchTrue => self.scratch.fetched.push(Value::Bool(true)),
                Instr::FetchFalse => self.scratch.fetched.push(Value::Bool(false)),
                Instr::FetchMap => self.scratch.fetched.push(Value::Map(Map::new())),
                Instr::FetchVarNum { var } => {
                    let n = self.reader.read_i32()?;
                    *self.slot_mut(*var)? = Some(ResultTree::Nat(n));
                    self.scratch.fetched.push(Value::Int(i64::from(n)));
                }
                Instr::FetchCheckVarNum { var } => {
                    let n = self.reader.read_i32()?;
                    self.bind_nat(*var, n)?;
                    self.scratch.fetched.push(Value::Int(i64::from(n)));
                }
                Instr::FetchType => {
                    let tree = self.pop_tree()?;
                    self.fetch_type(tree)?;
                }
                Instr::FetchInline { ctor } => self.call_fetch(*ctor, true)?,
                Instr::FetchArray { body } => {
                    let n = self.pop_count()?;
                    self.fetch_list(n, body)?;
                }
                Instr::FetchVector { body } => {
                    let n = self.read_count()?;
                    self.fetch_list(n, body)?;
                }
                Instr::FetchDictionary { key, body } => {
                    let n = self.read_count()?;
                    let mut map = Map::with_capacity(self.capacity(n));
                    for _ in 0..n {
                        let k = match key {
                            DictKey::Str => Key::from_bytes(self.reader.read_string()?),
                            DictKey::Int => Key::Int(i64::from(self.reader.read_i32()?)),
                            DictKey::Long => Key::Int(self.reader.read_i64()?),
                        };
                        self.run(body.instrs())?;
                        map.insert(k, self.pop_fetched()?);
                    }
                    self.scratch.fetched.push(Value::Map(map));
                }
            }
        }
        Ok(())
    }

    /// Resolves the function a nested call names through `_` (or index 0), by name or wire id.
    fn called_function(&self, call: &Value) -> Result<CombinatorId, Mismatch> {
        let selector = call
            .as_map()
            .and_then(|m| m.get_field(&Key::discriminator(), &Key::Int(0)))
            .ok_or(Mismatch::MissingDiscriminator("function call".into()))?;
        let found = match selector {
            Value::Int(id) => i32::try_from(*id)
                .ok()
                .and_then(|id| self.schema.function_by_wire_id(id)),
            other => other.to_bytes().and_then(|name| {
                core::str::from_utf8(&name)
                    .ok()
                    .and_then(|n| self.schema.function_by_name(n))
            }),
        };
        found.ok_or_else(|| {
            Mismatch::UnknownFunction(Box::from(&*selector.to_bytes().unwrap_or_default()))
        })
    }

    fn write_count(&mut self, len: usize) -> Result<i32, Fault> {
        let n = i32::try_from(len).map_err(|_| Mismatch::TooManyElements(len))?;
        self.writer.write_i32(n);
        Ok(n)
    }

    fn write_key(&mut self, kind: DictKey, key: &Key) -> Result<(), Fault> {
        match (kind, key) {
            (DictKey::Str, _) => self
                .writer
                .write_string(&key.to_bytes())
                .map_err(Mismatch::Encode)?,
            (DictKey::Int, Key::Int(i)) => {
                let v = i32::try_from(*i).map_err(|_| Mismatch::IntOutOfRange(*i))?;
                self.writer.write_i32(v);
            }
            (DictKey::Long, Key::Int(i)) => self.writer.write_i64(*i),
            (DictKey::Int | DictKey::Long, Key::Str(_)) => {
                return Err(Mismatch::BadKey(key.clone()).into());
            }
        }
        Ok(())
    }

    fn fetch_list(&mut self, n: i32, body: &'a Program) -> Result<(), Fault> {
        let mut list = Map::with_capacity(self.capacity(n));
        for _ in 0..n {
            self.run(body.instrs())?;
            list.push(self.pop_fetched()?);
        }
        self.scratch.fetched.push(Value::Map(list));
        Ok(())
    }

    fn store_bool(&mut self, value: &Value, bare: bool) -> Result<(), Fault> {
        let truth = match value.discriminator() {
            Some(name) => match &*name {
                b"boolTrue" => true,
                b"boolFalse" => false,
                other => return Err(Mismatch::UnknownConstructor(Box::from(other)).into()),
            },
            None if value.as_map().is_some() => return Err(Mismatch::NotAScalar.into()),
            None => value.to_bool(),
        };
        if !bare {
            self.writer
                .write_i32(if truth { ID_BOOL_TRUE } else { ID_BOOL_FALSE });
        }
        Ok(())
    }

    fn store_type(&mut self, tree: ResultTree) -> Result<(), Fault> {
        let (ty, bare) = match &tree {
            ResultTree::Type { ty, bare, .. } => (*ty, *bare),
            _ => return Err(ExecError::MalformedTree.into()),
        };
        let schema = self.schema;
        let t = schema
            .ty(ty)
            .ok_or(ExecError::Compile(CompileError::UnknownType(ty)))?;
        let value = self.top_value()?;
        if t.wire_id == TYPE_ID_BOOL {
            return self.store_bool(value, bare);
        }
        match t.constructors.as_slice() {
            [] => Err(Mismatch::NoConstructors(t.name.clone()).into()),
            [only] => self.store_with(tree, *only, bare),
            ctors => {
                if let Some(ctor) = self.maybe_constructor(ctors, value) {
                    return self.store_with(tree, ctor, bare);
                }
                if let Some(name) = value.discriminator() {
                    let ctor = ctors
                        .iter()
                        .copied()
                        .find(|&c| {
                            schema
                                .combinator(c)
                                .is_some_and(|c| c.name.as_bytes() == &*name)
                        })
                        .ok_or_else(|| Mismatch::UnknownConstructor(Box::from(&*name)))?;
                    return self.store_with(tree, ctor, bare);
                }
                if !self.limits.allow_constructor_guess {
                    return Err(Mismatch::MissingDiscriminator(t.name.clone()).into());
                }
                tracing::warn!(
                    ty = %schema.display_tree(&tree),
                    "union value has no `_` discriminator; guessing the constructor is deprecated"
                );
                for &ctor in ctors {
                    let cp = self.checkpoint();
                    match self.store_with(tree.clone(), ctor, bare) {
                        Ok(()) => return Ok(()),
                        Err(Fault::Mismatch(m)) => {
                            tracing::trace!(ty = &*t.name, ctor = ctor.0, reason = %m, "constructor rejected");
                            self.rewind(&cp);
                        }
                        Err(fatal) => return Err(fatal),
                    }
                }
                Err(Mismatch::NoConstructorMatched(t.name.clone()).into())
            }
        }
    }

    /// `Maybe` picks its constructor from the value itself: null or `false` is `maybeFalse`.
    fn maybe_constructor(&self, ctors: &[CombinatorId], value: &Value) -> Option<CombinatorId> {
        let wanted = match value {
            Value::Null | Value::Bool(false) => ID_MAYBE_FALSE,
            _ => ID_MAYBE_TRUE,
        };
        let mut found = None;
        for &c in ctors {
            match self.schema.combinator(c)?.wire_id {
                id if id == wanted => found = Some(c),
                ID_MAYBE_TRUE | ID_MAYBE_FALSE => {}
                _ => return None,
            }
        }
        found
    }

    fn store_with(&mut self, tree: ResultTree, ctor: CombinatorId, bare: bool) -> Result<(), Fault> {
        let comb = self
            .schema
            .combinator(ctor)
            .ok_or(ExecError::Compile(CompileError::UnknownCombinator(ctor)))?;
        if !bare && &*comb.name != "_" {
            self.writer.write_i32(comb.wire_id);
        }
        self.scratch.trees.push(tree);
        self.call_store(ctor, false)
    }

    fn fetch_type(&mut self, tree: ResultTree) -> Result<(), Fault> {
        let (ty, bare) = match &tree {
            ResultTree::Type { ty, bare, .. } => (*ty, *bare),
            _ => return Err(ExecError::MalformedTree.into()),
        };
        let schema = self.schema;
        let t = schema
            .ty(ty)
            .ok_or(ExecError::Compile(CompileError::UnknownType(ty)))?;
        let ctor = if bare {
            match t.constructors.as_slice() {
                [] => return Err(Mismatch::NoConstructors(t.name.clone()).into()),
                [only] => {
                    self.fetch_with(tree, *only)?;
                    *only
                }
                ctors => self.fetch_any(&tree, ctors, &t.name)?,
            }
        } else {
            let pos = self.reader.position();
            let tag = self.reader.read_i32()?;
            let matching = t.constructors.iter().copied().find(|&c| {
                schema
                    .combinator(c)
                    .is_some_and(|c| c.wire_id == tag)
            });
            match (matching, t.default_constructor()) {
                (Some(ctor), _) => {
                    self.fetch_with(tree, ctor)?;
                    ctor
                }
                (None, Some(fallback)) => {
                    self.reader.set_position(pos);
                    self.fetch_with(tree, fallback)?;
                    fallback
                }
                (None, None) => {
                    return Err(Mismatch::UnknownTag {
                        ty: t.name.clone(),
                        tag,
                    }
                    .into());
                }
            }
        };
        if !bare
            && t.constructors.len() > 1
            && !t.hides_constructor()
            && let Some(comb) = schema.combinator(ctor)
            && let Some(map) = self.scratch.fetched.last_mut().and_then(Value::as_map_mut)
        {
            map.insert(Key::discriminator(), Value::str(&*comb.name));
        }
        Ok(())
    }

    fn fetch_any(
        &mut self,
        tree: &ResultTree,
        ctors: &[CombinatorId],
        ty: &str,
    ) -> Result<CombinatorId, Fault> {
        for &ctor in ctors {
            let cp = self.checkpoint();
            match self.fetch_with(tree.clone(), ctor) {
                Ok(()) => return Ok(ctor),
                Err(Fault::Mismatch(m)) => {
                    tracing::trace!(ty, ctor = ctor.0, reason = %m, "constructor rejected");
                    self.rewind(&cp);
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Err(Mismatch::NoConstructorMatched(ty.into()).into())
    }

    fn fetch_with(&mut self, tree: ResultTree, ctor: CombinatorId) -> Result<(), Fault> {
        self.scratch.trees.push(tree);
        self.call_fetch(ctor, false)
    }
}
