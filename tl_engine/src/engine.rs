// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request/response façade.
//!
//! [`Engine`] pairs a shared [`Schema`] with execution [`Limits`]. Storing a call yields a
//! [`Request`] that remembers the response witness; the matching response is fetched against it.
//!
//! ```
//! use tl_engine::{Engine, Schema, Selector, Value};
//! use tl_engine::schema::{ArgDecl, CombinatorDecl, ExprDecl, SchemaBuilder, SchemaVersion, prelude};
//!
//! let mut b = SchemaBuilder::with_prelude(SchemaVersion::V3);
//! b.function(
//!     CombinatorDecl::new(0x0bad_f00d, "echo", prelude::TYPE_INT, ExprDecl::ty(prelude::TYPE_INT))
//!         .arg(ArgDecl::new("x", ExprDecl::bare(prelude::TYPE_INT))),
//! );
//! let engine = Engine::new(Schema::load(&b.build().unwrap()).unwrap());
//!
//! let request = engine
//!     .compile_and_store(Selector::Name("echo"), &Value::map([("x", 5_i64)]))
//!     .unwrap();
//! assert_eq!(request.bytes.len(), 8);
//! ```

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::compile::CompileError;
use crate::expr::{CombinatorId, ResultTree};
use crate::ids::{RPC_REQ_ERROR, error_code};
use crate::interp::{Exec, ExecError, Fault, Limits, Mismatch, Scratch};
use crate::schema::{Combinator, Schema};
use crate::trace::TraceSink;
use crate::value::{Key, Value};
use crate::wire::{DecodeError, WireReader};

/// How a function is named by the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Selector<'a> {
    /// Function name, e.g. `"users.get"`.
    Name(&'a str),
    /// Function wire id.
    Id(i32),
}

impl fmt::Display for Selector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "#{id:08x}"),
        }
    }
}

/// A serialized call, ready to hand to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Called function.
    pub function: CombinatorId,
    /// Wire bytes of the call.
    pub bytes: Vec<u8>,
    /// `ReqResult<T>` witness the response is fetched against.
    pub witness: ResultTree,
}

/// Error reported by the remote side through the reserved envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    /// Remote error code.
    pub code: i32,
    /// Remote message, lossily decoded as UTF-8.
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

impl core::error::Error for RemoteError {}

/// Errors produced while serializing a call.
#[derive(Clone, Debug, PartialEq)]
pub enum SerializeError {
    /// The selector names no function.
    UnknownFunction(Box<str>),
    /// The value names no function through `_` or its first element.
    MissingSelector,
    /// The value does not fit the function's arguments.
    Mismatch(Mismatch),
    /// Execution aborted.
    Fatal(ExecError),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction(name) => write!(f, "function {name} not found"),
            Self::MissingSelector => write!(f, "call value does not name a function"),
            Self::Mismatch(m) => write!(f, "{m}"),
            Self::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Mismatch(m) => Some(m),
            Self::Fatal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Fault> for SerializeError {
    fn from(f: Fault) -> Self {
        match f {
            Fault::Mismatch(m) => Self::Mismatch(m),
            Fault::Fatal(e) => Self::Fatal(e),
        }
    }
}

/// Errors produced while fetching a response.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchError {
    /// The response is an error envelope.
    Remote(RemoteError),
    /// The response does not match the expected type.
    Mismatch(Mismatch),
    /// Execution aborted.
    Fatal(ExecError),
    /// The value decoded completely but this many bytes were left over.
    ExtraData(usize),
    /// The combinator is not a function of this engine's schema.
    UnknownFunction(Box<str>),
    /// The function's result type depends on its arguments; fetch against a [`Request`].
    OpenResultType(Box<str>),
}

impl FetchError {
    /// Conventional TL error code for this failure.
    #[must_use]
    pub fn tl_error_code(&self) -> i32 {
        match self {
            Self::Remote(r) => r.code,
            Self::Mismatch(_) | Self::Fatal(ExecError::Decode(_) | ExecError::NegativeCount(_)) => {
                error_code::SYNTAX
            }
            Self::ExtraData(_) => error_code::EXTRA_DATA,
            Self::UnknownFunction(_) => error_code::UNKNOWN_FUNCTION_ID,
            Self::Fatal(_) | Self::OpenResultType(_) => error_code::INTERNAL,
        }
    }

    /// Converts the failure into the host error value `{"__error": .., "__error_code": ..}`.
    #[must_use]
    pub fn into_value(self) -> Value {
        let code = self.tl_error_code();
        match self {
            Self::Remote(r) => Value::error(code, r.message),
            other => Value::error(code, other.to_string()),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(r) => write!(f, "{r}"),
            Self::Mismatch(m) => write!(f, "{m}"),
            Self::Fatal(e) => write!(f, "{e}"),
            Self::ExtraData(n) => write!(f, "Not all data fetched ({n} bytes left)"),
            Self::UnknownFunction(name) => write!(f, "function {name} not found"),
            Self::OpenResultType(name) => {
                write!(f, "result type of {name} depends on its arguments")
            }
        }
    }
}

impl core::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Remote(r) => Some(r),
            Self::Mismatch(m) => Some(m),
            Self::Fatal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Fault> for FetchError {
    fn from(f: Fault) -> Self {
        match f {
            Fault::Mismatch(m) => Self::Mismatch(m),
            Fault::Fatal(e) => Self::Fatal(e),
        }
    }
}

/// Recognizes an error envelope and extracts its code and message.
///
/// Returns `None` when `bytes` does not start with the reserved tag or the envelope is truncated.
#[must_use]
pub fn fetch_error_envelope(bytes: &[u8]) -> Option<RemoteError> {
    read_envelope(bytes)?.ok()
}

fn read_envelope(bytes: &[u8]) -> Option<Result<RemoteError, DecodeError>> {
    let mut r = WireReader::new(bytes);
    if r.read_i32().ok()? != RPC_REQ_ERROR {
        return None;
    }
    Some(read_envelope_body(&mut r))
}

fn read_envelope_body(r: &mut WireReader<'_>) -> Result<RemoteError, DecodeError> {
    // Placeholder for the remote actor id.
    r.read_i64()?;
    let code = r.read_i32()?;
    let message = String::from_utf8_lossy(r.read_string()?).into_owned();
    Ok(RemoteError { code, message })
}

/// A schema plus execution limits.
#[derive(Clone, Debug)]
pub struct Engine {
    schema: Arc<Schema>,
    limits: Limits,
}

impl Engine {
    /// Creates an engine with default limits.
    #[must_use]
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self::with_limits(schema, Limits::default())
    }

    /// Creates an engine with explicit limits.
    #[must_use]
    pub fn with_limits(schema: impl Into<Arc<Schema>>, limits: Limits) -> Self {
        Self {
            schema: schema.into(),
            limits,
        }
    }

    /// The engine's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The engine's limits.
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Serializes a call of the selected function with arguments from `value`.
    pub fn compile_and_store(
        &self,
        selector: Selector<'_>,
        value: &Value,
    ) -> Result<Request, SerializeError> {
        self.compile_and_store_with(selector, value, &mut Scratch::new(), None)
    }

    /// Like [`Engine::compile_and_store`], reusing `scratch` and reporting to `trace`.
    pub fn compile_and_store_with(
        &self,
        selector: Selector<'_>,
        value: &Value,
        scratch: &mut Scratch,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<Request, SerializeError> {
        let function = match selector {
            Selector::Name(name) => self.schema.function_by_name(name),
            Selector::Id(id) => self.schema.function_by_wire_id(id),
        }
        .ok_or_else(|| SerializeError::UnknownFunction(selector.to_string().into()))?;
        self.store_function(function, value, scratch, trace)
    }

    /// Serializes a call naming its function through `_` (or its first element), either by name
    /// or by wire id.
    pub fn store(&self, value: &Value) -> Result<Request, SerializeError> {
        let selector = value
            .as_map()
            .and_then(|m| m.get_field(&Key::discriminator(), &Key::Int(0)))
            .ok_or(SerializeError::MissingSelector)?;
        let name;
        let selector = match selector {
            Value::Int(id) => Selector::Id(
                i32::try_from(*id)
                    .map_err(|_| SerializeError::UnknownFunction(id.to_string().into()))?,
            ),
            other => {
                name = other.to_bytes().ok_or(SerializeError::MissingSelector)?;
                Selector::Name(
                    core::str::from_utf8(&name).map_err(|_| SerializeError::MissingSelector)?,
                )
            }
        };
        self.compile_and_store(selector, value)
    }

    fn store_function(
        &self,
        function: CombinatorId,
        value: &Value,
        scratch: &mut Scratch,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<Request, SerializeError> {
        let mut ex = Exec::new(&self.schema, &self.limits, scratch, &[], trace);
        let result = match ex.store_call(function, value) {
            Ok(result) => result,
            Err(fault) => {
                tracing::debug!(function = function.0, error = ?fault, "store failed");
                return Err(fault.into());
            }
        };
        let bytes = ex.into_bytes();
        tracing::trace!(function = function.0, len = bytes.len(), "stored call");
        Ok(Request {
            function,
            bytes,
            witness: self.schema.wrap_response(result),
        })
    }

    /// Fetches the response to `request`.
    pub fn fetch_response(&self, request: &Request, bytes: &[u8]) -> Result<Value, FetchError> {
        self.fetch_response_with(request, bytes, &mut Scratch::new(), None)
    }

    /// Like [`Engine::fetch_response`], reusing `scratch` and reporting to `trace`.
    pub fn fetch_response_with(
        &self,
        request: &Request,
        bytes: &[u8],
        scratch: &mut Scratch,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<Value, FetchError> {
        self.fetch_witness(request.function, request.witness.clone(), bytes, scratch, trace)
    }

    /// Fetches a response of `function`, whose result type must not depend on its arguments.
    pub fn fetch_as(&self, function: &Combinator, bytes: &[u8]) -> Result<Value, FetchError> {
        self.fetch_as_with(function, bytes, &mut Scratch::new(), None)
    }

    /// Like [`Engine::fetch_as`], reusing `scratch` and reporting to `trace`.
    pub fn fetch_as_with(
        &self,
        function: &Combinator,
        bytes: &[u8],
        scratch: &mut Scratch,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<Value, FetchError> {
        let id = function.handle();
        let known = self
            .schema
            .combinator(id)
            .is_some_and(|c| core::ptr::eq(c, function) && c.is_function());
        if !known {
            return Err(FetchError::UnknownFunction(function.name.clone()));
        }
        let result = ResultTree::from_closed(&function.result)
            .ok_or_else(|| FetchError::OpenResultType(function.name.clone()))?;
        self.fetch_witness(id, self.schema.wrap_response(result), bytes, scratch, trace)
    }

    fn fetch_witness(
        &self,
        function: CombinatorId,
        witness: ResultTree,
        bytes: &[u8],
        scratch: &mut Scratch,
        trace: Option<&mut dyn TraceSink>,
    ) -> Result<Value, FetchError> {
        if let Some(envelope) = read_envelope(bytes) {
            return Err(match envelope {
                Ok(remote) => FetchError::Remote(remote),
                Err(e) => FetchError::Mismatch(Mismatch::Decode(e)),
            });
        }
        let mut ex = Exec::new(&self.schema, &self.limits, scratch, bytes, trace);
        let value = ex.fetch_call(function, witness).map_err(|fault| {
            tracing::debug!(function = function.0, error = ?fault, "fetch failed");
            FetchError::from(fault)
        })?;
        match ex.remaining_input() {
            0 => Ok(value),
            left => Err(FetchError::ExtraData(left)),
        }
    }

    /// Compiles every function of the schema, reporting the first failure.
    pub fn warm_up(&self) -> Result<(), CompileError> {
        for f in self.schema.functions() {
            self.schema.programs(f.handle())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        ArgDecl, CombinatorDecl, ExprDecl, SchemaBuilder, SchemaVersion, TypeDecl, prelude,
    };
    use crate::trace::{Direction, ScopeKind, TraceMask};
    use crate::value::Map;
    use alloc::vec;

    const TYPE_USER: i32 = 0x1000_0001;
    const USER: i32 = 0x2000_0001;
    const GET_USER: i32 = 0x3000_0001;
    const ECHO: i32 = 0x3000_0002;

    fn engine() -> Engine {
        let mut b = SchemaBuilder::with_prelude(SchemaVersion::V3);
        b.ty(TypeDecl::new(TYPE_USER, "User", 0));
        b.constructor(
            CombinatorDecl::new(USER, "user", TYPE_USER, ExprDecl::ty(TYPE_USER))
                .arg(ArgDecl::nat("flags", 0))
                .arg(ArgDecl::new("id", ExprDecl::bare(prelude::TYPE_INT)))
                .arg(ArgDecl::new("name", ExprDecl::bare(prelude::TYPE_STRING)).optional(0, 0)),
        );
        b.function(
            CombinatorDecl::new(GET_USER, "getUser", TYPE_USER, ExprDecl::ty(TYPE_USER))
                .arg(ArgDecl::new("id", ExprDecl::bare(prelude::TYPE_INT))),
        );
        b.function(
            CombinatorDecl::new(ECHO, "echo", 0, ExprDecl::var(0))
                .arg(ArgDecl::implicit("t", 0))
                .arg(ArgDecl::new("x", ExprDecl::var(0)).exclamation()),
        );
        Engine::new(Schema::load(&b.build().unwrap()).unwrap())
    }

    fn words(ws: &[i32]) -> Vec<u8> {
        ws.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn stores_a_call() {
        let engine = engine();
        let request = engine
            .compile_and_store(Selector::Name("getUser"), &Value::map([("id", 7_i64)]))
            .unwrap();
        assert_eq!(request.bytes, words(&[GET_USER, 7]));
        let by_id = engine
            .compile_and_store(Selector::Id(GET_USER), &Value::map([("id", 7_i64)]))
            .unwrap();
        assert_eq!(by_id, request);
    }

    #[test]
    fn store_selects_function_from_value() {
        let engine = engine();
        let call = Value::map([("_", Value::str("getUser")), ("id", Value::Int(1))]);
        assert_eq!(engine.store(&call).unwrap().bytes, words(&[GET_USER, 1]));
        let by_id = Value::map([("_", Value::Int(i64::from(GET_USER))), ("id", Value::Int(1))]);
        assert_eq!(engine.store(&by_id).unwrap().bytes, words(&[GET_USER, 1]));
        assert_eq!(
            engine
                .store(&Value::map([("_", Value::Int(7))]))
                .unwrap_err(),
            SerializeError::UnknownFunction("#00000007".into())
        );
        assert_eq!(
            engine.store(&Value::Int(3)).unwrap_err(),
            SerializeError::MissingSelector
        );
        assert_eq!(
            engine
                .compile_and_store(Selector::Name("nope"), &Value::Null)
                .unwrap_err(),
            SerializeError::UnknownFunction("nope".into())
        );
    }

    #[test]
    fn fetches_response_with_optional_field() {
        let engine = engine();
        let f = engine.schema().function_by_name("getUser").unwrap();
        let getter = engine.schema().combinator(f).unwrap();
        let mut bytes = words(&[USER, 1, 42]);
        bytes.extend_from_slice(&[2, b'h', b'i', 0]);
        let value = engine.fetch_as(getter, &bytes).unwrap();
        let user = Value::map([
            ("flags", Value::Int(1)),
            ("id", Value::Int(42)),
            ("name", Value::str("hi")),
        ]);
        assert_eq!(value, Value::map([("result", user), ("_", Value::str("_"))]));

        let value = engine.fetch_as(getter, &words(&[USER, 0, 42])).unwrap();
        let result = value.get("result").and_then(Value::as_map).unwrap();
        assert!(result.get_name("name").is_none(), "absent optional field");
    }

    #[test]
    fn envelope_wins_over_result_type() {
        let engine = engine();
        let request = engine
            .compile_and_store(Selector::Name("getUser"), &Value::map([("id", 7_i64)]))
            .unwrap();
        let mut bytes = words(&[RPC_REQ_ERROR, 0, 0, -3000]);
        bytes.extend_from_slice(&[4, b'o', b'o', b'p', b's', 0, 0, 0]);
        let err = engine.fetch_response(&request, &bytes).unwrap_err();
        assert_eq!(
            err,
            FetchError::Remote(RemoteError {
                code: -3000,
                message: "oops".into()
            })
        );
        assert_eq!(fetch_error_envelope(&bytes).unwrap().code, -3000);
        assert_eq!(fetch_error_envelope(&words(&[USER])), None);
        assert_eq!(err.into_value(), Value::error(-3000, "oops"));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let engine = engine();
        let f = engine.schema().function_by_name("getUser").unwrap();
        let getter = engine.schema().combinator(f).unwrap();
        let err = engine
            .fetch_as(getter, &words(&[USER, 0, 42, 9]))
            .unwrap_err();
        assert_eq!(err, FetchError::ExtraData(4));
        assert_eq!(err.tl_error_code(), error_code::EXTRA_DATA);
    }

    #[test]
    fn truncated_response_is_a_syntax_error() {
        let engine = engine();
        let f = engine.schema().function_by_name("getUser").unwrap();
        let getter = engine.schema().combinator(f).unwrap();
        let err = engine.fetch_as(getter, &words(&[USER, 0])).unwrap_err();
        assert_eq!(
            err,
            FetchError::Mismatch(Mismatch::Decode(DecodeError::UnexpectedEof))
        );
        assert_eq!(err.tl_error_code(), error_code::SYNTAX);
    }

    #[test]
    fn nested_call_result_drives_the_response() {
        let engine = engine();
        let call = Value::map([(
            "x",
            Value::map([("_", Value::str("getUser")), ("id", Value::Int(5))]),
        )]);
        let request = engine.compile_and_store(Selector::Name("echo"), &call).unwrap();
        assert_eq!(request.bytes, words(&[ECHO, GET_USER, 5]));

        let echo = engine.schema().function_by_name("echo").unwrap();
        let echo = engine.schema().combinator(echo).unwrap();
        assert!(matches!(
            engine.fetch_as(echo, &[]),
            Err(FetchError::OpenResultType(_))
        ));

        let value = engine
            .fetch_response(&request, &words(&[USER, 0, 3]))
            .unwrap();
        let result = value.get("result").and_then(Value::as_map).unwrap();
        assert_eq!(result.get_name("id"), Some(&Value::Int(3)));
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(bool, ScopeKind, usize)>,
    }

    impl TraceSink for Recorder {
        fn mask(&self) -> TraceMask {
            TraceMask::COMBINATOR
        }

        fn scope_enter(&mut self, _: &Schema, kind: ScopeKind, depth: usize) {
            self.events.push((true, kind, depth));
        }

        fn scope_exit(&mut self, _: &Schema, kind: ScopeKind, depth: usize) {
            self.events.push((false, kind, depth));
        }
    }

    #[test]
    fn trace_sink_sees_balanced_scopes() {
        let engine = engine();
        let f = engine.schema().function_by_name("getUser").unwrap();
        let mut recorder = Recorder::default();
        let mut scratch = Scratch::new();
        engine
            .compile_and_store_with(
                Selector::Name("getUser"),
                &Value::map([("id", 1_i64)]),
                &mut scratch,
                Some(&mut recorder),
            )
            .unwrap();
        let kind = ScopeKind::Combinator {
            id: f,
            direction: Direction::Store,
        };
        assert_eq!(recorder.events, vec![(true, kind, 0), (false, kind, 0)]);
    }

    #[test]
    fn failed_store_leaves_scratch_reusable() {
        let engine = engine();
        let mut scratch = Scratch::new();
        let bad = Value::Map(Map::new());
        assert!(matches!(
            engine.compile_and_store_with(Selector::Name("getUser"), &bad, &mut scratch, None),
            Err(SerializeError::Mismatch(Mismatch::MissingField(_)))
        ));
        let ok = engine
            .compile_and_store_with(
                Selector::Name("getUser"),
                &Value::map([("id", 2_i64)]),
                &mut scratch,
                None,
            )
            .unwrap();
        assert_eq!(ok.bytes, words(&[GET_USER, 2]));
    }
}
