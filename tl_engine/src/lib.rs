// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Schema-driven TL binary serialization.
//!
//! `tl_engine` loads a binary TL schema, compiles each constructor and function into a small
//! bytecode program on first use, and interprets those programs to convert between dynamic
//! [`Value`]s and word-aligned little-endian wire buffers.
//!
//! ## Layers
//! - [`wire`]: word cursor primitives and TL string framing.
//! - [`value`]: the dynamic value model (ordered maps, scalars, byte strings).
//! - [`expr`]: type expressions and result trees (witnesses).
//! - [`schema`]: schema loading, lookup and a schema writer for tooling and tests.
//! - [`compile`]: store/fetch program generation, memoized per combinator.
//! - [`interp`]: the interpreter, its limits and its per-call scratch arena.
//! - [`engine`]: the request/response façade.
//! - [`trace`]: optional scope hooks for profilers.
//!
//! ## Errors
//! Failures inside a call are either local mismatches, which let union dispatch try the next
//! constructor, or fatal execution errors. Neither leaves state behind: a failed call releases
//! its variable windows and stacks, and the next call starts clean.
//!
//! ## `no_std`
//! The crate is `no_std` + `alloc`. The `std` feature only links `std`.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod compile;
pub mod engine;
pub mod expr;
pub mod ids;
pub mod interp;
pub mod schema;
pub mod trace;
pub mod value;
pub mod wire;

pub use compile::CompileError;
pub use engine::{
    Engine, FetchError, RemoteError, Request, Selector, SerializeError, fetch_error_envelope,
};
pub use interp::{ExecError, Limits, Mismatch, Scratch};
pub use schema::{Schema, SchemaError};
pub use value::{Key, Map, Value};
