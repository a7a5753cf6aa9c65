// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling adapters for `tl_engine` (currently Tracy).
//!
//! This crate is `std`-only and keeps `tl_engine` itself free of profiling dependencies.
//! It listens for combinator scope enter/exit callbacks and emits matching profiling scopes.
//!
//! ## Example
//! ```ignore
//! use tl_engine::{Scratch, Selector};
//! use tl_engine_profiling::{ProfilingTraceSink, SchemaNameResolver};
//!
//! let mut sink = ProfilingTraceSink::with_resolver(SchemaNameResolver::default());
//! let request = engine.compile_and_store_with(
//!     Selector::Name("users.get"),
//!     &call,
//!     &mut Scratch::new(),
//!     Some(&mut sink),
//! )?;
//! # Ok::<(), tl_engine::SerializeError>(())
//! ```

mod resolver;
mod sink;

pub use resolver::{DefaultLabelResolver, LabelResolver, SchemaNameResolver};
pub use sink::ProfilingTraceSink;
