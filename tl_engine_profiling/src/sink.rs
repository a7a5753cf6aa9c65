// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resolver::{DefaultLabelResolver, LabelResolver, default_combinator_label};
use std::string::String;
use std::vec::Vec;
use tl_engine::Schema;
use tl_engine::trace::{Direction, ScopeKind, TraceMask, TraceSink};

type BackendGuard = tracy_client::Span;

struct ScopeEntry {
    kind: ScopeKind,
    depth: usize,
    // Keep the label alive for backends that may borrow it.
    label: String,
    guard: Option<BackendGuard>,
}

/// A `TraceSink` that emits Tracy scopes via `tracy-client`.
pub struct ProfilingTraceSink<R = DefaultLabelResolver> {
    resolver: R,
    stack: Vec<ScopeEntry>,
}

impl ProfilingTraceSink<DefaultLabelResolver> {
    /// Create a new sink with id-based labels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: LabelResolver> ProfilingTraceSink<R> {
    /// Create a new sink with a custom label resolver.
    #[must_use]
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            stack: Vec::new(),
        }
    }

    /// Number of scopes currently open.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.stack.len()
    }

    fn on_scope_enter(&mut self, schema: &Schema, kind: ScopeKind, depth: usize) {
        let label = self.resolve_label(schema, kind);
        let guard = self.start_scope(kind, &label, depth);
        self.stack.push(ScopeEntry {
            kind,
            depth,
            label,
            guard,
        });
    }

    fn on_scope_exit(&mut self, kind: ScopeKind, depth: usize) {
        if let Some(top) = self.stack.last()
            && top.kind == kind
            && top.depth == depth
        {
            if let Some(entry) = self.stack.pop() {
                let ScopeEntry {
                    label: _label,
                    guard: _guard,
                    ..
                } = entry;
                let _ = (_label, _guard);
            }
            return;
        }
        // Out of sync: close everything rather than leak spans.
        self.drop_active_scopes();
    }

    fn resolve_label(&mut self, schema: &Schema, kind: ScopeKind) -> String {
        match kind {
            ScopeKind::Combinator { id, direction } => self
                .resolver
                .combinator_label(id, direction, schema)
                .unwrap_or_else(|| default_combinator_label(id, direction)),
        }
    }

    fn start_scope(&self, kind: ScopeKind, label: &str, depth: usize) -> Option<BackendGuard> {
        let function_name = match kind {
            ScopeKind::Combinator {
                direction: Direction::Store,
                ..
            } => "tl_engine.store",
            ScopeKind::Combinator {
                direction: Direction::Fetch,
                ..
            } => "tl_engine.fetch",
        };
        let line = u32::try_from(depth).unwrap_or(u32::MAX);
        let client = tracy_client::Client::running()?;
        Some(client.span_alloc(Some(label), function_name, "tl_engine", line, 0))
    }

    // Drop in LIFO order so nested spans close inner-to-outer.
    fn drop_active_scopes(&mut self) {
        while let Some(entry) = self.stack.pop() {
            let ScopeEntry {
                label: _label,
                guard: _guard,
                ..
            } = entry;
            let _ = (_label, _guard);
        }
    }
}

impl<R: LabelResolver> TraceSink for ProfilingTraceSink<R> {
    fn mask(&self) -> TraceMask {
        TraceMask::COMBINATOR
    }

    fn scope_enter(&mut self, schema: &Schema, kind: ScopeKind, depth: usize) {
        self.on_scope_enter(schema, kind, depth);
    }

    fn scope_exit(&mut self, _schema: &Schema, kind: ScopeKind, depth: usize) {
        self.on_scope_exit(kind, depth);
    }
}

impl<R> Default for ProfilingTraceSink<R>
where
    R: LabelResolver + Default,
{
    fn default() -> Self {
        Self::with_resolver(R::default())
    }
}

impl<R> std::fmt::Debug for ProfilingTraceSink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingTraceSink")
            .field("stack_depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::ProfilingTraceSink;
    use tl_engine::expr::CombinatorId;
    use tl_engine::schema::{SchemaBuilder, SchemaVersion};
    use tl_engine::trace::{Direction, ScopeKind, TraceSink};
    use tl_engine::Schema;

    fn kind() -> ScopeKind {
        ScopeKind::Combinator {
            id: CombinatorId(0),
            direction: Direction::Store,
        }
    }

    #[test]
    fn start_scope_without_tracy_client_does_not_panic() {
        let sink = ProfilingTraceSink::new();
        let _guard = sink.start_scope(kind(), "test", 0);
    }

    #[test]
    fn mismatched_exit_closes_all_scopes() {
        let schema = Schema::load(&SchemaBuilder::with_prelude(SchemaVersion::V3).build().unwrap())
            .unwrap();
        let mut sink = ProfilingTraceSink::new();
        sink.scope_enter(&schema, kind(), 0);
        sink.scope_enter(&schema, kind(), 1);
        sink.scope_exit(&schema, kind(), 1);
        assert_eq!(sink.open_scopes(), 1);
        sink.scope_enter(&schema, kind(), 1);
        sink.scope_exit(&schema, kind(), 5);
        assert_eq!(sink.open_scopes(), 0);
    }
}
