// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::string::String;
use tl_engine::Schema;
use tl_engine::expr::CombinatorId;
use tl_engine::trace::Direction;

/// Optional label resolver for profiling scopes.
///
/// Return `None` to fall back to the default id-based labels.
pub trait LabelResolver {
    /// Resolve a label for a combinator scope.
    fn combinator_label(
        &mut self,
        _id: CombinatorId,
        _direction: Direction,
        _schema: &Schema,
    ) -> Option<String> {
        None
    }
}

/// Default resolver that keeps stable id-based labels.
#[derive(Default, Debug)]
pub struct DefaultLabelResolver;

impl LabelResolver for DefaultLabelResolver {}

/// Resolver that labels scopes with combinator names from the schema.
#[derive(Default, Debug)]
pub struct SchemaNameResolver {
    cache: HashMap<(CombinatorId, Direction), String>,
}

impl LabelResolver for SchemaNameResolver {
    fn combinator_label(
        &mut self,
        id: CombinatorId,
        direction: Direction,
        schema: &Schema,
    ) -> Option<String> {
        if let Some(label) = self.cache.get(&(id, direction)) {
            return Some(label.clone());
        }
        let comb = schema.combinator(id)?;
        let label = format!("{}:{}", direction_prefix(direction), comb.name);
        self.cache.insert((id, direction), label.clone());
        Some(label)
    }
}

pub(crate) fn direction_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Store => "store",
        Direction::Fetch => "fetch",
    }
}

pub(crate) fn default_combinator_label(id: CombinatorId, direction: Direction) -> String {
    format!("{}:{}", direction_prefix(direction), id.0)
}
