// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Optional execution hooks.
//!
//! The interpreter reports scope boundaries to a [`TraceSink`] supplied per call. Sinks opt into
//! event classes through [`TraceMask`]; with no sink, or an empty mask, the interpreter does no
//! tracing work.

use core::ops::{BitOr, BitOrAssign};

use crate::expr::CombinatorId;
use crate::schema::Schema;

/// Set of event classes a sink wants.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceMask(u8);

impl TraceMask {
    /// No events.
    pub const NONE: Self = Self(0);
    /// Combinator store/fetch scopes.
    pub const COMBINATOR: Self = Self(1 << 0);
    /// Every event class.
    pub const ALL: Self = Self(u8::MAX);

    /// Returns `true` if every class in `other` is enabled.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no class is enabled.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Which program a scope runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Serialization.
    Store,
    /// Deserialization.
    Fetch,
}

/// Kind of traced scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// One invocation of a combinator's program.
    Combinator {
        /// Invoked combinator.
        id: CombinatorId,
        /// Program being run.
        direction: Direction,
    },
}

/// Receiver of interpreter scope events.
///
/// `depth` is the nesting depth of the scope; enter and exit calls for one scope carry the same
/// kind and depth. Exits are reported on failure paths too.
pub trait TraceSink {
    /// Event classes this sink wants.
    fn mask(&self) -> TraceMask;

    /// A scope was entered.
    fn scope_enter(&mut self, _schema: &Schema, _kind: ScopeKind, _depth: usize) {}

    /// A scope was left.
    fn scope_exit(&mut self, _schema: &Schema, _kind: ScopeKind, _depth: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_union() {
        let mut m = TraceMask::NONE;
        assert!(m.is_empty());
        m |= TraceMask::COMBINATOR;
        assert!(m.contains(TraceMask::COMBINATOR));
        assert!(TraceMask::ALL.contains(m | TraceMask::COMBINATOR));
        assert!(!TraceMask::NONE.contains(TraceMask::COMBINATOR));
    }
}
