// Copyright 2026 the TL Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-facing dynamic values.
//!
//! [`Value`] mirrors the loosely typed nested arrays that callers build requests from and receive
//! responses as: scalars plus an insertion-ordered [`Map`] keyed by integers or byte strings.
//!
//! Keys follow the host array convention: a string key that spells a canonical decimal integer
//! (`"0"`, `"-12"`, but not `"007"` or `"-0"`) is the same key as that integer.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

/// Map key: positional integer or named byte string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Integer (positional) key.
    Int(i64),
    /// Named key that is not a canonical integer.
    Str(Box<[u8]>),
}

impl Key {
    /// The constructor-name discriminator key, `"_"`.
    #[must_use]
    pub fn discriminator() -> Self {
        Self::Str(Box::from(&b"_"[..]))
    }

    /// Builds a key from raw bytes, normalizing canonical integers.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match canonical_int(bytes) {
            Some(i) => Self::Int(i),
            None => Self::Str(Box::from(bytes)),
        }
    }

    /// Builds a key from a field name.
    #[must_use]
    pub fn name(name: &str) -> Self {
        Self::from_bytes(name.as_bytes())
    }

    /// Renders the key as the bytes a string-keyed dictionary writes.
    #[must_use]
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Int(i) => Cow::Owned(alloc::format!("{i}").into_bytes()),
            Self::Str(s) => Cow::Borrowed(s),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::name(v)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
        }
    }
}

fn canonical_int(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    let first = *digits.first()?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if first == b'0' && (digits.len() > 1 || digits.len() != bytes.len()) {
        return None;
    }
    core::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Insertion-ordered map with hashed lookup.
#[derive(Clone, Default)]
pub struct Map {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
    next_int: i64,
}

impl Map {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            next_int: 0,
        }
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key`.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&Value> {
        let &i = self.index.get(key)?;
        self.entries.get(i).map(|(_, v)| v)
    }

    /// Looks up a named entry.
    #[must_use]
    pub fn get_name(&self, name: &str) -> Option<&Value> {
        self.get(&Key::name(name))
    }

    /// Looks up `name`, falling back to the positional `index`. Null entries count as absent.
    #[must_use]
    pub fn get_field(&self, name: &Key, index: &Key) -> Option<&Value> {
        self.get(name)
            .filter(|v| !v.is_null())
            .or_else(|| self.get(index).filter(|v| !v.is_null()))
    }

    /// Inserts `value` under `key`, replacing (in place) and returning any previous value.
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(&i) = self.index.get(&key)
            && let Some((_, slot)) = self.entries.get_mut(i)
        {
            return Some(core::mem::replace(slot, value));
        }
        if let Key::Int(i) = key
            && i >= self.next_int
        {
            self.next_int = i.saturating_add(1);
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Appends `value` under the next free integer key.
    pub fn push(&mut self, value: impl Into<Value>) {
        let key = self.next_int;
        self.insert(key, value);
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Iterates values in insertion order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (Key, Value);
    type IntoIter = alloc::vec::IntoIter<(Key, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A dynamically typed request or response value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (32- and 64-bit wire integers both land here).
    Int(i64),
    /// Double.
    Float(f64),
    /// Byte string.
    Str(Vec<u8>),
    /// Nested map.
    Map(Map),
}

impl Value {
    /// Builds a string value.
    #[must_use]
    pub fn str(s: impl AsRef<[u8]>) -> Self {
        Self::Str(s.as_ref().to_vec())
    }

    /// Builds a list: a map keyed `0..n`.
    #[must_use]
    pub fn list<V: Into<Self>>(items: impl IntoIterator<Item = V>) -> Self {
        let mut map = Map::new();
        for item in items {
            map.push(item);
        }
        Self::Map(map)
    }

    /// Builds a map value from key/value pairs.
    #[must_use]
    pub fn map<K: Into<Key>, V: Into<Self>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Map(entries.into_iter().collect())
    }

    /// Builds the conventional error value `{"__error": message, "__error_code": code}`.
    #[must_use]
    pub fn error(code: i32, message: impl AsRef<[u8]>) -> Self {
        let mut map = Map::with_capacity(2);
        map.insert("__error", Self::str(message));
        map.insert("__error_code", i64::from(code));
        Self::Map(map)
    }

    /// Returns `true` for [`Value::Null`].
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrows the map, if this is one.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrows the map, if this is one.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrows string bytes, if this is a string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows a UTF-8 string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|s| core::str::from_utf8(s).ok())
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Looks up `key` when this is a map.
    #[must_use]
    pub fn get(&self, key: impl Into<Key>) -> Option<&Self> {
        self.as_map()?.get(&key.into())
    }

    /// Reads the constructor name stored under `"_"` or index 0.
    #[must_use]
    pub fn discriminator(&self) -> Option<Cow<'_, [u8]>> {
        self.as_map()?
            .get_field(&Key::discriminator(), &Key::Int(0))?
            .to_bytes()
    }

    /// Integer coercion: floats truncate, bools map to 0/1, strings parse a leading number.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Float(f) => Some(truncate_f64(*f)),
            Self::Str(s) => Some(leading_int(s)),
            Self::Null | Self::Map(_) => None,
        }
    }

    /// Floating point coercion.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(int_to_f64(*i)),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Float(f) => Some(*f),
            Self::Str(s) => core::str::from_utf8(s)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .or_else(|| Some(int_to_f64(leading_int(s)))),
            Self::Null | Self::Map(_) => None,
        }
    }

    /// String coercion: numbers render in decimal, `true` is `"1"` and `false` is empty.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Self::Str(s) => Some(Cow::Borrowed(s)),
            Self::Int(i) => Some(Cow::Owned(alloc::format!("{i}").into_bytes())),
            Self::Float(v) => Some(Cow::Owned(alloc::format!("{v}").into_bytes())),
            Self::Bool(true) => Some(Cow::Borrowed(b"1")),
            Self::Bool(false) => Some(Cow::Borrowed(b"")),
            Self::Null | Self::Map(_) => None,
        }
    }

    /// Truthiness.
    #[must_use]
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !(s.is_empty() || s.as_slice() == b"0"),
            Self::Map(m) => !m.is_empty(),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "saturating float-to-int conversion is the intended coercion"
)]
fn truncate_f64(f: f64) -> i64 {
    f as i64
}

fn int_to_f64(i: i64) -> f64 {
    i as f64
}

fn leading_int(s: &[u8]) -> i64 {
    let trimmed = s.trim_ascii_start();
    let (negative, digits) = match trimmed.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, trimmed),
    };
    let mut acc: i64 = 0;
    for d in digits.iter().take_while(|d| d.is_ascii_digit()) {
        acc = acc
            .saturating_mul(10)
            .saturating_add(i64::from(*d - b'0'));
    }
    if negative { acc.saturating_neg() } else { acc }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Str(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Self::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_keys_normalize() {
        assert_eq!(Key::name("0"), Key::Int(0));
        assert_eq!(Key::name("-12"), Key::Int(-12));
        assert!(matches!(Key::name("007"), Key::Str(_)));
        assert!(matches!(Key::name("-0"), Key::Str(_)));
        assert!(matches!(Key::name("99999999999999999999"), Key::Str(_)));
        assert!(matches!(Key::name("x1"), Key::Str(_)));
    }

    #[test]
    fn map_keeps_insertion_order_and_replaces_in_place() {
        let mut m = Map::new();
        m.insert("b", 1);
        m.insert("a", 2);
        m.insert("b", 3);
        let keys: Vec<_> = m.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, [Key::name("b"), Key::name("a")]);
        assert_eq!(m.get_name("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn push_continues_after_largest_int_key() {
        let mut m = Map::new();
        m.insert(5, "x");
        m.push("y");
        assert_eq!(m.get(&Key::Int(6)), Some(&Value::str("y")));
    }

    #[test]
    fn field_lookup_falls_back_to_position() {
        let v = Value::map([(Key::Int(1), Value::Int(10)), (Key::name("y"), Value::Int(20))]);
        let m = v.as_map().unwrap();
        assert_eq!(m.get_field(&Key::name("x"), &Key::Int(1)), Some(&Value::Int(10)));
        assert_eq!(m.get_field(&Key::name("y"), &Key::Int(2)), Some(&Value::Int(20)));
        assert_eq!(m.get_field(&Key::name("z"), &Key::Int(3)), None);
    }

    #[test]
    fn discriminator_reads_underscore_or_index_zero() {
        let named = Value::map([("_", "point")]);
        assert_eq!(named.discriminator().as_deref(), Some(&b"point"[..]));
        let positional = Value::list(["point"]);
        assert_eq!(positional.discriminator().as_deref(), Some(&b"point"[..]));
        assert_eq!(Value::Int(3).discriminator(), None);
    }

    #[test]
    fn scalar_coercions() {
        assert_eq!(Value::str(" 42abc").to_i64(), Some(42));
        assert_eq!(Value::str("-7").to_i64(), Some(-7));
        assert_eq!(Value::Float(3.9).to_i64(), Some(3));
        assert_eq!(Value::Bool(true).to_i64(), Some(1));
        assert_eq!(Value::map([("a", 1)]).to_i64(), None);
        assert_eq!(Value::Int(12).to_bytes().as_deref(), Some(&b"12"[..]));
        assert_eq!(Value::str("2.5").to_f64(), Some(2.5));
        assert!(!Value::str("0").to_bool());
        assert!(Value::str("no").to_bool());
    }

    #[test]
    fn error_value_shape() {
        let v = Value::error(-1000, "bad");
        assert_eq!(v.get("__error"), Some(&Value::str("bad")));
        assert_eq!(v.get("__error_code"), Some(&Value::Int(-1000)));
    }
}
