//! Bind parameters and bind types.
//!
//! PHQL accepts positional (`?0`) and named (`:name:`, `{name}`) placeholders.
//! Both forms are normalized to a [`BindKey`] so callers may supply
//! `"name"`, `":name"` or an index interchangeably.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a bind parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BindKey {
    /// A named placeholder (`:name:` or `{name}`)
    Named(String),
    /// A numeric placeholder (`?0`)
    Positional(usize),
}

impl BindKey {
    /// Parse a key written with or without its leading colon.
    pub fn parse(raw: &str) -> Self {
        let name = raw.strip_prefix(':').unwrap_or(raw);
        let name = name.strip_suffix(':').unwrap_or(name);
        match name.parse::<usize>() {
            Ok(position) if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) => {
                BindKey::Positional(position)
            }
            _ => BindKey::Named(name.to_string()),
        }
    }

    /// The bare key without the leading colon.
    pub fn name(&self) -> String {
        match self {
            BindKey::Named(name) => name.clone(),
            BindKey::Positional(position) => position.to_string(),
        }
    }

    /// The SQL placeholder (`:name` / `:0`).
    pub fn wildcard(&self) -> String {
        format!(":{}", self.name())
    }

    /// Key of the `index`-th element of an expanded array bind.
    pub fn element(&self, index: usize) -> BindKey {
        BindKey::Named(format!("{}{}", self.name(), index))
    }
}

impl fmt::Display for BindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wildcard())
    }
}

impl From<&str> for BindKey {
    fn from(raw: &str) -> Self {
        BindKey::parse(raw)
    }
}

impl From<String> for BindKey {
    fn from(raw: String) -> Self {
        BindKey::parse(&raw)
    }
}

impl From<&String> for BindKey {
    fn from(raw: &String) -> Self {
        BindKey::parse(raw)
    }
}

impl From<usize> for BindKey {
    fn from(position: usize) -> Self {
        BindKey::Positional(position)
    }
}

/// Declared type of a bind parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindType {
    Null,
    Int,
    Str,
    Bool,
    Decimal,
    Double,
    Blob,
    /// Array of untyped values
    Array,
    /// Array of strings
    ArrayStr,
    /// Array of integers
    ArrayInt,
}

impl BindType {
    /// Resolve a type name used in typed placeholders (`{id:int}`).
    pub fn from_phql(name: &str) -> Option<Self> {
        match name {
            "str" => Some(BindType::Str),
            "int" => Some(BindType::Int),
            "double" => Some(BindType::Double),
            "decimal" => Some(BindType::Decimal),
            "bool" => Some(BindType::Bool),
            "blob" => Some(BindType::Blob),
            "null" => Some(BindType::Null),
            "array" => Some(BindType::Array),
            "array-str" => Some(BindType::ArrayStr),
            "array-int" => Some(BindType::ArrayInt),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BindType::Null => "null",
            BindType::Int => "int",
            BindType::Str => "str",
            BindType::Bool => "bool",
            BindType::Decimal => "decimal",
            BindType::Double => "double",
            BindType::Blob => "blob",
            BindType::Array => "array",
            BindType::ArrayStr => "array-str",
            BindType::ArrayInt => "array-int",
        }
    }

    pub const fn is_array(self) -> bool {
        matches!(self, BindType::Array | BindType::ArrayStr | BindType::ArrayInt)
    }

    /// Type of each element once an array bind is expanded.
    pub const fn element_type(self) -> Option<BindType> {
        match self {
            BindType::ArrayStr => Some(BindType::Str),
            BindType::ArrayInt => Some(BindType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered map keyed by [`BindKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindMap<V> {
    entries: IndexMap<BindKey, V>,
}

/// Bind parameter values.
pub type Binds = BindMap<Value>;

/// Declared bind parameter types.
pub type BindTypes = BindMap<BindType>;

impl<V> BindMap<V> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Insert a value, replacing any previous one for the same key.
    pub fn insert(&mut self, key: impl Into<BindKey>, value: impl Into<V>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<BindKey>, value: impl Into<V>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &BindKey) -> Option<&V> {
        self.entries.get(key)
    }

    /// Look up a key written in any accepted form (`"name"`, `":name"`, `"0"`).
    pub fn lookup(&self, raw: &str) -> Option<&V> {
        self.entries.get(&BindKey::parse(raw))
    }

    pub fn contains(&self, key: &BindKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &BindKey) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindKey, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BindKey> {
        self.entries.keys()
    }
}

impl<V: Clone> BindMap<V> {
    /// Overlay `other` on top of `self`; entries of `other` win.
    pub fn merge(&mut self, other: &BindMap<V>) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Return a new map with `other` overlaid on top of `self`.
    pub fn merged(&self, other: &BindMap<V>) -> BindMap<V> {
        let mut out = self.clone();
        out.merge(other);
        out
    }
}

impl<V> Default for BindMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<BindKey>, V> FromIterator<(K, V)> for BindMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<V> IntoIterator for BindMap<V> {
    type Item = (BindKey, V);
    type IntoIter = indexmap::map::IntoIter<BindKey, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a BindMap<V> {
    type Item = (&'a BindKey, &'a V);
    type IntoIter = indexmap::map::Iter<'a, BindKey, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Build a [`Binds`] map.
///
/// ```
/// use phql_core::binds;
///
/// let binds = binds!["min" => 100_i64, 0 => "x"];
/// assert_eq!(binds.len(), 2);
/// ```
#[macro_export]
macro_rules! binds {
    () => {
        $crate::bind::Binds::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut binds = $crate::bind::Binds::new();
        $(binds.insert($crate::bind::BindKey::from($key), $crate::value::Value::from($value));)+
        binds
    }};
}

impl From<i32> for BindKey {
    fn from(position: i32) -> Self {
        BindKey::Positional(usize::try_from(position).unwrap_or_default())
    }
}
