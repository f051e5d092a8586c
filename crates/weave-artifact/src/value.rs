//! Tagged values for schema-less configuration
//!
//! Condition predicates and context extras carry arbitrary nested data. It is
//! modelled as a closed [`Value`] enum so that consumers can match on it
//! exhaustively.

use crate::hash::ContentHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Dynamically-shaped value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list
    List(Vec<Value>),
    /// String-keyed map with sorted keys
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// String content, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by condition predicates
    ///
    /// `Null`, `false`, zero, the empty string and empty collections are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// Loose equality: numbers compare by value across `Integer`/`Float`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64 - b).abs() < f64::EPSILON
            }
            (a, b) => a == b,
        }
    }

    /// Feed a tagged, length-prefixed encoding into `hasher`
    ///
    /// Map entries are visited in key order, so equal values always hash
    /// identically.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        match self {
            Self::Null => {
                hasher.update_str("null");
            }
            Self::Bool(b) => {
                hasher.update_str("bool").update(&[u8::from(*b)]);
            }
            Self::Integer(i) => {
                hasher.update_str("int").update_i64(*i);
            }
            Self::Float(x) => {
                hasher.update_str("float").update(&x.to_bits().to_le_bytes());
            }
            Self::String(s) => {
                hasher.update_str("str").update_str(s);
            }
            Self::List(items) => {
                hasher.update_str("list").update_i64(items.len() as i64);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Self::Map(entries) => {
                hasher.update_str("map").update_i64(entries.len() as i64);
                for (key, value) in entries {
                    hasher.update_str(key);
                    value.hash_into(hasher);
                }
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}
