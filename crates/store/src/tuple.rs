// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LindaSpaces.
//
// LindaSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LindaSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LindaSpaces. If not, see <https://www.gnu.org/licenses/>.

//! Structural tuple and template data model
//!
//! ## Purpose
//! Tuples are immutable, structurally-equatable records deposited into a
//! store and selected back out by template matching. A template is just a
//! tuple: wildcard fields ([`Field::Wildcard`], or [`Field::Null`] for
//! record shapes) match anything at their position, and the
//! [`Tuple::MatchAll`] sentinel accepts any candidate outright.
//!
//! ## Shapes
//! - [`Tuple::Seq`]: ordered positional fields, built with the [`tuple!`]
//!   macro. The workhorse shape.
//! - [`Tuple::Record`]: named fields under a concrete type tag, produced
//!   from any type implementing [`Fields`]. Two records with different
//!   tags never compare equal and never match field-by-field.
//! - [`Tuple::MatchAll`]: template-side sentinel, see above.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An `f64` with total equality and hashing over its bit pattern.
///
/// Lets tuples containing floats participate in `Eq`/`Hash` containers.
/// `NaN` equals itself; `0.0` and `-0.0` are distinct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for OrderedFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single field of a [`Tuple`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float (bit-pattern equality).
    Float(OrderedFloat),
    /// UTF-8 string.
    Str(String),
    /// Boolean.
    Boolean(bool),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Explicit null. On the template side of a record comparison it
    /// matches anything; positional matching treats it as a plain value.
    Null,
    /// Matches any candidate field when it appears in a template. Stored
    /// inside a value it is an ordinary field that only equals itself;
    /// there is no escape mechanism.
    Wildcard,
}

impl Field {
    /// True for the markers that match anything in a record template.
    pub fn is_wild(&self) -> bool {
        matches!(self, Field::Wildcard | Field::Null)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Integer(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(v as i64)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Float(OrderedFloat(v))
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_string())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<bool> for Field {
    fn from(v: bool) -> Self {
        Field::Boolean(v)
    }
}

impl From<Vec<u8>> for Field {
    fn from(v: Vec<u8>) -> Self {
        Field::Bytes(v)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Integer(v) => write!(f, "{}", v),
            Field::Float(v) => write!(f, "{}", v),
            Field::Str(v) => write!(f, "{}", v),
            Field::Boolean(v) => write!(f, "{}", v),
            Field::Bytes(v) => {
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Field::Null => write!(f, "null"),
            Field::Wildcard => write!(f, "*"),
        }
    }
}

/// A structurally-equatable record stored in a space, or used as a
/// template to select one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tuple {
    /// Ordered positional fields.
    Seq(Vec<Field>),
    /// Named fields under a concrete type tag, in declaration order.
    Record {
        /// Concrete type tag; records with different tags are unrelated.
        tag: String,
        /// Declared fields, name and value, in declaration order.
        fields: Vec<(String, Field)>,
    },
    /// Template sentinel that accepts the first available candidate
    /// without consulting the configured matcher.
    MatchAll,
}

/// A [`Tuple`] used as a matching pattern.
pub type Template = Tuple;

impl Tuple {
    /// Positional tuple from a field vector. Prefer the [`tuple!`] macro.
    pub fn new(fields: Vec<Field>) -> Self {
        Tuple::Seq(fields)
    }

    /// The zero-field positional tuple. Also serves as the neutral
    /// template for predicate-driven matchers, which ignore template data.
    pub fn empty() -> Self {
        Tuple::Seq(Vec::new())
    }

    /// Record tuple with an explicit tag and named fields.
    pub fn record(tag: impl Into<String>, fields: Vec<(String, Field)>) -> Self {
        Tuple::Record {
            tag: tag.into(),
            fields,
        }
    }

    /// The match-anything template sentinel.
    pub fn match_all() -> Self {
        Tuple::MatchAll
    }

    /// True iff this is the [`Tuple::MatchAll`] sentinel.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Tuple::MatchAll)
    }

    /// Number of fields (zero for the sentinel).
    pub fn arity(&self) -> usize {
        match self {
            Tuple::Seq(fields) => fields.len(),
            Tuple::Record { fields, .. } => fields.len(),
            Tuple::MatchAll => 0,
        }
    }

    /// Field lookup by name. Record fields resolve by declared name;
    /// positional fields resolve by decimal index ("0", "1", ...).
    pub fn field(&self, name: &str) -> Option<&Field> {
        match self {
            Tuple::Seq(fields) => name.parse::<usize>().ok().and_then(|i| fields.get(i)),
            Tuple::Record { fields, .. } => {
                fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
            }
            Tuple::MatchAll => None,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tuple::Seq(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Tuple::Record { tag, fields } => {
                write!(f, "{}{{", tag)?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, field)?;
                }
                write!(f, "}}")
            }
            Tuple::MatchAll => write!(f, "<match-all>"),
        }
    }
}

/// Capability contract for user types stored as record tuples.
///
/// Implementing this trait declares the type's tag and its fields in a
/// fixed order, which is all the field-by-field matcher needs. Conversion
/// into a [`Tuple::Record`] is then automatic via `From`.
///
/// # Examples
/// ```
/// use lindaspaces_store::tuple::{Field, Fields, Tuple};
///
/// struct Order {
///     item: String,
///     quantity: i64,
/// }
///
/// impl Fields for Order {
///     fn tag(&self) -> &str {
///         "order"
///     }
///     fn fields(&self) -> Vec<(String, Field)> {
///         vec![
///             ("item".into(), Field::from(self.item.as_str())),
///             ("quantity".into(), Field::from(self.quantity)),
///         ]
///     }
/// }
///
/// let tuple = Tuple::from(&Order { item: "bolt".into(), quantity: 40 });
/// assert_eq!(tuple.field("quantity"), Some(&Field::Integer(40)));
/// ```
pub trait Fields {
    /// Concrete type tag; records with different tags never match
    /// field-by-field.
    fn tag(&self) -> &str;

    /// Declared fields in declaration order.
    fn fields(&self) -> Vec<(String, Field)>;
}

impl<T: Fields> From<&T> for Tuple {
    fn from(value: &T) -> Self {
        Tuple::Record {
            tag: value.tag().to_string(),
            fields: value.fields(),
        }
    }
}

/// Builds a positional [`Tuple`] from anything convertible to [`Field`].
///
/// # Examples
/// ```
/// use lindaspaces_store::{tuple, tuple::Field};
///
/// let t = tuple![1, "job", true];
/// let template = tuple![1, Field::Wildcard, Field::Wildcard];
/// assert_eq!(t.arity(), template.arity());
/// ```
#[macro_export]
macro_rules! tuple {
    () => {
        $crate::tuple::Tuple::empty()
    };
    ($($field:expr),+ $(,)?) => {
        $crate::tuple::Tuple::Seq(vec![$($crate::tuple::Field::from($field)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(tuple![1, "a", true], tuple![1, "a", true]);
        assert_ne!(tuple![1, "a"], tuple![1, "b"]);
        assert_ne!(tuple![1], tuple![1, 1]);
    }

    #[test]
    fn float_fields_compare_by_bits() {
        assert_eq!(tuple![1.5], tuple![1.5]);
        assert_eq!(Field::from(f64::NAN), Field::from(f64::NAN));
        assert_ne!(Field::from(0.0), Field::from(-0.0));
    }

    #[test]
    fn record_equality_includes_tag() {
        let a = Tuple::record("job", vec![("id".into(), Field::Integer(1))]);
        let b = Tuple::record("job", vec![("id".into(), Field::Integer(1))]);
        let c = Tuple::record("task", vec![("id".into(), Field::Integer(1))]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn field_lookup_by_name_and_index() {
        let seq = tuple![10, "x"];
        assert_eq!(seq.field("0"), Some(&Field::Integer(10)));
        assert_eq!(seq.field("1"), Some(&Field::Str("x".into())));
        assert_eq!(seq.field("2"), None);
        assert_eq!(seq.field("first"), None);

        let rec = Tuple::record("job", vec![("id".into(), Field::Integer(7))]);
        assert_eq!(rec.field("id"), Some(&Field::Integer(7)));
        assert_eq!(rec.field("missing"), None);
    }

    #[test]
    fn fields_capability_converts_to_record() {
        struct Reading {
            sensor: String,
            value: f64,
        }

        impl Fields for Reading {
            fn tag(&self) -> &str {
                "reading"
            }
            fn fields(&self) -> Vec<(String, Field)> {
                vec![
                    ("sensor".into(), Field::from(self.sensor.as_str())),
                    ("value".into(), Field::from(self.value)),
                ]
            }
        }

        let tuple = Tuple::from(&Reading {
            sensor: "s1".into(),
            value: 0.25,
        });
        assert_eq!(tuple.field("sensor"), Some(&Field::Str("s1".into())));
        assert_eq!(tuple.arity(), 2);
    }

    #[test]
    fn display_forms() {
        assert_eq!(tuple![1, "a", true].to_string(), "(1, a, true)");
        assert_eq!(Field::Bytes(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(Tuple::match_all().to_string(), "<match-all>");
        let rec = Tuple::record("job", vec![("id".into(), Field::Integer(3))]);
        assert_eq!(rec.to_string(), "job{id: 3}");
    }

    #[test]
    fn serde_round_trip() {
        let original = tuple![42, "payload", false, 2.5];
        let json = serde_json::to_string(&original).unwrap();
        let back: Tuple = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);

        let rec = Tuple::record(
            "file",
            vec![
                ("name".into(), Field::Str("a.txt".into())),
                ("bytes".into(), Field::Bytes(vec![1, 2, 3])),
            ],
        );
        let json = serde_json::to_string(&rec).unwrap();
        let back: Tuple = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
