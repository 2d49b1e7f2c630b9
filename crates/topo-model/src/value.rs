//! Tagged attribute values and instance records
//!
//! Instances are schemaless at this layer: a [`Record`] maps attribute names
//! to [`AttrValue`]s. Conversions are explicit and fail with
//! [`ModelError::TypeMismatch`] rather than coercing.

use crate::error::ModelError;
use crate::ids::InstId;
use crate::refs::InstNameAsst;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Attribute value
///
/// Variant order matters for untagged deserialisation: arrays always decode
/// as [`AttrValue::List`]; [`AttrValue::Refs`] is produced in-process by
/// association expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String (including delimiter-encoded reference lists)
    Str(String),
    /// Heterogeneous list
    List(Vec<AttrValue>),
    /// Nested record
    Record(Record),
    /// Resolved reference descriptors
    Refs(Vec<InstNameAsst>),
}

impl AttrValue {
    /// Tag name used in diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Refs(_) => "references",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ModelError {
        ModelError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Borrow as string
    ///
    /// # Errors
    /// `TypeMismatch` unless the value is a string
    pub fn as_str(&self) -> Result<&str, ModelError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    /// Read as integer
    ///
    /// # Errors
    /// `TypeMismatch` unless the value is an integer
    pub fn as_i64(&self) -> Result<i64, ModelError> {
        match self {
            Self::Int(v) => Ok(*v),
            other => Err(other.mismatch("int")),
        }
    }

    /// Borrow as resolved reference descriptors
    ///
    /// # Errors
    /// `TypeMismatch` unless the value holds descriptors
    pub fn as_refs(&self) -> Result<&[InstNameAsst], ModelError> {
        match self {
            Self::Refs(refs) => Ok(refs),
            other => Err(other.mismatch("references")),
        }
    }

    /// Borrow as nested record
    ///
    /// # Errors
    /// `TypeMismatch` unless the value is a record
    pub fn as_record(&self) -> Result<&Record, ModelError> {
        match self {
            Self::Record(r) => Ok(r),
            other => Err(other.mismatch("record")),
        }
    }

    /// Borrow as list
    ///
    /// # Errors
    /// `TypeMismatch` unless the value is a list
    pub fn as_list(&self) -> Result<&[AttrValue], ModelError> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.mismatch("list")),
        }
    }

    /// Null, empty string, or empty collection
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Refs(refs) => refs.is_empty(),
            Self::Record(r) => r.is_empty(),
            Self::Bool(_) | Self::Int(_) | Self::Float(_) => false,
        }
    }

    /// Integer list value
    #[must_use]
    pub fn from_ids(ids: &[InstId]) -> Self {
        Self::List(ids.iter().copied().map(Self::Int).collect())
    }

    /// Equality that treats integral floats and integers as the same number
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                #[allow(clippy::cast_precision_loss)]
                let a = *a as f64;
                (a - *b).abs() < f64::EPSILON
            }
            (a, b) => a == b,
        }
    }

    /// Ordering across comparable scalars; `None` for mixed or compound tags
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<InstNameAsst>> for AttrValue {
    fn from(value: Vec<InstNameAsst>) -> Self {
        Self::Refs(value)
    }
}

impl From<Record> for AttrValue {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

/// Attribute map of one instance (or any flat store row)
///
/// Equality ignores insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, AttrValue>);

impl Record {
    /// Create empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a field, returning the previous value
    #[inline]
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Field value
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Remove a field
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.0.shift_remove(key)
    }

    /// Whether the field is present
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    /// Integer field
    ///
    /// # Errors
    /// `MissingField` when absent, `TypeMismatch` when not an integer
    pub fn int(&self, key: &str) -> Result<i64, ModelError> {
        self.get(key)
            .ok_or_else(|| ModelError::MissingField(key.to_string()))?
            .as_i64()
    }

    /// String field
    ///
    /// # Errors
    /// `MissingField` when absent, `TypeMismatch` when not a string
    pub fn string(&self, key: &str) -> Result<&str, ModelError> {
        self.get(key)
            .ok_or_else(|| ModelError::MissingField(key.to_string()))?
            .as_str()
    }

    /// Overwrite fields of `self` with every field of `other`
    pub fn merge(&mut self, other: &Record) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Keep only the listed fields; an empty list keeps everything
    #[must_use]
    pub fn project(&self, fields: &[String]) -> Record {
        if fields.is_empty() {
            return self.clone();
        }
        self.0
            .iter()
            .filter(|(k, _)| fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(String, AttrValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, AttrValue);
    type IntoIter = indexmap::map::IntoIter<String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
