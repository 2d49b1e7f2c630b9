//! Filter conditions and query shapes
//!
//! A [`Condition`] is a conjunction of [`Clause`]s. The same shape filters
//! instance tables and the edge store.

use crate::error::ModelError;
use crate::value::{AttrValue, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a clause
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// Field equals value
    #[default]
    Eq,
    /// Field differs from value
    Ne,
    /// Field is one of a list
    In,
    /// Field is none of a list
    Nin,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Regular-expression match
    Like,
    /// Operator passed through verbatim to the backing store
    Other(String),
}

impl Operator {
    /// Wire form (`$eq`, `$in`, ...)
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Like => "$regex",
            Self::Other(op) => op,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Operator {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(match value.as_str() {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$regex" | "$like" => Self::Like,
            other if other.starts_with('$') && other.len() > 1 => Self::Other(value),
            _ => return Err(ModelError::UnknownOperator(value)),
        })
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        match value {
            Operator::Other(op) => op,
            other => other.as_str().to_string(),
        }
    }
}

/// Single `field <op> value` predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Field name
    pub field: String,
    /// Operator
    #[serde(default)]
    pub operator: Operator,
    /// Operand
    pub value: AttrValue,
}

impl Clause {
    /// Create new clause
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<AttrValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Conjunction of clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition(Vec<Clause>);

impl Condition {
    /// Empty condition (matches everything)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field == value`
    #[inline]
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.op(field, Operator::Eq, value)
    }

    /// Add `field != value`
    #[inline]
    #[must_use]
    pub fn ne(self, field: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.op(field, Operator::Ne, value)
    }

    /// Add `field in values`
    #[must_use]
    pub fn is_in<V: Into<AttrValue>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let list: Vec<AttrValue> = values.into_iter().map(Into::into).collect();
        self.op(field, Operator::In, AttrValue::List(list))
    }

    /// Add an arbitrary clause
    #[inline]
    #[must_use]
    pub fn op(mut self, field: impl Into<String>, operator: Operator, value: impl Into<AttrValue>) -> Self {
        self.0.push(Clause::new(field, operator, value));
        self
    }

    /// Append a clause in place
    #[inline]
    pub fn push(&mut self, clause: Clause) {
        self.0.push(clause);
    }

    /// Append clauses in place
    pub fn extend(&mut self, clauses: impl IntoIterator<Item = Clause>) {
        self.0.extend(clauses);
    }

    /// Clauses in insertion order
    #[inline]
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.0
    }

    /// Whether no clause is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of clauses
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether some clause constrains `field`
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|c| c.field == field)
    }
}

impl From<Vec<Clause>> for Condition {
    fn from(value: Vec<Clause>) -> Self {
        Self(value)
    }
}

/// Pagination and ordering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Rows to skip
    #[serde(default)]
    pub start: usize,
    /// Maximum rows to return
    #[serde(default)]
    pub limit: Option<usize>,
    /// Sort field, `-field` for descending
    #[serde(default)]
    pub sort: Option<String>,
}

impl Page {
    /// With limit
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// With start offset
    #[inline]
    #[must_use]
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// With sort key
    #[inline]
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Sort field and whether it is descending
    #[must_use]
    pub fn sort_key(&self) -> Option<(&str, bool)> {
        let sort = self.sort.as_deref()?.trim();
        if sort.is_empty() {
            return None;
        }
        Some(match sort.strip_prefix('-') {
            Some(field) => (field, true),
            None => (sort, false),
        })
    }
}

/// Instance query: condition, projection, pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryInput {
    /// Filter
    #[serde(default)]
    pub condition: Condition,
    /// Projected fields; empty keeps all
    #[serde(default)]
    pub fields: Vec<String>,
    /// Pagination
    #[serde(default)]
    pub page: Page,
}

impl QueryInput {
    /// Query with a condition and defaults elsewhere
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }

    /// With projection
    #[inline]
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// With pagination
    #[inline]
    #[must_use]
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// Query result: total match count and the current page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstResult {
    /// Total number of matches before pagination
    pub count: u64,
    /// Rows of the requested page
    pub info: Vec<Record>,
}

impl InstResult {
    /// Empty result
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operator_wire_names() {
        assert_eq!(Operator::try_from("$in".to_string()), Ok(Operator::In));
        assert_eq!(String::from(Operator::Like), "$regex");
        assert_eq!(
            Operator::try_from("$exists".to_string()),
            Ok(Operator::Other("$exists".into()))
        );
        assert!(Operator::try_from("eq".to_string()).is_err());
    }

    #[test]
    fn clause_defaults_to_equality() {
        let clause: Clause = serde_json::from_str(r#"{"field": "name", "value": "a"}"#).unwrap();
        assert_eq!(clause.operator, Operator::Eq);
    }

    #[test]
    fn builder_accumulates_clauses() {
        let cond = Condition::new()
            .eq("bk_obj_id", "rack")
            .is_in("bk_inst_id", vec![1_i64, 2, 3]);
        assert_eq!(cond.len(), 2);
        assert!(cond.has_field("bk_inst_id"));
        assert_eq!(
            cond.clauses()[1].value,
            AttrValue::from_ids(&[1, 2, 3])
        );
    }

    #[test]
    fn sort_key_direction() {
        assert_eq!(Page::default().with_sort("-name").sort_key(), Some(("name", true)));
        assert_eq!(Page::default().with_sort("name").sort_key(), Some(("name", false)));
        assert_eq!(Page::default().sort_key(), None);
    }
}
