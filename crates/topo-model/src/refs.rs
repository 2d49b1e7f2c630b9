//! Reference lists and reference descriptors
//!
//! Association-typed attributes are stored on the instance as a
//! delimiter-joined list of target ids. That string is a denormalised copy of
//! the edge set; the edge store stays authoritative.

use crate::error::ModelError;
use crate::fields::INST_ID;
use crate::ids::{InstId, KindId};
use crate::kind::ObjectKind;
use crate::value::{AttrValue, Record};
use serde::{Deserialize, Serialize};

/// Lightweight display descriptor of a referenced instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstNameAsst {
    /// Kind of the referenced instance
    #[serde(rename = "bk_obj_id")]
    pub kind_id: KindId,
    /// Kind display name
    #[serde(rename = "bk_obj_name")]
    pub kind_name: String,
    /// Kind icon
    #[serde(rename = "bk_obj_icon")]
    pub kind_icon: String,
    /// Referenced instance id
    #[serde(rename = "bk_inst_id")]
    pub inst_id: InstId,
    /// Referenced instance name
    #[serde(rename = "bk_inst_name")]
    pub inst_name: String,
    /// Full record, populated only in detail mode
    #[serde(rename = "inst_info", default, skip_serializing_if = "Option::is_none")]
    pub inst_detail: Option<Record>,
}

impl InstNameAsst {
    /// Descriptor for an instance of `kind`
    #[must_use]
    pub fn new(kind: &ObjectKind, inst_id: InstId, inst_name: impl Into<String>) -> Self {
        Self {
            kind_id: kind.id.clone(),
            kind_name: kind.name.clone(),
            kind_icon: kind.icon.clone(),
            inst_id,
            inst_name: inst_name.into(),
            inst_detail: None,
        }
    }

    /// Attach the full record
    #[inline]
    #[must_use]
    pub fn with_detail(mut self, detail: Record) -> Self {
        self.inst_detail = Some(detail);
        self
    }
}

/// Split a delimiter-joined id list
///
/// Blank tokens are skipped.
///
/// # Errors
/// `MalformedReference` on the first token that is not an integer
pub fn parse_reference_ids(raw: &str, delimiter: &str) -> Result<Vec<InstId>, ModelError> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<InstId>()
                .map_err(|_| ModelError::MalformedReference {
                    token: token.to_string(),
                })
        })
        .collect()
}

/// Join ids with the delimiter
#[must_use]
pub fn encode_reference_ids(ids: &[InstId], delimiter: &str) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Normalise an association attribute value into target ids
///
/// Accepts an encoded string, a single integer, resolved descriptors, or a
/// list mixing integers, encoded strings and descriptor-shaped records.
///
/// # Errors
/// `MalformedReference` for non-integer tokens, `TypeMismatch` for values
/// that cannot carry references
pub fn reference_ids(value: &AttrValue, delimiter: &str) -> Result<Vec<InstId>, ModelError> {
    match value {
        AttrValue::Null => Ok(Vec::new()),
        AttrValue::Str(raw) => parse_reference_ids(raw, delimiter),
        AttrValue::Int(id) => Ok(vec![*id]),
        AttrValue::Refs(refs) => Ok(refs.iter().map(|r| r.inst_id).collect()),
        AttrValue::List(items) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    AttrValue::Record(record) => ids.push(record.int(INST_ID)?),
                    other => ids.extend(reference_ids(other, delimiter)?),
                }
            }
            Ok(ids)
        }
        other => Err(ModelError::TypeMismatch {
            expected: "references",
            found: other.type_name(),
        }),
    }
}
