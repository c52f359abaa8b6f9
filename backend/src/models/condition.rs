//! Closed schema for the JSON condition map stored on permissions and grants.
//!
//! ```json
//! {"owner": "self"}
//! {"owner": "listing_owner", "related": "same_agency"}
//! {"role": ["owner", "realtor"]}
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `owner: "self"`
    OwnerSelf,
    /// `owner: "listing_owner"`
    OwnerListing,
    /// `role: "slug"` or `role: ["a", "b"]`
    RoleAny(Vec<String>),
    /// `related: "owner_or_realtor"`
    RelatedOwnerOrRealtor,
    /// `related: "same_agency"`
    RelatedSameAgency,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("conditions must be a JSON object")]
    NotAnObject,

    #[error("unknown condition key '{0}'")]
    UnknownKey(String),

    #[error("unsupported value for condition '{key}': {value}")]
    UnsupportedValue { key: String, value: String },
}

/// Conditions that must all hold (AND across keys).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Parse a stored condition map. `null` and `{}` mean unconditional.
    pub fn parse(value: &Value) -> Result<Self, ConditionError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::parse_map(map),
            _ => Err(ConditionError::NotAnObject),
        }
    }

    /// Parse an optional column value.
    pub fn parse_opt(value: Option<&Value>) -> Result<Self, ConditionError> {
        value.map_or_else(|| Ok(Self::default()), Self::parse)
    }

    fn parse_map(map: &Map<String, Value>) -> Result<Self, ConditionError> {
        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            let unsupported = || ConditionError::UnsupportedValue {
                key: key.clone(),
                value: value.to_string(),
            };
            let condition = match key.as_str() {
                "owner" => match value.as_str() {
                    Some("self") => Condition::OwnerSelf,
                    Some("listing_owner") => Condition::OwnerListing,
                    _ => return Err(unsupported()),
                },
                "role" => Condition::RoleAny(parse_slugs(value).ok_or_else(unsupported)?),
                "related" => match value.as_str() {
                    Some("owner_or_realtor") => Condition::RelatedOwnerOrRealtor,
                    Some("same_agency") => Condition::RelatedSameAgency,
                    _ => return Err(unsupported()),
                },
                other => return Err(ConditionError::UnknownKey(other.to_string())),
            };
            conditions.push(condition);
        }
        Ok(Self(conditions))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }
}

fn parse_slugs(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(slug) if !slug.trim().is_empty() => Some(vec![slug.trim().to_string()]),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .collect(),
        _ => None,
    }
}
