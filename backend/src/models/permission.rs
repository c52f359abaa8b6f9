//! Permission model and action encodings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::{LikePattern, Patch};

/// Permission entity.
///
/// `action` is either a verb paired with `resource` (`listing` / `approve`)
/// or an HTTP action (`POST:/api/v1/listings/:id/approve`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub conditions: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Whether this permission answers the structured `(resource, action)` check.
    ///
    /// An HTTP action also answers for the verb its method stands for, so
    /// `DELETE:/listings/:id` on resource `listing` matches `("listing", "delete")`.
    pub fn matches_resource_action(&self, resource: &str, action: &str) -> bool {
        if !self.resource.eq_ignore_ascii_case(resource) {
            return false;
        }
        if self.action.eq_ignore_ascii_case(action) {
            return true;
        }
        match HttpAction::parse(&self.action) {
            Some(http) => method_verbs(&http.method)
                .iter()
                .any(|verb| verb.eq_ignore_ascii_case(action)),
            None => false,
        }
    }

    /// Whether the stored conditions are absent or an empty object.
    pub fn is_unconditional(&self) -> bool {
        match &self.conditions {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

/// Data required to insert a permission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Option<Value>,
}

/// Partial permission update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub conditions: Patch<Value>,
}

/// Permission listing filter. Text fields are substring matches.
#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    pub name: Option<LikePattern>,
    pub resource: Option<LikePattern>,
    pub action: Option<LikePattern>,
    pub is_active: Option<bool>,
}

impl PermissionFilter {
    pub fn matches(&self, permission: &Permission) -> bool {
        self.name.as_ref().map_or(true, |p| p.matches(&permission.name))
            && self
                .resource
                .as_ref()
                .map_or(true, |p| p.matches(&permission.resource))
            && self.action.as_ref().map_or(true, |p| p.matches(&permission.action))
            && self.is_active.map_or(true, |v| permission.is_active == v)
    }
}

/// `METHOD:/route/pattern` identifying an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HttpAction {
    pub method: String,
    pub path: String,
}

impl HttpAction {
    pub fn new(method: &str, path: &str) -> Self {
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.to_string(),
        }
    }

    /// Parse a stored action; `None` for structured verbs.
    pub fn parse(action: &str) -> Option<Self> {
        let (method, path) = action.split_once(':')?;
        if method.is_empty()
            || !method.chars().all(|c| c.is_ascii_alphabetic())
            || !path.starts_with('/')
        {
            return None;
        }
        Some(Self::new(method, path))
    }

    pub fn as_action(&self) -> String {
        format!("{}:{}", self.method, self.path)
    }
}

impl std::fmt::Display for HttpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.method, self.path)
    }
}

fn method_verbs(method: &str) -> &'static [&'static str] {
    match method {
        "GET" | "HEAD" => &["read", "list", "view"],
        "POST" => &["create"],
        "PUT" | "PATCH" => &["update"],
        "DELETE" => &["delete"],
        _ => &[],
    }
}
