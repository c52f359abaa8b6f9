//! Per-request permission context fed to the condition evaluator.

use std::collections::BTreeMap;

use serde::Serialize;

/// Who is asking and about what.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionContext {
    pub user_id: i64,
    pub user_role_id: i64,
    pub role_slugs: Vec<String>,
    pub metadata: RequestMetadata,
}

impl PermissionContext {
    pub fn new(user_id: i64, user_role_id: i64) -> Self {
        Self {
            user_id,
            user_role_id,
            ..Default::default()
        }
    }

    pub fn with_role_slug(mut self, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        if !slug.is_empty() && !self.role_slugs.contains(&slug) {
            self.role_slugs.push(slug);
        }
        self
    }

    pub fn with_resource_owner(mut self, owner_id: i64) -> Self {
        self.metadata.resource_owner_id = Some(owner_id);
        self
    }
}

/// Request facts used by conditions.
///
/// Named fields cover what the evaluator reads; `extra` holds path params
/// (`param_*`), query params (`query_*`) and anything handlers add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub method: Option<String>,
    pub path: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub resource_id: Option<i64>,
    pub resource_owner_id: Option<i64>,
    pub listing_owner_id: Option<i64>,
    pub resource_agency_id: Option<i64>,
    pub user_agency_id: Option<i64>,
    pub related_realtor_ids: Vec<i64>,
    pub extra: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn insert_param(&mut self, name: &str, value: impl Into<String>) {
        self.extra.insert(format!("param_{name}"), value.into());
    }

    pub fn insert_query(&mut self, name: &str, value: impl Into<String>) {
        self.extra.insert(format!("query_{name}"), value.into());
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.extra.get(&format!("param_{name}")).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.extra.get(&format!("query_{name}")).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_keys() {
        let mut meta = RequestMetadata::default();
        meta.insert_param("id", "55");
        meta.insert_query("status", "open");
        assert_eq!(meta.extra.get("param_id").map(String::as_str), Some("55"));
        assert_eq!(meta.param("id"), Some("55"));
        assert_eq!(meta.query("status"), Some("open"));
        assert_eq!(meta.query("id"), None);
    }

    #[test]
    fn test_role_slugs_deduplicated() {
        let ctx = PermissionContext::new(42, 3)
            .with_role_slug("owner")
            .with_role_slug("owner")
            .with_role_slug("");
        assert_eq!(ctx.role_slugs, vec!["owner".to_string()]);
    }
}
