//! Role model.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{LikePattern, Patch};

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]{1,63}$").expect("slug pattern is a valid regex")
});

/// Role entity
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to insert a role.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system_role: bool,
}

/// Mutable role attributes. Slug and `is_system_role` are fixed at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    pub name: String,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Role listing filter. Text fields are substring matches.
#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub name: Option<LikePattern>,
    pub slug: Option<LikePattern>,
    pub description: Option<LikePattern>,
    pub is_system_role: Option<bool>,
    pub is_active: Option<bool>,
    pub id_from: Option<i64>,
    pub id_to: Option<i64>,
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        self.name.as_ref().map_or(true, |p| p.matches(&role.name))
            && self.slug.as_ref().map_or(true, |p| p.matches(&role.slug))
            && self.description.as_ref().map_or(true, |p| {
                role.description.as_deref().is_some_and(|d| p.matches(d))
            })
            && self.is_system_role.map_or(true, |v| role.is_system_role == v)
            && self.is_active.map_or(true, |v| role.is_active == v)
            && self.id_from.map_or(true, |v| role.id >= v)
            && self.id_to.map_or(true, |v| role.id <= v)
    }
}

/// Lower-case a slug. Slugs compare case-insensitively.
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_ascii_lowercase()
}

/// Whether a normalized slug has the accepted shape.
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_PATTERN.is_match(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("admin"));
        assert!(is_valid_slug("owner"));
        assert!(is_valid_slug("realtor_pj"));
        assert!(is_valid_slug("agency-staff"));
        assert!(is_valid_slug("a1"));

        assert!(!is_valid_slug("a"), "too short");
        assert!(!is_valid_slug("-leading-dash"));
        assert!(!is_valid_slug("_leading_underscore"));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug(&"x".repeat(65)));
        assert!(is_valid_slug(&"x".repeat(64)));
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("  Owner "), "owner");
        assert!(is_valid_slug(&normalize_slug("REALTOR")));
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let role = Role {
            id: 5,
            name: "Realtor".into(),
            slug: "realtor".into(),
            description: Some("Licensed broker".into()),
            is_system_role: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let filter = RoleFilter {
            slug: Some(LikePattern::contains("alt")),
            description: Some(LikePattern::contains("BROKER")),
            id_from: Some(1),
            id_to: Some(5),
            ..Default::default()
        };
        assert!(filter.matches(&role));

        let filter = RoleFilter {
            is_system_role: Some(true),
            ..Default::default()
        };
        assert!(!filter.matches(&role));
    }
}
