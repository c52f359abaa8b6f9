//! Role-permission grant model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::Patch;

/// Links a role to a permission. `granted = false` is an explicit deny entry;
/// `conditions`, when set, replace the permission's own conditions for this grant.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RolePermission {
    pub id: i64,
    pub role_id: i64,
    pub permission_id: i64,
    pub granted: bool,
    pub conditions: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRolePermission {
    pub role_id: i64,
    pub permission_id: i64,
    #[serde(default = "default_granted")]
    pub granted: bool,
    #[serde(default)]
    pub conditions: Option<Value>,
}

fn default_granted() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePermissionUpdate {
    #[serde(default)]
    pub granted: Option<bool>,
    #[serde(default)]
    pub conditions: Patch<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RolePermissionFilter {
    pub role_id: Option<i64>,
    pub permission_id: Option<i64>,
    pub granted: Option<bool>,
}

impl RolePermissionFilter {
    pub fn matches(&self, rp: &RolePermission) -> bool {
        self.role_id.map_or(true, |v| rp.role_id == v)
            && self.permission_id.map_or(true, |v| rp.permission_id == v)
            && self.granted.map_or(true, |v| rp.granted == v)
    }
}
