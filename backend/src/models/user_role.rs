//! User-role assignment model and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a user-role assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRoleStatus {
    Active,
    Blocked,
    TempBlocked,
    PendingBoth,
    PendingEmail,
    PendingPhone,
    PendingCreci,
    PendingCnpj,
    PendingManual,
    Rejected,
    RefusedImage,
    RefusedDocument,
    RefusedData,
    Deleted,
}

wire_enum!(UserRoleStatus {
    Active => "active",
    Blocked => "blocked",
    TempBlocked => "temp_blocked",
    PendingBoth => "pending_both",
    PendingEmail => "pending_email",
    PendingPhone => "pending_phone",
    PendingCreci => "pending_creci",
    PendingCnpj => "pending_cnpj",
    PendingManual => "pending_manual",
    Rejected => "rejected",
    RefusedImage => "refused_image",
    RefusedDocument => "refused_document",
    RefusedData => "refused_data",
    Deleted => "deleted",
});

/// User-role assignment entity
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserRole {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub is_active: bool,
    pub status: UserRoleStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRole {
    /// Active flag set and not past `expires_at`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| exp > now)
    }

    /// Temp-blocked with a deadline still in the future.
    pub fn is_temp_blocked(&self, now: DateTime<Utc>) -> bool {
        self.status == UserRoleStatus::TempBlocked
            && self.blocked_until.is_some_and(|until| until > now)
    }

    /// Whether this assignment may be used for authorization at `now`.
    ///
    /// `active` always may; `temp_blocked` only once its deadline has passed,
    /// before the sweeper rewrites the row.
    pub fn permits_authorization(&self, now: DateTime<Utc>) -> bool {
        if !self.is_current(now) {
            return false;
        }
        match self.status {
            UserRoleStatus::Active => true,
            UserRoleStatus::TempBlocked => !self.is_temp_blocked(now),
            _ => false,
        }
    }
}

/// Data required to insert a user-role assignment.
#[derive(Debug, Clone)]
pub struct NewUserRole {
    pub user_id: i64,
    pub role_id: i64,
    pub is_active: bool,
    pub status: UserRoleStatus,
    pub expires_at: Option<DateTime<Utc>>,
}
