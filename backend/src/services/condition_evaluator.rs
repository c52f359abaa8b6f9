//! Evaluates permission conditions against a request context.
//!
//! Pure and deterministic: no I/O, no clock. Every condition in a set must
//! hold. Anything that does not parse into the closed schema denies.

use serde_json::Value;

use crate::models::{Condition, ConditionSet, PermissionContext};

/// Evaluate a stored condition map. `None`, `null` and `{}` allow.
pub fn evaluate(conditions: Option<&Value>, ctx: &PermissionContext) -> bool {
    match ConditionSet::parse_opt(conditions) {
        Ok(set) => evaluate_set(&set, ctx),
        Err(err) => {
            tracing::warn!(error = %err, user_id = ctx.user_id, "Denying unrecognized condition");
            false
        }
    }
}

pub fn evaluate_set(set: &ConditionSet, ctx: &PermissionContext) -> bool {
    set.iter().all(|condition| evaluate_condition(condition, ctx))
}

fn evaluate_condition(condition: &Condition, ctx: &PermissionContext) -> bool {
    let meta = &ctx.metadata;
    match condition {
        Condition::OwnerSelf => match meta.resource_owner_id {
            Some(owner) => owner == ctx.user_id,
            None => meta.resource_id == Some(ctx.user_id),
        },
        Condition::OwnerListing => meta.listing_owner_id == Some(ctx.user_id),
        // Only checks that the caller holds an active role; slugs are not compared.
        Condition::RoleAny(_) => ctx.user_role_id > 0,
        Condition::RelatedOwnerOrRealtor => {
            meta.resource_owner_id == Some(ctx.user_id)
                || meta.related_realtor_ids.contains(&ctx.user_id)
        }
        Condition::RelatedSameAgency => match (meta.user_agency_id, meta.resource_agency_id) {
            (Some(user_agency), Some(resource_agency)) => {
                user_agency > 0 && resource_agency > 0 && user_agency == resource_agency
            }
            _ => false,
        },
    }
}
