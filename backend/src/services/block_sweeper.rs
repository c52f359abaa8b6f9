//! Periodic lift of elapsed temporary blocks.
//!
//! Gate reads already treat an elapsed block as lifted; the sweeper only
//! brings the stored rows back to `active`. Failed rows are left for the
//! next tick. Each tick also drops stale sign-in failure counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::repository::AuthzRepository;
use crate::services::authorization_service::AuthorizationService;
use crate::services::metrics_service;
use crate::services::signin_attempts::SigninAttemptGuard;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub unblocked: u64,
    pub failed: usize,
    pub cache_entries_purged: usize,
    pub signin_counters_dropped: usize,
}

pub struct BlockSweeper<R: AuthzRepository> {
    authz: Arc<AuthorizationService<R>>,
    signin_guard: Option<Arc<SigninAttemptGuard>>,
}

impl<R: AuthzRepository> BlockSweeper<R> {
    pub fn new(authz: Arc<AuthorizationService<R>>) -> Self {
        Self {
            authz,
            signin_guard: None,
        }
    }

    pub fn with_signin_guard(mut self, guard: Arc<SigninAttemptGuard>) -> Self {
        self.signin_guard = Some(guard);
        self
    }

    /// Lift every block whose deadline is at or before `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.authz.expired_temp_blocked_users(now).await?;
        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };

        for row in expired {
            match self.authz.lift_expired_temp_block(row.user_id, now).await {
                Ok(Some(_)) => {
                    report.unblocked += 1;
                    tracing::info!(user_id = row.user_id, user_role_id = row.id, "Expired block lifted");
                }
                // Lifted or renewed by a concurrent writer since the listing.
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(user_id = row.user_id, error = %e, "Failed to lift expired block");
                }
            }
        }
        metrics_service::record_sweeper_unblocked(report.unblocked);

        match self.authz.cache().purge_expired().await {
            Ok(purged) => report.cache_entries_purged = purged,
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache entries"),
        }

        if let Some(guard) = &self.signin_guard {
            report.signin_counters_dropped = guard.cleanup_expired().await;
        }

        Ok(report)
    }

    /// Run [`Self::run_once`] every `period` on a background task.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.run_once(Utc::now()).await {
                    Ok(report) if report.expired > 0 => {
                        tracing::debug!(?report, "Block sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Block sweep failed: {}", e),
                }
            }
        })
    }
}
