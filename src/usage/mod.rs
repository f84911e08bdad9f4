#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::UsageLimits;
use crate::database::Database;
use crate::database::models::UsageRecord;
use crate::database::queries::UsageQueries;
use crate::{RagError, Result};

/// Request counter window.
const REQUEST_RESET_HOURS: i64 = 24;
/// Token counter window, 30 days for simplicity.
const TOKEN_RESET_DAYS: i64 = 30;

/// Enforces per-user request and token quotas in front of every
/// pipeline-triggering action.
///
/// Counters reset lazily on access rather than via a background timer. The
/// limit check and the request increment are one conditional update, so two
/// racing requests at the limit boundary admit exactly one.
pub struct UsageGovernor {
    db: Database,
    limits: UsageLimits,
}

impl UsageGovernor {
    #[inline]
    pub fn new(db: Database, limits: UsageLimits) -> Self {
        Self { db, limits }
    }

    /// Admit one request for `user_id`, or fail with
    /// [`RagError::RateLimit`] / [`RagError::TokenLimit`].
    pub async fn check_and_increment(&self, user_id: &str) -> Result<()> {
        self.check_and_increment_at(user_id, Utc::now()).await
    }

    /// Clock-injected variant of [`Self::check_and_increment`] so tests can
    /// exercise the lazy resets deterministically.
    pub async fn check_and_increment_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = self.current_record(user_id, now).await?;

        // Token ceiling is checked before admitting the request; the counter
        // itself only grows via add_tokens, after the response completes.
        if record.tokens_used >= record.token_limit {
            info!("User {} over token limit ({})", user_id, record.token_limit);
            return Err(RagError::TokenLimit {
                limit: record.token_limit,
            });
        }

        let admitted = UsageQueries::try_increment_request(self.db.pool(), user_id).await?;
        if !admitted {
            info!(
                "User {} over request limit ({})",
                user_id, record.request_limit
            );
            return Err(RagError::RateLimit {
                limit: record.request_limit,
            });
        }

        Ok(())
    }

    /// Record tokens consumed by a completed response. Monotonic, with no
    /// ceiling at write time; enforcement happens on the next
    /// `check_and_increment`, so the ceiling can be transiently exceeded by
    /// one in-flight response.
    pub async fn add_tokens(&self, user_id: &str, count: i64) -> Result<()> {
        if count <= 0 {
            return Ok(());
        }

        // Make sure the record exists; a response can finish for a user
        // whose counters were wiped in between.
        UsageQueries::get_or_create(self.db.pool(), user_id, &self.limits, Utc::now()).await?;
        UsageQueries::add_tokens(self.db.pool(), user_id, count).await?;
        debug!("User {} consumed {} tokens", user_id, count);
        Ok(())
    }

    /// Current counters for a user, with lazy resets applied. Used by the
    /// dashboard collaborator.
    pub async fn snapshot(&self, user_id: &str) -> Result<UsageRecord> {
        self.current_record(user_id, Utc::now()).await
    }

    /// Get-or-create the usage record and apply any window resets that have
    /// come due. Each counter resets independently.
    async fn current_record(&self, user_id: &str, now: DateTime<Utc>) -> Result<UsageRecord> {
        let record =
            UsageQueries::get_or_create(self.db.pool(), user_id, &self.limits, now).await?;

        let mut needs_refetch = false;

        if now - record.last_request_reset >= Duration::hours(REQUEST_RESET_HOURS) {
            UsageQueries::reset_request_counter(self.db.pool(), user_id, now).await?;
            debug!("Reset request counter for user {}", user_id);
            needs_refetch = true;
        }

        if now - record.last_token_reset >= Duration::days(TOKEN_RESET_DAYS) {
            UsageQueries::reset_token_counter(self.db.pool(), user_id, now).await?;
            debug!("Reset token counter for user {}", user_id);
            needs_refetch = true;
        }

        if needs_refetch {
            return UsageQueries::get(self.db.pool(), user_id)
                .await?
                .ok_or_else(|| {
                    RagError::Database("Usage record disappeared during reset".to_string())
                });
        }

        Ok(record)
    }
}
