//! Periodic removal of long-expired authorization requests, codes and tokens.
//!
//! Nothing in the protocol depends on this task; expiry is always evaluated at
//! read time.

use crate::config::OAuth2Config;
use crate::entity::{oauth2_auth_request, oauth2_authorization, oauth2_token};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub requests: u64,
    pub codes: u64,
    pub tokens: u64,
}

/// Delete rows whose `expires_at` lies more than `retention` before `now`.
pub async fn prune_expired(
    db: &DatabaseConnection,
    now: OffsetDateTime,
    retention: time::Duration,
) -> Result<PruneStats, DbErr> {
    let cutoff = now - retention;

    let requests = oauth2_auth_request::Entity::delete_many()
        .filter(oauth2_auth_request::Column::ExpiresAt.lt(cutoff))
        .exec(db)
        .await?
        .rows_affected;
    let codes = oauth2_authorization::Entity::delete_many()
        .filter(oauth2_authorization::Column::ExpiresAt.lt(cutoff))
        .exec(db)
        .await?
        .rows_affected;
    let tokens = oauth2_token::Entity::delete_many()
        .filter(oauth2_token::Column::ExpiresAt.lt(cutoff))
        .exec(db)
        .await?
        .rows_affected;

    Ok(PruneStats {
        requests,
        codes,
        tokens,
    })
}

/// Spawn the reaper. Does nothing when `cleanup_interval_secs` is 0.
pub fn spawn_cleanup_task(db: Arc<DatabaseConnection>, config: &OAuth2Config) {
    if config.cleanup_interval_secs == 0 {
        return;
    }
    let period = Duration::from_secs(config.cleanup_interval_secs);
    let retention = time::Duration::seconds(config.cleanup_retention_secs);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match prune_expired(&db, OffsetDateTime::now_utc(), retention).await {
                Ok(stats) if stats != PruneStats::default() => tracing::info!(
                    requests = stats.requests,
                    codes = stats.codes,
                    tokens = stats.tokens,
                    "Pruned expired OAuth2 records"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to prune expired OAuth2 records"),
            }
        }
    });
}
