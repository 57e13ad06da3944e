//! OAuth2 Authorization Request entity - the pending state between `/authorize` and login completion.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle of an authorization request.
///
/// Only `Pending` and `Completed` are ever written; `Expired` is derived at read
/// time from `expires_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AuthRequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_auth_request")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Space-separated list of requested scopes
    pub scope: String,
    pub state: Option<String>,
    /// OpenID Connect nonce
    pub nonce: Option<String>,
    pub status: AuthRequestStatus,
    /// Subject bound at completion
    pub user_id: Option<String>,
    pub auth_time: Option<OffsetDateTime>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Status as observed at `now`. A pending request past its TTL reads as expired.
    pub fn effective_status(&self, now: OffsetDateTime) -> AuthRequestStatus {
        match self.status {
            AuthRequestStatus::Pending if self.is_expired(now) => AuthRequestStatus::Expired,
            status => status,
        }
    }

    pub fn scopes_list(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn request(status: AuthRequestStatus, expires_in: Duration) -> Model {
        let now = OffsetDateTime::now_utc();
        Model {
            id: "req".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            scope: "openid email".to_string(),
            state: None,
            nonce: None,
            status,
            user_id: None,
            auth_time: None,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn pending_request_expires_lazily() {
        let now = OffsetDateTime::now_utc();
        let live = request(AuthRequestStatus::Pending, Duration::minutes(5));
        assert_eq!(live.effective_status(now), AuthRequestStatus::Pending);

        let stale = request(AuthRequestStatus::Pending, Duration::minutes(-5));
        assert_eq!(stale.effective_status(now), AuthRequestStatus::Expired);
    }

    #[test]
    fn completed_request_stays_completed_after_ttl() {
        let now = OffsetDateTime::now_utc();
        let done = request(AuthRequestStatus::Completed, Duration::minutes(-5));
        assert_eq!(done.effective_status(now), AuthRequestStatus::Completed);
    }
}
