//! Authorization request store.
//!
//! Bridges `/authorize` and login completion. A request is completed at most
//! once: the Pending -> Completed transition is a status-guarded `UPDATE` whose
//! affected-row count picks the single winner, and the authorization code is
//! minted inside the same transaction.

use crate::entity::oauth2_auth_request::{self, AuthRequestStatus};
use crate::entity::oauth2_authorization;
use crate::error::OAuth2Error;
use crate::oauth2::password::{generate_token, hash_token};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Validated parameters of an authorization request.
#[derive(Debug, Clone)]
pub struct NewAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
}

/// Outcome of a successful login completion.
#[derive(Debug, Clone)]
pub struct CompletedRequest {
    pub request: oauth2_auth_request::Model,
    /// The client's redirect URI, parsed
    pub redirect: url::Url,
    /// Raw authorization code; only its hash is stored
    pub code: String,
}

#[derive(Clone)]
pub struct AuthRequestStore {
    db: Arc<DatabaseConnection>,
    request_ttl: Duration,
    code_ttl: Duration,
}

impl AuthRequestStore {
    pub fn new(db: Arc<DatabaseConnection>, request_ttl_secs: i64, code_ttl_secs: i64) -> Self {
        Self {
            db,
            request_ttl: Duration::seconds(request_ttl_secs),
            code_ttl: Duration::seconds(code_ttl_secs),
        }
    }

    #[tracing::instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn create(
        &self,
        request: NewAuthRequest,
        now: OffsetDateTime,
    ) -> Result<oauth2_auth_request::Model, OAuth2Error> {
        let model = oauth2_auth_request::ActiveModel {
            id: Set(generate_token()),
            client_id: Set(request.client_id),
            redirect_uri: Set(request.redirect_uri),
            scope: Set(request.scopes.join(" ")),
            state: Set(request.state),
            nonce: Set(request.nonce),
            status: Set(AuthRequestStatus::Pending),
            user_id: Set(None),
            auth_time: Set(None),
            expires_at: Set(now + self.request_ttl),
            created_at: Set(now),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    /// Look up a request that can still be completed.
    ///
    /// Unknown, expired and completed requests are indistinguishable (`NotFound`).
    pub async fn find_pending(
        &self,
        request_id: &str,
        now: OffsetDateTime,
    ) -> Result<oauth2_auth_request::Model, OAuth2Error> {
        match oauth2_auth_request::Entity::find_by_id(request_id)
            .one(self.db.as_ref())
            .await?
        {
            Some(request) if request.effective_status(now) == AuthRequestStatus::Pending => {
                Ok(request)
            }
            _ => Err(OAuth2Error::NotFound),
        }
    }

    /// Bind `user_id` to a pending request and mint its authorization code.
    ///
    /// Nothing is written unless the stored redirect URI parses.
    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        request_id: &str,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<CompletedRequest, OAuth2Error> {
        let txn = self.db.begin().await?;

        let request = oauth2_auth_request::Entity::find_by_id(request_id)
            .one(&txn)
            .await?
            .ok_or(OAuth2Error::InvalidRequest("Unknown authorization request"))?;

        match request.effective_status(now) {
            AuthRequestStatus::Pending => {}
            AuthRequestStatus::Expired => {
                return Err(OAuth2Error::InvalidRequest("Authorization request expired"));
            }
            AuthRequestStatus::Completed => {
                return Err(OAuth2Error::InvalidRequest(
                    "Authorization request already completed",
                ));
            }
        }

        let redirect = url::Url::parse(&request.redirect_uri)
            .map_err(|e| OAuth2Error::Internal(format!("Stored redirect_uri is invalid: {e}")))?;

        let result = oauth2_auth_request::Entity::update_many()
            .set(oauth2_auth_request::ActiveModel {
                status: Set(AuthRequestStatus::Completed),
                user_id: Set(Some(user_id.to_string())),
                auth_time: Set(Some(now)),
                ..Default::default()
            })
            .filter(oauth2_auth_request::Column::Id.eq(request_id))
            .filter(oauth2_auth_request::Column::Status.eq(AuthRequestStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected != 1 {
            tracing::debug!("Lost race completing authorization request");
            return Err(OAuth2Error::InvalidRequest(
                "Authorization request already completed",
            ));
        }

        let code = generate_token();
        oauth2_authorization::ActiveModel {
            code_hash: Set(hash_token(&code)),
            request_id: Set(request.id.clone()),
            client_id: Set(request.client_id.clone()),
            user_id: Set(user_id.to_string()),
            redirect_uri: Set(request.redirect_uri.clone()),
            scope: Set(request.scope.clone()),
            nonce: Set(request.nonce.clone()),
            auth_time: Set(now),
            expires_at: Set(now + self.code_ttl),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(client_id = %request.client_id, user_id, "Authorization request completed");

        Ok(CompletedRequest {
            request: oauth2_auth_request::Model {
                status: AuthRequestStatus::Completed,
                user_id: Some(user_id.to_string()),
                auth_time: Some(now),
                ..request
            },
            redirect,
            code,
        })
    }
}
