//! Token store.
//!
//! Every single-use transition here is a guarded write inside a transaction:
//! - code exchange deletes the code row by hash and requires exactly one deleted row
//! - refresh rotation flips `active -> rotated` and requires exactly one updated row
//! - revocation flips unexpired `active -> revoked`; zero updated rows is not an error
//!
//! Expiry is never written; it is evaluated against `now` at read time.

use crate::entity::oauth2_authorization;
use crate::entity::oauth2_token::{self, TokenKind, TokenStatus};
use crate::error::OAuth2Error;
use crate::oauth2::password::{generate_token, hash_token};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

const INVALID_CODE: &str = "Invalid authorization code";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// A freshly minted access/refresh pair. Raw values are only ever returned here.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access: oauth2_token::Model,
    pub refresh: oauth2_token::Model,
}

/// Grant facts shared by both tokens of a pair.
struct Grant<'a> {
    client_id: &'a str,
    user_id: &'a str,
    scope: &'a str,
    auth_time: OffsetDateTime,
    predecessor_id: Option<String>,
}

#[derive(Clone)]
pub struct TokenStore {
    db: Arc<DatabaseConnection>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenStore {
    pub fn new(db: Arc<DatabaseConnection>, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            db,
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    /// Consume an authorization code and mint the first token pair of its grant.
    ///
    /// Unknown, expired, already used, foreign-client and redirect-mismatched
    /// codes all fail with the same `InvalidGrant`.
    #[tracing::instrument(skip(self, code, redirect_uri))]
    pub async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(oauth2_authorization::Model, IssuedTokens), OAuth2Error> {
        let code_hash = hash_token(code);
        let txn = self.db.begin().await?;

        let grant = oauth2_authorization::Entity::find_by_id(&code_hash)
            .one(&txn)
            .await?
            .ok_or(OAuth2Error::InvalidGrant(INVALID_CODE))?;

        if grant.is_expired(now)
            || grant.client_id != client_id
            || redirect_uri != Some(grant.redirect_uri.as_str())
        {
            tracing::debug!("Authorization code rejected");
            return Err(OAuth2Error::InvalidGrant(INVALID_CODE));
        }

        let deleted = oauth2_authorization::Entity::delete_many()
            .filter(oauth2_authorization::Column::CodeHash.eq(&code_hash))
            .exec(&txn)
            .await?;
        if deleted.rows_affected != 1 {
            tracing::debug!("Authorization code already consumed");
            return Err(OAuth2Error::InvalidGrant(INVALID_CODE));
        }

        let issued = self
            .insert_pair(
                &txn,
                Grant {
                    client_id: &grant.client_id,
                    user_id: &grant.user_id,
                    scope: &grant.scope,
                    auth_time: grant.auth_time,
                    predecessor_id: None,
                },
                now,
            )
            .await?;

        txn.commit().await?;
        tracing::info!(user_id = %grant.user_id, "Authorization code exchanged");
        Ok((grant, issued))
    }

    /// Rotate a refresh token: mark it `rotated` and mint a successor pair.
    ///
    /// Of two racing rotations of the same token exactly one succeeds.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn rotate(
        &self,
        client_id: &str,
        refresh_token: &str,
        now: OffsetDateTime,
    ) -> Result<IssuedTokens, OAuth2Error> {
        let token_hash = hash_token(refresh_token);
        let txn = self.db.begin().await?;

        let current = oauth2_token::Entity::find()
            .filter(oauth2_token::Column::TokenHash.eq(&token_hash))
            .filter(oauth2_token::Column::Kind.eq(TokenKind::RefreshToken))
            .one(&txn)
            .await?
            .ok_or(OAuth2Error::InvalidGrant(INVALID_REFRESH_TOKEN))?;

        if !current.is_active(now) || current.client_id != client_id {
            tracing::debug!(status = ?current.effective_status(now), "Refresh token rejected");
            return Err(OAuth2Error::InvalidGrant(INVALID_REFRESH_TOKEN));
        }

        let result = oauth2_token::Entity::update_many()
            .set(oauth2_token::ActiveModel {
                status: Set(TokenStatus::Rotated),
                ..Default::default()
            })
            .filter(oauth2_token::Column::Id.eq(&current.id))
            .filter(oauth2_token::Column::Status.eq(TokenStatus::Active))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            tracing::debug!("Lost race rotating refresh token");
            return Err(OAuth2Error::InvalidGrant(INVALID_REFRESH_TOKEN));
        }

        let issued = self
            .insert_pair(
                &txn,
                Grant {
                    client_id: &current.client_id,
                    user_id: &current.user_id,
                    scope: &current.scope,
                    auth_time: current.auth_time,
                    predecessor_id: Some(current.id.clone()),
                },
                now,
            )
            .await?;

        txn.commit().await?;
        tracing::info!(user_id = %current.user_id, "Refresh token rotated");
        Ok(issued)
    }

    pub async fn find(
        &self,
        raw_token: &str,
        kind: TokenKind,
    ) -> Result<Option<oauth2_token::Model>, OAuth2Error> {
        Ok(oauth2_token::Entity::find()
            .filter(oauth2_token::Column::TokenHash.eq(hash_token(raw_token)))
            .filter(oauth2_token::Column::Kind.eq(kind))
            .one(self.db.as_ref())
            .await?)
    }

    /// Look a token up by the hinted kind first, then by the other kind.
    /// Without a hint access tokens are tried first.
    pub async fn find_with_hint(
        &self,
        raw_token: &str,
        hint: Option<TokenKind>,
    ) -> Result<Option<oauth2_token::Model>, OAuth2Error> {
        let first = hint.unwrap_or(TokenKind::AccessToken);
        if let Some(token) = self.find(raw_token, first).await? {
            return Ok(Some(token));
        }
        self.find(raw_token, first.other()).await
    }

    /// Mark a token revoked. Returns whether this call performed the transition;
    /// tokens that are already expired, rotated or revoked are left untouched.
    #[tracing::instrument(skip(self, token), fields(token_id = %token.id, kind = token.kind.as_str()))]
    pub async fn revoke(
        &self,
        token: &oauth2_token::Model,
        now: OffsetDateTime,
    ) -> Result<bool, OAuth2Error> {
        let result = oauth2_token::Entity::update_many()
            .set(oauth2_token::ActiveModel {
                status: Set(TokenStatus::Revoked),
                revoked_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(oauth2_token::Column::Id.eq(&token.id))
            .filter(oauth2_token::Column::Status.eq(TokenStatus::Active))
            .filter(oauth2_token::Column::ExpiresAt.gt(now))
            .exec(self.db.as_ref())
            .await?;

        let revoked = result.rows_affected == 1;
        if revoked {
            tracing::info!("Token revoked");
        }
        Ok(revoked)
    }

    async fn insert_pair<C: ConnectionTrait>(
        &self,
        conn: &C,
        grant: Grant<'_>,
        now: OffsetDateTime,
    ) -> Result<IssuedTokens, OAuth2Error> {
        let access_token = generate_token();
        let refresh_token = generate_token();

        let access = self
            .insert_token(conn, &grant, &access_token, TokenKind::AccessToken, None, now)
            .await?;
        let refresh = self
            .insert_token(
                conn,
                &grant,
                &refresh_token,
                TokenKind::RefreshToken,
                grant.predecessor_id.clone(),
                now,
            )
            .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            access,
            refresh,
        })
    }

    async fn insert_token<C: ConnectionTrait>(
        &self,
        conn: &C,
        grant: &Grant<'_>,
        raw_token: &str,
        kind: TokenKind,
        predecessor_id: Option<String>,
        now: OffsetDateTime,
    ) -> Result<oauth2_token::Model, OAuth2Error> {
        let ttl = match kind {
            TokenKind::AccessToken => self.access_ttl,
            TokenKind::RefreshToken => self.refresh_ttl,
        };
        let model = oauth2_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            token_hash: Set(hash_token(raw_token)),
            kind: Set(kind),
            client_id: Set(grant.client_id.to_string()),
            user_id: Set(grant.user_id.to_string()),
            scope: Set(grant.scope.to_string()),
            status: Set(TokenStatus::Active),
            predecessor_id: Set(predecessor_id),
            auth_time: Set(grant.auth_time),
            issued_at: Set(now),
            expires_at: Set(now + ttl),
            revoked_at: Set(None),
        };
        Ok(model.insert(conn).await?)
    }
}
