//! OAuth2 Token entity - access and refresh tokens.
//!
//! One row per token. Refresh tokens form a singly-linked rotation chain through
//! `predecessor_id`; it is kept for audit and never traversed by the endpoints.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    #[sea_orm(string_value = "access_token")]
    AccessToken,
    #[sea_orm(string_value = "refresh_token")]
    RefreshToken,
}

impl TokenKind {
    /// Wire name used by `token_type_hint` and introspection's `token_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
        }
    }

    /// Parse a `token_type_hint`. Unknown hints yield `None` (RFC 7009 section 2.1).
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "access_token" => Some(TokenKind::AccessToken),
            "refresh_token" => Some(TokenKind::RefreshToken),
            _ => None,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            TokenKind::AccessToken => TokenKind::RefreshToken,
            TokenKind::RefreshToken => TokenKind::AccessToken,
        }
    }
}

/// Stored status. `Expired` is never written; it is derived from `expires_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "revoked")]
    Revoked,
    #[sea_orm(string_value = "rotated")]
    Rotated,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// SHA-256 digest of the opaque token value
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub kind: TokenKind,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub status: TokenStatus,
    /// Refresh token this one replaced
    pub predecessor_id: Option<String>,
    /// When the resource owner authenticated for the originating grant
    pub auth_time: OffsetDateTime,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Status as observed at `now`; an active token past `expires_at` reads as expired.
    pub fn effective_status(&self, now: OffsetDateTime) -> TokenStatus {
        match self.status {
            TokenStatus::Active if self.is_expired(now) => TokenStatus::Expired,
            status => status,
        }
    }

    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.effective_status(now) == TokenStatus::Active
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }

    /// Check if token has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }
}
