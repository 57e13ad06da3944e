//! End-user identity at the boundary of the authorization server.
//!
//! The sign-in flow that produces a user's own session lives elsewhere; this
//! module only consumes its result. An [`IdentityVerifier`] turns the bearer
//! credential presented at login completion into a subject id, and the
//! [`UserDirectory`] reads the profile claims released through userinfo and
//! ID tokens.

use crate::entity::oauth2_user;
use crate::error::OAuth2Error;
use crate::oauth2::state::OAuth2State;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// A user identity vouched for by the external sign-in service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
}

/// Verifies the end user's own bearer credential.
pub trait IdentityVerifier: Send + Sync {
    /// Fails with `Unauthenticated` for anything that is not a valid credential.
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, OAuth2Error>;
}

#[derive(Debug, Deserialize)]
struct UserTokenClaims {
    sub: String,
}

/// Accepts HS256 session JWTs carrying the user id in `sub`.
pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, credential: &str) -> Result<VerifiedIdentity, OAuth2Error> {
        let data = jsonwebtoken::decode::<UserTokenClaims>(credential, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected user credential");
                OAuth2Error::Unauthenticated
            })?;
        if data.claims.sub.is_empty() {
            return Err(OAuth2Error::Unauthenticated);
        }
        Ok(VerifiedIdentity {
            subject_id: data.claims.sub,
        })
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for an authenticated end user.
///
/// Rejects with `Unauthenticated` when the bearer credential is missing or the
/// configured [`IdentityVerifier`] refuses it.
#[derive(Debug, Clone)]
pub struct AuthenticatedSubject(pub VerifiedIdentity);

impl FromRequestParts<OAuth2State> for AuthenticatedSubject {
    type Rejection = OAuth2Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OAuth2State,
    ) -> Result<Self, Self::Rejection> {
        let credential = bearer_token(&parts.headers).ok_or(OAuth2Error::Unauthenticated)?;
        let identity = state.identity.verify(credential)?;
        Ok(AuthenticatedSubject(identity))
    }
}

/// Scope-gated profile claims shared by userinfo and the ID token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProfileClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
}

impl ProfileClaims {
    /// `email`/`email_verified` need the `email` scope, `phone_number`/`phone_number_verified`
    /// need `phone` and `name`/`picture`/`locale` need `profile`.
    pub fn for_scopes<S: AsRef<str>>(user: Option<&oauth2_user::Model>, scopes: &[S]) -> Self {
        let Some(user) = user else {
            return Self::default();
        };
        let has = |wanted: &str| scopes.iter().any(|s| s.as_ref() == wanted);

        let mut claims = Self::default();
        if has("email") && user.email.is_some() {
            claims.email = user.email.clone();
            claims.email_verified = Some(user.email_verified);
        }
        if has("profile") {
            claims.name = user.name.clone();
            claims.picture = user.picture.clone();
            claims.locale = user.locale.clone();
        }
        if has("phone") && user.phone_number.is_some() {
            claims.phone_number = user.phone_number.clone();
            claims.phone_number_verified = Some(user.phone_number_verified);
        }
        claims
    }
}

/// Read access to user profile records.
#[derive(Clone)]
pub struct UserDirectory {
    db: Arc<DatabaseConnection>,
}

impl UserDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, user_id: &str) -> Result<Option<oauth2_user::Model>, OAuth2Error> {
        Ok(oauth2_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Seed a profile record.
    pub async fn insert(&self, user: oauth2_user::Model) -> Result<oauth2_user::Model, OAuth2Error> {
        let model = oauth2_user::ActiveModel {
            id: Set(user.id),
            email: Set(user.email),
            email_verified: Set(user.email_verified),
            name: Set(user.name),
            picture: Set(user.picture),
            locale: Set(user.locale),
            phone_number: Set(user.phone_number),
            phone_number_verified: Set(user.phone_number_verified),
            created_at: Set(user.created_at),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};
    use time::OffsetDateTime;

    const SECRET: &str = "user-token-secret-user-token-secret";

    #[derive(Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        exp: i64,
    }

    fn sign(sub: &str, secret: &str, exp_offset: i64) -> String {
        let exp = OffsetDateTime::now_utc().unix_timestamp() + exp_offset;
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Claims { sub, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn user() -> oauth2_user::Model {
        oauth2_user::Model {
            id: "user-1".into(),
            email: Some("jane@example.com".into()),
            email_verified: true,
            name: Some("Jane".into()),
            picture: None,
            locale: Some("en".into()),
            phone_number: Some("+1 555 0100".into()),
            phone_number_verified: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn verifies_valid_user_token() {
        let verifier = JwtIdentityVerifier::new(SECRET);
        let identity = verifier.verify(&sign("user-1", SECRET, 300)).unwrap();
        assert_eq!(identity.subject_id, "user-1");
    }

    #[test]
    fn rejects_bad_signature_and_expired_tokens() {
        let verifier = JwtIdentityVerifier::new(SECRET);
        let forged = sign("user-1", "another-secret-another-secret-xx", 300);
        assert!(matches!(
            verifier.verify(&forged),
            Err(OAuth2Error::Unauthenticated)
        ));
        let expired = sign("user-1", SECRET, -3600);
        assert!(matches!(
            verifier.verify(&expired),
            Err(OAuth2Error::Unauthenticated)
        ));
        assert!(verifier.verify("garbage").is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn profile_claims_follow_scopes() {
        let u = user();
        let none = ProfileClaims::for_scopes(Some(&u), &["openid"]);
        assert_eq!(none, ProfileClaims::default());

        let email = ProfileClaims::for_scopes(Some(&u), &["openid", "email"]);
        assert_eq!(email.email.as_deref(), Some("jane@example.com"));
        assert_eq!(email.email_verified, Some(true));
        assert!(email.name.is_none());

        let profile = ProfileClaims::for_scopes(Some(&u), &["openid", "profile"]);
        assert_eq!(profile.name.as_deref(), Some("Jane"));
        assert_eq!(profile.locale.as_deref(), Some("en"));
        assert!(profile.email.is_none());
        assert!(profile.phone_number.is_none());

        let phone = ProfileClaims::for_scopes(Some(&u), &["openid", "phone"]);
        assert_eq!(phone.phone_number.as_deref(), Some("+1 555 0100"));
        assert_eq!(phone.phone_number_verified, Some(true));
        assert!(phone.email.is_none());

        let no_phone = oauth2_user::Model {
            phone_number: None,
            ..u
        };
        let claims = ProfileClaims::for_scopes(Some(&no_phone), &["phone"]);
        assert!(claims.phone_number_verified.is_none());
    }
}
