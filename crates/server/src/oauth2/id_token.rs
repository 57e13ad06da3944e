//! OpenID Connect ID tokens (HS256).

use crate::entity::{oauth2_token, oauth2_user};
use crate::error::OAuth2Error;
use crate::oauth2::identity::ProfileClaims;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub at_hash: String,
    #[serde(flatten)]
    pub profile: ProfileClaims,
}

/// Left-most half of the SHA-256 digest of the access token, base64url encoded.
pub fn at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

#[derive(Clone)]
pub struct IdTokenSigner {
    issuer: String,
    key: EncodingKey,
}

impl IdTokenSigner {
    pub fn new(issuer: impl Into<String>, secret: &str) -> Self {
        Self {
            issuer: issuer.into(),
            key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign an ID token that accompanies `access`, sharing its issue and expiry times.
    pub fn sign(
        &self,
        access: &oauth2_token::Model,
        raw_access_token: &str,
        user: Option<&oauth2_user::Model>,
        nonce: Option<&str>,
    ) -> Result<String, OAuth2Error> {
        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: access.user_id.clone(),
            aud: access.client_id.clone(),
            iat: access.issued_at.unix_timestamp(),
            exp: access.expires_at.unix_timestamp(),
            auth_time: access.auth_time.unix_timestamp(),
            nonce: nonce.filter(|n| !n.is_empty()).map(String::from),
            at_hash: at_hash(raw_access_token),
            profile: ProfileClaims::for_scopes(user, &access.scopes_list()),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| OAuth2Error::Internal(format!("Failed to sign ID token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::oauth2_token::{TokenKind, TokenStatus};
    use jsonwebtoken::{DecodingKey, Validation};
    use time::{Duration, OffsetDateTime};

    const SECRET: &str = "id-token-secret-id-token-secret-!";

    fn access(scope: &str) -> oauth2_token::Model {
        let now = OffsetDateTime::now_utc();
        oauth2_token::Model {
            id: "tok".into(),
            token_hash: "hash".into(),
            kind: TokenKind::AccessToken,
            client_id: "client-a".into(),
            user_id: "user-1".into(),
            scope: scope.into(),
            status: TokenStatus::Active,
            predecessor_id: None,
            auth_time: now - Duration::seconds(5),
            issued_at: now,
            expires_at: now + Duration::seconds(900),
            revoked_at: None,
        }
    }

    fn decode(token: &str) -> IdTokenClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["client-a"]);
        validation.set_issuer(&["https://auth.example.com"]);
        jsonwebtoken::decode::<IdTokenClaims>(
            token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn at_hash_is_left_half_of_sha256() {
        // sha256("abc") = ba7816bf 8f01cfea 414140de 5dae2223 ...
        assert_eq!(at_hash("abc"), "ungWv48Bz-pBQUDeXa4iIw");
    }

    #[test]
    fn signs_standard_claims() {
        let signer = IdTokenSigner::new("https://auth.example.com", SECRET);
        let token = access("openid");
        let jwt = signer.sign(&token, "raw-access", None, Some("n-0S6_WzA2Mj")).unwrap();

        let claims = decode(&jwt);
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.aud, "client-a");
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.auth_time, token.auth_time.unix_timestamp());
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(claims.at_hash, at_hash("raw-access"));
        assert!(claims.profile.email.is_none());
    }

    #[test]
    fn includes_profile_claims_by_scope() {
        let signer = IdTokenSigner::new("https://auth.example.com", SECRET);
        let user = oauth2_user::Model {
            id: "user-1".into(),
            email: Some("jane@example.com".into()),
            email_verified: false,
            name: Some("Jane".into()),
            picture: Some("https://example.com/jane.png".into()),
            locale: None,
            phone_number: None,
            phone_number_verified: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let jwt = signer
            .sign(&access("openid email"), "raw", Some(&user), None)
            .unwrap();
        let claims = decode(&jwt);
        assert_eq!(claims.profile.email.as_deref(), Some("jane@example.com"));
        assert_eq!(claims.profile.email_verified, Some(false));
        assert!(claims.profile.name.is_none());
        assert!(claims.nonce.is_none());
    }
}
