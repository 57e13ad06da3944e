//! Database-backed OAuth2 client registry.
//!
//! Lookup, redirect/scope validation and client authentication. Secret checks
//! always run an Argon2 verification, against a dummy hash when the client is
//! unknown or has no secret, so response timing does not reveal which clients exist.

use crate::entity::oauth2_client;
use crate::error::OAuth2Error;
use crate::oauth2::password::{hash_secret, verify_dummy_secret, verify_secret};
use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use time::OffsetDateTime;

/// Credentials presented by a client at the token, introspection or revocation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Pull client credentials from HTTP Basic auth, falling back to form fields.
pub fn extract_client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Option<ClientCredentials> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) = STANDARD.decode(auth.trim())
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return Some(ClientCredentials {
            client_id: id.to_string(),
            client_secret: Some(secret.to_string()),
        });
    }

    form_client_id
        .filter(|id| !id.is_empty())
        .map(|id| ClientCredentials {
            client_id: id.to_string(),
            client_secret: form_client_secret.map(String::from),
        })
}

/// Parameters for seeding a client record.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_id: String,
    /// Plaintext secret; `None` registers a public client
    pub client_secret: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
}

#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
}

impl ClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, client_id: &str) -> Result<Option<oauth2_client::Model>, OAuth2Error> {
        Ok(oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Authenticate a confidential client.
    ///
    /// Unknown clients, public clients and wrong secrets all fail with the same
    /// `InvalidClient`.
    #[tracing::instrument(skip(self, credentials), fields(client_id = %credentials.client_id))]
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<oauth2_client::Model, OAuth2Error> {
        let client = self.find(&credentials.client_id).await?;
        let presented = credentials.client_secret.as_deref().unwrap_or_default();

        let verified = match client.as_ref().and_then(|c| c.secret_hash.as_deref()) {
            Some(hash) => verify_secret(presented, hash),
            None => verify_dummy_secret(presented),
        };

        match client {
            Some(client)
                if verified && client.is_confidential() && credentials.client_secret.is_some() =>
            {
                Ok(client)
            }
            _ => {
                tracing::debug!("Client authentication failed");
                Err(OAuth2Error::InvalidClient)
            }
        }
    }

    /// Insert a client, hashing its secret with Argon2id.
    #[tracing::instrument(skip(self, client), fields(client_id = %client.client_id))]
    pub async fn register(&self, client: NewClient) -> Result<oauth2_client::Model, OAuth2Error> {
        let secret_hash = client
            .client_secret
            .as_deref()
            .map(hash_secret)
            .transpose()
            .map_err(|e| OAuth2Error::Internal(format!("Failed to hash client secret: {e}")))?;
        let redirect_uris = serde_json::to_string(&client.redirect_uris)
            .map_err(|e| OAuth2Error::Internal(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let model = oauth2_client::ActiveModel {
            id: Set(client.client_id),
            secret_hash: Set(secret_hash),
            name: Set(client.name),
            redirect_uris: Set(redirect_uris),
            scopes: Set(client.scopes.join(" ")),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = model.insert(self.db.as_ref()).await?;
        tracing::info!("Registered OAuth2 client");
        Ok(inserted)
    }
}

/// Split a scope parameter, collapsing duplicates in first-seen order.
/// An absent or blank parameter means `openid`.
pub fn normalize_scope(scope: Option<&str>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in scope.unwrap_or_default().split_whitespace() {
        if !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    if scopes.is_empty() {
        scopes.push("openid".to_string());
    }
    scopes
}

/// Check every requested scope against the client's allowed set.
pub fn validate_scopes(
    client: &oauth2_client::Model,
    requested: &[String],
) -> Result<(), OAuth2Error> {
    match requested.iter().find(|s| !client.is_scope_allowed(s)) {
        Some(denied) => Err(OAuth2Error::InvalidScope(denied.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn client() -> oauth2_client::Model {
        oauth2_client::Model {
            id: "client".to_string(),
            secret_hash: None,
            name: "Client".to_string(),
            redirect_uris: "[]".to_string(),
            scopes: "openid profile".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn scope_defaults_to_openid_and_dedupes() {
        assert_eq!(normalize_scope(None), vec!["openid"]);
        assert_eq!(normalize_scope(Some("  ")), vec!["openid"]);
        assert_eq!(
            normalize_scope(Some("openid email openid profile email")),
            vec!["openid", "email", "profile"]
        );
    }

    #[test]
    fn scope_outside_allowed_set_is_rejected() {
        let c = client();
        assert!(validate_scopes(&c, &["openid".into(), "profile".into()]).is_ok());
        match validate_scopes(&c, &["openid".into(), "admin".into()]) {
            Err(OAuth2Error::InvalidScope(s)) => assert_eq!(s, "admin"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn basic_auth_takes_precedence_over_form() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("basic-id:basic-secret");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let creds = extract_client_credentials(&headers, Some("form-id"), Some("form-secret"));
        assert_eq!(
            creds,
            Some(ClientCredentials {
                client_id: "basic-id".into(),
                client_secret: Some("basic-secret".into()),
            })
        );
    }

    #[test]
    fn form_credentials_and_missing_credentials() {
        let headers = HeaderMap::new();
        let creds = extract_client_credentials(&headers, Some("form-id"), None).unwrap();
        assert_eq!(creds.client_id, "form-id");
        assert!(creds.client_secret.is_none());

        assert!(extract_client_credentials(&headers, None, Some("secret")).is_none());
        assert!(extract_client_credentials(&headers, Some(""), None).is_none());
    }
}
