//! OAuth2 Client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Argon2id PHC hash of the client secret (None for public clients)
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    /// Human-readable client name
    pub name: String,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A client is confidential iff it holds a secret hash.
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(String::from).collect()
    }

    /// Exact-match check against the registered redirect URIs.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.split_whitespace().any(|s| s == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(secret_hash: Option<&str>) -> Model {
        Model {
            id: "client".to_string(),
            secret_hash: secret_hash.map(String::from),
            name: "Client".to_string(),
            redirect_uris: r#"["https://app.example.com/callback","https://app.example.com/cb?x=1"]"#
                .to_string(),
            scopes: "openid profile email".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn redirect_uri_requires_exact_match() {
        let c = client(None);
        assert!(c.is_redirect_uri_allowed("https://app.example.com/callback"));
        assert!(c.is_redirect_uri_allowed("https://app.example.com/cb?x=1"));
        assert!(!c.is_redirect_uri_allowed("https://app.example.com/callback/"));
        assert!(!c.is_redirect_uri_allowed("https://app.example.com/cb"));
    }

    #[test]
    fn confidential_iff_secret_hash_present() {
        assert!(client(Some("$argon2id$...")).is_confidential());
        assert!(!client(None).is_confidential());
    }

    #[test]
    fn scope_allowance() {
        let c = client(None);
        assert!(c.is_scope_allowed("email"));
        assert!(!c.is_scope_allowed("admin"));
        assert_eq!(c.scopes_list(), vec!["openid", "profile", "email"]);
    }

    #[test]
    fn malformed_redirect_uris_allow_nothing() {
        let mut c = client(None);
        c.redirect_uris = "not json".to_string();
        assert!(c.redirect_uris_list().is_empty());
        assert!(!c.is_redirect_uri_allowed("https://app.example.com/callback"));
    }
}
