//! OAuth2 state management.
//!
//! Handlers are stateless; everything they share lives in [`OAuth2State`].

use crate::config::OAuth2Config;
use crate::oauth2::id_token::IdTokenSigner;
use crate::oauth2::identity::{IdentityVerifier, JwtIdentityVerifier, UserDirectory};
use crate::oauth2::registrar::ClientRegistry;
use crate::oauth2::requests::AuthRequestStore;
use crate::oauth2::tokens::TokenStore;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<OAuth2Config>,
    /// Verifies the end user's own session credential at login completion
    pub identity: Arc<dyn IdentityVerifier>,
}

impl OAuth2State {
    /// State using the HS256 user-token verifier keyed by `user_token_secret`.
    pub fn new(db: Arc<DatabaseConnection>, config: OAuth2Config) -> Self {
        let identity = Arc::new(JwtIdentityVerifier::new(&config.user_token_secret));
        Self {
            db,
            config: Arc::new(config),
            identity,
        }
    }

    pub fn with_identity_verifier(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = identity;
        self
    }

    pub fn issuer(&self) -> &str {
        self.config.issuer_url.trim_end_matches('/')
    }

    pub fn clients(&self) -> ClientRegistry {
        ClientRegistry::new(self.db.clone())
    }

    pub fn users(&self) -> UserDirectory {
        UserDirectory::new(self.db.clone())
    }

    pub fn requests(&self) -> AuthRequestStore {
        AuthRequestStore::new(
            self.db.clone(),
            self.config.authorization_request_lifetime,
            self.config.authorization_code_lifetime,
        )
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(
            self.db.clone(),
            self.config.access_token_lifetime,
            self.config.refresh_token_lifetime,
        )
    }

    pub fn id_tokens(&self) -> IdTokenSigner {
        IdTokenSigner::new(self.issuer(), &self.config.id_token_secret)
    }
}
