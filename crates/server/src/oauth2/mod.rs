//! OAuth2 / OpenID Connect authorization server.
//!
//! ## Supported Flows
//!
//! - Authorization Code (confidential clients)
//! - Refresh Token, with rotation on every use
//!
//! ## Endpoints
//!
//! - `GET|POST /oauth2/authorize` - Authorization endpoint
//! - `GET /oauth2/login` - Pending authorization request lookup
//! - `POST /oauth2/login` - Login completion, mints the authorization code
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/introspect` - Token introspection
//! - `POST /oauth2/revoke` - Token revocation
//! - `GET|POST /oauth2/userinfo` - OpenID Connect UserInfo
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery

pub mod cleanup;
pub mod endpoints;
pub mod id_token;
pub mod identity;
pub mod login;
pub mod password;
pub mod registrar;
pub mod requests;
mod state;
pub mod tokens;

pub use endpoints::{discovery_router, router};
pub use identity::{IdentityVerifier, JwtIdentityVerifier, UserDirectory, VerifiedIdentity};
pub use password::{generate_token, hash_secret, hash_token, verify_secret};
pub use registrar::{ClientCredentials, ClientRegistry, NewClient};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
