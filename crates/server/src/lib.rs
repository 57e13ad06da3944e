//! OAuth2 / OpenID Connect authorization server core.
//!
//! Issues, rotates, introspects and revokes tokens for third-party clients
//! acting on behalf of an end user who signed in through a separate service.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
