//! SeaORM entities for the authorization server tables.

pub mod oauth2_auth_request;
pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_token;
pub mod oauth2_user;
