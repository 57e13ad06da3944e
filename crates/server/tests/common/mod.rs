//! Shared fixtures: a sqlite schema (in memory, or file-backed for concurrency
//! tests), seeded clients and users, and helpers that walk the
//! authorize -> login -> token flow over HTTP.

#![allow(dead_code)]

use axum_test::{TestResponse, TestServer};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2_server::{
    api,
    config::OAuth2Config,
    entity::oauth2_user,
    oauth2::{ClientRegistry, NewClient, OAuth2State, UserDirectory},
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

pub const ISSUER: &str = "https://auth.example.com";
pub const ID_TOKEN_SECRET: &str = "id-token-secret-for-tests-0123456789";
pub const USER_TOKEN_SECRET: &str = "user-token-secret-for-tests-012345678";

pub const CLIENT_ID: &str = "app-client";
pub const CLIENT_SECRET: &str = "app-secret";
pub const OTHER_CLIENT_ID: &str = "other-client";
pub const OTHER_CLIENT_SECRET: &str = "other-secret";
pub const PUBLIC_CLIENT_ID: &str = "public-client";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const USER_ID: &str = "user-123";

const SCHEMA: [&str; 5] = [
    r#"CREATE TABLE oauth2_client (
        id TEXT PRIMARY KEY,
        secret_hash TEXT NULL,
        name TEXT NOT NULL,
        redirect_uris TEXT NOT NULL,
        scopes TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_user (
        id TEXT PRIMARY KEY,
        email TEXT NULL,
        email_verified INTEGER NOT NULL DEFAULT 0,
        name TEXT NULL,
        picture TEXT NULL,
        locale TEXT NULL,
        phone_number TEXT NULL,
        phone_number_verified INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_auth_request (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT NOT NULL,
        state TEXT NULL,
        nonce TEXT NULL,
        status TEXT NOT NULL,
        user_id TEXT NULL,
        auth_time TEXT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_authorization (
        code_hash TEXT PRIMARY KEY,
        request_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT NOT NULL,
        nonce TEXT NULL,
        auth_time TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_token (
        id TEXT PRIMARY KEY,
        token_hash TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        status TEXT NOT NULL,
        predecessor_id TEXT NULL,
        auth_time TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        revoked_at TEXT NULL
    );"#,
];

/// Create an in-memory database with the OAuth2 schema, two confidential
/// clients, one public client and one user.
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    seed_test_db("sqlite::memory:").await
}

async fn seed_test_db(url: &str) -> Arc<DatabaseConnection> {
    let db = Database::connect(url).await.expect("connect");
    for sql in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .expect("create table");
    }
    let db = Arc::new(db);

    let registry = ClientRegistry::new(db.clone());
    for (id, secret) in [
        (CLIENT_ID, Some(CLIENT_SECRET)),
        (OTHER_CLIENT_ID, Some(OTHER_CLIENT_SECRET)),
        (PUBLIC_CLIENT_ID, None),
    ] {
        registry
            .register(NewClient {
                client_id: id.to_string(),
                client_secret: secret.map(String::from),
                name: format!("{id} name"),
                redirect_uris: vec![
                    REDIRECT_URI.to_string(),
                    "https://app.example.com/cb?tenant=acme".to_string(),
                ],
                scopes: vec![
                    "openid".into(),
                    "profile".into(),
                    "email".into(),
                    "phone".into(),
                ],
            })
            .await
            .expect("register client");
    }

    UserDirectory::new(db.clone())
        .insert(oauth2_user::Model {
            id: USER_ID.to_string(),
            email: Some("jane@example.com".to_string()),
            email_verified: true,
            name: Some("Jane Doe".to_string()),
            picture: Some("https://example.com/jane.png".to_string()),
            locale: Some("en-GB".to_string()),
            phone_number: Some("+44 20 7946 0958".to_string()),
            phone_number_verified: false,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("insert user");

    db
}

pub fn test_config() -> OAuth2Config {
    OAuth2Config::new(ISSUER, ID_TOKEN_SECRET, USER_TOKEN_SECRET)
}

pub async fn create_test_state() -> OAuth2State {
    OAuth2State::new(create_test_db().await, test_config())
}

/// A sqlite file in the temp dir, removed on drop.
pub struct TempDb {
    path: PathBuf,
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Same fixtures as [`create_test_state`], but on a file-backed database whose
/// pool hands out several connections, so concurrent transactions interleave.
pub async fn create_file_backed_state() -> (OAuth2State, TempDb) {
    let path = std::env::temp_dir().join(format!("oauth2-server-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = seed_test_db(&url).await;
    (OAuth2State::new(db, test_config()), TempDb { path })
}

pub fn test_server(state: OAuth2State) -> TestServer {
    TestServer::new(api::app(state)).expect("create test server")
}

#[derive(Serialize)]
struct UserClaims<'a> {
    sub: &'a str,
    exp: i64,
}

/// A session credential as issued by the external sign-in service.
pub fn user_token(sub: &str) -> String {
    let exp = OffsetDateTime::now_utc().unix_timestamp() + 3600;
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &UserClaims { sub, exp },
        &EncodingKey::from_secret(USER_TOKEN_SECRET.as_bytes()),
    )
    .expect("sign user token")
}

pub fn location(response: &TestResponse) -> url::Url {
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    url::Url::parse(location).expect("absolute location")
}

pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// `GET /oauth2/authorize` for `CLIENT_ID`; returns the `request_id`.
pub async fn start_authorization(server: &TestServer, scope: &str, state: &str) -> String {
    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("scope", scope)
        .add_query_param("state", state)
        .add_query_param("nonce", "nonce-abc")
        .await;
    response.assert_status(axum::http::StatusCode::FOUND);
    query_param(&location(&response), "request_id").expect("request_id")
}

/// `POST /oauth2/login` as `USER_ID`.
pub async fn complete_login(server: &TestServer, request_id: &str) -> TestResponse {
    server
        .post("/oauth2/login")
        .authorization_bearer(user_token(USER_ID))
        .json(&serde_json::json!({ "requestId": request_id }))
        .await
}

/// Walk authorize and login; returns the authorization code.
pub async fn obtain_code(server: &TestServer, scope: &str) -> String {
    let request_id = start_authorization(server, scope, "xyz").await;
    let response = complete_login(server, &request_id).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let redirect = url::Url::parse(body["redirectUri"].as_str().expect("redirectUri"))
        .expect("redirect url");
    query_param(&redirect, "code").expect("code")
}

pub async fn exchange_code(server: &TestServer, code: &str) -> TestResponse {
    server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await
}

pub async fn refresh(server: &TestServer, refresh_token: &str) -> TestResponse {
    server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await
}

pub async fn introspect(server: &TestServer, token: &str) -> serde_json::Value {
    let response = server
        .post("/oauth2/introspect")
        .form(&[
            ("token", token),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    response.assert_status_ok();
    response.json()
}

pub async fn revoke(server: &TestServer, token: &str, hint: &str) -> TestResponse {
    server
        .post("/oauth2/revoke")
        .form(&[
            ("token", token),
            ("token_type_hint", hint),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await
}

/// Full flow; returns the token endpoint's JSON body.
pub async fn obtain_tokens(server: &TestServer, scope: &str) -> serde_json::Value {
    let code = obtain_code(server, scope).await;
    let response = exchange_code(server, &code).await;
    response.assert_status_ok();
    response.json()
}
