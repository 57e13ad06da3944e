//! OAuth2 HTTP endpoints.
//!
//! Implements the OAuth2 authorization server endpoints:
//! - Authorization endpoint
//! - Token endpoint (authorization_code and refresh_token grants)
//! - Token introspection (RFC 7662)
//! - Token revocation (RFC 7009)
//! - UserInfo (OpenID Connect)
//! - Discovery document

use crate::entity::{oauth2_client, oauth2_token::TokenKind};
use crate::error::{ErrorResponse, OAuth2Error};
use crate::oauth2::identity::{ProfileClaims, bearer_token};
use crate::oauth2::registrar::{
    ClientCredentials, extract_client_credentials, normalize_scope, validate_scopes,
};
use crate::oauth2::requests::NewAuthRequest;
use crate::oauth2::tokens::IssuedTokens;
use crate::oauth2::{OAUTH2_TAG, login, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Scopes advertised in discovery.
pub const SUPPORTED_SCOPES: [&str; 4] = ["openid", "profile", "email", "phone"];

/// Creates the OAuth2 router, mounted under `/oauth2`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize, authorize_form))
        .routes(routes!(token))
        .routes(routes!(introspect))
        .routes(routes!(revoke))
        .routes(routes!(userinfo))
        .merge(login::router())
        .with_state(state)
}

/// Creates the discovery router, mounted at the root.
pub fn discovery_router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(openid_configuration))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// OAuth2 authorization request parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code"
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Must exactly match a registered redirect URI
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes (default "openid")
    pub scope: Option<String>,
    /// Opaque value echoed back to the client
    pub state: Option<String>,
    /// String for replay protection (included in the ID token)
    pub nonce: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

/// Body shared by the introspection and revocation endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenOperationRequest {
    pub token: Option<String>,
    /// "access_token" or "refresh_token"; unknown hints are ignored
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// RFC 7662 introspection response. Inactive tokens carry only `active: false`.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(flatten)]
    pub claims: ProfileClaims,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
///
/// Validation failures are returned to the caller and never redirected, since
/// the redirect target is not trusted until it has been validated.
#[tracing::instrument(skip(state, params), fields(client_id = params.client_id.as_deref()))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start an authorization code flow",
    description = "Validates the client, redirect URI and requested scopes, stores a pending \
                   authorization request and redirects the user agent to the login page with \
                   its `request_id`.\n\n\
                   **Supported scopes:** `openid`, `profile`, `email`, `phone`",
    params(
        ("response_type" = String, Query, description = "Must be `code`."),
        ("client_id" = String, Query, description = "The client identifier issued during client registration."),
        ("redirect_uri" = String, Query, description = "Must exactly match a redirect URI registered for the client."),
        ("scope" = Option<String>, Query, description = "Space-separated list of requested scopes. Defaults to `openid`."),
        ("state" = Option<String>, Query, description = "Opaque value returned unchanged on the final redirect."),
        ("nonce" = Option<String>, Query, description = "Value copied into the ID token."),
    ),
    responses(
        (status = 302, description = "Redirect to the login page with `request_id`"),
        (status = 400, description = "Invalid redirect URI, scope or response type", body = ErrorResponse),
        (status = 401, description = "Unknown client", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, OAuth2Error> {
    start_authorization(&state, params).await
}

/// OAuth2 Authorization endpoint, form-encoded variant.
#[tracing::instrument(skip(state, params), fields(client_id = params.client_id.as_deref()))]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize (form)",
    summary = "Start an authorization code flow from a form post",
    description = "Same as `GET /authorize` with the parameters in an \
                   `application/x-www-form-urlencoded` body.",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Authorization request parameters"
    ),
    responses(
        (status = 302, description = "Redirect to the login page with `request_id`"),
        (status = 400, description = "Invalid redirect URI, scope or response type", body = ErrorResponse),
        (status = 401, description = "Unknown client", body = ErrorResponse),
    )
)]
pub async fn authorize_form(
    State(state): State<OAuth2State>,
    Form(params): Form<AuthorizeRequest>,
) -> Result<Response, OAuth2Error> {
    start_authorization(&state, params).await
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params), fields(grant_type = params.grant_type.as_deref()))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for tokens",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: exchange a single-use code for an access/refresh token pair\n\
                   - `refresh_token`: rotate a refresh token into a new pair; the presented token \
                   can never be used again\n\n\
                   An `id_token` is included when the granted scope contains `openid`.\n\n\
                   **Client authentication:** HTTP Basic, or `client_id` and `client_secret` in the body.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid, expired or already used grant", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuth2Error> {
    let credentials = extract_client_credentials(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .ok_or(OAuth2Error::InvalidClient)?;
    let client = state.clients().authenticate(&credentials).await?;

    let response = match params.grant_type.as_deref() {
        Some("authorization_code") => authorization_code_grant(&state, &client, &params).await?,
        Some("refresh_token") => refresh_token_grant(&state, &client, &params).await?,
        Some(_) => return Err(OAuth2Error::UnsupportedGrantType),
        None => return Err(OAuth2Error::InvalidRequest("grant_type is required")),
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// Token introspection endpoint (RFC 7662).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect Token",
    summary = "Report whether a token is active",
    description = "Reports the state and claims of an access or refresh token without changing it. \
                   Expired, rotated, revoked, unknown and foreign tokens all yield exactly \
                   `{\"active\": false}`.\n\n\
                   `token_type_hint` only selects which kind is looked up first.",
    request_body(
        content = TokenOperationRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Introspection request"
    ),
    responses(
        (status = 200, description = "Token state", body = IntrospectionResponse),
        (status = 400, description = "Missing token parameter", body = ErrorResponse),
        (status = 401, description = "Client authentication required", body = ErrorResponse),
    )
)]
pub async fn introspect(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenOperationRequest>,
) -> Result<Json<IntrospectionResponse>, OAuth2Error> {
    let client = authenticate_resource_client(&state, &headers, &params).await?;
    let raw_token = required_token(&params)?;
    let hint = params.token_type_hint.as_deref().and_then(TokenKind::from_hint);
    let now = OffsetDateTime::now_utc();

    let response = match state.tokens().find_with_hint(raw_token, hint).await? {
        Some(token) if token.is_active(now) && token.client_id == client.id => {
            IntrospectionResponse {
                active: true,
                sub: Some(token.user_id.clone()),
                client_id: Some(token.client_id.clone()),
                scope: Some(token.scope.clone()),
                token_type: Some(token.kind.as_str().to_string()),
                iat: Some(token.issued_at.unix_timestamp()),
                exp: Some(token.expires_at.unix_timestamp()),
                iss: Some(state.issuer().to_string()),
            }
        }
        _ => IntrospectionResponse::default(),
    };

    Ok(Json(response))
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Marks an active token revoked. Implements RFC 7009.\n\n\
                   **Behavior:**\n\
                   - Returns 200 OK for tokens that are already revoked, rotated, expired or unknown\n\
                   - Tokens issued to another client are left untouched\n\
                   - Revoking a refresh token does not revoke access tokens issued alongside it",
    request_body(
        content = TokenOperationRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already inactive)"),
        (status = 400, description = "Missing token parameter", body = ErrorResponse),
        (status = 401, description = "Client authentication required", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenOperationRequest>,
) -> Result<StatusCode, OAuth2Error> {
    let client = authenticate_resource_client(&state, &headers, &params).await?;
    let raw_token = required_token(&params)?;
    let hint = params.token_type_hint.as_deref().and_then(TokenKind::from_hint);
    let tokens = state.tokens();

    match tokens.find_with_hint(raw_token, hint).await? {
        Some(token) if token.client_id == client.id => {
            tokens.revoke(&token, OffsetDateTime::now_utc()).await?;
        }
        Some(_) => tracing::debug!("Ignoring revocation of another client's token"),
        None => {}
    }

    Ok(StatusCode::OK)
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    method(get, post),
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Get the authenticated user's claims",
    description = "Returns claims about the user an access token was issued for. The token must \
                   carry the `openid` scope.\n\n\
                   **Returned claims depend on granted scopes:**\n\
                   - `openid`: `sub`\n\
                   - `email`: `email`, `email_verified`\n\
                   - `phone`: `phone_number`, `phone_number_verified`\n\
                   - `profile`: `name`, `picture`, `locale`",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 403, description = "Token does not have the `openid` scope", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, OAuth2Error> {
    let raw_token = bearer_token(&headers).ok_or(OAuth2Error::Unauthenticated)?;
    let now = OffsetDateTime::now_utc();

    let token = state
        .tokens()
        .find(raw_token, TokenKind::AccessToken)
        .await?
        .filter(|t| t.is_active(now))
        .ok_or(OAuth2Error::Unauthenticated)?;

    if !token.has_scope("openid") {
        return Err(OAuth2Error::InsufficientScope("openid"));
    }

    let user = state
        .users()
        .find(&token.user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = %token.user_id, "Access token refers to unknown user");
            OAuth2Error::Unauthenticated
        })?;

    Ok(Json(UserInfoResponse {
        claims: ProfileClaims::for_scopes(Some(&user), &token.scopes_list()),
        sub: user.id,
    }))
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Endpoint URLs, supported grant and response types, scopes, client \
                   authentication methods and ID token signing algorithms.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let issuer = state.issuer();
    let strings = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    Json(OpenIdConfiguration {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{issuer}/oauth2/authorize"),
        token_endpoint: format!("{issuer}/oauth2/token"),
        userinfo_endpoint: format!("{issuer}/oauth2/userinfo"),
        introspection_endpoint: format!("{issuer}/oauth2/introspect"),
        revocation_endpoint: format!("{issuer}/oauth2/revoke"),
        response_types_supported: strings(&["code"]),
        grant_types_supported: strings(&["authorization_code", "refresh_token"]),
        subject_types_supported: strings(&["public"]),
        scopes_supported: strings(&SUPPORTED_SCOPES),
        token_endpoint_auth_methods_supported: strings(&[
            "client_secret_basic",
            "client_secret_post",
        ]),
        id_token_signing_alg_values_supported: strings(&["HS256"]),
        claims_supported: strings(&[
            "sub",
            "iss",
            "aud",
            "exp",
            "iat",
            "auth_time",
            "nonce",
            "email",
            "email_verified",
            "name",
            "picture",
            "locale",
            "phone_number",
            "phone_number_verified",
        ]),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate an authorization request, store it and redirect to the login page.
async fn start_authorization(
    state: &OAuth2State,
    params: AuthorizeRequest,
) -> Result<Response, OAuth2Error> {
    let client_id = params
        .client_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(OAuth2Error::InvalidClient)?;
    let client = state
        .clients()
        .find(client_id)
        .await?
        .ok_or(OAuth2Error::InvalidClient)?;

    let redirect_uri = params
        .redirect_uri
        .filter(|uri| client.is_redirect_uri_allowed(uri))
        .ok_or(OAuth2Error::InvalidRedirectUri)?;

    if params.response_type.as_deref() != Some("code") {
        return Err(OAuth2Error::UnsupportedResponseType);
    }

    let scopes = normalize_scope(params.scope.as_deref());
    validate_scopes(&client, &scopes)?;

    let request = state
        .requests()
        .create(
            NewAuthRequest {
                client_id: client.id,
                redirect_uri,
                scopes,
                state: params.state,
                nonce: params.nonce,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    let mut login_url = url::Url::parse(&state.config.login_url())
        .map_err(|e| OAuth2Error::Internal(format!("Invalid login URL: {e}")))?;
    login_url
        .query_pairs_mut()
        .append_pair("request_id", &request.id);

    tracing::debug!(request_id = %request.id, "Authorization request created");
    Ok((StatusCode::FOUND, [(header::LOCATION, login_url.to_string())]).into_response())
}

async fn authorization_code_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: &TokenRequest,
) -> Result<TokenResponse, OAuth2Error> {
    let code = params
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(OAuth2Error::InvalidRequest("code is required"))?;

    let (grant, issued) = state
        .tokens()
        .exchange_code(
            &client.id,
            code,
            params.redirect_uri.as_deref(),
            OffsetDateTime::now_utc(),
        )
        .await?;

    build_token_response(state, issued, grant.nonce.as_deref()).await
}

async fn refresh_token_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: &TokenRequest,
) -> Result<TokenResponse, OAuth2Error> {
    let refresh_token = params
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(OAuth2Error::InvalidRequest("refresh_token is required"))?;

    let issued = state
        .tokens()
        .rotate(&client.id, refresh_token, OffsetDateTime::now_utc())
        .await?;

    build_token_response(state, issued, None).await
}

async fn build_token_response(
    state: &OAuth2State,
    issued: IssuedTokens,
    nonce: Option<&str>,
) -> Result<TokenResponse, OAuth2Error> {
    let id_token = if issued.access.has_scope("openid") {
        let user = state.users().find(&issued.access.user_id).await?;
        Some(
            state
                .id_tokens()
                .sign(&issued.access, &issued.access_token, user.as_ref(), nonce)?,
        )
    } else {
        None
    };

    Ok(TokenResponse {
        access_token: issued.access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_lifetime,
        refresh_token: issued.refresh_token,
        id_token,
        scope: issued.access.scope,
    })
}

/// Introspection and revocation always require an authenticated confidential client.
async fn authenticate_resource_client(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: &TokenOperationRequest,
) -> Result<oauth2_client::Model, OAuth2Error> {
    let credentials: ClientCredentials = extract_client_credentials(
        headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    )
    .ok_or(OAuth2Error::Unauthenticated)?;

    state
        .clients()
        .authenticate(&credentials)
        .await
        .map_err(|e| match e {
            OAuth2Error::InvalidClient => OAuth2Error::Unauthenticated,
            other => other,
        })
}

fn required_token(params: &TokenOperationRequest) -> Result<&str, OAuth2Error> {
    params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(OAuth2Error::InvalidRequest("token is required"))
}
