//! OAuth2 Login endpoints.
//!
//! The login page is served elsewhere; it reads the pending request with
//! `GET /login` and, once the user has signed in, hands the user's session
//! credential to `POST /login` which binds the user to the request and returns
//! the client redirect carrying the authorization code.

use crate::error::{ErrorResponse, OAuth2Error};
use crate::oauth2::identity::AuthenticatedSubject;
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Query parameters for the login-info lookup.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Identifier handed to the login page by `/authorize`
    pub request_id: Option<String>,
}

/// What the login page needs to render the consent prompt.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfoResponse {
    pub request_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginCompleteRequest {
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginCompleteResponse {
    /// Client redirect URI with `code`, `iss` and `state` appended
    pub redirect_uri: String,
}

/// Creates the login router.
pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new().routes(routes!(login_info, login_complete))
}

/// Describe a pending authorization request.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/login",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Login Info",
    summary = "Look up a pending authorization request",
    description = "Returns the client, scopes and redirect URI of a pending authorization request. \
                   Requires no authentication. Unknown, expired and completed requests are all \
                   reported as not found.",
    params(LoginQuery),
    responses(
        (status = 200, description = "Pending authorization request", body = LoginInfoResponse),
        (status = 404, description = "No pending request with this id", body = ErrorResponse),
    )
)]
pub async fn login_info(
    State(state): State<OAuth2State>,
    Query(query): Query<LoginQuery>,
) -> Result<Json<LoginInfoResponse>, OAuth2Error> {
    let request_id = query
        .request_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(OAuth2Error::InvalidRequest("request_id is required"))?;

    let request = state
        .requests()
        .find_pending(request_id, OffsetDateTime::now_utc())
        .await?;

    Ok(Json(LoginInfoResponse {
        scopes: request.scopes_list(),
        request_id: request.id,
        client_id: request.client_id,
        redirect_uri: request.redirect_uri,
    }))
}

/// Complete a pending authorization request for the signed-in user.
#[tracing::instrument(skip(state, subject, body), fields(user_id = %subject.0.subject_id))]
#[utoipa::path(
    post,
    path = "/login",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Login Complete",
    summary = "Bind the signed-in user to an authorization request",
    description = "Requires the user's own session credential as a Bearer token. Marks the \
                   request completed, mints a single-use authorization code and returns the \
                   client redirect URI carrying `code`, `iss` and, when one was supplied, `state`.\n\n\
                   A request can be completed only once.",
    request_body = LoginCompleteRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Redirect target for the user agent", body = LoginCompleteResponse),
        (status = 400, description = "Unknown, expired or already completed request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid user credential", body = ErrorResponse),
    )
)]
pub async fn login_complete(
    State(state): State<OAuth2State>,
    subject: AuthenticatedSubject,
    Json(body): Json<LoginCompleteRequest>,
) -> Result<Json<LoginCompleteResponse>, OAuth2Error> {
    let completed = state
        .requests()
        .complete(
            &body.request_id,
            &subject.0.subject_id,
            OffsetDateTime::now_utc(),
        )
        .await?;

    let mut redirect = completed.redirect;
    {
        let mut query = redirect.query_pairs_mut();
        query.append_pair("code", &completed.code);
        query.append_pair("iss", state.issuer());
        if let Some(client_state) = completed.request.state.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("state", client_state);
        }
    }

    Ok(Json(LoginCompleteResponse {
        redirect_uri: redirect.to_string(),
    }))
}
