//! HTTP surface of the authorization server.
//!
//! - `oauth2` routes under `/oauth2/*`
//! - `/.well-known/openid-configuration`
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration, rendered with ReDoc at `/api-docs`

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Build the complete application router.
pub fn app(state: OAuth2State) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth2", oauth2::router(state.clone()))
        .merge(oauth2::discovery_router(state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let state = OAuth2State::new(resources.db.clone(), resources.config.oauth2.clone());
    let router = app(state);

    let addr = resources.config.listen_addr.as_str();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, issuer = %resources.config.oauth2.issuer_url, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
