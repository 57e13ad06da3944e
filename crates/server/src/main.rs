use oauth2_server::AppResources;
use oauth2_server::api::start_webserver;
use oauth2_server::config::load_config_or_panic;
use oauth2_server::oauth2::cleanup::spawn_cleanup_task;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "oauth2_server=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");

    initialize_standard_tracing();

    let config = Arc::new(load_config_or_panic());

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    tracing::info!(
        access_token_lifetime = config.oauth2.access_token_lifetime,
        refresh_token_lifetime = config.oauth2.refresh_token_lifetime,
        cleanup_interval_secs = config.oauth2.cleanup_interval_secs,
        "OAuth2 configuration"
    );
    spawn_cleanup_task(db.clone(), &config.oauth2);

    let resources = AppResources { db, config };
    start_webserver(resources).await?;
    Ok(())
}
