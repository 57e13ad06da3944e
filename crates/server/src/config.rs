use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub oauth2: OAuth2Config,
}

/// Authorization server settings. All lifetimes are in seconds.
#[derive(Clone, Deserialize)]
pub struct OAuth2Config {
    /// Issuer URL placed in ID tokens, introspection responses and redirects
    pub issuer_url: String,
    /// Page the resource owner is sent to with `request_id`; defaults to `<issuer>/oauth2/login`
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    #[serde(default = "default_authorization_request_lifetime")]
    pub authorization_request_lifetime: i64,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    /// HS256 key for ID tokens
    pub id_token_secret: String,
    /// HS256 key the external sign-in service uses for user session tokens
    pub user_token_secret: String,
    /// How often expired rows are purged; 0 disables the task
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// How long expired rows are kept before purging
    #[serde(default = "default_cleanup_retention_secs")]
    pub cleanup_retention_secs: i64,
}

impl OAuth2Config {
    /// Config with default lifetimes and the given issuer and signing secrets.
    pub fn new(
        issuer_url: impl Into<String>,
        id_token_secret: impl Into<String>,
        user_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            login_url: None,
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_request_lifetime: default_authorization_request_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
            id_token_secret: id_token_secret.into(),
            user_token_secret: user_token_secret.into(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cleanup_retention_secs: default_cleanup_retention_secs(),
        }
    }

    pub fn login_url(&self) -> String {
        match &self.login_url {
            Some(url) => url.clone(),
            None => format!("{}/oauth2/login", self.issuer_url.trim_end_matches('/')),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.issuer_url).is_err() {
            return Err(ConfigError::Validation(
                "oauth2.issuer_url must be an absolute URL".into(),
            ));
        }
        if url::Url::parse(&self.login_url()).is_err() {
            return Err(ConfigError::Validation(
                "oauth2.login_url must be an absolute URL".into(),
            ));
        }
        if self.id_token_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "oauth2.id_token_secret must be at least 32 characters".into(),
            ));
        }
        if self.user_token_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "oauth2.user_token_secret must be at least 32 characters".into(),
            ));
        }
        for (name, value) in [
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            (
                "authorization_request_lifetime",
                self.authorization_request_lifetime,
            ),
            (
                "authorization_code_lifetime",
                self.authorization_code_lifetime,
            ),
        ] {
            if value <= 0 {
                return Err(ConfigError::Validation(format!(
                    "oauth2.{name} must be a positive number of seconds"
                )));
            }
        }
        Ok(())
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_access_token_lifetime() -> i64 {
    900
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30
}

fn default_authorization_request_lifetime() -> i64 {
    600
}

fn default_authorization_code_lifetime() -> i64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_cleanup_retention_secs() -> i64 {
    86400
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double underscores
/// (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.oauth2.validate()?;

    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
