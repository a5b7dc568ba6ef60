//! Application configuration
//!
//! Read from environment variables (a `.env` file is honoured) with defaults
//! suitable for local development.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Static dashboard and supervisor pages
    pub frontend_dir: String,
    pub session_expiry_hours: i64,
    /// How long a supervisor link stays valid
    pub assessment_link_days: i64,
    /// Origin used when building supervisor links
    pub public_base_url: String,
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
    pub environment: Environment,
    /// Peer IP prefixes whose X-Forwarded-For header is believed
    pub trusted_proxies: Vec<String>,
    /// Created on startup when no admin exists yet
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        // DATABASE_URL, or assembled from DATABASE_HOST/PORT/USER/PASSWORD/NAME
        let database_url = match var("DATABASE_URL") {
            Some(url) => url,
            None => {
                let part =
                    |key: &str| var(key).ok_or_else(|| ConfigError::Missing(key.to_string()));
                format!(
                    "postgres://{}:{}@{}:{}/{}",
                    part("DATABASE_USER")?,
                    part("DATABASE_PASSWORD")?,
                    part("DATABASE_HOST")?,
                    var("DATABASE_PORT").unwrap_or_else(|| "5432".to_string()),
                    part("DATABASE_NAME")?,
                )
            }
        };

        let port = parse_or(&var, "PORT", 8080)?;
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let bootstrap_pair = (var("BOOTSTRAP_ADMIN_EMAIL"), var("BOOTSTRAP_ADMIN_PASSWORD"));
        let bootstrap_admin = match bootstrap_pair {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        Ok(Config {
            public_base_url: var("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            host,
            port,
            database_url,
            frontend_dir: var("FRONTEND_DIR").unwrap_or_else(|| "./frontend".to_string()),
            session_expiry_hours: parse_or(&var, "SESSION_EXPIRY_HOURS", 8)?,
            assessment_link_days: parse_or(&var, "ASSESSMENT_LINK_DAYS", 14)?,
            max_body_bytes: parse_or(&var, "MAX_BODY_BYTES", 1024 * 1024)?,
            cors_origins: var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| vec!["http://localhost:8080".to_string()]),
            environment,
            trusted_proxies: var("TRUSTED_PROXIES")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            bootstrap_admin,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
