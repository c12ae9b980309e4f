use serde::{Deserialize, Serialize};
use ssogate_auth::{Client, OAuthServerConfig};
use ssogate_sso::{RedisConfig, SsoConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Engine settings (lifetimes, allowed grant types, PKCE policy)
    #[serde(default)]
    pub oauth: OAuthServerConfig,
    /// SSO hierarchy settings (key prefixes, multi-account, grace period)
    #[serde(default)]
    pub sso: SsoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Parent-token cookie
    #[serde(default)]
    pub session: SessionConfig,
    /// Clients registered at startup
    #[serde(default)]
    pub clients: Vec<Client>,
    /// Resource owners allowed to sign in with a password
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.oauth.validate().map_err(|e| format!("oauth: {e}"))?;
        if self.session.cookie_name.trim().is_empty() {
            return Err("session.cookie_name must not be empty".into());
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres.url.is_empty()
        {
            return Err("storage.backend=postgres requires storage.postgres.url".into());
        }
        if let Some(client) = self.clients.iter().find(|c| c.id.is_empty()) {
            return Err(format!(
                "clients: client with redirect_uri {:?} has an empty id",
                client.redirect_uri
            ));
        }
        let mut usernames = std::collections::HashSet::new();
        for user in &self.users {
            if user.uid <= 0 {
                return Err(format!("users: uid for {} must be > 0", user.username));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(format!("users: duplicate username {}", user.username));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SSO hierarchy over Redis or the in-memory store
    #[default]
    Sso,
    /// Relational adapter (no SSO session endpoints)
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub url: String,
    /// Create the tables at startup
    #[serde(default = "default_true")]
    pub init_schema: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            init_schema: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the cookie Secure (HTTPS only)
    #[serde(default)]
    pub secure: bool,
    /// Platform label recorded on the parent session
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_cookie_name() -> String {
    "ssogate_session".into()
}
fn default_platform() -> String {
    "web".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure: false,
            platform: default_platform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredential {
    pub uid: i64,
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("ssogate.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SSOGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("SSOGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
