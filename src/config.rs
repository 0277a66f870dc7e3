//! Layered configuration for the CRM server.
//!
//! Settings are resolved in this order, later layers winning:
//! 1. built-in defaults
//! 2. `crm.toml` (or the file given with `--config`)
//! 3. environment variables (a `.env` file is loaded first)
//! 4. CLI flags, applied by the command that needs them
//!
//! # Configuration File Format
//!
//! ```toml
//! [app]
//! name = "AFPI CRM"
//! environment = "development"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! cors_origin = "http://localhost:4200"
//!
//! [database]
//! path = "data/afpi_crm.db"
//!
//! [auth]
//! jwt_secret = "at-least-thirty-two-characters-long"
//! token_ttl_minutes = 480
//!
//! [seed]
//! admin_email = "admin@afpi-crm.fr"
//! admin_password = "Admin123!"
//! on_startup = false
//!
//! [log]
//! format = "pretty"
//! dir = "logs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "crm.toml";

/// Minimum length of the HS256 signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

const DEVELOPMENT_JWT_SECRET: &str = "afpi-crm-development-secret-not-for-production";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_app_name() -> String {
    "AFPI CRM".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed by CORS (the admin front-end).
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "http://localhost:4200".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/afpi_crm.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// HS256 signing secret. Required outside development.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

fn default_token_ttl_minutes() -> i64 {
    480
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSection {
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Seed permissions, roles, localisations and the admin on `serve`.
    #[serde(default)]
    pub on_startup: bool,
}

fn default_admin_email() -> String {
    "admin@afpi-crm.fr".to_string()
}

fn default_admin_password() -> String {
    "Admin123!".to_string()
}

impl Default for SeedSection {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for daily-rolling log files; stdout only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// The complete crm.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub seed: SeedSection,
    #[serde(default)]
    pub log: LogSection,
}

impl CrmConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse crm.toml")
    }

    /// Load `crm.toml` from `dir`, or defaults when the file doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize crm.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolve the effective configuration: file, then `.env` and process
    /// environment. An explicit `path` must exist.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::load(p)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                Self::load_or_default(&cwd)?
            }
        };
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP_NAME") {
            self.app.name = v;
        }
        if let Some(v) = lookup("APP_ENV") {
            self.app.environment = v;
        }
        if let Some(v) = lookup("APP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("APP_PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("Invalid APP_PORT '{}'", v))?;
        }
        if let Some(v) = lookup("FRONTEND_URL") {
            self.server.cors_origin = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("JWT_TTL_MINUTES") {
            self.auth.token_ttl_minutes = v
                .parse()
                .with_context(|| format!("Invalid JWT_TTL_MINUTES '{}'", v))?;
        }
        if let Some(v) = lookup("SEED_ADMIN_EMAIL") {
            self.seed.admin_email = v;
        }
        if let Some(v) = lookup("SEED_ADMIN_PASSWORD") {
            self.seed.admin_password = v;
        }
        if let Some(v) = lookup("SEED_ON_STARTUP") {
            self.seed.on_startup = v == "true" || v == "1";
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.log.format = v.parse()?;
        }
        if let Some(v) = lookup("LOG_DIR") {
            self.log.dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    /// The signing secret, falling back to a fixed secret outside production.
    pub fn jwt_secret(&self) -> Result<String> {
        match &self.auth.jwt_secret {
            Some(secret) => Ok(secret.clone()),
            None if self.is_production() => {
                anyhow::bail!("JWT_SECRET must be set when APP_ENV=production")
            }
            None => Ok(DEVELOPMENT_JWT_SECRET.to_string()),
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }

        match &self.auth.jwt_secret {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => warnings.push(format!(
                "auth.jwt_secret is {} bytes; at least {} are required",
                secret.len(),
                MIN_JWT_SECRET_LEN
            )),
            None if self.is_production() => {
                warnings.push("auth.jwt_secret is not set in production".to_string())
            }
            None => warnings.push(
                "auth.jwt_secret is not set; using the development secret".to_string(),
            ),
            _ => {}
        }

        if self.auth.token_ttl_minutes <= 0 {
            warnings.push(format!(
                "Invalid auth.token_ttl_minutes {}: must be positive",
                self.auth.token_ttl_minutes
            ));
        }

        if self.is_production() && self.seed.admin_password == default_admin_password() {
            warnings.push("seed.admin_password is the default value in production".to_string());
        }

        warnings
    }
}
