//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP listener and static frontend settings
    pub server: ServerConfig,
    /// JWT, session cookie and registration settings
    pub auth: AuthConfig,
    /// SQLite connection pool settings
    pub database: DatabaseConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Trial, sweep and suspension appeal settings
    #[serde(default)]
    pub trial: TrialConfig,
    /// Outgoing mail (verification, welcome, receipts)
    #[serde(default)]
    pub email: EmailConfig,
    /// Per-IP request quotas
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Initial super admin account created at startup
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Send Strict-Transport-Security (enable when served over HTTPS)
    #[serde(default)]
    pub hsts: bool,
    /// Path to a prebuilt SPA directory to serve next to the API
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Allowed CORS origins (empty allows any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 signing secret (at least 32 characters)
    pub jwt_secret: String,
    /// Access token lifetime in hours
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,
    /// Name of the session cookie carrying the access token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (disable only for plain-HTTP development)
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    /// Minimum password length; upper, lower, digit and symbol are always required
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    /// Keep verified registrants in PENDING_APPROVAL until a super admin approves them
    #[serde(default)]
    pub require_admin_approval: bool,
    /// Lifetime of e-mail verification links
    #[serde(default = "default_verification_token_hours")]
    pub verification_token_hours: i64,
}

fn default_token_expiry() -> u64 {
    24
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

fn default_password_min_length() -> usize {
    8
}

fn default_verification_token_hours() -> i64 {
    24
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://medsas.db`
    pub url: String,
    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connections kept open while idle
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Seconds before an idle connection is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix (default: "medsas")
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
    /// Maximum number of log files to keep (0 = unlimited)
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console (stdout/stderr) - default for development
    #[default]
    Console,
    /// Log to file with optional rotation
    File,
    /// Log to both console and file
    Both,
}

/// Log line format
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/medsas")
}

fn default_log_prefix() -> String {
    "medsas".to_string()
}

fn default_log_rotation() -> bool {
    true
}

fn default_max_log_files() -> usize {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
            max_log_files: default_max_log_files(),
        }
    }
}

/// Trial and lifecycle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrialConfig {
    /// Trial length granted at registration
    #[serde(default = "default_trial_days")]
    pub default_days: i64,
    /// Run the lifecycle sweep inside the server every N seconds (0 disables)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// How long a suspended user may appeal
    #[serde(default = "default_appeal_window_days")]
    pub appeal_window_days: i64,
}

fn default_trial_days() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_appeal_window_days() -> i64 {
    14
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            default_days: default_trial_days(),
            sweep_interval_secs: default_sweep_interval(),
            appeal_window_days: default_appeal_window_days(),
        }
    }
}

/// SMTP and mail template settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    /// SMTP relay host; when unset mails are only logged
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// SMTP submission port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP credentials; both must be set to authenticate
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender mailbox, e.g. `MedSAS <no-reply@example.com>`
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Public URL used to build verification links
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "MedSAS <no-reply@medsas.local>".to_string()
}

fn default_app_base_url() -> String {
    "http://localhost:5080".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            app_base_url: default_app_base_url(),
        }
    }
}

/// Per-IP rate limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    /// Disable only for tests or when a proxy enforces limits
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Public auth endpoints (login, register, verify)
    #[serde(default = "default_auth_rps")]
    pub auth_requests_per_second: u32,
    /// Requests allowed at once on auth endpoints
    #[serde(default = "default_auth_burst")]
    pub auth_burst_size: u32,
    /// Authenticated API
    #[serde(default = "default_api_rps")]
    pub api_requests_per_second: u32,
    /// Requests allowed at once on the authenticated API
    #[serde(default = "default_api_burst")]
    pub api_burst_size: u32,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_auth_rps() -> u32 {
    1
}

fn default_auth_burst() -> u32 {
    5
}

fn default_api_rps() -> u32 {
    50
}

fn default_api_burst() -> u32 {
    100
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            auth_requests_per_second: default_auth_rps(),
            auth_burst_size: default_auth_burst(),
            api_requests_per_second: default_api_rps(),
            api_burst_size: default_api_burst(),
        }
    }
}

/// First super admin
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub super_admin_email: Option<String>,
    #[serde(default)]
    pub super_admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                hsts: false,
                static_dir: None,
                cors_origins: Vec::new(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                token_expiry_hours: default_token_expiry(),
                cookie_name: default_cookie_name(),
                cookie_secure: default_cookie_secure(),
                password_min_length: default_password_min_length(),
                require_admin_approval: false,
                verification_token_hours: default_verification_token_hours(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/medsas.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            logging: LoggingConfig::default(),
            trial: TrialConfig::default(),
            email: EmailConfig::default(),
            rate_limit: RateLimitSettings::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("MEDSAS_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        Self::load_from(config_path.as_ref())
    }

    /// Load configuration from an explicit path (falls back to defaults if missing)
    pub fn load_from(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str::<AppConfig>(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/medsas/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("medsas/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MEDSAS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MEDSAS_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MEDSAS_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }

        if let Ok(host) = std::env::var("SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
        if let Ok(user) = std::env::var("SMTP_USERNAME") {
            self.email.smtp_username = Some(user);
        }
        if let Ok(password) = std::env::var("SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }

        if let Ok(email) = std::env::var("MEDSAS_SUPER_ADMIN_EMAIL") {
            self.bootstrap.super_admin_email = Some(email);
        }
        if let Ok(password) = std::env::var("MEDSAS_SUPER_ADMIN_PASSWORD") {
            self.bootstrap.super_admin_password = Some(password);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.trial.default_days <= 0 {
            anyhow::bail!("Default trial length must be positive");
        }

        if let Some(ref static_dir) = self.server.static_dir {
            if !static_dir.exists() {
                tracing::warn!(
                    "Static directory does not exist: {:?}. Frontend will not be served.",
                    static_dir
                );
            }
        }

        Ok(())
    }
}
