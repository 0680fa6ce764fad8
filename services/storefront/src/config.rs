//! Application configuration
//!
//! Settings are read from environment variables through the `config` crate,
//! layered over the defaults below. Database and Redis connections are
//! configured separately in `common`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::admission::EmptyTargetPolicy;

/// Where admission windows are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Per-process map; limits are per replica
    Memory,
    /// Shared windows in Redis (`REDIS_URL`)
    Redis,
}

/// Storefront service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,

    /// Hits admitted per key and window on the password-reset endpoint
    pub rate_limit_max: u32,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_backend: RateLimitBackend,
    pub rate_limit_empty_email: EmptyTargetPolicy,
    /// Interval of the expired-window sweep
    pub rate_limit_sweep_seconds: u64,

    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_first_name: String,
    pub admin_last_name: String,

    pub smtp_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub smtp_secure: Option<bool>,

    /// Recipient of quote notifications, falls back to `admin_email`
    pub quote_to_email: Option<String>,
    pub business_name: String,
}

impl AppConfig {
    /// Load the configuration from the process environment
    ///
    /// # Environment Variables
    /// - `PORT` (default: 4000)
    /// - `JWT_SECRET` (default: "dev-secret-change-me"), `JWT_EXPIRY_SECONDS` (default: 604800)
    /// - `RATE_LIMIT_MAX` (default: 5), `RATE_LIMIT_WINDOW_SECONDS` (default: 900)
    /// - `RATE_LIMIT_BACKEND`: "memory" or "redis" (default: "memory")
    /// - `RATE_LIMIT_EMPTY_EMAIL`: "admit" or "shared" (default: "admit")
    /// - `RATE_LIMIT_SWEEP_SECONDS` (default: 300)
    /// - `ADMIN_EMAIL`, `ADMIN_PASSWORD`, `ADMIN_FIRST_NAME` (default: "Admin"), `ADMIN_LAST_NAME`
    /// - `SMTP_URL` or `SMTP_HOST`/`SMTP_PORT`/`SMTP_USER`/`SMTP_PASS`, `SMTP_SECURE`
    /// - `QUOTE_TO_EMAIL`, `BUSINESS_NAME` (default: "Sight Tech")
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .set_default("port", 4000_i64)?
            .set_default("jwt_secret", "dev-secret-change-me")?
            .set_default("jwt_expiry_seconds", 604_800_i64)?
            .set_default("rate_limit_max", 5_i64)?
            .set_default("rate_limit_window_seconds", 900_i64)?
            .set_default("rate_limit_backend", "memory")?
            .set_default("rate_limit_empty_email", "admit")?
            .set_default("rate_limit_sweep_seconds", 300_i64)?
            .set_default("admin_first_name", "Admin")?
            .set_default("admin_last_name", "")?
            .set_default("business_name", "Sight Tech")?
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config.without_blank_values())
    }

    /// Zero limits or intervals would disable admission control
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("RATE_LIMIT_MAX", u64::from(self.rate_limit_max)),
            ("RATE_LIMIT_WINDOW_SECONDS", self.rate_limit_window_seconds),
            ("RATE_LIMIT_SWEEP_SECONDS", self.rate_limit_sweep_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Treat variables that are set but empty as unset
    fn without_blank_values(mut self) -> Self {
        for value in [
            &mut self.admin_email,
            &mut self.admin_password,
            &mut self.smtp_url,
            &mut self.smtp_host,
            &mut self.smtp_user,
            &mut self.smtp_pass,
            &mut self.quote_to_email,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
        self
    }

    /// Address that receives quote notifications
    pub fn quote_recipient(&self) -> Option<&str> {
        self.quote_to_email
            .as_deref()
            .or(self.admin_email.as_deref())
    }
}
