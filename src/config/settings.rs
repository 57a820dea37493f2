//! Application settings loading from config.toml
//!
//! Settings are read from a TOML file (path taken from `LMS_CONFIG`, falling back to
//! `./config.toml`). Every section is optional; missing values use the defaults below.
//! A handful of environment variables override the file so deployments can keep secrets
//! and addresses out of it.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Lowest bcrypt cost accepted for password hashing.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Highest bcrypt cost the hashing library supports.
pub const MAX_BCRYPT_COST: u32 = 31;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and cookie settings
    pub server: ServerSettings,
    /// Storage settings
    pub database: DatabaseSettings,
    /// Credential and session settings
    pub auth: AuthSettings,
    /// Dashboard list sizes
    pub dashboard: DashboardSettings,
    /// Payment processor settings
    pub payments: PaymentSettings,
    /// Optional Super Admin account created on first start
    pub seed_admin: Option<SeedAdmin>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind, e.g. `127.0.0.1:3000`
    pub bind_addr: String,
    /// Externally visible base URL, used to build password reset links
    pub public_host: String,
    /// Name of the session cookie
    pub session_cookie: String,
    /// Whether the session cookie carries the `Secure` attribute
    pub secure_cookies: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            public_host: "http://localhost:3000".to_string(),
            session_cookie: "lms.sid".to_string(),
            secure_cookies: false,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `SeaORM` connection URL
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: super::database::DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Credential verifier settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// bcrypt work factor; must be at least [`MIN_BCRYPT_COST`]
    pub bcrypt_cost: u32,
    /// Lifetime of a password reset token in minutes
    pub reset_token_ttl_minutes: i64,
    /// Session lifetime in hours of inactivity
    pub session_ttl_hours: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: 12,
            reset_token_ttl_minutes: 60,
            session_ttl_hours: 24,
        }
    }
}

/// Dashboard list sizes
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Length of the "recent" lists on admin, teacher and finance dashboards
    pub recent_limit: u64,
    /// Length of the recent submissions list on the student dashboard
    pub student_submission_limit: u64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            recent_limit: 10,
            student_submission_limit: 5,
        }
    }
}

/// Payment processor settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    /// Make the mock processor decline every charge
    pub decline_all: bool,
}

/// Super Admin account seeded when no user with this email exists
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAdmin {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Initial password; must satisfy the password policy
    pub password: String,
}

impl AppConfig {
    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// Recognized variables: `DATABASE_URL`, `LMS_BIND_ADDR`, `LMS_PUBLIC_HOST`,
    /// `LMS_BCRYPT_COST`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(addr) = lookup("LMS_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(host) = lookup("LMS_PUBLIC_HOST") {
            self.server.public_host = host;
        }
        if let Some(cost) = lookup("LMS_BCRYPT_COST") {
            self.auth.bcrypt_cost = cost.trim().parse().map_err(|e| Error::Config {
                message: format!("LMS_BCRYPT_COST is not a number: {e}"),
            })?;
        }
        Ok(())
    }

    /// Checks value ranges that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(Error::Config {
                message: format!(
                    "auth.bcrypt_cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}, got {}",
                    self.auth.bcrypt_cost
                ),
            });
        }
        if self.auth.reset_token_ttl_minutes <= 0 || self.auth.session_ttl_hours <= 0 {
            return Err(Error::Config {
                message: "auth token and session lifetimes must be positive".to_string(),
            });
        }
        if self.dashboard.recent_limit == 0 || self.dashboard.student_submission_limit == 0 {
            return Err(Error::Config {
                message: "dashboard list sizes must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads application configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the configuration used at startup.
///
/// Reads the file named by `LMS_CONFIG` (default `./config.toml`). A missing default file
/// is not an error; defaults are used instead. Environment overrides are applied last and
/// the result is validated.
pub fn load_app_config() -> Result<AppConfig> {
    let explicit = std::env::var("LMS_CONFIG").ok();
    let path = explicit.clone().unwrap_or_else(|| "config.toml".to_string());

    let mut config = if Path::new(&path).exists() {
        info!("Loading configuration from {path}");
        load_config(&path)?
    } else if explicit.is_some() {
        return Err(Error::Config {
            message: format!("Config file {path} does not exist"),
        });
    } else {
        warn!("No config.toml found, using default settings");
        AppConfig::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_partial_config_uses_defaults() {
        let toml_str = r#"
            [server]
            bind_addr = "0.0.0.0:8080"

            [auth]
            bcrypt_cost = 11

            [seed_admin]
            name = "Root"
            email = "root@example.com"
            password = "Sup3rSecret"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.session_cookie, "lms.sid");
        assert_eq!(config.auth.bcrypt_cost, 11);
        assert_eq!(config.auth.reset_token_ttl_minutes, 60);
        assert_eq!(config.dashboard.recent_limit, 10);
        assert_eq!(config.dashboard.student_submission_limit, 5);
        assert!(!config.payments.decline_all);
        assert!(config.validate().is_ok());
        assert_eq!(config.seed_admin.unwrap().email, "root@example.com");
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| match key {
                "DATABASE_URL" => Some("sqlite::memory:".to_string()),
                "LMS_BCRYPT_COST" => Some("13".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.auth.bcrypt_cost, 13);
        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_low_bcrypt_cost_is_rejected() {
        let mut config = AppConfig::default();
        config.auth.bcrypt_cost = 4;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let err = config
            .apply_overrides(|key| (key == "LMS_BCRYPT_COST").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
