//! Layered settings
//!
//! Lowest to highest precedence: built-in defaults, optional `config/default`,
//! `config/{ENVIRONMENT}` and `config/local` files, `AUDIT_PROXY__SECTION__KEY`
//! environment variables, then the plain `TARGET`, `PORT`, `TOKEN` and
//! `DATABASE_PRIVATE_URL`/`DATABASE_URL` variables existing deployments set.

use crate::domain::types::{ControlToken, PathPrefix, TargetUrl};
use crate::error::{Error, Result};
use crate::proxy::audit_path::{AuditConfig, DEFAULT_DIAGNOSTIC_CHANNEL_CAPACITY};
use crate::proxy::headers::paths;
use crate::proxy::types::{
    ProxyConfig, RequestSizeLimit, DEFAULT_MAX_REQUEST_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TARGET,
};
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub use config::ConfigError;

const ENV_PREFIX: &str = "AUDIT_PROXY";

/// Plain environment variables honored on top of everything else
mod legacy_env {
    pub const ENVIRONMENT: &str = "ENVIRONMENT";
    pub const TARGET: &str = "TARGET";
    pub const PORT: &str = "PORT";
    pub const TOKEN: &str = "TOKEN";
    pub const DATABASE_PRIVATE_URL: &str = "DATABASE_PRIVATE_URL";
    pub const DATABASE_URL: &str = "DATABASE_URL";
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub proxy: ProxySettings,
    #[serde(default)]
    pub control: ControlSettings,
    pub database: DatabaseSettings,
    pub audit: AuditSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub target: String,
    pub api_prefix: String,
    pub control_path: String,
    pub request_timeout_secs: u64,
    pub max_request_size: usize,
    pub change_origin: bool,
}

#[derive(Deserialize, Clone, Default)]
pub struct ControlSettings {
    pub token: Option<String>,
}

impl std::fmt::Debug for ControlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSettings")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    pub diagnostic_channel_capacity: usize,
    pub initially_active: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Settings {
    /// Load settings from files and the process environment
    pub fn new() -> std::result::Result<Self, ConfigError> {
        Self::from_env(env::vars().collect())
    }

    /// Load settings from files and the given environment variables
    pub fn from_env(vars: Map<String, String>) -> std::result::Result<Self, ConfigError> {
        let var = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let environment = var(legacy_env::ENVIRONMENT).unwrap_or_else(|| "development".to_string());
        let database_url =
            var(legacy_env::DATABASE_PRIVATE_URL).or_else(|| var(legacy_env::DATABASE_URL));

        let config = Config::builder()
            // Start with default values
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 3001)?
            .set_default("application.environment", environment.clone())?
            .set_default("proxy.target", DEFAULT_TARGET)?
            .set_default("proxy.api_prefix", paths::API_PREFIX)?
            .set_default("proxy.control_path", paths::CONTROL)?
            .set_default("proxy.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("proxy.max_request_size", DEFAULT_MAX_REQUEST_SIZE as u64)?
            .set_default("proxy.change_origin", true)?
            .set_default("database.max_connections", 10)?
            .set_default("database.run_migrations", true)?
            .set_default(
                "audit.diagnostic_channel_capacity",
                DEFAULT_DIAGNOSTIC_CHANNEL_CAPACITY as u64,
            )?
            .set_default("audit.initially_active", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .set_override_option("proxy.target", var(legacy_env::TARGET))?
            .set_override_option("application.port", var(legacy_env::PORT))?
            .set_override_option("control.token", var(legacy_env::TOKEN))?
            .set_override_option("database.url", database_url)?
            .build()?;

        config.try_deserialize()
    }

    /// Address the proxy listens on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Validated proxy configuration
    pub fn proxy_config(&self) -> Result<ProxyConfig> {
        let proxy = &self.proxy;

        let target = TargetUrl::try_new(proxy.target.as_str())
            .map_err(|e| Error::invalid_setting("proxy.target", e))?;
        let api_prefix = PathPrefix::try_new(proxy.api_prefix.as_str())
            .map_err(|e| Error::invalid_setting("proxy.api_prefix", e))?;
        let control_path = PathPrefix::try_new(proxy.control_path.as_str())
            .map_err(|e| Error::invalid_setting("proxy.control_path", e))?;
        let max_request_size = RequestSizeLimit::try_new(proxy.max_request_size)
            .map_err(|e| Error::invalid_setting("proxy.max_request_size", e))?;

        if proxy.request_timeout_secs == 0 {
            return Err(Error::invalid_setting(
                "proxy.request_timeout_secs",
                "must be greater than zero",
            ));
        }

        let control_token = self
            .control
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ControlToken::try_new)
            .transpose()
            .map_err(|e| Error::invalid_setting("control.token", e))?;

        Ok(ProxyConfig {
            target,
            api_prefix,
            control_path,
            control_token,
            max_request_size,
            request_timeout: Duration::from_secs(proxy.request_timeout_secs),
            change_origin: proxy.change_origin,
        })
    }

    pub fn audit_config(&self) -> AuditConfig {
        AuditConfig {
            diagnostic_channel_capacity: self.audit.diagnostic_channel_capacity,
            initially_active: self.audit.initially_active,
        }
    }

    /// Storage connection string, if one is configured
    pub fn database_url(&self) -> Option<&str> {
        self.database
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_env(Map::new()).unwrap();

        assert_eq!(settings.application.port, 3001);
        assert_eq!(settings.application.environment, "development");
        assert_eq!(settings.proxy.target, DEFAULT_TARGET);
        assert_eq!(settings.proxy.api_prefix, "/api/");
        assert_eq!(settings.proxy.control_path, "/run");
        assert!(settings.proxy.change_origin);
        assert!(settings.control.token.is_none());
        assert!(settings.database_url().is_none());
        assert!(settings.database.run_migrations);
        assert!(settings.audit.initially_active);
        assert!(settings.logging.is_json());
    }

    #[test]
    fn test_legacy_variables() {
        let settings = Settings::from_env(vars(&[
            ("TARGET", "https://upstream.example"),
            ("PORT", "8088"),
            ("TOKEN", "s3cret"),
            ("DATABASE_URL", "postgres://fallback/db"),
            ("DATABASE_PRIVATE_URL", "postgres://private/db"),
        ]))
        .unwrap();

        assert_eq!(settings.proxy.target, "https://upstream.example");
        assert_eq!(settings.application.port, 8088);
        assert_eq!(settings.control.token.as_deref(), Some("s3cret"));
        assert_eq!(settings.database_url(), Some("postgres://private/db"));
    }

    #[test]
    fn test_database_url_fallback() {
        let settings =
            Settings::from_env(vars(&[("DATABASE_URL", "postgres://fallback/db")])).unwrap();
        assert_eq!(settings.database_url(), Some("postgres://fallback/db"));
    }

    #[test]
    fn test_prefixed_variables() {
        let settings = Settings::from_env(vars(&[
            ("AUDIT_PROXY__PROXY__REQUEST_TIMEOUT_SECS", "5"),
            ("AUDIT_PROXY__AUDIT__INITIALLY_ACTIVE", "false"),
            ("AUDIT_PROXY__LOGGING__FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(settings.proxy.request_timeout_secs, 5);
        assert!(!settings.audit.initially_active);
        assert!(!settings.logging.is_json());
    }

    #[test]
    fn test_legacy_variable_beats_prefixed() {
        let settings = Settings::from_env(vars(&[
            ("AUDIT_PROXY__PROXY__TARGET", "http://prefixed.example"),
            ("TARGET", "http://legacy.example"),
        ]))
        .unwrap();
        assert_eq!(settings.proxy.target, "http://legacy.example");
    }

    #[test]
    fn test_blank_token_is_no_token() {
        let settings = Settings::from_env(vars(&[("TOKEN", "   ")])).unwrap();
        let config = settings.proxy_config().unwrap();
        assert!(config.control_token.is_none());
    }

    #[test]
    fn test_proxy_config_from_defaults() {
        let config = Settings::from_env(vars(&[("TOKEN", "s3cret")]))
            .unwrap()
            .proxy_config()
            .unwrap();

        assert_eq!(config.target.as_ref(), DEFAULT_TARGET);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.control_token.is_some());
    }

    #[rstest]
    #[case("TARGET", "ftp://upstream.example", "proxy.target")]
    #[case("AUDIT_PROXY__PROXY__API_PREFIX", "api/", "proxy.api_prefix")]
    #[case("AUDIT_PROXY__PROXY__MAX_REQUEST_SIZE", "0", "proxy.max_request_size")]
    #[case("AUDIT_PROXY__PROXY__REQUEST_TIMEOUT_SECS", "0", "proxy.request_timeout_secs")]
    fn test_invalid_proxy_settings(
        #[case] name: &str,
        #[case] value: &str,
        #[case] field: &str,
    ) {
        let settings = Settings::from_env(vars(&[(name, value)])).unwrap();

        match settings.proxy_config() {
            Err(Error::InvalidSetting { field: actual, .. }) => assert_eq!(actual, field),
            other => panic!("expected invalid {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = Settings::from_env(vars(&[
            ("TOKEN", "s3cret"),
            ("DATABASE_URL", "postgres://user:pw@db/logs"),
        ]))
        .unwrap();

        let debug = format!("{settings:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("pw@db"));
    }
}
