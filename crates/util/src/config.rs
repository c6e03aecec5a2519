use std::{env, fmt, net::SocketAddr, num::ParseIntError, time::Duration};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://spend_goals.db?mode=rwc";
pub const DEFAULT_SHOPIFY_API_VERSION: &str = "2024-10";
pub const DEFAULT_SHOPIFY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BULK_CONCURRENCY: usize = 4;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Connection settings for the Shopify Admin API.
#[derive(Clone)]
pub struct ShopifyConfig {
    pub shop_domain: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub shopify: ShopifyConfig,
    pub bulk_concurrency: usize,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = env::var("APP_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(ConfigError::BindAddress)?;
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let shop_domain = required("SHOPIFY_SHOP_DOMAIN")?;
        let access_token = required("SHOPIFY_ACCESS_TOKEN")?;
        let api_version = env::var("SHOPIFY_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_SHOPIFY_API_VERSION.to_string());
        let timeout_secs = parse_number("SHOPIFY_TIMEOUT_SECS", DEFAULT_SHOPIFY_TIMEOUT_SECS)?;

        let bulk_concurrency = parse_number("BULK_CONCURRENCY", DEFAULT_BULK_CONCURRENCY)?;
        if bulk_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            shopify: ShopifyConfig {
                shop_domain,
                access_token,
                api_version,
                timeout: Duration::from_secs(timeout_secs),
            },
            bulk_concurrency,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_number<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|err| ConfigError::InvalidNumber(name, err)),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidNumber(&'static str, ParseIntError),
    ZeroConcurrency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::Missing(name) => write!(f, "{name} must be set"),
            Self::InvalidNumber(name, err) => write!(f, "invalid {name} value: {err}"),
            Self::ZeroConcurrency => write!(f, "BULK_CONCURRENCY must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ENV_GUARD;

    const VARS: &[&str] = &[
        "APP_ENV",
        "APP_BIND_ADDR",
        "DATABASE_URL",
        "SHOPIFY_SHOP_DOMAIN",
        "SHOPIFY_ACCESS_TOKEN",
        "SHOPIFY_API_VERSION",
        "SHOPIFY_TIMEOUT_SECS",
        "BULK_CONCURRENCY",
    ];

    fn reset() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("SHOPIFY_SHOP_DOMAIN", "example.myshopify.com");
        env::set_var("SHOPIFY_ACCESS_TOKEN", "shpat_test");
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.shopify.api_version, DEFAULT_SHOPIFY_API_VERSION);
        assert_eq!(config.shopify.timeout, Duration::from_secs(10));
        assert_eq!(config.bulk_concurrency, DEFAULT_BULK_CONCURRENCY);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        env::remove_var("APP_ENV");
    }

    #[test]
    fn parses_production_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("BULK_CONCURRENCY", "8");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.bulk_concurrency, 8);

        reset();
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();
        env::set_var("APP_BIND_ADDR", "localhost");

        let err = AppConfig::from_env().expect_err("bind address needs a port");
        assert!(matches!(err, ConfigError::BindAddress(_)));

        reset();
    }

    #[test]
    fn requires_shopify_credentials() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();
        env::remove_var("SHOPIFY_ACCESS_TOKEN");

        let err = AppConfig::from_env().expect_err("missing token should error");
        assert!(matches!(err, ConfigError::Missing("SHOPIFY_ACCESS_TOKEN")));

        reset();
    }

    #[test]
    fn rejects_zero_bulk_concurrency() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        reset();
        env::set_var("BULK_CONCURRENCY", "0");

        let err = AppConfig::from_env().expect_err("zero concurrency should error");
        assert!(matches!(err, ConfigError::ZeroConcurrency));

        env::set_var("BULK_CONCURRENCY", "many");
        let err = AppConfig::from_env().expect_err("non numeric should error");
        assert!(matches!(err, ConfigError::InvalidNumber("BULK_CONCURRENCY", _)));

        reset();
    }

    #[test]
    fn debug_output_redacts_access_token() {
        let config = ShopifyConfig {
            shop_domain: "example.myshopify.com".into(),
            access_token: "shpat_secret".into(),
            api_version: DEFAULT_SHOPIFY_API_VERSION.into(),
            timeout: Duration::from_secs(1),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("shpat_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
