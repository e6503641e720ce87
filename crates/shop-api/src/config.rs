//! # Application Configuration
//!
//! Settings come from environment variables (a `.env` file is loaded first)
//! and, optionally, `config/storefront.toml`. Environment variables win over
//! the file. Secrets are only read from the environment.

use serde::Deserialize;
use shop_core::{Currency, ShopError, ShopResult};
use shop_stripe::StripeConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "config/storefront.toml",
    "../config/storefront.toml",
    "../../config/storefront.toml",
];

/// Which storage backend serves the ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ShopError::Configuration(format!(
                "STORE must be postgres or memory, got {other}"
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    pub store: StoreKind,
    /// Required for the Postgres store
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// HMAC key for bearer tokens
    pub auth_secret: String,
    /// Currency of the catalog and of every order
    pub currency: Currency,
    pub pricing_timeout: Duration,
    pub provider_timeout: Duration,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    pub stripe: StripeConfig,
    /// TOML file the settings were merged from, if one was found
    pub config_file: Option<&'static str>,
}

impl AppConfig {
    /// Load `.env`, the optional TOML file, and the environment
    pub fn load() -> ShopResult<Self> {
        dotenvy::dotenv().ok();
        let (config_file, file) = match FileConfig::discover()? {
            Some((path, file)) => (Some(path), file),
            None => (None, FileConfig::default()),
        };
        let file_vars = file.into_vars();
        let config = Self::from_sources(|key| {
            std::env::var(key).ok().or_else(|| file_vars.get(key).cloned())
        })?;
        Ok(Self {
            config_file,
            ..config
        })
    }

    /// Build from a variable lookup (environment names as keys)
    pub fn from_sources(var: impl Fn(&str) -> Option<String>) -> ShopResult<Self> {
        let store = match var("STORE") {
            Some(kind) => kind.parse()?,
            None => StoreKind::Postgres,
        };
        let database_url = var("DATABASE_URL").filter(|url| !url.is_empty());
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ShopError::Configuration(
                "DATABASE_URL not set (or use STORE=memory)".to_string(),
            ));
        }

        let auth_secret = var("AUTH_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ShopError::Configuration("AUTH_SECRET not set".to_string()))?;

        let provider_timeout = Duration::from_millis(parse_or(&var, "PROVIDER_TIMEOUT_MS", 10_000)?);
        let stripe = StripeConfig::from_vars(&var)?.with_timeout(provider_timeout);

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&var, "PORT", 8080)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            store,
            database_url,
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
            auth_secret,
            currency: match var("CURRENCY") {
                Some(code) => code
                    .parse()
                    .map_err(|e| ShopError::Configuration(format!("CURRENCY: {e}")))?,
                None => Currency::USD,
            },
            pricing_timeout: Duration::from_millis(parse_or(&var, "PRICING_TIMEOUT_MS", 2_000)?),
            provider_timeout,
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            stripe,
            config_file: None,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> ShopResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ShopError::Configuration(format!("invalid listen address: {e}")))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> ShopResult<T> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ShopError::Configuration(format!("{key} is invalid: {raw}"))),
        None => Ok(default),
    }
}

/// `config/storefront.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub checkout: CheckoutSection,
    #[serde(default)]
    pub payments: PaymentsSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub environment: Option<String>,
    pub log_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageSection {
    pub store: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutSection {
    pub currency: Option<String>,
    pub pricing_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentsSection {
    pub provider_timeout_ms: Option<u64>,
}

impl FileConfig {
    /// First config file found, with its path.
    ///
    /// Runs before logging is set up, so the caller reports the path.
    pub fn discover() -> ShopResult<Option<(&'static str, Self)>> {
        for path in CONFIG_PATHS {
            if let Ok(content) = std::fs::read_to_string(path) {
                let config = Self::parse(&content)
                    .map_err(|e| ShopError::Configuration(format!("Failed to parse {path}: {e}")))?;
                return Ok(Some((path, config)));
            }
        }
        Ok(None)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The file's settings under their environment variable names
    pub fn into_vars(self) -> HashMap<&'static str, String> {
        let mut vars = HashMap::new();
        let mut put = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                vars.insert(key, value);
            }
        };
        put("HOST", self.server.host);
        put("PORT", self.server.port.map(|p| p.to_string()));
        put("ENVIRONMENT", self.server.environment);
        put("LOG_FORMAT", self.server.log_format);
        put("STORE", self.storage.store);
        put(
            "DB_MAX_CONNECTIONS",
            self.storage.max_connections.map(|n| n.to_string()),
        );
        put("CURRENCY", self.checkout.currency);
        put(
            "PRICING_TIMEOUT_MS",
            self.checkout.pricing_timeout_ms.map(|ms| ms.to_string()),
        );
        put(
            "PROVIDER_TIMEOUT_MS",
            self.payments.provider_timeout_ms.map(|ms| ms.to_string()),
        );
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("STORE", "memory"),
        ("AUTH_SECRET", "test-secret"),
        ("STRIPE_SECRET_KEY", "sk_test_abc"),
    ];

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_sources(vars(&BASE)).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.currency, Currency::USD);
        assert_eq!(config.pricing_timeout, Duration::from_secs(2));
        assert_eq!(config.stripe.timeout, Duration::from_secs(10));
        assert!(!config.log_json);
        assert!(!config.is_production());
        assert_eq!(config.config_file, None);
    }

    #[test]
    fn test_discover_reports_file_path() {
        // Tests run from the crate directory; the repo ships config/storefront.toml
        let (path, file) = FileConfig::discover().unwrap().expect("config file");
        assert!(path.ends_with("config/storefront.toml"));
        assert!(file.into_vars().contains_key("PORT"));
    }

    #[test]
    fn test_socket_addr() {
        let mut pairs = BASE.to_vec();
        pairs.extend([("HOST", "0.0.0.0"), ("PORT", "3000")]);
        let config = AppConfig::from_sources(vars(&pairs)).unwrap();

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = AppConfig::from_sources(vars(&[
            ("AUTH_SECRET", "test-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ShopError::Configuration(_)));
    }

    #[test]
    fn test_missing_auth_secret_rejected() {
        let err = AppConfig::from_sources(vars(&[
            ("STORE", "memory"),
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ShopError::Configuration(_)));
    }

    #[test]
    fn test_file_values_apply_under_env() {
        let file = FileConfig::parse(
            r#"
            [server]
            port = 9000
            log_format = "json"

            [checkout]
            currency = "eur"
            pricing_timeout_ms = 500
            "#,
        )
        .unwrap();
        let file_vars = file.into_vars();
        let env = vars(&[
            ("STORE", "memory"),
            ("AUTH_SECRET", "test-secret"),
            ("STRIPE_SECRET_KEY", "sk_test_abc"),
            ("PORT", "7000"),
        ]);

        let config =
            AppConfig::from_sources(|key| env(key).or_else(|| file_vars.get(key).cloned()))
                .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.currency, Currency::EUR);
        assert_eq!(config.pricing_timeout, Duration::from_millis(500));
        assert!(config.log_json);
    }

    #[test]
    fn test_unknown_file_section_rejected() {
        assert!(FileConfig::parse("[billing]\nkey = 1").is_err());
    }
}
