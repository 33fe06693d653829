//! Environment-driven configuration
//!
//! Values are read after `dotenv` has populated the process environment.

use crate::error::FinanceError;
use crate::Result;
use std::env;
use std::time::Duration;

const DEFAULT_SCHEMA: &str = "finance_manager";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USER_ID: &str = "default_user";
const DEFAULT_PORT: u16 = 8080;

/// Where the four collections live and how long a single call may take.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Postgres URL; `None` selects the in-memory backend.
    pub database_url: Option<String>,
    /// Postgres schema holding `goals`, `expenses`, `account_balance`, `investments`
    pub schema: String,
    pub max_connections: u32,
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: DEFAULT_SCHEMA.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self> {
        let database_url = env::var("FINANCE_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .filter(|url| !url.trim().is_empty());

        let schema = env::var("FINANCE_DATABASE_SCHEMA")
            .unwrap_or_else(|_| DEFAULT_SCHEMA.to_string());
        validate_schema_name(&schema)?;

        let max_connections = parse_var("FINANCE_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let timeout_secs = parse_var("FINANCE_STORE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            database_url,
            schema,
            max_connections,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Settings shared by the console and the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Used when a caller does not name a user
    pub default_user_id: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let default_user_id = env::var("USER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| FinanceError::Config(format!("PORT '{}' is not a valid port", raw)))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            store: StoreConfig::from_env()?,
            default_user_id,
            port,
        })
    }
}

/// Schema names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_schema_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };

    if valid && name.len() <= 63 {
        Ok(())
    } else {
        Err(FinanceError::Config(format!(
            "schema name '{}' must be a lowercase identifier",
            name
        )))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FinanceError::Config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
