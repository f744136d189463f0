//! Application configuration loaded from environment variables.

use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// When true, donation/expense creation is open to any authenticated
    /// principal; editing, payments, and exports stay ADMIN-only either way.
    pub open_entry: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./festival_ledger.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .map_err(|_| LedgerError::Config("Invalid API_PORT".to_string()))?,
            open_entry: env_var("OPEN_ENTRY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| LedgerError::Config("Invalid OPEN_ENTRY".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| LedgerError::Config(format!("Missing env var: {key}")))
}
