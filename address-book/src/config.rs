use std::time::Duration;

use config::{ConfigError, Environment, File, FileFormat};

pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "ADDRESS_BOOK";

/// Runtime settings, read from an optional TOML file and overridden by
/// `ADDRESS_BOOK__<SECTION>__<KEY>` environment variables.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub bulk: BulkSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        ::config::Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        ::config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/address_book_service".into(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    /// Upper bound on inserts running at once during a concurrent bulk add.
    pub max_concurrency: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}
