use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::duration::{deserialize_duration, serialize_duration};
use crate::market_data::providers::coingecko::{COINGECKO_API_BASE, DEFAULT_TIMEOUT};
use crate::market_data::{default_feed_ids, CurrencyRegistry, DEFAULT_CACHE_DURATION};
use crate::models::CurrencyCode;

/// Overrides `price_feed.base_url`.
pub const ENV_API_URL: &str = "COINGECKO_API_URL";
/// Overrides `price_feed.cache_duration`, in whole seconds.
pub const ENV_CACHE_DURATION_SECONDS: &str = "CACHE_DURATION_SECONDS";

/// Default reference currency.
fn default_reference_currency() -> CurrencyCode {
    CurrencyCode::new("IDR")
}

fn default_base_url() -> String {
    COINGECKO_API_BASE.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_cache_duration() -> Duration {
    DEFAULT_CACHE_DURATION
}

/// External price feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceFeedConfig {
    /// Root of the CoinGecko-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on a single upstream request.
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,

    /// How long a fetched price table is served from cache.
    #[serde(
        default = "default_cache_duration",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub cache_duration: Duration,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            cache_duration: default_cache_duration(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Currency every price and portfolio value is expressed in.
    #[serde(default = "default_reference_currency")]
    pub reference_currency: CurrencyCode,

    #[serde(default)]
    pub price_feed: PriceFeedConfig,

    /// Supported symbols mapped to their price feed ids.
    #[serde(default = "default_feed_ids")]
    pub currencies: BTreeMap<CurrencyCode, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            reference_currency: default_reference_currency(),
            price_feed: PriceFeedConfig::default(),
            currencies: default_feed_ids(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

impl PriceFeedConfig {
    /// Apply `COINGECKO_API_URL` / `CACHE_DURATION_SECONDS` style overrides
    /// from an arbitrary lookup. Blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_blank(ENV_API_URL) {
            debug!(key = ENV_API_URL, url = %url, "overriding price feed base url");
            self.base_url = url.trim().to_string();
        }
        if let Some(secs) = non_blank(ENV_CACHE_DURATION_SECONDS) {
            let secs: u64 = secs.trim().parse().with_context(|| {
                format!("{ENV_CACHE_DURATION_SECONDS} must be a whole number of seconds, got {secs:?}")
            })?;
            debug!(key = ENV_CACHE_DURATION_SECONDS, secs, "overriding price cache duration");
            self.cache_duration = Duration::from_secs(secs);
        }
        Ok(())
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,

    pub reference_currency: CurrencyCode,

    pub price_feed: PriceFeedConfig,

    pub currencies: BTreeMap<CurrencyCode, String>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./walletbook.toml` if it exists in current directory
/// 2. `~/.local/share/walletbook/walletbook.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("walletbook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("walletbook").join("walletbook.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// If the config file doesn't exist, uses the config file's intended
    /// parent directory as the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }

    fn from_config(config: Config, config_dir: &Path) -> Self {
        Self {
            data_dir: config.resolve_data_dir(config_dir),
            reference_currency: config.reference_currency,
            price_feed: config.price_feed,
            currencies: config.currencies,
        }
    }

    /// Apply `COINGECKO_API_URL` / `CACHE_DURATION_SECONDS` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.price_feed
            .apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn registry(&self) -> CurrencyRegistry {
        CurrencyRegistry::new(self.reference_currency.clone(), self.currencies.clone())
    }
}
