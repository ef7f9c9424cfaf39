//! Application configuration for the harvester.
//!
//! User config lives at `~/.harvester/harvester.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvestError, Result};
use crate::types::ProductSource;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvester.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".harvester";

/// Hard ceiling on concurrent fetch workers.
pub const MAX_WORKERS: usize = 32;

// ---------------------------------------------------------------------------
// Config structs (matching harvester.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output and formatting defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-index retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Named product presets.
    #[serde(default = "default_locations")]
    pub locations: Vec<LocationPreset>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            pool: PoolConfig::default(),
            locations: default_locations(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Block tag prefix; blocks look like `<version_3>`.
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Whether to enclose the whole artifact in an outer container.
    #[serde(default)]
    pub wrap: bool,

    /// Tag of the outer container.
    #[serde(default = "default_wrap_tag")]
    pub wrap_tag: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tag: default_tag(),
            wrap: false,
            wrap_tag: default_wrap_tag(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_tag() -> String {
    "version".into()
}
fn default_wrap_tag() -> String {
    "clip".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Product endpoint the version URLs are built from.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://forecast.weather.gov/product.php".into()
}
fn default_timeout_secs() -> u64 {
    10
}

/// Which backoff strategy separates attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per index, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait between a failed attempt and the next one.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    #[serde(default)]
    pub strategy: BackoffKind,

    /// Upper bound on a single wait (exponential only).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
            strategy: BackoffKind::Fixed,
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay_secs() -> u64 {
    2
}
fn default_max_delay_secs() -> u64 {
    30
}

/// `[pool]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fixed worker count. Derived from host parallelism when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Overall run deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

/// `[[locations]]` entry, a named product preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPreset {
    /// Human-readable name used on the command line.
    pub name: String,
    pub site: String,
    pub issued_by: String,
    #[serde(default = "default_product")]
    pub product: String,
    /// File the artifact is written to, relative to `output_dir`.
    pub file_name: String,
}

fn default_product() -> String {
    "CLI".into()
}

fn preset(name: &str, site: &str, issued_by: &str, file_name: &str) -> LocationPreset {
    LocationPreset {
        name: name.into(),
        site: site.into(),
        issued_by: issued_by.into(),
        product: default_product(),
        file_name: file_name.into(),
    }
}

fn default_locations() -> Vec<LocationPreset> {
    vec![
        preset("New York", "OKX", "NYC", "weather_reports_OKX_NewYork.txt"),
        preset("Austin", "EWX", "AUS", "weather_reports_EWX_Austin.txt"),
        preset("Chicago", "LOT", "MDW", "weather_reports_LOT_Chicago.txt"),
        preset("Miami", "MFL", "MIA", "weather_reports_MFL_Miami.txt"),
    ]
}

impl AppConfig {
    /// Find a preset by name, ignoring ASCII case.
    pub fn location(&self, name: &str) -> Option<&LocationPreset> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
    }

    /// Parsed product endpoint.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.http.base_url).map_err(|e| {
            HarvestError::config(format!("invalid base_url '{}': {e}", self.http.base_url))
        })
    }

    /// Build the product source for a preset.
    pub fn source_for(&self, preset: &LocationPreset) -> Result<ProductSource> {
        Ok(ProductSource::new(
            self.base_url()?,
            &preset.site,
            &preset.issued_by,
            &preset.product,
        ))
    }
}

// ---------------------------------------------------------------------------
// Harvest config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per index.
    pub max_attempts: u32,
    /// Base wait between attempts.
    pub retry_delay: Duration,
    pub backoff: BackoffKind,
    /// Cap for exponential waits.
    pub max_retry_delay: Duration,
    /// Explicit worker count; `None` means derive from parallelism.
    pub workers: Option<usize>,
    /// Overall run deadline.
    pub deadline: Option<Duration>,
    /// Block tag prefix.
    pub tag: String,
    /// Outer container tag, when wrapping is enabled.
    pub wrap: Option<String>,
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            max_attempts: config.retry.max_attempts,
            retry_delay: Duration::from_secs(config.retry.delay_secs),
            backoff: config.retry.strategy,
            max_retry_delay: Duration::from_secs(config.retry.max_delay_secs),
            workers: config.pool.workers,
            deadline: config.pool.deadline_secs.map(Duration::from_secs),
            tag: config.defaults.tag.clone(),
            wrap: config
                .defaults
                .wrap
                .then(|| config.defaults.wrap_tag.clone()),
        }
    }
}

impl HarvestConfig {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HarvestError::validation("retry.max_attempts must be at least 1"));
        }
        if let Some(workers) = self.workers {
            if workers == 0 || workers > MAX_WORKERS {
                return Err(HarvestError::validation(format!(
                    "pool.workers must be between 1 and {MAX_WORKERS}, got {workers}"
                )));
            }
        }
        if self.tag.is_empty() {
            return Err(HarvestError::validation("defaults.tag must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.harvester/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.harvester/harvester.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
