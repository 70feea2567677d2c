//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rime";
const DEFAULT_MIDDLEWARE_GROUP: &str = "web";
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_GRACE_SECONDS: u64 = 600;
const DEFAULT_CACHEABLE_STATUS_CODES: [u16; 1] = [200];

/// Command-line arguments for the rime binary.
#[derive(Debug, Parser)]
#[command(name = "rime", version, about = "Rime response cache engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RIME_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show middleware, storage, and configuration status.
    Status(StatusArgs),
    /// Enqueue and execute one invalidation pattern.
    Clear(ClearArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct StatusArgs {
    /// Emit the report as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ClearArgs {
    /// Flag pattern: exact (`route:products:index`), prefix (`route*`),
    /// or everything (`*`).
    #[arg(value_name = "PATTERN")]
    pub pattern: String,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub middleware: MiddlewareSettings,
    pub cache: CacheSettings,
    /// Maps command names to the invalidation pattern executed when the
    /// command finishes successfully.
    pub clear: HashMap<String, String>,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct MiddlewareSettings {
    pub enabled: bool,
    pub groups: Vec<String>,
    /// Largest response body the middleware will buffer for storage.
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: u64,
    pub grace: u64,
    pub compression: bool,
    pub cacheable_status_codes: Vec<u16>,
    /// Cookies allowed to influence the request fingerprint.
    pub vary_cookies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            middleware: MiddlewareSettings::default(),
            cache: CacheSettings::default(),
            clear: HashMap::new(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for MiddlewareSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            groups: vec![DEFAULT_MIDDLEWARE_GROUP.to_string()],
            max_body_bytes: NonZeroU64::new(DEFAULT_MAX_BODY_BYTES).unwrap_or(NonZeroU64::MIN),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL_SECONDS,
            grace: DEFAULT_GRACE_SECONDS,
            compression: true,
            cacheable_status_codes: DEFAULT_CACHEABLE_STATUS_CODES.to_vec(),
            vary_cookies: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RIME").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    middleware: RawMiddlewareSettings,
    cache: RawCacheSettings,
    clear: HashMap<String, String>,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMiddlewareSettings {
    enabled: Option<bool>,
    groups: Option<Vec<String>>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl: Option<u64>,
    grace: Option<u64>,
    compression: Option<bool>,
    cacheable_status_codes: Option<Vec<u16>>,
    vary_cookies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            middleware: build_middleware_settings(raw.middleware)?,
            cache: build_cache_settings(raw.cache)?,
            clear: raw.clear,
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_middleware_settings(
    middleware: RawMiddlewareSettings,
) -> Result<MiddlewareSettings, LoadError> {
    let enabled = middleware.enabled.unwrap_or(true);
    let groups = middleware
        .groups
        .unwrap_or_else(|| vec![DEFAULT_MIDDLEWARE_GROUP.to_string()]);

    let max_body_bytes_value = middleware.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_bytes_value).ok_or_else(|| {
        LoadError::invalid("middleware.max_body_bytes", "must be greater than zero")
    })?;

    Ok(MiddlewareSettings {
        enabled,
        groups,
        max_body_bytes,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl = cache.ttl.unwrap_or(DEFAULT_TTL_SECONDS);
    if ttl == 0 {
        return Err(LoadError::invalid("cache.ttl", "must be greater than zero"));
    }

    let grace = cache.grace.unwrap_or(DEFAULT_GRACE_SECONDS);

    let cacheable_status_codes = cache
        .cacheable_status_codes
        .unwrap_or_else(|| DEFAULT_CACHEABLE_STATUS_CODES.to_vec());
    if cacheable_status_codes.is_empty() {
        return Err(LoadError::invalid(
            "cache.cacheable_status_codes",
            "must not be empty",
        ));
    }
    for code in &cacheable_status_codes {
        if !(100..=599).contains(code) {
            return Err(LoadError::invalid(
                "cache.cacheable_status_codes",
                format!("{code} is not a valid HTTP status code"),
            ));
        }
    }

    Ok(CacheSettings {
        ttl,
        grace,
        compression: cache.compression.unwrap_or(true),
        cacheable_status_codes,
        vary_cookies: cache.vary_cookies.unwrap_or_default(),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}
