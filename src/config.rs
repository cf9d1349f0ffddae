use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::lineage::policy::{BlendCompatibility, LineagePolicy};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PACKAGING_TOLERANCE_LITERS: f64 = 1.0;
const DEFAULT_CONDITIONING_DURATION_DAYS: u32 = 7;
const DEFAULT_LIST_LIMIT: u64 = 100;
const MAX_LIST_LIMIT: u64 = 500;

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Lineage rules and list limits
    #[serde(default)]
    pub lineage: LineageConfig,
}

/// Lineage rules. Every tenant gets the top-level values unless
/// `tenant_overrides` carries an entry for it.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageConfig {
    #[serde(default = "default_packaging_tolerance_liters")]
    pub packaging_tolerance_liters: f64,

    #[serde(default = "default_conditioning_duration_days")]
    pub conditioning_duration_days: u32,

    #[serde(default = "default_list_limit")]
    pub default_list_limit: u64,

    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: u64,

    #[serde(default)]
    pub blend_compatibility: BlendCompatibility,

    #[serde(default)]
    pub tenant_overrides: HashMap<String, TenantPolicyOverride>,
}

/// Partial policy applied on top of the defaults for one tenant.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantPolicyOverride {
    pub packaging_tolerance_liters: Option<f64>,
    pub conditioning_duration_days: Option<u32>,
    pub blend_compatibility: Option<BlendCompatibility>,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            packaging_tolerance_liters: DEFAULT_PACKAGING_TOLERANCE_LITERS,
            conditioning_duration_days: DEFAULT_CONDITIONING_DURATION_DAYS,
            default_list_limit: DEFAULT_LIST_LIMIT,
            max_list_limit: MAX_LIST_LIMIT,
            blend_compatibility: BlendCompatibility::default(),
            tenant_overrides: HashMap::new(),
        }
    }
}

impl LineageConfig {
    /// Effective policy for `tenant_id`.
    pub fn policy_for(&self, tenant_id: &str) -> LineagePolicy {
        let base = LineagePolicy {
            packaging_tolerance_liters: self.packaging_tolerance_liters,
            conditioning_duration_days: self.conditioning_duration_days,
            blend_compatibility: self.blend_compatibility,
        };

        match self.tenant_overrides.get(tenant_id) {
            Some(o) => LineagePolicy {
                packaging_tolerance_liters: o
                    .packaging_tolerance_liters
                    .unwrap_or(base.packaging_tolerance_liters),
                conditioning_duration_days: o
                    .conditioning_duration_days
                    .unwrap_or(base.conditioning_duration_days),
                blend_compatibility: o.blend_compatibility.unwrap_or(base.blend_compatibility),
            },
            None => base,
        }
    }

    /// Clamps a requested list size into `1..=max_list_limit`.
    pub fn list_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit.max(1))
    }

    fn validate_policy(&self, errors: &mut ValidationErrors) {
        let tolerances = std::iter::once(self.packaging_tolerance_liters).chain(
            self.tenant_overrides
                .values()
                .filter_map(|o| o.packaging_tolerance_liters),
        );
        if tolerances.into_iter().any(|t| !t.is_finite() || t < 0.0) {
            let mut err = ValidationError::new("packaging_tolerance_liters");
            err.message = Some("packaging tolerance must be a finite, non-negative volume".into());
            errors.add("lineage", err);
        }

        let durations = std::iter::once(self.conditioning_duration_days).chain(
            self.tenant_overrides
                .values()
                .filter_map(|o| o.conditioning_duration_days),
        );
        if durations.into_iter().any(|d| d == 0) {
            let mut err = ValidationError::new("conditioning_duration_days");
            err.message = Some("conditioning duration must be at least one day".into());
            errors.add("lineage", err);
        }

        if self.default_list_limit == 0 || self.default_list_limit > self.max_list_limit {
            let mut err = ValidationError::new("default_list_limit");
            err.message = Some("default_list_limit must be between 1 and max_list_limit".into());
            errors.add("lineage", err);
        }
    }
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            lineage: LineageConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        self.lineage.validate_policy(&mut errors);

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_packaging_tolerance_liters() -> f64 {
    DEFAULT_PACKAGING_TOLERANCE_LITERS
}

fn default_conditioning_duration_days() -> u32 {
    DEFAULT_CONDITIONING_DURATION_DAYS
}

fn default_list_limit() -> u64 {
    DEFAULT_LIST_LIMIT
}

fn default_max_list_limit() -> u64 {
    MAX_LIST_LIMIT
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("lot_lineage_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`], reading TOML files from `dir`.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://lot_lineage.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
