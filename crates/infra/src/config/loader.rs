//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file into the process environment when one exists
//! 2. Attempts to load from environment variables
//! 3. If a required variable is missing, falls back to loading from file
//! 4. Probes multiple paths for config files (JSON and TOML)
//!
//! ## Environment Variables
//! Required:
//! - `SP_API_CLIENT_ID`, `SP_API_CLIENT_SECRET`, `SP_API_REFRESH_TOKEN`
//! - `SP_API_AWS_ACCESS_KEY`, `SP_API_AWS_SECRET_KEY`
//! - `SP_API_REGION` (`na`, `eu`, `fe` or the AWS region name)
//! - `SP_API_EXTERNAL_ID`
//!
//! Optional:
//! - `SP_API_ROLE_ARN`: role assumed through STS
//! - `SP_API_ENDPOINT`: base URL override
//! - `SP_API_MARKETPLACE_ID`, `SP_API_LWA_ENDPOINT`, `SP_API_STS_ENDPOINT`
//! - `SELLERSCAN_DB_PATH`: SQLite file for results
//! - `SELLERSCAN_REQUEST_TIMEOUT_SECS`, `SELLERSCAN_MAX_RETRIES`
//!
//! ## File Locations
//! `sellerscan.toml` or `sellerscan.json` in the current working directory,
//! its parent and grandparent, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sellerscan_domain::constants::{
    DEFAULT_LWA_ENDPOINT, DEFAULT_MARKETPLACE_ID, DEFAULT_STS_ENDPOINT,
};
use sellerscan_domain::{AppConfig, ClientConfig, Result, SellerScanError, SpApiConfig, StorageConfig};

const CONFIG_FILE_NAMES: [&str; 2] = ["sellerscan.toml", "sellerscan.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `SellerScanError::Config` if configuration cannot be loaded from
/// either source or fails validation.
pub fn load() -> Result<AppConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None).map_err(|file_err| {
                SellerScanError::Config(format!("{e}; no usable config file either: {file_err}"))
            })?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `SellerScanError::Config` naming the first missing variable, or
/// describing an unparseable value.
pub fn load_from_env() -> Result<AppConfig> {
    let sp_api = SpApiConfig {
        client_id: env_var("SP_API_CLIENT_ID")?,
        client_secret: env_var("SP_API_CLIENT_SECRET")?,
        refresh_token: env_var("SP_API_REFRESH_TOKEN")?,
        aws_access_key: env_var("SP_API_AWS_ACCESS_KEY")?,
        aws_secret_key: env_var("SP_API_AWS_SECRET_KEY")?,
        region: env_var("SP_API_REGION")?,
        external_id: env_var("SP_API_EXTERNAL_ID")?,
        role_arn: env_opt("SP_API_ROLE_ARN"),
        endpoint: env_opt("SP_API_ENDPOINT"),
        marketplace_id: env_opt("SP_API_MARKETPLACE_ID")
            .unwrap_or_else(|| DEFAULT_MARKETPLACE_ID.to_string()),
        lwa_endpoint: env_opt("SP_API_LWA_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_LWA_ENDPOINT.to_string()),
        sts_endpoint: env_opt("SP_API_STS_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_STS_ENDPOINT.to_string()),
    };

    let mut client = ClientConfig::default();
    if let Some(timeout) = env_parse::<u64>("SELLERSCAN_REQUEST_TIMEOUT_SECS")? {
        client.timeout_secs = timeout;
    }
    if let Some(retries) = env_parse::<u32>("SELLERSCAN_MAX_RETRIES")? {
        client.max_retries = retries;
    }

    Ok(AppConfig {
        sp_api,
        client,
        rate_families: Vec::new(),
        storage: StorageConfig { db_path: env_opt("SELLERSCAN_DB_PATH").map(PathBuf::from) },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `SellerScanError::Config` if the file is missing or malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SellerScanError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SellerScanError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SellerScanError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SellerScanError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SellerScanError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SellerScanError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
///
/// Blank values count as missing.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        SellerScanError::Config(format!("Missing required environment variable: {}", key))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| SellerScanError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}
