//! Configuration loading
//!
//! Loads [`sellerscan_domain::AppConfig`] from environment variables (after
//! `.env`) or a `sellerscan.toml` / `sellerscan.json` file.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
