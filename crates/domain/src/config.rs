//! Configuration structures
//!
//! Loaded by `sellerscan_infra::config::loader` from the environment or a
//! `sellerscan.toml` / `sellerscan.json` file.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_LWA_ENDPOINT, DEFAULT_MARKETPLACE_ID, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_JITTER_MS, DEFAULT_MAX_RETRIES, DEFAULT_RATE_FAMILIES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STS_ENDPOINT,
};
use crate::{Result, SellerScanError};

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub sp_api: SpApiConfig,
    #[serde(default)]
    pub client: ClientConfig,
    /// Overrides of the built-in family limits
    #[serde(default)]
    pub rate_families: Vec<RateFamilyConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Built-in family limits with the configured overrides applied
    pub fn effective_rate_families(&self) -> Vec<RateFamilyConfig> {
        let mut families: Vec<RateFamilyConfig> = DEFAULT_RATE_FAMILIES
            .iter()
            .map(|(name, rate, burst)| RateFamilyConfig {
                name: (*name).to_string(),
                sustained_rate: *rate,
                burst_capacity: *burst,
            })
            .collect();

        for family in &self.rate_families {
            match families.iter_mut().find(|f| f.name == family.name) {
                Some(existing) => *existing = family.clone(),
                None => families.push(family.clone()),
            }
        }
        families
    }

    pub fn validate(&self) -> Result<()> {
        self.sp_api.validate()?;
        for family in &self.rate_families {
            family.validate()?;
        }
        Ok(())
    }
}

/// SP-API marketplace region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpApiRegion {
    NorthAmerica,
    Europe,
    FarEast,
}

impl SpApiRegion {
    /// Accepts the short codes (`na`, `eu`, `fe`) or the AWS signing regions
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "na" | "us-east-1" => Ok(Self::NorthAmerica),
            "eu" | "eu-west-1" => Ok(Self::Europe),
            "fe" | "us-west-2" => Ok(Self::FarEast),
            other => Err(SellerScanError::Config(format!(
                "Unknown SP-API region '{other}' (expected na, eu or fe)"
            ))),
        }
    }

    pub fn host(self) -> &'static str {
        match self {
            Self::NorthAmerica => "sellingpartnerapi-na.amazon.com",
            Self::Europe => "sellingpartnerapi-eu.amazon.com",
            Self::FarEast => "sellingpartnerapi-fe.amazon.com",
        }
    }

    pub fn aws_region(self) -> &'static str {
        match self {
            Self::NorthAmerica => "us-east-1",
            Self::Europe => "eu-west-1",
            Self::FarEast => "us-west-2",
        }
    }
}

/// Credentials and endpoints of the SP-API application
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpApiConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub region: String,
    pub external_id: String,
    /// Role assumed through STS; long-lived keys sign directly when absent
    #[serde(default)]
    pub role_arn: Option<String>,
    /// Base URL override (mock servers, sandbox)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_marketplace_id")]
    pub marketplace_id: String,
    #[serde(default = "default_lwa_endpoint")]
    pub lwa_endpoint: String,
    #[serde(default = "default_sts_endpoint")]
    pub sts_endpoint: String,
}

fn default_marketplace_id() -> String {
    DEFAULT_MARKETPLACE_ID.to_string()
}

fn default_lwa_endpoint() -> String {
    DEFAULT_LWA_ENDPOINT.to_string()
}

fn default_sts_endpoint() -> String {
    DEFAULT_STS_ENDPOINT.to_string()
}

impl fmt::Debug for SpApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpApiConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("aws_access_key", &self.aws_access_key)
            .field("aws_secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .field("external_id", &"[REDACTED]")
            .field("role_arn", &self.role_arn)
            .field("endpoint", &self.endpoint)
            .field("marketplace_id", &self.marketplace_id)
            .field("lwa_endpoint", &self.lwa_endpoint)
            .field("sts_endpoint", &self.sts_endpoint)
            .finish()
    }
}

impl SpApiConfig {
    /// Check that every required value is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("SP_API_CLIENT_ID", &self.client_id),
            ("SP_API_CLIENT_SECRET", &self.client_secret),
            ("SP_API_REFRESH_TOKEN", &self.refresh_token),
            ("SP_API_AWS_ACCESS_KEY", &self.aws_access_key),
            ("SP_API_AWS_SECRET_KEY", &self.aws_secret_key),
            ("SP_API_REGION", &self.region),
            ("SP_API_EXTERNAL_ID", &self.external_id),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(SellerScanError::Config(format!("{name} is required")));
        }
        SpApiRegion::parse(&self.region)?;
        Ok(())
    }

    pub fn region(&self) -> Result<SpApiRegion> {
        SpApiRegion::parse(&self.region)
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> Result<String> {
        match &self.endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                Ok(endpoint.trim_end_matches('/').to_string())
            }
            _ => Ok(format!("https://{}", self.region()?.host())),
        }
    }

    /// AWS region used in the SigV4 credential scope
    pub fn signing_region(&self) -> Result<&'static str> {
        Ok(self.region()?.aws_region())
    }
}

/// Resilient client tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_jitter_ms: u64,
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

/// Throughput limit of one endpoint family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateFamilyConfig {
    pub name: String,
    pub sustained_rate: f64,
    pub burst_capacity: u32,
}

impl RateFamilyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SellerScanError::Config("rate family name must not be empty".into()));
        }
        if !self.sustained_rate.is_finite() || self.sustained_rate <= 0.0 {
            return Err(SellerScanError::Config(format!(
                "rate family '{}' needs a positive sustained_rate",
                self.name
            )));
        }
        if self.burst_capacity == 0 {
            return Err(SellerScanError::Config(format!(
                "rate family '{}' needs a burst_capacity of at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Result store location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file; results stay in memory when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_sp_api() -> SpApiConfig {
        SpApiConfig {
            client_id: "amzn1.application-oa2-client.test".into(),
            client_secret: "client-secret".into(),
            refresh_token: "Atzr|refresh".into(),
            aws_access_key: "AKIDEXAMPLE".into(),
            aws_secret_key: "secret".into(),
            region: "na".into(),
            external_id: "external".into(),
            role_arn: None,
            endpoint: None,
            marketplace_id: default_marketplace_id(),
            lwa_endpoint: default_lwa_endpoint(),
            sts_endpoint: default_sts_endpoint(),
        }
    }

    #[test]
    fn test_missing_value_names_variable() {
        let mut config = sample_sp_api();
        config.refresh_token = String::new();

        let err = config.validate().unwrap_err();
        assert_eq!(err, SellerScanError::Config("SP_API_REFRESH_TOKEN is required".into()));
    }

    #[test]
    fn test_region_resolution() {
        let mut config = sample_sp_api();
        assert_eq!(config.base_url().unwrap(), "https://sellingpartnerapi-na.amazon.com");
        assert_eq!(config.signing_region().unwrap(), "us-east-1");

        config.region = "EU".into();
        assert_eq!(config.signing_region().unwrap(), "eu-west-1");

        config.region = "mars".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = sample_sp_api();
        config.endpoint = Some("http://127.0.0.1:9000/".into());
        assert_eq!(config.base_url().unwrap(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", sample_sp_api());
        assert!(!rendered.contains("client-secret"));
        assert!(!rendered.contains("Atzr|refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_family_overrides_replace_defaults() {
        let config = AppConfig {
            sp_api: sample_sp_api(),
            client: ClientConfig::default(),
            rate_families: vec![
                RateFamilyConfig { name: "catalog".into(), sustained_rate: 5.0, burst_capacity: 10 },
                RateFamilyConfig { name: "listings".into(), sustained_rate: 5.0, burst_capacity: 5 },
            ],
            storage: StorageConfig::default(),
        };

        let families = config.effective_rate_families();
        let catalog = families.iter().find(|f| f.name == "catalog").unwrap();
        assert_eq!(catalog.burst_capacity, 10);
        assert!(families.iter().any(|f| f.name == "listings"));
        assert!(families.iter().any(|f| f.name == "reports"));
    }
}
