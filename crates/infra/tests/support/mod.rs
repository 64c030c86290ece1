//! Shared fixtures for SP-API integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sellerscan_common::{FamilyRateLimiter, MockClock, RateLimitConfig, RetryConfig};
use sellerscan_infra::http::ReqwestTransport;
use sellerscan_infra::sp_api::{
    BearerToken, BearerTokenExchange, CredentialError, CredentialManager, SigningCredential,
    SigningCredentialExchange, SpApiClient,
};
use url::Url;

pub const ACCESS_TOKEN: &str = "Atza|integration-token";
pub const ACCESS_KEY_ID: &str = "ASIAINTEGRATION";

/// LWA stand-in handing out a token valid until 2030.
pub struct FixedBearer;

#[async_trait]
impl BearerTokenExchange for FixedBearer {
    async fn fetch_token(&self) -> Result<BearerToken, CredentialError> {
        Ok(BearerToken {
            access_token: ACCESS_TOKEN.to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        })
    }
}

/// STS stand-in handing out a session credential valid until 2030.
pub struct FixedSigning;

#[async_trait]
impl SigningCredentialExchange for FixedSigning {
    async fn fetch_credential(&self) -> Result<SigningCredential, CredentialError> {
        Ok(SigningCredential {
            access_key_id: ACCESS_KEY_ID.to_string(),
            secret_access_key: "integration-secret".to_string(),
            session_token: Some("integration-session".to_string()),
            expires_at: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        })
    }
}

/// Retry policy matching the production defaults without jitter.
pub fn no_jitter_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_retries(max_retries)
        .exponential_backoff(Duration::from_secs(1), 2.0, Duration::from_secs(10))
        .no_jitter()
        .build()
        .expect("retry config is valid")
}

/// Client against `server_uri` whose waits all go through `clock`.
pub fn client_for(server_uri: &str, clock: &MockClock, rate: RateLimitConfig) -> SpApiClient {
    let shared = clock.shared();
    let transport = Arc::new(
        ReqwestTransport::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("transport builds"),
    );
    let credentials =
        Arc::new(CredentialManager::new(Arc::new(FixedBearer), Arc::new(FixedSigning), shared.clone()));
    let limiter =
        Arc::new(FamilyRateLimiter::new(rate, shared.clone()).expect("limiter config is valid"));

    SpApiClient::new(
        Url::parse(server_uri).expect("mock server uri"),
        "us-east-1",
        transport,
        credentials,
        limiter,
        shared,
    )
    .with_marketplace_id("ATVPDKIKX0DER")
    .with_retry(no_jitter_retry(3))
}

/// Limiter generous enough that it never waits.
pub fn unthrottled() -> RateLimitConfig {
    RateLimitConfig::new(1000.0, 1000).expect("valid rate")
}
