//! Credential management for SP-API calls
//!
//! Two short-lived credentials are needed for every request: an LWA bearer
//! token (sent as `x-amz-access-token`) and AWS signing keys obtained through
//! STS AssumeRole. [`CredentialManager`] caches both in memory and refreshes
//! each one before it gets within the safety buffer of its expiry. Concurrent
//! callers share a single in-flight refresh per credential kind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use sellerscan_common::{RetryConfig, SharedClock};
use sellerscan_domain::constants::{
    CREDENTIAL_EXCHANGE_MAX_RETRIES, CREDENTIAL_SAFETY_BUFFER_SECS, STS_ROLE_SESSION_NAME,
    STS_SESSION_DURATION_SECS, STS_SIGNING_REGION,
};
use sellerscan_domain::{SellerScanError, SpApiConfig};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::form_urlencoded;
use url::Url;

use super::errors::CredentialError;
use super::signer::{sign_http_request, SigningScope};
use crate::http::{HttpRequest, HttpTransport};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// LWA access token
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// True while the token has more than `buffer` left before it expires.
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        self.expires_at - buffer > now
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// AWS keys used for SigV4 signing.
///
/// `expires_at` is `None` for long-lived keys.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SigningCredential {
    /// Long-lived keys without a session token.
    pub fn long_lived(access_key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret.into(),
            session_token: None,
            expires_at: None,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at - buffer > now)
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges the long-lived refresh token for a bearer token
#[async_trait]
pub trait BearerTokenExchange: Send + Sync {
    async fn fetch_token(&self) -> Result<BearerToken, CredentialError>;
}

/// Produces signing credentials
#[async_trait]
pub trait SigningCredentialExchange: Send + Sync {
    async fn fetch_credential(&self) -> Result<SigningCredential, CredentialError>;
}

/* -------------------------------------------------------------------------- */
/* Login with Amazon */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
struct LwaTokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

/// Refresh-token grant against the LWA token endpoint
pub struct LwaTokenClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: Url,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    clock: SharedClock,
}

impl LwaTokenClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: Url,
        config: &SpApiConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            endpoint,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            clock,
        }
    }
}

#[async_trait]
impl BearerTokenExchange for LwaTokenClient {
    async fn fetch_token(&self) -> Result<BearerToken, CredentialError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &self.refresh_token)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .finish();

        let request = HttpRequest::new(Method::POST, self.endpoint.clone())
            .header("content-type", FORM_CONTENT_TYPE)
            .header("accept", "application/json")
            .body(body);

        let issued_at = self.clock.utc_now();
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(CredentialError::from_status("LWA", response.status, &response.body));
        }

        let parsed: LwaTokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| CredentialError::Decode(format!("LWA token response: {e}")))?;
        debug!(
            expires_in = parsed.expires_in,
            token_type = parsed.token_type.as_deref().unwrap_or("unknown"),
            "LWA token issued"
        );

        Ok(BearerToken {
            access_token: parsed.access_token,
            expires_at: issued_at + chrono::Duration::seconds(parsed.expires_in),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* STS AssumeRole */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_response: AssumeRoleResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: StsCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: StsExpiration,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentials").field("access_key_id", &self.access_key_id).finish()
    }
}

/// STS reports expiry either as epoch seconds or as an RFC 3339 string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StsExpiration {
    EpochSeconds(f64),
    Rfc3339(String),
}

impl StsExpiration {
    fn to_datetime(&self) -> Result<DateTime<Utc>, CredentialError> {
        match self {
            Self::EpochSeconds(secs) => DateTime::from_timestamp(secs.trunc() as i64, 0)
                .ok_or_else(|| CredentialError::Decode(format!("expiration out of range: {secs}"))),
            Self::Rfc3339(value) => DateTime::parse_from_rfc3339(value)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|e| CredentialError::Decode(format!("expiration {value:?}: {e}"))),
        }
    }
}

fn parse_assume_role(body: &str) -> Result<SigningCredential, CredentialError> {
    let envelope: AssumeRoleEnvelope = serde_json::from_str(body)
        .map_err(|e| CredentialError::Decode(format!("AssumeRole response: {e}")))?;
    let credentials = envelope.assume_role_response.assume_role_result.credentials;
    let expires_at = credentials.expiration.to_datetime()?;

    Ok(SigningCredential {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.secret_access_key,
        session_token: Some(credentials.session_token),
        expires_at: Some(expires_at),
    })
}

/// AssumeRole with an external id, signed with the long-lived AWS keys
pub struct StsAssumeRoleClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: Url,
    base: SigningCredential,
    role_arn: String,
    external_id: String,
    clock: SharedClock,
}

impl StsAssumeRoleClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: Url,
        base: SigningCredential,
        role_arn: impl Into<String>,
        external_id: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            endpoint,
            base,
            role_arn: role_arn.into(),
            external_id: external_id.into(),
            clock,
        }
    }
}

#[async_trait]
impl SigningCredentialExchange for StsAssumeRoleClient {
    async fn fetch_credential(&self) -> Result<SigningCredential, CredentialError> {
        let duration = STS_SESSION_DURATION_SECS.to_string();
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRole")
            .append_pair("Version", "2011-06-15")
            .append_pair("RoleArn", &self.role_arn)
            .append_pair("RoleSessionName", STS_ROLE_SESSION_NAME)
            .append_pair("ExternalId", &self.external_id)
            .append_pair("DurationSeconds", &duration)
            .finish();

        let mut request = HttpRequest::new(Method::POST, self.endpoint.clone());
        let host = request
            .host()
            .ok_or_else(|| CredentialError::Config(format!("STS endpoint has no host: {}", self.endpoint)))?;
        request = request
            .header("host", host)
            .header("content-type", FORM_CONTENT_TYPE)
            .header("accept", "application/json")
            .body(body);

        sign_http_request(
            &mut request,
            &self.base,
            &SigningScope::new(STS_SIGNING_REGION, "sts"),
            self.clock.utc_now(),
        )?;

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(CredentialError::from_status("STS", response.status, &response.body));
        }

        parse_assume_role(&response.body)
    }
}

/// Long-lived keys handed out as-is when no role is configured
pub struct StaticSigningCredential(SigningCredential);

impl StaticSigningCredential {
    pub fn new(credential: SigningCredential) -> Self {
        Self(credential)
    }
}

#[async_trait]
impl SigningCredentialExchange for StaticSigningCredential {
    async fn fetch_credential(&self) -> Result<SigningCredential, CredentialError> {
        Ok(self.0.clone())
    }
}

/* -------------------------------------------------------------------------- */
/* Manager */
/* -------------------------------------------------------------------------- */

/// Caches both credential kinds and refreshes them on demand
pub struct CredentialManager {
    bearer_source: Arc<dyn BearerTokenExchange>,
    signing_source: Arc<dyn SigningCredentialExchange>,
    clock: SharedClock,
    safety_buffer: chrono::Duration,
    retry: RetryConfig,
    bearer: RwLock<Option<BearerToken>>,
    signing: RwLock<Option<SigningCredential>>,
    bearer_refresh: Mutex<()>,
    signing_refresh: Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        bearer_source: Arc<dyn BearerTokenExchange>,
        signing_source: Arc<dyn SigningCredentialExchange>,
        clock: SharedClock,
    ) -> Self {
        let retry = RetryConfig::builder()
            .max_retries(CREDENTIAL_EXCHANGE_MAX_RETRIES)
            .exponential_backoff(Duration::from_millis(500), 2.0, Duration::from_secs(2))
            .bounded_jitter(Duration::from_millis(100))
            .build()
            .unwrap_or_default();

        Self {
            bearer_source,
            signing_source,
            clock,
            safety_buffer: chrono::Duration::seconds(CREDENTIAL_SAFETY_BUFFER_SECS as i64),
            retry,
            bearer: RwLock::new(None),
            signing: RwLock::new(None),
            bearer_refresh: Mutex::new(()),
            signing_refresh: Mutex::new(()),
        }
    }

    /// Wire LWA plus STS (or static keys when no role ARN is set) from config.
    pub fn from_config(
        config: &SpApiConfig,
        transport: Arc<dyn HttpTransport>,
        clock: SharedClock,
    ) -> Result<Self, SellerScanError> {
        let lwa_endpoint = parse_endpoint("SP_API_LWA_ENDPOINT", &config.lwa_endpoint)?;
        let bearer: Arc<dyn BearerTokenExchange> = Arc::new(LwaTokenClient::new(
            Arc::clone(&transport),
            lwa_endpoint,
            config,
            Arc::clone(&clock),
        ));

        let base = SigningCredential::long_lived(&config.aws_access_key, &config.aws_secret_key);
        let signing: Arc<dyn SigningCredentialExchange> = match config.role_arn.as_deref() {
            Some(role_arn) if !role_arn.trim().is_empty() => {
                let sts_endpoint = parse_endpoint("SP_API_STS_ENDPOINT", &config.sts_endpoint)?;
                Arc::new(StsAssumeRoleClient::new(
                    transport,
                    sts_endpoint,
                    base,
                    role_arn,
                    &config.external_id,
                    Arc::clone(&clock),
                ))
            }
            _ => {
                info!("no role ARN configured; signing with long-lived AWS keys");
                Arc::new(StaticSigningCredential::new(base))
            }
        };

        Ok(Self::new(bearer, signing, clock))
    }

    #[must_use]
    pub fn with_safety_buffer(mut self, buffer: Duration) -> Self {
        self.safety_buffer = chrono::Duration::from_std(buffer).unwrap_or(self.safety_buffer);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Current bearer token, refreshed when absent or inside the buffer.
    #[instrument(skip(self))]
    pub async fn bearer_token(&self) -> Result<BearerToken, CredentialError> {
        if let Some(token) = self.cached_bearer() {
            return Ok(token);
        }

        let _guard = self.bearer_refresh.lock().await;
        if let Some(token) = self.cached_bearer() {
            return Ok(token);
        }

        let source = Arc::clone(&self.bearer_source);
        let token = self.exchange("lwa", || source.fetch_token()).await?;
        debug!(expires_at = %token.expires_at, "bearer token refreshed");
        *self.bearer.write() = Some(token.clone());
        Ok(token)
    }

    /// Current signing credential, refreshed when absent or inside the buffer.
    #[instrument(skip(self))]
    pub async fn signing_credential(&self) -> Result<SigningCredential, CredentialError> {
        if let Some(credential) = self.cached_signing() {
            return Ok(credential);
        }

        let _guard = self.signing_refresh.lock().await;
        if let Some(credential) = self.cached_signing() {
            return Ok(credential);
        }

        let source = Arc::clone(&self.signing_source);
        let credential = self.exchange("sts", || source.fetch_credential()).await?;
        debug!(access_key_id = %credential.access_key_id, "signing credential refreshed");
        *self.signing.write() = Some(credential.clone());
        Ok(credential)
    }

    fn cached_bearer(&self) -> Option<BearerToken> {
        let now = self.clock.utc_now();
        self.bearer.read().as_ref().filter(|t| t.is_fresh(now, self.safety_buffer)).cloned()
    }

    fn cached_signing(&self) -> Option<SigningCredential> {
        let now = self.clock.utc_now();
        self.signing.read().as_ref().filter(|c| c.is_fresh(now, self.safety_buffer)).cloned()
    }

    async fn exchange<T, F, Fut>(&self, kind: &str, mut attempt: F) -> Result<T, CredentialError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CredentialError>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    warn!(kind, retry = retry + 1, ?delay, error = %err, "credential exchange failed, retrying");
                    self.clock.sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    warn!(kind, error = %err, "credential exchange failed");
                    return Err(err);
                }
            }
        }
    }
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url, SellerScanError> {
    Url::parse(value).map_err(|e| SellerScanError::Config(format!("{name} is not a valid URL: {e}")))
}
