//! Resilient SP-API client
//!
//! Every attempt acquires a rate-limit token for the request's family,
//! fetches fresh credentials, signs the request and sends it with a bounded
//! timeout. Throttling, transient server errors and network failures are
//! retried with exponential backoff; auth failures and other client errors
//! fail immediately.

use std::sync::Arc;

use reqwest::Method;
use sellerscan_common::{FamilyRateLimiter, RateLimitConfig, RetryConfig, SharedClock};
use sellerscan_domain::constants::{FAMILY_DEFAULT, RATE_LIMIT_HEADER, SP_API_SERVICE, USER_AGENT};
use sellerscan_domain::{AppConfig, ClientConfig, SellerScanError};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::credentials::CredentialManager;
use super::errors::{RequestFailure, SpApiError};
use super::signer::{sign_http_request, SigningScope};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// One logical SP-API call, possibly sent several times.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub family: String,
    /// Overrides the client's retry budget
    pub max_retries: Option<u32>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            family: family.into(),
            max_retries: None,
        }
    }

    pub fn get(path: impl Into<String>, family: impl Into<String>) -> Self {
        Self::new(Method::GET, path, family)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// Successful response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub attempts: u32,
}

pub struct SpApiClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialManager>,
    limiter: Arc<FamilyRateLimiter>,
    clock: SharedClock,
    base_url: Url,
    scope: SigningScope,
    marketplace_id: String,
    retry: RetryConfig,
}

impl SpApiClient {
    pub fn new(
        base_url: Url,
        signing_region: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialManager>,
        limiter: Arc<FamilyRateLimiter>,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            credentials,
            limiter,
            clock,
            base_url,
            scope: SigningScope::new(signing_region, SP_API_SERVICE),
            marketplace_id: sellerscan_domain::constants::DEFAULT_MARKETPLACE_ID.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Build the full stack (transport, credentials, limiter) from configuration.
    pub fn from_config(config: &AppConfig, clock: SharedClock) -> Result<Self, SellerScanError> {
        config.validate()?;

        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::builder()
                .timeout(config.client.timeout())
                .user_agent(USER_AGENT)
                .build()?,
        );
        let credentials = Arc::new(CredentialManager::from_config(
            &config.sp_api,
            Arc::clone(&transport),
            Arc::clone(&clock),
        )?);
        let limiter = Arc::new(build_limiter(config, Arc::clone(&clock))?);

        let base_url = Url::parse(&config.sp_api.base_url()?).map_err(|e| {
            SellerScanError::Config(format!("SP_API_ENDPOINT is not a valid URL: {e}"))
        })?;

        Ok(Self::new(
            base_url,
            config.sp_api.signing_region()?,
            transport,
            credentials,
            limiter,
            clock,
        )
        .with_marketplace_id(&config.sp_api.marketplace_id)
        .with_retry(retry_config(&config.client)?))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_marketplace_id(mut self, marketplace_id: impl Into<String>) -> Self {
        self.marketplace_id = marketplace_id.into();
        self
    }

    pub fn marketplace_id(&self) -> &str {
        &self.marketplace_id
    }

    pub fn limiter(&self) -> &Arc<FamilyRateLimiter> {
        &self.limiter
    }

    /// Send `request`, retrying transient failures within its budget.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path, family = %request.family))]
    pub async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, RequestFailure> {
        let budget = request.max_retries.unwrap_or(self.retry.max_retries);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.attempt(request).await {
                Ok(response) => {
                    debug!(status = response.status, attempts, "SP-API request succeeded");
                    let body = decode_body(&response.body)
                        .map_err(|err| RequestFailure::new(err, attempts))?;
                    return Ok(ApiResponse { status: response.status, body, attempts });
                }
                Err(err) => {
                    let retry = attempts - 1;
                    if err.should_retry() && retry < budget {
                        let delay = self.retry.delay_for(retry);
                        warn!(attempts, ?delay, error = %err, "SP-API request failed, retrying");
                        self.clock.sleep(delay).await;
                        continue;
                    }
                    warn!(attempts, error = %err, "SP-API request failed");
                    return Err(RequestFailure::new(err, attempts));
                }
            }
        }
    }

    async fn attempt(&self, request: &ApiRequest) -> Result<HttpResponse, SpApiError> {
        let waited = self.limiter.acquire(&request.family).await;
        if !waited.is_zero() {
            debug!(family = %request.family, ?waited, "waited for rate limit token");
        }

        let token = self.credentials.bearer_token().await?;
        let signing = self.credentials.signing_credential().await?;

        let mut http = HttpRequest::new(request.method.clone(), self.url_for(request));
        let host = http
            .host()
            .ok_or_else(|| SpApiError::Config(format!("endpoint has no host: {}", self.base_url)))?;
        http = http
            .header("host", host)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/json")
            .header("x-amz-access-token", token.access_token);
        if let Some(body) = &request.body {
            let encoded = serde_json::to_string(body)
                .map_err(|e| SpApiError::Config(format!("request body: {e}")))?;
            http = http.header("content-type", "application/json").body(encoded);
        }

        sign_http_request(&mut http, &signing, &self.scope, self.clock.utc_now())?;

        let response = self.transport.send(http).await?;
        self.adopt_announced_rate(&request.family, &response);

        if response.is_success() {
            Ok(response)
        } else {
            Err(SpApiError::from_status(response.status, &response.body))
        }
    }

    fn url_for(&self, request: &ApiRequest) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&request.path);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        url
    }

    fn adopt_announced_rate(&self, family: &str, response: &HttpResponse) {
        let Some(announced) = response.header(RATE_LIMIT_HEADER) else {
            return;
        };
        match announced.trim().parse::<f64>() {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                self.limiter.set_sustained_rate(family, rate);
            }
            _ => debug!(family, announced, "ignoring unparseable rate limit header"),
        }
    }
}

fn decode_body(body: &str) -> Result<Value, SpApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| SpApiError::Decode(e.to_string()))
}

/// Retry policy from the client tuning section
pub fn retry_config(config: &ClientConfig) -> Result<RetryConfig, SellerScanError> {
    RetryConfig::builder()
        .max_retries(config.max_retries)
        .exponential_backoff(config.base_backoff(), 2.0, config.max_backoff())
        .bounded_jitter(config.max_jitter())
        .build()
        .map_err(SellerScanError::Config)
}

/// Limiter with every configured family registered
pub fn build_limiter(
    config: &AppConfig,
    clock: SharedClock,
) -> Result<FamilyRateLimiter, SellerScanError> {
    let families = config.effective_rate_families();
    let default = families
        .iter()
        .find(|family| family.name == FAMILY_DEFAULT)
        .map(|family| RateLimitConfig::new(family.sustained_rate, family.burst_capacity))
        .unwrap_or_else(|| RateLimitConfig::new(1.0, 1))
        .map_err(SellerScanError::Config)?;

    let limiter = FamilyRateLimiter::new(default, clock).map_err(SellerScanError::Config)?;
    for family in &families {
        let limit = RateLimitConfig::new(family.sustained_rate, family.burst_capacity)
            .map_err(SellerScanError::Config)?;
        limiter.register(&family.name, &limit).map_err(SellerScanError::Config)?;
    }
    Ok(limiter)
}

#[cfg(test)]
mod tests {
    use sellerscan_common::SystemClock;
    use sellerscan_domain::{RateFamilyConfig, SpApiConfig, StorageConfig};

    use super::*;

    fn app_config(rate_families: Vec<RateFamilyConfig>) -> AppConfig {
        AppConfig {
            sp_api: SpApiConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                refresh_token: "refresh".into(),
                aws_access_key: "AKID".into(),
                aws_secret_key: "aws-secret".into(),
                region: "eu".into(),
                external_id: "ext".into(),
                role_arn: None,
                endpoint: None,
                marketplace_id: "A1PA6795UKMFR9".into(),
                lwa_endpoint: "https://api.amazon.com/auth/o2/token".into(),
                sts_endpoint: "https://sts.amazonaws.com/".into(),
            },
            client: ClientConfig::default(),
            rate_families,
            storage: StorageConfig::default(),
        }
    }

    #[test]
    fn limiter_registers_default_families_and_overrides() {
        let config = app_config(vec![RateFamilyConfig {
            name: "catalog".into(),
            sustained_rate: 5.0,
            burst_capacity: 10,
        }]);
        let limiter = build_limiter(&config, SystemClock::shared()).unwrap();

        assert_eq!(limiter.sustained_rate("catalog"), 5.0);
        assert_eq!(limiter.sustained_rate("offers"), 0.5);
        assert!(limiter.families().contains(&"reports".to_string()));
    }

    #[test]
    fn retry_config_follows_client_tuning() {
        let client = ClientConfig { max_jitter_ms: 0, ..ClientConfig::default() };
        let retry = retry_config(&client).unwrap();

        assert_eq!(retry.max_retries, 3);
        let delays: Vec<u64> = (0..5).map(|n| retry.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000]);
    }

    #[test]
    fn from_config_uses_regional_endpoint() {
        let client = SpApiClient::from_config(&app_config(Vec::new()), SystemClock::shared())
            .unwrap();

        assert_eq!(client.base_url.as_str(), "https://sellingpartnerapi-eu.amazon.com/");
        assert_eq!(client.scope.region, "eu-west-1");
        assert_eq!(client.marketplace_id(), "A1PA6795UKMFR9");
    }

    #[test]
    fn url_for_appends_query_only_when_present() {
        let client = SpApiClient::from_config(&app_config(Vec::new()), SystemClock::shared())
            .unwrap();

        let bare = client.url_for(&ApiRequest::get("/catalog/2022-04-01/items/B0001", "catalog"));
        assert_eq!(bare.as_str(), "https://sellingpartnerapi-eu.amazon.com/catalog/2022-04-01/items/B0001");

        let with_query = client.url_for(
            &ApiRequest::get("/products/pricing/v0/competitivePrice", "competitive_pricing")
                .query("Asins", "B1,B2"),
        );
        assert_eq!(with_query.query(), Some("Asins=B1%2CB2"));
    }

    #[test]
    fn empty_bodies_decode_to_null() {
        assert_eq!(decode_body("  ").unwrap(), Value::Null);
        assert!(matches!(decode_body("{oops"), Err(SpApiError::Decode(_))));
    }
}
