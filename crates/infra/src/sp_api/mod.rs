//! Selling Partner API access layer
//!
//! - [`credentials`]: LWA bearer tokens and STS signing credentials
//! - [`signer`]: AWS SigV4
//! - [`client`]: rate limiting, signing and bounded retry per call
//! - [`operations`]: typed catalog and pricing calls
//! - [`fetcher`]: adapter to the scan orchestrator's `ItemFetcher` port

pub mod client;
pub mod credentials;
pub mod errors;
pub mod fetcher;
pub mod operations;
pub mod signer;

pub use client::{build_limiter, retry_config, ApiRequest, ApiResponse, SpApiClient};
pub use credentials::{
    BearerToken, BearerTokenExchange, CredentialManager, LwaTokenClient, SigningCredential,
    SigningCredentialExchange, StaticSigningCredential, StsAssumeRoleClient,
};
pub use errors::{CredentialError, RequestFailure, SpApiError, SpApiErrorCategory};
pub use fetcher::SpApiItemFetcher;
pub use operations::{ItemCondition, ItemOperation};
pub use signer::{
    sign, sign_http_request, SignableRequest, SignedRequest, SigningError, SigningScope,
};
