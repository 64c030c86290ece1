//! # SellerScan Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - HTTP transport (reqwest)
//! - SP-API credentials, SigV4 signing, the resilient client and typed operations
//! - Result sinks (in-memory and SQLite)
//! - JSON cost lookup
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `sellerscan-core`
//! - Depends on `sellerscan-common`, `sellerscan-domain` and `sellerscan-core`
//! - Contains all "impure" code (network, filesystem, database)

pub mod config;
pub mod cost;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod sp_api;

// Re-export commonly used items
pub use cost::JsonCostLookup;
pub use database::{DbManager, InMemoryResultSink, SqliteResultSink};
pub use errors::InfraError;
pub use http::{HttpTransport, ReqwestTransport};
pub use observability::{init_tracing, LogFormat};
pub use sp_api::{CredentialManager, ItemOperation, SpApiClient, SpApiItemFetcher};
