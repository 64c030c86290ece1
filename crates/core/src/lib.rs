//! # SellerScan Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for result storage, cost lookup and
//!   item fetching
//! - The batch scan orchestrator
//!
//! ## Architecture Principles
//! - Only depends on `sellerscan-common` and `sellerscan-domain`
//! - No database or HTTP code
//! - All external dependencies via traits

pub mod scan;

pub use scan::ports::{CostLookup, FetchError, FetchedItem, ItemFailure, ItemFetcher, ResultSink};
pub use scan::ScanOrchestrator;
