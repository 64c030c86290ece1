//! # SellerScan API
//!
//! Application layer - scan commands and the `sellerscan` binary.
//!
//! This crate contains:
//! - Scan trigger commands (start, status, cancel, report)
//! - Application context (dependency injection)
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod commands;
pub mod context;

// Re-export for convenience
pub use commands::*;
pub use context::*;
