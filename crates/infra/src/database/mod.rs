//! Result sink implementations

pub mod manager;
pub mod memory;
pub mod scan_repository;

pub use manager::*;
pub use memory::*;
pub use scan_repository::*;
