//! Cost lookup adapters

pub mod json_lookup;

pub use json_lookup::JsonCostLookup;
