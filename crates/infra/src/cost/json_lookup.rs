use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sellerscan_core::CostLookup;
use sellerscan_domain::{CostBreakdown, Result, SellerScanError};
use tracing::info;

/// Cost lookup over a JSON object mapping SKU to cost breakdown:
///
/// ```json
/// { "B000123": { "unit_cost": 4.5, "shipping_cost": 1.25 } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonCostLookup {
    costs: HashMap<String, CostBreakdown>,
}

impl JsonCostLookup {
    pub fn new(costs: HashMap<String, CostBreakdown>) -> Self {
        Self { costs }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let costs: HashMap<String, CostBreakdown> = serde_json::from_str(content)
            .map_err(|e| SellerScanError::Config(format!("invalid cost file: {e}")))?;
        Ok(Self::new(costs))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SellerScanError::Config(format!("failed to read cost file {}: {e}", path.display()))
        })?;
        let lookup = Self::from_json(&content)?;
        info!(path = %path.display(), skus = lookup.len(), "loaded cost table");
        Ok(lookup)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

#[async_trait]
impl CostLookup for JsonCostLookup {
    async fn get_cost(&self, sku: &str) -> Result<Option<CostBreakdown>> {
        Ok(self.costs.get(sku).copied())
    }
}
