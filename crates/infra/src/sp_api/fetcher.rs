use std::sync::Arc;

use async_trait::async_trait;
use sellerscan_core::{FetchError, FetchedItem, ItemFetcher};

use super::client::SpApiClient;
use super::errors::RequestFailure;
use super::operations::ItemOperation;

/// Runs one SP-API operation per scanned identifier.
pub struct SpApiItemFetcher {
    client: Arc<SpApiClient>,
    operation: ItemOperation,
}

impl SpApiItemFetcher {
    pub fn new(client: Arc<SpApiClient>, operation: ItemOperation) -> Self {
        Self { client, operation }
    }

    pub fn operation(&self) -> ItemOperation {
        self.operation
    }
}

#[async_trait]
impl ItemFetcher for SpApiItemFetcher {
    async fn fetch(&self, identifier: &str, max_retries: u32) -> Result<FetchedItem, FetchError> {
        let request =
            self.operation.request(identifier, self.client.marketplace_id()).max_retries(max_retries);

        match self.client.request(&request).await {
            Ok(response) => Ok(FetchedItem { payload: response.body, attempts: response.attempts }),
            Err(failure) => Err(into_fetch_error(failure)),
        }
    }
}

/// Item-level failures keep their kind; systemic ones abort the scan.
fn into_fetch_error(failure: RequestFailure) -> FetchError {
    match failure.error.failure_kind() {
        Some(kind) => FetchError::item(kind, failure.attempts, failure.error.to_string()),
        None => FetchError::Internal(failure.to_string()),
    }
}
