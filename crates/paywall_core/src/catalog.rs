use std::sync::Arc;

use commerce::CommercePlatform;
use shared::{
    domain::{Offering, OfferingId},
    error::FetchError,
};
use tracing::{info, warn};

/// Fetches the configured products from the storefront. Nothing is cached between sessions.
pub struct ProductCatalog {
    platform: Arc<dyn CommercePlatform>,
    product_ids: Vec<OfferingId>,
}

impl ProductCatalog {
    pub fn new(platform: Arc<dyn CommercePlatform>, product_ids: Vec<OfferingId>) -> Self {
        Self {
            platform,
            product_ids,
        }
    }

    pub fn product_ids(&self) -> &[OfferingId] {
        &self.product_ids
    }

    pub async fn fetch_offerings(&self) -> Result<Vec<Offering>, FetchError> {
        match self.platform.list_offerings(&self.product_ids).await {
            Ok(offerings) if offerings.is_empty() => {
                warn!(
                    requested = self.product_ids.len(),
                    "catalog: storefront returned no offerings"
                );
                Ok(offerings)
            }
            Ok(offerings) => {
                info!(count = offerings.len(), "catalog: offerings fetched");
                Ok(offerings)
            }
            Err(err) => {
                warn!(error = %err, "catalog: fetch failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use commerce::{MissingCommercePlatform, SimulatedStore};

    use super::*;

    #[tokio::test]
    async fn preserves_storefront_order() {
        let catalog = ProductCatalog::new(
            Arc::new(SimulatedStore::demo()),
            vec![OfferingId::from("demo_weekly"), OfferingId::from("demo_lifetime")],
        );

        let offerings = catalog.fetch_offerings().await.expect("fetch");
        assert_eq!(offerings[0].id.as_str(), "demo_lifetime");
        assert_eq!(offerings[1].id.as_str(), "demo_weekly");
    }

    #[tokio::test]
    async fn empty_storefront_is_not_an_error() {
        let catalog = ProductCatalog::new(
            Arc::new(SimulatedStore::new(Vec::new())),
            vec![OfferingId::from("demo_weekly")],
        );
        assert!(catalog.fetch_offerings().await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn platform_failure_is_returned() {
        let catalog = ProductCatalog::new(
            Arc::new(MissingCommercePlatform),
            vec![OfferingId::from("demo_weekly")],
        );
        assert!(catalog.fetch_offerings().await.is_err());
    }
}
