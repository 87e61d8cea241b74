use async_trait::async_trait;
use shared::{
    domain::{Offering, OfferingId, Receipt},
    error::{FetchError, PurchaseError, RestoreError},
};

mod simulated;

pub use simulated::{CatalogFile, ScriptedOutcome, SimulatedStore};

/// Storefront operations the paywall depends on. Timeouts, receipt validation,
/// and entitlement bookkeeping all live behind this boundary.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    async fn list_offerings(&self, product_ids: &[OfferingId])
        -> Result<Vec<Offering>, FetchError>;
    async fn purchase(&self, offering_id: &OfferingId) -> Result<Receipt, PurchaseError>;
    /// Returns whether any prior purchase was found.
    async fn restore_purchases(&self) -> Result<bool, RestoreError>;
    async fn current_entitlement(&self) -> bool;
}

pub struct MissingCommercePlatform;

#[async_trait]
impl CommercePlatform for MissingCommercePlatform {
    async fn list_offerings(
        &self,
        _product_ids: &[OfferingId],
    ) -> Result<Vec<Offering>, FetchError> {
        Err(FetchError::Configuration(
            "commerce platform is unavailable".into(),
        ))
    }

    async fn purchase(&self, offering_id: &OfferingId) -> Result<Receipt, PurchaseError> {
        Err(PurchaseError::Failed(format!(
            "commerce platform is unavailable for {offering_id}"
        )))
    }

    async fn restore_purchases(&self) -> Result<bool, RestoreError> {
        Err(RestoreError::Platform(
            "commerce platform is unavailable".into(),
        ))
    }

    async fn current_entitlement(&self) -> bool {
        false
    }
}
