use std::sync::Arc;

use commerce::CommercePlatform;
use shared::{
    domain::{FetchStatus, Offering, OfferingId, Receipt},
    error::{FetchError, PurchaseError, RestoreError},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    catalog::ProductCatalog,
    config::PaywallConfig,
    notifier::{EntitlementNotifier, EntitlementSubscription},
    pricing::{CallToAction, Savings},
};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("offering {0} is not in the fetched catalog")]
    UnknownOffering(OfferingId),
    #[error("purchase session was closed")]
    SessionClosed,
    #[error(transparent)]
    Purchase(#[from] PurchaseError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub had_any: bool,
    pub subscribed: bool,
}

impl RestoreOutcome {
    /// Decided only after the restore call and the entitlement re-query have both completed.
    pub fn nothing_restored(&self) -> bool {
        !self.subscribed
    }
}

/// Owned copy of the session state for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub fetch_status: FetchStatus,
    pub offerings: Vec<Offering>,
    pub selected: Option<OfferingId>,
    pub trial_enabled: bool,
    pub purchase_in_progress: bool,
    pub restore_in_progress: bool,
    pub subscribed: bool,
    pub closed: bool,
    pub last_fetch_error: Option<FetchError>,
}

#[derive(Default)]
struct SessionState {
    fetch_status: FetchStatus,
    offerings: Vec<Offering>,
    selected: Option<OfferingId>,
    trial_enabled: bool,
    purchase_in_progress: bool,
    restore_in_progress: bool,
    subscribed: bool,
    closed: bool,
    last_fetch_error: Option<FetchError>,
}

impl SessionState {
    fn ensure_open(&self) -> Result<(), ControllerError> {
        if self.closed {
            return Err(ControllerError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_fetched(&self, operation: &str) -> Result<(), ControllerError> {
        if self.fetch_status != FetchStatus::Fetched {
            return Err(ControllerError::IllegalState(format!(
                "{operation} requires fetched offerings (status is {:?})",
                self.fetch_status
            )));
        }
        Ok(())
    }

    fn offering(&self, id: &OfferingId) -> Option<&Offering> {
        self.offerings.iter().find(|offering| &offering.id == id)
    }

    fn select(&mut self, id: &OfferingId) -> Result<(), ControllerError> {
        let has_trial = self
            .offering(id)
            .map(|offering| offering.has_trial)
            .ok_or_else(|| ControllerError::UnknownOffering(id.clone()))?;
        self.selected = Some(id.clone());
        self.trial_enabled = has_trial;
        Ok(())
    }

    /// Returns true when this call moved the session from unsubscribed to subscribed.
    fn apply_entitlement(&mut self, entitled: bool) -> bool {
        // Revocation is the storefront's business; never clear it here.
        if entitled && !self.subscribed {
            self.subscribed = true;
            return true;
        }
        false
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            fetch_status: self.fetch_status,
            offerings: self.offerings.clone(),
            selected: self.selected.clone(),
            trial_enabled: self.trial_enabled,
            purchase_in_progress: self.purchase_in_progress,
            restore_in_progress: self.restore_in_progress,
            subscribed: self.subscribed,
            closed: self.closed,
            last_fetch_error: self.last_fetch_error.clone(),
        }
    }
}

/// Drives one paywall session: catalog fetch, selection, purchase, and restore.
///
/// Every write goes through `inner`; the lock is released around storefront calls
/// so a slow purchase never blocks reads of the session state.
pub struct PurchaseController {
    platform: Arc<dyn CommercePlatform>,
    catalog: ProductCatalog,
    config: PaywallConfig,
    notifier: EntitlementNotifier,
    inner: Mutex<SessionState>,
}

impl PurchaseController {
    pub fn new(platform: Arc<dyn CommercePlatform>, config: PaywallConfig) -> Arc<Self> {
        Self::new_with_notifier(platform, config, EntitlementNotifier::new())
    }

    pub fn new_with_notifier(
        platform: Arc<dyn CommercePlatform>,
        config: PaywallConfig,
        notifier: EntitlementNotifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog: ProductCatalog::new(platform.clone(), config.product_ids.clone()),
            platform,
            config,
            notifier,
            inner: Mutex::new(SessionState::default()),
        })
    }

    pub fn subscribe(&self) -> EntitlementSubscription {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &EntitlementNotifier {
        &self.notifier
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Fetches the catalog and the current entitlement. A failed fetch is
    /// reported through the returned status, not as an error.
    pub async fn initialize(&self) -> Result<FetchStatus, ControllerError> {
        self.begin_fetch(FetchStatus::NotStarted).await?;
        info!(
            products = self.catalog.product_ids().len(),
            "paywall: session initializing"
        );

        let (fetched, entitled) = tokio::join!(
            self.catalog.fetch_offerings(),
            self.platform.current_entitlement()
        );

        let mut state = self.inner.lock().await;
        if state.closed {
            info!("paywall: session closed during initialize, discarding results");
            return Err(ControllerError::SessionClosed);
        }
        self.finish_fetch(&mut state, fetched);
        if state.apply_entitlement(entitled) {
            info!("paywall: existing entitlement found");
            self.notifier.publish(true);
        }
        Ok(state.fetch_status)
    }

    /// Re-runs the catalog fetch after a failure.
    pub async fn retry_fetch(&self) -> Result<FetchStatus, ControllerError> {
        self.begin_fetch(FetchStatus::Failed).await?;
        info!("paywall: retrying catalog fetch");

        let fetched = self.catalog.fetch_offerings().await;

        let mut state = self.inner.lock().await;
        if state.closed {
            info!("paywall: session closed during fetch, discarding results");
            return Err(ControllerError::SessionClosed);
        }
        self.finish_fetch(&mut state, fetched);
        Ok(state.fetch_status)
    }

    async fn begin_fetch(&self, expected: FetchStatus) -> Result<(), ControllerError> {
        let mut state = self.inner.lock().await;
        state.ensure_open()?;
        if state.fetch_status != expected {
            return Err(ControllerError::IllegalState(format!(
                "cannot fetch offerings while status is {:?}",
                state.fetch_status
            )));
        }
        state.fetch_status = FetchStatus::Fetching;
        state.last_fetch_error = None;
        Ok(())
    }

    fn finish_fetch(&self, state: &mut SessionState, fetched: Result<Vec<Offering>, FetchError>) {
        match fetched {
            Ok(offerings) => {
                state.offerings = offerings;
                state.fetch_status = FetchStatus::Fetched;
                let (selected, trial_enabled) = match self.default_selection(state) {
                    Some(offering) => (Some(offering.id.clone()), offering.has_trial),
                    None => (None, false),
                };
                state.selected = selected;
                state.trial_enabled = trial_enabled;
                info!(
                    offerings = state.offerings.len(),
                    selected = ?state.selected,
                    "paywall: catalog ready"
                );
            }
            Err(err) => {
                warn!(error = %err, "paywall: catalog unavailable, showing empty state");
                state.offerings.clear();
                state.selected = None;
                state.trial_enabled = false;
                state.fetch_status = FetchStatus::Failed;
                state.last_fetch_error = Some(err);
            }
        }
    }

    fn default_selection<'a>(&self, state: &'a SessionState) -> Option<&'a Offering> {
        self.config
            .product_ids
            .iter()
            .rev()
            .find_map(|id| state.offering(id))
            .or_else(|| state.offerings.last())
    }

    pub async fn select_offering(&self, id: &OfferingId) -> Result<(), ControllerError> {
        let mut state = self.inner.lock().await;
        state.ensure_open()?;
        state.ensure_fetched("select_offering")?;
        state.select(id)?;
        info!(offering = %id, "paywall: offering selected");
        Ok(())
    }

    /// Trial toggle: on selects the last configured product, off selects the first.
    pub async fn set_trial_enabled(
        &self,
        enabled: bool,
    ) -> Result<Option<OfferingId>, ControllerError> {
        let mut state = self.inner.lock().await;
        state.ensure_open()?;
        state.ensure_fetched("set_trial_enabled")?;

        let mut candidates = self
            .config
            .product_ids
            .iter()
            .filter(|id| state.offering(id).is_some());
        let target = if enabled {
            candidates.next_back()
        } else {
            candidates.next()
        }
        .cloned();

        match &target {
            Some(id) => {
                state.selected = Some(id.clone());
                info!(offering = %id, trial = enabled, "paywall: trial toggled");
            }
            None => warn!(trial = enabled, "paywall: no configured product to toggle to"),
        }
        state.trial_enabled = enabled;
        Ok(target)
    }

    pub async fn purchase(&self, id: &OfferingId) -> Result<Receipt, ControllerError> {
        {
            let mut state = self.inner.lock().await;
            state.ensure_open()?;
            state.ensure_fetched("purchase")?;
            if state.offering(id).is_none() {
                return Err(ControllerError::UnknownOffering(id.clone()));
            }
            if state.purchase_in_progress {
                return Err(ControllerError::IllegalState(
                    "a purchase is already in progress".into(),
                ));
            }
            if state.restore_in_progress {
                return Err(ControllerError::IllegalState(
                    "cannot purchase while a restore is in progress".into(),
                ));
            }
            state.purchase_in_progress = true;
        }
        info!(offering = %id, "paywall: purchase started");

        let result = self.platform.purchase(id).await;

        let mut state = self.inner.lock().await;
        state.purchase_in_progress = false;
        if state.closed {
            info!(offering = %id, "paywall: session closed during purchase, discarding result");
            return Err(ControllerError::SessionClosed);
        }

        match result {
            Ok(receipt) => {
                state.subscribed = true;
                let delivered = self.notifier.publish(true);
                info!(
                    offering = %id,
                    transaction = %receipt.transaction_id,
                    observers = delivered,
                    "paywall: purchase succeeded"
                );
                Ok(receipt)
            }
            Err(err) if err.is_cancellation() => {
                info!(offering = %id, "paywall: purchase cancelled");
                Err(err.into())
            }
            Err(err) => {
                warn!(offering = %id, error = %err, "paywall: purchase failed");
                Err(err.into())
            }
        }
    }

    pub async fn purchase_selected(&self) -> Result<Receipt, ControllerError> {
        let selected = self.inner.lock().await.selected.clone();
        let id = selected
            .ok_or_else(|| ControllerError::IllegalState("no offering selected".into()))?;
        self.purchase(&id).await
    }

    pub async fn restore(&self) -> Result<RestoreOutcome, ControllerError> {
        {
            let mut state = self.inner.lock().await;
            state.ensure_open()?;
            if state.purchase_in_progress {
                return Err(ControllerError::IllegalState(
                    "cannot restore while a purchase is in progress".into(),
                ));
            }
            if state.restore_in_progress {
                return Err(ControllerError::IllegalState(
                    "a restore is already in progress".into(),
                ));
            }
            state.restore_in_progress = true;
        }
        info!("paywall: restore started");

        let result = match self.platform.restore_purchases().await {
            Ok(had_any) => Ok((had_any, self.platform.current_entitlement().await)),
            Err(err) => Err(err),
        };

        let mut state = self.inner.lock().await;
        state.restore_in_progress = false;
        if state.closed {
            info!("paywall: session closed during restore, discarding result");
            return Err(ControllerError::SessionClosed);
        }

        match result {
            Ok((had_any, entitled)) => {
                if state.apply_entitlement(entitled) {
                    self.notifier.publish(true);
                }
                let outcome = RestoreOutcome {
                    had_any,
                    subscribed: state.subscribed,
                };
                info!(
                    had_any,
                    subscribed = outcome.subscribed,
                    "paywall: restore completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "paywall: restore failed");
                Err(err.into())
            }
        }
    }

    /// Dismisses the session. Operations still in flight finish against the
    /// storefront but their results are dropped.
    pub async fn close(&self) {
        let mut state = self.inner.lock().await;
        if !state.closed {
            state.closed = true;
            info!(
                purchase_in_progress = state.purchase_in_progress,
                restore_in_progress = state.restore_in_progress,
                "paywall: session closed"
            );
        }
    }

    /// Placeholder plans until the first fetch settles, then the fetched catalog.
    pub async fn display_offerings(&self) -> Vec<Offering> {
        let state = self.inner.lock().await;
        if state.fetch_status.is_settled() {
            state.offerings.clone()
        } else {
            self.config.placeholder_offerings.clone()
        }
    }

    pub async fn call_to_action(&self) -> CallToAction {
        let state = self.inner.lock().await;
        let selected = state.selected.as_ref().and_then(|id| state.offering(id));
        CallToAction::for_offering(selected)
    }

    pub async fn savings(&self) -> Savings {
        Savings::from_offerings(&self.inner.lock().await.offerings)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
