//! In-memory storefront used by the headless driver and by tests.

use std::{
    collections::{HashSet, VecDeque},
    fs,
    path::Path,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{BillingPeriod, Offering, OfferingId, Receipt, TransactionId},
    error::{FetchError, PurchaseError, RestoreError},
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::CommercePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedOutcome {
    #[default]
    Success,
    Cancelled,
    Declined,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub offerings: Vec<Offering>,
}

struct StoreState {
    owned: HashSet<OfferingId>,
    entitled: bool,
    scripted_outcomes: VecDeque<ScriptedOutcome>,
    default_outcome: ScriptedOutcome,
    fetch_failure: Option<FetchError>,
    restore_failure: Option<RestoreError>,
    purchase_calls: usize,
}

pub struct SimulatedStore {
    catalog: Vec<Offering>,
    latency: Duration,
    state: Mutex<StoreState>,
}

impl SimulatedStore {
    pub fn new(catalog: Vec<Offering>) -> Self {
        Self {
            catalog,
            latency: Duration::ZERO,
            state: Mutex::new(StoreState {
                owned: HashSet::new(),
                entitled: false,
                scripted_outcomes: VecDeque::new(),
                default_outcome: ScriptedOutcome::Success,
                fetch_failure: None,
                restore_failure: None,
                purchase_calls: 0,
            }),
        }
    }

    /// The two demo plans shipped with the paywall template.
    pub fn demo() -> Self {
        Self::new(vec![
            Offering::new(
                "demo_lifetime",
                "$49.99",
                BillingPeriod::Lifetime,
                "Lifetime Plan",
                false,
            ),
            Offering::new("demo_weekly", "$4.99", BillingPeriod::Week, "Weekly Plan", true),
        ])
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(raw).context("invalid catalog toml")?;
        let mut seen = HashSet::new();
        for offering in &file.offerings {
            if !seen.insert(offering.id.clone()) {
                bail!("duplicate offering id '{}' in catalog", offering.id);
            }
        }
        Ok(Self::new(file.offerings))
    }

    pub fn load_catalog(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load catalog '{}'", path.display()))
    }

    pub fn catalog(&self) -> &[Offering] {
        &self.catalog
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Marks offerings as bought on this account without an active entitlement
    /// on this device, so only a restore will surface them.
    pub fn with_owned<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = self.state.get_mut();
        state
            .owned
            .extend(ids.into_iter().map(|id| OfferingId::new(id)));
        self
    }

    pub fn with_active_entitlement(mut self) -> Self {
        self.state.get_mut().entitled = true;
        self
    }

    pub fn with_purchase_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.state.get_mut().default_outcome = outcome;
        self
    }

    pub fn with_fetch_failure(mut self, err: FetchError) -> Self {
        self.state.get_mut().fetch_failure = Some(err);
        self
    }

    pub fn with_restore_failure(mut self, err: RestoreError) -> Self {
        self.state.get_mut().restore_failure = Some(err);
        self
    }

    /// Queues an outcome for the next purchase; falls back to the default once drained.
    pub async fn script_purchase(&self, outcome: ScriptedOutcome) {
        self.state.lock().await.scripted_outcomes.push_back(outcome);
    }

    pub async fn set_fetch_failure(&self, err: Option<FetchError>) {
        self.state.lock().await.fetch_failure = err;
    }

    pub async fn purchase_calls(&self) -> usize {
        self.state.lock().await.purchase_calls
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl CommercePlatform for SimulatedStore {
    async fn list_offerings(
        &self,
        product_ids: &[OfferingId],
    ) -> Result<Vec<Offering>, FetchError> {
        self.simulate_latency().await;

        if let Some(err) = self.state.lock().await.fetch_failure.clone() {
            return Err(err);
        }
        if product_ids.is_empty() {
            return Err(FetchError::Configuration(
                "no product identifiers requested".into(),
            ));
        }

        let offerings: Vec<Offering> = self
            .catalog
            .iter()
            .filter(|offering| product_ids.contains(&offering.id))
            .cloned()
            .collect();
        debug!(
            requested = product_ids.len(),
            returned = offerings.len(),
            "simulated store: listed offerings"
        );
        Ok(offerings)
    }

    async fn purchase(&self, offering_id: &OfferingId) -> Result<Receipt, PurchaseError> {
        if !self.catalog.iter().any(|offering| &offering.id == offering_id) {
            return Err(PurchaseError::UnknownProduct(offering_id.to_string()));
        }

        let outcome = {
            let mut state = self.state.lock().await;
            state.purchase_calls += 1;
            let default_outcome = state.default_outcome;
            state
                .scripted_outcomes
                .pop_front()
                .unwrap_or(default_outcome)
        };

        self.simulate_latency().await;

        match outcome {
            ScriptedOutcome::Success => {
                let mut state = self.state.lock().await;
                state.owned.insert(offering_id.clone());
                state.entitled = true;
                let receipt = Receipt {
                    transaction_id: TransactionId::new(Uuid::new_v4().to_string()),
                    offering_id: offering_id.clone(),
                    purchased_at: Utc::now(),
                };
                info!(
                    offering = %offering_id,
                    transaction = %receipt.transaction_id,
                    "simulated store: purchase completed"
                );
                Ok(receipt)
            }
            ScriptedOutcome::Cancelled => Err(PurchaseError::Cancelled),
            ScriptedOutcome::Declined => Err(PurchaseError::Declined(
                "payment method declined".into(),
            )),
            ScriptedOutcome::Failed => Err(PurchaseError::Failed(
                "storefront returned an unknown error".into(),
            )),
        }
    }

    async fn restore_purchases(&self) -> Result<bool, RestoreError> {
        self.simulate_latency().await;

        let mut state = self.state.lock().await;
        if let Some(err) = state.restore_failure.clone() {
            return Err(err);
        }
        let had_any = !state.owned.is_empty();
        if had_any {
            state.entitled = true;
        }
        info!(had_any, "simulated store: restore completed");
        Ok(had_any)
    }

    async fn current_entitlement(&self) -> bool {
        self.state.lock().await.entitled
    }
}
