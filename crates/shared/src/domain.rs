use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(OfferingId);
id_newtype!(TransactionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Week,
    Lifetime,
    #[serde(other)]
    Other,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Week => "week",
            BillingPeriod::Lifetime => "lifetime",
            BillingPeriod::Other => "other",
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A purchasable plan as reported by the commerce platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: OfferingId,
    /// Price already formatted by the platform for the user's storefront.
    pub display_price: String,
    pub period: BillingPeriod,
    pub plan_label: String,
    #[serde(default)]
    pub has_trial: bool,
}

impl Offering {
    pub fn new(
        id: impl Into<String>,
        display_price: impl Into<String>,
        period: BillingPeriod,
        plan_label: impl Into<String>,
        has_trial: bool,
    ) -> Self {
        Self {
            id: OfferingId::new(id),
            display_price: display_price.into(),
            period,
            plan_label: plan_label.into(),
            has_trial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: TransactionId,
    pub offering_id: OfferingId,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    #[default]
    NotStarted,
    Fetching,
    Fetched,
    Failed,
}

impl FetchStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, FetchStatus::Fetched | FetchStatus::Failed)
    }
}
