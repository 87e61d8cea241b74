//! Headless paywall session: catalog fetch, purchase and restore flow,
//! entitlement fan-out, and the close-button countdown.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod notifier;
pub mod pricing;
pub mod timer;

pub use catalog::ProductCatalog;
pub use config::{CooldownConfig, PaywallConfig};
pub use controller::{ControllerError, PurchaseController, RestoreOutcome, SessionSnapshot};
pub use notifier::{EntitlementNotifier, EntitlementSubscription};
pub use pricing::{CallToAction, Savings};
pub use timer::PresentationTimer;
