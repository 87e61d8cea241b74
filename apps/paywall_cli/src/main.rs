use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commerce::{ScriptedOutcome, SimulatedStore};
use futures::StreamExt;
use paywall_core::{pricing::format_like, PresentationTimer, PurchaseController};
use shared::{
    domain::{BillingPeriod, FetchStatus, OfferingId},
    error::FetchError,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings};

const COUNTDOWN_TICK: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(
    name = "paywall",
    about = "Drive a headless paywall session against a simulated storefront"
)]
struct Cli {
    #[arg(long, default_value = "paywall.toml")]
    config: PathBuf,
    /// TOML catalog for the simulated storefront; the demo plans are used otherwise.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,
    #[arg(long)]
    fail_fetch: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Offerings {
        #[arg(long)]
        json: bool,
    },
    Purchase {
        /// Defaults to the session's default selection.
        offering: Option<String>,
        #[arg(long, value_enum, default_value_t = OutcomeArg::Success)]
        outcome: OutcomeArg,
    },
    Restore {
        /// Products the simulated account already owns.
        #[arg(long = "owned")]
        owned: Vec<String>,
    },
    Countdown {
        #[arg(long)]
        seconds: Option<f64>,
        #[arg(long)]
        no_cooldown: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Success,
    Cancelled,
    Declined,
    Failed,
}

impl From<OutcomeArg> for ScriptedOutcome {
    fn from(value: OutcomeArg) -> Self {
        match value {
            OutcomeArg::Success => ScriptedOutcome::Success,
            OutcomeArg::Cancelled => ScriptedOutcome::Cancelled,
            OutcomeArg::Declined => ScriptedOutcome::Declined,
            OutcomeArg::Failed => ScriptedOutcome::Failed,
        }
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    for warning in &settings.warnings {
        warn!("{warning}");
    }
}

fn build_store(cli: &Cli, settings: &Settings) -> Result<SimulatedStore> {
    let catalog_path = cli.catalog.as_ref().or(settings.catalog_path.as_ref());
    let mut store = match catalog_path {
        Some(path) => SimulatedStore::load_catalog(path)?,
        None => SimulatedStore::demo(),
    };

    store = store.with_latency(Duration::from_millis(cli.latency_ms));
    if cli.fail_fetch {
        store = store.with_fetch_failure(FetchError::Network("simulated outage".into()));
    }
    match &cli.command {
        Command::Purchase { outcome, .. } => {
            store = store.with_purchase_outcome((*outcome).into());
        }
        Command::Restore { owned } => {
            store = store.with_owned(owned.iter().cloned());
        }
        Command::Offerings { .. } | Command::Countdown { .. } => {}
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    init_tracing(&settings);

    if let Command::Countdown {
        seconds,
        no_cooldown,
    } = &cli.command
    {
        if let Some(seconds) = seconds {
            settings.paywall.cooldown.duration_secs = *seconds;
        }
        if *no_cooldown {
            settings.paywall.cooldown.enabled = false;
        }
        settings.paywall.validate()?;
    }

    let store = build_store(&cli, &settings)?;
    let cooldown = settings.paywall.cooldown.clone();
    let controller = PurchaseController::new(Arc::new(store), settings.paywall);

    let status = controller.initialize().await?;
    if status == FetchStatus::Failed {
        let snapshot = controller.snapshot().await;
        let reason = snapshot
            .last_fetch_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown error".into());
        println!("Offerings unavailable: {reason}");
    }

    match cli.command {
        Command::Offerings { json } => {
            let offerings = controller.display_offerings().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&offerings)?);
                return Ok(());
            }
            let snapshot = controller.snapshot().await;
            for offering in &offerings {
                let marker = if snapshot.selected.as_ref() == Some(&offering.id) {
                    "*"
                } else {
                    " "
                };
                let trial = if offering.has_trial { " (trial)" } else { "" };
                println!(
                    "{marker} {:<16} {:<14} {:>9} per {}{trial}",
                    offering.id, offering.plan_label, offering.display_price, offering.period
                );
            }
            let savings = controller.savings().await;
            let weekly = offerings.iter().find(|o| o.period == BillingPeriod::Week);
            if let (Some(full), Some(weekly)) = (savings.annualized_weekly, weekly) {
                println!(
                    "Weekly for a year: {}",
                    format_like(&weekly.display_price, full)
                );
            }
            println!("Lifetime saves {}%", savings.percent_saved);
            println!("Call to action: {}", controller.call_to_action().await);
        }
        Command::Purchase { offering, .. } => {
            let receipt = match offering {
                Some(id) => {
                    let id = OfferingId::new(id);
                    controller.select_offering(&id).await?;
                    controller.purchase(&id).await
                }
                None => controller.purchase_selected().await,
            }
            .context("purchase did not complete")?;
            println!(
                "Unlocked {} (transaction {})",
                receipt.offering_id, receipt.transaction_id
            );
        }
        Command::Restore { .. } => {
            let outcome = controller.restore().await.context("restore failed")?;
            if outcome.nothing_restored() {
                println!("No purchases restored");
            } else {
                println!("Purchases restored; premium access unlocked");
            }
        }
        Command::Countdown { .. } => {
            if controller.snapshot().await.subscribed {
                println!("Already subscribed; the paywall can be dismissed");
                return Ok(());
            }
            let timer = PresentationTimer::start(&cooldown);
            let mut progress = Box::pin(timer.progress(COUNTDOWN_TICK));
            while let Some(fraction) = progress.next().await {
                println!("close control {:>3.0}%", fraction * 100.0);
            }
            timer.wait_dismiss_allowed().await;
            println!("Close control available");
        }
    }

    controller.close().await;
    Ok(())
}
