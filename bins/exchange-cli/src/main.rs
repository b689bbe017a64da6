//! CLI adapter over the matching core's admission coordinator.
//!
//! A thin boundary adapter: `Cli`/`Commands` parsed with `clap::Parser`,
//! logging initialized before anything else runs, then each invocation
//! loads configuration, builds one `AdmissionCoordinator`, executes a
//! single admission-API operation, and prints the result as JSON. It is a
//! runnable entry point for the crate, not the trading dashboard.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use common::{InstrumentId, Side, UserId};
use config::load_config;
use matching_core::audit::{verify_chain, AuditEvent};
use matching_core::coordinator::{AdmissionCoordinator, SubmitOrder, SubmitQuote};
use matching_core::domain::{LinkType, OrderType};
use matching_core::price::Price;
use observability::{init_logging, LogFormat};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "exchange-cli")]
#[command(about = "Boundary adapter over the matching core's admission coordinator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the master configuration file.
    #[arg(short, long, default_value = "master_config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliSide {
    Buy,
    Sell,
}

impl From<CliSide> for Side {
    fn from(value: CliSide) -> Self {
        match value {
            CliSide::Buy => Side::Buy,
            CliSide::Sell => Side::Sell,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliOrderType {
    Limit,
    Fok,
}

impl From<CliOrderType> for OrderType {
    fn from(value: CliOrderType) -> Self {
        match value {
            CliOrderType::Limit => OrderType::Limit,
            CliOrderType::Fok => OrderType::Fok,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a single limit or fill-or-kill order.
    SubmitOrder {
        #[arg(long)]
        user: String,
        #[arg(long)]
        instrument: String,
        #[arg(long, value_enum)]
        side: CliSide,
        #[arg(long)]
        price: String,
        #[arg(long)]
        volume: u32,
        #[arg(long, value_enum, default_value = "limit")]
        order_type: CliOrderType,
        /// Id of the sibling order for a one-cancels-other pair.
        #[arg(long)]
        linked_order_id: Option<String>,
    },

    /// Submit a two-sided quote (buy and sell admitted atomically).
    SubmitQuote {
        #[arg(long)]
        user: String,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        buy_price: String,
        #[arg(long)]
        buy_volume: u32,
        #[arg(long)]
        sell_price: String,
        #[arg(long)]
        sell_volume: u32,
    },

    /// Cancel a single resting order.
    CancelOrder {
        #[arg(long)]
        instrument: String,
        #[arg(long, value_enum)]
        side: CliSide,
        #[arg(long)]
        order_id: String,
    },

    /// Print the current top-of-book for an instrument.
    TopOfBook {
        #[arg(long)]
        instrument: String,
    },

    /// Replay an audit log and report whether the hash chain verifies.
    VerifyAudit {
        /// Path to a newline-delimited JSON audit log. Defaults to the
        /// configured file sink's path.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_logging("exchange-cli", LogFormat::Pretty)?;

    let cli = Cli::parse();
    info!(command = ?cli.command, "exchange-cli starting");

    let master_config = load_config(&cli.config).with_context(|| format!("loading {:?}", cli.config))?;

    match cli.command {
        Commands::SubmitOrder {
            user,
            instrument,
            side,
            price,
            volume,
            order_type,
            linked_order_id,
        } => {
            let coordinator = AdmissionCoordinator::from_config(&master_config)?;
            let link_type = if linked_order_id.is_some() { LinkType::Oco } else { LinkType::Standalone };
            let (order_id, outcome) = coordinator.submit_order(SubmitOrder {
                user: UserId::new(user)?,
                instrument: InstrumentId::new(instrument)?,
                side: side.into(),
                price: Price::from_decimal_str(&price)?,
                volume,
                order_type: order_type.into(),
                link_type,
                linked_order_id,
            })?;
            println!(
                "{}",
                serde_json::json!({
                    "orderId": order_id,
                    "status": outcome.tradable.status(),
                    "trades": outcome.trades.len(),
                })
            );
        }

        Commands::SubmitQuote {
            user,
            instrument,
            buy_price,
            buy_volume,
            sell_price,
            sell_volume,
        } => {
            let coordinator = AdmissionCoordinator::from_config(&master_config)?;
            let (buy_id, sell_id, outcome) = coordinator.submit_quote(SubmitQuote {
                user: UserId::new(user)?,
                instrument: InstrumentId::new(instrument)?,
                buy_price: Price::from_decimal_str(&buy_price)?,
                buy_volume,
                sell_price: Price::from_decimal_str(&sell_price)?,
                sell_volume,
            })?;
            println!(
                "{}",
                serde_json::json!({
                    "buyId": buy_id,
                    "sellId": sell_id,
                    "trades": outcome.trades.len(),
                })
            );
        }

        Commands::CancelOrder { instrument, side, order_id } => {
            let coordinator = AdmissionCoordinator::from_config(&master_config)?;
            let outcome = coordinator.cancel_order(&InstrumentId::new(instrument)?, side.into(), &order_id)?;
            println!(
                "{}",
                serde_json::json!({
                    "orderId": outcome.tradable.id(),
                    "status": outcome.tradable.status(),
                })
            );
        }

        Commands::TopOfBook { instrument } => {
            let coordinator = AdmissionCoordinator::from_config(&master_config)?;
            let top = coordinator.top_of_book(&InstrumentId::new(instrument)?)?;
            println!(
                "{}",
                serde_json::json!({
                    "bid": top.bid.map(|p| p.to_string()),
                    "bidVolume": top.bid_volume,
                    "ask": top.ask.map(|p| p.to_string()),
                    "askVolume": top.ask_volume,
                })
            );
        }

        Commands::VerifyAudit { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&master_config.audit.file_path));
            let content = std::fs::read_to_string(&path).with_context(|| format!("reading audit log {:?}", path))?;
            let events: Vec<AuditEvent> = content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).with_context(|| format!("parsing audit event: {line}")))
                .collect::<Result<_>>()?;

            let report = verify_chain(&events)?;
            println!(
                "{}",
                serde_json::json!({
                    "events": events.len(),
                    "valid": report.is_valid(),
                    "errors": report.errors.len(),
                })
            );
            if !report.is_valid() {
                for error in &report.errors {
                    eprintln!("offset {}: {} (expected {}, observed {})", error.offset, error.reason, error.expected, error.observed);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
