//! Layered YAML configuration for the matching core.
//!
//! Covers the surface an admission coordinator actually needs at boot: the
//! initial instrument list, the default self-trade-prevention mode, the
//! three latency thresholds, and which audit sinks are active. A
//! `MasterConfig` root is loaded through `parser::load_config`, checked by a
//! `ValidationReport`-returning `validator::validate_config`, with
//! `${VAR}`-style environment substitution applied before YAML parsing.

use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    pub exchange: ExchangeConfig,
    pub products: ProductsConfig,
    #[serde(default)]
    pub stp: StpConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Identification fields only; trading-hours and virtual-vs-production mode
/// belong to the dashboard/bot surface this core does not implement.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// Instruments the `ProductManager` creates a `ProductBook` for at startup.
/// Instruments are added at startup and never removed at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductsConfig {
    pub instruments: Vec<String>,
}

/// Default self-trade-prevention mode, applied to every `ProductBook` at
/// construction. Individual books may still be switched to another mode at
/// runtime; this is only the boot-time default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StpConfig {
    #[serde(default = "default_stp_mode")]
    pub mode: String,
}

impl Default for StpConfig {
    fn default() -> Self {
        Self {
            mode: default_stp_mode(),
        }
    }
}

/// The three latency thresholds: timelines breaching any of these
/// are flagged as violations by the `LatencyMonitor`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LatencyConfig {
    #[serde(rename = "threshold_e2e_ns", default = "default_e2e_threshold_ns")]
    pub threshold_e2e_ns: u64,
    #[serde(rename = "threshold_matching_ns", default = "default_matching_threshold_ns")]
    pub threshold_matching_ns: u64,
    #[serde(rename = "threshold_audit_ns", default = "default_audit_threshold_ns")]
    pub threshold_audit_ns: u64,
    #[serde(default = "default_reservoir_size")]
    pub reservoir_size: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            threshold_e2e_ns: default_e2e_threshold_ns(),
            threshold_matching_ns: default_matching_threshold_ns(),
            threshold_audit_ns: default_audit_threshold_ns(),
            reservoir_size: default_reservoir_size(),
        }
    }
}

/// Which audit sinks are active (a subset of `{file, database}`) and
/// where the file sink writes. The database sink is advisory and has no
/// further configuration here: this crate only decides whether the core
/// wires one up, not how the downstream relational sink connects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_sinks")]
    pub sinks: Vec<String>,
    #[serde(default = "default_audit_file_path")]
    pub file_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sinks: default_audit_sinks(),
            file_path: default_audit_file_path(),
        }
    }
}
