use crate::*;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Exchange name is required")]
    MissingExchangeName,

    #[error("Exchange description is required")]
    MissingExchangeDescription,

    #[error("Invalid version format: {0}. Must be in format X.Y.Z (e.g., 1.0.0)")]
    InvalidVersionFormat(String),

    #[error("No instruments configured; the product manager needs at least one at startup")]
    NoProducts,

    #[error("Invalid instrument id '{0}': must match [a-zA-Z0-9.]{{1,5}}")]
    InvalidInstrumentId(String),

    #[error("Duplicate instrument id '{0}' in products.instruments")]
    DuplicateInstrumentId(String),

    #[error("Invalid stp.mode '{0}': must be one of ALLOW, CANCEL_INCOMING, CANCEL_RESTING, CANCEL_BOTH")]
    InvalidStpMode(String),

    #[error("latency.{field} must be a positive integer, got {value}")]
    InvalidLatencyThreshold { field: String, value: i64 },

    #[error("audit.sinks entry '{0}' is not one of the supported sinks: file, database")]
    InvalidAuditSink(String),

    #[error("audit.sinks must not be empty; the file sink is the chain's source of truth")]
    NoAuditSinks,

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_exchange(&config.exchange, &mut report);
    validate_products(&config.products, &mut report);
    validate_stp(&config.stp, &mut report);
    validate_latency(&config.latency, &mut report);
    validate_audit(&config.audit, &mut report);

    report
}

fn validate_exchange(exchange: &ExchangeConfig, report: &mut ValidationReport) {
    if exchange.name.is_empty() {
        report.add_error(ValidationError::MissingExchangeName);
    }

    if exchange.description.is_empty() {
        report.add_error(ValidationError::MissingExchangeDescription);
    }

    let version_regex = Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
    if !version_regex.is_match(&exchange.version) {
        report.add_error(ValidationError::InvalidVersionFormat(exchange.version.clone()));
    }
}

fn validate_products(products: &ProductsConfig, report: &mut ValidationReport) {
    if products.instruments.is_empty() {
        report.add_error(ValidationError::NoProducts);
        return;
    }

    let instrument_regex = Regex::new(r"^[a-zA-Z0-9.]{1,5}$").unwrap();
    let mut seen = std::collections::HashSet::new();
    for instrument in &products.instruments {
        if !instrument_regex.is_match(instrument) {
            report.add_error(ValidationError::InvalidInstrumentId(instrument.clone()));
        }
        if !seen.insert(instrument.clone()) {
            report.add_error(ValidationError::DuplicateInstrumentId(instrument.clone()));
        }
    }
}

fn validate_stp(stp: &StpConfig, report: &mut ValidationReport) {
    let valid_modes = ["ALLOW", "CANCEL_INCOMING", "CANCEL_RESTING", "CANCEL_BOTH"];
    if !valid_modes.contains(&stp.mode.as_str()) {
        report.add_error(ValidationError::InvalidStpMode(stp.mode.clone()));
    }
}

fn validate_latency(latency: &LatencyConfig, report: &mut ValidationReport) {
    if latency.threshold_e2e_ns == 0 {
        report.add_error(ValidationError::InvalidLatencyThreshold {
            field: "threshold_e2e_ns".to_string(),
            value: latency.threshold_e2e_ns as i64,
        });
    }
    if latency.threshold_matching_ns == 0 {
        report.add_error(ValidationError::InvalidLatencyThreshold {
            field: "threshold_matching_ns".to_string(),
            value: latency.threshold_matching_ns as i64,
        });
    }
    if latency.threshold_audit_ns == 0 {
        report.add_error(ValidationError::InvalidLatencyThreshold {
            field: "threshold_audit_ns".to_string(),
            value: latency.threshold_audit_ns as i64,
        });
    }
    if latency.threshold_matching_ns >= latency.threshold_e2e_ns {
        report.add_warning(
            "latency.threshold_matching_ns",
            "matching threshold should be smaller than the end-to-end threshold",
        );
    }
}

fn validate_audit(audit: &AuditConfig, report: &mut ValidationReport) {
    if audit.sinks.is_empty() {
        report.add_error(ValidationError::NoAuditSinks);
        return;
    }
    let valid_sinks = ["file", "database"];
    for sink in &audit.sinks {
        if !valid_sinks.contains(&sink.as_str()) {
            report.add_error(ValidationError::InvalidAuditSink(sink.clone()));
        }
    }
    if !audit.sinks.iter().any(|s| s == "file") {
        report.add_warning(
            "audit.sinks",
            "no file sink configured; the file log is the chain's source of truth",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> MasterConfig {
        crate::parser::generate_default_config()
    }

    #[test]
    fn default_config_is_valid() {
        let report = validate_config(&base_config());
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn empty_products_is_rejected() {
        let mut config = base_config();
        config.products.instruments.clear();
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn malformed_instrument_id_is_rejected() {
        let mut config = base_config();
        config.products.instruments.push("TOOLONGID".to_string());
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn unknown_stp_mode_is_rejected() {
        let mut config = base_config();
        config.stp.mode = "PANIC".to_string();
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn zero_latency_threshold_is_rejected() {
        let mut config = base_config();
        config.latency.threshold_matching_ns = 0;
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn missing_file_sink_warns_but_does_not_fail() {
        let mut config = base_config();
        config.audit.sinks = vec!["database".to_string()];
        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }
}
