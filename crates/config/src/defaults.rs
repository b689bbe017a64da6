//! Default values for fields that may be omitted from a config file.
//!
//! Kept as free functions passed to `#[serde(default = "...")]` rather than
//! inline literals, so the same default can be reused by both `serde` and
//! `generate_default_config`.

pub fn default_stp_mode() -> String {
    "CANCEL_RESTING".to_string()
}

pub fn default_e2e_threshold_ns() -> u64 {
    1_000_000
}

pub fn default_matching_threshold_ns() -> u64 {
    100_000
}

pub fn default_audit_threshold_ns() -> u64 {
    500_000
}

pub fn default_audit_sinks() -> Vec<String> {
    vec!["file".to_string()]
}

pub fn default_audit_file_path() -> String {
    "audit.log".to_string()
}

pub fn default_reservoir_size() -> usize {
    10_000
}
