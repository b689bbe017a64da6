use crate::validator::validate_config;
use crate::*;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MasterConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    let substituted = substitution::substitute_env_vars(&content)?;
    debug!("Environment variable substitution completed");

    let config: MasterConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "configuration warning");
    }
    if !report.is_valid() {
        let messages: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow!("configuration at {:?} failed validation: {}", path, messages.join("; ")));
    }

    info!("Configuration loaded successfully");
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> MasterConfig {
    MasterConfig {
        exchange: ExchangeConfig {
            name: "OpenExchange".to_string(),
            description: "Continuous double-auction matching engine".to_string(),
            version: "1.0.0".to_string(),
        },
        products: ProductsConfig {
            instruments: vec!["AAPL".to_string(), "MSFT".to_string(), "GOOG".to_string()],
        },
        stp: StpConfig::default(),
        latency: LatencyConfig::default(),
        audit: AuditConfig::default(),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &MasterConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = generate_default_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: MasterConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.products.instruments, config.products.instruments);
        assert!(validate_config(&parsed).is_valid());
    }

    #[test]
    fn load_config_substitutes_environment_variables() {
        std::env::set_var("OPENX_TEST_STP_MODE", "CANCEL_BOTH");
        let dir = std::env::temp_dir().join(format!("openx-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            r#"
exchange:
  name: Test Exchange
  description: test
  version: 1.0.0
products:
  instruments: ["AAPL"]
stp:
  mode: ${OPENX_TEST_STP_MODE}
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.stp.mode, "CANCEL_BOTH");
        std::env::remove_var("OPENX_TEST_STP_MODE");
    }

    #[test]
    fn load_config_rejects_a_file_that_fails_validation() {
        let dir = std::env::temp_dir().join(format!("openx-config-test-invalid-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            r#"
exchange:
  name: Test Exchange
  description: test
  version: 1.0.0
products:
  instruments: []
"#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("failed validation"));
    }
}
