// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uabridge validate`.

use uabridge_opcua::{BridgeConfig, SecurityMode};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Loads the configuration without connecting and reports what it found.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.is_file() {
        return Err(BinError::config(format!("no such file: {}", config_path.display())));
    }

    let config = uabridge_opcua::load_config(config_path)
        .map_err(|e| BinError::from(e).with_context(format!("validating {}", config_path.display())))?;

    let warnings = collect_warnings(&config);
    let redacted = redact(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Endpoint:      {}", config.opcua.endpoint);
            println!("  Security mode: {}", config.opcua.security_mode);
            println!(
                "  Identity:      {}",
                if config.opcua.username.is_some() { "user name" } else { "anonymous" }
            );
            println!("  Namespaces:    {}", config.object_type_namespaces.len());
            for uri in &config.object_type_namespaces {
                println!("    - {}", uri);
            }
            println!("  Machine filter: {}", config.machines_filter.len());
            println!("  Retry:         {}", config.connection.strategy);

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "endpoint": config.opcua.endpoint,
                    "security_mode": config.opcua.security_mode.to_string(),
                    "anonymous": config.opcua.username.is_none(),
                    "namespaces": config.object_type_namespaces,
                    "machine_filter_count": config.machines_filter.len(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&redacted) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!("{} warning(s) with --strict", warnings.len())));
    }

    Ok(())
}

/// Settings that load but are likely unintended.
pub fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.object_type_namespaces.is_empty() {
        warnings.push("No object type namespaces configured; no types will be discovered".to_string());
    }
    if config.opcua.username.is_some() && config.opcua.security_mode == SecurityMode::None {
        warnings.push("User credentials are sent over an unencrypted channel".to_string());
    }
    if config.opcua.bypass_cert_verification {
        warnings.push("Server certificate verification is disabled".to_string());
    }
    for info in &config.namespace_information {
        if !config.object_type_namespaces.contains(&info.namespace) {
            warnings.push(format!(
                "Namespace information for {} which is not an object type namespace",
                info.namespace
            ));
        }
    }

    warnings
}

fn redact(config: &BridgeConfig) -> BridgeConfig {
    let mut redacted = config.clone();
    if redacted.opcua.password.is_some() {
        redacted.opcua.password = Some("********".to_string());
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use uabridge_opcua::OpcUaConfig;

    fn config() -> BridgeConfig {
        BridgeConfig::new(OpcUaConfig::new("opc.tcp://srv:4840")).with_namespace("http://x/UA/")
    }

    #[test]
    fn test_clean_config_has_no_warnings() {
        assert!(collect_warnings(&config()).is_empty());
    }

    #[test]
    fn test_warnings() {
        let mut config = BridgeConfig::new(OpcUaConfig::new("opc.tcp://srv:4840"));
        config.opcua.username = Some("operator".to_string());
        config.opcua.password = Some("secret".to_string());
        config.opcua.bypass_cert_verification = true;

        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 3);
        assert_eq!(redact(&config).opcua.password.as_deref(), Some("********"));
    }
}
