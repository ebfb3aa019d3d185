// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uabridge version`.

use crate::cli::{Cli, OutputFormat};
use crate::error::BinResult;

/// Prints crate versions, target and compiled-in features.
pub fn version(_cli: &Cli) -> BinResult<()> {
    print!("{}", render(OutputFormat::Text)?);
    Ok(())
}

fn gateway_feature() -> &'static str {
    if cfg!(feature = "real-gateway") {
        "opcua"
    } else {
        "none"
    }
}

fn render(format: OutputFormat) -> BinResult<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "uabridge": crate::VERSION,
            "uabridge_opcua": uabridge_opcua::VERSION,
            "target": format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
            "gateway": gateway_feature(),
        }))?,
        OutputFormat::Text => format!(
            "uabridge {}\n  library  uabridge-opcua {}\n  target   {}-{}\n  gateway  {}\n",
            crate::VERSION,
            uabridge_opcua::VERSION,
            std::env::consts::ARCH,
            std::env::consts::OS,
            gateway_feature(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_names_both_crates() {
        let text = render(OutputFormat::Text).unwrap();
        assert!(text.starts_with(&format!("uabridge {}", crate::VERSION)));
        assert!(text.contains("uabridge-opcua"));

        let json: serde_json::Value = serde_json::from_str(&render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["uabridge_opcua"], uabridge_opcua::VERSION);
    }
}
