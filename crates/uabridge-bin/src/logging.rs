// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tracing subscriber setup for the `uabridge` process.

use std::io::IsTerminal;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::cli::LogFormat;

/// Per-target caps applied on top of the chosen level.
const QUIET_TARGETS: &[&str] = &["opcua=warn", "tokio=info"];

/// Level used when neither `RUST_LOG` nor the requested level parses.
const FALLBACK_LEVEL: &str = "info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    tracing_subscriber::registry()
        .with(output_layer(format))
        .with(build_filter(level))
        .init();
}

fn output_layer(format: LogFormat) -> BoxedLayer {
    let ansi = std::io::stdout().is_terminal();

    match format {
        LogFormat::Text => fmt::layer().with_ansi(ansi).with_target(true).boxed(),
        // One object per line for log shippers.
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(ansi).with_target(false).boxed(),
    }
}

fn build_filter(level: &str) -> EnvFilter {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL)),
    };

    QUIET_TARGETS
        .iter()
        .filter_map(|target| target.parse::<Directive>().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_targets_are_valid_directives() {
        assert!(QUIET_TARGETS.iter().all(|t| t.parse::<Directive>().is_ok()));
    }

    #[test]
    fn test_bad_level_does_not_panic() {
        let _ = build_filter("][");
        let _ = build_filter("warn,uabridge_opcua::client=trace");
    }
}
