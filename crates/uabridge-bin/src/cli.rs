// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command-line surface of `uabridge`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Bridges an OPC UA server's companion-specification object types into a
/// namespace-index-independent model and keeps it current across reconnects.
#[derive(Parser, Debug)]
#[command(name = "uabridge", version = crate::VERSION, propagate_version = true)]
pub struct Cli {
    /// Bridge configuration (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "UABRIDGE_CONFIG", default_value = "uabridge.yaml")]
    pub config: PathBuf,

    /// Tracing filter, e.g. `info` or `warn,uabridge_opcua=debug`
    #[arg(short, long, global = true, env = "UABRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Shape of log lines
    #[arg(long, global = true, env = "UABRIDGE_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    #[allow(missing_docs)]
    pub command: Option<Commands>,
}

/// `uabridge` subcommands. Without one, `run` is assumed.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect, print the discovered type maps and stay connected until stopped
    ///
    /// Needs a binary built with `--features real-gateway`; without the OPC UA
    /// stack compiled in, `run` exits with a startup error.
    Run(RunArgs),
    /// Check a configuration file offline
    Validate(ValidateArgs),
    /// Print build and feature information
    Version,
}

/// Options of `uabridge run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Report format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// How often to log while the first connect is still pending ("30s", "2m")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub connect_notice: Duration,

    /// Skip the type map report
    #[arg(long)]
    pub no_print: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            connect_notice: Duration::from_secs(30),
            no_print: false,
        }
    }
}

/// Options of `uabridge validate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Also print the parsed configuration, secrets masked
    #[arg(short, long)]
    pub show_config: bool,

    /// Result format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Fail when any warning is raised
    #[arg(long)]
    pub strict: bool,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-field human readable lines
    #[default]
    Text,
    /// Newline-delimited JSON
    Json,
    /// Single-line terse output
    Compact,
}

/// Report layout for command output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented listing
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl Cli {
    /// Parses `std::env::args`.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The requested subcommand, `run` with defaults if none was given.
    pub fn effective_command(&self) -> Commands {
        match &self.command {
            Some(command) => command.clone(),
            None => Commands::Run(RunArgs::default()),
        }
    }

    /// Log filter after applying `--quiet` and `--verbose`.
    pub fn effective_log_level(&self) -> &str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, true) => "debug",
            (false, false) => &self.log_level,
        }
    }
}
