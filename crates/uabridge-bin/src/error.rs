// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Failures surfaced by the `uabridge` command line and their exit codes.

use thiserror::Error;
use uabridge_opcua::OpcUaError;

/// Result alias used by every command.
pub type BinResult<T> = Result<T, BinError>;

/// Process exit codes, one per failure family.
pub mod exit {
    /// Bad or unreadable configuration.
    pub const CONFIG: i32 = 1;
    /// The bridge could not be set up.
    pub const STARTUP: i32 = 2;
    /// Failure after startup.
    pub const RUNTIME: i32 = 3;
    /// Filesystem or stdio failure.
    pub const IO: i32 = 4;
    /// Any other bridge library failure.
    pub const BRIDGE: i32 = 5;
}

/// A command failure.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration file was rejected.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The bridge could not be started.
    #[error("startup failed: {0}")]
    Initialization(String),

    /// Failure while the bridge was running.
    #[error("bridge run failed: {0}")]
    Runtime(String),

    /// I/O failure.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the bridge library.
    #[error(transparent)]
    Bridge(#[from] OpcUaError),

    /// Another error wrapped with a description of what was being done.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted.
        context: String,
        /// Wrapped failure.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Configuration failure with `msg`.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Startup failure with `msg`.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Run-time failure with `msg`.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Wraps `self` under `context`.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strips context wrappers.
    pub fn root(&self) -> &BinError {
        let mut current = self;
        while let Self::WithContext { source, .. } = current {
            current = source;
        }
        current
    }

    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Self::Configuration(_) | Self::Bridge(OpcUaError::Configuration(_)) => exit::CONFIG,
            Self::Initialization(_) => exit::STARTUP,
            Self::Runtime(_) => exit::RUNTIME,
            Self::Io(_) => exit::IO,
            Self::Bridge(_) => exit::BRIDGE,
            Self::WithContext { .. } => exit::RUNTIME,
        }
    }
}

impl From<serde_json::Error> for BinError {
    fn from(err: serde_json::Error) -> Self {
        Self::Runtime(format!("could not encode report: {}", err))
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Writes `error`, its causes and any recovery hints to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("uabridge: {}", error);

    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        eprintln!("    because: {}", inner);
        cause = inner.source();
    }

    if let BinError::Bridge(bridge) = error.root() {
        eprintln!("    code: {}", bridge.error_code());
        for hint in bridge.recovery_hints() {
            eprintln!("    try: {}", hint);
        }
    }
}

/// Reports `error` and terminates the process with its exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(BinError::config("no endpoint").to_string(), "invalid configuration: no endpoint");
        assert_eq!(
            BinError::from(OpcUaError::not_connected()).to_string(),
            OpcUaError::not_connected().to_string()
        );
    }

    #[test]
    fn test_context_keeps_exit_code() {
        let err = BinError::config("bad port")
            .with_context("loading bridge.yaml")
            .with_context("run");
        assert_eq!(err.to_string(), "run: loading bridge.yaml: invalid configuration: bad port");
        assert_eq!(err.exit_code(), exit::CONFIG);
        assert!(matches!(err.root(), BinError::Configuration(_)));
    }

    #[test]
    fn test_exit_codes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(BinError::init("x").exit_code(), exit::STARTUP);
        assert_eq!(BinError::runtime("x").exit_code(), exit::RUNTIME);
        assert_eq!(BinError::from(io).exit_code(), exit::IO);
        assert_eq!(BinError::from(OpcUaError::not_connected()).exit_code(), exit::BRIDGE);
    }
}
