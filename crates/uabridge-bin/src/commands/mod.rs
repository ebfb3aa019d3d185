// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subcommand handlers.

mod run;
mod validate;
mod version;

pub use run::run;
pub use validate::validate;
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Dispatches the parsed command line to its handler.
pub async fn execute(cli: Cli) -> BinResult<()> {
    let command = cli.effective_command();
    tracing::debug!(?command, config = %cli.config.display(), "Dispatching");

    match command {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Validate(args) => validate(&cli, args),
        Commands::Version => version(&cli),
    }
}
