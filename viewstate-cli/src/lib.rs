//! Command line tools for saved view state, used by the `viewstate` binary.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use thiserror::Error;
use viewstate_core::saved::StateValidationError;

pub mod describe;
pub mod state_io;
pub mod validate;

/// CLI arguments.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Saved view state tools.")]
#[non_exhaustive]
pub enum CliArgs {
    /// Validate a saved view state.
    Validate(validate::ValArgs),
    /// Describe the contents of a saved view state.
    Describe(describe::DescribeArgs),
}

impl CliArgs {
    /// The verbosity requested for the subcommand.
    #[must_use]
    pub fn verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            CliArgs::Validate(args) => &args.verbose,
            CliArgs::Describe(args) => &args.verbose,
        }
    }
}

/// Error type for the CLI.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// Error reading input.
    #[error("Error reading from path: {0}")]
    InputFile(#[from] std::io::Error),
    /// Error parsing input.
    #[error("Error parsing input: {0}")]
    Parse(#[from] serde_json::Error),
    /// The saved state is malformed.
    #[error(transparent)]
    Invalid(#[from] StateValidationError),
}
