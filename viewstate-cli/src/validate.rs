//! The `validate` subcommand.

use std::io::Read;

use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::info;

use crate::CliError;
use crate::state_io::StateInputArgs;

/// Validate a saved view state.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Validate a saved view state.")]
#[non_exhaustive]
pub struct ValArgs {
    /// State input.
    #[command(flatten)]
    pub input_args: StateInputArgs,
    /// Verbosity.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// String to print when validation is successful.
pub const VALID_PRINT: &str = "State valid!";

impl ValArgs {
    /// Validate the saved state.
    ///
    /// # Arguments
    ///
    /// * `input_override` - Optional reader to use instead of the CLI input argument.
    pub fn run_with_input<R: Read>(&mut self, input_override: Option<R>) -> Result<()> {
        let state = self.input_args.get_state_with_reader(input_override)?;
        state.validate().map_err(CliError::from)?;
        info!("{VALID_PRINT}");
        Ok(())
    }

    /// Validate the saved state read from the input argument.
    pub fn run(&mut self) -> Result<()> {
        self.run_with_input(None::<&[u8]>)
    }
}
