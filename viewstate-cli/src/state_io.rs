//! Input arguments for reading saved view state.

use std::io::{BufReader, Read};

use clio::Input;
use tracing::debug;
use viewstate_core::TreeState;

use crate::CliError;

/// Arguments for reading a saved view state.
#[derive(Debug, clap::Args)]
pub struct StateInputArgs {
    /// Input file. Defaults to `-` for stdin.
    #[arg(value_parser, default_value = "-", help_heading = "Input")]
    pub input: Input,
}

impl StateInputArgs {
    /// Read a tree state from the input.
    pub fn get_state(&mut self) -> Result<TreeState, CliError> {
        self.get_state_with_reader(None::<&[u8]>)
    }

    /// Read a tree state, using `input_override` instead of the input
    /// argument when given.
    pub fn get_state_with_reader<R: Read>(
        &mut self,
        input_override: Option<R>,
    ) -> Result<TreeState, CliError> {
        let state = match input_override {
            Some(reader) => read_state(reader)?,
            None => read_state(&mut self.input)?,
        };
        debug!(input = %self.input.path(), "read saved state");
        Ok(state)
    }
}

/// Read a JSON tree state from a reader.
pub fn read_state<R: Read>(reader: R) -> Result<TreeState, CliError> {
    Ok(serde_json::from_reader(BufReader::new(reader))?)
}
