//! The `describe` subcommand.

use std::io::{Read, Write};

use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use clio::Output;
use itertools::Itertools as _;
use serde::Serialize;
use viewstate_core::saved::{StateSummary, StateValidationError};

use crate::CliError;
use crate::state_io::StateInputArgs;

/// Describe the contents of a saved view state.
#[derive(Parser, Debug)]
#[clap(version = "1.0", long_about = None)]
#[clap(about = "Describe the contents of a saved view state.")]
#[non_exhaustive]
pub struct DescribeArgs {
    /// State input.
    #[command(flatten)]
    pub input_args: StateInputArgs,
    /// Output in JSON format.
    #[arg(long, default_value_t = false, help_heading = "Output")]
    pub json: bool,
    /// Output file. Use '-' for stdout.
    #[clap(short, long, value_parser, default_value = "-", help_heading = "Output")]
    pub output: Output,
    /// Verbosity.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// The JSON form of a description.
#[derive(Debug, Serialize)]
struct StateDescription {
    #[serde(flatten)]
    summary: StateSummary,
    /// The validation error, if the state is malformed.
    error: Option<String>,
}

impl DescribeArgs {
    /// Describe the state read from the input argument, writing to the
    /// output argument.
    pub fn run_describe(&mut self) -> Result<()> {
        self.run_describe_with_io(None::<&[u8]>, None::<Vec<u8>>)
    }

    /// Describe the saved state.
    ///
    /// The description is written even when the state turns out to be
    /// malformed; the validation error is returned afterwards.
    ///
    /// # Arguments
    ///
    /// * `input_override` - Optional reader to use instead of the CLI input argument.
    /// * `output_override` - Optional writer to use instead of the CLI output argument.
    pub fn run_describe_with_io<R: Read, W: Write>(
        &mut self,
        input_override: Option<R>,
        mut output_override: Option<W>,
    ) -> Result<()> {
        let state = self.input_args.get_state_with_reader(input_override)?;
        let validation = state.validate();
        let summary = state.summary();

        let writer: &mut dyn Write = match output_override.as_mut() {
            Some(w) => w,
            None => &mut self.output,
        };
        if self.json {
            write_json(summary, validation.as_ref().err(), writer)?;
        } else {
            write_description(&summary, validation.as_ref().err(), writer)?;
        }
        validation.map_err(CliError::from)?;
        Ok(())
    }
}

fn write_json(
    summary: StateSummary,
    error: Option<&StateValidationError>,
    writer: &mut dyn Write,
) -> Result<()> {
    let description = StateDescription {
        summary,
        error: error.map(ToString::to_string),
    };
    serde_json::to_writer_pretty(&mut *writer, &description)?;
    writeln!(writer)?;
    Ok(())
}

fn write_description(
    summary: &StateSummary,
    error: Option<&StateValidationError>,
    writer: &mut dyn Write,
) -> Result<()> {
    writeln!(
        writer,
        "Saved state holds {} nodes: {} full, {} delta, {} unchanged",
        summary.nodes, summary.full_nodes, summary.delta_nodes, summary.unchanged_nodes
    )?;
    writeln!(writer, "Facets: {}", summary.facets)?;
    writeln!(
        writer,
        "Properties: {} ({} deletions)",
        summary.properties, summary.deletions
    )?;
    if summary.holder_types.is_empty() {
        writeln!(writer, "Holder types: none")?;
    } else {
        writeln!(
            writer,
            "Holder types: {}",
            summary.holder_types.iter().join(", ")
        )?;
    }
    if let Some(error) = error {
        writeln!(writer, "Invalid: {error}")?;
    }
    Ok(())
}
