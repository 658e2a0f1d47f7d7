//! The `viewstate` command line tool.

use clap::Parser as _;
use tracing::error;
use viewstate_cli::CliArgs;

fn main() {
    let mut args = CliArgs::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(args.verbosity().tracing_level_filter())
        .with_target(false)
        .without_time()
        .init();

    let result = match &mut args {
        CliArgs::Validate(args) => args.run(),
        CliArgs::Describe(args) => args.run_describe(),
        _ => Err(anyhow::anyhow!("Unknown command")),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}
