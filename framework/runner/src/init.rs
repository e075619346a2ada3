use crate::cli::ScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the Stampede runner.
pub fn init() -> ScenarioCli {
    env_logger::init();

    ScenarioCli::parse()
}
