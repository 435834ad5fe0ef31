use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Parse arguments, install telemetry, and build the action to run.
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(
        commands::logging::level(&matches),
        commands::logging::format(&matches),
    )?;

    dispatch::handler(&matches)
}
