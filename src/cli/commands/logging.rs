use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{fmt, str::FromStr};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";
pub const ARG_LOG_FORMAT: &str = "log-format";

/// Log line rendering: `pretty` for terminals, `json` for collectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected pretty or json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

fn parse_level(value: &str) -> Result<Level, String> {
    value
        .parse::<Level>()
        .map_err(|_| format!("unknown log level '{value}'"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Raise verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE (default: ERROR)")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long("log-level")
                .help("Log level (error, warn, info, debug, trace); overrides -v")
                .env("CADENA_LOG_LEVEL")
                .global(true)
                .value_parser(parse_level),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long("log-format")
                .help("Log output format: pretty or json")
                .env("CADENA_LOG_FORMAT")
                .default_value("pretty")
                .global(true)
                .value_parser(LogFormat::from_str),
        )
}

/// The configured level: `--log-level` when given, otherwise the `-v` count.
/// `None` leaves the default of ERROR.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    if let Some(level) = matches.get_one::<Level>(ARG_LOG_LEVEL) {
        return Some(*level);
    }

    match matches.get_count(ARG_VERBOSITY) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn format(matches: &ArgMatches) -> LogFormat {
    matches
        .get_one::<LogFormat>(ARG_LOG_FORMAT)
        .copied()
        .unwrap_or_default()
}
