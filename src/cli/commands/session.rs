use clap::{Arg, Command};

pub const ARG_ACCESS_LIFETIME: &str = "access-lifetime-seconds";
pub const ARG_REFRESH_LIFETIME: &str = "refresh-lifetime-seconds";
pub const ARG_CHALLENGE_LIFETIME: &str = "challenge-lifetime-seconds";
pub const ARG_ACCESS_WINDOW: &str = "access-window-seconds";
pub const ARG_STORE_TIMEOUT: &str = "store-timeout-ms";
pub const ARG_ATTRIBUTES: &str = "session-attributes";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_LIFETIME)
                .long(ARG_ACCESS_LIFETIME)
                .help("Access token lifetime in seconds")
                .env("CADENA_ACCESS_LIFETIME_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_LIFETIME)
                .long(ARG_REFRESH_LIFETIME)
                .help("Session refresh ceiling in seconds, counted from login")
                .env("CADENA_REFRESH_LIFETIME_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CHALLENGE_LIFETIME)
                .long(ARG_CHALLENGE_LIFETIME)
                .help("Login challenge lifetime in seconds")
                .env("CADENA_CHALLENGE_LIFETIME_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ACCESS_WINDOW)
                .long(ARG_ACCESS_WINDOW)
                .help("Accepted clock skew for access request timestamps, in seconds")
                .env("CADENA_ACCESS_WINDOW_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT)
                .long(ARG_STORE_TIMEOUT)
                .help("Deadline for each registry or nonce store call, in milliseconds")
                .env("CADENA_STORE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ATTRIBUTES)
                .long(ARG_ATTRIBUTES)
                .help("JSON object stamped into every access token")
                .env("CADENA_SESSION_ATTRIBUTES")
                .default_value("{}"),
        )
}
