use crate::encoding::IdentityPolicy;
use clap::{Arg, Command};

pub const ARG_IDENTITY_POLICY: &str = "identity-policy";
pub const ARG_DEVICE_CONTEXT: &str = "device-context";
pub const ARG_IDENTITY_CONTEXT: &str = "identity-context";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_POLICY)
                .long(ARG_IDENTITY_POLICY)
                .help("How account identities are chosen")
                .long_help(
                    "self-certifying: the client derives the identity from its first keys and the server checks it. issuer-assigned: the server assigns a ULID when the request carries no identity.",
                )
                .env("CADENA_IDENTITY_POLICY")
                .default_value("self-certifying")
                .value_parser(|value: &str| value.parse::<IdentityPolicy>()),
        )
        .arg(
            Arg::new(ARG_DEVICE_CONTEXT)
                .long(ARG_DEVICE_CONTEXT)
                .help("Domain-separation string mixed into device derivations")
                .env("CADENA_DEVICE_CONTEXT")
                .default_value(""),
        )
        .arg(
            Arg::new(ARG_IDENTITY_CONTEXT)
                .long(ARG_IDENTITY_CONTEXT)
                .help("Domain-separation string mixed into identity derivations")
                .env("CADENA_IDENTITY_CONTEXT")
                .default_value(""),
        )
}
