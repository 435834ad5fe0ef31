use clap::{Arg, Command};

pub const ARG_ACCESS_KEY_SEED: &str = "access-key-seed";
pub const ARG_RESPONSE_KEY_SEED: &str = "response-key-seed";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_KEY_SEED)
                .long(ARG_ACCESS_KEY_SEED)
                .help("Base64 Ed25519 seed for the token-signing key")
                .long_help(
                    "Base64 (standard alphabet) encoding of a 32-byte Ed25519 seed. A fresh key is generated when absent, which invalidates outstanding tokens on restart.",
                )
                .env("CADENA_ACCESS_KEY_SEED")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_RESPONSE_KEY_SEED)
                .long(ARG_RESPONSE_KEY_SEED)
                .help("Base64 Ed25519 seed for the response-signing key")
                .env("CADENA_RESPONSE_KEY_SEED")
                .hide_env_values(true),
        )
}
