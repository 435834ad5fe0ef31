use crate::{
    cli::{
        actions::{Action, server::Args},
        commands::{identity, keys, session},
    },
    encoding::{DerivationContext, IdentityPolicy},
    server::AuthConfig,
};
use anyhow::{Context, Result, ensure};
use secrecy::SecretString;
use serde_json::Value;
use std::time::Duration;

fn seconds(matches: &clap::ArgMatches, id: &str) -> Result<Duration> {
    matches
        .get_one::<u64>(id)
        .copied()
        .map(Duration::from_secs)
        .with_context(|| format!("missing required argument: --{id}"))
}

fn string(matches: &clap::ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

fn config(matches: &clap::ArgMatches) -> Result<AuthConfig> {
    let access_lifetime = seconds(matches, session::ARG_ACCESS_LIFETIME)?;
    let refresh_lifetime = seconds(matches, session::ARG_REFRESH_LIFETIME)?;
    ensure!(
        access_lifetime <= refresh_lifetime,
        "--{} must not exceed --{}",
        session::ARG_ACCESS_LIFETIME,
        session::ARG_REFRESH_LIFETIME
    );

    let store_timeout = matches
        .get_one::<u64>(session::ARG_STORE_TIMEOUT)
        .copied()
        .map(Duration::from_millis)
        .context("missing required argument: --store-timeout-ms")?;

    let policy = matches
        .get_one::<IdentityPolicy>(identity::ARG_IDENTITY_POLICY)
        .copied()
        .unwrap_or_default();

    Ok(AuthConfig::new()
        .with_access_lifetime(access_lifetime)
        .with_refresh_lifetime(refresh_lifetime)
        .with_challenge_lifetime(seconds(matches, session::ARG_CHALLENGE_LIFETIME)?)
        .with_access_window(seconds(matches, session::ARG_ACCESS_WINDOW)?)
        .with_store_timeout(store_timeout)
        .with_identity_policy(policy)
        .with_derivation_context(DerivationContext {
            device: string(matches, identity::ARG_DEVICE_CONTEXT),
            identity: string(matches, identity::ARG_IDENTITY_CONTEXT),
        }))
}

/// # Errors
/// Returns an error if arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();

    let attributes: Value = serde_json::from_str(&string(matches, session::ARG_ATTRIBUTES))
        .context("--session-attributes must be JSON")?;
    ensure!(
        attributes.is_object(),
        "--session-attributes must be a JSON object"
    );

    let secret = |id: &str| {
        matches
            .get_one::<String>(id)
            .map(|value| SecretString::from(value.clone()))
    };

    Ok(Action::Server(Args {
        port,
        dsn,
        config: config(matches)?,
        attributes,
        access_key_seed: secret(keys::ARG_ACCESS_KEY_SEED),
        response_key_seed: secret(keys::ARG_RESPONSE_KEY_SEED),
    }))
}
