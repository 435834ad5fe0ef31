use crate::{
    api::{self, AppState},
    cli::telemetry,
    crypto::{Blake3Hasher, Ed25519Key, Ed25519Verifier, OsNoncer},
    encoding::{Base64TokenEncoder, Rfc3339Timestamper},
    interfaces::SigningKey,
    server::{AuthConfig, AuthCrypto, AuthEncoding, AuthServer, AuthStores},
    storage::{
        MemoryChallengeStore, MemoryRegistry, MemoryTimeLockStore, PostgresChallengeStore,
        PostgresRegistry, PostgresTimeLockStore, postgres,
    },
};
use anyhow::{Context, Result, anyhow};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

const ACCESS_KEY_HASHES: &str = "access key hash";

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub config: AuthConfig,
    pub attributes: Value,
    pub access_key_seed: Option<SecretString>,
    pub response_key_seed: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a key seed is invalid, the registry cannot be reached, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let access_key = signing_key("access", args.access_key_seed.as_ref())?;
    let response_key = signing_key("response", args.response_key_seed.as_ref())?;
    info!(
        access_identity = %access_key.identity(),
        response_identity = %response_key.identity(),
        "Signing keys loaded"
    );

    let (stores, pool) = stores(args.dsn.as_deref()).await?;

    let server = AuthServer::new(
        args.config,
        AuthCrypto {
            hasher: Arc::new(Blake3Hasher),
            noncer: Arc::new(OsNoncer),
            verifier: Arc::new(Ed25519Verifier),
            access_key: Arc::new(access_key),
            response_key: Arc::new(response_key),
        },
        AuthEncoding {
            timestamper: Arc::new(Rfc3339Timestamper),
            token_encoder: Arc::new(Base64TokenEncoder),
        },
        stores,
    );

    let mut state = AppState::new(Arc::new(server)).with_attributes(args.attributes);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }

    let served = api::new(args.port, state).await;
    telemetry::shutdown_tracer();
    served
}

async fn stores(dsn: Option<&str>) -> Result<(AuthStores, Option<PgPool>)> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, registry and nonce stores are kept in memory");
        let stores = AuthStores {
            registry: Arc::new(MemoryRegistry::new()),
            challenge_nonces: Arc::new(MemoryChallengeStore::new()),
            access_key_hashes: Arc::new(MemoryTimeLockStore::new(ACCESS_KEY_HASHES)),
        };
        return Ok((stores, None));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    postgres::migrate(&pool)
        .await
        .context("Failed to prepare registry schema")?;

    let stores = AuthStores {
        registry: Arc::new(PostgresRegistry::new(pool.clone())),
        challenge_nonces: Arc::new(PostgresChallengeStore::new(pool.clone())),
        access_key_hashes: Arc::new(PostgresTimeLockStore::new(pool.clone(), ACCESS_KEY_HASHES)),
    };
    Ok((stores, Some(pool)))
}

fn signing_key(name: &str, seed: Option<&SecretString>) -> Result<Ed25519Key> {
    let Some(seed) = seed else {
        warn!("No {name} key seed configured, generating an ephemeral key");
        return Ok(Ed25519Key::generate());
    };

    let bytes = Base64::decode_vec(seed.expose_secret().trim())
        .map_err(|err| anyhow!("Invalid {name} key seed: {err}"))?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Invalid {name} key seed: expected 32 bytes, got {}", bytes.len()))?;
    Ok(Ed25519Key::from_seed(&seed))
}

fn log_startup_args(args: &Args) {
    let config = &args.config;
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "registry",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        (
            "access_lifetime",
            format!("{}s", config.access_lifetime().as_secs()),
        ),
        (
            "refresh_lifetime",
            format!("{}s", config.refresh_lifetime().as_secs()),
        ),
        (
            "challenge_lifetime",
            format!("{}s", config.challenge_lifetime().as_secs()),
        ),
        (
            "access_window",
            format!("{}s", config.access_window().as_secs()),
        ),
        (
            "store_timeout",
            format!("{}ms", config.store_timeout().as_millis()),
        ),
        ("identity_policy", config.identity_policy().to_string()),
        (
            "access_key_seed_set",
            args.access_key_seed.is_some().to_string(),
        ),
        (
            "response_key_seed_set",
            args.response_key_seed.is_some().to_string(),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    let short_hash = crate::GIT_COMMIT_HASH.trim().get(..7).unwrap_or("unknown");
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

const BANNER: &str = r"
  o--o--o--o--o
  C A D E N A {VERSION}";
