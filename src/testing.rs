//! Test fixtures: a controllable clock, an in-memory engine, and a
//! simulated client device that walks its key chains.

use crate::{
    crypto::{Blake3Hasher, Ed25519Key, Ed25519Verifier, OsNoncer},
    encoding::{
        Base64TokenEncoder, Derivation, DerivationContext,
        timestamper::{format_rfc3339, parse_rfc3339},
    },
    error::Result,
    interfaces::{Hasher, Noncer, SigningKey, Timestamper, TokenEncoder, Verifier},
    messages::{
        AccessContext, AccessKeys, AccessPayload, AccessRequest, ChangeRecoveryKeyAuthentication,
        ChangeRecoveryKeyRequest, ClientRequest, CreateAccountAuthentication, CreateAccountRequest,
        CreateAccountResponse, CreateSessionAuthentication, CreateSessionRequest,
        DeleteAccountRequest, DeviceAuthentication, LinkDeviceRequest, RecoverAccountAuthentication,
        RecoverAccountRequest, RefreshAccess, RefreshSessionRequest, RequestSessionAuthentication,
        RequestSessionRequest, RequestSessionResponse, RotateDeviceRequest, ServerResponse,
        SessionResponse, SignedMessage, UnlinkDeviceRequest, UnlinkTarget,
    },
    server::{AuthConfig, AuthCrypto, AuthEncoding, AuthServer, AuthStores},
    storage::{MemoryChallengeStore, MemoryRegistry, MemoryTimeLockStore, MemoryVerificationKeyStore},
    verifier::AccessVerifier,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU16, Ordering},
    },
    time::Duration,
};
use time::{OffsetDateTime, macros::datetime};

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub(crate) fn starting_at(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Timestamper for ManualClock {
    fn now(&self) -> OffsetDateTime {
        Self::now(self)
    }

    fn format(&self, when: OffsetDateTime) -> String {
        format_rfc3339(when)
    }

    fn parse(&self, value: &str) -> Result<OffsetDateTime> {
        parse_rfc3339(value)
    }
}

const ACCESS_KEY_SEED: [u8; 32] = [200u8; 32];
const RESPONSE_KEY_SEED: [u8; 32] = [201u8; 32];

const AUTHENTICATION_CHAIN: u8 = 1;
const ACCESS_CHAIN: u8 = 2;
const RECOVERY_CHAIN: u8 = 3;

fn chain_key(chain: u8, client: u16, session: u16, index: u32) -> Ed25519Key {
    let mut seed = [0u8; 32];
    seed[0] = chain;
    seed[1..3].copy_from_slice(&client.to_be_bytes());
    seed[3..5].copy_from_slice(&session.to_be_bytes());
    seed[5..9].copy_from_slice(&index.to_be_bytes());
    Ed25519Key::from_seed(&seed)
}

fn commitment(key: &Ed25519Key) -> String {
    Blake3Hasher.sum(key.public().as_bytes())
}

/// A request on its way out, with the nonce the response must echo.
#[derive(Clone, Debug)]
pub(crate) struct Sent {
    pub nonce: String,
    pub message: String,
}

async fn send<T: Serialize>(request: T, key: Option<&Ed25519Key>) -> Result<Sent> {
    let nonce = OsNoncer.generate_128()?;
    let mut envelope = ClientRequest::from_request(nonce.clone(), request)?;
    if let Some(key) = key {
        envelope.sign(key).await?;
    }
    Ok(Sent {
        nonce,
        message: envelope.to_json()?,
    })
}

/// In-memory engine plus a verifier trusting its access key.
pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub server: Arc<AuthServer>,
    pub verifier: AccessVerifier,
    pub registry: Arc<MemoryRegistry>,
    clients: AtomicU16,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    pub(crate) fn with_config(config: AuthConfig) -> Self {
        let clock = Arc::new(ManualClock::starting_at(datetime!(2026-01-01 00:00:00 UTC)));
        let registry = Arc::new(MemoryRegistry::new());
        let access_key = Arc::new(Ed25519Key::from_seed(&ACCESS_KEY_SEED));
        let keys = MemoryVerificationKeyStore::with_key(access_key.identity(), access_key.public());
        let window = config.access_window();

        let server = Arc::new(AuthServer::new(
            config,
            AuthCrypto {
                hasher: Arc::new(Blake3Hasher),
                noncer: Arc::new(OsNoncer),
                verifier: Arc::new(Ed25519Verifier),
                access_key,
                response_key: Arc::new(Ed25519Key::from_seed(&RESPONSE_KEY_SEED)),
            },
            AuthEncoding {
                timestamper: clock.clone(),
                token_encoder: Arc::new(Base64TokenEncoder),
            },
            AuthStores {
                registry: registry.clone(),
                challenge_nonces: Arc::new(MemoryChallengeStore::new()),
                access_key_hashes: Arc::new(MemoryTimeLockStore::new("access key hash")),
            },
        ));
        let verifier = AccessVerifier::new(
            Arc::new(Ed25519Verifier),
            clock.clone(),
            Arc::new(Base64TokenEncoder),
            Arc::new(MemoryTimeLockStore::new("access nonce")),
            Arc::new(keys),
        )
        .with_window(window);

        Self {
            clock,
            server,
            verifier,
            registry,
            clients: AtomicU16::new(0),
        }
    }

    pub(crate) fn crypto_verifier(&self) -> Arc<dyn Verifier> {
        Arc::new(Ed25519Verifier)
    }

    pub(crate) fn token_encoder(&self) -> Arc<dyn TokenEncoder> {
        Arc::new(Base64TokenEncoder)
    }

    fn derivation_context(&self) -> &DerivationContext {
        self.server.config().derivation_context()
    }

    /// Check the response envelope and return its body.
    pub(crate) fn accept<T: DeserializeOwned>(&self, sent: &Sent, response: &str) -> Result<T> {
        let response: ServerResponse<T> = SignedMessage::parse(response)?;
        response.verify_response(&Ed25519Verifier, &self.server.response_public_key(), &sent.nonce)?;
        Ok(response.into_payload().response)
    }

    /// A fresh device with its own key chains and a self-certified identity.
    pub(crate) fn device(&self) -> ClientDevice {
        let client = self.clients.fetch_add(1, Ordering::Relaxed);
        let context = self.derivation_context();
        let hasher = Blake3Hasher;
        let derivation = Derivation::new(&hasher, context);
        let first = chain_key(AUTHENTICATION_CHAIN, client, 0, 0);
        let second = chain_key(AUTHENTICATION_CHAIN, client, 0, 1);
        let device = derivation.device(&first.public(), &commitment(&second));
        let recovery = chain_key(RECOVERY_CHAIN, client, 0, 0);
        let identity =
            derivation.identity(&first.public(), &commitment(&second), &commitment(&recovery));

        ClientDevice {
            client,
            identity,
            device,
            authentication: 0,
            recovery: 0,
            session: 0,
            access: 0,
            token: None,
        }
    }

    /// A fresh device that will join `identity` rather than found one.
    pub(crate) fn device_for(&self, identity: &str) -> ClientDevice {
        let mut device = self.device();
        device.identity = identity.to_string();
        device
    }

    /// Create an account for a new device.
    pub(crate) async fn enroll(&self) -> Result<ClientDevice> {
        let mut device = self.device();
        let sent = device.create_account().await?;
        let response = self.server.create_account(&sent.message).await?;
        let created: CreateAccountResponse = self.accept(&sent, &response)?;
        device.identity = created.identity;
        Ok(device)
    }
}

/// Simulated device. Indexes point at the current key of each chain.
#[derive(Clone, Debug)]
pub(crate) struct ClientDevice {
    client: u16,
    pub identity: String,
    pub device: String,
    authentication: u32,
    recovery: u32,
    session: u16,
    access: u32,
    pub token: Option<String>,
}

impl ClientDevice {
    pub(crate) fn key(&self, offset: u32) -> Ed25519Key {
        chain_key(AUTHENTICATION_CHAIN, self.client, 0, self.authentication + offset)
    }

    fn recovery_key(&self, offset: u32) -> Ed25519Key {
        chain_key(RECOVERY_CHAIN, self.client, 0, self.recovery + offset)
    }

    pub(crate) fn access_key(&self, offset: u32) -> Ed25519Key {
        chain_key(ACCESS_CHAIN, self.client, self.session, self.access + offset)
    }

    /// The authentication chain moved one step on the server.
    pub(crate) fn advance(&mut self) {
        self.authentication += 1;
    }

    pub(crate) fn advance_access(&mut self) {
        self.access += 1;
    }

    pub(crate) fn advance_recovery(&mut self) {
        self.recovery += 1;
    }

    fn reveal(&self) -> DeviceAuthentication {
        DeviceAuthentication {
            device: self.device.clone(),
            identity: self.identity.clone(),
            public_key: self.key(1).public(),
            rotation_hash: commitment(&self.key(2)),
        }
    }

    pub(crate) async fn create_account(&self) -> Result<Sent> {
        self.create_account_with(Some(self.identity.clone())).await
    }

    pub(crate) async fn create_account_with(&self, identity: Option<String>) -> Result<Sent> {
        send(
            CreateAccountRequest {
                authentication: CreateAccountAuthentication {
                    device: self.device.clone(),
                    identity,
                    public_key: self.key(0).public(),
                    recovery_hash: commitment(&self.recovery_key(0)),
                    rotation_hash: commitment(&self.key(1)),
                },
            },
            Some(&self.key(0)),
        )
        .await
    }

    pub(crate) async fn rotate(&self) -> Result<Sent> {
        send(
            RotateDeviceRequest {
                authentication: self.reveal(),
            },
            Some(&self.key(1)),
        )
        .await
    }

    /// Rotation revealing `key` in place of the committed next key.
    pub(crate) async fn rotate_revealing(&self, key: &Ed25519Key) -> Result<Sent> {
        send(
            RotateDeviceRequest {
                authentication: DeviceAuthentication {
                    public_key: key.public(),
                    ..self.reveal()
                },
            },
            Some(key),
        )
        .await
    }

    pub(crate) async fn delete_account(&self) -> Result<Sent> {
        send(
            DeleteAccountRequest {
                authentication: self.reveal(),
            },
            Some(&self.key(1)),
        )
        .await
    }

    pub(crate) async fn unlink(&self, target: &str) -> Result<Sent> {
        send(
            UnlinkDeviceRequest {
                authentication: self.reveal(),
                link: UnlinkTarget {
                    device: target.to_string(),
                },
            },
            Some(&self.key(1)),
        )
        .await
    }

    /// Endorse `joining`, whose link container it signs itself.
    pub(crate) async fn link(&self, joining: &Self) -> Result<Sent> {
        let mut container = SignedMessage::new(DeviceAuthentication {
            device: joining.device.clone(),
            identity: joining.identity.clone(),
            public_key: joining.key(0).public(),
            rotation_hash: commitment(&joining.key(1)),
        })?;
        container.sign(&joining.key(0)).await?;

        send(
            LinkDeviceRequest {
                authentication: self.reveal(),
                link: container,
            },
            Some(&self.key(1)),
        )
        .await
    }

    pub(crate) async fn change_recovery(&self) -> Result<Sent> {
        send(
            ChangeRecoveryKeyRequest {
                authentication: ChangeRecoveryKeyAuthentication {
                    device: self.device.clone(),
                    identity: self.identity.clone(),
                    public_key: self.key(1).public(),
                    recovery_hash: commitment(&self.recovery_key(1)),
                    rotation_hash: commitment(&self.key(2)),
                },
            },
            Some(&self.key(1)),
        )
        .await
    }

    /// Break-glass recovery onto `replacement`, signed with this device's
    /// current recovery key.
    pub(crate) async fn recover_onto(&self, replacement: &Self) -> Result<Sent> {
        send(
            RecoverAccountRequest {
                authentication: RecoverAccountAuthentication {
                    device: replacement.device.clone(),
                    identity: self.identity.clone(),
                    public_key: replacement.key(0).public(),
                    recovery_hash: commitment(&self.recovery_key(1)),
                    recovery_key: self.recovery_key(0).public(),
                    rotation_hash: commitment(&replacement.key(1)),
                },
            },
            Some(&self.recovery_key(0)),
        )
        .await
    }

    pub(crate) async fn request_session(&self) -> Result<Sent> {
        send(
            RequestSessionRequest {
                authentication: RequestSessionAuthentication {
                    identity: self.identity.clone(),
                },
            },
            None,
        )
        .await
    }

    /// Answer `challenge` and open a new access chain.
    pub(crate) async fn create_session(&mut self, challenge: &str) -> Result<Sent> {
        self.session += 1;
        self.access = 0;
        send(
            CreateSessionRequest {
                access: AccessKeys {
                    public_key: self.access_key(0).public(),
                    rotation_hash: commitment(&self.access_key(1)),
                },
                authentication: CreateSessionAuthentication {
                    device: self.device.clone(),
                    identity: self.identity.clone(),
                    nonce: challenge.to_string(),
                },
            },
            Some(&self.key(0)),
        )
        .await
    }

    pub(crate) async fn refresh(&self) -> Result<Sent> {
        send(
            RefreshSessionRequest {
                access: RefreshAccess {
                    public_key: self.access_key(1).public(),
                    rotation_hash: commitment(&self.access_key(2)),
                    token: self.token.clone().unwrap_or_default(),
                },
            },
            Some(&self.access_key(1)),
        )
        .await
    }

    /// Install a token from a create or refresh response.
    pub(crate) fn accept_session(
        &mut self,
        harness: &Harness,
        sent: &Sent,
        response: &str,
    ) -> Result<String> {
        let session: SessionResponse = harness.accept(sent, response)?;
        self.token = Some(session.access.token.clone());
        Ok(session.access.token)
    }

    /// Install a refreshed token; the revealed access key becomes current.
    pub(crate) fn accept_refresh(
        &mut self,
        harness: &Harness,
        sent: &Sent,
        response: &str,
    ) -> Result<String> {
        let token = self.accept_session(harness, sent, response)?;
        self.advance_access();
        Ok(token)
    }

    /// Full two-phase login with `{"role": "reader"}` attributes.
    pub(crate) async fn login(&mut self, harness: &Harness) -> Result<String> {
        let challenge = self.request_session().await?;
        let response = harness.server.request_session(&challenge.message).await?;
        let nonce: RequestSessionResponse = harness.accept(&challenge, &response)?;

        let sent = self.create_session(&nonce.authentication.nonce).await?;
        let response = harness
            .server
            .create_session(&sent.message, json!({"role": "reader"}))
            .await?;
        self.accept_session(harness, &sent, &response)
    }

    /// Refresh the session and install the new token.
    pub(crate) async fn refresh_session(&mut self, harness: &Harness) -> Result<String> {
        let sent = self.refresh().await?;
        let response = harness.server.refresh_session::<Value>(&sent.message).await?;
        self.accept_refresh(harness, &sent, &response)
    }

    async fn signed_access<T: Serialize>(
        &self,
        request: T,
        timestamp: OffsetDateTime,
        key: &Ed25519Key,
    ) -> Result<String> {
        let mut envelope = AccessRequest::new(AccessPayload {
            access: AccessContext {
                nonce: OsNoncer.generate_128()?,
                timestamp: format_rfc3339(timestamp),
                token: self.token.clone().unwrap_or_default(),
            },
            request,
        })?;
        envelope.sign(key).await?;
        envelope.to_json()
    }

    pub(crate) async fn access_request<T: Serialize>(
        &self,
        harness: &Harness,
        request: T,
    ) -> Result<String> {
        self.signed_access(request, harness.clock.now(), &self.access_key(0))
            .await
    }

    pub(crate) async fn access_request_at<T: Serialize>(
        &self,
        request: T,
        timestamp: OffsetDateTime,
    ) -> Result<String> {
        self.signed_access(request, timestamp, &self.access_key(0))
            .await
    }

    pub(crate) async fn access_request_signed_by_next<T: Serialize>(
        &self,
        harness: &Harness,
        request: T,
    ) -> Result<String> {
        self.signed_access(request, harness.clock.now(), &self.access_key(1))
            .await
    }
}
