use super::device::DeviceAuthentication;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountAuthentication {
    pub device: String,
    /// Absent only when the server assigns identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub public_key: String,
    pub recovery_hash: String,
    pub rotation_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub authentication: CreateAccountAuthentication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountResponse {
    pub identity: String,
}

/// Signed by the revealed recovery key, not a device key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverAccountAuthentication {
    pub device: String,
    pub identity: String,
    pub public_key: String,
    pub recovery_hash: String,
    pub recovery_key: String,
    pub rotation_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverAccountRequest {
    pub authentication: RecoverAccountAuthentication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    pub authentication: DeviceAuthentication,
}
