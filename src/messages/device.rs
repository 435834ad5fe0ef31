use super::SignedMessage;
use serde::{Deserialize, Serialize};

/// A device proving possession of its next key: `public_key` is the
/// revealed key and `rotation_hash` the commitment to the one after it.
/// Also the payload a new device signs when it asks to be linked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthentication {
    pub device: String,
    pub identity: String,
    pub public_key: String,
    pub rotation_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateDeviceRequest {
    pub authentication: DeviceAuthentication,
}

/// `link` is signed by the new device's first key; the outer request by
/// the endorsing device's revealed key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkDeviceRequest {
    pub authentication: DeviceAuthentication,
    pub link: SignedMessage<DeviceAuthentication>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkTarget {
    pub device: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkDeviceRequest {
    pub authentication: DeviceAuthentication,
    pub link: UnlinkTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecoveryKeyAuthentication {
    pub device: String,
    pub identity: String,
    pub public_key: String,
    pub recovery_hash: String,
    pub rotation_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecoveryKeyRequest {
    pub authentication: ChangeRecoveryKeyAuthentication,
}
