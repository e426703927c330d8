use serde::{Deserialize, Serialize};

use crate::kite::Kite;

/// The value stored against a kite identity at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterValue {
    pub url: String,
    /// Identifies the key pair whose private half signs tokens issued
    /// against this kite.
    #[serde(rename = "keyId", default)]
    pub key_id: String,
}

/// How a caller proves who it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(rename = "type", default)]
    pub auth_type: String,
    #[serde(default)]
    pub key: String,
}

/// Body of `POST /register` and of the `register` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterArgs {
    pub url: String,
    #[serde(default)]
    pub kite: Option<Kite>,
    #[serde(default)]
    pub auth: Option<Authentication>,
}

/// Reply to a registration. `kite_key` and `public_key` are present only
/// when a key rotation happened since the caller's last known material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResult {
    pub url: String,
    #[serde(rename = "kiteKey", skip_serializing_if = "Option::is_none", default)]
    pub kite_key: Option<String>,
    #[serde(rename = "publicKey", skip_serializing_if = "Option::is_none", default)]
    pub public_key: Option<String>,
    #[serde(rename = "heartbeatInterval")]
    pub heartbeat_interval: u64,
}

/// One discovery result: the kite, how to reach it, and an access token
/// minted for the querying caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteWithToken {
    pub kite: Kite,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<String>,
    #[serde(rename = "keyId", skip_serializing_if = "Option::is_none", default)]
    pub key_id: Option<String>,
}

/// Reply to `getKites`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetKitesResult {
    pub kites: Vec<KiteWithToken>,
}

/// Arguments of `registerMachine`: the pluggable authentication material
/// plus the username the machine claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachineArgs {
    #[serde(rename = "authType", default)]
    pub auth_type: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub username: String,
}
