//! Long-term pairing credentials and their persistence format.
//!
//! Credentials are produced once by a successful Pair-Setup and are read-only
//! afterwards. The on-disk format is a single JSON object with base64 values,
//! matching what other Companion clients write:
//!
//! ```json
//! {"ltpk": "...", "ltsk": "...", "atvId": "...", "clientId": "..."}
//! ```

use crate::error::{CodecError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Long-term credentials for one paired device.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Device's long-term Ed25519 public key.
    pub device_ltpk: [u8; 32],
    /// Our long-term Ed25519 private key (seed).
    pub client_ltsk: [u8; 32],
    /// Device identifier proven during Pair-Setup M6.
    pub device_id: Vec<u8>,
    /// Our stable pairing identifier.
    pub client_id: Uuid,
}

#[derive(Serialize, Deserialize)]
struct CredentialsJson {
    ltpk: String,
    ltsk: String,
    #[serde(rename = "atvId")]
    atv_id: String,
    #[serde(rename = "clientId")]
    client_id: String,
}

impl Credentials {
    /// Our long-term Ed25519 public key, derived from `client_ltsk`.
    pub fn client_ltpk(&self) -> [u8; 32] {
        SigningKey::from_bytes(&self.client_ltsk)
            .verifying_key()
            .to_bytes()
    }

    /// Serialize to the JSON persistence format.
    pub fn to_json(&self) -> String {
        let json = CredentialsJson {
            ltpk: BASE64.encode(self.device_ltpk),
            ltsk: BASE64.encode(self.client_ltsk),
            atv_id: BASE64.encode(&self.device_id),
            client_id: BASE64.encode(self.client_id.as_bytes()),
        };
        serde_json::to_string(&json).expect("credential serialization is infallible")
    }

    /// Parse from the JSON persistence format.
    ///
    /// Fails if any field is missing, malformed, or the wrong size.
    pub fn from_json(data: &str) -> Result<Self> {
        let json: CredentialsJson = serde_json::from_str(data)
            .map_err(|e| CodecError::InvalidFormat(format!("credentials JSON: {e}")))?;

        let device_ltpk = decode_key32(&json.ltpk, "ltpk")?;
        let client_ltsk = decode_key32(&json.ltsk, "ltsk")?;
        let device_id = BASE64
            .decode(&json.atv_id)
            .map_err(|e| CodecError::InvalidFormat(format!("atvId: {e}")))?;
        let client_id_bytes = BASE64
            .decode(&json.client_id)
            .map_err(|e| CodecError::InvalidFormat(format!("clientId: {e}")))?;
        let client_id_arr: [u8; 16] = client_id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CodecError::InvalidFormat("clientId must be 16 bytes".to_string()))?;

        Ok(Self {
            device_ltpk,
            client_ltsk,
            device_id,
            client_id: Uuid::from_bytes(client_id_arr),
        })
    }
}

fn decode_key32(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| CodecError::InvalidFormat(format!("{field}: {e}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CodecError::InvalidFormat(format!("{field} must be 32 bytes")).into())
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private key.
        f.debug_struct("Credentials")
            .field("device_ltpk", &hex_string(&self.device_ltpk))
            .field("client_ltsk", &"<redacted>")
            .field("device_id", &hex_string(&self.device_id))
            .field("client_id", &self.client_id)
            .finish()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
