//! Client identity used across both pairing phases.
//!
//! The same Ed25519 keypair and 16-byte identifier must appear in Pair-Setup
//! M5 (when registering with the device) and Pair-Verify M3 (when
//! authenticating later). A mismatch makes the device reject the session.

use companion_core::Credentials;
use companion_crypto::ed25519::IdentityKeyPair;
use uuid::Uuid;

/// Pairing identity: long-term Ed25519 keypair plus a stable UUID.
#[derive(Clone)]
pub struct ClientIdentity {
    id: Uuid,
    keypair: IdentityKeyPair,
}

impl ClientIdentity {
    /// Generate a fresh identity.
    ///
    /// The UUID is derived from the public key so the pair stays consistent
    /// for a given keypair.
    pub fn generate() -> Self {
        Self::from_keypair(IdentityKeyPair::generate())
    }

    /// Build from an existing keypair, deriving the UUID from the public key.
    pub fn from_keypair(keypair: IdentityKeyPair) -> Self {
        let pk = keypair.public_key();
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&pk[..16]);
        Self {
            id: Uuid::from_bytes(id_bytes),
            keypair,
        }
    }

    /// Restore the identity registered with a device during Pair-Setup.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            id: credentials.client_id,
            keypair: IdentityKeyPair::from_seed(&credentials.client_ltsk),
        }
    }

    /// The stable identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The identifier as raw bytes for TLV encoding.
    pub fn id_bytes(&self) -> [u8; 16] {
        *self.id.as_bytes()
    }

    /// The Ed25519 public key (LTPK).
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// The Ed25519 seed (LTSK).
    pub fn seed(&self) -> [u8; 32] {
        self.keypair.seed()
    }

    /// Sign a message with the long-term key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_derived_from_public_key() {
        let keypair = IdentityKeyPair::from_seed(&[0x42; 32]);
        let identity1 = ClientIdentity::from_keypair(keypair.clone());
        let identity2 = ClientIdentity::from_keypair(keypair);
        assert_eq!(identity1.id(), identity2.id());
        assert_eq!(identity1.id_bytes(), identity1.public_key()[..16]);
    }

    #[test]
    fn generate_creates_distinct_identities() {
        let a = ClientIdentity::generate();
        let b = ClientIdentity::generate();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn from_credentials_restores_key_and_id() {
        let original = ClientIdentity::generate();
        let credentials = Credentials {
            device_ltpk: [0xAA; 32],
            client_ltsk: original.seed(),
            device_id: b"device".to_vec(),
            client_id: original.id(),
        };
        let restored = ClientIdentity::from_credentials(&credentials);
        assert_eq!(restored.id(), original.id());
        assert_eq!(restored.public_key(), original.public_key());
    }
}
