//! Session key types and derivation.

use crate::hkdf;
use companion_core::error::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or X25519.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub Vec<u8>);

/// 32-byte encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

/// Per-direction data-channel keys derived after pair-verify.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for frames we send (`ClientEncrypt-main`).
    pub tx_key: EncryptionKey,
    /// Key for frames we receive (`ServerEncrypt-main`).
    pub rx_key: EncryptionKey,
}

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Derive both data-channel keys from the pair-verify shared secret.
    pub fn derive(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        let tx_key = hkdf::derive_client_encrypt_key(shared_secret.as_bytes())?;
        let rx_key = hkdf::derive_server_encrypt_key(shared_secret.as_bytes())?;
        Ok(Self {
            tx_key: EncryptionKey(tx_key),
            rx_key: EncryptionKey(rx_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_produces_distinct_directions() {
        let shared = SharedSecret::new(vec![0xAB; 32]);
        let keys = SessionKeys::derive(&shared).unwrap();
        assert_ne!(keys.tx_key.as_bytes(), keys.rx_key.as_bytes());
    }

    #[test]
    fn derive_is_deterministic() {
        let shared = SharedSecret::new(vec![0xAB; 32]);
        let keys1 = SessionKeys::derive(&shared).unwrap();
        let keys2 = SessionKeys::derive(&shared).unwrap();
        assert_eq!(keys1.tx_key.as_bytes(), keys2.tx_key.as_bytes());
        assert_eq!(keys1.rx_key.as_bytes(), keys2.rx_key.as_bytes());
    }

    #[test]
    fn different_secrets_produce_different_keys() {
        let keys1 = SessionKeys::derive(&SharedSecret::new(vec![0x01; 32])).unwrap();
        let keys2 = SessionKeys::derive(&SharedSecret::new(vec![0x02; 32])).unwrap();
        assert_ne!(keys1.tx_key.as_bytes(), keys2.tx_key.as_bytes());
        assert_ne!(keys1.rx_key.as_bytes(), keys2.rx_key.as_bytes());
    }
}
