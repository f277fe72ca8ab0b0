//! X25519 ECDH for pair-verify session key agreement.

use companion_core::error::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

/// Ephemeral X25519 key pair, consumed by the Diffie-Hellman exchange.
#[derive(ZeroizeOnDrop)]
pub struct EcdhKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl EcdhKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Create from existing secret key bytes.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let static_secret = StaticSecret::from(*secret);
        let public = PublicKey::from(&static_secret);
        Self {
            public: public.to_bytes(),
            secret: *secret,
        }
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Perform Diffie-Hellman key exchange, consuming the key pair.
    ///
    /// Low-order peer points are rejected: they produce an all-zero shared
    /// secret.
    pub fn diffie_hellman(self, peer_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
        let static_secret = StaticSecret::from(self.secret);
        let shared = static_secret.diffie_hellman(&PublicKey::from(*peer_public));

        let shared_bytes = shared.to_bytes();
        if shared_bytes.iter().all(|&b| b == 0) {
            return Err(CryptoError::KeyDerivation(
                "shared secret is all zeros (low-order point)".to_string(),
            ));
        }

        Ok(shared_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_parties_derive_same_secret() {
        let alice = EcdhKeyPair::generate();
        let bob = EcdhKeyPair::generate();
        let alice_public = alice.public_key();
        let bob_public = bob.public_key();

        let shared_a = alice.diffie_hellman(&bob_public).unwrap();
        let shared_b = bob.diffie_hellman(&alice_public).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn rejects_all_zero_public_key() {
        let kp = EcdhKeyPair::generate();
        assert!(kp.diffie_hellman(&[0u8; 32]).is_err());
    }

    #[test]
    fn rejects_low_order_point() {
        let low_order =
            hex::decode("ecffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff7f")
                .unwrap();
        let mut point = [0u8; 32];
        point.copy_from_slice(&low_order);
        let kp = EcdhKeyPair::generate();
        assert!(kp.diffie_hellman(&point).is_err());
    }

    #[test]
    fn rfc7748_test_vector() {
        // RFC 7748 Section 6.1
        let alice_private =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap();
        let bob_public =
            hex::decode("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
                .unwrap();
        let shared_expected =
            hex::decode("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742")
                .unwrap();

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&alice_private);
        let mut peer = [0u8; 32];
        peer.copy_from_slice(&bob_public);

        let alice = EcdhKeyPair::from_secret(&secret);
        assert_eq!(alice.diffie_hellman(&peer).unwrap().to_vec(), shared_expected);
    }
}
