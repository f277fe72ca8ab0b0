//! ChaCha20-Poly1305 AEAD for pairing messages and the data channel.
//!
//! Three nonce constructions are in play:
//! - pairing counter nonce: `00 00 00 00 || counter_le64`
//! - data channel counter nonce: `counter_le64 || 00 00 00 00`
//! - string nonce: ASCII label right-aligned in 12 bytes (e.g. `"PS-Msg05"`)

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use companion_core::error::CryptoError;
use zeroize::ZeroizeOnDrop;

/// Build a 12-byte nonce with the counter in the trailing 8 bytes.
///
/// Used during the pairing phase ("8-byte logical nonce").
pub fn nonce_from_counter_tail(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Build a 12-byte nonce with the counter in the leading 8 bytes.
///
/// Used on the encrypted data channel ("12-byte logical nonce").
pub fn nonce_from_counter_head(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[0..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Create a 12-byte nonce from a string, right-aligned with zero padding.
///
/// `"PV-Msg02"` becomes `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    nonce[12 - len..].copy_from_slice(&s[..len]);
    nonce
}

/// Encrypt with an explicit nonce and no associated data (pairing messages).
///
/// Returns ciphertext with the 16-byte auth tag appended.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("seal failed: {e}")))
}

/// Decrypt with an explicit nonce and no associated data (pairing messages).
///
/// Expects ciphertext with the 16-byte auth tag appended.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < 16 {
        return Err(CryptoError::Decryption);
    }
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

/// Data-channel cipher with per-direction keys and nonce counters.
///
/// The ciphers are cached rather than re-initialised per frame. Counters
/// advance exactly once per sealed or opened frame and the session fails
/// cleanly before either would wrap.
#[derive(ZeroizeOnDrop)]
pub struct FrameCipher {
    write_key: [u8; 32],
    read_key: [u8; 32],
    #[zeroize(skip)]
    write_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    read_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    encrypt_counter: u64,
    #[zeroize(skip)]
    decrypt_counter: u64,
}

impl FrameCipher {
    /// Create cipher with separate write (tx) and read (rx) keys.
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        let write_cipher = ChaCha20Poly1305::new(&write_key.into());
        let read_cipher = ChaCha20Poly1305::new(&read_key.into());
        Self {
            write_key,
            read_key,
            write_cipher,
            read_cipher,
            encrypt_counter: 0,
            decrypt_counter: 0,
        }
    }

    /// Seal one outbound frame payload; `aad` is the 4-byte frame header.
    ///
    /// Returns ciphertext with the 16-byte auth tag appended.
    pub fn seal(&mut self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.encrypt_counter == u64::MAX {
            return Err(CryptoError::NonceExhausted);
        }
        let nonce = nonce_from_counter_head(self.encrypt_counter);
        let sealed = self
            .write_cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload { msg: plaintext, aad },
            )
            .map_err(|e| CryptoError::Encryption(format!("seal failed: {e}")))?;
        self.encrypt_counter += 1;
        Ok(sealed)
    }

    /// Open one inbound frame payload; `aad` is the 4-byte frame header.
    pub fn open(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < 16 {
            return Err(CryptoError::Decryption);
        }
        if self.decrypt_counter == u64::MAX {
            return Err(CryptoError::NonceExhausted);
        }
        let nonce = nonce_from_counter_head(self.decrypt_counter);
        let opened = self
            .read_cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload { msg: ciphertext, aad },
            )
            .map_err(|_| CryptoError::Decryption)?;
        self.decrypt_counter += 1;
        Ok(opened)
    }

    /// Current outbound nonce counter.
    pub fn encrypt_counter(&self) -> u64 {
        self.encrypt_counter
    }

    /// Current inbound nonce counter.
    pub fn decrypt_counter(&self) -> u64 {
        self.decrypt_counter
    }
}
