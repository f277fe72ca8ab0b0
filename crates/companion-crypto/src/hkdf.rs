//! HKDF-SHA512 key derivation for pairing and session keys.

use companion_core::error::CryptoError;
use hkdf::Hkdf;
use sha2::Sha512;

/// Derive a 32-byte key using HKDF-SHA512.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Well-known salt and info strings used by the Companion protocol.
pub mod constants {
    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    // Data channel keys: empty salt, direction-specific info.
    pub const CLIENT_ENCRYPT_INFO: &[u8] = b"ClientEncrypt-main";
    pub const SERVER_ENCRYPT_INFO: &[u8] = b"ServerEncrypt-main";
}

/// Derive the pair-setup M5/M6 encryption key from the SRP session key.
pub fn derive_pair_setup_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive the controller signing key (`iOSDeviceX`) for pair-setup M5.
pub fn derive_controller_sign_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive the accessory signing key for the pair-setup M6 signature check.
pub fn derive_accessory_sign_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive the pair-verify M2/M3 encryption key from the X25519 shared secret.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Derive the data-channel transmit key (client to device).
pub fn derive_client_encrypt_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(shared_secret, b"", constants::CLIENT_ENCRYPT_INFO)
}

/// Derive the data-channel receive key (device to client).
pub fn derive_server_encrypt_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(shared_secret, b"", constants::SERVER_ENCRYPT_INFO)
}
