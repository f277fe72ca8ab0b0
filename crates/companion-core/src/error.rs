//! Error types for the Companion protocol client.

use thiserror::Error;

/// Primary error type for all Companion operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Errors decoding or encoding wire payloads (OPACK, TLV8, frame headers).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown OPACK tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("Truncated input: needed {needed} more byte(s)")]
    Truncated { needed: usize },

    #[error("Trailing bytes after value ({0} left)")]
    TrailingBytes(usize),

    #[error("Back-reference to undefined index {0}")]
    BadBackReference(usize),

    #[error("Map key is not a string")]
    NonStringKey,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too large: {0}")]
    ValueTooLarge(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption/authentication failed")]
    Decryption,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Nonce counter exhausted")]
    NonceExhausted,
}

/// Errors during HomeKit-style pairing (Pair-Setup and Pair-Verify).
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Device rejected authentication (wrong PIN?)")]
    Authentication,

    #[error("Too many pairing attempts, device refuses new pairings")]
    MaxTries,

    #[error("Device is rate limiting pairing, retry after {seconds} second(s)")]
    BackOff { seconds: u16 },

    #[error("Device returned pairing error 0x{0:02x}")]
    Device(u8),

    #[error("SRP verification failed")]
    SrpVerificationFailed,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Device identifier mismatch")]
    IdentifierMismatch,

    #[error("Pairing state mismatch: expected M{expected}, got M{actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("Missing required TLV type 0x{0:02x}")]
    MissingTlv(u8),

    #[error("TLV parsing error: {0}")]
    TlvParse(String),

    #[error("Invalid pairing state: {0}")]
    InvalidState(String),
}

/// Protocol-level errors above the frame transport.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Device returned error: {0}")]
    Response(String),

    #[error("Unexpected frame type 0x{0:02x}")]
    UnexpectedFrame(u8),

    #[error("Frame payload exceeds 24-bit length field ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("Another handshake is already in flight")]
    HandshakeInFlight,

    #[error("Protocol stopped")]
    Stopped,

    #[error("Not connected")]
    NotConnected,

    #[error("Session is not authenticated")]
    NotAuthenticated,
}

/// Errors during mDNS service discovery.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    #[error("Service resolution failed: {0}")]
    Resolution(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = Error::Pairing(PairingError::Authentication);
        assert!(err.to_string().contains("Pairing error"));
        assert!(err.to_string().contains("authentication"));

        let err = Error::Codec(CodecError::UnknownTag(0x34));
        assert!(err.to_string().contains("0x34"));

        let err = Error::Pairing(PairingError::BackOff { seconds: 30 });
        assert!(err.to_string().contains("30"));

        let err = Error::Timeout;
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let err = Error::Transport(io_err);
        assert!(err.source().is_some());

        let err = Error::Protocol(ProtocolError::Stopped);
        assert!(err.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = CodecError::NonStringKey.into();
        assert!(matches!(err, Error::Codec(_)));

        let err: Error = CryptoError::Decryption.into();
        assert!(matches!(err, Error::Crypto(_)));

        let err: Error = PairingError::MaxTries.into();
        assert!(matches!(err, Error::Pairing(_)));

        let err: Error = ProtocolError::Stopped.into();
        assert!(matches!(err, Error::Protocol(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Transport(_)));
    }
}
