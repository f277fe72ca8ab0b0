//! # companion-crypto
//!
//! Cryptographic primitives for Companion pairing and session encryption.
//!
//! This crate provides:
//! - TLV8 for HomeKit-style pairing messages
//! - SRP-6a (3072-bit, SHA-512) with a caller-supplied ephemeral secret
//! - Ed25519 identity signatures
//! - X25519 ECDH for pair-verify
//! - HKDF-SHA512 key derivation
//! - ChaCha20-Poly1305 AEAD with the protocol's nonce constructions
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::FrameCipher;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use tlv::{Tlv8, TlvTag};
