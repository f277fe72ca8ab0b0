//! # companion-core
//!
//! Core types, frame definitions, and error taxonomy shared across the
//! Companion protocol client crates.
//!
//! This crate provides:
//! - Frame type constants and header encoding
//! - Discovered-device representation and pairing flags
//! - Long-term credential storage format
//! - Common error types

pub mod credentials;
pub mod device;
pub mod error;
pub mod frame;

pub use credentials::Credentials;
pub use device::{CompanionDevice, PairingFlags};
pub use error::{
    CodecError, CryptoError, DiscoveryError, Error, PairingError, ProtocolError, Result,
};
pub use frame::{FrameType, AUTH_TAG_LEN, HEADER_LEN, MAX_PAYLOAD_LEN};
