//! # companion-pairing
//!
//! Pair-Setup and Pair-Verify state machines for the Companion protocol.
//!
//! Pair-Setup (M1-M6) runs SRP-6a against the device's PIN and registers our
//! long-term Ed25519 key, producing [`companion_core::Credentials`].
//! Pair-Verify (M1-M4) consumes those credentials and derives the
//! per-session data-channel keys.
//!
//! Both machines are strictly single-flow: every message must be produced
//! and consumed in order, and any failure poisons the machine.

pub mod identity;
pub mod pair_setup;
pub mod pair_verify;

pub use identity::ClientIdentity;
pub use pair_setup::PairSetup;
pub use pair_verify::PairVerify;
