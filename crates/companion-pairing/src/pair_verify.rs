//! Pair-Verify protocol (M1-M4).
//!
//! Re-authenticates with stored credentials: an ephemeral X25519 exchange,
//! mutual Ed25519 signatures over the ephemeral keys, and derivation of the
//! per-session data-channel keys.

use companion_core::error::{Error, PairingError, Result};
use companion_core::Credentials;
use companion_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    curve25519::EcdhKeyPair,
    ed25519, hkdf,
    keys::{SessionKeys, SharedSecret},
    tlv::{error_code, TlvTag, Tlv8},
};
use tracing::debug;

use crate::identity::ClientIdentity;

/// Pair-verify state machine.
pub struct PairVerify {
    state: PairVerifyState,
    credentials: Credentials,
    identity: ClientIdentity,
    ecdh_keypair: Option<EcdhKeyPair>,
    ecdh_public: Option<[u8; 32]>,
    device_public: Option<[u8; 32]>,
    shared_secret: Option<[u8; 32]>,
    session_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairVerifyState {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    Complete,
    Failed,
}

/// Nonces for pair-verify encryption.
const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

impl PairVerify {
    /// Create a pair-verify flow from stored credentials.
    pub fn new(credentials: Credentials) -> Self {
        let identity = ClientIdentity::from_credentials(&credentials);
        Self {
            state: PairVerifyState::Initial,
            credentials,
            identity,
            ecdh_keypair: None,
            ecdh_public: None,
            device_public: None,
            shared_secret: None,
            session_key: None,
        }
    }

    /// Generate M1: `{SeqNo=1, PublicKey=<ephemeral X25519 public>}`.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        if self.state != PairVerifyState::Initial {
            return Err(self.fail(PairingError::InvalidState(
                "M1 can only be generated from the initial state".to_string(),
            )));
        }

        let ecdh = EcdhKeyPair::generate();
        let public_key = ecdh.public_key();
        self.ecdh_public = Some(public_key);
        self.ecdh_keypair = Some(ecdh);

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::SeqNo, vec![0x01]);
        tlv.set(TlvTag::PublicKey, public_key.to_vec());

        self.state = PairVerifyState::M1Sent;
        Ok(tlv.encode())
    }

    /// Process M2: decrypt the device's identity proof and verify it.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        if self.state != PairVerifyState::M1Sent {
            return Err(self.fail(PairingError::InvalidState(
                "M2 can only be processed after sending M1".to_string(),
            )));
        }

        let tlv = self.parse_and_check(response, 0x02)?;

        let device_public = self.require(&tlv, TlvTag::PublicKey)?.to_vec();
        let encrypted_data = self.require(&tlv, TlvTag::EncryptedData)?.to_vec();

        let device_public: [u8; 32] = device_public.as_slice().try_into().map_err(|_| {
            self.fail(PairingError::TlvParse(
                "device ephemeral key must be 32 bytes".to_string(),
            ))
        })?;
        self.device_public = Some(device_public);

        let ecdh = self.ecdh_keypair.take().expect("set in generate_m1");
        let shared_secret = ecdh
            .diffie_hellman(&device_public)
            .map_err(|e| self.fail(e))?;
        self.shared_secret = Some(shared_secret);

        let session_key = hkdf::derive_pair_verify_key(&shared_secret)
            .map_err(|e| self.fail(e))?;
        self.session_key = Some(session_key);

        let nonce = nonce_from_string(PV_MSG02_NONCE);
        let decrypted = decrypt_with_nonce(&session_key, &nonce, &encrypted_data)
            .map_err(|e| self.fail(e))?;

        let inner_tlv = Tlv8::parse(&decrypted).map_err(|e| self.fail(e))?;
        let device_id = self.require(&inner_tlv, TlvTag::Identifier)?.to_vec();
        let signature = self.require(&inner_tlv, TlvTag::Signature)?.to_vec();

        if device_id != self.credentials.device_id {
            return Err(self.fail(PairingError::IdentifierMismatch));
        }

        let signature: [u8; 64] = signature.as_slice().try_into().map_err(|_| {
            self.fail(PairingError::TlvParse("signature must be 64 bytes".to_string()))
        })?;

        // Device signs device_eph_pub || device_id || client_eph_pub.
        let client_public = self.ecdh_public.expect("set in generate_m1");
        let mut message =
            Vec::with_capacity(32 + device_id.len() + 32);
        message.extend_from_slice(&device_public);
        message.extend_from_slice(&device_id);
        message.extend_from_slice(&client_public);

        if ed25519::verify(&self.credentials.device_ltpk, &message, &signature).is_err() {
            return Err(self.fail(PairingError::SignatureInvalid));
        }

        debug!("pair-verify M2 signature verified");
        self.state = PairVerifyState::M2Received;
        Ok(())
    }

    /// Generate M3: our encrypted identity proof.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        if self.state != PairVerifyState::M2Received {
            return Err(self.fail(PairingError::InvalidState(
                "M3 can only be generated after processing M2".to_string(),
            )));
        }

        let client_public = self.ecdh_public.expect("set in generate_m1");
        let device_public = self.device_public.expect("set in process_m2");
        let session_key = self.session_key.expect("set in process_m2");

        // We sign client_eph_pub || client_id || device_eph_pub.
        let mut message = Vec::with_capacity(32 + 16 + 32);
        message.extend_from_slice(&client_public);
        message.extend_from_slice(&self.identity.id_bytes());
        message.extend_from_slice(&device_public);
        let signature = self.identity.sign(&message);

        let mut inner_tlv = Tlv8::new();
        inner_tlv.set(TlvTag::Identifier, self.identity.id_bytes().to_vec());
        inner_tlv.set(TlvTag::Signature, signature.to_vec());

        let nonce = nonce_from_string(PV_MSG03_NONCE);
        let encrypted = encrypt_with_nonce(&session_key, &nonce, &inner_tlv.encode())
            .map_err(|e| self.fail(e))?;

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::SeqNo, vec![0x03]);
        tlv.set(TlvTag::EncryptedData, encrypted);

        self.state = PairVerifyState::M3Sent;
        Ok(tlv.encode())
    }

    /// Process M4 (a bare acknowledgement) and derive the data-channel keys.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<SessionKeys> {
        if self.state != PairVerifyState::M3Sent {
            return Err(self.fail(PairingError::InvalidState(
                "M4 can only be processed after sending M3".to_string(),
            )));
        }

        // M4 carries no payload beyond the sequence number; an error tag
        // still means the device rejected our proof.
        let _tlv = self.parse_and_check(response, 0x04)?;

        let shared = self.shared_secret.expect("set in process_m2");
        let keys = SessionKeys::derive(&SharedSecret::new(shared.to_vec()))
            .map_err(|e| self.fail(e))?;

        debug!("pair-verify complete, data-channel keys installed");
        self.state = PairVerifyState::Complete;
        Ok(keys)
    }

    /// Check if verification completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state == PairVerifyState::Complete
    }

    fn parse_and_check(&mut self, response: &[u8], expected_seq: u8) -> Result<Tlv8> {
        let tlv = Tlv8::parse(response).map_err(|e| self.fail(e))?;

        if let Some(code) = tlv.error() {
            let err = match code {
                error_code::AUTHENTICATION => PairingError::Authentication,
                other => PairingError::Device(other),
            };
            return Err(self.fail(err));
        }

        match tlv.seq_no() {
            Some(seq) if seq == expected_seq => Ok(tlv),
            other => Err(self.fail(PairingError::StateMismatch {
                expected: expected_seq,
                actual: other.unwrap_or(0),
            })),
        }
    }

    fn require<'a>(&mut self, tlv: &'a Tlv8, tag: TlvTag) -> Result<&'a [u8]> {
        match tlv.get(tag) {
            Some(value) => Ok(value),
            None => {
                self.state = PairVerifyState::Failed;
                Err(PairingError::MissingTlv(tag as u8).into())
            }
        }
    }

    fn fail(&mut self, err: impl Into<Error>) -> Error {
        self.state = PairVerifyState::Failed;
        err.into()
    }
}
