//! Pair-Setup protocol (M1-M6).
//!
//! SRP-6a based pairing driven by the device's PIN. A successful flow proves
//! our long-term Ed25519 key to the device and learns its identifier and
//! long-term public key, yielding the credential set used by pair-verify.

use companion_core::error::{Error, PairingError, Result};
use companion_core::Credentials;
use companion_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    ed25519, hkdf,
    srp::{SrpChallenge, SrpClient, SrpProof, SRP_USERNAME},
    tlv::{error_code, TlvTag, Tlv8},
};
use companion_opack::Value;
use tracing::debug;

use crate::identity::ClientIdentity;

/// Pair-setup state machine.
pub struct PairSetup {
    state: PairSetupState,
    pin: String,
    identity: ClientIdentity,
    /// Display name sent alongside our identity in M5, if configured.
    device_name: Option<String>,
    srp_client: Option<SrpClient>,
    srp_proof: Option<SrpProof>,
    session_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairSetupState {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    M4Received,
    M5Sent,
    Complete,
    Failed,
}

/// Nonce for pair-setup M5 encryption.
const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
/// Nonce for pair-setup M6 decryption.
const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

impl PairSetup {
    /// Create a new pair-setup flow for `pin`, minting a fresh identity.
    ///
    /// The identity's Ed25519 seed doubles as the SRP ephemeral secret.
    pub fn new(pin: &str) -> Self {
        Self::with_identity(pin, ClientIdentity::generate())
    }

    /// Create a pair-setup flow reusing an existing identity.
    pub fn with_identity(pin: &str, identity: ClientIdentity) -> Self {
        Self {
            state: PairSetupState::Initial,
            pin: pin.to_string(),
            identity,
            device_name: None,
            srp_client: None,
            srp_proof: None,
            session_key: None,
        }
    }

    /// Set the display name registered with the device in M5.
    pub fn set_device_name(&mut self, name: impl Into<String>) {
        self.device_name = Some(name.into());
    }

    /// The identity this flow registers with the device.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Generate M1: `{SeqNo=1, Method=0}`.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        if self.state != PairSetupState::Initial {
            return Err(self.fail(PairingError::InvalidState(
                "M1 can only be generated from the initial state".to_string(),
            )));
        }

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::SeqNo, vec![0x01]);
        tlv.set(TlvTag::Method, vec![0x00]);

        self.state = PairSetupState::M1Sent;
        Ok(tlv.encode())
    }

    /// Process M2: `{SeqNo=2, PublicKey=B, Salt=s}`.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        if self.state != PairSetupState::M1Sent {
            return Err(self.fail(PairingError::InvalidState(
                "M2 can only be processed after sending M1".to_string(),
            )));
        }

        let tlv = self.parse_and_check(response, 0x02)?;

        let server_public_key = self.require(&tlv, TlvTag::PublicKey)?.to_vec();
        let salt = self.require(&tlv, TlvTag::Salt)?.to_vec();
        debug!(salt_len = salt.len(), b_len = server_public_key.len(), "pair-setup M2");

        let srp_client = SrpClient::new(SRP_USERNAME, self.pin.as_bytes(), &self.identity.seed());
        let challenge = SrpChallenge {
            salt,
            server_public_key,
        };
        let proof = srp_client
            .process_challenge(&challenge)
            .map_err(|e| self.fail(e))?;

        self.srp_client = Some(srp_client);
        self.srp_proof = Some(proof);
        self.state = PairSetupState::M2Received;
        Ok(())
    }

    /// Generate M3: `{SeqNo=3, PublicKey=A, Proof=M1}`.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        if self.state != PairSetupState::M2Received {
            return Err(self.fail(PairingError::InvalidState(
                "M3 can only be generated after processing M2".to_string(),
            )));
        }

        let srp_client = self.srp_client.as_ref().expect("set in process_m2");
        let proof = self.srp_proof.as_ref().expect("set in process_m2");

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::SeqNo, vec![0x03]);
        tlv.set(TlvTag::PublicKey, srp_client.public_key());
        tlv.set(TlvTag::Proof, proof.client_proof.clone());

        self.state = PairSetupState::M3Sent;
        Ok(tlv.encode())
    }

    /// Process M4: `{SeqNo=4, Proof=M2}`, verifying the server proof.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<()> {
        if self.state != PairSetupState::M3Sent {
            return Err(self.fail(PairingError::InvalidState(
                "M4 can only be processed after sending M3".to_string(),
            )));
        }

        let tlv = self.parse_and_check(response, 0x04)?;
        let server_proof = self.require(&tlv, TlvTag::Proof)?.to_vec();

        let verified = {
            let srp_client = self.srp_client.as_ref().expect("set in process_m2");
            let proof = self.srp_proof.as_ref().expect("set in process_m2");
            srp_client.verify_server_proof(&server_proof, &proof.expected_server_proof)
        };
        if !verified {
            return Err(self.fail(PairingError::SrpVerificationFailed));
        }

        let srp_key = self.srp_session_key();
        let session_key = hkdf::derive_pair_setup_key(&srp_key).map_err(|e| self.fail(e))?;
        self.session_key = Some(session_key);

        debug!("pair-setup M4 verified, session key derived");
        self.state = PairSetupState::M4Received;
        Ok(())
    }

    /// Generate M5: our signed identity, encrypted under the session key.
    pub fn generate_m5(&mut self) -> Result<Vec<u8>> {
        if self.state != PairSetupState::M4Received {
            return Err(self.fail(PairingError::InvalidState(
                "M5 can only be generated after processing M4".to_string(),
            )));
        }

        let session_key = *self.session_key.as_ref().expect("set in process_m4");
        let srp_key = self.srp_session_key();

        let ios_device_x = hkdf::derive_controller_sign_key(&srp_key).map_err(|e| self.fail(e))?;

        // info = iOSDeviceX || client_id || client_ltpk
        let mut message = Vec::with_capacity(32 + 16 + 32);
        message.extend_from_slice(&ios_device_x);
        message.extend_from_slice(&self.identity.id_bytes());
        message.extend_from_slice(&self.identity.public_key());
        let signature = self.identity.sign(&message);

        let mut inner_tlv = Tlv8::new();
        inner_tlv.set(TlvTag::Identifier, self.identity.id_bytes().to_vec());
        inner_tlv.set(TlvTag::PublicKey, self.identity.public_key().to_vec());
        inner_tlv.set(TlvTag::Signature, signature.to_vec());
        if let Some(name) = &self.device_name {
            let info = Value::dict([("name", name.as_str().into())]);
            let packed = companion_opack::pack(&info)
                .map_err(|e| self.fail(e))?;
            inner_tlv.set(TlvTag::Name, packed);
        }

        let nonce = nonce_from_string(PS_MSG05_NONCE);
        let encrypted = encrypt_with_nonce(&session_key, &nonce, &inner_tlv.encode())
            .map_err(|e| self.fail(e))?;

        let mut tlv = Tlv8::new();
        tlv.set(TlvTag::SeqNo, vec![0x05]);
        tlv.set(TlvTag::EncryptedData, encrypted);

        self.state = PairSetupState::M5Sent;
        Ok(tlv.encode())
    }

    /// Process M6, completing the pairing and returning the credentials.
    pub fn process_m6(&mut self, response: &[u8]) -> Result<Credentials> {
        if self.state != PairSetupState::M5Sent {
            return Err(self.fail(PairingError::InvalidState(
                "M6 can only be processed after sending M5".to_string(),
            )));
        }

        let tlv = self.parse_and_check(response, 0x06)?;
        let encrypted_data = self.require(&tlv, TlvTag::EncryptedData)?.to_vec();

        let session_key = *self.session_key.as_ref().expect("set in process_m4");
        let nonce = nonce_from_string(PS_MSG06_NONCE);
        let decrypted = decrypt_with_nonce(&session_key, &nonce, &encrypted_data)
            .map_err(|e| self.fail(e))?;

        let inner_tlv = Tlv8::parse(&decrypted).map_err(|e| self.fail(e))?;
        let device_id = self.require(&inner_tlv, TlvTag::Identifier)?.to_vec();
        let device_ltpk = self.require(&inner_tlv, TlvTag::PublicKey)?.to_vec();
        let signature = self.require(&inner_tlv, TlvTag::Signature)?.to_vec();

        let device_ltpk: [u8; 32] = device_ltpk
            .as_slice()
            .try_into()
            .map_err(|_| self.fail(PairingError::TlvParse("device LTPK must be 32 bytes".to_string())))?;
        let signature: [u8; 64] = signature
            .as_slice()
            .try_into()
            .map_err(|_| self.fail(PairingError::TlvParse("signature must be 64 bytes".to_string())))?;

        // The device signs AccessoryX || AccessoryID || AccessoryLTPK.
        let srp_key = self.srp_session_key();
        let accessory_x = hkdf::derive_accessory_sign_key(&srp_key).map_err(|e| self.fail(e))?;
        let mut message = Vec::with_capacity(32 + device_id.len() + 32);
        message.extend_from_slice(&accessory_x);
        message.extend_from_slice(&device_id);
        message.extend_from_slice(&device_ltpk);

        if ed25519::verify(&device_ltpk, &message, &signature).is_err() {
            return Err(self.fail(PairingError::SignatureInvalid));
        }

        debug!(device_id_len = device_id.len(), "pair-setup complete");
        self.state = PairSetupState::Complete;

        Ok(Credentials {
            device_ltpk,
            client_ltsk: self.identity.seed(),
            device_id,
            client_id: self.identity.id(),
        })
    }

    /// Check if pairing completed successfully.
    pub fn is_complete(&self) -> bool {
        self.state == PairSetupState::Complete
    }

    /// Parse a response, surface device errors, and check the sequence number.
    fn parse_and_check(&mut self, response: &[u8], expected_seq: u8) -> Result<Tlv8> {
        let tlv = Tlv8::parse(response).map_err(|e| self.fail(e))?;

        if let Some(code) = tlv.error() {
            let err = match code {
                error_code::AUTHENTICATION => PairingError::Authentication,
                error_code::MAX_TRIES => PairingError::MaxTries,
                error_code::BACKOFF => PairingError::BackOff {
                    seconds: tlv.back_off_seconds().unwrap_or(0),
                },
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
                self.state = PairSetupState::Failed;
                Err(PairingError::MissingTlv(tag as u8).into())
            }
        }
    }

    fn srp_session_key(&self) -> Vec<u8> {
        self.srp_proof
            .as_ref()
            .expect("set in process_m2")
            .session_key
            .clone()
    }

    fn fail(&mut self, err: impl Into<Error>) -> Error {
        self.state = PairSetupState::Failed;
        err.into()
    }
}

#[cfg(test)]
pub(crate) mod mock_device {
    //! In-test pair-setup device driving the accessory side of the flow.

    use super::*;
    use companion_crypto::ed25519::IdentityKeyPair;
    use companion_crypto::srp::SrpParams;
    use num_bigint::{BigUint, RandBigInt};
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha512};

    const N_BYTES: usize = 384;

    fn pad_to_n(value: &BigUint) -> Vec<u8> {
        let bytes = value.to_bytes_be();
        if bytes.len() >= N_BYTES {
            bytes[bytes.len() - N_BYTES..].to_vec()
        } else {
            let mut padded = vec![0u8; N_BYTES - bytes.len()];
            padded.extend_from_slice(&bytes);
            padded
        }
    }

    pub struct MockSetupDevice {
        pub identity: IdentityKeyPair,
        pub device_id: Vec<u8>,
        params: SrpParams,
        salt: Vec<u8>,
        verifier: BigUint,
        private_key: BigUint,
        public_key: BigUint,
        session_key: Option<Vec<u8>>,
        /// Sign M6 with a key that does not match the advertised LTPK.
        pub corrupt_m6_signature: bool,
    }

    impl MockSetupDevice {
        pub fn new(pin: &str) -> Self {
            let params = SrpParams::default();
            let salt = OsRng.gen_biguint(128).to_bytes_be();

            // x = H(salt || H("Pair-Setup" || ":" || pin))
            let mut hasher = Sha512::new();
            hasher.update(b"Pair-Setup");
            hasher.update(b":");
            hasher.update(pin.as_bytes());
            let inner = hasher.finalize();
            let mut hasher = Sha512::new();
            hasher.update(&salt);
            hasher.update(inner);
            let x = BigUint::from_bytes_be(&hasher.finalize());

            let verifier = params.g.modpow(&x, &params.n);
            let b = OsRng.gen_biguint(256);

            // k = H(N || PAD(g))
            let mut hasher = Sha512::new();
            hasher.update(pad_to_n(&params.n));
            hasher.update(pad_to_n(&params.g));
            let k = BigUint::from_bytes_be(&hasher.finalize());

            // B = (k*v + g^b) mod N
            let g_b = params.g.modpow(&b, &params.n);
            let k_v = (&k * &verifier) % &params.n;
            let public_key = (&k_v + &g_b) % &params.n;

            Self {
                identity: IdentityKeyPair::generate(),
                device_id: b"AA:BB:CC:DD:EE:FF".to_vec(),
                params,
                salt,
                verifier,
                private_key: b,
                public_key,
                session_key: None,
                corrupt_m6_signature: false,
            }
        }

        pub fn generate_m2(&self) -> Vec<u8> {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x02]);
            tlv.set(TlvTag::PublicKey, pad_to_n(&self.public_key));
            tlv.set(TlvTag::Salt, self.salt.clone());
            tlv.encode()
        }

        pub fn error_response(seq: u8, code: u8, back_off: Option<u16>) -> Vec<u8> {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![seq]);
            tlv.set(TlvTag::Error, vec![code]);
            if let Some(seconds) = back_off {
                tlv.set(TlvTag::BackOff, seconds.to_le_bytes().to_vec());
            }
            tlv.encode()
        }

        /// Consume M3 and answer M4 (verifying nothing, like a lenient device).
        pub fn process_m3(&mut self, m3: &[u8]) -> Vec<u8> {
            let tlv = Tlv8::parse(m3).unwrap();
            let client_public = tlv.get(TlvTag::PublicKey).unwrap();
            let client_proof = tlv.get(TlvTag::Proof).unwrap();

            let a = BigUint::from_bytes_be(client_public);

            // u = H(PAD(A) || PAD(B))
            let mut hasher = Sha512::new();
            hasher.update(pad_to_n(&a));
            hasher.update(pad_to_n(&self.public_key));
            let u = BigUint::from_bytes_be(&hasher.finalize());

            // S = (A * v^u)^b mod N, K = H(PAD(S))
            let v_u = self.verifier.modpow(&u, &self.params.n);
            let base = (&a * &v_u) % &self.params.n;
            let s = base.modpow(&self.private_key, &self.params.n);
            let session_key = Sha512::digest(pad_to_n(&s)).to_vec();

            // M2 = H(PAD(A) || M1 || K)
            let mut hasher = Sha512::new();
            hasher.update(pad_to_n(&a));
            hasher.update(client_proof);
            hasher.update(&session_key);
            let server_proof = hasher.finalize().to_vec();

            self.session_key = Some(session_key);

            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x04]);
            tlv.set(TlvTag::Proof, server_proof);
            tlv.encode()
        }

        /// Consume M5 (decrypting the client identity) and answer M6.
        pub fn process_m5(&self, m5: &[u8]) -> Vec<u8> {
            let session_key_srp = self.session_key.as_ref().unwrap();
            let encrypt_key = hkdf::derive_pair_setup_key(session_key_srp).unwrap();

            let tlv = Tlv8::parse(m5).unwrap();
            let encrypted = tlv.get(TlvTag::EncryptedData).unwrap();
            let nonce = nonce_from_string(PS_MSG05_NONCE);
            let decrypted = decrypt_with_nonce(&encrypt_key, &nonce, encrypted)
                .expect("device failed to decrypt M5");
            let inner = Tlv8::parse(&decrypted).unwrap();
            assert!(inner.contains(TlvTag::Identifier));
            assert!(inner.contains(TlvTag::PublicKey));
            assert!(inner.contains(TlvTag::Signature));

            // AccessoryX || AccessoryID || AccessoryLTPK
            let accessory_x = hkdf::derive_accessory_sign_key(session_key_srp).unwrap();
            let mut message = Vec::new();
            message.extend_from_slice(&accessory_x);
            message.extend_from_slice(&self.device_id);
            message.extend_from_slice(&self.identity.public_key());
            let signer = if self.corrupt_m6_signature {
                IdentityKeyPair::generate()
            } else {
                self.identity.clone()
            };
            let signature = signer.sign(&message);

            let mut inner_tlv = Tlv8::new();
            inner_tlv.set(TlvTag::Identifier, self.device_id.clone());
            inner_tlv.set(TlvTag::PublicKey, self.identity.public_key().to_vec());
            inner_tlv.set(TlvTag::Signature, signature.to_vec());

            let nonce = nonce_from_string(PS_MSG06_NONCE);
            let encrypted = encrypt_with_nonce(&encrypt_key, &nonce, &inner_tlv.encode()).unwrap();

            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x06]);
            tlv.set(TlvTag::EncryptedData, encrypted);
            tlv.encode()
        }
    }
}
