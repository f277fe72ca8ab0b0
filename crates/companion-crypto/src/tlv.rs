//! TLV8 encoding/decoding for HomeKit-style pairing messages.
//!
//! TLV8 format: [Tag: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are split across consecutive records with the
//! same tag. Tag insertion order is preserved through write and read.

use companion_core::error::PairingError;

/// TLV tag constants for pair-setup and pair-verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvTag {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    SeqNo = 0x06,
    Error = 0x07,
    BackOff = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    SessionId = 0x0E,
    Name = 0x11,
    Flags = 0x13,
    Separator = 0xFF,
}

/// Pairing error codes carried in the `Error` tag.
pub mod error_code {
    pub const UNKNOWN: u8 = 0x01;
    pub const AUTHENTICATION: u8 = 0x02;
    pub const BACKOFF: u8 = 0x03;
    pub const MAX_PEERS: u8 = 0x04;
    pub const MAX_TRIES: u8 = 0x05;
    pub const UNAVAILABLE: u8 = 0x06;
    pub const BUSY: u8 = 0x07;
}

/// A TLV8 record: ordered multimap from tag to concatenated value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    entries: Vec<(u8, Vec<u8>)>,
}

impl Tlv8 {
    /// Create empty TLV8 record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TLV8 from bytes.
    ///
    /// Consecutive records sharing a tag are concatenated into one logical
    /// value (the writer splits values longer than 255 bytes this way).
    pub fn parse(data: &[u8]) -> Result<Self, PairingError> {
        let mut entries: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut i = 0;
        let mut last_tag: Option<u8> = None;

        while i < data.len() {
            if i + 2 > data.len() {
                return Err(PairingError::TlvParse("truncated header".to_string()));
            }

            let tag = data[i];
            let len = data[i + 1] as usize;
            i += 2;

            if i + len > data.len() {
                return Err(PairingError::TlvParse(format!(
                    "truncated value (expected {} bytes, got {})",
                    len,
                    data.len() - i
                )));
            }

            let value = &data[i..i + len];
            i += len;

            if last_tag == Some(tag) {
                // Continuation chunk of the previous record.
                if let Some((_, existing)) = entries.iter_mut().rev().find(|(t, _)| *t == tag) {
                    existing.extend_from_slice(value);
                }
            } else if let Some((_, existing)) = entries.iter_mut().find(|(t, _)| *t == tag) {
                existing.extend_from_slice(value);
            } else {
                entries.push((tag, value.to_vec()));
            }

            last_tag = Some(tag);
        }

        Ok(Self { entries })
    }

    /// Encode to bytes in insertion order.
    ///
    /// Values longer than 255 bytes are split into 255-byte chunks plus a
    /// trailing remainder chunk.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::new();

        for (tag, value) in &self.entries {
            if value.is_empty() {
                result.push(*tag);
                result.push(0);
            } else {
                for chunk in value.chunks(255) {
                    result.push(*tag);
                    result.push(chunk.len() as u8);
                    result.extend_from_slice(chunk);
                }
            }
        }

        result
    }

    /// Get value for tag.
    pub fn get(&self, tag: TlvTag) -> Option<&[u8]> {
        self.get_raw(tag as u8)
    }

    /// Get value for raw tag.
    pub fn get_raw(&self, tag: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Set value for tag, replacing any existing value.
    pub fn set(&mut self, tag: TlvTag, value: impl Into<Vec<u8>>) {
        self.set_raw(tag as u8, value)
    }

    /// Set value for raw tag.
    pub fn set_raw(&mut self, tag: u8, value: impl Into<Vec<u8>>) {
        let value = value.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            *existing = value;
        } else {
            self.entries.push((tag, value));
        }
    }

    /// Check if tag is present.
    pub fn contains(&self, tag: TlvTag) -> bool {
        self.get(tag).is_some()
    }

    /// Iterate `(tag, value)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    /// Get sequence number (single byte).
    pub fn seq_no(&self) -> Option<u8> {
        self.get(TlvTag::SeqNo).and_then(|v| v.first().copied())
    }

    /// Get error code (single byte).
    pub fn error(&self) -> Option<u8> {
        self.get(TlvTag::Error).and_then(|v| v.first().copied())
    }

    /// Get back-off delay in seconds (little-endian, 1-2 bytes).
    pub fn back_off_seconds(&self) -> Option<u16> {
        self.get(TlvTag::BackOff).map(|v| match v.len() {
            0 => 0,
            1 => v[0] as u16,
            _ => u16::from_le_bytes([v[0], v[1]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn parse_empty() {
            let tlv = Tlv8::parse(&[]).unwrap();
            assert!(!tlv.contains(TlvTag::SeqNo));
        }

        #[test]
        fn parse_single_record() {
            let data = [0x06, 0x01, 0x01];
            let tlv = Tlv8::parse(&data).unwrap();
            assert_eq!(tlv.seq_no(), Some(0x01));
        }

        #[test]
        fn parse_multiple_records() {
            let data = [
                0x06, 0x01, 0x01, // SeqNo=1
                0x00, 0x01, 0x00, // Method=0
            ];
            let tlv = Tlv8::parse(&data).unwrap();
            assert_eq!(tlv.seq_no(), Some(0x01));
            assert_eq!(tlv.get(TlvTag::Method), Some([0x00].as_slice()));
        }

        #[test]
        fn parse_zero_length_value() {
            let data = [0x06, 0x00];
            let tlv = Tlv8::parse(&data).unwrap();
            assert_eq!(tlv.get(TlvTag::SeqNo), Some([].as_slice()));
        }

        #[test]
        fn parse_chunked_value() {
            // 300 bytes split: 255 + 45
            let mut data = vec![0x03, 0xFF];
            data.extend(vec![0xAA; 255]);
            data.extend([0x03, 0x2D]);
            data.extend(vec![0xBB; 45]);

            let tlv = Tlv8::parse(&data).unwrap();
            let pk = tlv.get(TlvTag::PublicKey).unwrap();
            assert_eq!(pk.len(), 300);
            assert!(pk[..255].iter().all(|&b| b == 0xAA));
            assert!(pk[255..].iter().all(|&b| b == 0xBB));
        }

        #[test]
        fn parse_preserves_insertion_order() {
            let data = [
                0x0A, 0x01, 0x01, // Signature first
                0x01, 0x01, 0x02, // then Identifier
            ];
            let tlv = Tlv8::parse(&data).unwrap();
            let tags: Vec<u8> = tlv.iter().map(|(t, _)| t).collect();
            assert_eq!(tags, vec![0x0A, 0x01]);
        }

        #[test]
        fn parse_error_on_truncated_header() {
            assert!(Tlv8::parse(&[0x06]).is_err());
        }

        #[test]
        fn parse_error_on_truncated_value() {
            let data = [0x06, 0x05, 0x01, 0x02];
            assert!(Tlv8::parse(&data).is_err());
        }
    }

    mod encoding {
        use super::*;

        #[test]
        fn encode_empty() {
            assert!(Tlv8::new().encode().is_empty());
        }

        #[test]
        fn encode_single_record() {
            let mut tlv = Tlv8::new();
            tlv.set_raw(10, b"123".to_vec());
            assert_eq!(tlv.encode(), vec![0x0A, 0x03, 0x31, 0x32, 0x33]);
        }

        #[test]
        fn encode_single_record_roundtrips() {
            let encoded = vec![0x0A, 0x03, 0x31, 0x32, 0x33];
            let tlv = Tlv8::parse(&encoded).unwrap();
            assert_eq!(tlv.get_raw(10), Some(b"123".as_slice()));
            assert_eq!(tlv.encode(), encoded);
        }

        #[test]
        fn encode_chunks_256_byte_value() {
            let mut tlv = Tlv8::new();
            tlv.set_raw(2, vec![0x31; 256]);
            let encoded = tlv.encode();

            // 02 FF <255 x 0x31> 02 01 31
            assert_eq!(encoded.len(), 2 + 255 + 2 + 1);
            assert_eq!(encoded[0], 0x02);
            assert_eq!(encoded[1], 0xFF);
            assert!(encoded[2..257].iter().all(|&b| b == 0x31));
            assert_eq!(encoded[257], 0x02);
            assert_eq!(encoded[258], 0x01);
            assert_eq!(encoded[259], 0x31);
        }

        #[test]
        fn encode_preserves_insertion_order() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x01]);
            tlv.set(TlvTag::Method, vec![0x00]);
            assert_eq!(
                tlv.encode(),
                vec![
                    0x06, 0x01, 0x01, // SeqNo first (inserted first)
                    0x00, 0x01, 0x00, // Method second
                ]
            );
        }

        #[test]
        fn encode_roundtrip_large_values() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x03]);
            tlv.set(TlvTag::PublicKey, vec![0xAB; 384]); // SRP public key size
            tlv.set(TlvTag::Proof, vec![0xCD; 64]);

            let decoded = Tlv8::parse(&tlv.encode()).unwrap();
            assert_eq!(decoded, tlv);
        }
    }

    mod accessors {
        use super::*;

        #[test]
        fn set_replaces_existing_value() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::SeqNo, vec![0x01]);
            tlv.set(TlvTag::SeqNo, vec![0x02]);
            assert_eq!(tlv.seq_no(), Some(0x02));
            assert_eq!(tlv.iter().count(), 1);
        }

        #[test]
        fn get_missing_tag() {
            assert_eq!(Tlv8::new().get(TlvTag::SeqNo), None);
        }

        #[test]
        fn back_off_seconds_little_endian() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::BackOff, vec![0x2C, 0x01]);
            assert_eq!(tlv.back_off_seconds(), Some(300));

            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::BackOff, vec![30]);
            assert_eq!(tlv.back_off_seconds(), Some(30));
        }

        #[test]
        fn error_returns_first_byte() {
            let mut tlv = Tlv8::new();
            tlv.set(TlvTag::Error, vec![error_code::AUTHENTICATION]);
            assert_eq!(tlv.error(), Some(0x02));
        }
    }
}
