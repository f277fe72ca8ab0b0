//! OPACK encoder.

use crate::value::{IntWidth, Value};
use companion_core::error::CodecError;
use std::collections::HashMap;

/// Terminator byte for endless arrays and maps.
pub(crate) const TERMINATOR: u8 = 0x03;

/// Largest item count the short collection headers can express.
const SHORT_COLLECTION_MAX: usize = 0x0E;

/// Encode a value tree to OPACK bytes.
pub fn pack(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut packer = Packer::default();
    let mut out = Vec::new();
    packer.pack_value(value, &mut out)?;
    Ok(out)
}

/// Encoder state: the ordered back-reference table plus a hash index over it
/// so duplicate lookup is constant time.
#[derive(Default)]
struct Packer {
    table: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, usize>,
}

impl Packer {
    fn pack_value(&mut self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match value {
            Value::Array(items) => {
                if items.len() <= SHORT_COLLECTION_MAX {
                    out.push(0xD0 + items.len() as u8);
                    for item in items {
                        self.pack_value(item, out)?;
                    }
                } else {
                    out.push(0xDF);
                    for item in items {
                        self.pack_value(item, out)?;
                    }
                    out.push(TERMINATOR);
                }
                Ok(())
            }
            Value::Dict(entries) => {
                if entries.len() <= SHORT_COLLECTION_MAX {
                    out.push(0xE0 + entries.len() as u8);
                } else {
                    out.push(0xEF);
                }
                for (key, item) in entries {
                    self.pack_scalar(&Value::String(key.clone()), out)?;
                    self.pack_value(item, out)?;
                }
                if entries.len() > SHORT_COLLECTION_MAX {
                    out.push(TERMINATOR);
                }
                Ok(())
            }
            scalar => self.pack_scalar(scalar, out),
        }
    }

    /// Emit a non-composite value, deduplicating against the table.
    fn pack_scalar(&mut self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let encoded = encode_scalar(value)?;
        if encoded.len() == 1 {
            // One-byte forms are cheaper than any reference and never indexed.
            out.push(encoded[0]);
            return Ok(());
        }

        if let Some(&index) = self.index.get(&encoded) {
            emit_back_reference(index, out);
            return Ok(());
        }

        out.extend_from_slice(&encoded);
        self.index.insert(encoded.clone(), self.table.len());
        self.table.push(encoded);
        Ok(())
    }
}

/// Emit the shortest back-reference form that can express `index`.
fn emit_back_reference(index: usize, out: &mut Vec<u8>) {
    if index < 0x21 {
        out.push(0xA0 + index as u8);
    } else if index <= 0xFF {
        out.push(0xC1);
        out.push(index as u8);
    } else if index <= 0xFFFF {
        out.push(0xC2);
        out.extend_from_slice(&(index as u16).to_le_bytes());
    } else if index <= 0xFF_FFFF {
        out.push(0xC3);
        out.extend_from_slice(&(index as u32).to_le_bytes()[..3]);
    } else {
        out.push(0xC4);
        out.extend_from_slice(&(index as u32).to_le_bytes());
    }
}

fn encode_scalar(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    match value {
        Value::Bool(true) => out.push(0x01),
        Value::Bool(false) => out.push(0x02),
        Value::Null => out.push(0x04),
        Value::Uuid(uuid) => {
            out.push(0x05);
            out.extend_from_slice(uuid.as_bytes());
        }
        Value::Int(n) => encode_int(*n, IntWidth::minimal_for(*n), &mut out),
        Value::SizedInt(n, width) => {
            if !width.fits(*n) {
                return Err(CodecError::ValueTooLarge(format!(
                    "{n} does not fit in {} byte(s)",
                    width.bytes()
                )));
            }
            encode_sized_int(*n, *width, &mut out);
        }
        Value::Float32(f) => {
            out.push(0x35);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Value::Float64(f) => {
            out.push(0x36);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            match bytes.len() {
                len @ 0..=0x20 => out.push(0x40 + len as u8),
                len if len <= 0xFF => {
                    out.push(0x61);
                    out.push(len as u8);
                }
                len if len <= 0xFFFF => {
                    out.push(0x62);
                    out.extend_from_slice(&(len as u16).to_le_bytes());
                }
                len if len <= 0xFF_FFFF => {
                    out.push(0x63);
                    out.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
                }
                len if len <= u32::MAX as usize => {
                    out.push(0x64);
                    out.extend_from_slice(&(len as u32).to_le_bytes());
                }
                len => return Err(CodecError::ValueTooLarge(format!("string of {len} bytes"))),
            }
            out.extend_from_slice(bytes);
        }
        Value::Bytes(bytes) => {
            match bytes.len() {
                len @ 0..=0x20 => out.push(0x70 + len as u8),
                len if len <= 0xFF => {
                    out.push(0x91);
                    out.push(len as u8);
                }
                len if len <= 0xFFFF => {
                    out.push(0x92);
                    out.extend_from_slice(&(len as u16).to_le_bytes());
                }
                len if len <= u32::MAX as usize => {
                    out.push(0x93);
                    out.extend_from_slice(&(len as u32).to_le_bytes());
                }
                len => {
                    out.push(0x94);
                    out.extend_from_slice(&(len as u64).to_le_bytes());
                }
            }
            out.extend_from_slice(bytes);
        }
        Value::Array(_) | Value::Dict(_) => {
            unreachable!("composites are handled by pack_value")
        }
    }
    Ok(out)
}

fn encode_int(n: u64, minimal: IntWidth, out: &mut Vec<u8>) {
    if n <= 0x27 {
        out.push(0x08 + n as u8);
    } else {
        encode_sized_int(n, minimal, out);
    }
}

fn encode_sized_int(n: u64, width: IntWidth, out: &mut Vec<u8>) {
    let tag = match width {
        IntWidth::One => 0x30,
        IntWidth::Two => 0x31,
        IntWidth::Four => 0x32,
        IntWidth::Eight => 0x33,
    };
    out.push(tag);
    out.extend_from_slice(&n.to_le_bytes()[..width.bytes()]);
}
