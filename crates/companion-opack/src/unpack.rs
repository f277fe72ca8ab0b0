//! OPACK decoder.

use crate::pack::TERMINATOR;
use crate::value::{IntWidth, Value};
use companion_core::error::CodecError;
use uuid::Uuid;

/// Decode a single OPACK value; trailing bytes are a fatal error.
pub fn unpack(data: &[u8]) -> Result<Value, CodecError> {
    let mut unpacker = Unpacker {
        data,
        pos: 0,
        table: Vec::new(),
    };
    let value = unpacker.unpack_value()?;
    let remaining = data.len() - unpacker.pos;
    if remaining != 0 {
        return Err(CodecError::TrailingBytes(remaining));
    }
    Ok(value)
}

struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
    /// Parallel back-reference table: decoded values in definition order.
    table: Vec<Value>,
}

impl<'a> Unpacker<'a> {
    fn unpack_value(&mut self) -> Result<Value, CodecError> {
        let start = self.pos;
        let tag = self.take_byte()?;

        let (value, indexable) = match tag {
            0x01 => (Value::Bool(true), false),
            0x02 => (Value::Bool(false), false),
            0x04 => (Value::Null, false),
            0x05 => {
                let bytes: [u8; 16] = self.take(16)?.try_into().expect("16-byte slice");
                (Value::Uuid(Uuid::from_bytes(bytes)), true)
            }
            // Absolute time: eight bytes decoded as an integer.
            0x06 => (Value::Int(self.take_uint(8)?), true),
            0x08..=0x2F => (Value::Int((tag - 0x08) as u64), false),
            0x30..=0x33 => {
                let width = match tag {
                    0x30 => IntWidth::One,
                    0x31 => IntWidth::Two,
                    0x32 => IntWidth::Four,
                    _ => IntWidth::Eight,
                };
                (Value::SizedInt(self.take_uint(width.bytes())?, width), true)
            }
            0x35 => {
                let bytes: [u8; 4] = self.take(4)?.try_into().expect("4-byte slice");
                (Value::Float32(f32::from_le_bytes(bytes)), true)
            }
            0x36 => {
                let bytes: [u8; 8] = self.take(8)?.try_into().expect("8-byte slice");
                (Value::Float64(f64::from_le_bytes(bytes)), true)
            }
            0x40..=0x60 => (self.take_string((tag - 0x40) as usize)?, true),
            0x61..=0x64 => {
                let len_width = match tag {
                    0x61 => 1,
                    0x62 => 2,
                    0x63 => 3,
                    _ => 4,
                };
                let len = self.take_uint(len_width)? as usize;
                (self.take_string(len)?, true)
            }
            0x70..=0x90 => {
                let bytes = self.take((tag - 0x70) as usize)?.to_vec();
                (Value::Bytes(bytes), true)
            }
            0x91..=0x94 => {
                let len_width = match tag {
                    0x91 => 1,
                    0x92 => 2,
                    0x93 => 4,
                    _ => 8,
                };
                let len = self.take_uint(len_width)? as usize;
                (Value::Bytes(self.take(len)?.to_vec()), true)
            }
            0xA0..=0xC0 => return self.resolve_back_reference((tag - 0xA0) as usize),
            0xC1..=0xC4 => {
                let index_width = match tag {
                    0xC1 => 1,
                    0xC2 => 2,
                    0xC3 => 3,
                    _ => 4,
                };
                let index = self.take_uint(index_width)? as usize;
                return self.resolve_back_reference(index);
            }
            0xD0..=0xDE => {
                let count = (tag & 0x0F) as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.unpack_value()?);
                }
                (Value::Array(items), false)
            }
            0xDF => {
                let mut items = Vec::new();
                while !self.consume_terminator()? {
                    items.push(self.unpack_value()?);
                }
                (Value::Array(items), false)
            }
            0xE0..=0xEE => {
                let count = (tag & 0x0F) as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    entries.push(self.unpack_entry()?);
                }
                (Value::Dict(entries), false)
            }
            0xEF => {
                let mut entries = Vec::new();
                while !self.consume_terminator()? {
                    entries.push(self.unpack_entry()?);
                }
                (Value::Dict(entries), false)
            }
            other => return Err(CodecError::UnknownTag(other)),
        };

        // Mirror of the encoder's table rule: multi-byte, non-reference,
        // non-composite values define a back-reference slot.
        if indexable && self.pos - start > 1 {
            self.table.push(value.clone());
        }

        Ok(value)
    }

    fn unpack_entry(&mut self) -> Result<(String, Value), CodecError> {
        let key = match self.unpack_value()? {
            Value::String(key) => key,
            _ => return Err(CodecError::NonStringKey),
        };
        let value = self.unpack_value()?;
        Ok((key, value))
    }

    fn resolve_back_reference(&mut self, index: usize) -> Result<Value, CodecError> {
        self.table
            .get(index)
            .cloned()
            .ok_or(CodecError::BadBackReference(index))
    }

    /// Consume the endless-collection terminator if it is next.
    fn consume_terminator(&mut self) -> Result<bool, CodecError> {
        match self.data.get(self.pos) {
            Some(&TERMINATOR) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CodecError::Truncated { needed: 1 }),
        }
    }

    fn take_byte(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(CodecError::Truncated { needed: 1 })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + len > self.data.len() {
            return Err(CodecError::Truncated {
                needed: self.pos + len - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_uint(&mut self, width: usize) -> Result<u64, CodecError> {
        let slice = self.take(width)?;
        let mut bytes = [0u8; 8];
        bytes[..width].copy_from_slice(slice);
        Ok(u64::from_le_bytes(bytes))
    }

    fn take_string(&mut self, len: usize) -> Result<Value, CodecError> {
        let bytes = self.take(len)?.to_vec();
        let string = String::from_utf8(bytes)
            .map_err(|_| CodecError::InvalidFormat("string is not valid UTF-8".to_string()))?;
        Ok(Value::String(string))
    }
}
