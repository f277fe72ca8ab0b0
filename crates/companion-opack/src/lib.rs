//! # companion-opack
//!
//! OPACK is the tagged binary serialization used by the Companion protocol.
//! The first byte of every value carries the type and, for short forms, the
//! length. Multi-byte scalar values are deduplicated: a repeated value is
//! replaced by a back-reference to the position where it was first emitted.
//!
//! ```
//! use companion_opack::{pack, unpack, Value};
//!
//! let request = Value::dict([
//!     ("_i", "_systemInfo".into()),
//!     ("_t", Value::Int(2)),
//!     ("_x", Value::Int(0x1234)),
//! ]);
//! let bytes = pack(&request).unwrap();
//! assert_eq!(unpack(&bytes).unwrap(), request);
//! ```

mod pack;
mod unpack;
mod value;

pub use pack::pack;
pub use unpack::unpack;
pub use value::{IntWidth, Value};

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        unpack(&pack(value).unwrap()).unwrap()
    }

    mod scalars {
        use super::*;

        #[test]
        fn booleans_and_null() {
            assert_eq!(pack(&Value::Bool(true)).unwrap(), vec![0x01]);
            assert_eq!(pack(&Value::Bool(false)).unwrap(), vec![0x02]);
            assert_eq!(pack(&Value::Null).unwrap(), vec![0x04]);
            assert_eq!(roundtrip(&Value::Bool(true)), Value::Bool(true));
            assert_eq!(roundtrip(&Value::Null), Value::Null);
        }

        #[test]
        fn small_int_boundaries() {
            assert_eq!(pack(&Value::Int(0)).unwrap(), vec![0x08]);
            assert_eq!(pack(&Value::Int(0x27)).unwrap(), vec![0x2F]);
            // 0x28 no longer fits the small-int range
            assert_eq!(pack(&Value::Int(0x28)).unwrap(), vec![0x30, 0x28]);
        }

        #[test]
        fn sized_ints_use_minimal_width() {
            assert_eq!(pack(&Value::Int(0xFF)).unwrap(), vec![0x30, 0xFF]);
            assert_eq!(pack(&Value::Int(0x1234)).unwrap(), vec![0x31, 0x34, 0x12]);
            assert_eq!(
                pack(&Value::Int(0xDEAD_BEEF)).unwrap(),
                vec![0x32, 0xEF, 0xBE, 0xAD, 0xDE]
            );
            assert_eq!(
                pack(&Value::Int(0x0102_0304_0506_0708)).unwrap(),
                vec![0x33, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
            );
        }

        #[test]
        fn explicit_width_is_preserved_across_roundtrip() {
            let value = Value::SizedInt(5, IntWidth::Four);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes, vec![0x32, 0x05, 0x00, 0x00, 0x00]);
            let decoded = unpack(&bytes).unwrap();
            assert!(matches!(decoded, Value::SizedInt(5, IntWidth::Four)));
            // Re-encoding reproduces the original bytes.
            assert_eq!(pack(&decoded).unwrap(), bytes);
        }

        #[test]
        fn explicit_width_rejects_overflow() {
            let value = Value::SizedInt(0x1_0000, IntWidth::Two);
            assert!(pack(&value).is_err());
        }

        #[test]
        fn floats() {
            let bytes = pack(&Value::Float32(1.5)).unwrap();
            assert_eq!(bytes[0], 0x35);
            assert_eq!(bytes.len(), 5);
            assert_eq!(roundtrip(&Value::Float32(1.5)), Value::Float32(1.5));

            let bytes = pack(&Value::Float64(-0.25)).unwrap();
            assert_eq!(bytes[0], 0x36);
            assert_eq!(bytes.len(), 9);
            assert_eq!(roundtrip(&Value::Float64(-0.25)), Value::Float64(-0.25));
        }

        #[test]
        fn absolute_time_decodes_as_integer() {
            let mut data = vec![0x06];
            data.extend_from_slice(&1234u64.to_le_bytes());
            assert_eq!(unpack(&data).unwrap(), Value::Int(1234));
        }

        #[test]
        fn uuid_roundtrip() {
            let uuid = uuid::Uuid::from_bytes([0xAB; 16]);
            let bytes = pack(&Value::Uuid(uuid)).unwrap();
            assert_eq!(bytes[0], 0x05);
            assert_eq!(bytes.len(), 17);
            assert_eq!(roundtrip(&Value::Uuid(uuid)), Value::Uuid(uuid));
        }
    }

    mod strings_and_bytes {
        use super::*;

        #[test]
        fn short_string() {
            assert_eq!(
                pack(&Value::from("foo")).unwrap(),
                vec![0x43, 0x66, 0x6F, 0x6F]
            );
        }

        #[test]
        fn empty_string_is_one_byte() {
            assert_eq!(pack(&Value::from("")).unwrap(), vec![0x40]);
        }

        #[test]
        fn string_boundary_32_vs_33() {
            let s32 = "a".repeat(32);
            let bytes = pack(&Value::from(s32.clone())).unwrap();
            assert_eq!(bytes[0], 0x60);
            assert_eq!(roundtrip(&Value::from(s32.clone())), Value::from(s32));

            let s33 = "a".repeat(33);
            let bytes = pack(&Value::from(s33.clone())).unwrap();
            assert_eq!(bytes[0], 0x61);
            assert_eq!(bytes[1], 33);
            assert_eq!(roundtrip(&Value::from(s33.clone())), Value::from(s33));
        }

        #[test]
        fn long_string_two_byte_length() {
            let s = "b".repeat(300);
            let bytes = pack(&Value::from(s.clone())).unwrap();
            assert_eq!(bytes[0], 0x62);
            assert_eq!(&bytes[1..3], &300u16.to_le_bytes());
            assert_eq!(roundtrip(&Value::from(s.clone())), Value::from(s));
        }

        #[test]
        fn short_bytes() {
            let value = Value::Bytes(vec![0xDE, 0xAD]);
            assert_eq!(pack(&value).unwrap(), vec![0x72, 0xDE, 0xAD]);
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn long_bytes_one_and_two_byte_length() {
            let value = Value::Bytes(vec![0x5A; 40]);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes[0], 0x91);
            assert_eq!(bytes[1], 40);
            assert_eq!(roundtrip(&value), value);

            let value = Value::Bytes(vec![0x5A; 0x300]);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes[0], 0x92);
            assert_eq!(&bytes[1..3], &0x300u16.to_le_bytes());
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn invalid_utf8_is_rejected() {
            let data = vec![0x42, 0xFF, 0xFE];
            assert!(unpack(&data).is_err());
        }
    }

    mod collections {
        use super::*;

        #[test]
        fn short_array() {
            let value = Value::array([Value::Int(1), Value::Int(2)]);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes, vec![0xD2, 0x09, 0x0A]);
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn empty_array_and_dict() {
            assert_eq!(pack(&Value::array([])).unwrap(), vec![0xD0]);
            assert_eq!(pack(&Value::dict::<&str, _>([])).unwrap(), vec![0xE0]);
        }

        #[test]
        fn dict_encoding() {
            let value = Value::dict([("a", Value::Int(1))]);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes, vec![0xE1, 0x41, 0x61, 0x09]);
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn endless_array_for_15_plus_items() {
            let items: Vec<Value> = (0..20).map(Value::Int).collect();
            let value = Value::Array(items);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes[0], 0xDF);
            assert_eq!(*bytes.last().unwrap(), 0x03);
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn endless_map_for_15_plus_entries() {
            let entries: Vec<(String, Value)> =
                (0..16).map(|i| (format!("key{i:02}"), Value::Int(i))).collect();
            let value = Value::Dict(entries);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes[0], 0xEF);
            assert_eq!(*bytes.last().unwrap(), 0x03);
            assert_eq!(roundtrip(&value), value);
        }

        #[test]
        fn decoder_accepts_endless_form_at_any_size() {
            // {0xDF, "ab", 0x03}: an endless array the packer would have
            // written in short form.
            let data = vec![0xDF, 0x42, 0x61, 0x62, 0x03];
            assert_eq!(
                unpack(&data).unwrap(),
                Value::array([Value::from("ab")])
            );
        }

        #[test]
        fn fourteen_items_still_short_form() {
            let items: Vec<Value> = (0..14).map(Value::Int).collect();
            let bytes = pack(&Value::Array(items)).unwrap();
            assert_eq!(bytes[0], 0xDE);
        }

        #[test]
        fn non_string_map_key_is_rejected() {
            // {0xE1, 0x09 (int key), 0x09}
            let data = vec![0xE1, 0x09, 0x09];
            assert!(matches!(
                unpack(&data),
                Err(companion_core::CodecError::NonStringKey)
            ));
        }

        #[test]
        fn nested_structure_roundtrip() {
            let value = Value::dict([
                ("_i", "_hidC".into()),
                ("_t", Value::Int(2)),
                (
                    "_c",
                    Value::dict([
                        ("_hBtS", Value::Int(1)),
                        ("_hidC", Value::Int(6)),
                    ]),
                ),
                ("_x", Value::Int(0x1_0001)),
            ]);
            assert_eq!(roundtrip(&value), value);
        }
    }

    mod back_references {
        use super::*;

        #[test]
        fn repeated_strings_use_short_references() {
            let value = Value::array([
                "foo".into(),
                "bar".into(),
                "foo".into(),
                "bar".into(),
            ]);
            let bytes = pack(&value).unwrap();
            assert_eq!(
                bytes,
                vec![0xD4, 0x43, 0x66, 0x6F, 0x6F, 0x43, 0x62, 0x61, 0x72, 0xA0, 0xA1]
            );
            assert_eq!(unpack(&bytes).unwrap(), value);
        }

        #[test]
        fn dict_keys_are_deduplicated() {
            let value = Value::array([
                Value::dict([("name", "a".into())]),
                Value::dict([("name", "b".into())]),
            ]);
            let bytes = pack(&value).unwrap();
            // The second "name" key is a back-reference to the first.
            let key_count = bytes
                .windows(5)
                .filter(|w| *w == [0x44, b'n', b'a', b'm', b'e'])
                .count();
            assert_eq!(key_count, 1);
            assert_eq!(unpack(&bytes).unwrap(), value);
        }

        #[test]
        fn one_byte_values_are_never_referenced() {
            let value = Value::array([Value::Int(5), Value::Int(5), Value::Int(5)]);
            assert_eq!(pack(&value).unwrap(), vec![0xD3, 0x0D, 0x0D, 0x0D]);
        }

        #[test]
        fn repeated_sized_values_are_referenced() {
            let value = Value::array([Value::Int(1000), Value::Int(1000)]);
            let bytes = pack(&value).unwrap();
            assert_eq!(bytes, vec![0xD2, 0x31, 0xE8, 0x03, 0xA0]);
            assert_eq!(unpack(&bytes).unwrap(), value);
        }

        #[test]
        fn long_reference_form_after_33_definitions() {
            // 34 distinct multi-byte strings, then a repeat of the 34th:
            // its index (33) no longer fits the short reference range.
            let mut items: Vec<Value> = (0..34)
                .map(|i| Value::from(format!("value-{i:02}")))
                .collect();
            items.push(Value::from("value-33"));
            let value = Value::Array(items);
            let bytes = pack(&value).unwrap();
            assert_eq!(&bytes[bytes.len() - 3..bytes.len() - 1], &[0xC1, 33]);
            assert_eq!(*bytes.last().unwrap(), 0x03); // endless terminator
            assert_eq!(unpack(&bytes).unwrap(), value);
        }

        #[test]
        fn reference_to_undefined_index_is_fatal() {
            let data = vec![0xD1, 0xA0];
            assert!(matches!(
                unpack(&data),
                Err(companion_core::CodecError::BadBackReference(0))
            ));
        }

        #[test]
        fn references_never_target_composites() {
            // Two identical inner arrays must both be emitted in full.
            let inner = Value::array(["x".into(), "y".into()]);
            let value = Value::array([inner.clone(), inner]);
            let bytes = pack(&value).unwrap();
            // Array headers appear twice, strings are deduplicated.
            assert_eq!(bytes.iter().filter(|&&b| b == 0xD2).count(), 2);
            assert_eq!(unpack(&bytes).unwrap(), value);
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn unknown_tag_is_fatal() {
            for tag in [0x07u8, 0x34, 0x37, 0x9F] {
                assert!(matches!(
                    unpack(&[tag]),
                    Err(companion_core::CodecError::UnknownTag(t)) if t == tag
                ));
            }
        }

        #[test]
        fn truncated_inputs_are_fatal() {
            assert!(unpack(&[]).is_err());
            assert!(unpack(&[0x43, 0x66]).is_err()); // string body cut short
            assert!(unpack(&[0x31, 0x01]).is_err()); // u16 with one byte
            assert!(unpack(&[0xD2, 0x09]).is_err()); // array missing an item
            assert!(unpack(&[0xDF, 0x09]).is_err()); // endless array, no terminator
        }

        #[test]
        fn trailing_bytes_are_fatal() {
            assert!(matches!(
                unpack(&[0x09, 0x09]),
                Err(companion_core::CodecError::TrailingBytes(1))
            ));
        }
    }
}
