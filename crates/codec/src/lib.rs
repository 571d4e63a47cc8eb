//! MessagePack codec for [`bmdb_core::Value`].
//!
//! Supports the subset of the MessagePack spec the document store needs:
//! fixint/int8-32/uint8-32, float64, fixstr/str8/str16, fixarray/array16,
//! fixmap/map16, nil/true/false. 64-bit integer widths, `bin`, `ext`, and
//! the 32-bit array/map/str variants are deliberately unsupported — see
//! `encode`/`decode` for the exact failure modes.

mod decode;
mod encode;

pub use decode::{decode, decode_prefix};
pub use encode::encode;

use thiserror::Error;

/// Errors raised by the codec. Converts into [`bmdb_core::Error`] at the
/// caller's boundary via `From`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended before a complete value could be decoded.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A type code decode does not recognize (reserved, ext, bin, 64-bit ints).
    #[error("unknown type: 0x{0:02x}")]
    UnknownType(u8),
    /// A value that cannot be represented in this codec's subset (encode side).
    #[error("unsupported type: {0}")]
    Unsupported(String),
}

impl From<CodecError> for bmdb_core::Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnexpectedEof => bmdb_core::Error::Corruption {
                location: "messagepack".into(),
                detail: "unexpected end of input".into(),
            },
            CodecError::UnknownType(code) => bmdb_core::Error::Corruption {
                location: "messagepack".into(),
                detail: format!("unknown type: 0x{code:02x}"),
            },
            CodecError::Unsupported(detail) => bmdb_core::Error::Unsupported(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmdb_core::{OrderedMap, Value};

    fn roundtrip(v: Value) {
        let bytes = encode(&v).expect("encode");
        let back = decode(&bytes).expect("decode");
        assert_eq!(v, back);
    }

    #[test]
    fn roundtrips_primitives() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Int(0));
        roundtrip(Value::Int(-1));
        roundtrip(Value::Int(i64::from(i32::MIN)));
        roundtrip(Value::Int(i64::from(u32::MAX)));
        roundtrip(Value::Float(3.5));
        roundtrip(Value::String("hello".into()));
        roundtrip(Value::String(String::new()));
    }

    #[test]
    fn roundtrips_nan_and_infinity() {
        let bytes = encode(&Value::Float(f64::NAN)).unwrap();
        match decode(&bytes).unwrap() {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
        roundtrip(Value::Float(f64::INFINITY));
        roundtrip(Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn roundtrips_containers() {
        let arr = Value::Array(vec![Value::Int(1), Value::String("a".into()), Value::Null]);
        roundtrip(arr);

        let mut m = OrderedMap::new();
        m.insert("a", Value::Int(1));
        m.insert("b", Value::Array(vec![Value::Bool(true)]));
        roundtrip(Value::Map(m));
    }

    #[test]
    fn top_level_decode_ignores_trailing_bytes() {
        let mut bytes = encode(&Value::Int(42)).unwrap();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert_eq!(decode(&bytes).unwrap(), Value::Int(42));
    }

    #[test]
    fn truncated_input_is_eof() {
        let bytes = encode(&Value::String("hello world".into())).unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(
            decode(truncated),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn unknown_type_code_fails() {
        // 0xc1 is reserved/never-used in the MessagePack spec.
        assert!(matches!(
            decode(&[0xc1]),
            Err(CodecError::UnknownType(0xc1))
        ));
    }

    #[test]
    fn oversized_integer_falls_back_to_float64() {
        let big = Value::Int(i64::from(u32::MAX) + 1000);
        let bytes = encode(&big).unwrap();
        // float64 marker
        assert_eq!(bytes[0], 0xcb);
        match decode(&bytes).unwrap() {
            Value::Float(f) => assert_eq!(f, (i64::from(u32::MAX) + 1000) as f64),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn string_exceeding_max_len_is_unsupported() {
        let huge = Value::String("x".repeat(70_000));
        assert!(matches!(encode(&huge), Err(CodecError::Unsupported(_))));
    }

    #[test]
    fn deterministic_encoding_for_structurally_equal_maps() {
        let mut a = OrderedMap::new();
        a.insert("x", Value::Int(1));
        a.insert("y", Value::Int(2));
        let mut b = OrderedMap::new();
        b.insert("x", Value::Int(1));
        b.insert("y", Value::Int(2));
        assert_eq!(
            encode(&Value::Map(a)).unwrap(),
            encode(&Value::Map(b)).unwrap()
        );
    }

    #[test]
    fn negative_fixints_roundtrip() {
        for i in -32..0 {
            roundtrip(Value::Int(i));
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use bmdb_core::{OrderedMap, Value};
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|i| Value::Int(i as i64)),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|entries| {
                    let mut m = OrderedMap::new();
                    for (k, v) in entries {
                        m.insert(k, v);
                    }
                    Value::Map(m)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn encode_decode_is_identity(v in arb_value()) {
            let bytes = encode(&v).unwrap();
            let back = decode(&bytes).unwrap();
            prop_assert_eq!(v, back);
        }

        #[test]
        fn encoding_is_deterministic_across_runs(v in arb_value()) {
            let a = encode(&v).unwrap();
            let b = encode(&v).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
