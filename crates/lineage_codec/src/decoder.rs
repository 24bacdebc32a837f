//! CBOR decoder with canonical-form checks.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::cmp::Ordering;

/// Decodes CBOR bytes into a value.
///
/// Rejects floats, tags, trailing bytes, and maps whose keys are not in
/// strictly ascending canonical order.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut input = bytes;
    let cbor: Cbor = ciborium::de::from_reader(&mut input)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;
    if !input.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes after value",
            input.len()
        )));
    }
    from_cbor_value(cbor)
}

fn from_cbor_value(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => Value::Integer(i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Float(_) => return Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => return Err(CodecError::TagForbidden { tag }),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Map(entries) => {
            let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let key = from_cbor_value(k)?;
                if let Some((prev, _)) = pairs.last() {
                    if prev.cmp_canonical(&key) != Ordering::Less {
                        return Err(CodecError::non_canonical(format!(
                            "map key {key} out of order or duplicated"
                        )));
                    }
                }
                pairs.push((key, from_cbor_value(v)?));
            }
            Value::Map(pairs)
        }
        other => {
            return Err(CodecError::decoding_failed(format!(
                "unsupported CBOR item: {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_float() {
        // 1.5 as half-precision float
        assert_eq!(from_cbor(&[0xf9, 0x3e, 0x00]), Err(CodecError::FloatForbidden));
    }

    #[test]
    fn rejects_tag() {
        // tag 1 (epoch time) wrapping integer 0
        assert_eq!(
            from_cbor(&[0xc1, 0x00]),
            Err(CodecError::TagForbidden { tag: 1 })
        );
    }

    #[test]
    fn rejects_unsorted_map() {
        // {"b": 1, "a": 2}
        let bytes = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(matches!(
            from_cbor(&[0x01, 0x02]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(from_cbor(&[0x62, b'o']).is_err());
    }

    #[test]
    fn rejects_oversized_integer() {
        // u64::MAX
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }
}
