//! # Lineage Codec
//!
//! Dynamic attribute values and canonical CBOR encoding for Lineage.
//!
//! Every configuration snapshot carries its business attributes as a
//! [`Value`] tree, and every stored document body is a [`Value`] map. The
//! canonical encoding guarantees:
//! - Identical values produce identical bytes
//! - Map keys are sorted (length-first, then bytewise)
//! - Integers use their shortest encoding
//! - No floats, no tags, no indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use lineage_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let attrs = Value::record([("os", "linux"), ("release", "6.1")]);
//! let bytes = to_canonical_cbor(&attrs).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), attrs);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_canonical_cbor;
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encodes this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decodes a value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
