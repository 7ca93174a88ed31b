use super::encdec::{Decode, Encode, EncodeBuilder, prefix_key_range};

use std::ops::Range;

/// Defines a table stored under its own single byte key prefix.
///
/// # Example
/// ```ignore
/// define_table! {
///     name: BurnsKV,
///     key_type: TxId,
///     value_type: Burn,
///     tag: b'B'
/// }
/// ```
#[macro_export]
macro_rules! define_table {
    {
        name: $name:ident,
        key_type: $key_type:ty,
        value_type: $value_type:ty,
        tag: $tag:expr
    } => {
        pub struct $name;

        impl $crate::storage::table::Table for $name {
            type Key = $key_type;
            type Value = $value_type;

            const TAG: u8 = $tag;
        }
    };
}

/// A keyspace within the store with typed keys and values.
pub trait Table {
    /// Key type for the table.
    type Key: Encode + Decode;

    /// Value type for the table.
    type Value: Encode + Decode;

    /// Prefix of every key in this table, unique within the store.
    const TAG: u8;

    /// Encodes the full key by combining the table tag and the encoded key.
    fn encode_key(key: &Self::Key) -> Vec<u8> {
        EncodeBuilder::new().append(&Self::TAG).append(key).build()
    }

    /// Decodes a full key, checking and stripping the table tag.
    fn decode_key(raw: &[u8]) -> Result<Self::Key, super::encdec::DecodingError> {
        let (tag, rest) = u8::decode(raw)?;

        if tag != Self::TAG {
            return Err(super::encdec::decode::malformed_input(
                format!("expected table tag {}", Self::TAG),
                raw,
            ));
        }

        Self::Key::decode_all(rest)
    }

    /// Range covering every key of the table.
    fn key_range() -> Range<Vec<u8>> {
        prefix_key_range(&[Self::TAG])
    }
}
