pub mod decode;
pub mod encode;
mod ledger;

use std::ops::Range;

pub use decode::{DecodingError, DecodingResult};

pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decode
where
    Self: Sized,
{
    fn decode(bytes: &[u8]) -> DecodingResult<Self>;

    /// `decode` but ignoring, and not returning, any remaining bytes
    fn decode_all(bytes: &[u8]) -> Result<Self, DecodingError> {
        Self::decode(bytes).map(|x| x.0)
    }
}

#[derive(Default, Clone)]
pub struct EncodeBuilder {
    output: Vec<u8>,
}

impl EncodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<T: Encode + ?Sized>(mut self, data: &T) -> Self {
        self.output.extend(data.encode());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.output
    }
}

/// Unsigned integer with a length prefixed big endian encoding, which keeps lexicographic ordering
/// of the encoded bytes in line with numeric ordering
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
struct VarUInt(pub u128);

macro_rules! impl_to_varuint {
    ($type:ty) => {
        impl From<$type> for VarUInt {
            fn from(val: $type) -> Self {
                VarUInt(val as u128)
            }
        }
    };
}

impl_to_varuint!(usize);
impl_to_varuint!(u32);
impl_to_varuint!(u64);

macro_rules! impl_try_from_varuint {
    ($type:ty) => {
        impl TryFrom<VarUInt> for $type {
            type Error = DecodingError;

            fn try_from(val: VarUInt) -> Result<$type, Self::Error> {
                let inner_val = val.0;
                inner_val
                    .try_into()
                    .map_err(|_| DecodingError::VarUIntCasting(inner_val))
            }
        }
    };
}

impl_try_from_varuint!(usize);
impl_try_from_varuint!(u32);
impl_try_from_varuint!(u64);

/// Range covering every key starting with `prefix`.
pub fn prefix_key_range(prefix: &[u8]) -> Range<Vec<u8>> {
    let start = prefix.to_vec();
    let mut end = prefix.to_vec();

    // Work backwards to handle the case where the last byte(s) are 255
    for i in (0..end.len()).rev() {
        if end[i] != 255 {
            end[i] += 1;
            end.truncate(i + 1);
            return start..end;
        }
    }

    // If all bytes are 255, the range is unbounded at the upper end
    start..vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varuint_encoding_preserves_order() {
        let values = [0u64, 1, 255, 256, 65_535, 1 << 40, u64::MAX];

        let encoded = values.iter().map(|v| v.encode()).collect::<Vec<_>>();

        assert!(encoded.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(0u64.encode(), vec![0]);
        assert_eq!(256u64.encode(), vec![2, 1, 0]);
    }

    #[test]
    fn decoding_keeps_remaining_bytes() {
        let bytes = EncodeBuilder::new()
            .append(&300u32)
            .append(&true)
            .append("abc")
            .build();

        let (n, rest) = u32::decode(&bytes).unwrap();
        let (flag, rest) = bool::decode(rest).unwrap();
        let (s, rest) = String::decode(rest).unwrap();

        assert_eq!((n, flag, s.as_str()), (300, true, "abc"));
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = 1_000_000u64.encode();

        assert!(u64::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(matches!(
            u32::decode_all(&5_000_000_000u64.encode()),
            Err(DecodingError::VarUIntCasting(5_000_000_000))
        ));
    }

    #[test]
    fn prefix_range_bounds() {
        assert_eq!(prefix_key_range(b"O"), b"O".to_vec()..b"P".to_vec());
        assert_eq!(prefix_key_range(&[1, 255]), vec![1, 255]..vec![2]);
        assert_eq!(prefix_key_range(&[255]), vec![255]..vec![]);
    }
}
