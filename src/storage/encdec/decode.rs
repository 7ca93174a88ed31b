use super::{Decode, VarUInt};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DecodingError {
    #[error("Malformed input: {0} ({1:?})")]
    MalformedInput(String, Vec<u8>),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("VarUInt casting: {0}")]
    VarUIntCasting(u128),
    #[error("Enum kind: {0:?}")]
    InvalidEnumKind(Vec<u8>),
}

// Helper method to create MalformedInput error with just a message
pub fn malformed_input<S: Into<String>>(msg: S, bytes: &[u8]) -> DecodingError {
    DecodingError::MalformedInput(msg.into(), bytes.to_vec())
}

pub type DecodingResult<'a, T> = Result<(T, &'a [u8]), DecodingError>;

impl Decode for u8 {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        bytes
            .split_first()
            .map(|(b, rest)| (*b, rest))
            .ok_or_else(|| malformed_input("u8 insufficient bytes", bytes))
    }
}

impl Decode for bool {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (kind, rest) = u8::decode(bytes)?;

        match kind {
            0 => Ok((false, rest)),
            1 => Ok((true, rest)),
            _ => Err(DecodingError::InvalidEnumKind(vec![kind])),
        }
    }
}

impl Decode for VarUInt {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (len, rest) = u8::decode(bytes)?;
        let len = len as usize;

        if len > 16 {
            return Err(malformed_input("varuint len exceeds maximum", bytes));
        }

        let (data, rest) = rest
            .split_at_checked(len)
            .ok_or_else(|| malformed_input("varuint insufficient bytes", bytes))?;

        let mut be_128 = [0u8; 16];
        be_128[16 - len..].copy_from_slice(data);

        Ok((VarUInt(u128::from_be_bytes(be_128)), rest))
    }
}

macro_rules! impl_uint_decode {
    ($t:ty) => {
        impl Decode for $t {
            fn decode(bytes: &[u8]) -> DecodingResult<$t> {
                let (varuint, rem) = VarUInt::decode(bytes)?;

                let casted = Self::try_from(varuint)?;

                Ok((casted, rem))
            }
        }
    };
}

impl_uint_decode!(usize);
impl_uint_decode!(u32);
impl_uint_decode!(u64);

impl Decode for String {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (len, rest) = usize::decode(bytes)?;

        let (data, rest) = rest
            .split_at_checked(len)
            .ok_or_else(|| malformed_input("string insufficient bytes", bytes))?;

        Ok((String::from_utf8(data.to_vec())?, rest))
    }
}

impl<A: Decode> Decode for Option<A> {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (kind, rest) = u8::decode(bytes)?;

        match kind {
            0 => Ok((None, rest)),
            1 => {
                let (a, rest) = A::decode(rest)?;
                Ok((Some(a), rest))
            }
            _ => Err(DecodingError::InvalidEnumKind(vec![kind])),
        }
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (a, bytes) = A::decode(bytes)?;
        let (b, bytes) = B::decode(bytes)?;

        Ok(((a, b), bytes))
    }
}
