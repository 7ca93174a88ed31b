//! Storage encodings of the ledger types.

use crate::sync::index::{
    Burn,
    types::{Output, SpendInfo, TxId, TxoRef},
};

use super::{Decode, DecodingResult, Encode, EncodeBuilder};

impl Encode for TxId {
    fn encode(&self) -> Vec<u8> {
        self.as_str().encode()
    }
}

impl Decode for TxId {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (id, rest) = String::decode(bytes)?;
        Ok((TxId::new(id), rest))
    }
}

impl Encode for TxoRef {
    fn encode(&self) -> Vec<u8> {
        EncodeBuilder::new()
            .append(&self.tx_id)
            .append(&self.txo_index)
            .build()
    }
}

impl Decode for TxoRef {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (tx_id, bytes) = TxId::decode(bytes)?;
        let (txo_index, bytes) = u32::decode(bytes)?;

        Ok((TxoRef { tx_id, txo_index }, bytes))
    }
}

impl Encode for SpendInfo {
    fn encode(&self) -> Vec<u8> {
        EncodeBuilder::new()
            .append(&self.height)
            .append(&self.tx_id)
            .append(&self.input_index)
            .build()
    }
}

impl Decode for SpendInfo {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (height, bytes) = u64::decode(bytes)?;
        let (tx_id, bytes) = TxId::decode(bytes)?;
        let (input_index, bytes) = u32::decode(bytes)?;

        Ok((
            SpendInfo {
                height,
                tx_id,
                input_index,
            },
            bytes,
        ))
    }
}

impl Encode for Output {
    fn encode(&self) -> Vec<u8> {
        EncodeBuilder::new()
            .append(&self.txo_ref)
            .append(&self.height)
            .append(&self.value)
            .append(&self.verified)
            .append(&self.genesis)
            .append(&self.spend_info)
            .append(&self.destroyed_value)
            .build()
    }
}

impl Decode for Output {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (txo_ref, bytes) = TxoRef::decode(bytes)?;
        let (height, bytes) = u64::decode(bytes)?;
        let (value, bytes) = u64::decode(bytes)?;
        let (verified, bytes) = bool::decode(bytes)?;
        let (genesis, bytes) = bool::decode(bytes)?;
        let (spend_info, bytes) = Option::<SpendInfo>::decode(bytes)?;
        let (destroyed_value, bytes) = Option::<u64>::decode(bytes)?;

        Ok((
            Output {
                txo_ref,
                height,
                value,
                verified,
                genesis,
                spend_info,
                destroyed_value,
            },
            bytes,
        ))
    }
}

impl Encode for Burn {
    fn encode(&self) -> Vec<u8> {
        EncodeBuilder::new()
            .append(&self.height)
            .append(&self.amount)
            .build()
    }
}

impl Decode for Burn {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (height, bytes) = u64::decode(bytes)?;
        let (amount, bytes) = u64::decode(bytes)?;

        Ok((Burn { height, amount }, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spent_output_survives_encoding() {
        let mut output = Output::new(TxoRef::new("ab12", 3), 471_002, 1_500);
        output.verified = true;
        output.destroyed_value = Some(20);
        output.spend_info = Some(SpendInfo {
            height: 471_010,
            tx_id: "cd34".into(),
            input_index: 1,
        });

        let bytes = output.encode();

        assert_eq!(Output::decode_all(&bytes).unwrap(), output);
    }

    #[test]
    fn corrupt_flag_is_rejected() {
        let mut bytes = Output::new(TxoRef::new("ab", 0), 1, 1).encode();
        // verified flag follows txo_ref (5 bytes), height and value (2 bytes each)
        bytes[9] = 7;

        assert!(Output::decode_all(&bytes).is_err());
    }
}
