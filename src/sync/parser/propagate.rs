use tracing::debug;

use crate::{
    error::Error,
    sync::index::{
        OutputIndex,
        types::{Amount, BlockHeight, Output, SpendInfo, Transaction},
    },
};

/// How token value moved through a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueFlow {
    /// Token value consumed from spent token outputs
    pub input_value: Amount,
    /// Token value assigned to this transaction's outputs
    pub output_value: Amount,
    /// Number of outputs which became token outputs
    pub token_outputs: usize,
    /// Token value not assigned to any output
    pub burned: Amount,
}

impl ValueFlow {
    pub fn carries_tokens(&self) -> bool {
        self.input_value > 0
    }
}

/// Spend the transaction's token inputs and assign their value to its outputs.
///
/// Inputs referencing unknown, non-token or already spent outputs contribute nothing. The
/// collected value is assigned to outputs in index order: each output which can be fully covered
/// becomes a token output, and the walk stops at the first one which cannot. Whatever is left is
/// burned and recorded on every output of the transaction.
pub fn parse_transaction(
    tx: &Transaction,
    height: BlockHeight,
    index: &mut OutputIndex,
) -> Result<ValueFlow, Error> {
    let mut available: Amount = 0;

    for (input_index, input) in tx.inputs.iter().enumerate() {
        let txo_ref = input.txo_ref();

        let spendable = index
            .get(&txo_ref)
            .is_some_and(|output| output.verified && output.is_unspent());

        if !spendable {
            continue;
        }

        let spend_info = SpendInfo {
            height,
            tx_id: tx.id.clone(),
            input_index: input_index as u32,
        };

        let value = index.set_spend_info(&txo_ref, spend_info)?;

        available = available
            .checked_add(value)
            .ok_or_else(|| Error::Invariant {
                height,
                message: format!("token input value of {} overflows", tx.id),
            })?;
    }

    let mut flow = ValueFlow {
        input_value: available,
        ..Default::default()
    };

    if available == 0 {
        return Ok(flow);
    }

    let mut outputs = tx
        .outputs
        .iter()
        .enumerate()
        .map(|(txo_index, o)| Output::new(tx.txo_ref(txo_index), height, o.value))
        .collect::<Vec<_>>();

    for output in outputs.iter_mut() {
        if available < output.value {
            break;
        }

        output.verified = true;
        available -= output.value;

        flow.output_value += output.value;
        flow.token_outputs += 1;

        if available == 0 {
            break;
        }
    }

    if available > 0 {
        debug!(
            height,
            tx_id = %tx.id,
            burned = available,
            "token value left unassigned"
        );

        for output in outputs.iter_mut() {
            output.destroyed_value = Some(available);
        }

        index.record_burn(tx.id.clone(), height, available);

        flow.burned = available;
    }

    for output in outputs {
        index.put(output);
    }

    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{
        index::types::{TxId, TxInput, TxoRef},
        parser::genesis::parse_genesis_tx,
    };

    fn funded_index(values: Vec<Amount>) -> OutputIndex {
        let mut index = OutputIndex::new();
        parse_genesis_tx(&Transaction::new("gen", vec![], values), 1, &mut index);
        index
    }

    fn assert_conserved(flow: &ValueFlow) {
        assert_eq!(flow.input_value, flow.output_value + flow.burned);
    }

    #[test]
    fn greedy_allocation_stops_at_first_uncovered_output() {
        let mut index = funded_index(vec![100]);
        let tx = Transaction::new("t", vec![TxInput::new("gen", 0)], vec![30, 80, 10]);

        let flow = parse_transaction(&tx, 2, &mut index).unwrap();

        assert_eq!(
            flow,
            ValueFlow {
                input_value: 100,
                output_value: 30,
                token_outputs: 1,
                burned: 70,
            }
        );
        assert_conserved(&flow);

        assert!(index.get(&TxoRef::new("t", 0)).unwrap().verified);
        // 10 would fit but comes after an output which did not
        assert!(!index.get(&TxoRef::new("t", 1)).unwrap().verified);
        assert!(!index.get(&TxoRef::new("t", 2)).unwrap().verified);

        for i in 0..3 {
            assert_eq!(
                index.get(&TxoRef::new("t", i)).unwrap().destroyed_value,
                Some(70)
            );
        }
        assert_eq!(index.burned_value(&"t".into()), Some(70));
    }

    #[test]
    fn spends_are_recorded_on_consumed_outputs() {
        let mut index = funded_index(vec![40, 60]);
        let tx = Transaction::new(
            "t",
            vec![TxInput::new("btc", 0), TxInput::new("gen", 1), TxInput::new("gen", 0)],
            vec![100],
        );

        let flow = parse_transaction(&tx, 9, &mut index).unwrap();
        assert_eq!(flow.input_value, 100);
        assert_eq!(flow.burned, 0);

        let spent = index.get(&TxoRef::new("gen", 1)).unwrap();
        assert_eq!(
            spent.spend_info,
            Some(SpendInfo {
                height: 9,
                tx_id: "t".into(),
                input_index: 1,
            })
        );
        assert_eq!(
            index.get(&TxoRef::new("gen", 0)).unwrap().spend_info.as_ref().unwrap().input_index,
            2
        );
        assert!(index.get(&TxoRef::new("t", 0)).unwrap().is_token_utxo());
    }

    #[test]
    fn transactions_without_token_inputs_change_nothing() {
        let mut index = funded_index(vec![50]);
        let before = index.clone();

        let tx = Transaction::new("t", vec![TxInput::new("btc", 0)], vec![10, 20]);
        let flow = parse_transaction(&tx, 2, &mut index).unwrap();

        assert!(!flow.carries_tokens());
        assert_eq!(flow, ValueFlow::default());
        assert_eq!(index, before);
    }

    #[test]
    fn already_spent_outputs_contribute_nothing() {
        let mut index = funded_index(vec![50]);

        let first = Transaction::new("a", vec![TxInput::new("gen", 0)], vec![50]);
        let second = Transaction::new("b", vec![TxInput::new("gen", 0)], vec![50]);

        parse_transaction(&first, 2, &mut index).unwrap();
        let flow = parse_transaction(&second, 2, &mut index).unwrap();

        assert_eq!(flow.input_value, 0);
        assert!(index.get(&TxoRef::new("b", 0)).is_none());
        assert_eq!(
            index.get(&TxoRef::new("gen", 0)).unwrap().spend_info.as_ref().unwrap().tx_id,
            TxId::from("a")
        );
    }

    #[test]
    fn non_token_outputs_are_not_spendable_as_tokens() {
        let mut index = funded_index(vec![10]);

        // 10 is burned, leaving t:0 stored but not a token output
        let burn = Transaction::new("t", vec![TxInput::new("gen", 0)], vec![20]);
        let flow = parse_transaction(&burn, 2, &mut index).unwrap();
        assert_eq!(flow.burned, 10);

        let spend = Transaction::new("u", vec![TxInput::new("t", 0)], vec![20]);
        let flow = parse_transaction(&spend, 3, &mut index).unwrap();

        assert_eq!(flow.input_value, 0);
        assert!(index.get(&TxoRef::new("t", 0)).unwrap().is_unspent());
    }

    #[test]
    fn walk_stops_once_value_is_exhausted() {
        let mut index = funded_index(vec![50]);
        let tx = Transaction::new("t", vec![TxInput::new("gen", 0)], vec![50, 0]);

        let flow = parse_transaction(&tx, 2, &mut index).unwrap();

        assert_eq!(flow.token_outputs, 1);
        assert_eq!(flow.burned, 0);
        assert!(!index.get(&TxoRef::new("t", 1)).unwrap().verified);
        assert!(index.get(&TxoRef::new("t", 1)).unwrap().destroyed_value.is_none());
        assert_conserved(&flow);
    }

    #[test]
    fn value_is_conserved_across_allocations() {
        let cases: Vec<(Vec<Amount>, Vec<Amount>)> = vec![
            (vec![100], vec![30, 80, 10]),
            (vec![60, 40], vec![100]),
            (vec![100], vec![]),
            (vec![100], vec![101]),
            (vec![7, 3], vec![1, 2, 3, 4, 5]),
            (vec![0, 5], vec![0, 0, 5]),
        ];

        for (inputs, outputs) in cases {
            let mut index = funded_index(inputs.clone());
            let tx_inputs = (0..inputs.len() as u32)
                .map(|i| TxInput::new("gen", i))
                .collect();
            let tx = Transaction::new("t", tx_inputs, outputs.clone());

            let flow = parse_transaction(&tx, 2, &mut index).unwrap();

            assert_eq!(flow.input_value, inputs.iter().sum::<Amount>());
            assert_conserved(&flow);

            let valid: Amount = index
                .iter()
                .filter(|o| o.txo_ref.tx_id == TxId::from("t") && o.verified)
                .map(|o| o.value)
                .sum();
            assert_eq!(valid, flow.output_value, "outputs {outputs:?}");
        }
    }
}
