use std::collections::HashSet;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::{
    error::Error,
    sync::index::{
        OutputIndex,
        types::{Amount, BlockHeight, Transaction, TxId},
    },
};

use super::{ParserConfig, propagate::parse_transaction};

/// Outcome of resolving the transactions of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Resolved transactions with the pass (depth) they were resolved in, in resolution order
    pub resolved: Vec<(TxId, usize)>,
    /// Transactions left unresolved when the pass limit was reached
    pub unresolved: Vec<TxId>,
    /// Number of passes performed
    pub passes: usize,
    /// Outputs which became token outputs
    pub token_outputs: usize,
    /// Token value burned by the resolved transactions
    pub burned: Amount,
}

impl ResolutionReport {
    pub fn depth_of(&self, tx_id: &TxId) -> Option<usize> {
        self.resolved
            .iter()
            .find(|(id, _)| id == tx_id)
            .map(|(_, depth)| *depth)
    }

    pub fn max_depth(&self) -> usize {
        self.passes.saturating_sub(1)
    }
}

/// Resolve the transactions of a block, respecting spends of outputs produced within it.
///
/// Each pass parses, in block order, the transactions which do not spend an output of another
/// transaction still pending in this block, and defers the rest to the next pass. Passes continue
/// until nothing is deferred or `config.max_recursions` further passes have been made. Running out
/// of passes is an error only in strict mode; otherwise the unresolved transactions are reported
/// and simply produce no token outputs.
pub fn parse_transactions(
    transactions: &[Transaction],
    index: &mut OutputIndex,
    height: BlockHeight,
    config: &ParserConfig,
) -> Result<ResolutionReport, Error> {
    let mut report = ResolutionReport::default();

    let mut pending = transactions.iter().collect::<Vec<_>>();
    let mut depth = 0;

    loop {
        let producers = intra_block_producers(&pending);

        let (ready, deferred): (Vec<&Transaction>, Vec<&Transaction>) =
            pending.into_iter().partition(|tx| {
                !tx.inputs
                    .iter()
                    .any(|input| producers.contains(&input.spending_tx_id))
            });

        if depth > config.recursion_warn_depth {
            warn!(
                height,
                depth,
                ready = ready.len(),
                deferred = deferred.len(),
                "unusually deep intra-block dependency chain"
            );
        }

        for tx in ready {
            let flow = parse_transaction(tx, height, index)?;

            report.token_outputs += flow.token_outputs;
            report.burned += flow.burned;
            report.resolved.push((tx.id.clone(), depth));
        }

        report.passes = depth + 1;

        if deferred.is_empty() {
            break;
        }

        if depth < config.max_recursions {
            depth += 1;
            pending = deferred;
            continue;
        }

        warn!(
            height,
            depth,
            unresolved = deferred.len(),
            txs = %deferred.iter().map(|tx| &tx.id).join(","),
            "exceeded max passes resolving intra-block dependencies"
        );

        if config.strict_mode {
            return Err(Error::RecursionExhausted {
                height,
                depth,
                unresolved: deferred.len(),
            });
        }

        report.unresolved = deferred.into_iter().map(|tx| tx.id.clone()).collect();
        break;
    }

    debug!(
        height,
        passes = report.passes,
        resolved = report.resolved.len(),
        "resolved block transactions"
    );

    Ok(report)
}

/// Ids of transactions in `txs` whose outputs are spent by another transaction in `txs`.
fn intra_block_producers<'a>(txs: &[&'a Transaction]) -> HashSet<&'a TxId> {
    let tx_ids = txs.iter().map(|tx| &tx.id).collect::<HashSet<_>>();

    txs.iter()
        .copied()
        .flat_map(|tx| tx.inputs.iter())
        .map(|input| &input.spending_tx_id)
        .filter(|id| tx_ids.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{
        index::types::{TxInput, TxoRef},
        parser::genesis::parse_genesis_tx,
    };

    fn funded_index() -> OutputIndex {
        let mut index = OutputIndex::new();
        parse_genesis_tx(&Transaction::new("gen", vec![], vec![1_000]), 1, &mut index);
        index
    }

    fn config(max_recursions: usize, strict_mode: bool) -> ParserConfig {
        ParserConfig {
            strict_mode,
            max_recursions,
            ..Default::default()
        }
    }

    /// `len` transactions where the first spends the genesis output and each following one spends
    /// its predecessor.
    fn dependency_chain(len: usize) -> Vec<Transaction> {
        (0..len)
            .map(|i| {
                let input = if i == 0 {
                    TxInput::new("gen", 0)
                } else {
                    TxInput::new(format!("t{}", i - 1), 0)
                };
                Transaction::new(format!("t{i}"), vec![input], vec![1_000])
            })
            .collect()
    }

    #[test]
    fn independent_transactions_resolve_in_one_pass() {
        let mut index = OutputIndex::new();
        parse_genesis_tx(
            &Transaction::new("gen", vec![], vec![10, 20, 30]),
            1,
            &mut index,
        );

        let txs = (0..3)
            .map(|i| Transaction::new(format!("t{i}"), vec![TxInput::new("gen", i)], vec![5]))
            .collect::<Vec<_>>();

        let report = parse_transactions(&txs, &mut index, 2, &ParserConfig::default()).unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.max_depth(), 0);
        assert!(report.unresolved.is_empty());
        assert_eq!(report.token_outputs, 3);
        assert_eq!(report.burned, 5 + 15 + 25);
        assert!(report.resolved.iter().all(|(_, depth)| *depth == 0));
    }

    #[test]
    fn chained_transactions_resolve_at_increasing_depth() {
        let a = Transaction::new("a", vec![TxInput::new("gen", 0)], vec![1_000]);
        let b = Transaction::new("b", vec![TxInput::new("a", 0)], vec![600, 400]);
        let c = Transaction::new("c", vec![TxInput::new("b", 1)], vec![400]);

        for order in [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ] {
            let mut index = funded_index();

            let report =
                parse_transactions(&order, &mut index, 2, &ParserConfig::default()).unwrap();

            assert_eq!(report.depth_of(&"a".into()), Some(0));
            assert_eq!(report.depth_of(&"b".into()), Some(1));
            assert_eq!(report.depth_of(&"c".into()), Some(2));
            assert_eq!(report.passes, 3);

            assert!(index.get(&TxoRef::new("b", 0)).unwrap().is_token_utxo());
            assert!(!index.get(&TxoRef::new("b", 1)).unwrap().is_unspent());
            assert!(index.get(&TxoRef::new("c", 0)).unwrap().is_token_utxo());
        }
    }

    #[test]
    fn passes_keep_block_order() {
        let txs = vec![
            Transaction::new("x", vec![TxInput::new("btc", 0)], vec![1]),
            Transaction::new("y", vec![TxInput::new("x", 0)], vec![1]),
            Transaction::new("z", vec![TxInput::new("btc", 1)], vec![1]),
        ];

        let mut index = OutputIndex::new();
        let report = parse_transactions(&txs, &mut index, 2, &ParserConfig::default()).unwrap();

        let order = report
            .resolved
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["x", "z", "y"]);
    }

    #[test]
    fn non_strict_mode_leaves_unresolved_tail() {
        let txs = dependency_chain(6);
        let mut index = funded_index();

        let report = parse_transactions(&txs, &mut index, 2, &config(3, false)).unwrap();

        // depths 0..=3 are resolved, t4 and t5 are not
        assert_eq!(report.passes, 4);
        assert_eq!(report.depth_of(&"t3".into()), Some(3));
        assert_eq!(
            report.unresolved,
            vec![TxId::from("t4"), TxId::from("t5")]
        );

        assert!(index.get(&TxoRef::new("t3", 0)).unwrap().is_token_utxo());
        assert!(index.get(&TxoRef::new("t4", 0)).is_none());
        assert!(index.get(&TxoRef::new("t5", 0)).is_none());
    }

    #[test]
    fn strict_mode_fails_when_passes_run_out() {
        let txs = dependency_chain(6);
        let mut index = funded_index();

        let err = parse_transactions(&txs, &mut index, 2, &config(3, true)).unwrap_err();

        assert!(matches!(
            err,
            Error::RecursionExhausted {
                height: 2,
                depth: 3,
                unresolved: 2,
            }
        ));
    }

    #[test]
    fn resolution_continues_past_warn_depth() {
        let txs = dependency_chain(4);
        let mut index = funded_index();
        let config = ParserConfig {
            strict_mode: true,
            recursion_warn_depth: 1,
            ..Default::default()
        };

        let report = parse_transactions(&txs, &mut index, 2, &config).unwrap();

        assert_eq!(report.passes, 4);
        assert_eq!(report.resolved.len(), 4);
        assert!(report.unresolved.is_empty());
        assert_eq!(report.depth_of(&"t3".into()), Some(3));
        assert!(index.get(&TxoRef::new("t3", 0)).unwrap().is_token_utxo());
    }

    #[test]
    fn chain_within_limit_fully_resolves_in_strict_mode() {
        let txs = dependency_chain(4);
        let mut index = funded_index();

        let report = parse_transactions(&txs, &mut index, 2, &config(3, true)).unwrap();

        assert_eq!(report.passes, 4);
        assert!(report.unresolved.is_empty());
        assert!(index.get(&TxoRef::new("t3", 0)).unwrap().is_token_utxo());
    }

    #[test]
    fn dependency_cycle_does_not_crash() {
        let txs = vec![
            Transaction::new("p", vec![TxInput::new("q", 0)], vec![1]),
            Transaction::new("q", vec![TxInput::new("p", 0)], vec![1]),
            Transaction::new("r", vec![TxInput::new("gen", 0)], vec![1_000]),
        ];
        let mut index = funded_index();

        let report = parse_transactions(&txs, &mut index, 2, &config(10, false)).unwrap();

        assert_eq!(report.passes, 11);
        assert_eq!(report.resolved, vec![(TxId::from("r"), 0)]);
        assert_eq!(report.unresolved, vec![TxId::from("p"), TxId::from("q")]);

        let mut index = funded_index();
        let err = parse_transactions(&txs, &mut index, 2, &config(10, true)).unwrap_err();
        assert!(matches!(err, Error::RecursionExhausted { depth: 10, .. }));
    }
}
