use std::path::Path;

use chrono::{DateTime, Utc};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options,
    ReadOptions, WriteBatch,
};
use sysinfo::{Pid, System};
use tracing::{debug, info, trace};

use crate::{
    define_table,
    error::Error,
    sync::index::{
        Burn, OutputIndex,
        types::{BlockHeight, Output, TxId, TxoRef},
    },
};

use super::{
    encdec::{Decode, DecodingResult, Encode, EncodeBuilder},
    table::Table,
};

static LEDGER_CF_NAME: &str = "ledger";

// Keyed by height first so iteration yields outputs in the order they were created
define_table! {
    name: OutputsKV,
    key_type: (BlockHeight, TxoRef),
    value_type: Output,
    tag: b'O'
}

define_table! {
    name: BurnsKV,
    key_type: TxId,
    value_type: Burn,
    tag: b'B'
}

define_table! {
    name: MetaKV,
    key_type: u8,
    value_type: SnapshotMeta,
    tag: b'M'
}

const META_KEY: u8 = 0;

/// Describes the snapshot currently held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Last block height reflected in the snapshot
    pub height: BlockHeight,
    /// Wall clock time of the write, in unix milliseconds
    pub written_at_ms: u64,
    pub outputs: u64,
    pub burns: u64,
}

impl SnapshotMeta {
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.written_at_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl Encode for SnapshotMeta {
    fn encode(&self) -> Vec<u8> {
        EncodeBuilder::new()
            .append(&self.height)
            .append(&self.written_at_ms)
            .append(&self.outputs)
            .append(&self.burns)
            .build()
    }
}

impl Decode for SnapshotMeta {
    fn decode(bytes: &[u8]) -> DecodingResult<Self> {
        let (height, bytes) = u64::decode(bytes)?;
        let (written_at_ms, bytes) = u64::decode(bytes)?;
        let (outputs, bytes) = u64::decode(bytes)?;
        let (burns, bytes) = u64::decode(bytes)?;

        Ok((
            SnapshotMeta {
                height,
                written_at_ms,
                outputs,
                burns,
            },
            bytes,
        ))
    }
}

/// RocksDB backed persistence for output index snapshots.
///
/// The store holds at most one snapshot. Writing a snapshot replaces the previous one atomically.
pub struct SnapshotStore {
    db: DB,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>, memory_budget: u64) -> Result<Self, Error> {
        info!("opening snapshot store...");

        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);

        info!(
            "using rocksdb memory budget: {:.2} GB ({} bytes)",
            memory_budget as f64 / 1024.0 / 1024.0 / 1024.0,
            memory_budget
        );

        let block_cache_budget = (memory_budget as f64 * 0.75) as usize;
        let memtable_budget = (memory_budget as f64 * 0.25) as usize;

        let cache = Cache::new_lru_cache(block_cache_budget);

        let sys = System::new_all();
        let cpus = sys.cpus().len() as u32;
        let background_jobs = std::cmp::max(2, cpus);
        db_opts.set_max_background_jobs(i32::try_from(background_jobs).unwrap_or(2));

        let mut cf_opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        cf_opts.set_block_based_table_factory(&block_opts);

        let per_memtable_cap = 512 * 1024 * 1024;
        cf_opts.set_write_buffer_size(std::cmp::min(memtable_budget / 2, per_memtable_cap));
        cf_opts.set_max_write_buffer_number(2);

        let cfs = vec![ColumnFamilyDescriptor::new(LEDGER_CF_NAME, cf_opts)];

        let db = DB::open_cf_descriptors(&db_opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf_handle(&self) -> Result<&ColumnFamily, Error> {
        self.db
            .cf_handle(LEDGER_CF_NAME)
            .ok_or_else(|| Error::custom(format!("missing column family {LEDGER_CF_NAME}")))
    }

    /// Replace the stored snapshot with `index`.
    pub fn write_snapshot(&self, index: &OutputIndex) -> Result<SnapshotMeta, Error> {
        let height = index
            .block_height()
            .ok_or_else(|| Error::custom("cannot persist an index without a block height"))?;

        let cf = self.cf_handle()?;
        let mut wb = WriteBatch::default();

        for range in [OutputsKV::key_range(), BurnsKV::key_range()] {
            wb.delete_range_cf(cf, range.start, range.end);
        }

        for output in index.iter() {
            let key = OutputsKV::encode_key(&(output.height, output.txo_ref.clone()));

            trace!("setting {} ({})", hex::encode(&key), output.txo_ref);

            wb.put_cf(cf, key, output.encode());
        }

        for (tx_id, burn) in index.burns() {
            wb.put_cf(cf, BurnsKV::encode_key(tx_id), burn.encode());
        }

        let meta = SnapshotMeta {
            height,
            written_at_ms: u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default(),
            outputs: index.len() as u64,
            burns: index.burns().count() as u64,
        };

        wb.put_cf(cf, MetaKV::encode_key(&META_KEY), meta.encode());

        self.db.write(wb)?;

        info!(
            height,
            outputs = meta.outputs,
            burns = meta.burns,
            "persisted snapshot"
        );

        Ok(meta)
    }

    pub fn load_meta(&self) -> Result<Option<SnapshotMeta>, Error> {
        let cf = self.cf_handle()?;

        match self.db.get_cf(cf, MetaKV::encode_key(&META_KEY))? {
            Some(bytes) => Ok(Some(SnapshotMeta::decode_all(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load the stored snapshot, or `None` if nothing was persisted yet.
    pub fn load_snapshot(&self) -> Result<Option<OutputIndex>, Error> {
        let Some(meta) = self.load_meta()? else {
            return Ok(None);
        };

        let mut index = OutputIndex::new();

        for kv in self.iter_kvs::<OutputsKV>()? {
            let (_, output) = kv?;
            index.put(output);
        }

        for kv in self.iter_kvs::<BurnsKV>()? {
            let (tx_id, burn) = kv?;
            index.record_burn(tx_id, burn.height, burn.amount);
        }

        if index.len() as u64 != meta.outputs {
            return Err(Error::custom(format!(
                "snapshot at {} lists {} outputs but {} were stored",
                meta.height,
                meta.outputs,
                index.len()
            )));
        }

        index.set_block_height(meta.height);

        debug!(height = meta.height, outputs = index.len(), "loaded snapshot");

        Ok(Some(index))
    }

    fn iter_kvs<T: Table>(
        &self,
    ) -> Result<impl Iterator<Item = Result<(T::Key, T::Value), Error>> + '_, Error> {
        let mut read_opts = ReadOptions::default();
        read_opts.set_iterate_range(T::key_range());

        let iter = self
            .db
            .iterator_cf_opt(self.cf_handle()?, read_opts, IteratorMode::Start);

        Ok(iter.map(|kv| {
            let (k, v) = kv?;
            Ok((T::decode_key(&k)?, T::Value::decode_all(&v)?))
        }))
    }

    pub fn flush_and_compact(&self) -> Result<(), Error> {
        self.db.flush()?;
        self.db
            .compact_range_cf(self.cf_handle()?, None::<Vec<u8>>, None::<Vec<u8>>);

        Ok(())
    }

    /// Log store and process memory usage.
    pub fn log_stats(&self) -> Result<(), Error> {
        let cf = self.cf_handle()?;

        let property = |name: &str| -> u64 {
            self.db
                .property_int_value_cf(cf, name)
                .ok()
                .flatten()
                .unwrap_or_default()
        };

        let keys = property("rocksdb.estimate-num-keys");
        let memtables = property("rocksdb.cur-size-all-mem-tables");
        let live_data = property("rocksdb.estimate-live-data-size");

        let sys = System::new_all();
        let app_mem = sys
            .process(Pid::from_u32(std::process::id()))
            .map(|p| p.memory())
            .unwrap_or_default();

        info!(
            keys,
            memtables_mb = memtables / 1024 / 1024,
            live_data_mb = live_data / 1024 / 1024,
            app_mem_mb = app_mem / 1024 / 1024,
            "snapshot store stats"
        );

        Ok(())
    }
}
