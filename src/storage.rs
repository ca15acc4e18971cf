// src/storage.rs
//! Ordered key-value storage for ledger state.
//!
//! All state goes through the [`KvStore`] trait so the same keepers run on
//! RocksDB in a node and on an in-memory map in tests and simulations.
//! Multi-key updates are collected into a [`StoreBatch`] and applied
//! atomically.

use anyhow::{anyhow, Context, Result};
use log::warn;
use parking_lot::RwLock;
use rocksdb::{Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

/// Raw key/value pair returned from scans.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Shared store handle (cheap to clone).
pub type Store = Arc<dyn KvStore>;

/// Ordered byte-key store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply every operation in the batch or none of them.
    fn write(&self, batch: StoreBatch) -> Result<()>;

    /// Entries whose key starts with `prefix`, in ascending key order,
    /// stopping after `limit` entries when one is given.
    fn scan(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<KvPair>>;

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.scan(prefix, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered list of writes applied atomically by [`KvStore::write`].
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn put_json<V: Serialize>(&mut self, key: Vec<u8>, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.ops.push(BatchOp::Put(key, bytes));
        Ok(())
    }

    /// Secondary index entries carry no value.
    pub fn put_index(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, Vec::new()));
    }

    pub fn put_u64(&mut self, key: Vec<u8>, value: u64) {
        self.ops.push(BatchOp::Put(key, value.to_be_bytes().to_vec()));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

// ---------------------------------------------------------------------------
// RocksDB backend
// ---------------------------------------------------------------------------

/// RocksDB-backed store (Arc for cheap cloning)
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open RocksDB at `path`, retrying with backoff while the lock is held
    /// by a previous process.
    pub fn open(path: &str, max_open_files: i32) -> Result<Self> {
        let mut attempt = 0u32;
        let max_attempts = 8u32;
        let mut wait = 250u64;

        loop {
            match Self::open_internal(path, max_open_files) {
                Ok(db) => return Ok(Self { db: Arc::new(db) }),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(anyhow!(
                            "Failed to open RocksDB at '{}' after {} attempts: {}",
                            path,
                            attempt,
                            e
                        ));
                    }
                    warn!(
                        "open_db attempt {}/{} failed: {}, retrying in {}ms",
                        attempt, max_attempts, e, wait
                    );
                    sleep(Duration::from_millis(wait));
                    wait = std::cmp::min(wait * 2, 2000);
                }
            }
        }
    }

    /// Wrap an already opened database
    pub fn from_db(db: Arc<DB>) -> Self {
        Self { db }
    }

    fn open_internal(path: &str, max_open_files: i32) -> Result<DB, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_max_background_jobs(4);
        opts.set_write_buffer_size(64 * 1024 * 1024); // 64MB
        opts.set_max_open_files(max_open_files);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        DB::open(&opts, path)
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    fn write(&self, batch: StoreBatch) -> Result<()> {
        let mut wb = WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => wb.put(k, v),
                BatchOp::Delete(k) => wb.delete(k),
            }
        }
        self.db.write(wb)?;
        Ok(())
    }

    fn scan(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<KvPair>> {
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (k, v) = item?;

            // prefix_iterator only seeks; stop once we leave the prefix
            if !k.starts_with(prefix) {
                break;
            }
            if limit.map_or(false, |l| out.len() >= l) {
                break;
            }
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Ordered in-memory store for tests and simulation contexts.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Store {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn write(&self, batch: StoreBatch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(k, v) => {
                    data.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn scan(&self, prefix: &[u8], limit: Option<usize>) -> Result<Vec<KvPair>> {
        let data = self.data.read();
        let iter = data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()));
        Ok(match limit {
            Some(l) => iter.take(l).collect(),
            None => iter.collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Concatenate key parts.
pub fn key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(len);
    for p in parts {
        out.extend_from_slice(p);
    }
    out
}

/// Big-endian `u64` so byte order matches numeric order.
pub fn encode_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

pub fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow!("expected 8 bytes for u64, got {}", bytes.len()))?;
    Ok(u64::from_be_bytes(arr))
}

/// Store heights as offset `u64` so negative heights never appear in keys.
pub fn encode_height(height: i64) -> [u8; 8] {
    (height as u64 ^ (1 << 63)).to_be_bytes()
}

pub fn decode_height(bytes: &[u8]) -> Result<i64> {
    Ok((decode_u64(bytes)? ^ (1 << 63)) as i64)
}

pub fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &[u8]) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => {
            let v = serde_json::from_slice::<T>(&bytes)
                .with_context(|| format!("decoding value at key {}", hex::encode(key)))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

pub fn put_json<V: Serialize>(store: &dyn KvStore, key: &[u8], value: &V) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(key, &bytes)
}

/// Deserialize every value under `prefix`.
pub fn scan_json<T: DeserializeOwned>(store: &dyn KvStore, prefix: &[u8]) -> Result<Vec<T>> {
    store
        .scan_prefix(prefix)?
        .into_iter()
        .map(|(k, v)| {
            serde_json::from_slice::<T>(&v)
                .with_context(|| format!("decoding value at key {}", hex::encode(&k)))
        })
        .collect()
}

/// Read a big-endian counter; missing means zero.
pub fn get_counter(store: &dyn KvStore, key: &[u8]) -> Result<u64> {
    match store.get(key)? {
        Some(bytes) => decode_u64(&bytes),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn KvStore) {
        store.put(b"a:1", b"one").unwrap();
        store.put(b"a:2", b"two").unwrap();
        store.put(b"b:1", b"other").unwrap();

        assert_eq!(store.get(b"a:1").unwrap(), Some(b"one".to_vec()));
        assert!(store.has(b"a:2").unwrap());

        let scanned = store.scan_prefix(b"a:").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, b"a:1".to_vec());

        let limited = store.scan(b"a:", Some(1)).unwrap();
        assert_eq!(limited.len(), 1);

        let mut batch = StoreBatch::new();
        batch.delete(b"a:1".to_vec());
        batch.put(b"a:3".to_vec(), b"three".to_vec());
        store.write(batch).unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan_prefix(b"a:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a:2".to_vec(), b"a:3".to_vec()]);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_rocks_store() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().to_str().unwrap(), 64).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_u64_keys_sort_numerically() {
        let store = MemoryStore::new();
        for id in [300u64, 2, 70_000] {
            store.put(&key(&[b"x", &encode_u64(id)]), b"").unwrap();
        }
        let ids: Vec<u64> = store
            .scan_prefix(b"x")
            .unwrap()
            .into_iter()
            .map(|(k, _)| decode_u64(&k[1..]).unwrap())
            .collect();
        assert_eq!(ids, vec![2, 300, 70_000]);
    }

    #[test]
    fn test_height_encoding_orders_negative_first() {
        assert!(encode_height(-1) < encode_height(0));
        assert!(encode_height(5) < encode_height(6));
        assert_eq!(decode_height(&encode_height(-42)).unwrap(), -42);
    }

    #[test]
    fn test_counter_defaults_to_zero() {
        let store = MemoryStore::new();
        assert_eq!(get_counter(&store, b"last").unwrap(), 0);
        let mut batch = StoreBatch::new();
        batch.put_u64(b"last".to_vec(), 9);
        store.write(batch).unwrap();
        assert_eq!(get_counter(&store, b"last").unwrap(), 9);
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        put_json(&store, b"k", &vec![1u32, 2, 3]).unwrap();
        let v: Option<Vec<u32>> = get_json(&store, b"k").unwrap();
        assert_eq!(v, Some(vec![1, 2, 3]));
        let missing: Option<Vec<u32>> = get_json(&store, b"nope").unwrap();
        assert!(missing.is_none());
    }
}
