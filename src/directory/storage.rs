//! Peer Directory Storage (RocksDB)
//!
//! Persistent storage for peer records.
//! Reads go through a RocksDB snapshot and writes through a single
//! `WriteBatch`, so readers never observe half of a batch.

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DirectoryError, PeerSchema, PeerStore};
use crate::types::PeerRecord;

/// Peer directory backed by RocksDB
pub struct PeerDirectory {
    /// RocksDB instance
    db: DB,

    /// Row layout, shared with the rest of the process
    schema: Arc<PeerSchema>,
}

impl PeerDirectory {
    /// Open or create a peer directory at the given path
    pub fn open(path: &Path, schema: Arc<PeerSchema>) -> Result<Self, DirectoryError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(100);
        opts.set_keep_log_file_num(3);

        let db = DB::open(&opts, path)?;
        let directory = Self { db, schema };

        info!("📦 Opened peer directory with {} peers", directory.len()?);

        Ok(directory)
    }

    /// Flush all changes to disk
    pub fn flush(&self) -> Result<(), DirectoryError> {
        self.db.flush()?;
        Ok(())
    }
}

impl PeerStore for PeerDirectory {
    fn list(&self) -> Result<Vec<PeerRecord>, DirectoryError> {
        let prefix = self.schema.key_prefix();
        let snapshot = self.db.snapshot();
        let mut peers = Vec::new();

        for item in snapshot.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }

            let peer = self.schema.decode(&value).map_err(|reason| {
                DirectoryError::CorruptRecord {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    reason,
                }
            })?;
            peers.push(peer);
        }

        Ok(peers)
    }

    fn clear(&self) -> Result<(), DirectoryError> {
        let end = self.schema.key_range_end();
        let mut batch = WriteBatch::default();
        batch.delete_range(self.schema.key_prefix(), end.as_slice());
        self.db.write(batch)?;

        debug!("Cleared peer directory");
        Ok(())
    }

    fn insert_batch(&self, peers: &[PeerRecord]) -> Result<usize, DirectoryError> {
        // Build the full payload before touching the database
        let rows = peers
            .iter()
            .enumerate()
            .map(|(index, peer)| {
                self.schema
                    .encode(peer)
                    .map_err(|reason| DirectoryError::MalformedRecord { index, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut batch = WriteBatch::default();
        for (key, value) in &rows {
            batch.put(key, value);
        }
        self.db.write(batch)?;

        debug!("Inserted {} peers", rows.len());
        Ok(rows.len())
    }

    fn merge_seeds(&self, seeds: &[PeerRecord]) -> Result<usize, DirectoryError> {
        let snapshot = self.db.snapshot();
        let mut batch = WriteBatch::default();

        for (index, seed) in seeds.iter().enumerate() {
            let malformed = |reason| DirectoryError::MalformedRecord { index, reason };
            let (key, seed_value) = self.schema.encode(seed).map_err(malformed)?;

            // Update existing peer, or insert the seed as a new one
            let value = match snapshot.get(&key)? {
                Some(stored) => {
                    let existing = self.schema.decode(&stored).map_err(|reason| {
                        DirectoryError::CorruptRecord {
                            key: String::from_utf8_lossy(&key).into_owned(),
                            reason,
                        }
                    })?;
                    let (_, merged) =
                        self.schema.encode(&existing.absorb_seed(seed)).map_err(malformed)?;
                    merged
                }
                None => seed_value,
            };

            batch.put(&key, &value);
        }

        self.db.write(batch)?;

        debug!("Merged {} peer seeds", seeds.len());
        Ok(seeds.len())
    }

    fn len(&self) -> Result<usize, DirectoryError> {
        let prefix = self.schema.key_prefix();
        let mut count = 0;

        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
        }

        Ok(count)
    }
}
