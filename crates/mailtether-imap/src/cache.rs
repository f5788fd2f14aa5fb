//! Persistent per-mailbox cache.
//!
//! Two independent caches keyed by UID: serialized [`MessageRecord`]s
//! and raw body bytes. Keys are prefixed with the validity epoch, so a
//! changed epoch makes every old entry unreachable immediately; the
//! storage itself is reclaimed by [`MessageCache::clean`] after the next
//! full resync. All cache writes are best-effort: a failure is logged
//! and the triggering operation proceeds without caching.
//!
//! The filesystem backend writes through a temporary file and renames,
//! so external readers sharing the cache directory never observe a
//! partial file.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::QresyncParams;
use crate::error::Result;
use crate::seqset::SequenceSet;
use crate::store::MessageRecord;
use crate::types::{ModSeq, Uid, UidValidity};

/// Key of the resume checkpoint entry.
const CHECKPOINT_KEY: &str = "uids";

/// Storage seam for cache bytes. Keys are relative paths using `/`.
pub trait CacheStore: Send {
    /// Reads an entry, `None` when absent or unreadable.
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Writes an entry whole.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Removes an entry if present.
    fn remove(&mut self, key: &str);

    /// Every key currently stored.
    fn keys(&self) -> Vec<String>;
}

/// In-memory cache backend.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryCacheStore {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Filesystem cache backend rooted at one directory per mailbox.
#[derive(Debug)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Creates a backend rooted at `root`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl CacheStore for FsCacheStore {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps concurrent readers off partial files.
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }

    fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_keys(&self.root, Path::new(""), &mut out);
        out
    }
}

fn collect_keys(dir: &Path, prefix: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let rel = prefix.join(&name);
        let path = entry.path();
        if path.is_dir() {
            collect_keys(&path, &rel, out);
        } else if path.extension().is_none_or(|ext| ext != "tmp") {
            // Keys use forward slashes regardless of platform.
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(key);
        }
    }
}

/// Resume state written on mailbox close and consumed by the next
/// QRESYNC SELECT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Epoch the checkpoint belongs to.
    pub uid_validity: UidValidity,
    /// Highest change counter observed before closing.
    pub modseq: ModSeq,
    /// Known UIDs in compact set form; empty when none were indexed.
    pub uids: String,
}

impl SyncCheckpoint {
    /// Builds a checkpoint from QRESYNC resume parameters.
    #[must_use]
    pub fn from_params(params: &QresyncParams) -> Self {
        Self {
            uid_validity: params.uid_validity,
            modseq: params.modseq,
            uids: params
                .known_uids
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// The resume parameters this checkpoint denotes, `None` when the
    /// stored UID set no longer parses.
    #[must_use]
    pub fn to_params(&self) -> Option<QresyncParams> {
        let known_uids = if self.uids.is_empty() {
            None
        } else {
            Some(SequenceSet::parse(&self.uids).ok()?)
        };
        Some(QresyncParams {
            uid_validity: self.uid_validity,
            modseq: self.modseq,
            known_uids,
        })
    }
}

/// Typed cache for one mailbox namespace.
pub struct MessageCache {
    store: Box<dyn CacheStore>,
    epoch: Option<UidValidity>,
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl MessageCache {
    /// Creates a cache over the given backend.
    #[must_use]
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self { store, epoch: None }
    }

    /// Cache that keeps everything in memory. Used when no cache
    /// directory is configured, and in tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCacheStore::new()))
    }

    /// Cache persisted under the given directory.
    #[must_use]
    pub fn on_disk(root: PathBuf) -> Self {
        Self::new(Box::new(FsCacheStore::new(root)))
    }

    /// The epoch entries are currently keyed under.
    #[must_use]
    pub const fn epoch(&self) -> Option<UidValidity> {
        self.epoch
    }

    /// Sets the current epoch. Entries cached under any other epoch
    /// become unreachable at once; their storage is reclaimed by the
    /// next [`clean`](Self::clean).
    pub fn set_epoch(&mut self, validity: UidValidity) {
        if self.epoch != Some(validity) {
            debug!(epoch = %validity, "cache epoch set");
        }
        self.epoch = Some(validity);
    }

    /// Looks up a cached record.
    #[must_use]
    pub fn record(&self, uid: Uid) -> Option<MessageRecord> {
        let bytes = self.store.read(&self.record_key(uid)?)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Caches a record, best-effort.
    pub fn put_record(&mut self, record: &MessageRecord) {
        let Some(key) = self.record_key(record.uid) else {
            return;
        };
        let Ok(bytes) = serde_json::to_vec(record) else {
            return;
        };
        if let Err(err) = self.store.write(&key, &bytes) {
            warn!(uid = %record.uid, %err, "record cache write failed, continuing uncached");
        }
    }

    /// Looks up cached body bytes.
    #[must_use]
    pub fn body(&self, uid: Uid) -> Option<Vec<u8>> {
        self.store.read(&self.body_key(uid)?)
    }

    /// Caches body bytes, best-effort.
    pub fn put_body(&mut self, uid: Uid, bytes: &[u8]) {
        let Some(key) = self.body_key(uid) else {
            return;
        };
        if let Err(err) = self.store.write(&key, bytes) {
            warn!(%uid, %err, "body cache write failed, continuing uncached");
        }
    }

    /// Drops both entries for a UID.
    pub fn remove(&mut self, uid: Uid) {
        if let Some(key) = self.record_key(uid) {
            self.store.remove(&key);
        }
        if let Some(key) = self.body_key(uid) {
            self.store.remove(&key);
        }
    }

    /// Reclaims storage after a full resync: drops every entry cached
    /// under a stale epoch, every current-epoch entry whose UID the
    /// server no longer reports, and a checkpoint from another epoch.
    pub fn clean(&mut self, valid: &BTreeSet<Uid>) {
        let Some(epoch) = self.epoch else {
            return;
        };
        let prefix = format!("{epoch}/");
        let mut dropped = 0usize;
        for key in self.store.keys() {
            let keep = if key == CHECKPOINT_KEY {
                self.checkpoint().is_some_and(|cp| cp.uid_validity == epoch)
            } else {
                match key.strip_prefix(&prefix) {
                    Some(rest) => parse_uid_key(rest).is_some_and(|uid| valid.contains(&uid)),
                    None => false,
                }
            };
            if !keep {
                self.store.remove(&key);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, "cache cleaned");
        }
    }

    /// Reads the resume checkpoint. Works before any epoch is known,
    /// since it is consumed ahead of SELECT.
    #[must_use]
    pub fn checkpoint(&self) -> Option<SyncCheckpoint> {
        let bytes = self.store.read(CHECKPOINT_KEY)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Writes the resume checkpoint, best-effort.
    pub fn put_checkpoint(&mut self, checkpoint: &SyncCheckpoint) {
        let Ok(bytes) = serde_json::to_vec(checkpoint) else {
            return;
        };
        if let Err(err) = self.store.write(CHECKPOINT_KEY, &bytes) {
            warn!(%err, "checkpoint write failed, next open resyncs in full");
        }
    }

    fn record_key(&self, uid: Uid) -> Option<String> {
        self.epoch.map(|epoch| format!("{epoch}/{uid}.json"))
    }

    fn body_key(&self, uid: Uid) -> Option<String> {
        self.epoch.map(|epoch| format!("{epoch}/{uid}"))
    }
}

/// Turns `<uid>` or `<uid>.json` back into the UID it names.
fn parse_uid_key(rest: &str) -> Option<Uid> {
    let digits = rest.strip_suffix(".json").unwrap_or(rest);
    digits.parse().ok().and_then(Uid::new)
}

/// Cache directory for one account/mailbox pair, with path separators in
/// the names made inert.
#[must_use]
pub fn namespace_dir(root: &Path, account: &str, mailbox: &str) -> PathBuf {
    root.join(sanitize(account)).join(sanitize(mailbox))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn epoch(n: u32) -> UidValidity {
        UidValidity::new(n).unwrap()
    }

    fn record(n: u32) -> MessageRecord {
        MessageRecord {
            uid: uid(n),
            flags: [Flag::Seen].into_iter().collect(),
            modseq: ModSeq::new(7),
            size: Some(1024),
            internal_date: None,
        }
    }

    mod cache_tests {
        use super::*;

        #[test]
        fn record_round_trip() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(1));
            cache.put_record(&record(42));
            assert_eq!(cache.record(uid(42)), Some(record(42)));
        }

        #[test]
        fn nothing_is_cached_before_an_epoch_is_known() {
            let mut cache = MessageCache::in_memory();
            cache.put_record(&record(42));
            cache.put_body(uid(42), b"body");
            cache.set_epoch(epoch(1));
            assert!(cache.record(uid(42)).is_none());
            assert!(cache.body(uid(42)).is_none());
        }

        #[test]
        fn epoch_change_hides_old_entries_immediately() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(1));
            cache.put_body(uid(42), b"old body");
            assert!(cache.body(uid(42)).is_some());

            cache.set_epoch(epoch(2));
            assert!(cache.body(uid(42)).is_none());
            assert!(cache.record(uid(42)).is_none());
        }

        #[test]
        fn remove_drops_both_sides() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(1));
            cache.put_record(&record(5));
            cache.put_body(uid(5), b"five");
            cache.remove(uid(5));
            assert!(cache.record(uid(5)).is_none());
            assert!(cache.body(uid(5)).is_none());
        }

        #[test]
        fn clean_keeps_only_valid_current_epoch_entries() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(1));
            cache.put_record(&record(1));
            cache.put_body(uid(2), b"two");

            cache.set_epoch(epoch(2));
            cache.put_record(&record(1));
            cache.put_record(&record(3));
            cache.put_body(uid(3), b"three");

            let valid: BTreeSet<Uid> = [uid(3)].into_iter().collect();
            cache.clean(&valid);

            assert!(cache.record(uid(1)).is_none());
            assert_eq!(cache.record(uid(3)), Some(record(3)));
            assert_eq!(cache.body(uid(3)).as_deref(), Some(&b"three"[..]));

            // The old epoch's entries are gone from storage too.
            cache.set_epoch(epoch(1));
            assert!(cache.record(uid(1)).is_none());
            assert!(cache.body(uid(2)).is_none());
        }

        #[test]
        fn clean_drops_checkpoints_from_other_epochs() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(1));
            cache.put_checkpoint(&SyncCheckpoint {
                uid_validity: epoch(1),
                modseq: ModSeq::new(50).unwrap(),
                uids: "1:10".to_string(),
            });

            cache.clean(&BTreeSet::new());
            assert!(cache.checkpoint().is_some());

            cache.set_epoch(epoch(2));
            cache.clean(&BTreeSet::new());
            assert!(cache.checkpoint().is_none());
        }

        #[test]
        fn checkpoint_is_readable_before_select() {
            let mut cache = MessageCache::in_memory();
            cache.set_epoch(epoch(3));
            cache.put_checkpoint(&SyncCheckpoint {
                uid_validity: epoch(3),
                modseq: ModSeq::new(99).unwrap(),
                uids: "1:4,9".to_string(),
            });

            let fresh_view = cache.checkpoint().unwrap();
            let params = fresh_view.to_params().unwrap();
            assert_eq!(params.uid_validity, epoch(3));
            assert_eq!(params.known_uids.unwrap().to_string(), "1:4,9");
        }

        #[test]
        fn corrupt_checkpoint_reads_as_none() {
            let mut store = MemoryCacheStore::new();
            store.write(CHECKPOINT_KEY, b"not json").unwrap();
            let cache = MessageCache::new(Box::new(store));
            assert!(cache.checkpoint().is_none());
        }
    }

    mod fs_tests {
        use super::*;

        #[test]
        fn files_land_under_epoch_directories() {
            let dir = tempfile::tempdir().unwrap();
            let mut cache = MessageCache::on_disk(dir.path().to_path_buf());
            cache.set_epoch(epoch(67890007));
            cache.put_body(uid(3), b"hello");
            cache.put_record(&record(3));

            assert!(dir.path().join("67890007").join("3").is_file());
            assert!(dir.path().join("67890007").join("3.json").is_file());
            assert_eq!(cache.body(uid(3)).as_deref(), Some(&b"hello"[..]));
            assert_eq!(cache.record(uid(3)), Some(record(3)));
        }

        #[test]
        fn writes_leave_no_temporary_files_behind() {
            let dir = tempfile::tempdir().unwrap();
            let mut store = FsCacheStore::new(dir.path().to_path_buf());
            store.write("1/7", b"payload").unwrap();

            let names: Vec<String> = store.keys();
            assert_eq!(names, vec!["1/7".to_string()]);
            assert!(!dir.path().join("1").join("7.tmp").exists());
        }

        #[test]
        fn clean_removes_files_on_disk() {
            let dir = tempfile::tempdir().unwrap();
            let mut cache = MessageCache::on_disk(dir.path().to_path_buf());
            cache.set_epoch(epoch(5));
            cache.put_body(uid(1), b"one");
            cache.put_body(uid(2), b"two");

            let valid: BTreeSet<Uid> = [uid(2)].into_iter().collect();
            cache.clean(&valid);

            assert!(!dir.path().join("5").join("1").exists());
            assert!(dir.path().join("5").join("2").exists());
        }

        #[test]
        fn namespace_dir_defuses_separators() {
            let dir = namespace_dir(Path::new("/tmp/cache"), "user@example.com", "Archive/2023");
            assert_eq!(
                dir,
                Path::new("/tmp/cache")
                    .join("user@example.com")
                    .join("Archive_2023")
            );
        }
    }
}
