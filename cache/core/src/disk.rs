//! Disk tier: a content-addressed file store for demoted values.
//!
//! Each value lives in its own file under `<data_dir>/<bucket>/<name>.data`,
//! where `bucket = hash(key) % 1000` and `name` is the hex encoding of the key
//! bytes (keys are binary-safe, file names are not). An in-memory index maps
//! the original key bytes to the file path; the index is rewritten in full to
//! `<data_dir>/index.dat` at shutdown and reloaded on startup.
//!
//! # Index format
//!
//! A flat sequence of records, each `<key_len><key><path_len><path>` with the
//! lengths written as the platform's native `usize` in native byte order. The
//! file is NOT portable across architectures (word size or endianness); a
//! fresh data directory is required when moving between machines. A missing
//! index file is a cold start; a truncated one is read up to the first
//! incomplete record, and eviction reproduces whatever was lost.
//!
//! Hex file names double the key length, so keys past the OS name limit
//! (127 bytes hex-encoded on most filesystems) cannot be demoted: the write
//! fails with `ENAMETOOLONG`, the caller logs it, and the index stays
//! untouched.

use crate::error::StoreResult;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Write as _};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of bucket directories under the data directory.
const BUCKET_COUNT: u64 = 1000;

const INDEX_FILE: &str = "index.dat";

const WORD: usize = std::mem::size_of::<usize>();

/// File-backed storage for values evicted past the warm tier.
pub struct DiskStore {
    data_dir: PathBuf,
    index: HashMap<Vec<u8>, PathBuf>,
}

impl DiskStore {
    /// Open the store rooted at `data_dir`, creating the directory if needed
    /// and loading any existing index.
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let mut store = DiskStore {
            data_dir,
            index: HashMap::new(),
        };
        store.load_index()?;
        Ok(store)
    }

    /// Write `value` to the file identified by `key` and index it.
    ///
    /// Idempotent: re-putting a key overwrites its file. On failure the index
    /// is left untouched, so a stale entry never points at a missing write.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> io::Result<()> {
        let path = self.file_path(key)?;
        fs::write(&path, value)?;
        self.index.insert(key.to_vec(), path);
        Ok(())
    }

    /// Read the value for `key`, or `None` if the key is not indexed or the
    /// file cannot be read. Does not mutate the index.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let path = self.index.get(key)?;
        match fs::read(path) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read value file");
                None
            }
        }
    }

    /// Remove `key`'s file and index entry. Silent if the key is unknown.
    pub fn delete(&mut self, key: &[u8]) {
        if let Some(path) = self.index.remove(key) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove value file");
                }
            }
        }
    }

    /// True iff `key` is in the index.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no keys are indexed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rewrite the index file in full. Called once at clean shutdown.
    pub fn save_index(&self) -> io::Result<()> {
        let path = self.data_dir.join(INDEX_FILE);
        let file = fs::File::create(&path)?;
        let mut out = io::BufWriter::new(file);

        for (key, value_path) in &self.index {
            let path_bytes = value_path.as_os_str().as_bytes();
            out.write_all(&key.len().to_ne_bytes())?;
            out.write_all(key)?;
            out.write_all(&path_bytes.len().to_ne_bytes())?;
            out.write_all(path_bytes)?;
        }

        out.flush()
    }

    fn load_index(&mut self) -> io::Result<()> {
        let path = self.data_dir.join(INDEX_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut pos = 0;
        while let Some((key, value_path, next)) = read_record(&data, pos) {
            self.index.insert(key, value_path);
            pos = next;
        }
        if pos < data.len() {
            warn!(
                dropped_bytes = data.len() - pos,
                "index truncated mid-record, remaining entries discarded"
            );
        }
        Ok(())
    }

    /// Build the file path for `key`, creating the bucket directory on demand.
    fn file_path(&self, key: &[u8]) -> io::Result<PathBuf> {
        let dir = self.data_dir.join(bucket(key).to_string());
        fs::create_dir_all(&dir)?;

        let mut name = String::with_capacity(key.len() * 2 + 5);
        for byte in key {
            // write! to a String cannot fail
            let _ = write!(name, "{:02x}", byte);
        }
        name.push_str(".data");

        Ok(dir.join(name))
    }
}

/// Bucket for a key. Stable within a run, which is all the layout needs; the
/// index carries the authoritative path across restarts.
fn bucket(key: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() % BUCKET_COUNT
}

/// Parse one index record at `pos`, returning the key, path, and the offset
/// of the next record. `None` when the remaining bytes do not hold a whole
/// record.
fn read_record(data: &[u8], mut pos: usize) -> Option<(Vec<u8>, PathBuf, usize)> {
    let key_len = read_len(data, pos)?;
    pos += WORD;
    let key = data.get(pos..pos + key_len)?.to_vec();
    pos += key_len;

    let path_len = read_len(data, pos)?;
    pos += WORD;
    let path_bytes = data.get(pos..pos + path_len)?.to_vec();
    pos += path_len;

    let path = PathBuf::from(std::ffi::OsString::from_vec(path_bytes));
    Some((key, path, pos))
}

fn read_len(data: &[u8], pos: usize) -> Option<usize> {
    let bytes = data.get(pos..pos + WORD)?;
    Some(usize::from_ne_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"key1", b"value1").unwrap();
        assert!(disk.exists(b"key1"));
        assert_eq!(disk.get(b"key1").unwrap(), b"value1");
    }

    #[test]
    fn test_get_absent() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).unwrap();
        assert!(disk.get(b"missing").is_none());
        assert!(!disk.exists(b"missing"));
    }

    #[test]
    fn test_put_overwrites() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"k", b"old").unwrap();
        disk.put(b"k", b"new").unwrap();
        assert_eq!(disk.get(b"k").unwrap(), b"new");
        assert_eq!(disk.len(), 1);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"k", b"v").unwrap();
        disk.delete(b"k");
        assert!(!disk.exists(b"k"));
        assert!(disk.get(b"k").is_none());

        // Deleting an unknown key is silent.
        disk.delete(b"never-existed");
    }

    #[test]
    fn test_binary_keys_and_values() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        let key = b"\x00\x01/..\\\r\n\xff";
        let value = b"\x00binary\r\nvalue\xff";
        disk.put(key, value).unwrap();
        assert_eq!(disk.get(key).unwrap(), value);
    }

    #[test]
    fn test_empty_value() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"k", b"").unwrap();
        assert!(disk.exists(b"k"));
        assert_eq!(disk.get(b"k").unwrap(), b"");
    }

    #[test]
    fn test_files_land_in_buckets() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"some-key", b"v").unwrap();

        // Exactly one .data file, inside a numeric bucket directory.
        let mut found = 0;
        for entry in fs::read_dir(dir.path()).unwrap() {
            let entry = entry.unwrap();
            if !entry.file_type().unwrap().is_dir() {
                continue;
            }
            let bucket_name = entry.file_name();
            let bucket_num: u64 = bucket_name.to_str().unwrap().parse().unwrap();
            assert!(bucket_num < BUCKET_COUNT);
            for file in fs::read_dir(entry.path()).unwrap() {
                let name = file.unwrap().file_name();
                assert!(name.to_str().unwrap().ends_with(".data"));
                found += 1;
            }
        }
        assert_eq!(found, 1);
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut disk = DiskStore::open(dir.path()).unwrap();
            disk.put(b"alpha", b"1").unwrap();
            disk.put(b"beta", b"2").unwrap();
            disk.put(b"\x00\xffbinary", b"3").unwrap();
            disk.save_index().unwrap();
        }

        let disk = DiskStore::open(dir.path()).unwrap();
        assert_eq!(disk.len(), 3);
        assert_eq!(disk.get(b"alpha").unwrap(), b"1");
        assert_eq!(disk.get(b"beta").unwrap(), b"2");
        assert_eq!(disk.get(b"\x00\xffbinary").unwrap(), b"3");
    }

    #[test]
    fn test_missing_index_is_cold_start() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).unwrap();
        assert!(disk.is_empty());
    }

    #[test]
    fn test_truncated_index_reads_whole_records() {
        let dir = tempdir().unwrap();

        {
            let mut disk = DiskStore::open(dir.path()).unwrap();
            disk.put(b"first", b"1").unwrap();
            disk.save_index().unwrap();
        }

        // Record for "first" plus a dangling half-record.
        let index_path = dir.path().join(INDEX_FILE);
        let mut data = fs::read(&index_path).unwrap();
        data.extend_from_slice(&42usize.to_ne_bytes());
        data.extend_from_slice(b"partial");
        fs::write(&index_path, &data).unwrap();

        let disk = DiskStore::open(dir.path()).unwrap();
        assert_eq!(disk.len(), 1);
        assert_eq!(disk.get(b"first").unwrap(), b"1");
    }

    #[test]
    fn test_index_not_updated_on_failed_write() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        // Force the write to fail by replacing the bucket directory with a
        // plain file.
        let bucket_dir = dir.path().join(bucket(b"victim").to_string());
        fs::write(&bucket_dir, b"not a directory").unwrap();

        assert!(disk.put(b"victim", b"v").is_err());
        assert!(!disk.exists(b"victim"));
    }

    #[test]
    fn test_get_unreadable_file_is_absent() {
        let dir = tempdir().unwrap();
        let mut disk = DiskStore::open(dir.path()).unwrap();

        disk.put(b"k", b"v").unwrap();

        // Remove the backing file behind the index's back.
        let bucket_dir = dir.path().join(bucket(b"k").to_string());
        for entry in fs::read_dir(&bucket_dir).unwrap() {
            fs::remove_file(entry.unwrap().path()).unwrap();
        }

        assert!(disk.exists(b"k"));
        assert!(disk.get(b"k").is_none());
    }
}
