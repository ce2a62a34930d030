//! JSON-file backed store.
//!
//! The whole store is rewritten on every change through a temporary file in
//! the same directory, so a crash leaves either the old or the new contents.
//! An exclusive `fs2` lock on a sibling `.lock` file keeps two processes from
//! sharing one store.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::error::StoreError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// `"DD:KK"` hex domain and key to value bytes
    entries: BTreeMap<String, Vec<u8>>,
}

fn entry_name(domain: u8, key: u8) -> String {
    format!("{domain:02x}:{key:02x}")
}

fn parse_entry_name(name: &str) -> Option<(u8, u8)> {
    let (domain, key) = name.split_once(':')?;
    Some((
        u8::from_str_radix(domain, 16).ok()?,
        u8::from_str_radix(key, 16).ok()?,
    ))
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<(u8, u8), Vec<u8>>,
    _lock: File,
}

impl FileStore {
    /// Open or create the store at `path`, taking its lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        lock.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => Self::decode(&path, &content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        Ok(Self {
            path,
            entries,
            _lock: lock,
        })
    }

    fn decode(path: &Path, content: &str) -> Result<BTreeMap<(u8, u8), Vec<u8>>, StoreError> {
        let file: StoreFile =
            serde_json::from_str(content).map_err(|e| io_error(path, e.into()))?;
        if file.version != FORMAT_VERSION {
            return Err(io_error(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unsupported store version {}", file.version),
                ),
            ));
        }

        let mut entries = BTreeMap::new();
        for (name, value) in file.entries {
            match parse_entry_name(&name) {
                Some(address) => {
                    entries.insert(address, value);
                }
                None => log_warning!("Ignoring malformed store entry '{}'", name),
            }
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            version: FORMAT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|((domain, key), value)| (entry_name(*domain, *key), value.clone()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| io_error(&self.path, e.into()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
        temp.write_all(&json).map_err(|e| io_error(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| io_error(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, domain: u8, key: u8) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(&(domain, key)).cloned())
    }

    fn set(&mut self, domain: u8, key: u8, value: &[u8]) -> Result<(), StoreError> {
        if self.entries.get(&(domain, key)).is_some_and(|v| v == value) {
            return Ok(());
        }
        self.entries.insert((domain, key), value.to_vec());
        self.flush()
    }

    fn remove(&mut self, domain: u8, key: u8) -> Result<(), StoreError> {
        if self.entries.remove(&(domain, key)).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn purge_domain(&mut self, domain: u8) -> Result<(), StoreError> {
        let before = self.entries.len();
        self.entries.retain(|(d, _), _| *d != domain);
        if self.entries.len() != before {
            self.flush()?;
        }
        Ok(())
    }
}
