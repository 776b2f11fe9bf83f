//! Identity store adapters.
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral hosts
//! - [`FileStore`]: a JSON object on disk guarded by an advisory file lock,
//!   so several processes sharing a data directory agree on one device id

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::WatchError;
use crate::ports::IdentityStore;

/// File name used inside the data directory.
pub const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, WatchError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WatchError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Persistent store backed by `<dir>/identity.json`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes writers within this process; the file lock covers others.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating the directory if needed) a store under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, WatchError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(IDENTITY_FILE);
        debug!(path = %path.display(), "Identity store opened");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_locked(file: &mut File) -> Result<BTreeMap<String, String>, WatchError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }
}

impl IdentityStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, WatchError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        FileExt::lock_shared(&file)?;
        let values = Self::read_locked(&mut file);
        FileExt::unlock(&file)?;

        Ok(values?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WatchError> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        FileExt::lock_exclusive(&file)?;
        let result = (|| -> Result<(), WatchError> {
            let mut values = Self::read_locked(&mut file)?;
            values.insert(key.to_string(), value.to_string());
            let encoded = serde_json::to_vec_pretty(&values)?;

            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&encoded)?;
            file.sync_all()?;
            Ok(())
        })();
        FileExt::unlock(&file)?;

        result
    }
}
