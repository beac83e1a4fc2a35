//! Persistence collaborators for administration logs.
//!
//! The workflow does not own storage. It hands the finished [`AdministrationLog`] to an
//! [`AdministrationStore`] and only counts the run as complete once the store acknowledges the
//! write. Two implementations ship with the crate:
//!
//! - [`InMemoryAdministrationStore`] for tests and the development REST server
//! - [`FileAdministrationStore`] which writes one YAML document per log under sharded
//!   directories, mirroring the patient record layout:
//!   `<root>/<id[0..2]>/<id[2..4]>/<id>.yaml`
//!
//! Both refuse to store the same log id twice; a log is written once and never replaced.

use crate::constants::ADMINISTRATION_LOG_EXTENSION;
use crate::error::{StoreError, StoreResult};
use crate::record::AdministrationLog;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Destination for completed administration logs.
pub trait AdministrationStore: Send + Sync {
    /// Durably record `log`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write did not happen. A log with an id that has already been
    /// stored must be rejected with [`StoreError::AlreadyExists`].
    fn persist(&self, log: &AdministrationLog) -> StoreResult<()>;
}

/// Keeps logs in memory.
#[derive(Debug, Default)]
pub struct InMemoryAdministrationStore {
    logs: Mutex<Vec<AdministrationLog>>,
}

impl InMemoryAdministrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored log, oldest first.
    pub fn logs(&self) -> Vec<AdministrationLog> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, id: Uuid) -> Option<AdministrationLog> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|l| l.id == id)
            .cloned()
    }
}

impl AdministrationStore for InMemoryAdministrationStore {
    fn persist(&self, log: &AdministrationLog) -> StoreResult<()> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))?;
        if logs.iter().any(|l| l.id == log.id) {
            return Err(StoreError::AlreadyExists(log.id));
        }
        logs.push(log.clone());
        Ok(())
    }
}

/// Writes each log as YAML under a sharded directory tree.
#[derive(Clone, Debug)]
pub struct FileAdministrationStore {
    root: PathBuf,
}

impl FileAdministrationStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::DirCreation)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `<root>/<s1>/<s2>/<id>.yaml` where `s1`/`s2` are the first four hex characters.
    pub fn path_for(&self, id: Uuid) -> PathBuf {
        let canonical = id.simple().to_string();
        let s1 = &canonical[0..2];
        let s2 = &canonical[2..4];
        self.root
            .join(s1)
            .join(s2)
            .join(format!("{canonical}.{ADMINISTRATION_LOG_EXTENSION}"))
    }

    pub fn load(&self, id: Uuid) -> StoreResult<AdministrationLog> {
        let contents = fs::read_to_string(self.path_for(id)).map_err(StoreError::FileRead)?;
        serde_yaml::from_str(&contents).map_err(StoreError::YamlDeserialization)
    }
}

impl AdministrationStore for FileAdministrationStore {
    fn persist(&self, log: &AdministrationLog) -> StoreResult<()> {
        let path = self.path_for(log.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::DirCreation)?;
        }

        let yaml = serde_yaml::to_string(log).map_err(StoreError::YamlSerialization)?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(log.id))
            }
            Err(e) => return Err(StoreError::FileWrite(e)),
        };

        file.write_all(yaml.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(StoreError::FileWrite)?;

        tracing::debug!("wrote administration log {}", path.display());
        Ok(())
    }
}
