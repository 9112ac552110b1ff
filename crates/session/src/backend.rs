//! Durable storage for serialized session descriptors, one record per origin.

use bandit_core::{BanditError, BanditResult};
use dashmap::DashMap;
use std::path::PathBuf;

/// Raw key/value storage. Records are opaque JSON strings so that the store,
/// not the backend, decides what a corrupt record means.
pub trait SessionBackend: Send + Sync {
    fn read(&self, origin: &str) -> BanditResult<Option<String>>;
    fn write(&self, origin: &str, record: &str) -> BanditResult<()>;
}

/// Process-local storage.
#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn read(&self, origin: &str) -> BanditResult<Option<String>> {
        Ok(self.records.get(origin).map(|r| r.value().clone()))
    }

    fn write(&self, origin: &str, record: &str) -> BanditResult<()> {
        self.records.insert(origin.to_string(), record.to_string());
        Ok(())
    }
}

/// One JSON file per origin inside a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> BanditResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, origin: &str) -> PathBuf {
        let file: String = origin
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl SessionBackend for FileBackend {
    fn read(&self, origin: &str) -> BanditResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(origin)) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BanditError::Storage(e.to_string())),
        }
    }

    fn write(&self, origin: &str, record: &str) -> BanditResult<()> {
        std::fs::write(self.path_for(origin), record)
            .map_err(|e| BanditError::Storage(e.to_string()))
    }
}
