use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pilot_core::{Storage, StoreError};
use serde_json::Value;
use tempfile::NamedTempFile;

const EXTENSION: &str = "json";

/// Ensure the store directory exists; create if missing.
pub fn ensure_store_dir(dir: &Path) -> Result<(), StoreError> {
    let io_err = |e: io::Error| StoreError::Io {
        key: dir.display().to_string(),
        message: e.to_string(),
    };
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(io_err)?;
        if !meta.is_dir() {
            return Err(StoreError::Io {
                key: dir.display().to_string(),
                message: "path is not a directory".into(),
            });
        }
    } else {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    Ok(())
}

/// One JSON file per key. Every write goes to a temp file in the same
/// directory and is renamed over the target, so readers never see a torn
/// record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_store_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Io {
                key: key.to_string(),
                message: "keys may only contain letters, digits, '_' and '-'".into(),
            });
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }
}

impl Storage for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    message: err.to_string(),
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Corrupt {
                key: key.to_string(),
                message: err.to_string(),
            })
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let target = self.path_for(key)?;
        let io_err = |e: io::Error| StoreError::Io {
            key: key.to_string(),
            message: e.to_string(),
        };
        let content = serde_json::to_vec_pretty(&value).map_err(|err| StoreError::Corrupt {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&content).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file_mut().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io {
                key: key.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::Io {
            key: self.dir.display().to_string(),
            message: e.to_string(),
        })?;
        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|path| Some(path.file_stem()?.to_str()?.to_string()))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
