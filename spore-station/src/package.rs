// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::error::StoreError;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Staged write. Nothing is visible under the key until `commit`; dropping
/// the writer uncommitted discards what was written.
pub trait PackageWriter: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StoreError>;
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub trait PackageStore: Send + Sync {
    fn open(&self, key: &str) -> Result<Box<dyn PackageWriter>, StoreError>;

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `data` under `key`, replacing any previous content.
    fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut writer = self.open(key)?;
        writer.write_all(data)?;
        writer.commit()
    }
}

/// Keys become file names, so anything that could climb out of the store
/// root is refused.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub struct FilePackageStore {
    root: PathBuf,
}

impl FilePackageStore {
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PackageStore for FilePackageStore {
    fn open(&self, key: &str) -> Result<Box<dyn PackageWriter>, StoreError> {
        validate_key(key)?;
        let target = self.root.join(key);
        let staged = self
            .root
            .join(format!(".{}.{:016x}.partial", key, rand::random::<u64>()));
        let file = File::create(&staged)?;
        Ok(Box::new(FileWriter {
            staged,
            target,
            file: Some(BufWriter::new(file)),
        }))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        match fs::read(self.root.join(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

struct FileWriter {
    staged: PathBuf,
    target: PathBuf,
    /// `None` once committed.
    file: Option<BufWriter<File>>,
}

impl PackageWriter for FileWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StoreError> {
        match self.file.as_mut() {
            Some(file) => Ok(file.write_all(data)?),
            None => Err(StoreError::Unavailable("writer already committed".into())),
        }
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StoreError::Unavailable("writer already committed".into()))?;
        file.flush()?;
        file.get_ref().sync_all()?;
        drop(file);
        if let Err(e) = fs::rename(&self.staged, &self.target) {
            let _ = fs::remove_file(&self.staged);
            return Err(e.into());
        }
        debug!(package = %self.target.display(), "Package committed");
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            if let Err(e) = fs::remove_file(&self.staged) {
                warn!(staged = %self.staged.display(), error = %e, "Failed to discard staged package");
            }
        }
    }
}

#[derive(Default, Clone)]
pub struct MemoryPackageStore {
    packages: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match self.packages.lock() {
            Ok(p) => p.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }
}

impl PackageStore for MemoryPackageStore {
    fn open(&self, key: &str) -> Result<Box<dyn PackageWriter>, StoreError> {
        validate_key(key)?;
        Ok(Box::new(MemoryWriter {
            key: key.to_string(),
            buf: Vec::new(),
            packages: self.packages.clone(),
        }))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        let packages = self
            .packages
            .lock()
            .map_err(|_| StoreError::Unavailable("package table poisoned".into()))?;
        Ok(packages.get(key).cloned())
    }
}

struct MemoryWriter {
    key: String,
    buf: Vec<u8>,
    packages: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl PackageWriter for MemoryWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StoreError> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryWriter { key, buf, packages } = *self;
        let mut packages = packages
            .lock()
            .map_err(|_| StoreError::Unavailable("package table poisoned".into()))?;
        packages.insert(key, buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_files(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .count()
    }

    #[test]
    fn write_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePackageStore::open_dir(dir.path().join("packages")).unwrap();

        store.write("greeter.pkg", b"v1").unwrap();
        store.write("greeter.pkg", b"version two").unwrap();
        assert_eq!(store.read("greeter.pkg").unwrap().unwrap(), b"version two");
        assert_eq!(store.read("absent.pkg").unwrap(), None);
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePackageStore::open_dir(dir.path()).unwrap();
        store.write("greeter.pkg", b"old").unwrap();

        {
            let mut writer = store.open("greeter.pkg").unwrap();
            writer.write_all(b"half written").unwrap();
            assert_eq!(staged_files(store.root()), 1);
        }

        assert_eq!(staged_files(store.root()), 0);
        assert_eq!(store.read("greeter.pkg").unwrap().unwrap(), b"old");
    }

    #[test]
    fn concurrent_writers_leave_one_complete_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePackageStore::open_dir(dir.path()).unwrap();
        let payloads: Vec<Vec<u8>> = (0..8u8)
            .map(|i| vec![i; 4096 + usize::from(i) * 777])
            .collect();

        std::thread::scope(|scope| {
            for payload in &payloads {
                let store = &store;
                scope.spawn(move || store.write("shared.pkg", payload).unwrap());
            }
        });

        let stored = store.read("shared.pkg").unwrap().unwrap();
        assert!(payloads.contains(&stored), "stored {} mixed bytes", stored.len());
        assert_eq!(staged_files(store.root()), 0);
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePackageStore::open_dir(dir.path()).unwrap();
        for key in ["", "../escape", "a/b", ".hidden", "c:\\x"] {
            assert!(
                matches!(store.write(key, b"x"), Err(StoreError::InvalidKey(_))),
                "key {:?} accepted",
                key
            );
        }
    }

    #[test]
    fn memory_store_commits_atomically() {
        let store = MemoryPackageStore::new();
        let mut writer = store.open("a.pkg").unwrap();
        writer.write_all(b"abc").unwrap();
        assert_eq!(store.read("a.pkg").unwrap(), None);
        writer.commit().unwrap();
        assert_eq!(store.read("a.pkg").unwrap().unwrap(), b"abc");

        let mut abandoned = store.open("b.pkg").unwrap();
        abandoned.write_all(b"xyz").unwrap();
        drop(abandoned);
        assert_eq!(store.keys(), vec!["a.pkg".to_string()]);
    }
}
