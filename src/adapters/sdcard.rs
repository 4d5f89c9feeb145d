//! Removable-medium adapter.
//!
//! Implements [`FileStore`] over `std::fs`. On device the SD card is
//! mounted through the ESP-IDF VFS at the media root (`/sdcard` by
//! default), so the same code path serves hardware and simulation; in
//! simulation the root is any host directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::app::ports::{FileError, FileStore};

pub struct SdCardStore {
    root: PathBuf,
}

impl SdCardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!("SdCardStore: root {}", root.display());
        Self { root }
    }

    /// Relative paths resolve against the root; absolute ones are kept.
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    fn check(&self) -> Result<(), FileError> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(FileError::NotMounted)
        }
    }
}

fn map_io(e: std::io::Error) -> FileError {
    match e.kind() {
        ErrorKind::NotFound => FileError::NotFound,
        _ => FileError::Io,
    }
}

impl FileStore for SdCardStore {
    fn is_mounted(&self) -> bool {
        self.root.is_dir()
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FileError> {
        self.check()?;
        fs::read(self.resolve(path)).map_err(map_io)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), FileError> {
        self.check()?;
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(map_io)?;
        }
        fs::write(full, data).map_err(map_io)
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        self.check()?;
        fs::remove_file(self.resolve(path)).map_err(map_io)
    }

    fn exists(&self, path: &str) -> bool {
        self.is_mounted() && self.resolve(path).exists()
    }

    fn create_dir_all(&self, path: &str) -> Result<(), FileError> {
        self.check()?;
        fs::create_dir_all(self.resolve(path)).map_err(map_io)
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, FileError> {
        self.check()?;
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(dir)).map_err(map_io)? {
            let entry = entry.map_err(map_io)?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
