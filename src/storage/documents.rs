//! JSON catalog documents on the removable medium.
//!
//! A catalog is an aggregate array file plus a directory holding one
//! pretty-printed document per record, named `<id>.json`.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value as Json;

use crate::app::ports::{FileError, FileStore};
use crate::error::{Error, Result};

/// Ids become file names under the catalog directory, so path separators
/// and leading dots are refused.
pub fn check_record_id(id: &str) -> Result<()> {
    if id.contains(['/', '\\', '\0']) || id.starts_with('.') {
        return Err(Error::InvalidArgument("id is not a valid file name"));
    }
    Ok(())
}

/// Where one catalog lives, relative to the medium root.
#[derive(Debug, Clone, Copy)]
pub struct CatalogFiles {
    pub aggregate: &'static str,
    pub dir: &'static str,
}

impl CatalogFiles {
    pub fn record_path(&self, id: &str) -> String {
        format!("{}/{}.json", self.dir, id)
    }

    /// Parse the aggregate array.
    ///
    /// A missing, truncated (under two bytes) or unparsable file is
    /// [`Error::NotFound`] so the caller re-exports over it.
    pub fn read_array(&self, files: &dyn FileStore) -> Result<Vec<Json>> {
        if !files.is_mounted() {
            return Err(FileError::NotMounted.into());
        }
        let data = match files.read(self.aggregate) {
            Ok(d) => d,
            Err(FileError::NotFound) => {
                debug!("Catalog: {} not found", self.aggregate);
                return Err(Error::NotFound);
            }
            Err(e) => return Err(e.into()),
        };
        if data.len() < 2 {
            warn!("Catalog: {} is empty ({} bytes)", self.aggregate, data.len());
            return Err(Error::NotFound);
        }
        match serde_json::from_slice::<Json>(&data) {
            Ok(Json::Array(items)) => Ok(items),
            Ok(_) => Err(Error::InvalidArgument("catalog root is not an array")),
            Err(e) => {
                warn!("Catalog: {} unparsable ({}), treating as missing", self.aggregate, e);
                Err(Error::NotFound)
            }
        }
    }

    /// Write the aggregate array and one file per record, then remove
    /// per-record files whose id is gone.
    pub fn write_all<T: Serialize>(&self, files: &dyn FileStore, records: &[(String, T)]) -> Result<usize> {
        let docs = self.write_records(files, records)?;
        let body = serde_json::to_vec_pretty(&Json::Array(docs))
            .map_err(|_| Error::InvalidArgument("catalog encode"))?;
        files.write(self.aggregate, &body)?;
        Ok(records.len())
    }

    /// Per-record files only; the aggregate is left alone.
    pub fn write_dir<T: Serialize>(&self, files: &dyn FileStore, records: &[(String, T)]) -> Result<usize> {
        self.write_records(files, records).map(|docs| docs.len())
    }

    fn write_records<T: Serialize>(&self, files: &dyn FileStore, records: &[(String, T)]) -> Result<Vec<Json>> {
        if !files.is_mounted() {
            return Err(FileError::NotMounted.into());
        }
        files.create_dir_all(self.dir)?;

        let mut docs = Vec::with_capacity(records.len());
        for (id, rec) in records {
            let doc = serde_json::to_value(rec).map_err(|_| Error::InvalidArgument("record encode"))?;
            if let Err(e) = write_pretty(files, &self.record_path(id), &doc) {
                warn!("Catalog: write {} failed: {}", self.record_path(id), e);
            }
            docs.push(doc);
        }
        self.prune(files, records.iter().map(|(id, _)| id.as_str()));
        Ok(docs)
    }

    fn prune<'a>(&self, files: &dyn FileStore, keep: impl Iterator<Item = &'a str> + Clone) {
        let Ok(names) = files.list_dir(self.dir) else {
            return;
        };
        for name in names {
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if !keep.clone().any(|id| id == stem) {
                let path = format!("{}/{}", self.dir, name);
                match files.remove(&path) {
                    Ok(()) => debug!("Catalog: removed stale {}", path),
                    Err(e) => warn!("Catalog: remove {} failed: {}", path, e),
                }
            }
        }
    }
}

/// Read every `*.json` document in `dir`, sorted by file name. Documents
/// that fail to parse are skipped with a warning.
pub fn read_dir_documents(files: &dyn FileStore, dir: &str) -> Result<Vec<Json>> {
    if !files.is_mounted() {
        return Err(FileError::NotMounted.into());
    }
    let mut names: Vec<String> = files
        .list_dir(dir)?
        .into_iter()
        .filter(|n| n.ends_with(".json"))
        .collect();
    names.sort();

    let mut docs = Vec::with_capacity(names.len());
    for name in names {
        let path = format!("{}/{}", dir, name);
        match files.read(&path).map(|d| serde_json::from_slice::<Json>(&d)) {
            Ok(Ok(doc)) => docs.push(doc),
            Ok(Err(e)) => warn!("Catalog: skipping {} ({})", path, e),
            Err(e) => warn!("Catalog: read {} failed: {}", path, e),
        }
    }
    Ok(docs)
}

pub fn write_pretty(files: &dyn FileStore, path: &str, doc: &Json) -> Result<()> {
    let mut body = serde_json::to_vec_pretty(doc).map_err(|_| Error::InvalidArgument("document encode"))?;
    body.push(b'\n');
    files.write(path, &body)?;
    Ok(())
}
