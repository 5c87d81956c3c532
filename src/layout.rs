use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ArchiveFormat, DatasetId};
use crate::error::QmDataError;

/// Resolves where a dataset's raw archive, extraction directory, numeric
/// cache, and manifest live under a single cache root.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    cache_root: Utf8PathBuf,
}

impl CacheLayout {
    pub fn new() -> Result<Self, QmDataError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("qmdata")).ok()
            })
            .ok_or_else(|| {
                QmDataError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn raw_archive_path(&self, id: &DatasetId, format: ArchiveFormat) -> Utf8PathBuf {
        self.cache_root
            .join(format!("{id}_raw.{}", format.extension()))
    }

    pub fn extract_dir(&self, id: &DatasetId) -> Utf8PathBuf {
        self.cache_root.join(format!("{id}_extracted"))
    }

    pub fn dataset_cache_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.cache_root.join(format!("{id}.npz"))
    }

    pub fn manifest_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.cache_root.join(format!("{id}.manifest.json"))
    }

    pub fn ensure_cache_root(&self) -> Result<(), QmDataError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))
    }

    pub fn clear_dataset(&self, id: &DatasetId) -> Result<(), QmDataError> {
        for format in [ArchiveFormat::Zip, ArchiveFormat::Gzip] {
            remove_file_if_present(&self.raw_archive_path(id, format))?;
        }
        remove_file_if_present(&self.dataset_cache_path(id))?;
        remove_file_if_present(&self.manifest_path(id))?;
        let extract_dir = self.extract_dir(id);
        if extract_dir.as_std_path().exists() {
            fs::remove_dir_all(extract_dir.as_std_path())
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_manifest(path: &Utf8Path, manifest: &Manifest) -> Result<(), QmDataError> {
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        write_bytes_atomic(path, &content)
    }

    pub fn read_manifest(path: &Utf8Path) -> Result<Manifest, QmDataError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| QmDataError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| QmDataError::Filesystem(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub source_url: String,
    pub records: usize,
    pub max_atoms: usize,
    pub created_at: String,
    pub tool: String,
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), QmDataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(err.to_string()))
}

fn remove_file_if_present(path: &Utf8Path) -> Result<(), QmDataError> {
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path()).map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
