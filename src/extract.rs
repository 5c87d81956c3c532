use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::domain::ArchiveFormat;
use crate::error::QmDataError;

/// Directory of decompressed raw files, as produced by `extract_archive`.
/// Ephemeral: nothing holds on to it once parsing is done.
#[derive(Debug, Clone)]
pub struct ExtractedRecordSet {
    root: Utf8PathBuf,
}

impl ExtractedRecordSet {
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// All regular files under the extraction root, sorted for a stable order.
    pub fn files(&self) -> Result<Vec<Utf8PathBuf>, QmDataError> {
        let mut items = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = fs::read_dir(dir.as_std_path())
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| QmDataError::Filesystem(err.to_string()))?;
                let path = Utf8PathBuf::from_path_buf(entry.path())
                    .map_err(|_| QmDataError::Filesystem("non-utf8 path".to_string()))?;
                if path.is_dir() {
                    stack.push(path);
                } else {
                    items.push(path);
                }
            }
        }
        items.sort();
        Ok(items)
    }

    pub fn file_with_extension(&self, extension: &str) -> Result<Utf8PathBuf, QmDataError> {
        self.files()?
            .into_iter()
            .find(|path| path.extension() == Some(extension))
            .ok_or_else(|| QmDataError::CorruptArchive {
                path: self.root.clone(),
                message: format!("no .{extension} file in extracted archive"),
            })
    }
}

/// Unpacks `archive_path` into `output_dir`. Re-extraction into a non-empty
/// directory overwrites entry by entry.
pub fn extract_archive(
    archive_path: &Utf8Path,
    output_dir: &Utf8Path,
) -> Result<ExtractedRecordSet, QmDataError> {
    fs::create_dir_all(output_dir.as_std_path())
        .map_err(|err| QmDataError::Filesystem(err.to_string()))?;

    match ArchiveFormat::from_path(archive_path)? {
        ArchiveFormat::Zip => extract_zip(archive_path, output_dir)?,
        ArchiveFormat::Gzip => extract_gzip(archive_path, output_dir)?,
    }
    debug!(archive = %archive_path, into = %output_dir, "extracted raw archive");

    Ok(ExtractedRecordSet {
        root: output_dir.to_owned(),
    })
}

fn extract_zip(zip_path: &Utf8Path, target_dir: &Utf8Path) -> Result<(), QmDataError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(format!("open zip {zip_path}: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| QmDataError::CorruptArchive {
        path: zip_path.to_owned(),
        message: err.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| QmDataError::CorruptArchive {
                path: zip_path.to_owned(),
                message: err.to_string(),
            })?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.as_std_path().join(path),
            None => {
                return Err(QmDataError::CorruptArchive {
                    path: zip_path.to_owned(),
                    message: "zip entry path traversal detected".to_string(),
                });
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| QmDataError::CorruptArchive {
            path: zip_path.to_owned(),
            message: err.to_string(),
        })?;
    }
    Ok(())
}

// Single-member gzip: the payload lands under the archive's stem,
// e.g. qm9_raw.gz -> qm9_raw.
fn extract_gzip(gz_path: &Utf8Path, target_dir: &Utf8Path) -> Result<(), QmDataError> {
    let file = fs::File::open(gz_path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(format!("open gzip {gz_path}: {err}")))?;
    let mut decoder = GzDecoder::new(file);

    let stem = gz_path
        .file_stem()
        .ok_or_else(|| QmDataError::CorruptArchive {
            path: gz_path.to_owned(),
            message: "gzip archive has no file stem".to_string(),
        })?;
    let out_path = target_dir.join(stem);
    let mut outfile = fs::File::create(out_path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile).map_err(|err| QmDataError::CorruptArchive {
        path: gz_path.to_owned(),
        message: err.to_string(),
    })?;
    Ok(())
}

/// Full decompression pass over a zip without writing anything, to reject
/// truncated downloads before extraction.
pub fn validate_zip(zip_path: &Utf8Path) -> Result<(), QmDataError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(format!("open zip {zip_path}: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| QmDataError::CorruptArchive {
        path: zip_path.to_owned(),
        message: err.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| QmDataError::CorruptArchive {
                path: zip_path.to_owned(),
                message: err.to_string(),
            })?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| QmDataError::CorruptArchive {
            path: zip_path.to_owned(),
            message: err.to_string(),
        })?;
    }
    Ok(())
}
