use std::cell::OnceCell;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::cache::{read_cache, write_cache};
use crate::domain::{ArchiveFormat, DatasetId};
use crate::error::QmDataError;
use crate::extract::{ExtractedRecordSet, extract_archive, validate_zip};
use crate::fetch::{ArchiveClient, ProgressSink, SilentProgress};
use crate::layout::{CacheLayout, Manifest};
use crate::pad::{PaddedDataset, pad};
use crate::parse::{ContainerSpec, FieldTable, TableSpec, parse_container, parse_table};

pub const QM9_URL: &str = "https://data.pyg.org/datasets/qm9_v3.zip";
pub const QM9_SUBSET_URL: &str = "https://data.pyg.org/datasets/qm9_v3_mini.zip";

const TABLE_EXTENSIONS: [&str; 3] = ["table", "csv", "txt"];

/// One dataset distribution: where the raw archive lives and how to turn its
/// extracted files into a field table.
pub trait DatasetSource {
    fn id(&self) -> &DatasetId;
    fn url(&self) -> &str;
    fn archive_format(&self) -> ArchiveFormat;
    fn parse(&self, extracted: &ExtractedRecordSet) -> Result<FieldTable, QmDataError>;
}

/// Distribution whose extracted archive holds a delimited atom table.
#[derive(Debug, Clone)]
pub struct TableArchiveSource {
    id: DatasetId,
    url: String,
    format: ArchiveFormat,
    spec: TableSpec,
}

impl TableArchiveSource {
    pub fn new(id: DatasetId, url: impl Into<String>, format: ArchiveFormat) -> Self {
        Self {
            id,
            url: url.into(),
            format,
            spec: TableSpec::default(),
        }
    }

    pub fn qm9() -> Result<Self, QmDataError> {
        Ok(Self::new("qm9".parse()?, QM9_URL, ArchiveFormat::Zip))
    }

    /// Reduced distribution for quick experiments and CI.
    pub fn qm9_subset() -> Result<Self, QmDataError> {
        Ok(Self::new(
            "qm9-mini".parse()?,
            QM9_SUBSET_URL,
            ArchiveFormat::Zip,
        ))
    }

    pub fn with_id(mut self, id: DatasetId) -> Self {
        self.id = id;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_spec(mut self, spec: TableSpec) -> Self {
        self.spec = spec;
        self
    }
}

impl DatasetSource for TableArchiveSource {
    fn id(&self) -> &DatasetId {
        &self.id
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn archive_format(&self) -> ArchiveFormat {
        self.format
    }

    fn parse(&self, extracted: &ExtractedRecordSet) -> Result<FieldTable, QmDataError> {
        for extension in TABLE_EXTENSIONS {
            if let Ok(path) = extracted.file_with_extension(extension) {
                return parse_table(&path, &self.spec);
            }
        }
        Err(QmDataError::CorruptArchive {
            path: extracted.root().to_owned(),
            message: "no record table in extracted archive".to_string(),
        })
    }
}

/// Distribution whose extracted archive holds an array container of named
/// blocks (atom counts, flat coordinates, flat species, property values).
#[derive(Debug, Clone)]
pub struct ContainerArchiveSource {
    id: DatasetId,
    url: String,
    format: ArchiveFormat,
    spec: ContainerSpec,
}

impl ContainerArchiveSource {
    pub fn new(id: DatasetId, url: impl Into<String>, format: ArchiveFormat) -> Self {
        Self {
            id,
            url: url.into(),
            format,
            spec: ContainerSpec::default(),
        }
    }

    pub fn with_spec(mut self, spec: ContainerSpec) -> Self {
        self.spec = spec;
        self
    }
}

impl DatasetSource for ContainerArchiveSource {
    fn id(&self) -> &DatasetId {
        &self.id
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn archive_format(&self) -> ArchiveFormat {
        self.format
    }

    fn parse(&self, extracted: &ExtractedRecordSet) -> Result<FieldTable, QmDataError> {
        let path = extracted.file_with_extension("npz")?;
        parse_container(&path, &self.spec)
    }
}

/// One record served to a training loop: padded rows plus the real atom count
/// so the consumer can slice off the sentinel tail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<'a> {
    pub coordinates: &'a [f64],
    pub atomic_numbers: &'a [i64],
    pub num_atoms: usize,
    pub property_value: f64,
}

/// Length + random access over a lazily materialized dataset. The first call
/// to `len` or `get` loads the on-disk cache, or on a miss runs the full
/// fetch → extract → parse → pad → cache pipeline exactly once; the result is
/// held for the view's lifetime. Many views over the same cache directory
/// converge to identical on-disk data.
pub struct DatasetView<S: DatasetSource, C: ArchiveClient> {
    source: S,
    client: C,
    layout: CacheLayout,
    progress: Box<dyn ProgressSink>,
    force_rebuild: bool,
    loaded: OnceCell<PaddedDataset>,
}

impl<S: DatasetSource, C: ArchiveClient> DatasetView<S, C> {
    pub fn new(source: S, client: C, layout: CacheLayout) -> Self {
        Self {
            source,
            client,
            layout,
            progress: Box::new(SilentProgress),
            force_rebuild: false,
            loaded: OnceCell::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Ignore any existing cache and raw archive and rebuild from the source.
    pub fn with_force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn len(&self) -> Result<usize, QmDataError> {
        Ok(self.materialize()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QmDataError> {
        Ok(self.materialize()?.is_empty())
    }

    pub fn get(&self, index: usize) -> Result<Sample<'_>, QmDataError> {
        let data = self.materialize()?;
        if index >= data.len() {
            return Err(QmDataError::IndexOutOfRange {
                index,
                len: data.len(),
            });
        }
        Ok(Sample {
            coordinates: data.coordinates_of(index),
            atomic_numbers: data.atomic_numbers_of(index),
            num_atoms: data.atom_count_of(index),
            property_value: data.property_of(index),
        })
    }

    pub fn materialize(&self) -> Result<&PaddedDataset, QmDataError> {
        if let Some(data) = self.loaded.get() {
            return Ok(data);
        }
        let data = self.load_or_build()?;
        Ok(self.loaded.get_or_init(|| data))
    }

    fn load_or_build(&self) -> Result<PaddedDataset, QmDataError> {
        self.layout.ensure_cache_root()?;
        let cache_path = self.layout.dataset_cache_path(self.source.id());

        if !self.force_rebuild {
            match read_cache(&cache_path) {
                Ok(data) => {
                    info!(dataset = %self.source.id(), "serving dataset from cache");
                    return Ok(data);
                }
                Err(QmDataError::CacheMiss(_)) => {
                    info!(dataset = %self.source.id(), "no cache yet, building from raw");
                }
                Err(QmDataError::CacheCorrupt { path, message }) => {
                    warn!(cache = %path, %message, "cache unreadable, rebuilding from raw");
                }
                Err(err) => return Err(err),
            }
        }
        self.rebuild(&cache_path)
    }

    fn rebuild(&self, cache_path: &Utf8Path) -> Result<PaddedDataset, QmDataError> {
        let id = self.source.id();
        let format = self.source.archive_format();
        let raw_path = self.layout.raw_archive_path(id, format);

        self.client.download(
            self.source.url(),
            &raw_path,
            self.force_rebuild,
            self.progress.as_ref(),
        )?;
        if format == ArchiveFormat::Zip {
            validate_zip(&raw_path)?;
        }

        let extracted = extract_archive(&raw_path, &self.layout.extract_dir(id))?;
        let table = self.source.parse(&extracted)?;
        let padded = pad(&table)?;
        write_cache(cache_path, &padded)?;

        let manifest = Manifest {
            name: id.to_string(),
            source_url: self.source.url().to_string(),
            records: padded.len(),
            max_atoms: padded.max_atoms(),
            created_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("qmdata/{}", env!("CARGO_PKG_VERSION")),
        };
        CacheLayout::write_manifest(&self.layout.manifest_path(id), &manifest)?;

        // Serve exactly what landed on disk.
        read_cache(cache_path)
    }
}
