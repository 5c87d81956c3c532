use std::fs;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use qmdata::cache::read_cache;
use qmdata::dataset::{ContainerArchiveSource, DatasetView, TableArchiveSource};
use qmdata::domain::{ArchiveFormat, DatasetId};
use qmdata::error::QmDataError;
use qmdata::fetch::{ArchiveClient, FetchOutcome, ProgressSink};
use qmdata::layout::CacheLayout;
use qmdata::npz::NpzWriter;
use qmdata::parse::TableSpec;

// Three molecules with atom counts [2, 4, 3]; energies in fake raw units
// converted by the table spec's property scale.
const RAW_TABLE: &str = "mol_id z x y z_coord energy\n\
    m1 1 0.0 0.0 0.0 1.0\n\
    m1 1 0.0 0.0 0.74 1.0\n\
    m2 6 0.5 0.5 0.5 2.0\n\
    m2 1 1.0 0.0 0.0 2.0\n\
    m2 1 0.0 1.0 0.0 2.0\n\
    m2 1 0.0 0.0 1.0 2.0\n\
    m3 8 0.0 0.0 0.1 3.0\n\
    m3 1 0.9 0.0 0.0 3.0\n\
    m3 1 0.0 0.9 0.0 3.0\n\
    \n";

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Serves a prepared archive instead of the network, with the same
/// skip-if-present contract as the HTTP client.
struct MockClient {
    archive: Vec<u8>,
    downloads: Arc<Mutex<usize>>,
}

impl MockClient {
    fn new(archive: Vec<u8>) -> Self {
        Self {
            archive,
            downloads: Arc::new(Mutex::new(0)),
        }
    }

    fn counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.downloads)
    }
}

impl ArchiveClient for MockClient {
    fn download(
        &self,
        _url: &str,
        destination: &Utf8Path,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, QmDataError> {
        if destination.as_std_path().exists() && !force {
            return Ok(FetchOutcome::AlreadyCached);
        }
        *self.downloads.lock().unwrap() += 1;
        let total = self.archive.len() as u64;
        sink.on_progress(total / 2, Some(total));
        sink.on_progress(total, Some(total));
        fs::write(destination.as_std_path(), &self.archive)
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
        Ok(FetchOutcome::Downloaded { bytes: total })
    }
}

/// Any download attempt is a test failure.
struct OfflineClient;

impl ArchiveClient for OfflineClient {
    fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        force: bool,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, QmDataError> {
        if destination.as_std_path().exists() && !force {
            return Ok(FetchOutcome::AlreadyCached);
        }
        Err(QmDataError::Http {
            url: url.to_string(),
            message: "network disabled in this test".to_string(),
        })
    }
}

fn test_layout(temp: &tempfile::TempDir) -> CacheLayout {
    CacheLayout::with_root(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap())
}

fn table_source() -> TableArchiveSource {
    let id: DatasetId = "qm9-test".parse().unwrap();
    TableArchiveSource::new(id, "https://example.org/qm9-test.zip", ArchiveFormat::Zip)
        .with_spec(TableSpec {
            property_scale: 27.211,
            ..TableSpec::default()
        })
}

fn raw_archive() -> Vec<u8> {
    zip_bytes(&[("records.table", RAW_TABLE.as_bytes())])
}

#[test]
fn pipeline_materializes_padded_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockClient::new(raw_archive());
    let view = DatasetView::new(table_source(), client, test_layout(&temp));

    assert_eq!(view.len().unwrap(), 3);

    // Atom counts [2, 4, 3] pad to (3, 4).
    let first = view.get(0).unwrap();
    assert_eq!(first.num_atoms, 2);
    assert_eq!(first.atomic_numbers, &[1, 1, 0, 0]);
    assert_eq!(first.coordinates.len(), 12);
    assert_eq!(&first.coordinates[..6], &[0.0, 0.0, 0.0, 0.0, 0.0, 0.74]);
    assert_eq!(&first.coordinates[6..], &[0.0; 6]);

    let second = view.get(1).unwrap();
    assert_eq!(second.num_atoms, 4);
    assert_eq!(second.atomic_numbers, &[6, 1, 1, 1]);

    // Raw energy 1.0 scaled by 27.211 exactly once.
    assert_eq!(first.property_value, 27.211);
    assert_eq!(view.get(2).unwrap().property_value, 3.0 * 27.211);
}

#[test]
fn materialization_happens_once_per_view() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockClient::new(raw_archive());
    let downloads = client.counter();
    let view = DatasetView::new(table_source(), client, test_layout(&temp));

    assert_eq!(view.len().unwrap(), 3);
    for _ in 0..10 {
        view.get(0).unwrap();
    }
    assert_eq!(*downloads.lock().unwrap(), 1);
}

#[test]
fn existing_cache_short_circuits_the_pipeline() {
    let temp = tempfile::tempdir().unwrap();
    let layout = test_layout(&temp);
    let id: DatasetId = "qm9-test".parse().unwrap();

    let client = MockClient::new(raw_archive());
    let downloads = client.counter();
    let first = DatasetView::new(table_source(), client, layout.clone());
    assert_eq!(first.len().unwrap(), 3);
    assert_eq!(*downloads.lock().unwrap(), 1);

    // Even with the raw archive and extraction gone, a valid cache serves
    // without any fetch or extract work.
    fs::remove_file(layout.raw_archive_path(&id, ArchiveFormat::Zip).as_std_path()).unwrap();
    fs::remove_dir_all(layout.extract_dir(&id).as_std_path()).unwrap();

    let second = DatasetView::new(table_source(), OfflineClient, layout);
    assert_eq!(second.len().unwrap(), 3);
    assert_eq!(second.get(1).unwrap().num_atoms, 4);
}

#[test]
fn get_out_of_range_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockClient::new(raw_archive());
    let view = DatasetView::new(table_source(), client, test_layout(&temp));

    let err = view.get(3).unwrap_err();
    assert_matches!(err, QmDataError::IndexOutOfRange { index: 3, len: 3 });
}

#[test]
fn corrupt_cache_triggers_rebuild() {
    let temp = tempfile::tempdir().unwrap();
    let layout = test_layout(&temp);
    let id: DatasetId = "qm9-test".parse().unwrap();

    let client = MockClient::new(raw_archive());
    let first = DatasetView::new(table_source(), client, layout.clone());
    assert_eq!(first.len().unwrap(), 3);

    fs::write(layout.dataset_cache_path(&id).as_std_path(), b"garbage").unwrap();

    // The raw archive is still present, so the rebuild needs no download.
    let second = DatasetView::new(table_source(), OfflineClient, layout.clone());
    assert_eq!(second.len().unwrap(), 3);
    assert_eq!(second.get(0).unwrap().property_value, 27.211);
}

#[test]
fn conversion_is_not_reapplied_on_reload() {
    let temp = tempfile::tempdir().unwrap();
    let layout = test_layout(&temp);

    let client = MockClient::new(raw_archive());
    let first = DatasetView::new(table_source(), client, layout.clone());
    assert_eq!(first.get(0).unwrap().property_value, 27.211);

    // A fresh view over the same cache loads the converted values as-is.
    let second = DatasetView::new(table_source(), OfflineClient, layout);
    assert_eq!(second.get(0).unwrap().property_value, 27.211);
}

#[test]
fn force_rebuild_downloads_again() {
    let temp = tempfile::tempdir().unwrap();
    let layout = test_layout(&temp);

    let client = MockClient::new(raw_archive());
    let view = DatasetView::new(table_source(), client, layout.clone());
    assert_eq!(view.len().unwrap(), 3);

    let client = MockClient::new(raw_archive());
    let downloads = client.counter();
    let rebuilt = DatasetView::new(table_source(), client, layout)
        .with_force_rebuild(true);
    assert_eq!(rebuilt.len().unwrap(), 3);
    assert_eq!(*downloads.lock().unwrap(), 1);
}

#[test]
fn empty_table_yields_empty_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let archive = zip_bytes(&[("records.table", b"mol_id z x y z_coord energy\n")]);
    let client = MockClient::new(archive);
    let view = DatasetView::new(table_source(), client, test_layout(&temp));

    assert_eq!(view.len().unwrap(), 0);
    assert!(view.is_empty().unwrap());
    assert_matches!(
        view.get(0).unwrap_err(),
        QmDataError::IndexOutOfRange { index: 0, len: 0 }
    );
}

#[test]
fn container_source_round_trips() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    // Build a container distribution: two molecules, [2, 1] atoms.
    let container_path = root.join("payload.npz");
    let mut writer = NpzWriter::create(&container_path).unwrap();
    writer.write_i64("n_atoms", &[2], &[2, 1]).unwrap();
    writer
        .write_f64(
            "coordinates",
            &[3, 3],
            &[0.0, 0.0, 0.0, 0.0, 0.0, 0.74, 0.1, 0.2, 0.3],
        )
        .unwrap();
    writer.write_i64("atomic_numbers", &[3], &[1, 1, 8]).unwrap();
    writer.write_f64("energies", &[2], &[-31.5, -2040.1]).unwrap();
    writer.finish().unwrap();
    let archive = zip_bytes(&[(
        "payload.npz",
        fs::read(container_path.as_std_path()).unwrap().as_slice(),
    )]);

    let id: DatasetId = "qm9-container".parse().unwrap();
    let source = ContainerArchiveSource::new(
        id.clone(),
        "https://example.org/qm9-container.zip",
        ArchiveFormat::Zip,
    );
    let layout = CacheLayout::with_root(root.join("cache"));
    let view = DatasetView::new(source, MockClient::new(archive), layout.clone());

    assert_eq!(view.len().unwrap(), 2);
    let first = view.get(0).unwrap();
    assert_eq!(first.num_atoms, 2);
    assert_eq!(first.atomic_numbers, &[1, 1]);
    assert_eq!(first.property_value, -31.5);

    let cached = read_cache(&layout.dataset_cache_path(&id)).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached.max_atoms(), 2);
}

#[test]
fn manifest_records_the_build() {
    let temp = tempfile::tempdir().unwrap();
    let layout = test_layout(&temp);
    let id: DatasetId = "qm9-test".parse().unwrap();

    let client = MockClient::new(raw_archive());
    let view = DatasetView::new(table_source(), client, layout.clone());
    view.materialize().unwrap();

    let manifest = CacheLayout::read_manifest(&layout.manifest_path(&id)).unwrap();
    assert_eq!(manifest.name, "qm9-test");
    assert_eq!(manifest.records, 3);
    assert_eq!(manifest.max_atoms, 4);
    assert_eq!(manifest.source_url, "https://example.org/qm9-test.zip");
}
