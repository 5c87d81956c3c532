use std::fs;

use assert_matches::assert_matches;

use qmdata::config::ConfigLoader;
use qmdata::error::QmDataError;

#[test]
fn resolve_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("qmdata.json");
    fs::write(
        &path,
        r#"{
            "name": "qm9",
            "cache_dir": "/data/qmdata",
            "url": "https://mirror.example.org/qm9_v3.zip",
            "load_in_memory": false,
            "test_subset": false
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.name.as_str(), "qm9");
    assert_eq!(resolved.cache_dir.as_deref().map(|dir| dir.as_str()), Some("/data/qmdata"));
    assert_eq!(
        resolved.url.as_deref(),
        Some("https://mirror.example.org/qm9_v3.zip")
    );
    assert!(!resolved.load_in_memory);
}

#[test]
fn partial_config_fills_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("qmdata.json");
    fs::write(&path, r#"{ "test_subset": true }"#).unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.name.as_str(), "qm9-mini");
    assert!(resolved.load_in_memory);
    assert!(resolved.cache_dir.is_none());
}

#[test]
fn invalid_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("qmdata.json");
    fs::write(&path, b"{ not json").unwrap();

    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, QmDataError::ConfigParse(_));
}

#[test]
fn missing_file_is_a_read_error() {
    let err = ConfigLoader::resolve(Some("/definitely/not/here/qmdata.json")).unwrap_err();
    assert_matches!(err, QmDataError::ConfigRead(_));
}
