use std::fs;

use camino::Utf8Path;
use tracing::debug;

use crate::error::QmDataError;
use crate::npz::{NpzReader, NpzWriter};
use crate::pad::PaddedDataset;

const COORDINATES: &str = "coordinates";
const ATOMIC_NUMBERS: &str = "atomic_numbers";
const ATOM_COUNTS: &str = "atom_counts";
const PROPERTY_VALUES: &str = "property_values";

/// Persists the padded blocks next to each other in one array container.
/// The final path only ever holds a complete container: the write goes to a
/// sibling temp file and is renamed into place.
pub fn write_cache(path: &Utf8Path, dataset: &PaddedDataset) -> Result<(), QmDataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("npz.tmp");

    let records = dataset.len() as u64;
    let max_atoms = dataset.max_atoms() as u64;

    let mut writer = NpzWriter::create(&tmp_path)
        .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    let codec = |err: crate::npz::NpzError| QmDataError::Filesystem(err.to_string());
    writer
        .write_f64(COORDINATES, &[records, max_atoms, 3], dataset.coordinates())
        .map_err(codec)?;
    writer
        .write_i64(ATOMIC_NUMBERS, &[records, max_atoms], dataset.atomic_numbers())
        .map_err(codec)?;
    writer
        .write_i64(ATOM_COUNTS, &[records], dataset.atom_counts())
        .map_err(codec)?;
    writer
        .write_f64(PROPERTY_VALUES, &[records], dataset.property_values())
        .map_err(codec)?;
    writer.finish().map_err(codec)?;

    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(err.to_string()))?;
    debug!(cache = %path, records = dataset.len(), "wrote dataset cache");
    Ok(())
}

/// Reloads a container written by `write_cache`, bit-identical. A missing
/// file is a `CacheMiss`; anything unreadable or mis-shaped is
/// `CacheCorrupt`. Both mean "rebuild from raw" to the caller.
pub fn read_cache(path: &Utf8Path) -> Result<PaddedDataset, QmDataError> {
    if !path.as_std_path().exists() {
        return Err(QmDataError::CacheMiss(path.to_owned()));
    }
    let corrupt = |message: String| QmDataError::CacheCorrupt {
        path: path.to_owned(),
        message,
    };

    let mut reader = NpzReader::open(path).map_err(|err| corrupt(err.to_string()))?;
    let (coords_shape, coordinates) = reader
        .read_f64(COORDINATES)
        .map_err(|err| corrupt(err.to_string()))?;
    let (species_shape, atomic_numbers) = reader
        .read_i64(ATOMIC_NUMBERS)
        .map_err(|err| corrupt(err.to_string()))?;
    let (counts_shape, atom_counts) = reader
        .read_i64(ATOM_COUNTS)
        .map_err(|err| corrupt(err.to_string()))?;
    let (property_shape, property_values) = reader
        .read_f64(PROPERTY_VALUES)
        .map_err(|err| corrupt(err.to_string()))?;

    let [records, max_atoms] = species_shape[..] else {
        return Err(corrupt(format!(
            "{ATOMIC_NUMBERS} has shape {species_shape:?}, expected rank 2"
        )));
    };
    if coords_shape != [records, max_atoms, 3] {
        return Err(corrupt(format!(
            "{COORDINATES} has shape {coords_shape:?}, expected ({records}, {max_atoms}, 3)"
        )));
    }
    if counts_shape != [records] || property_shape != [records] {
        return Err(corrupt(format!(
            "scalar blocks have shapes {counts_shape:?} and {property_shape:?}, expected ({records},)"
        )));
    }

    debug!(cache = %path, records, "loaded dataset cache");
    Ok(PaddedDataset::from_blocks(
        records as usize,
        max_atoms as usize,
        coordinates,
        atomic_numbers,
        atom_counts,
        property_values,
    ))
}
