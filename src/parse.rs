use std::fs;

use camino::Utf8Path;
use tracing::debug;

use crate::domain::HARTREE_TO_EV;
use crate::error::QmDataError;
use crate::npz::{NpzReader, expect_shape};

/// Per-record arrays keyed by logical field, in stable record order. Every
/// field has the same record count; per-atom lengths may differ per record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTable {
    geometry: Vec<Vec<[f64; 3]>>,
    atomic_numbers: Vec<Vec<i64>>,
    property_values: Vec<f64>,
}

impl FieldTable {
    pub fn new(
        geometry: Vec<Vec<[f64; 3]>>,
        atomic_numbers: Vec<Vec<i64>>,
        property_values: Vec<f64>,
    ) -> Result<Self, QmDataError> {
        if geometry.len() != atomic_numbers.len() || geometry.len() != property_values.len() {
            return Err(QmDataError::InconsistentFieldTable(format!(
                "record counts differ: geometry={}, atomic_numbers={}, property_values={}",
                geometry.len(),
                atomic_numbers.len(),
                property_values.len()
            )));
        }
        Ok(Self {
            geometry,
            atomic_numbers,
            property_values,
        })
    }

    pub fn len(&self) -> usize {
        self.atomic_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atomic_numbers.is_empty()
    }

    pub fn geometry(&self) -> &[Vec<[f64; 3]>] {
        &self.geometry
    }

    pub fn atomic_numbers(&self) -> &[Vec<i64>] {
        &self.atomic_numbers
    }

    pub fn property_values(&self) -> &[f64] {
        &self.property_values
    }
}

/// Binds raw table columns to logical fields. Rows sharing the value in
/// `record_column` form one record; the per-record property is read off the
/// record's first row. Conversion factors are applied here, once.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub header_rows: usize,
    pub record_column: usize,
    pub species_column: usize,
    pub position_columns: [usize; 3],
    pub property_column: usize,
    pub position_scale: f64,
    pub property_scale: f64,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            header_rows: 1,
            record_column: 0,
            species_column: 1,
            position_columns: [2, 3, 4],
            property_column: 5,
            position_scale: 1.0,
            property_scale: HARTREE_TO_EV,
        }
    }
}

impl TableSpec {
    fn min_columns(&self) -> usize {
        let mut max = self.record_column.max(self.species_column);
        max = max.max(self.property_column);
        for column in self.position_columns {
            max = max.max(column);
        }
        max + 1
    }
}

pub fn parse_table(path: &Utf8Path, spec: &TableSpec) -> Result<FieldTable, QmDataError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| QmDataError::Filesystem(format!("read {path}: {err}")))?;

    let mut geometry: Vec<Vec<[f64; 3]>> = Vec::new();
    let mut atomic_numbers: Vec<Vec<i64>> = Vec::new();
    let mut property_values: Vec<f64> = Vec::new();
    let mut current_key: Option<String> = None;

    for line in content.lines().skip(spec.header_rows) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split_whitespace().collect();
        let starts_record = current_key.as_deref() != Some(column_or_empty(&columns, spec.record_column));
        let record = if starts_record {
            atomic_numbers.len()
        } else {
            atomic_numbers.len() - 1
        };

        if columns.len() < spec.min_columns() {
            return Err(QmDataError::MalformedRecord {
                record,
                message: format!(
                    "expected at least {} columns, found {}",
                    spec.min_columns(),
                    columns.len()
                ),
            });
        }

        let species = parse_int(columns[spec.species_column], record, "atomic number")?;
        let position = [
            parse_float(columns[spec.position_columns[0]], record, "x")? * spec.position_scale,
            parse_float(columns[spec.position_columns[1]], record, "y")? * spec.position_scale,
            parse_float(columns[spec.position_columns[2]], record, "z")? * spec.position_scale,
        ];
        let property = parse_float(columns[spec.property_column], record, "property")?;

        if starts_record {
            current_key = Some(columns[spec.record_column].to_string());
            geometry.push(Vec::new());
            atomic_numbers.push(Vec::new());
            property_values.push(property * spec.property_scale);
        }
        geometry[record].push(position);
        atomic_numbers[record].push(species);
    }

    debug!(records = atomic_numbers.len(), table = %path, "parsed record table");
    FieldTable::new(geometry, atomic_numbers, property_values)
}

fn column_or_empty<'a>(columns: &[&'a str], index: usize) -> &'a str {
    columns.get(index).copied().unwrap_or("")
}

fn parse_float(token: &str, record: usize, field: &str) -> Result<f64, QmDataError> {
    token.parse::<f64>().map_err(|_| QmDataError::MalformedRecord {
        record,
        message: format!("non-numeric {field} value: {token:?}"),
    })
}

fn parse_int(token: &str, record: usize, field: &str) -> Result<i64, QmDataError> {
    token.parse::<i64>().map_err(|_| QmDataError::MalformedRecord {
        record,
        message: format!("non-numeric {field} value: {token:?}"),
    })
}

/// Binds named container blocks to logical fields: per-record atom counts,
/// flat coordinates, flat species, per-record property values.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub lengths_key: String,
    pub coordinates_key: String,
    pub species_key: String,
    pub property_key: String,
    pub position_scale: f64,
    pub property_scale: f64,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            lengths_key: "n_atoms".to_string(),
            coordinates_key: "coordinates".to_string(),
            species_key: "atomic_numbers".to_string(),
            property_key: "energies".to_string(),
            position_scale: 1.0,
            property_scale: 1.0,
        }
    }
}

pub fn parse_container(path: &Utf8Path, spec: &ContainerSpec) -> Result<FieldTable, QmDataError> {
    let corrupt = |message: String| QmDataError::CorruptArchive {
        path: path.to_owned(),
        message,
    };

    let mut reader = NpzReader::open(path).map_err(|err| corrupt(err.to_string()))?;
    let (lengths_shape, lengths) = reader
        .read_i64(&spec.lengths_key)
        .map_err(|err| corrupt(err.to_string()))?;
    let (coords_shape, coords) = reader
        .read_f64(&spec.coordinates_key)
        .map_err(|err| corrupt(err.to_string()))?;
    let (species_shape, species) = reader
        .read_i64(&spec.species_key)
        .map_err(|err| corrupt(err.to_string()))?;
    let (property_shape, properties) = reader
        .read_f64(&spec.property_key)
        .map_err(|err| corrupt(err.to_string()))?;

    expect_shape(&spec.lengths_key, &lengths_shape, &[]).map_err(|err| corrupt(err.to_string()))?;
    let coord_rows =
        expect_shape(&spec.coordinates_key, &coords_shape, &[3]).map_err(|err| corrupt(err.to_string()))?;
    expect_shape(&spec.species_key, &species_shape, &[]).map_err(|err| corrupt(err.to_string()))?;
    expect_shape(&spec.property_key, &property_shape, &[]).map_err(|err| corrupt(err.to_string()))?;

    let records = lengths.len();
    if properties.len() != records {
        return Err(QmDataError::InconsistentFieldTable(format!(
            "{} has {} records, {} has {}",
            spec.lengths_key,
            records,
            spec.property_key,
            properties.len()
        )));
    }

    let mut total: usize = 0;
    for (record, &length) in lengths.iter().enumerate() {
        if length < 0 {
            return Err(QmDataError::MalformedRecord {
                record,
                message: format!("negative atom count: {length}"),
            });
        }
        total += length as usize;
    }
    if coord_rows as usize != total || species.len() != total {
        return Err(QmDataError::InconsistentFieldTable(format!(
            "{} atom rows, {} species entries, but atom counts sum to {}",
            coord_rows,
            species.len(),
            total
        )));
    }

    let mut geometry = Vec::with_capacity(records);
    let mut atomic_numbers = Vec::with_capacity(records);
    let mut offset = 0usize;
    for &length in &lengths {
        let length = length as usize;
        let record_coords = coords[offset * 3..(offset + length) * 3]
            .chunks_exact(3)
            .map(|row| {
                [
                    row[0] * spec.position_scale,
                    row[1] * spec.position_scale,
                    row[2] * spec.position_scale,
                ]
            })
            .collect();
        geometry.push(record_coords);
        atomic_numbers.push(species[offset..offset + length].to_vec());
        offset += length;
    }
    let property_values = properties
        .into_iter()
        .map(|value| value * spec.property_scale)
        .collect();

    debug!(records, container = %path, "parsed record container");
    FieldTable::new(geometry, atomic_numbers, property_values)
}
