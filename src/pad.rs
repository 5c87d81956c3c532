use tracing::debug;

use crate::error::QmDataError;
use crate::parse::FieldTable;

/// Fixed-shape numeric blocks, one row per record. Variable-length fields are
/// left-aligned and zero-padded to `max_atoms`; scalar fields are unpadded.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedDataset {
    num_records: usize,
    max_atoms: usize,
    coordinates: Vec<f64>,
    atomic_numbers: Vec<i64>,
    atom_counts: Vec<i64>,
    property_values: Vec<f64>,
}

impl PaddedDataset {
    pub(crate) fn from_blocks(
        num_records: usize,
        max_atoms: usize,
        coordinates: Vec<f64>,
        atomic_numbers: Vec<i64>,
        atom_counts: Vec<i64>,
        property_values: Vec<f64>,
    ) -> Self {
        Self {
            num_records,
            max_atoms,
            coordinates,
            atomic_numbers,
            atom_counts,
            property_values,
        }
    }

    pub fn len(&self) -> usize {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    pub fn max_atoms(&self) -> usize {
        self.max_atoms
    }

    /// Padded coordinate row, shape `(max_atoms, 3)` flattened.
    pub fn coordinates_of(&self, index: usize) -> &[f64] {
        let stride = self.max_atoms * 3;
        &self.coordinates[index * stride..(index + 1) * stride]
    }

    /// Padded species row, shape `(max_atoms,)`.
    pub fn atomic_numbers_of(&self, index: usize) -> &[i64] {
        &self.atomic_numbers[index * self.max_atoms..(index + 1) * self.max_atoms]
    }

    pub fn atom_count_of(&self, index: usize) -> usize {
        self.atom_counts[index] as usize
    }

    pub fn property_of(&self, index: usize) -> f64 {
        self.property_values[index]
    }

    pub(crate) fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub(crate) fn atomic_numbers(&self) -> &[i64] {
        &self.atomic_numbers
    }

    pub(crate) fn atom_counts(&self) -> &[i64] {
        &self.atom_counts
    }

    pub(crate) fn property_values(&self) -> &[f64] {
        &self.property_values
    }
}

/// Aligns every variable-length field to the max atom count of the species
/// field, filling the tail of each row with zeros. Zero records is legal and
/// produces an empty dataset.
pub fn pad(table: &FieldTable) -> Result<PaddedDataset, QmDataError> {
    let num_records = table.len();
    let max_atoms = table
        .atomic_numbers()
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0);

    let mut coordinates = vec![0.0f64; num_records * max_atoms * 3];
    let mut atomic_numbers = vec![0i64; num_records * max_atoms];
    let mut atom_counts = vec![0i64; num_records];

    for (record, (positions, species)) in table
        .geometry()
        .iter()
        .zip(table.atomic_numbers())
        .enumerate()
    {
        if positions.len() != species.len() {
            return Err(QmDataError::InconsistentFieldTable(format!(
                "record {}: geometry has {} atoms, atomic_numbers has {}",
                record,
                positions.len(),
                species.len()
            )));
        }
        for (atom, position) in positions.iter().enumerate() {
            let base = (record * max_atoms + atom) * 3;
            coordinates[base..base + 3].copy_from_slice(position);
        }
        atomic_numbers[record * max_atoms..record * max_atoms + species.len()]
            .copy_from_slice(species);
        atom_counts[record] = species.len() as i64;
    }

    debug!(records = num_records, max_atoms, "padded field table");
    Ok(PaddedDataset {
        num_records,
        max_atoms,
        coordinates,
        atomic_numbers,
        atom_counts,
        property_values: table.property_values().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn table(counts: &[usize]) -> FieldTable {
        let geometry = counts
            .iter()
            .map(|&n| (0..n).map(|i| [i as f64, 0.0, 0.0]).collect())
            .collect();
        let species = counts.iter().map(|&n| vec![1i64; n]).collect();
        let properties = counts.iter().map(|&n| n as f64).collect();
        FieldTable::new(geometry, species, properties).unwrap()
    }

    #[test]
    fn pads_to_max_atom_count() {
        let padded = pad(&table(&[2, 4, 3])).unwrap();
        assert_eq!(padded.len(), 3);
        assert_eq!(padded.max_atoms(), 4);

        // Row 0: two real entries, two sentinel zeros.
        assert_eq!(padded.atomic_numbers_of(0), &[1, 1, 0, 0]);
        assert_eq!(padded.atom_count_of(0), 2);
        assert_eq!(padded.coordinates_of(0).len(), 12);
        assert_eq!(&padded.coordinates_of(0)[..6], &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&padded.coordinates_of(0)[6..], &[0.0; 6]);

        assert_eq!(padded.atomic_numbers_of(1), &[1, 1, 1, 1]);
        assert_eq!(padded.property_of(2), 3.0);
    }

    #[test]
    fn padding_is_idempotent_on_uniform_lengths() {
        let first = pad(&table(&[3, 3, 3])).unwrap();
        assert_eq!(first.max_atoms(), 3);
        for record in 0..first.len() {
            assert_eq!(first.atom_count_of(record), 3);
            assert!(first.atomic_numbers_of(record).iter().all(|&z| z == 1));
        }

        let second = pad(&table(&[3, 3, 3])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_table_is_legal() {
        let padded = pad(&table(&[])).unwrap();
        assert!(padded.is_empty());
        assert_eq!(padded.max_atoms(), 0);
    }

    #[test]
    fn rejects_per_record_length_mismatch() {
        let table = FieldTable::new(
            vec![vec![[0.0; 3], [1.0, 0.0, 0.0]]],
            vec![vec![1]],
            vec![0.0],
        )
        .unwrap();
        let err = pad(&table).unwrap_err();
        assert_matches!(err, QmDataError::InconsistentFieldTable(_));
    }
}
