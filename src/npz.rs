use std::fs::File;
use std::io::{Read, Write};

use camino::Utf8Path;
use npyz::WriterBuilder;
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Low-level codec for the array-container format used both for the final
/// dataset cache and for container-encoded raw distributions: a zip archive
/// of named npy blocks, one entry per field.
#[derive(Debug, Error)]
pub enum NpzError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Zip(#[from] ZipError),

    #[error("missing block: {0}")]
    MissingBlock(String),

    #[error("block {name} has shape {shape:?}, expected {expected}")]
    BlockShape {
        name: String,
        shape: Vec<u64>,
        expected: String,
    },
}

pub struct NpzWriter {
    zip: ZipWriter<File>,
}

impl NpzWriter {
    pub fn create(path: &Utf8Path) -> Result<Self, NpzError> {
        let file = File::create(path.as_std_path())?;
        Ok(Self {
            zip: ZipWriter::new(file),
        })
    }

    pub fn write_f64(&mut self, name: &str, shape: &[u64], data: &[f64]) -> Result<(), NpzError> {
        self.write_block(name, shape, data)
    }

    pub fn write_i64(&mut self, name: &str, shape: &[u64], data: &[i64]) -> Result<(), NpzError> {
        self.write_block(name, shape, data)
    }

    fn write_block<T>(&mut self, name: &str, shape: &[u64], data: &[T]) -> Result<(), NpzError>
    where
        T: npyz::AutoSerialize + Copy,
    {
        let mut buf = Vec::new();
        let mut writer = npyz::WriteOptions::new()
            .default_dtype()
            .shape(shape)
            .writer(&mut buf)
            .begin_nd()?;
        writer.extend(data.iter().copied())?;
        writer.finish()?;

        self.zip
            .start_file(format!("{name}.npy"), SimpleFileOptions::default())?;
        self.zip.write_all(&buf)?;
        Ok(())
    }

    pub fn finish(self) -> Result<(), NpzError> {
        self.zip.finish()?;
        Ok(())
    }
}

pub struct NpzReader {
    archive: ZipArchive<File>,
}

impl NpzReader {
    pub fn open(path: &Utf8Path) -> Result<Self, NpzError> {
        let file = File::open(path.as_std_path())?;
        Ok(Self {
            archive: ZipArchive::new(file)?,
        })
    }

    pub fn read_f64(&mut self, name: &str) -> Result<(Vec<u64>, Vec<f64>), NpzError> {
        self.read_block(name)
    }

    pub fn read_i64(&mut self, name: &str) -> Result<(Vec<u64>, Vec<i64>), NpzError> {
        self.read_block(name)
    }

    fn read_block<T: npyz::Deserialize>(
        &mut self,
        name: &str,
    ) -> Result<(Vec<u64>, Vec<T>), NpzError> {
        let entry_name = format!("{name}.npy");
        let mut entry = match self.archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(NpzError::MissingBlock(name.to_string())),
            Err(err) => return Err(err.into()),
        };
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;

        let npy = npyz::NpyFile::new(&buf[..])?;
        let shape = npy.shape().to_vec();
        let data = npy.into_vec::<T>()?;
        Ok((shape, data))
    }
}

/// Checks a block's shape against an expected rank and trailing dimensions.
/// The leading dimension is free; `trailing` pins everything after it.
pub fn expect_shape(name: &str, shape: &[u64], trailing: &[u64]) -> Result<u64, NpzError> {
    let rank_ok = shape.len() == trailing.len() + 1;
    let trailing_ok = rank_ok && shape[1..] == *trailing;
    if !trailing_ok {
        return Err(NpzError::BlockShape {
            name: name.to_string(),
            shape: shape.to_vec(),
            expected: format!("(_, {trailing:?})"),
        });
    }
    Ok(shape[0])
}
