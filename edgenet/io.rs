//! Reading and writing headerless, tab-separated numeric matrices.

use crate::data::DataError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::path::Path;

/// Reads a headerless TSV of numbers into a matrix, one file row per matrix row.
/// Blank lines are skipped; every row must have as many columns as the first.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>, DataError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut values = Vec::new();
    let mut ncols = None;
    let mut nrows = 0;

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = line + 1;
        let expected = *ncols.get_or_insert(record.len());
        if record.len() != expected {
            return Err(DataError::RaggedRow {
                path: display,
                line,
                expected,
                found: record.len(),
            });
        }
        for (column, field) in record.iter().enumerate() {
            let value: f64 = field.parse().map_err(|_| DataError::ParseError {
                path: display.clone(),
                line,
                column: column + 1,
                value: field.to_string(),
            })?;
            if !value.is_finite() {
                return Err(DataError::NonFiniteValue {
                    path: display,
                    line,
                    column: column + 1,
                });
            }
            values.push(value);
        }
        nrows += 1;
    }

    let ncols = ncols.ok_or_else(|| DataError::EmptyFile(display.clone()))?;
    log::debug!("Read {nrows}x{ncols} matrix from {display}");
    Array2::from_shape_vec((nrows, ncols), values).map_err(|_| DataError::EmptyFile(display))
}

/// Reads an affinity matrix if a path is given, otherwise returns the 1x1
/// placeholder that disables the graph penalty.
pub fn read_graph(path: Option<impl AsRef<Path>>) -> Result<Array2<f64>, DataError> {
    match path {
        Some(p) => read_matrix(p),
        None => Ok(Array2::zeros((1, 1))),
    }
}

pub fn write_matrix(path: impl AsRef<Path>, matrix: ArrayView2<f64>) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    for row in matrix.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a vector as a single tab-separated row.
pub fn write_vector(path: impl AsRef<Path>, values: ArrayView1<f64>) -> Result<(), DataError> {
    write_matrix(path, values.insert_axis(ndarray::Axis(0)))
}

/// Writes one integer per line.
pub fn write_indices(path: impl AsRef<Path>, values: &[usize]) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    for v in values {
        writer.write_record([v.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
