// src/dump.rs

use crate::error::{Result, SvdPgmError};
use ndarray::{Array2, ArrayView2};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `matrix` as rows of space-separated values with six decimals, one row per line.
pub fn write_matrix_text<P: AsRef<Path>>(path: P, matrix: &ArrayView2<f64>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SvdPgmError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_rows(&mut writer, matrix).map_err(|e| SvdPgmError::io(path, e))
}

fn write_rows<W: Write>(writer: &mut W, matrix: &ArrayView2<f64>) -> std::io::Result<()> {
    for row in matrix.rows() {
        let line = row
            .iter()
            .map(|v| format!("{:.6}", v))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

/// Parses a file produced by [`write_matrix_text`].
///
/// Blank lines are ignored.
///
/// # Errors
/// Returns `MalformedText` for unparsable tokens, ragged rows, or an empty file.
pub fn read_matrix_text<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| SvdPgmError::io(path, e))?;

    let mut values = Vec::new();
    let mut n_cols: Option<usize> = None;
    let mut n_rows = 0usize;
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    SvdPgmError::MalformedText(format!("line {}: invalid number {:?}", line_no + 1, token))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        match n_cols {
            None => n_cols = Some(row.len()),
            Some(c) if c != row.len() => {
                return Err(SvdPgmError::MalformedText(format!(
                    "line {}: expected {} values, found {}",
                    line_no + 1,
                    c,
                    row.len()
                )))
            }
            Some(_) => {}
        }
        values.extend(row);
        n_rows += 1;
    }

    let n_cols = n_cols.ok_or_else(|| SvdPgmError::MalformedText("no rows found".to_string()))?;
    Array2::from_shape_vec((n_rows, n_cols), values).map_err(|e| SvdPgmError::MalformedText(e.to_string()))
}
