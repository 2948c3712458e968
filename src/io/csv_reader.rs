//! Re-parse surface CSV files written by [`CsvSurfaceWriter`](super::csv::CsvSurfaceWriter).

use crate::data::field_catalog::FieldCatalog;
use crate::data::local_buffer::LocalPointRecord;
use crate::io::csv::ID_COLUMN;
use crate::output_error::OutputError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Contents of a surface CSV file, rows in file order.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceCsv {
    pub catalog: FieldCatalog,
    pub rows: Vec<LocalPointRecord>,
}

impl SurfaceCsv {
    /// Row for `global_id`, if present.
    pub fn find(&self, global_id: u64) -> Option<&LocalPointRecord> {
        self.rows.iter().find(|r| r.global_id == global_id)
    }
}

fn parse_err(line: usize, reason: impl Into<String>) -> OutputError {
    OutputError::CsvParse {
        line,
        reason: reason.into(),
    }
}

/// Split a header line of double-quoted names (`""` escapes a quote).
fn split_quoted(line: &str, lineno: usize) -> Result<Vec<String>, OutputError> {
    let mut names = Vec::new();
    let mut chars = line.trim_end().chars().peekable();
    loop {
        if chars.next() != Some('"') {
            return Err(parse_err(lineno, "expected opening quote in header"));
        }
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('"') if chars.peek() == Some(&'"') => {
                    chars.next();
                    name.push('"');
                }
                Some('"') => break,
                Some(c) => name.push(c),
                None => return Err(parse_err(lineno, "unterminated quoted name")),
            }
        }
        names.push(name);
        match chars.next() {
            Some(',') => continue,
            None => return Ok(names),
            Some(c) => return Err(parse_err(lineno, format!("unexpected '{c}' after name"))),
        }
    }
}

/// Parse surface CSV text.
pub fn parse_surface_csv<R: BufRead>(reader: R) -> Result<SurfaceCsv, OutputError> {
    let mut lines = reader.lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => line.map_err(|e| parse_err(1, e.to_string()))?,
        None => return Err(parse_err(1, "missing header")),
    };
    let mut names = split_quoted(&header, 1)?;
    if names.first().map(String::as_str) != Some(ID_COLUMN) {
        return Err(parse_err(1, format!("first column must be \"{ID_COLUMN}\"")));
    }
    names.remove(0);
    let catalog = FieldCatalog::new(names).map_err(|e| parse_err(1, e.to_string()))?;

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let lineno = idx + 1;
        let line = line.map_err(|e| parse_err(lineno, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = line.split(',').map(str::trim);
        let global_id = cells
            .next()
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|e| parse_err(lineno, format!("bad point id: {e}")))?;
        let values = cells
            .map(|c| {
                c.parse::<f64>()
                    .map_err(|e| parse_err(lineno, format!("bad value {c:?}: {e}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if values.len() != catalog.len() {
            return Err(parse_err(
                lineno,
                format!("{} values, header names {}", values.len(), catalog.len()),
            ));
        }
        rows.push(LocalPointRecord { global_id, values });
    }
    Ok(SurfaceCsv { catalog, rows })
}

/// Read and parse the surface CSV at `path`.
pub fn read_surface_csv(path: impl AsRef<Path>) -> Result<SurfaceCsv, OutputError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| OutputError::io(path, e))?;
    parse_surface_csv(BufReader::new(file))
}
