use crate::error::{SimError, SimResult};
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn reader(path: &Path) -> SimResult<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Parses every field of a record, or `None` if any field is not a number.
fn numeric(rec: &csv::StringRecord) -> Option<Vec<f64>> {
    rec.iter()
        .filter(|f| !f.is_empty())
        .map(|f| f.parse::<f64>().ok())
        .collect()
}

/// Loads a square migration matrix, one island per row.
///
/// A leading non-numeric row is treated as a header and skipped.
pub fn load_matrix<P: AsRef<Path>>(path: P) -> SimResult<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let mut rows = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let rec = result?;
        match numeric(&rec) {
            Some(row) if !row.is_empty() => rows.push(row),
            Some(_) => continue,
            None if idx == 0 => continue,
            None => {
                return Err(SimError::config(
                    "matrix",
                    format!("row {} of {} is not numeric", idx + 1, path.display()),
                ))
            }
        }
    }

    debug!("Loaded {} migration matrix rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Loads `x,y` island coordinates, one island per row.
pub fn load_coordinates<P: AsRef<Path>>(path: P) -> SimResult<Vec<(f64, f64)>> {
    let path = path.as_ref();
    let mut rdr = reader(path)?;
    let mut coords = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let rec = result?;
        match numeric(&rec).as_deref() {
            Some([x, y, ..]) => coords.push((*x, *y)),
            Some([]) => continue,
            None if idx == 0 => continue,
            _ => {
                return Err(SimError::config(
                    "coords",
                    format!(
                        "row {} of {} needs two numeric columns",
                        idx + 1,
                        path.display()
                    ),
                ))
            }
        }
    }

    debug!("Loaded {} island coordinates from {}", coords.len(), path.display());
    Ok(coords)
}
