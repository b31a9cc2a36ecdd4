// ============================================================
// Layer 4 — CSV Loader
// ============================================================
// Reads one delimited file into a typed, column-oriented Table.
//
// The whole file is read into memory first, then every column
// is typed in a second pass:
//
//   every present cell parses as f64 → Numeric  (missing → NaN)
//   anything else                    → Text     (missing → None)
//
// A cell is missing when it is empty or one of the usual null
// spellings (`NA`, `N/A`, `null`, `None`, `#N/A`, `<NA>`, ...).
// Missing cells never force a column to text, so a numeric column
// with gaps stays numeric with NaN in the gaps. A column that is
// missing everywhere is numeric and entirely missing.
//
// Repeated header names are kept apart by suffixing the later
// ones: `a, a, b` loads as `a, a.1, b`.
//
// Dates are not detected here; the per-domain loaders convert
// the specific columns they know to be dates.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::table::{Column, Table};
use crate::domain::traits::TableSource;

/// Cells read as missing, on top of the empty cell
const NULL_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Loads a comma-separated file with a header row.
/// Implements the TableSource trait from Layer 3.
pub struct CsvLoader {
    path: PathBuf,
}

impl CsvLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TableSource for CsvLoader {
    fn load_table(&self) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open CSV file '{}'", self.path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Cannot read header of '{}'", self.path.display()))?
            .iter()
            .map(str::to_string)
            .collect();
        let headers = dedupe_headers(headers);

        // Read every record up front: files are assumed to fit in memory
        let mut records: Vec<StringRecord> = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("Malformed record {} in '{}'", line + 1, self.path.display())
            })?;
            records.push(record);
        }

        let mut table = Table::new();
        for (col, name) in headers.iter().enumerate() {
            let cells: Vec<&str> = records.iter().map(|r| r.get(col).unwrap_or("")).collect();
            table.insert(name.clone(), infer_column(&cells))?;
        }

        let missing: usize = table.iter().map(|(_, col)| col.missing_count()).sum();
        tracing::info!(
            "Loaded '{}': {} rows x {} columns, {} missing cells",
            self.path.display(),
            table.n_rows(),
            table.n_cols(),
            missing
        );
        Ok(table)
    }
}

/// Rename repeated headers to `name.1`, `name.2`, ... A suffixed
/// name that is itself taken is suffixed again.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|original| {
            let mut name  = original.clone();
            let mut count = seen.get(&name).copied().unwrap_or(0);
            while count > 0 {
                seen.insert(name.clone(), count + 1);
                name  = format!("{name}.{count}");
                count = seen.get(&name).copied().unwrap_or(0);
            }
            if name != original {
                tracing::warn!("Duplicate column '{}' renamed to '{}'", original, name);
            }
            seen.insert(name.clone(), 1);
            name
        })
        .collect()
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || NULL_TOKENS.contains(&cell)
}

/// Type one column of raw cells.
fn infer_column(cells: &[&str]) -> Column {
    let parsed: Vec<Option<f64>> = cells.iter().map(|c| parse_number(c)).collect();

    let numeric = cells
        .iter()
        .zip(parsed.iter())
        .all(|(cell, value)| is_missing(cell) || value.is_some());

    if numeric {
        Column::Numeric(parsed.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else {
        Column::Text(
            cells
                .iter()
                .map(|c| if is_missing(c) { None } else { Some(c.to_string()) })
                .collect(),
        )
    }
}

/// Parse a numeric cell. Missing cells are `None`, and so is
/// anything that is not a number. Accepts `inf` spellings.
fn parse_number(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        return None;
    }
    cell.parse::<f64>().ok()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_infers_numeric_and_text() {
        let f = write_csv("Mileage,Fuel_Type\n1000,Diesel\n2500.5,Petrol\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.column("Mileage").unwrap().as_numeric().unwrap(), &[1000.0, 2500.5]);
        assert_eq!(t.column("Fuel_Type").unwrap().kind(), "text");
    }

    #[test]
    fn test_empty_cells_stay_numeric() {
        let f = write_csv("a,b\n1,\n,x\n3,y\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();
        let a = t.column("a").unwrap().as_numeric().unwrap();
        assert_eq!(a[0], 1.0);
        assert!(a[1].is_nan());
        assert_eq!(t.column("b").unwrap(), &Column::Text(vec![None, Some("x".into()), Some("y".into())]));
    }

    #[test]
    fn test_keeps_header_order() {
        let f = write_csv("z,a,m\n1,2,3\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();
        assert_eq!(t.column_names(), &["z", "a", "m"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = CsvLoader::new("/definitely/not/here.csv").load_table().unwrap_err();
        assert!(err.to_string().contains("Cannot open CSV file"));
    }

    #[test]
    fn test_ragged_record_is_an_error() {
        let f = write_csv("a,b\n1,2\n3\n");
        assert!(CsvLoader::new(f.path()).load_table().is_err());
    }

    #[test]
    fn test_null_spellings_are_missing() {
        let f = write_csv("Mileage,Fuel_Type,Need_Maintenance\n100,Diesel,0\nNA,N/A,1\n300,null,0\n#N/A,<NA>,1\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();

        let mileage = t.column("Mileage").unwrap();
        assert!(mileage.as_numeric().is_some());
        assert_eq!(mileage.missing_count(), 2);
        assert_eq!(t.column("Fuel_Type").unwrap(), &Column::Text(vec![Some("Diesel".into()), None, None, None]));
    }

    #[test]
    fn test_other_words_still_make_text() {
        let f = write_csv("a\n1\nn.a.\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();
        assert_eq!(t.column("a").unwrap().kind(), "text");
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let f = write_csv("a,a,b,a\n1,2,3,4\n");
        let t = CsvLoader::new(f.path()).load_table().unwrap();
        assert_eq!(t.column_names(), &["a", "a.1", "b", "a.2"]);
        assert_eq!(t.column("a").unwrap().as_numeric().unwrap(), &[1.0]);
        assert_eq!(t.column("a.1").unwrap().as_numeric().unwrap(), &[2.0]);
        assert_eq!(t.column("a.2").unwrap().as_numeric().unwrap(), &[4.0]);
    }

    #[test]
    fn test_dedupe_suffixes_taken_names_again() {
        let names = dedupe_headers(vec!["a".into(), "a.1".into(), "a".into()]);
        assert_eq!(names, vec!["a", "a.1", "a.1.1"]);
    }
}
