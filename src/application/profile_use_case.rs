// ============================================================
// Layer 2 — ProfileUseCase
// ============================================================
// Console summary of any dataset, telematics included:
//
//   numeric  count, missing, mean, std, min, median, max
//   text     count, missing, distinct, most frequent
//   date     count, missing, min, max
//
// and, for a chosen list of numeric columns, the Pearson
// correlation matrix. Each pair uses only the rows where both
// values are finite; a pair with no spread gives NaN.
//
// Datasets are loaded with their domain loader and no encoding,
// so derived columns (Days_Since_Service, Load_Utilization, ..)
// are profiled too.
//
// Reference: Rust Book §8 (Hash Maps), §13 (Iterators)

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::application::train_use_case::PipelineConfig;
use crate::data::datasets::{load_domain, Encoding};
use crate::data::preprocessor::median;
use crate::domain::fleet::Domain;
use crate::domain::table::{Column, Table};

/// Summary statistics of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSummary {
    Numeric {
        name:    String,
        count:   usize,
        missing: usize,
        mean:    f64,
        std:     f64,
        min:     f64,
        median:  f64,
        max:     f64,
    },
    Text {
        name:     String,
        count:    usize,
        missing:  usize,
        distinct: usize,
        top:      Option<(String, usize)>,
    },
    Date {
        name:    String,
        count:   usize,
        missing: usize,
        min:     Option<NaiveDateTime>,
        max:     Option<NaiveDateTime>,
    },
}

impl ColumnSummary {
    pub fn of(name: &str, column: &Column) -> Self {
        let name = name.to_string();
        match column {
            Column::Numeric(values) => {
                let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
                let count = observed.len();
                let (mean, std) = mean_std(&observed);
                ColumnSummary::Numeric {
                    name,
                    count,
                    missing: values.len() - count,
                    mean,
                    std,
                    min:    observed.iter().copied().fold(f64::NAN, f64::min),
                    max:    observed.iter().copied().fold(f64::NAN, f64::max),
                    median: median(values).unwrap_or(f64::NAN),
                }
            }
            Column::Text(cells) => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for cell in cells.iter().flatten() {
                    *counts.entry(cell.as_str()).or_default() += 1;
                }
                // Highest count first, then alphabetical, so ties are stable
                let top = counts
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(label, n)| (label.to_string(), *n));
                let count = counts.values().sum();
                ColumnSummary::Text {
                    name,
                    count,
                    missing: cells.len() - count,
                    distinct: counts.len(),
                    top,
                }
            }
            Column::Date(dates) => {
                let observed: Vec<NaiveDateTime> = dates.iter().flatten().copied().collect();
                ColumnSummary::Date {
                    name,
                    count:   observed.len(),
                    missing: dates.len() - observed.len(),
                    min:     observed.iter().min().copied(),
                    max:     observed.iter().max().copied(),
                }
            }
        }
    }
}

impl fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSummary::Numeric { name, count, missing, mean, std, min, median, max } => write!(
                f,
                "{name} [numeric] count={count} missing={missing} mean={mean:.4} std={std:.4} \
                 min={min:.4} median={median:.4} max={max:.4}"
            ),
            ColumnSummary::Text { name, count, missing, distinct, top } => {
                write!(f, "{name} [text] count={count} missing={missing} distinct={distinct}")?;
                if let Some((label, n)) = top {
                    write!(f, " top='{label}' ({n})")?;
                }
                Ok(())
            }
            ColumnSummary::Date { name, count, missing, min, max } => {
                write!(f, "{name} [date] count={count} missing={missing}")?;
                if let (Some(min), Some(max)) = (min, max) {
                    write!(f, " min={min} max={max}")?;
                }
                Ok(())
            }
        }
    }
}

/// Population mean and standard deviation, NaN when empty
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub fn summarize(table: &Table) -> Vec<ColumnSummary> {
    table.iter().map(|(name, col)| ColumnSummary::of(name, col)).collect()
}

/// Pearson correlation over the rows where both values are finite
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx.sqrt() * syy.sqrt())
}

/// Correlation matrix of the listed columns that exist and are numeric
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values:  Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn of(table: &Table, columns: &[String]) -> Self {
        let selected: Vec<(&String, &[f64])> = columns
            .iter()
            .filter_map(|name| table.column(name).and_then(Column::as_numeric).map(|v| (name, v)))
            .collect();
        let values = selected
            .iter()
            .map(|(_, a)| selected.iter().map(|(_, b)| pearson(a, b)).collect())
            .collect();
        Self {
            columns: selected.into_iter().map(|(n, _)| n.clone()).collect(),
            values,
        }
    }
}

impl fmt::Display for CorrelationMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.columns.iter().map(String::len).max().unwrap_or(0).max(7);
        write!(f, "{:width$}", "")?;
        for name in &self.columns {
            write!(f, " {name:>width$}")?;
        }
        writeln!(f)?;
        for (name, row) in self.columns.iter().zip(&self.values) {
            write!(f, "{name:width$}")?;
            for v in row {
                write!(f, " {v:>width$.3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// What one profile run produced
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub n_rows:      usize,
    pub summaries:   Vec<ColumnSummary>,
    pub correlation: Option<CorrelationMatrix>,
}

pub struct ProfileUseCase {
    config: PipelineConfig,
}

impl ProfileUseCase {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Profile a dataset and print the result.
    /// Returns `None` when the dataset file does not exist.
    pub fn execute(&self, domain: Domain, input: Option<PathBuf>, columns: &[String]) -> Result<Option<Profile>> {
        let path = input.unwrap_or_else(|| self.config.data_path(domain));
        if !path.exists() {
            println!("ERROR: File {} missing.", path.display());
            return Ok(None);
        }

        let (table, _) = load_domain(domain, &path, Encoding::Keep, self.config.reference_time)
            .with_context(|| format!("Loading '{}'", path.display()))?;
        if table.n_cols() == 0 {
            bail!("'{}' has no columns", path.display());
        }

        let profile = Profile {
            n_rows:      table.n_rows(),
            summaries:   summarize(&table),
            correlation: (!columns.is_empty()).then(|| CorrelationMatrix::of(&table, columns)),
        };

        println!("{} dataset: {} rows, {} columns", domain.title(), profile.n_rows, table.n_cols());
        for summary in &profile.summaries {
            println!("  {summary}");
        }
        if let Some(corr) = &profile.correlation {
            if corr.columns.len() < columns.len() {
                tracing::warn!(
                    "{} requested columns are missing or not numeric",
                    columns.len() - corr.columns.len()
                );
            }
            println!("\nCorrelation matrix:");
            print!("{corr}");
        }
        Ok(Some(profile))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_numeric_summary() {
        let s = ColumnSummary::of("x", &Column::Numeric(vec![1.0, f64::NAN, 3.0, 2.0]));
        let ColumnSummary::Numeric { count, missing, mean, min, median, max, .. } = s else {
            panic!("expected numeric summary");
        };
        assert_eq!((count, missing), (3, 1));
        assert_eq!((mean, min, median, max), (2.0, 1.0, 2.0, 3.0));
    }

    #[test]
    fn test_text_summary_top_label() {
        let col = Column::Text(vec![Some("b".into()), Some("a".into()), Some("b".into()), None]);
        let s = ColumnSummary::of("t", &col);
        assert_eq!(
            s,
            ColumnSummary::Text {
                name:     "t".into(),
                count:    3,
                missing:  1,
                distinct: 2,
                top:      Some(("b".into(), 2)),
            }
        );
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_nan());
    }

    #[test]
    fn test_pearson_skips_non_finite_pairs() {
        let r = pearson(&[1.0, 2.0, f64::NAN, 3.0], &[1.0, 2.0, 100.0, f64::INFINITY]);
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_profile_telematics_with_correlation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telematics.csv");
        fs::write(
            &path,
            "deviceId,timestamp,speed,rpm\n1,2024-01-01 10:00:00,10,1000\n1,2024-01-01 10:01:00,20,2000\n2,,30,3100\n",
        )
        .unwrap();

        let profile = ProfileUseCase::new(PipelineConfig::default())
            .execute(Domain::Telematics, Some(path), &["speed".into(), "rpm".into(), "nope".into()])
            .unwrap()
            .unwrap();
        assert_eq!(profile.n_rows, 3);
        assert!(matches!(profile.summaries[1], ColumnSummary::Date { missing: 1, .. }));

        let corr = profile.correlation.unwrap();
        assert_eq!(corr.columns, vec!["speed", "rpm"]);
        assert!(corr.values[0][1] > 0.99);
    }

    #[test]
    fn test_profile_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = ProfileUseCase::new(PipelineConfig::default())
            .execute(Domain::Co2, Some(dir.path().join("none.csv")), &[])
            .unwrap();
        assert!(out.is_none());
    }
}
