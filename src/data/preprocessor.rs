// ============================================================
// Layer 4 — Table Preprocessor
// ============================================================
// Column-level transformations shared by the domain loaders:
//
//   parse_dates        text column → Date column (bad values → missing)
//   derive_day_delta   Date column → whole-day distance to a reference
//   derive_ratio       numerator / denominator → new numeric column
//   encode_columns     categorical columns → integer codes
//   apply_encoders     same, with already fitted encoders
//   impute_median      NaN → column median, per numeric column
//
// All time arithmetic is relative to an explicit reference
// timestamp passed in by the caller; nothing here reads the
// clock.
//
// Reference: chrono crate documentation
//            Rust Book §13 (Iterators)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::domain::encoding::{EncoderSet, LabelEncoder};
use crate::domain::table::{Column, Table};

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

const SECONDS_PER_DAY: i64 = 86_400;

/// Direction of a day delta relative to the reference time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayDelta {
    /// reference − date ("days since")
    Since,
    /// date − reference ("days until", negative once passed)
    Until,
}

pub struct Preprocessor {
    reference: NaiveDateTime,
}

impl Preprocessor {
    /// Create a preprocessor anchored at `reference`
    pub fn new(reference: NaiveDateTime) -> Self {
        Self { reference }
    }

    /// Convert `column` to a Date column in place, if present.
    /// Unparseable values become missing rather than failing.
    pub fn parse_dates(&self, table: &mut Table, column: &str) -> Result<()> {
        let Some(col) = table.column(column) else {
            return Ok(());
        };

        let dates: Vec<Option<NaiveDateTime>> = match col {
            Column::Date(_) => return Ok(()),
            Column::Text(cells) => cells
                .iter()
                .map(|c| c.as_deref().and_then(parse_datetime))
                .collect(),
            // A column of bare numbers is not a date column
            Column::Numeric(values) => vec![None; values.len()],
        };

        let unparsed = dates.iter().filter(|d| d.is_none()).count();
        if unparsed > 0 {
            tracing::debug!("{} values of '{}' are missing or not dates", unparsed, column);
        }
        table.insert(column, Column::Date(dates))
    }

    /// Replace the date column `source` with a numeric `target` column
    /// holding whole days between it and the reference time.
    /// Does nothing when `source` is absent.
    pub fn derive_day_delta(
        &self,
        table:     &mut Table,
        source:    &str,
        target:    &str,
        direction: DayDelta,
    ) -> Result<()> {
        if !table.has_column(source) {
            return Ok(());
        }
        self.parse_dates(table, source)?;

        let Some(Column::Date(dates)) = table.remove(source) else {
            bail!("'{}' could not be read as a date column", source);
        };

        let days: Vec<f64> = dates
            .iter()
            .map(|d| match d {
                Some(d) => {
                    let (from, to) = match direction {
                        DayDelta::Since => (*d, self.reference),
                        DayDelta::Until => (self.reference, *d),
                    };
                    floor_days(from, to) as f64
                }
                None => f64::NAN,
            })
            .collect();

        table
            .insert(target, Column::Numeric(days))
            .with_context(|| format!("Cannot derive '{}' from '{}'", target, source))
    }
}

/// Add `target = numerator / denominator` when both numeric columns exist.
///
/// Plain IEEE division: x/0 gives ±inf and 0/0 gives NaN; neither
/// is an error. Returns whether the column was derived.
pub fn derive_ratio(table: &mut Table, numerator: &str, denominator: &str, target: &str) -> Result<bool> {
    let (Some(num), Some(den)) = (
        table.column(numerator).and_then(Column::as_numeric),
        table.column(denominator).and_then(Column::as_numeric),
    ) else {
        return Ok(false);
    };

    let ratio: Vec<f64> = num.iter().zip(den.iter()).map(|(n, d)| n / d).collect();
    let non_finite = ratio.iter().filter(|r| !r.is_finite()).count();
    if non_finite > 0 {
        tracing::warn!("'{}' has {} non-finite values (zero {})", target, non_finite, denominator);
    }

    table.insert(target, Column::Numeric(ratio))?;
    Ok(true)
}

/// Fit one encoder per listed column that is present, in list order,
/// and replace each column with its integer codes.
pub fn encode_columns(table: &mut Table, columns: &[&str]) -> Result<EncoderSet> {
    let mut encoders = EncoderSet::new();
    for &name in columns {
        let Some(col) = table.column(name) else {
            continue;
        };
        let encoder = LabelEncoder::fit(name, col);
        let codes   = encoder.transform(col)?;
        tracing::debug!("Encoded '{}' into {} classes", name, encoder.classes().len());
        table.insert(name, codes)?;
        encoders.push(encoder);
    }
    Ok(encoders)
}

/// Encode columns with encoders fitted on another table.
/// Columns without an encoder, or encoders without a column, are skipped.
/// Fails on the first unseen label.
pub fn apply_encoders(table: &mut Table, encoders: &EncoderSet) -> Result<()> {
    for encoder in encoders.iter() {
        let Some(col) = table.column(encoder.column()) else {
            continue;
        };
        let codes = encoder.transform(col)?;
        table.insert(encoder.column(), codes)?;
    }
    Ok(())
}

/// Fill every missing value of every numeric column with that column's
/// median. A column with no observed value at all is filled with 0.0.
pub fn impute_median(table: &mut Table) {
    for (name, col) in table.iter_mut() {
        let Column::Numeric(values) = col else {
            continue;
        };
        if !values.iter().any(|v| v.is_nan()) {
            continue;
        }
        let fill = median(values).filter(|m| !m.is_nan()).unwrap_or(0.0);
        let mut filled = 0usize;
        for v in values.iter_mut().filter(|v| v.is_nan()) {
            *v = fill;
            filled += 1;
        }
        tracing::debug!("Imputed {} missing values of '{}' with {}", filled, name, fill);
    }
}

/// Median of the non-missing values (infinities included)
pub fn median(values: &[f64]) -> Option<f64> {
    let mut observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(f64::total_cmp);
    let mid = observed.len() / 2;
    if observed.len() % 2 == 1 {
        Some(observed[mid])
    } else {
        Some((observed[mid - 1] + observed[mid]) / 2.0)
    }
}

/// Parse a date or date-time string in any of the accepted formats.
/// Bare dates are taken at midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Whole days from `from` to `to`, rounded toward negative infinity
pub fn floor_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    fn text(values: &[Option<&str>]) -> Column {
        Column::Text(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2023-05-01").is_some());
        assert!(parse_datetime("2023-05-01 10:30:00").is_some());
        assert!(parse_datetime("2023-05-01T10:30:00Z").is_some());
        assert!(parse_datetime("05/01/2023").is_some());
        assert!(parse_datetime("not a date").is_none());
    }

    #[test]
    fn test_floor_days_rounds_down() {
        let a = at("2024-01-01 12:00:00");
        assert_eq!(floor_days(at("2024-01-01"), a), 0);
        // Twelve hours in the past is -1 whole day, not 0
        assert_eq!(floor_days(a, at("2024-01-01")), -1);
        assert_eq!(floor_days(at("2023-12-22"), at("2024-01-01")), 10);
    }

    #[test]
    fn test_days_since_replaces_date_column() {
        let mut t = Table::new();
        t.insert("Last_Service_Date", text(&[Some("2024-01-01"), Some("garbage"), None])).unwrap();
        let p = Preprocessor::new(at("2024-01-31"));
        p.derive_day_delta(&mut t, "Last_Service_Date", "Days_Since_Service", DayDelta::Since)
            .unwrap();

        assert!(!t.has_column("Last_Service_Date"));
        let days = t.column("Days_Since_Service").unwrap().as_numeric().unwrap();
        assert_eq!(days[0], 30.0);
        assert!(days[1].is_nan());
        assert!(days[2].is_nan());
    }

    #[test]
    fn test_days_until_can_be_negative() {
        let mut t = Table::new();
        t.insert("Warranty_Expiry_Date", text(&[Some("2024-01-21"), Some("2024-03-01")])).unwrap();
        let p = Preprocessor::new(at("2024-01-31"));
        p.derive_day_delta(&mut t, "Warranty_Expiry_Date", "Days_Until_Expiry", DayDelta::Until)
            .unwrap();
        assert_eq!(
            t.column("Days_Until_Expiry").unwrap().as_numeric().unwrap(),
            &[-10.0, 30.0]
        );
    }

    #[test]
    fn test_day_delta_absent_column_is_noop() {
        let mut t = Table::new();
        t.insert("x", Column::Numeric(vec![1.0])).unwrap();
        let p = Preprocessor::new(at("2024-01-31"));
        p.derive_day_delta(&mut t, "Last_Service_Date", "Days_Since_Service", DayDelta::Since)
            .unwrap();
        assert_eq!(t.column_names(), &["x"]);
    }

    #[test]
    fn test_ratio_division_by_zero_is_not_an_error() {
        let mut t = Table::new();
        t.insert("Actual_Load", Column::Numeric(vec![50.0, 0.0, 10.0])).unwrap();
        t.insert("Load_Capacity", Column::Numeric(vec![0.0, 0.0, 20.0])).unwrap();
        assert!(derive_ratio(&mut t, "Actual_Load", "Load_Capacity", "Load_Utilization").unwrap());

        let r = t.column("Load_Utilization").unwrap().as_numeric().unwrap();
        assert!(r[0].is_infinite());
        assert!(r[1].is_nan());
        assert_eq!(r[2], 0.5);
    }

    #[test]
    fn test_ratio_needs_both_columns() {
        let mut t = Table::new();
        t.insert("Actual_Load", Column::Numeric(vec![50.0])).unwrap();
        assert!(!derive_ratio(&mut t, "Actual_Load", "Load_Capacity", "Load_Utilization").unwrap());
        assert!(!t.has_column("Load_Utilization"));
    }

    #[test]
    fn test_encode_columns_follows_list_order() {
        let mut t = Table::new();
        t.insert("b", text(&[Some("y"), Some("x")])).unwrap();
        t.insert("a", text(&[Some("q"), Some("p")])).unwrap();
        let enc = encode_columns(&mut t, &["a", "missing", "b"]).unwrap();

        let order: Vec<&str> = enc.iter().map(|e| e.column()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(t.column("b").unwrap().as_numeric().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_apply_encoders_rejects_unseen_label() {
        let mut train = Table::new();
        train.insert("Fuel", text(&[Some("X"), Some("Z")])).unwrap();
        let enc = encode_columns(&mut train, &["Fuel"]).unwrap();

        let mut score = Table::new();
        score.insert("Fuel", text(&[Some("E")])).unwrap();
        let err = apply_encoders(&mut score, &enc).unwrap_err();
        assert!(err.downcast_ref::<crate::domain::encoding::UnseenLabel>().is_some());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, f64::NAN, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn test_impute_median_leaves_text_alone() {
        let mut t = Table::new();
        t.insert("n", Column::Numeric(vec![1.0, f64::NAN, 5.0])).unwrap();
        t.insert("s", text(&[None, Some("a"), None])).unwrap();
        impute_median(&mut t);
        assert_eq!(t.column("n").unwrap().as_numeric().unwrap(), &[1.0, 3.0, 5.0]);
        assert_eq!(t.column("s").unwrap().missing_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_impute_leaves_no_missing(
            cols in prop::collection::vec(
                prop::collection::vec(prop::option::of(-1e6f64..1e6), 12),
                1..5,
            )
        ) {
            let mut t = Table::new();
            for (i, c) in cols.iter().enumerate() {
                let values = c.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                t.insert(format!("c{i}"), Column::Numeric(values)).unwrap();
            }
            impute_median(&mut t);
            for (_, col) in t.iter() {
                prop_assert_eq!(col.missing_count(), 0);
            }
        }
    }
}
