// ============================================================
// Layer 4 — Domain Loaders
// ============================================================
// One loader per fleet dataset. Each reads the CSV, derives its
// computed columns, and then treats the dataset's categorical
// columns according to an Encoding:
//
//   Keep           leave them as read
//   Fit            fit fresh encoders (training)
//   Apply(&set)    use encoders fitted earlier (scoring)
//
//   maintenance  Last_Service_Date     → Days_Since_Service
//                Warranty_Expiry_Date  → Days_Until_Expiry
//                encoding, then median imputation
//   co2          encoding
//   logistics    Actual_Load / Load_Capacity → Load_Utilization
//                encoding
//   telematics   timestamp parsed as a date, nothing else
//
// Fit and Apply run at the same step, so a gap in a categorical
// column is encoded as "nan" both when training and when scoring,
// never imputed first.
//
// Only the maintenance loader imputes missing values; the other
// loaders hand missing values on as NaN.
//
// Reference: Rust Book §9 (Error Handling with ?)

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::Path;

use crate::data::loader::CsvLoader;
use crate::data::preprocessor::{self, DayDelta, Preprocessor};
use crate::domain::encoding::EncoderSet;
use crate::domain::fleet::Domain;
use crate::domain::table::Table;
use crate::domain::traits::TableSource;

/// What a loader does with the dataset's categorical columns
#[derive(Debug, Clone, Copy)]
pub enum Encoding<'a> {
    Keep,
    Fit,
    Apply(&'a EncoderSet),
}

impl Encoding<'_> {
    /// Returns the encoders now in effect: the fitted ones, a copy
    /// of the applied ones, or an empty set for `Keep`.
    fn run(self, table: &mut Table, domain: Domain) -> Result<EncoderSet> {
        match self {
            Encoding::Keep => Ok(EncoderSet::new()),
            Encoding::Fit  => preprocessor::encode_columns(table, domain.categorical_columns()),
            Encoding::Apply(encoders) => {
                preprocessor::apply_encoders(table, encoders)?;
                Ok(encoders.clone())
            }
        }
    }
}

/// Load any trainable domain's dataset.
/// Telematics has no encoders and is returned with an empty set.
pub fn load_domain(
    domain:    Domain,
    path:      &Path,
    encoding:  Encoding<'_>,
    reference: NaiveDateTime,
) -> Result<(Table, EncoderSet)> {
    match domain {
        Domain::Maintenance => load_maintenance(path, encoding, reference),
        Domain::Co2         => load_co2(path, encoding),
        Domain::Logistics   => load_logistics(path, encoding),
        Domain::Telematics  => Ok((load_telematics(path, reference)?, EncoderSet::new())),
    }
}

/// Vehicle maintenance records.
pub fn load_maintenance(
    path:      &Path,
    encoding:  Encoding<'_>,
    reference: NaiveDateTime,
) -> Result<(Table, EncoderSet)> {
    let mut table = CsvLoader::new(path).load_table()?;
    let prep      = Preprocessor::new(reference);

    prep.derive_day_delta(&mut table, "Last_Service_Date", "Days_Since_Service", DayDelta::Since)?;
    prep.derive_day_delta(&mut table, "Warranty_Expiry_Date", "Days_Until_Expiry", DayDelta::Until)?;

    let encoders = encoding.run(&mut table, Domain::Maintenance)?;
    preprocessor::impute_median(&mut table);
    Ok((table, encoders))
}

/// CO2 emissions per vehicle model.
pub fn load_co2(path: &Path, encoding: Encoding<'_>) -> Result<(Table, EncoderSet)> {
    let mut table = CsvLoader::new(path).load_table()?;
    let encoders  = encoding.run(&mut table, Domain::Co2)?;
    Ok((table, encoders))
}

/// Delivery logistics with a maintenance flag.
pub fn load_logistics(path: &Path, encoding: Encoding<'_>) -> Result<(Table, EncoderSet)> {
    let mut table = CsvLoader::new(path).load_table()?;

    preprocessor::derive_ratio(&mut table, "Actual_Load", "Load_Capacity", "Load_Utilization")?;

    let encoders = encoding.run(&mut table, Domain::Logistics)?;
    Ok((table, encoders))
}

/// Raw telematics stream, for profiling only.
/// `timestamp` becomes a date column; nothing is derived from it.
pub fn load_telematics(path: &Path, reference: NaiveDateTime) -> Result<Table> {
    let mut table = CsvLoader::new(path).load_table()?;
    Preprocessor::new(reference).parse_dates(&mut table, "timestamp")?;
    Ok(table)
}
