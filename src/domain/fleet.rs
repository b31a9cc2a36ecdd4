// ============================================================
// Layer 3 — Fleet Dataset Domains
// ============================================================
// The four datasets this tool knows about, and everything that
// is fixed per dataset: default file, target column, model
// kind, artifact names and the categorical columns to encode.
//
//   Domain       Target                 Task
//   maintenance  Need_Maintenance       classification
//   co2          CO2 Emissions(g/km)    regression
//   logistics    Maintenance_Required   classification
//   telematics   (none, profiling only)
//
// Reference: Rust Book §6 (Enums), §5 (Method Syntax)

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::prediction::Task;

/// Columns that identify a row and are never used as features
pub const IDENTIFIER_COLUMNS: [&str; 5] = ["Vehicle_ID", "deviceId", "timeMili", "id", "ID"];

pub const MAINTENANCE_CATEGORICAL: [&str; 9] = [
    "Vehicle_Model",
    "Maintenance_History",
    "Fuel_Type",
    "Transmission_Type",
    "Owner_Type",
    "Tire_Condition",
    "Brake_Condition",
    "Battery_Status",
    "Vehicle_Type",
];

pub const CO2_CATEGORICAL: [&str; 5] = ["Make", "Model", "Vehicle Class", "Transmission", "Fuel Type"];

pub const LOGISTICS_CATEGORICAL: [&str; 4] = [
    "Weather_Conditions",
    "Road_Conditions",
    "Vehicle_Type",
    "Maintenance_History",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Maintenance,
    Co2,
    Logistics,
    Telematics,
}

impl Domain {
    /// Domains that have a trainer, in the order `train all` runs them
    pub const TRAINABLE: [Domain; 3] = [Domain::Maintenance, Domain::Co2, Domain::Logistics];

    /// Default CSV file name under the data directory
    pub fn data_file(self) -> &'static str {
        match self {
            Domain::Maintenance => "vehicle_maintenance_data.csv",
            Domain::Co2         => "CO2 Emissions_Canada.csv",
            Domain::Logistics   => "logistics_dataset_with_maintenance_required.csv",
            Domain::Telematics  => "telematics_data.csv",
        }
    }

    /// Target column, `None` for datasets that are only profiled
    pub fn target(self) -> Option<&'static str> {
        match self {
            Domain::Maintenance => Some("Need_Maintenance"),
            Domain::Co2         => Some("CO2 Emissions(g/km)"),
            Domain::Logistics   => Some("Maintenance_Required"),
            Domain::Telematics  => None,
        }
    }

    pub fn task(self) -> Option<Task> {
        match self {
            Domain::Maintenance | Domain::Logistics => Some(Task::Classification),
            Domain::Co2 => Some(Task::Regression),
            Domain::Telematics => None,
        }
    }

    /// Columns label-encoded when loading with `encode = true`
    pub fn categorical_columns(self) -> &'static [&'static str] {
        match self {
            Domain::Maintenance => &MAINTENANCE_CATEGORICAL,
            Domain::Co2         => &CO2_CATEGORICAL,
            Domain::Logistics   => &LOGISTICS_CATEGORICAL,
            Domain::Telematics  => &[],
        }
    }

    pub fn model_file(self) -> String {
        format!("{}_model.onnx", self.slug())
    }

    pub fn metadata_file(self) -> String {
        format!("{}_metadata.json", self.slug())
    }

    pub fn slug(self) -> &'static str {
        match self {
            Domain::Maintenance => "maintenance",
            Domain::Co2         => "co2",
            Domain::Logistics   => "logistics",
            Domain::Telematics  => "telematics",
        }
    }

    /// Human readable name for console output
    pub fn title(self) -> &'static str {
        match self {
            Domain::Maintenance => "Maintenance",
            Domain::Co2         => "CO2",
            Domain::Logistics   => "Logistics",
            Domain::Telematics  => "Telematics",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
