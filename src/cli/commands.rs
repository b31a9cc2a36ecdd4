// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `score` and `profile`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, dates, enums)
//
// Reference: Rust Book §12 (Building a CLI Program)

use chrono::NaiveDateTime;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::PipelineConfig;
use crate::data::preprocessor::parse_datetime;
use crate::domain::fleet::Domain;

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and export it with its metadata
    Train(TrainArgs),

    /// Predict a new CSV file with an exported model
    Score(ScoreArgs),

    /// Summarise the columns of a dataset
    Profile(ProfileArgs),
}

/// What `train` should build
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainTarget {
    Maintenance,
    Co2,
    Logistics,
    /// Every trainable dataset, one after another
    All,
}

impl TrainTarget {
    /// The single domain, `None` for `all`
    pub fn domain(self) -> Option<Domain> {
        match self {
            TrainTarget::Maintenance => Some(Domain::Maintenance),
            TrainTarget::Co2         => Some(Domain::Co2),
            TrainTarget::Logistics   => Some(Domain::Logistics),
            TrainTarget::All         => None,
        }
    }
}

/// Accepts the same date formats as the datasets
fn parse_reference_date(text: &str) -> Result<NaiveDateTime, String> {
    parse_datetime(text).ok_or_else(|| format!("'{text}' is not a date (try 2024-06-01)"))
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset to train on
    #[arg(value_enum)]
    pub target: TrainTarget,

    /// Read the dataset from this file instead of --data-dir
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Directory holding the default dataset files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory the model and metadata files are written to
    #[arg(long, default_value = "models")]
    pub model_dir: PathBuf,

    /// Seeds both the train/test split and the forest
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Share of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Number of trees in the forest
    #[arg(long, default_value_t = 100)]
    pub n_estimators: usize,

    /// Maximum tree depth, unlimited when omitted
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Date that stands in for "today" in day-count features.
    /// Defaults to the current local time.
    #[arg(long, value_parser = parse_reference_date)]
    pub reference_date: Option<NaiveDateTime>,
}

/// Layer 1 → Layer 2: the use cases only ever see PipelineConfig.
impl From<&TrainArgs> for PipelineConfig {
    fn from(a: &TrainArgs) -> Self {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            data_dir:       a.data_dir.clone(),
            model_dir:      a.model_dir.clone(),
            seed:           a.seed,
            test_fraction:  a.test_fraction,
            n_estimators:   a.n_estimators,
            max_depth:      a.max_depth,
            reference_time: a.reference_date.unwrap_or(defaults.reference_time),
        }
    }
}

/// All arguments for the `score` command
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Dataset kind whose model to use
    #[arg(value_enum)]
    pub domain: Domain,

    /// CSV file with the rows to predict
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the predictions
    #[arg(long)]
    pub output: PathBuf,

    /// Directory the model and metadata files were written to
    #[arg(long, default_value = "models")]
    pub model_dir: PathBuf,

    /// Must match the date used at training time for day counts
    #[arg(long, value_parser = parse_reference_date)]
    pub reference_date: Option<NaiveDateTime>,
}

impl From<&ScoreArgs> for PipelineConfig {
    fn from(a: &ScoreArgs) -> Self {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            model_dir:      a.model_dir.clone(),
            reference_time: a.reference_date.unwrap_or(defaults.reference_time),
            ..defaults
        }
    }
}

/// All arguments for the `profile` command
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Dataset to profile
    #[arg(value_enum)]
    pub domain: Domain,

    /// Read the dataset from this file instead of --data-dir
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Directory holding the default dataset files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Numeric columns to correlate, comma separated
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    #[arg(long, value_parser = parse_reference_date)]
    pub reference_date: Option<NaiveDateTime>,
}

impl From<&ProfileArgs> for PipelineConfig {
    fn from(a: &ProfileArgs) -> Self {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            data_dir:       a.data_dir.clone(),
            reference_time: a.reference_date.unwrap_or(defaults.reference_time),
            ..defaults
        }
    }
}
