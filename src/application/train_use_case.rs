// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one domain's training pipeline in order:
//
//   Step 1: Check the dataset exists   (stop with ERROR: if not)
//   Step 2: Load + encode + derive     (Layer 4 - data)
//   Step 3: Split and scale            (Layer 4 - data)
//   Step 4: Fit the forest, evaluate   (Layer 5 - ml)
//   Step 5: Build the model graph      (Layer 6 - infra)
//   Step 6: Build the metadata file    (Layer 6 - infra)
//   Step 7: Write both atomically      (Layer 6 - infra)
//
// A missing dataset is not an error: the run prints an
// `ERROR: File <path> missing.` marker and returns normally,
// so `train all` carries on with the next domain.
//
// Reference: Rust Book §13 (Iterators and Closures)

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::datasets::{load_domain, Encoding};
use crate::data::splitter::prepare_splits;
use crate::domain::fleet::Domain;
use crate::domain::encoding::EncoderSet;
use crate::infra::{artifact_store::ArtifactStore, metadata::export_metadata, onnx};
use crate::ml::forest::ForestParams;
use crate::ml::trainer::{fit_and_evaluate, TrainOutcome};

// ─── Pipeline Configuration ──────────────────────────────────────────────────
// Everything a run depends on besides the data itself.
// The seed reaches both the splitter and the forest, so one
// value pins the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_dir:       PathBuf,
    pub model_dir:      PathBuf,
    pub seed:           u64,
    pub test_fraction:  f64,
    pub n_estimators:   usize,
    pub max_depth:      Option<usize>,
    /// Stands in for "now" in every date derivation
    pub reference_time: NaiveDateTime,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir:       PathBuf::from("data"),
            model_dir:      PathBuf::from("models"),
            seed:           42,
            test_fraction:  0.2,
            n_estimators:   100,
            max_depth:      None,
            reference_time: chrono::Local::now().naive_local(),
        }
    }
}

impl PipelineConfig {
    /// Default dataset location of a domain
    pub fn data_path(&self, domain: Domain) -> PathBuf {
        self.data_dir.join(domain.data_file())
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth:    self.max_depth,
            seed:         self.seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            bail!("Test fraction must be between 0 and 1, got {}", self.test_fraction);
        }
        if self.n_estimators == 0 {
            bail!("Number of trees must be at least 1");
        }
        Ok(())
    }
}

/// Files written by a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainArtifacts {
    pub model_path:    PathBuf,
    pub metadata_path: PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: PipelineConfig,
    input:  Option<PathBuf>,
}

impl TrainUseCase {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, input: None }
    }

    /// Read the dataset from `path` instead of the data directory
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train every trainable domain in turn
    pub fn execute_all(&self) -> Result<Vec<TrainArtifacts>> {
        let mut written = Vec::new();
        for domain in Domain::TRAINABLE {
            println!("\n=== {} ===", domain.title());
            if let Some(artifacts) = self.execute(domain)? {
                written.push(artifacts);
            }
        }
        Ok(written)
    }

    /// Run the full pipeline for one domain.
    /// Returns `None` when the dataset file does not exist.
    pub fn execute(&self, domain: Domain) -> Result<Option<TrainArtifacts>> {
        let cfg = &self.config;
        cfg.validate()?;
        let (Some(target), Some(task)) = (domain.target(), domain.task()) else {
            bail!("The {} dataset has no model to train", domain);
        };

        // ── Step 1: Dataset must exist ────────────────────────────────────────
        let path = self.input.clone().unwrap_or_else(|| cfg.data_path(domain));
        if !path.exists() {
            println!("ERROR: File {} missing.", path.display());
            return Ok(None);
        }

        // ── Step 2: Load, derive and encode ───────────────────────────────────
        tracing::info!("Loading {} data from '{}'", domain, path.display());
        let (table, encoders) = load_domain(domain, &path, Encoding::Fit, cfg.reference_time)
            .with_context(|| format!("Loading '{}'", path.display()))?;
        tracing::info!(
            "Loaded {} rows, {} columns, {} encoded",
            table.n_rows(),
            table.n_cols(),
            encoders.len()
        );

        // ── Step 3: Features, target, 80/20 split, scaling ────────────────────
        let splits = prepare_splits(&table, target, cfg)?;

        // ── Step 4: Fit and evaluate ──────────────────────────────────────────
        println!("Training {} model on {} rows...", domain.title(), splits.train_features.len());
        let outcome: TrainOutcome = fit_and_evaluate(task, &splits, cfg.forest_params())?;
        outcome.print_report();

        // ── Steps 5-7: Export graph and metadata together ─────────────────────
        let graph     = outcome.model.to_onnx(&splits.scaler, &splits.feature_names, domain.slug())?;
        let artifacts = self.write_artifacts(domain, &onnx::encode(&graph), &encoders, &splits.feature_names)?;

        println!("SUCCESS: {} model exported: {}", domain.title(), artifacts.model_path.display());
        println!("SUCCESS: Metadata exported to {}", artifacts.metadata_path.display());
        Ok(Some(artifacts))
    }

    fn write_artifacts(
        &self,
        domain:   Domain,
        model:    &[u8],
        encoders: &EncoderSet,
        features: &[String],
    ) -> Result<TrainArtifacts> {
        let store  = ArtifactStore::new(&self.config.model_dir);
        let staged = vec![
            store.stage(&domain.model_file(), model)?,
            export_metadata(encoders, features, &store.path(&domain.metadata_file()))?,
        ];
        let paths = store.commit(staged)?;
        tracing::info!("Wrote artifacts to '{}'", store.dir().display());
        Ok(TrainArtifacts {
            model_path:    paths[0].clone(),
            metadata_path: paths[1].clone(),
        })
    }
}

/// Model and metadata locations of a domain inside `model_dir`
pub fn artifact_paths(model_dir: &Path, domain: Domain) -> TrainArtifacts {
    TrainArtifacts {
        model_path:    model_dir.join(domain.model_file()),
        metadata_path: model_dir.join(domain.metadata_file()),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::Predictor;
    use crate::infra::metadata::load_metadata;
    use crate::ml::inferencer::Inferencer;
    use std::fs;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            data_dir:       dir.join("data"),
            model_dir:      dir.join("models"),
            n_estimators:   20,
            reference_time: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            ..PipelineConfig::default()
        }
    }

    fn write(dir: &Path, domain: Domain, body: &str) {
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("data").join(domain.data_file()), body).unwrap();
    }

    fn maintenance_csv(n: usize) -> String {
        let mut s = String::from("Vehicle_ID,Mileage,Reported_Issues,Vehicle_Age,Fuel_Type,Need_Maintenance\n");
        for i in 0..n {
            let issues = i % 5;
            let fuel = ["Petrol", "Diesel", "Electric"][i % 3];
            let need = usize::from(issues >= 3);
            s.push_str(&format!("{i},{},{issues},{},{fuel},{need}\n", 10_000 + i * 137, i % 9));
        }
        s
    }

    #[test]
    fn test_missing_file_prints_marker_and_returns() {
        let dir = tempfile::tempdir().unwrap();
        let out = TrainUseCase::new(config(dir.path())).execute(Domain::Maintenance).unwrap();
        assert!(out.is_none());
        assert!(!dir.path().join("models").exists());
    }

    #[test]
    fn test_maintenance_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), Domain::Maintenance, &maintenance_csv(100));

        let artifacts = TrainUseCase::new(config(dir.path()))
            .execute(Domain::Maintenance)
            .unwrap()
            .unwrap();
        assert!(artifacts.model_path.exists());
        assert_eq!(artifacts, artifact_paths(&dir.path().join("models"), Domain::Maintenance));

        let meta = load_metadata(&artifacts.metadata_path).unwrap();
        assert_eq!(meta.features, vec!["Mileage", "Reported_Issues", "Vehicle_Age", "Fuel_Type"]);
        assert!(meta.encoders().get("Fuel_Type").is_some());

        let model = Inferencer::from_file(&artifacts.model_path).unwrap();
        assert_eq!(model.n_features(), meta.features.len());
    }

    #[test]
    fn test_co2_single_fuel_type() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("Make,Engine Size(L),Cylinders,Fuel Type,CO2 Emissions(g/km)\n");
        for i in 0..50 {
            let engine = 1.0 + (i % 10) as f64 * 0.4;
            csv.push_str(&format!("M{},{engine:.1},{},X,{}\n", i % 4, 4 + (i % 3) * 2, 120.0 + engine * 40.0));
        }
        write(dir.path(), Domain::Co2, &csv);

        let artifacts = TrainUseCase::new(config(dir.path())).execute(Domain::Co2).unwrap().unwrap();
        let meta = load_metadata(&artifacts.metadata_path).unwrap();
        assert_eq!(meta.encoders().get("Fuel Type").unwrap().classes().len(), 1);
        assert!(!meta.features.contains(&"CO2 Emissions(g/km)".to_string()));
    }

    #[test]
    fn test_logistics_zero_capacity_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("Vehicle_ID,Actual_Load,Load_Capacity,Weather_Conditions,Maintenance_Required\n");
        for i in 0..40 {
            let capacity = if i == 0 { 0 } else { 100 };
            let weather = ["Clear", "Rain"][i % 2];
            csv.push_str(&format!("{i},50,{capacity},{weather},{}\n", i % 2));
        }
        write(dir.path(), Domain::Logistics, &csv);

        let artifacts = TrainUseCase::new(config(dir.path())).execute(Domain::Logistics).unwrap().unwrap();
        let meta = load_metadata(&artifacts.metadata_path).unwrap();
        assert!(meta.features.contains(&"Load_Utilization".to_string()));
    }

    #[test]
    fn test_execute_all_skips_missing_domains() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), Domain::Maintenance, &maintenance_csv(30));
        let written = TrainUseCase::new(config(dir.path())).execute_all().unwrap();
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn test_same_seed_same_model_bytes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), Domain::Maintenance, &maintenance_csv(60));
        let use_case = TrainUseCase::new(config(dir.path()));

        let a = use_case.execute(Domain::Maintenance).unwrap().unwrap();
        let first = fs::read(&a.model_path).unwrap();
        let b = use_case.execute(Domain::Maintenance).unwrap().unwrap();
        assert_eq!(first, fs::read(&b.model_path).unwrap());
    }

    #[test]
    fn test_telematics_cannot_be_trained() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TrainUseCase::new(config(dir.path())).execute(Domain::Telematics).is_err());
    }

    #[test]
    fn test_invalid_test_fraction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig { test_fraction: 1.5, ..config(dir.path()) };
        assert!(cfg.validate().is_err());
    }
}
