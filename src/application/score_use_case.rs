// ============================================================
// Layer 2 — ScoreUseCase
// ============================================================
// Applies an exported model to a new CSV file:
//
//   1. Load the model graph and its metadata sidecar
//   2. Load the CSV with the domain loader, encoding its
//      categorical columns with the stored mappings at the
//      step where training fitted them
//   3. Assemble feature rows in the stored feature order
//   4. Run the graph and write one output row per input row
//
// Output columns:
//   row, prediction                 (every model)
//   p_<class> for every class       (classifiers)
//
// A label the stored mappings never saw fails the run, naming
// the column and the label. So does a feature column missing
// from the input.
//
// Reference: Rust Book §9 (Error Handling)
//            csv crate documentation (Writer)

use anyhow::{bail, Context, Result};
use std::{fs, path::Path};

use crate::application::train_use_case::{artifact_paths, PipelineConfig};
use crate::data::datasets::{load_domain, Encoding};
use crate::domain::fleet::Domain;
use crate::domain::prediction::Prediction;
use crate::domain::table::{Column, Table};
use crate::domain::traits::Predictor;
use crate::infra::metadata::load_metadata;
use crate::ml::inferencer::Inferencer;

pub struct ScoreUseCase {
    config: PipelineConfig,
}

impl ScoreUseCase {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Score `input` with the domain's exported model into `output`.
    /// Returns the number of rows scored.
    pub fn execute(&self, domain: Domain, input: &Path, output: &Path) -> Result<usize> {
        if domain.target().is_none() {
            bail!("The {} dataset has no model to score with", domain);
        }
        let paths = artifact_paths(&self.config.model_dir, domain);
        let model = Inferencer::from_file(&paths.model_path)?;
        let meta  = load_metadata(&paths.metadata_path)?;
        if meta.features.len() != model.n_features() {
            bail!(
                "Metadata lists {} features but the model expects {}",
                meta.features.len(),
                model.n_features()
            );
        }

        let encoders   = meta.encoders();
        let (table, _) = load_domain(domain, input, Encoding::Apply(&encoders), self.config.reference_time)
            .with_context(|| format!("Loading '{}'", input.display()))?;

        let rows = feature_rows(&table, &meta.features)?;
        let prediction = model.predict(&rows)?;
        write_predictions(output, &prediction)?;

        tracing::info!("Scored {} rows from '{}'", rows.len(), input.display());
        println!(
            "SUCCESS: Scored {} rows with the {} model: {}",
            rows.len(),
            domain.title(),
            output.display()
        );
        Ok(rows.len())
    }
}

/// Row-major f32 features in `features` order
pub fn feature_rows(table: &Table, features: &[String]) -> Result<Vec<Vec<f32>>> {
    let columns = features
        .iter()
        .map(|name| match table.column(name) {
            Some(Column::Numeric(v)) => Ok(v.as_slice()),
            Some(other) => bail!("Feature column '{}' is {}, expected numbers", name, other.kind()),
            None => bail!("Feature column '{}' is missing from the input", name),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((0..table.n_rows())
        .map(|i| columns.iter().map(|c| c[i] as f32).collect())
        .collect())
}

fn write_predictions(output: &Path, prediction: &Prediction) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Cannot create '{}'", output.display()))?;

    let mut header = vec!["row".to_string(), "prediction".to_string()];
    if let Prediction::Classification { classes, .. } = prediction {
        header.extend((0..classes.len()).map(|k| format!("p_{}", classes.label(k))));
    }
    writer.write_record(&header)?;

    let values = prediction.display_values();
    for (i, value) in values.iter().enumerate() {
        let mut record = vec![i.to_string(), value.clone()];
        if let Prediction::Classification { probabilities, .. } = prediction {
            record.extend(probabilities[i].iter().map(|p| format!("{p:.6}")));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
