// ============================================================
// Layer 6 — Model Metadata Sidecar
// ============================================================
// The JSON file written next to every exported model. It tells
// a consumer how to build an input row for the model:
//
//   {
//       "features": ["Mileage", "Reported_Issues", ...],
//       "mappings": {
//           "Fuel_Type": {"Diesel": 0, "Electric": 1, ...},
//           ...
//       }
//   }
//
//   features: the model's input order, exactly as fitted
//   mappings: label → code per encoded column, columns listed
//             in the order their encoders were fit
//
// The file is written with 4-space indentation and overwrites
// whatever was there before. export_metadata only stages it:
// nothing is visible at the destination until the returned file
// is committed, so the trainer can commit it together with the
// model graph.
//
// Reference: serde_json documentation (PrettyFormatter)
//            serde documentation (Implementing Deserialize)

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use std::{collections::BTreeMap, fmt, fs, path::Path};

use crate::domain::encoding::{EncoderSet, LabelEncoder};
use crate::infra::artifact_store::{self, Staged};

/// Column → (label → code), in fit order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings(Vec<(String, BTreeMap<String, i64>)>);

impl Serialize for Mappings {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, mapping) in &self.0 {
            map.serialize_entry(column, mapping)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Mappings {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MappingsVisitor;

        impl<'de> Visitor<'de> for MappingsVisitor {
            type Value = Mappings;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of column → (label → code) mappings")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Mappings, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, BTreeMap<String, i64>>()? {
                    entries.push(entry);
                }
                Ok(Mappings(entries))
            }
        }

        deserializer.deserialize_map(MappingsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Feature names in model input order
    pub features: Vec<String>,

    pub mappings: Mappings,
}

impl ModelMetadata {
    pub fn new(encoders: &EncoderSet, feature_names: &[String]) -> Self {
        Self {
            features: feature_names.to_vec(),
            mappings: Mappings(encoders.mappings()),
        }
    }

    /// Encoders rebuilt from the stored mappings, in stored order
    pub fn encoders(&self) -> EncoderSet {
        self.mappings
            .0
            .iter()
            .map(|(column, mapping)| LabelEncoder::from_mapping(column.clone(), mapping))
            .collect()
    }

    /// Pretty JSON with 4-space indentation
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut ser).context("Cannot serialise model metadata")?;
        Ok(buf)
    }
}

/// Stage the metadata sidecar for a model at `output_path`,
/// creating the destination directory when needed. Commit the
/// returned file to put it in place.
pub fn export_metadata(encoders: &EncoderSet, feature_names: &[String], output_path: &Path) -> Result<Staged> {
    let json = ModelMetadata::new(encoders, feature_names).to_json()?;
    let staged = artifact_store::stage_at(output_path, &json)?;

    tracing::debug!(
        "Metadata: {} features, {} encoded columns",
        feature_names.len(),
        encoders.len()
    );
    Ok(staged)
}

pub fn load_metadata(path: &Path) -> Result<ModelMetadata> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read metadata '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid metadata file '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::Column;
    use crate::infra::artifact_store::commit_all;

    fn encoders() -> EncoderSet {
        let fuel = Column::Text(vec![Some("Petrol".into()), Some("Diesel".into()), None]);
        [LabelEncoder::fit("Fuel_Type", &fuel)].into_iter().collect()
    }

    fn features() -> Vec<String> {
        vec!["Mileage".into(), "Fuel_Type".into()]
    }

    fn export(encoders: &EncoderSet, features: &[String], path: &Path) {
        commit_all(vec![export_metadata(encoders, features, path).unwrap()]).unwrap();
    }

    #[test]
    fn test_export_writes_indented_json() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("meta.json");
        export(&encoders(), &features(), &path);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"features\""));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["features"], serde_json::json!(["Mileage", "Fuel_Type"]));
        assert_eq!(value["mappings"]["Fuel_Type"]["Diesel"], 0);
        assert_eq!(value["mappings"]["Fuel_Type"]["nan"], 2);
    }

    #[test]
    fn test_nothing_written_until_committed() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let staged = export_metadata(&encoders(), &features(), &path).unwrap();
        assert!(!path.exists());
        drop(staged);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_load_round_trips_encoders() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        export(&encoders(), &features(), &path);

        let meta = load_metadata(&path).unwrap();
        assert_eq!(meta.features, features());
        let rebuilt = meta.encoders();
        assert_eq!(rebuilt.get("Fuel_Type").unwrap().encode_label("Petrol").unwrap(), 1);
    }

    #[test]
    fn test_columns_keep_fit_order() {
        let encoders: EncoderSet = ["Vehicle_Model", "Fuel_Type", "Battery_Status"]
            .into_iter()
            .map(|c| LabelEncoder::fit(c, &Column::Text(vec![Some("x".into())])))
            .collect();
        let text = String::from_utf8(ModelMetadata::new(&encoders, &[]).to_json().unwrap()).unwrap();

        let model   = text.find("\"Vehicle_Model\"").unwrap();
        let fuel    = text.find("\"Fuel_Type\"").unwrap();
        let battery = text.find("\"Battery_Status\"").unwrap();
        assert!(model < fuel && fuel < battery);

        let back: ModelMetadata = serde_json::from_str(&text).unwrap();
        let rebuilt = back.encoders();
        let order: Vec<&str> = rebuilt.iter().map(|e| e.column()).collect();
        assert_eq!(order, vec!["Vehicle_Model", "Fuel_Type", "Battery_Status"]);
    }

    #[test]
    fn test_export_overwrites() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        export(&encoders(), &features(), &path);
        export(&EncoderSet::new(), &["x".to_string()], &path);

        let meta = load_metadata(&path).unwrap();
        assert_eq!(meta.features, vec!["x"]);
        assert!(meta.encoders().is_empty());
    }

    #[test]
    fn test_empty_mappings_serialise_as_object() {
        let meta = ModelMetadata::new(&EncoderSet::new(), &[]);
        let text = String::from_utf8(meta.to_json().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["mappings"].as_object().unwrap().is_empty());
    }
}
