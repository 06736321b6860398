//! Model serialization and deserialization via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::BoostError;
use crate::model::{Model, ModelKind};

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Ensemble family.
    kind: ModelKind,
    /// Number of trees in the ensemble.
    n_trees: usize,
    /// Number of features the model was trained on.
    n_features: usize,
    /// Feature column names.
    feature_names: Vec<String>,
    /// The serialized model.
    model: Model,
}

impl Model {
    /// Save the model to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`BoostError::SerializeModel`] | bincode encoding failed |
    /// | [`BoostError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display(), kind = %self.kind()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BoostError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            kind: self.kind(),
            n_trees: self.n_trees(),
            n_features: self.n_features(),
            feature_names: self.feature_names().to_vec(),
            model: self.clone(),
        };

        let bytes = bincode::serialize(&envelope).map_err(|e| BoostError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| BoostError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), n_trees = self.n_trees(), "model saved");
        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`BoostError::ReadModel`] | file read failed |
    /// | [`BoostError::DeserializeModel`] | bincode decoding failed |
    /// | [`BoostError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoostError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| BoostError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope = bincode::deserialize(&bytes).map_err(|e| BoostError::DeserializeModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(BoostError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            kind = %envelope.kind,
            n_trees = envelope.n_trees,
            n_features = envelope.n_features,
            "model loaded"
        );
        Ok(envelope.model)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::boosting::GradientBoostingConfig;
    use crate::forest::RandomForestConfig;
    use crate::model::ModelSpec;

    fn data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..24).map(|i| vec![f64::from(i), f64::from(i % 4)]).collect();
        let targets = features.iter().map(|r| r[0] * 1.5 - r[1]).collect();
        (features, targets, vec!["area".to_string(), "rooms".to_string()])
    }

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let (features, targets, names) = data();
        let specs = [
            ModelSpec::Boosting(GradientBoostingConfig::new(15).unwrap().with_learning_rate(0.2)),
            ModelSpec::Forest(RandomForestConfig::new(6).unwrap()),
        ];
        for spec in specs {
            let model = spec.fit(&features, &targets, &names).unwrap();
            let path = dir.path().join(format!("{}.bin", model.kind()));
            model.save(&path).unwrap();
            let loaded = Model::load(&path).unwrap();
            assert_eq!(loaded, model);
            assert_eq!(
                loaded.predict_batch(&features).unwrap(),
                model.predict_batch(&features).unwrap()
            );
        }
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        let (features, targets, names) = data();
        let model = ModelSpec::Forest(RandomForestConfig::new(2).unwrap())
            .fit(&features, &targets, &names)
            .unwrap();
        let envelope = ModelEnvelope {
            format_version: 0,
            kind: model.kind(),
            n_trees: model.n_trees(),
            n_features: model.n_features(),
            feature_names: names,
            model,
        };
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();
        assert!(matches!(
            Model::load(&path),
            Err(BoostError::IncompatibleModelVersion { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn load_nonexistent_file_error() {
        let dir = TempDir::new().unwrap();
        let err = Model::load(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, BoostError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a valid bincode file").unwrap();
        assert!(matches!(Model::load(&path), Err(BoostError::DeserializeModel { .. })));
    }
}
