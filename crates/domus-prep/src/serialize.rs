//! Encoder serialization and deserialization via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::PrepError;
use crate::pipeline::FittedEncoder;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized encoder.
#[derive(serde::Serialize, serde::Deserialize)]
struct EncoderEnvelope {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Number of output features.
    n_features: usize,
    /// The serialized encoder.
    encoder: FittedEncoder,
}

impl FittedEncoder {
    /// Save the encoder to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`PrepError::SerializeEncoder`] | bincode encoding failed |
    /// | [`PrepError::WriteEncoder`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PrepError> {
        let path = path.as_ref();

        let envelope = EncoderEnvelope {
            format_version: FORMAT_VERSION,
            n_features: self.n_features(),
            encoder: self.clone(),
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| PrepError::SerializeEncoder { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| PrepError::WriteEncoder {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), n_features = self.n_features(), "encoder saved");
        Ok(())
    }

    /// Load an encoder from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`PrepError::ReadEncoder`] | file read failed |
    /// | [`PrepError::DeserializeEncoder`] | bincode decoding failed |
    /// | [`PrepError::IncompatibleEncoderVersion`] | format version mismatch |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrepError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| PrepError::ReadEncoder {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: EncoderEnvelope =
            bincode::deserialize(&bytes).map_err(|e| PrepError::DeserializeEncoder {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(PrepError::IncompatibleEncoderVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(n_features = envelope.n_features, "encoder loaded");
        Ok(envelope.encoder)
    }
}

#[cfg(test)]
mod tests {
    use domus_io::{Column, ListingTable};
    use tempfile::TempDir;

    use super::*;
    use crate::pipeline::{PrepConfig, TargetMode};

    fn fitted() -> (ListingTable, FittedEncoder) {
        let table = ListingTable::from_columns(vec![
            (
                "Price".to_string(),
                Column::Numeric((0..6).map(|i| Some(100.0 + i as f64)).collect()),
            ),
            (
                "PostalCode".to_string(),
                Column::Numeric(vec![Some(1000.0), Some(1000.0), Some(2000.0), Some(2000.0), None, Some(3000.0)]),
            ),
            (
                "Heating".to_string(),
                Column::Text(vec![Some("gas".into()), None, Some("wood".into()), None, None, Some("solar".into())]),
            ),
        ])
        .unwrap();
        let encoder = PrepConfig::new().fit(&table).unwrap().encoder;
        (table, encoder)
    }

    #[test]
    fn round_trip_identical_transform() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encoder.bin");
        let (table, encoder) = fitted();

        encoder.save(&path).unwrap();
        let loaded = FittedEncoder::load(&path).unwrap();

        assert_eq!(loaded, encoder);
        assert_eq!(
            loaded.transform(&table, TargetMode::Absent).unwrap(),
            encoder.transform(&table, TargetMode::Absent).unwrap()
        );
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encoder.bin");
        let (_, encoder) = fitted();
        let envelope = EncoderEnvelope {
            format_version: FORMAT_VERSION + 1,
            n_features: encoder.n_features(),
            encoder,
        };
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();

        let result = FittedEncoder::load(&path);
        assert!(matches!(result, Err(PrepError::IncompatibleEncoderVersion { found: 2, .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let result = FittedEncoder::load(dir.path().join("absent.bin"));
        assert!(matches!(result, Err(PrepError::ReadEncoder { .. })));
    }

    #[test]
    fn garbage_is_deserialize_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encoder.bin");
        std::fs::write(&path, b"not an encoder").unwrap();
        assert!(matches!(FittedEncoder::load(&path), Err(PrepError::DeserializeEncoder { .. })));
    }
}
