//! Normalizer: applies frozen robust scaling to feature rows.

use crate::errors::ModelError;
use std::path::Path;

/// `median` and `scale`, each of length `n_features`. `scale[i] > 0` for
/// every `i` — non-positive values loaded from disk are clamped to `1.0`,
/// matching the fit-time guarantee the training pipeline makes.
#[derive(Debug, Clone)]
pub struct NormalizerParameters {
    median: Vec<f64>,
    scale: Vec<f64>,
}

impl NormalizerParameters {
    pub fn new(median: Vec<f64>, mut scale: Vec<f64>) -> Result<Self, ModelError> {
        if median.len() != scale.len() {
            return Err(ModelError::Unavailable {
                reason: format!(
                    "median/scale length mismatch: {} vs {}",
                    median.len(),
                    scale.len()
                ),
            });
        }
        for s in scale.iter_mut() {
            if *s <= 0.0 {
                *s = 1.0;
            }
        }
        Ok(Self { median, scale })
    }

    /// Identity transform used when artifact files are missing: median 0,
    /// scale 1, so `transform` is a no-op.
    pub fn identity(n_features: usize) -> Self {
        Self {
            median: vec![0.0; n_features],
            scale: vec![1.0; n_features],
        }
    }

    pub fn n_features(&self) -> usize {
        self.median.len()
    }

    /// Loads `median`/`scale` vectors persisted as little-endian `f64`
    /// binary files alongside the model artifact.
    pub fn from_files(median_path: &Path, scale_path: &Path) -> Result<Self, ModelError> {
        let median = read_f64_vector(median_path)?;
        let scale = read_f64_vector(scale_path)?;
        Self::new(median, scale)
    }

    /// `X_norm = (X - median) / scale`.
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.median.iter())
            .zip(self.scale.iter())
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }
}

fn read_f64_vector(path: &Path) -> Result<Vec<f64>, ModelError> {
    let bytes = std::fs::read(path).map_err(|e| ModelError::Unavailable {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    if bytes.len() % 8 != 0 {
        return Err(ModelError::Unavailable {
            reason: format!(
                "{} is not a whole number of f64 values ({} bytes)",
                path.display(),
                bytes.len()
            ),
        });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_a_no_op() {
        let norm = NormalizerParameters::identity(3);
        assert_eq!(norm.transform(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn zero_scale_is_clamped_to_one() {
        let norm = NormalizerParameters::new(vec![0.0], vec![0.0]).unwrap();
        assert_eq!(norm.transform(&[5.0]), vec![5.0]);
    }

    #[test]
    fn applies_median_and_scale() {
        let norm = NormalizerParameters::new(vec![10.0], vec![2.0]).unwrap();
        assert_eq!(norm.transform(&[14.0]), vec![2.0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(NormalizerParameters::new(vec![0.0, 0.0], vec![1.0]).is_err());
    }
}
