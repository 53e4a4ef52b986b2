//! Unregularized blending weights fitted on the probe set, where the true ratings are
//! known. The weights solve `min ||A w - y||` through the pseudo-inverse of `AᵗA`, so
//! duplicated or collinear predictors share their weight instead of failing the fit.

use super::HelperError;
use super::combine::{CombinePlan, WeightedInput};
use crate::io::{self, PredictionFile};
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::{Eigh, UPLO};
use std::path::{Path, PathBuf};

/// Zero-based column of the rating in a `user movie date rating` probe row.
pub const PROBE_RATING_COLUMN: usize = 3;

/// Reads the rating column of a probe file.
pub fn read_probe_ratings(path: &Path) -> Result<Array1<f64>, HelperError> {
    let file = PredictionFile::open(path)?;
    let mut ratings = Vec::new();
    for (index, line) in file.lines().enumerate() {
        let token = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|token| !token.is_empty())
            .nth(PROBE_RATING_COLUMN)
            .ok_or_else(|| HelperError::MissingRatingColumn {
                path: path.to_path_buf(),
                line: index + 1,
                column: PROBE_RATING_COLUMN + 1,
            })?;
        ratings.push(io::parse_prediction(path, index + 1, token)?);
    }
    if ratings.is_empty() {
        return Err(HelperError::NoInputs("probe rating"));
    }
    Ok(Array1::from(ratings))
}

pub fn rmse(predictions: ArrayView1<f64>, targets: ArrayView1<f64>) -> f64 {
    let residual = &predictions - &targets;
    (residual.dot(&residual) / targets.len() as f64).sqrt()
}

#[derive(Debug, Clone)]
pub struct ProbeFit {
    pub predictors: Vec<PathBuf>,
    pub weights: Array1<f64>,
    pub predictor_rmse: Array1<f64>,
    pub blended_rmse: f64,
}

impl ProbeFit {
    /// Turns the fit into a combine plan. With `target_dir`, each predictor's file name
    /// is looked up there instead, which is how probe weights are carried over to the
    /// matching qual predictions.
    pub fn to_plan(&self, target_dir: Option<&Path>) -> CombinePlan {
        let inputs = self
            .predictors
            .iter()
            .zip(self.weights.iter())
            .map(|(path, &weight)| {
                let path = match (target_dir, path.file_name()) {
                    (Some(dir), Some(name)) => dir.join(name),
                    _ => path.clone(),
                };
                WeightedInput { path, weight }
            })
            .collect();
        CombinePlan { inputs }
    }

    pub fn report(&self) -> String {
        let mut lines: Vec<String> = self
            .predictors
            .iter()
            .zip(self.weights.iter().zip(self.predictor_rmse.iter()))
            .map(|(path, (weight, rmse))| {
                format!("    * {}: weight {weight:.6}, probe RMSE {rmse:.5}", path.display())
            })
            .collect();
        lines.push(format!("Blended probe RMSE: {:.5}", self.blended_rmse));
        lines.join("\n")
    }
}

/// Fits blending weights for `predictors` against the ratings in `probe`.
pub fn fit_probe_weights(probe: &Path, predictors: &[PathBuf]) -> Result<ProbeFit, HelperError> {
    if predictors.is_empty() {
        return Err(HelperError::NoInputs("predictor file"));
    }
    let ratings = read_probe_ratings(probe)?;

    let mut design = Array2::<f64>::zeros((ratings.len(), predictors.len()));
    for (path, column) in predictors.iter().zip(design.columns_mut()) {
        PredictionFile::open(path)?.read_into(column)?;
    }
    log::info!(
        "Loaded {} probe ratings and {} predictor(s)",
        ratings.len(),
        predictors.len()
    );

    let weights = pseudo_inverse_solve(&design.t().dot(&design), &design.t().dot(&ratings))?;
    let predictor_rmse = design
        .columns()
        .into_iter()
        .map(|column| rmse(column, ratings.view()))
        .collect();
    let blended_rmse = rmse(design.dot(&weights).view(), ratings.view());

    Ok(ProbeFit {
        predictors: predictors.to_vec(),
        weights,
        predictor_rmse,
        blended_rmse,
    })
}

/// Solves `gram w = rhs` with the Moore-Penrose inverse of the symmetric matrix `gram`.
fn pseudo_inverse_solve(gram: &Array2<f64>, rhs: &Array1<f64>) -> Result<Array1<f64>, HelperError> {
    let (eigenvalues, eigenvectors) = gram.eigh(UPLO::Lower)?;
    let largest = eigenvalues.iter().fold(0.0_f64, |max, &value| max.max(value.abs()));
    let tolerance = largest * gram.nrows() as f64 * f64::EPSILON;

    let mut projected = eigenvectors.t().dot(rhs);
    let mut dropped = 0;
    for (coefficient, &eigenvalue) in projected.iter_mut().zip(eigenvalues.iter()) {
        if eigenvalue.abs() > tolerance {
            *coefficient /= eigenvalue;
        } else {
            *coefficient = 0.0;
            dropped += 1;
        }
    }
    if dropped > 0 {
        log::warn!("Probe design is rank deficient; {dropped} direction(s) carry no weight.");
    }
    Ok(eigenvectors.dot(&projected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::fs;
    use tempfile::tempdir;

    const PROBE: &str = "6 30 2152 1\n6 157 2100 2\n7 28 2230 3\n7 241 2230 4\n";

    #[test]
    fn reads_fourth_column() {
        let dir = tempdir().unwrap();
        let probe = dir.path().join("probe.dta");
        fs::write(&probe, PROBE).unwrap();
        let ratings = read_probe_ratings(&probe).unwrap();
        assert_eq!(ratings.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn short_probe_rows_are_rejected() {
        let dir = tempdir().unwrap();
        let probe = dir.path().join("probe.dta");
        fs::write(&probe, "6 30 2152 1\n6 157 2100\n").unwrap();
        assert!(matches!(
            read_probe_ratings(&probe),
            Err(HelperError::MissingRatingColumn {
                line: 2,
                column: 4,
                ..
            })
        ));
    }

    #[test]
    fn recovers_exact_weights() {
        let dir = tempdir().unwrap();
        let probe = dir.path().join("probe.dta");
        let exact = dir.path().join("exact.dta");
        let flat = dir.path().join("flat.dta");
        fs::write(&probe, PROBE).unwrap();
        fs::write(&exact, "1\n2\n3\n4\n").unwrap();
        fs::write(&flat, "1\n1\n1\n1\n").unwrap();

        let fit = fit_probe_weights(&probe, &[exact, flat]).unwrap();
        assert_abs_diff_eq!(fit.weights[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.weights[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.blended_rmse, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.predictor_rmse[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.predictor_rmse[1], 3.5_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn duplicated_predictors_share_the_weight() {
        let dir = tempdir().unwrap();
        let probe = dir.path().join("probe.dta");
        let a = dir.path().join("a.dta");
        let b = dir.path().join("b.dta");
        fs::write(&probe, PROBE).unwrap();
        fs::write(&a, "1\n2\n3\n4\n").unwrap();
        fs::write(&b, "1\n2\n3\n4\n").unwrap();

        let fit = fit_probe_weights(&probe, &[a, b]).unwrap();
        assert_abs_diff_eq!(fit.weights[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.weights[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn plan_can_point_at_another_directory() {
        let fit = ProbeFit {
            predictors: vec![PathBuf::from("probe/svd.dta")],
            weights: Array1::from(vec![0.75]),
            predictor_rmse: Array1::from(vec![0.91]),
            blended_rmse: 0.91,
        };
        let plan = fit.to_plan(Some(Path::new("qual")));
        assert_eq!(plan.inputs[0].path, PathBuf::from("qual/svd.dta"));
        assert_eq!(plan.inputs[0].weight, 0.75);
        assert!(fit.report().ends_with("Blended probe RMSE: 0.91000"));
    }

    #[test]
    fn predictor_length_must_match_probe() {
        let dir = tempdir().unwrap();
        let probe = dir.path().join("probe.dta");
        let short = dir.path().join("short.dta");
        fs::write(&probe, PROBE).unwrap();
        fs::write(&short, "1\n2\n").unwrap();
        assert!(matches!(
            fit_probe_weights(&probe, &[short]),
            Err(HelperError::PredictionRead(_))
        ));
    }
}
