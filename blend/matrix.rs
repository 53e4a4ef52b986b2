//! # The Standardized Prediction Matrix
//!
//! Column `j` of `X` holds predictor `j`'s qual-set predictions with the known quiz
//! mean subtracted and divided by `sqrt(N_L)`. With that scaling `XᵗX` over the qual
//! set estimates the same Gram matrix over the (unlabelled) quiz set, and each
//! column's sum of squares stands in for its quiz-set counterpart in the cross-moment
//! estimate.

use crate::config::BlendConfig;
use crate::discovery::PredictorFile;
use crate::io::{PredictionFile, PredictionReadError};
use crate::progress::{BlendProgressObserver, BlendStage};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};

#[derive(Debug, Clone)]
pub struct PredictionMatrix {
    x: Array2<f64>,
    predictors: Vec<PredictorFile>,
    sum_squares: Array1<f64>,
    quiz_mean: f64,
    scale: f64,
}

impl PredictionMatrix {
    /// Reads every predictor file into its column of `X` and standardizes it.
    ///
    /// Each file must hold exactly `config.num_qual_ratings` lines. The first file
    /// that does not aborts the whole load.
    pub fn load(
        predictors: Vec<PredictorFile>,
        config: &BlendConfig,
        progress: &mut dyn BlendProgressObserver,
    ) -> Result<Self, PredictionReadError> {
        let num_rows = config.num_qual_ratings;
        let scale = config.standardization_scale();
        let mut x = Array2::<f64>::zeros((num_rows, predictors.len()));
        let mut sum_squares = Array1::<f64>::zeros(predictors.len());

        progress.on_stage_start(BlendStage::LoadPredictions, predictors.len());
        for (j, predictor) in predictors.iter().enumerate() {
            let file = PredictionFile::open(&predictor.path)?;
            let mut column = x.column_mut(j);
            file.read_into(column.view_mut())?;
            sum_squares[j] = standardize_column(column, config.quiz_mean, scale);

            log::info!(
                "Finished parsing data for predictor {}, which had a QRMSE of {}",
                predictor.name,
                predictor.rmse
            );
            progress.on_stage_advance(BlendStage::LoadPredictions, j + 1, &predictor.name);
        }
        progress.on_stage_finish(BlendStage::LoadPredictions);

        Ok(Self {
            x,
            predictors,
            sum_squares,
            quiz_mean: config.quiz_mean,
            scale,
        })
    }

    /// Builds the matrix from raw predictions already in memory, one column per
    /// predictor. The scale is `sqrt` of the number of rows.
    ///
    /// # Panics
    /// Panics if the number of columns differs from the number of predictors.
    pub fn from_raw(mut raw: Array2<f64>, predictors: Vec<PredictorFile>, quiz_mean: f64) -> Self {
        assert_eq!(
            raw.ncols(),
            predictors.len(),
            "one raw column is required per predictor"
        );
        let scale = (raw.nrows() as f64).sqrt();
        let sum_squares = raw
            .axis_iter_mut(Axis(1))
            .map(|column| standardize_column(column, quiz_mean, scale))
            .collect();
        Self {
            x: raw,
            predictors,
            sum_squares,
            quiz_mean,
            scale,
        }
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn predictors(&self) -> &[PredictorFile] {
        &self.predictors
    }

    pub fn predictor_names(&self) -> Vec<&str> {
        self.predictors.iter().map(|p| p.name.as_str()).collect()
    }

    /// Quiz RMSE of each predictor, in column order.
    pub fn rmses(&self) -> Array1<f64> {
        self.predictors.iter().map(|p| p.rmse).collect()
    }

    /// `sum_u x_uj^2` of every standardized column.
    pub fn sum_squares(&self) -> ArrayView1<'_, f64> {
        self.sum_squares.view()
    }

    pub fn num_examples(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_predictors(&self) -> usize {
        self.x.ncols()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// `XᵗX`, the P×P Gram matrix of the standardized predictions.
    pub fn gram(&self) -> Array2<f64> {
        self.x.t().dot(&self.x)
    }

    /// `sum_u x_uj` of every standardized column.
    pub fn column_sums(&self) -> Array1<f64> {
        self.x.sum_axis(Axis(0))
    }

    /// Maps a standardized vector back to the rating scale: `v * sqrt(N_L) + quizMean`.
    pub fn destandardize(&self, standardized: ArrayView1<'_, f64>) -> Array1<f64> {
        standardized.mapv(|v| v * self.scale + self.quiz_mean)
    }
}

/// Standardizes one column in place and returns its sum of squares afterwards.
fn standardize_column(mut column: ArrayViewMut1<'_, f64>, quiz_mean: f64, scale: f64) -> f64 {
    column.mapv_inplace(|v| (v - quiz_mean) / scale);
    column.dot(&column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopBlendProgress;
    use crate::progress::recording::RecordingProgress;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn predictor(name: &str, rmse: f64, path: PathBuf) -> PredictorFile {
        PredictorFile {
            name: name.to_string(),
            rmse,
            path,
        }
    }

    fn small_config(rows: usize, quiz_mean: f64) -> BlendConfig {
        BlendConfig {
            num_qual_ratings: rows,
            quiz_mean,
            ..BlendConfig::default()
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_standardizes_columns_and_tracks_sum_squares() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a_QRMSE_0.5.dta", "1.0\n2.0\n3.0\n5.0\n");
        let b = write(dir.path(), "b_QRMSE_0.8.dta", "2.0\n2.0\n2.0\n2.0\n");
        let config = small_config(4, 2.0);
        let matrix = PredictionMatrix::load(
            vec![predictor("a", 0.5, a), predictor("b", 0.8, b)],
            &config,
            &mut NoopBlendProgress,
        )
        .unwrap();

        assert_eq!(matrix.num_examples(), 4);
        assert_eq!(matrix.num_predictors(), 2);
        assert_abs_diff_eq!(matrix.scale(), 2.0);
        let expected_a = array![-0.5, 0.0, 0.5, 1.5];
        for (got, want) in matrix.x().column(0).iter().zip(expected_a.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(matrix.sum_squares()[0], 0.25 + 0.25 + 2.25, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.sum_squares()[1], 0.0);
        assert_eq!(matrix.predictor_names(), vec!["a", "b"]);
        assert_eq!(matrix.rmses(), array![0.5, 0.8]);
    }

    #[test]
    fn standardization_round_trips_to_raw_predictions() {
        let raw = array![[3.9, 1.2], [4.4, 2.7], [1.05, 4.999], [2.5, 3.674], [5.0, 1.0]];
        let matrix = PredictionMatrix::from_raw(
            raw.clone(),
            vec![
                predictor("p0", 0.9, PathBuf::from("p0")),
                predictor("p1", 0.95, PathBuf::from("p1")),
            ],
            3.674,
        );
        for j in 0..raw.ncols() {
            let restored = matrix.destandardize(matrix.x().column(j));
            for (got, want) in restored.iter().zip(raw.column(j).iter()) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn gram_matches_manual_products() {
        let raw = array![[3.0, 4.0], [1.0, 2.0], [5.0, 5.0], [2.0, 1.0]];
        let matrix = PredictionMatrix::from_raw(
            raw,
            vec![
                predictor("p0", 1.0, PathBuf::from("p0")),
                predictor("p1", 1.0, PathBuf::from("p1")),
            ],
            3.0,
        );
        let gram = matrix.gram();
        let x = matrix.x();
        assert_abs_diff_eq!(gram[[0, 1]], x.column(0).dot(&x.column(1)), epsilon = 1e-12);
        assert_abs_diff_eq!(gram[[1, 0]], gram[[0, 1]], epsilon = 1e-15);
        assert_abs_diff_eq!(gram[[0, 0]], matrix.sum_squares()[0], epsilon = 1e-12);
    }

    #[test]
    fn load_reports_progress_per_predictor() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.dta", "1\n2\n");
        let b = write(dir.path(), "b.dta", "3\n4\n");
        let mut progress = RecordingProgress::default();
        PredictionMatrix::load(
            vec![predictor("a", 0.5, a), predictor("b", 0.5, b)],
            &small_config(2, 3.0),
            &mut progress,
        )
        .unwrap();
        assert_eq!(
            progress.events,
            vec![
                "start prediction file loading 2",
                "advance prediction file loading 1 a",
                "advance prediction file loading 2 b",
                "finish prediction file loading",
            ]
        );
    }

    #[test]
    fn load_aborts_on_count_mismatch() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good.dta", "1\n2\n3\n");
        let short = write(dir.path(), "short.dta", "1\n2\n");
        let err = PredictionMatrix::load(
            vec![predictor("good", 0.5, good), predictor("short", 0.5, short)],
            &small_config(3, 3.0),
            &mut NoopBlendProgress,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PredictionReadError::PredictionCountMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }
}
