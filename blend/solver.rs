// ========================================================================================
//
//                              THE QUIZ BLEND SOLVER
//
// ========================================================================================
//
// We want beta in y = X beta, where y holds the quiz ratings and X the predictors'
// quiz predictions, both with the quiz mean subtracted and divided by sqrt(N). With a
// ridge term the least-squares answer is
//
//     beta = (XᵗX + λI)⁻¹ Xᵗy
//
// Neither side can be computed directly because the quiz ratings are hidden. XᵗX is
// approximated on the full qual set (standardized by sqrt(N_L) so the scales agree),
// and Xᵗy is rebuilt from the quiz variance, each column's energy and each predictor's
// reported quiz RMSE (see `moments`). The blended ratings are X beta mapped back to the
// rating scale and clipped.
//
// The stages run strictly in order and every entity is built once:
//
//     discover -> load + standardize -> cross moments -> ridge solve -> reconstruct -> write

use crate::config::{BlendConfig, ConfigError};
use crate::diagnostics;
use crate::discovery::{self, DiscoveryError, PredictorFile};
use crate::io::{self, PredictionReadError};
use crate::matrix::PredictionMatrix;
use crate::moments::estimate_cross_moments;
use crate::progress::{BlendProgressObserver, BlendStage};
use crate::reconstruct::{self, BlendedPredictions};
use crate::solve::{self, ConditionLimits, SolveError};
use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlendError {
    #[error("Invalid blend configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    PredictionRead(#[from] PredictionReadError),
    #[error("The blending regression could not be solved: {0}")]
    Solve(#[from] SolveError),
    #[error("Failed to write blended predictions to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The fitted blend: weights plus the intermediate quantities they came from.
#[derive(Debug, Clone)]
pub struct BlendWeights {
    pub beta: Array1<f64>,
    pub cross_moments: Array1<f64>,
    pub condition_number: f64,
}

impl BlendWeights {
    pub fn sum(&self) -> f64 {
        self.beta.sum()
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct BlendOutcome {
    pub predictors: Vec<PredictorFile>,
    pub weights: BlendWeights,
    pub predictions: BlendedPredictions,
}

pub struct BlendSolver {
    config: BlendConfig,
}

impl BlendSolver {
    pub fn new(config: BlendConfig) -> Result<Self, BlendError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BlendConfig {
        &self.config
    }

    pub fn discover(&self) -> Result<Vec<PredictorFile>, BlendError> {
        let predictors = discovery::discover_predictors(
            &self.config.prediction_dir,
            &self.config.rmse_marker,
            &self.config.prediction_extension,
        )?;
        log::info!(
            "Found {} predictor(s) in {}",
            predictors.len(),
            self.config.prediction_dir.display()
        );
        Ok(predictors)
    }

    pub fn load(
        &self,
        predictors: Vec<PredictorFile>,
        progress: &mut dyn BlendProgressObserver,
    ) -> Result<PredictionMatrix, BlendError> {
        Ok(PredictionMatrix::load(predictors, &self.config, progress)?)
    }

    /// Estimates `Xᵗy` and solves the ridge system for the blend weights.
    pub fn fit(&self, matrix: &PredictionMatrix) -> Result<BlendWeights, BlendError> {
        let cross_moments = estimate_cross_moments(
            matrix.sum_squares(),
            matrix.rmses().view(),
            self.config.quiz_variance,
        );
        let limits = ConditionLimits {
            warning: self.config.condition_warning,
            max: self.config.max_condition_number,
        };
        let solution = solve::solve_ridge(
            matrix.gram().view(),
            cross_moments.view(),
            self.config.lambda,
            limits,
        )?;
        log::info!(
            "Computed an un-normalized beta (condition number {}). Sum of weights: {}",
            diagnostics::format_cond(solution.condition_number),
            solution.beta.sum()
        );
        Ok(BlendWeights {
            beta: solution.beta,
            cross_moments,
            condition_number: solution.condition_number,
        })
    }

    pub fn blend(&self, matrix: &PredictionMatrix, weights: &BlendWeights) -> BlendedPredictions {
        let predictions =
            reconstruct::reconstruct(matrix, weights.beta.view(), self.config.rating_bounds);
        log::info!(
            "Clipped blended predictions to range [{}, {}] ({} raised, {} lowered)",
            self.config.rating_bounds.min,
            self.config.rating_bounds.max,
            predictions.clipped_low,
            predictions.clipped_high
        );
        predictions
    }

    pub fn write(&self, output: &Path, predictions: &BlendedPredictions) -> Result<(), BlendError> {
        io::write_predictions(
            output,
            predictions.values.iter().copied(),
            self.config.output_precision,
        )
        .map_err(|source| BlendError::Write {
            path: output.to_path_buf(),
            source,
        })
    }

    /// Runs every stage from an already built matrix to the written output file.
    pub fn run_with_matrix(
        &self,
        matrix: &PredictionMatrix,
        output: &Path,
        progress: &mut dyn BlendProgressObserver,
    ) -> Result<(BlendWeights, BlendedPredictions), BlendError> {
        progress.on_stage_start(BlendStage::Solve, 0);
        let weights = self.fit(matrix)?;
        progress.on_stage_finish(BlendStage::Solve);

        let predictions = self.blend(matrix, &weights);

        progress.on_stage_start(BlendStage::WriteOutput, 0);
        self.write(output, &predictions)?;
        progress.on_stage_finish(BlendStage::WriteOutput);
        log::info!("Saved blended predictions to {}", output.display());

        Ok((weights, predictions))
    }

    /// Discovers, loads, fits, blends and writes. Nothing is written unless every
    /// earlier stage succeeded.
    pub fn run(
        &self,
        output: &Path,
        progress: &mut dyn BlendProgressObserver,
    ) -> Result<BlendOutcome, BlendError> {
        let predictors = self.discover()?;
        let matrix = self.load(predictors, progress)?;
        let (weights, predictions) = self.run_with_matrix(&matrix, output, progress)?;
        Ok(BlendOutcome {
            predictors: matrix.predictors().to_vec(),
            weights,
            predictions,
        })
    }
}

/// Correlation matrix of the predictors, for the verbose heatmap.
pub fn predictor_correlation(matrix: &PredictionMatrix) -> Array2<f64> {
    diagnostics::correlation_from_moments(
        matrix.gram().view(),
        matrix.column_sums().view(),
        matrix.num_examples(),
    )
}
