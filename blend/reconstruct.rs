use crate::config::RatingBounds;
use crate::matrix::PredictionMatrix;
use ndarray::{Array1, ArrayView1};

/// Final blended ratings, already clipped into the rating range.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendedPredictions {
    pub values: Array1<f64>,
    /// How many raw blended values fell below the minimum rating.
    pub clipped_low: usize,
    /// How many raw blended values rose above the maximum rating.
    pub clipped_high: usize,
}

impl BlendedPredictions {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `clip(X·beta · sqrt(N_L) + quizMean)`.
pub fn reconstruct(
    matrix: &PredictionMatrix,
    beta: ArrayView1<'_, f64>,
    bounds: RatingBounds,
) -> BlendedPredictions {
    let standardized = matrix.x().dot(&beta);
    clip_predictions(matrix.destandardize(standardized.view()), bounds)
}

/// Clips every value into `bounds`, counting how many were moved.
pub fn clip_predictions(mut values: Array1<f64>, bounds: RatingBounds) -> BlendedPredictions {
    let mut clipped_low = 0;
    let mut clipped_high = 0;
    values.mapv_inplace(|v| {
        if v < bounds.min {
            clipped_low += 1;
        } else if v > bounds.max {
            clipped_high += 1;
        }
        bounds.clip(v)
    });
    BlendedPredictions {
        values,
        clipped_low,
        clipped_high,
    }
}
