//! Cross-moment estimation without quiz labels.
//!
//! The right-hand side of the normal equations, `Xᵗy`, needs the quiz ratings `y`,
//! which only the scoreboard knows. Component `j` is recovered from
//!
//! ```text
//! sum_u x_uj y_u = 1/2 [ sum_u y_u^2 + sum_u x_uj^2 - sum_u (y_u - x_uj)^2 ]
//! ```
//!
//! With `y` standardized the same way as `X`, the first term is the quiz variance,
//! the last is predictor `j`'s quiz MSE, and the middle one is approximated by the
//! column's sum of squares over the qual set.

use ndarray::{Array1, ArrayView1, Zip};

/// `0.5 * (quiz_variance + sum_squares_j - rmse_j^2)` for every predictor.
///
/// # Panics
/// Panics if `sum_squares` and `rmses` differ in length.
pub fn estimate_cross_moments(
    sum_squares: ArrayView1<'_, f64>,
    rmses: ArrayView1<'_, f64>,
    quiz_variance: f64,
) -> Array1<f64> {
    Zip::from(&sum_squares)
        .and(&rmses)
        .map_collect(|&sum_sq, &rmse| 0.5 * (quiz_variance + sum_sq - rmse * rmse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Quantities the scoreboard would report for ratings `y` and raw predictions `x`,
    /// with both standardized around the mean of `y`.
    struct Scoreboard {
        variance: f64,
        rmse: f64,
        x_std: Array1<f64>,
        y_std: Array1<f64>,
    }

    fn scoreboard(x: &Array1<f64>, y: &Array1<f64>) -> Scoreboard {
        let n = y.len() as f64;
        let mean = y.sum() / n;
        let variance = y.mapv(|v| (v - mean).powi(2)).sum() / n;
        let mse = (x - y).mapv(|d| d * d).sum() / n;
        Scoreboard {
            variance,
            rmse: mse.sqrt(),
            x_std: x.mapv(|v| (v - mean) / n.sqrt()),
            y_std: y.mapv(|v| (v - mean) / n.sqrt()),
        }
    }

    #[test]
    fn estimate_equals_direct_cross_moment_on_known_labels() {
        // One predictor, four examples. RMSE = sqrt(3/4), mean = 3.25, variance = 2.1875.
        let x = array![3.0, 4.0, 2.0, 5.0];
        let y = array![3.0, 5.0, 1.0, 4.0];
        let board = scoreboard(&x, &y);
        assert_abs_diff_eq!(board.variance, 2.1875, epsilon = 1e-12);
        assert_abs_diff_eq!(board.rmse, 0.75_f64.sqrt(), epsilon = 1e-12);

        let sum_squares = array![board.x_std.dot(&board.x_std)];
        let estimate = estimate_cross_moments(
            sum_squares.view(),
            array![board.rmse].view(),
            board.variance,
        );
        let direct = board.x_std.dot(&board.y_std);
        assert_abs_diff_eq!(estimate[0], direct, epsilon = 1e-12);
        // Hand computation: x_std . y_std = sum((x-3.25)(y-3.25))/4 = 5.5/4
        assert_abs_diff_eq!(estimate[0], 1.375, epsilon = 1e-12);
    }

    #[test]
    fn estimate_matches_direct_product_for_several_random_predictors() {
        let mut rng = StdRng::seed_from_u64(0x0B1E_4D);
        let n = 500;
        let y: Array1<f64> = (0..n).map(|_| rng.gen_range(1..=5) as f64).collect();
        let raw = Array2::from_shape_fn((n, 3), |(i, j)| {
            (y[i] + rng.gen_range(-1.0..1.0) * (j as f64 + 0.5)).clamp(1.0, 5.0)
        });

        let mut sum_squares = Array1::zeros(3);
        let mut rmses = Array1::zeros(3);
        let mut direct = Array1::zeros(3);
        let mut variance = 0.0;
        for j in 0..3 {
            let board = scoreboard(&raw.column(j).to_owned(), &y);
            sum_squares[j] = board.x_std.dot(&board.x_std);
            rmses[j] = board.rmse;
            direct[j] = board.x_std.dot(&board.y_std);
            variance = board.variance;
        }

        let estimate = estimate_cross_moments(sum_squares.view(), rmses.view(), variance);
        for j in 0..3 {
            assert_abs_diff_eq!(estimate[j], direct[j], epsilon = 1e-10);
        }
    }

    #[test]
    fn zero_energy_predictor_keeps_variance_minus_mse() {
        let estimate = estimate_cross_moments(array![0.0].view(), array![0.8].view(), 1.0);
        assert_abs_diff_eq!(estimate[0], 0.18, epsilon = 1e-12);
    }
}
