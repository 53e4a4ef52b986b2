//! Operator-facing diagnostics for a blend: the predictors' correlation matrix, the
//! weight dump, and formatting helpers. None of this feeds back into the solve.

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::fmt::Write as FmtWrite;

/// Lower end of the heatmap scale. Blending candidates are typically correlated far
/// above this, so everything below it renders as the darkest shade.
pub const HEATMAP_MIN: f64 = 0.85;
pub const HEATMAP_MAX: f64 = 1.00;

/// Pairs correlated above this are called out by [`strongly_correlated_pairs`].
pub const STRONG_CORRELATION: f64 = 0.99;

/// Relative size below which a variance computed from raw moments counts as zero.
const CANCELLATION_TOLERANCE: f64 = 64.0 * f64::EPSILON;

/// Shades from low to high correlation.
const HEATMAP_RAMP: [char; 5] = [' ', '░', '▒', '▓', '█'];

/// Pearson correlation from the raw moments of `n` rows: the Gram matrix `XᵗX` and the
/// column sums. No copy of the rows is needed.
pub fn correlation_from_moments(
    gram: ArrayView2<'_, f64>,
    column_sums: ArrayView1<'_, f64>,
    n: usize,
) -> Array2<f64> {
    let n = n as f64;
    let p = gram.nrows();
    let means = column_sums.mapv(|sum| sum / n);
    let std_devs = Array1::from_shape_fn(p, |j| {
        let second_moment = gram[[j, j]] / n;
        let variance = second_moment - means[j] * means[j];
        // Cancellation leaves rounding noise where the column is constant.
        if variance <= second_moment * CANCELLATION_TOLERANCE {
            0.0
        } else {
            variance.sqrt()
        }
    });

    Array2::from_shape_fn((p, p), |(i, j)| {
        if i == j {
            1.0
        } else {
            let denom = std_devs[i] * std_devs[j];
            if denom > 0.0 {
                let covariance = gram[[i, j]] / n - means[i] * means[j];
                (covariance / denom).clamp(-1.0, 1.0)
            } else {
                f64::NAN
            }
        }
    })
}

fn shade(value: f64) -> char {
    if !value.is_finite() {
        return '?';
    }
    let position = ((value - HEATMAP_MIN) / (HEATMAP_MAX - HEATMAP_MIN)).clamp(0.0, 1.0);
    let index = (position * (HEATMAP_RAMP.len() - 1) as f64).round() as usize;
    HEATMAP_RAMP[index]
}

/// Renders the correlation matrix as a text table, each cell prefixed by a shade on
/// the `[HEATMAP_MIN, HEATMAP_MAX]` scale.
pub fn render_correlation_heatmap(correlation: ArrayView2<'_, f64>, names: &[&str]) -> String {
    let label_width = names.iter().map(|name| name.chars().count()).max().unwrap_or(0);
    let mut out = String::new();

    let header = (0..names.len()).map(|j| format!("{j:>7}")).join("");
    let _ = writeln!(out, "{:label_width$}  {header}", "");
    for (i, name) in names.iter().enumerate() {
        let cells = (0..names.len())
            .map(|j| {
                let value = correlation[[i, j]];
                if value.is_finite() {
                    format!(" {}{:>5.3}", shade(value), value)
                } else {
                    format!(" {}{:>5}", shade(value), "n/a")
                }
            })
            .join("");
        let _ = writeln!(out, "{name:<label_width$}  {cells}  [{i}]");
    }
    let _ = write!(
        out,
        "scale: '{}' <= {:.2} ... '{}' = {:.2}",
        HEATMAP_RAMP[0],
        HEATMAP_MIN,
        HEATMAP_RAMP[HEATMAP_RAMP.len() - 1],
        HEATMAP_MAX
    );
    out
}

/// Every predictor pair whose correlation exceeds `threshold`, as `(i, j, r)` with `i < j`.
pub fn strongly_correlated_pairs(
    correlation: ArrayView2<'_, f64>,
    threshold: f64,
) -> Vec<(usize, usize, f64)> {
    let p = correlation.nrows();
    (0..p)
        .tuple_combinations()
        .filter_map(|(i, j)| {
            let r = correlation[[i, j]];
            (r > threshold).then_some((i, j, r))
        })
        .collect()
}

/// One line per predictor with its weight, followed by the weight sum.
pub fn format_weight_report(names: &[&str], beta: ArrayView1<'_, f64>) -> String {
    let mut out = String::new();
    for (name, weight) in names.iter().zip(beta.iter()) {
        let _ = writeln!(out, "    * {name}: {weight:.3}");
    }
    let _ = write!(out, "Sum of elements in un-normalized beta: {}", beta.sum());
    out
}

/// Format a condition number for display.
pub fn format_cond(cond: f64) -> String {
    if cond.is_finite() {
        format!("{:.2e}", cond)
    } else {
        "N/A".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Axis, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn correlation_of(x: &Array2<f64>) -> Array2<f64> {
        correlation_from_moments(x.t().dot(x).view(), x.sum_axis(Axis(0)).view(), x.nrows())
    }

    #[test]
    fn correlation_of_related_columns() {
        let x = array![[1.0, 2.0, 4.0, 7.0], [2.0, 4.0, 3.0, 7.0], [3.0, 6.0, 2.0, 7.0]];
        let corr = correlation_of(&x);
        assert_abs_diff_eq!(corr[[0, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(corr[[0, 2]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(corr[[2, 0]], -1.0, epsilon = 1e-12);
        assert!(corr[[0, 3]].is_nan());
        assert_eq!(corr[[3, 3]], 1.0);
    }

    #[test]
    fn moments_agree_with_centered_definition() {
        let mut rng = StdRng::seed_from_u64(0xC0_44E1);
        let x = Array2::from_shape_fn((200, 3), |(_, j)| rng.gen_range(1.0..5.0) + j as f64);
        let corr = correlation_of(&x);

        let centered = &x - &x.mean_axis(Axis(0)).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let (a, b) = (centered.column(i), centered.column(j));
                let expected = a.dot(&b) / (a.dot(&a) * b.dot(&b)).sqrt();
                assert_abs_diff_eq!(corr[[i, j]], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn strong_pairs_are_listed_once() {
        let corr = array![[1.0, 0.995, 0.5], [0.995, 1.0, 0.999], [0.5, 0.999, 1.0]];
        let pairs = strongly_correlated_pairs(corr.view(), STRONG_CORRELATION);
        assert_eq!(pairs, vec![(0, 1, 0.995), (1, 2, 0.999)]);
    }

    #[test]
    fn heatmap_lists_every_predictor() {
        let corr = array![[1.0, 0.9], [0.9, 1.0]];
        let rendered = render_correlation_heatmap(corr.view(), &["svdpp", "knn"]);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("svdpp"));
        assert!(lines[1].contains("█1.000"));
        assert!(lines[1].contains("0.900"));
        assert!(lines[2].starts_with("knn  "));
        assert!(lines[3].starts_with("scale:"));
    }

    #[test]
    fn shades_follow_the_scale() {
        assert_eq!(shade(0.2), ' ');
        assert_eq!(shade(1.0), '█');
        assert_eq!(shade(f64::NAN), '?');
    }

    #[test]
    fn weight_report_prints_three_decimals_and_sum() {
        let report = format_weight_report(&["a", "b"], array![0.25, 0.5].view());
        assert_eq!(
            report,
            "    * a: 0.250\n    * b: 0.500\nSum of elements in un-normalized beta: 0.75"
        );
    }

    #[test]
    fn condition_numbers_format_in_scientific_notation() {
        assert_eq!(format_cond(12345.0), "1.23e4");
        assert_eq!(format_cond(f64::INFINITY), "N/A");
    }
}
