//! # Regularized Least-Squares Solve
//!
//! Solves `(G + λI) beta = b` for a symmetric positive semi-definite Gram matrix `G`.
//! The regularized matrix is factorized with Cholesky rather than inverted. Before the
//! factorization its spectrum is inspected: a matrix whose smallest eigenvalue is
//! numerically zero is reported as singular, and one whose condition number exceeds
//! the configured limit is rejected instead of producing a meaningless blend.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{EigValsh, FactorizeC, SolveC, UPLO};
use thiserror::Error;

/// Eigenvalues below `max_eigenvalue * n * SINGULAR_RELATIVE_TOLERANCE` count as zero.
const SINGULAR_RELATIVE_TOLERANCE: f64 = 1e-14;

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("The Gram matrix is {rows}x{cols}, but the right-hand side has {rhs} entries.")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
    #[error("Cannot solve a ridge system without any predictors.")]
    EmptySystem,
    #[error(
        "The regularized Gram matrix is singular (smallest eigenvalue {min_eigenvalue:.3e}, largest {max_eigenvalue:.3e}). Increase lambda or remove collinear predictors."
    )]
    SingularMatrix {
        min_eigenvalue: f64,
        max_eigenvalue: f64,
    },
    #[error(
        "The regularized Gram matrix is ill-conditioned: condition number {condition_number:.3e} exceeds the limit of {limit:.3e}."
    )]
    IllConditioned { condition_number: f64, limit: f64 },
    #[error("Eigenvalue computation of the regularized Gram matrix failed: {0}")]
    Eigendecomposition(#[source] LinalgError),
    #[error("Cholesky factorization of the regularized Gram matrix failed: {0}")]
    Factorization(#[source] LinalgError),
}

/// Thresholds applied to the condition number of `G + λI`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionLimits {
    /// Above this, a warning is logged and the solve proceeds.
    pub warning: f64,
    /// Above this, the solve fails with [`SolveError::IllConditioned`].
    pub max: f64,
}

/// The solution of a ridge system together with the conditioning it was solved under.
#[derive(Debug, Clone)]
pub struct RidgeSolution {
    pub beta: Array1<f64>,
    pub condition_number: f64,
    pub min_eigenvalue: f64,
    pub max_eigenvalue: f64,
}

/// `G + λI`.
pub fn regularize(gram: ArrayView2<'_, f64>, lambda: f64) -> Array2<f64> {
    let mut regularized = gram.to_owned();
    regularized.diag_mut().mapv_inplace(|d| d + lambda);
    regularized
}

/// Smallest and largest eigenvalue of a symmetric matrix, read from its lower triangle.
pub fn eigenvalue_range(symmetric: &Array2<f64>) -> Result<(f64, f64), SolveError> {
    let eigenvalues = symmetric
        .eigvalsh(UPLO::Lower)
        .map_err(SolveError::Eigendecomposition)?;
    let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
    let max = eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((min, max))
}

/// Solves `(gram + λI) beta = rhs`.
pub fn solve_ridge(
    gram: ArrayView2<'_, f64>,
    rhs: ArrayView1<'_, f64>,
    lambda: f64,
    limits: ConditionLimits,
) -> Result<RidgeSolution, SolveError> {
    let (rows, cols) = gram.dim();
    if rows != cols || rhs.len() != rows {
        return Err(SolveError::DimensionMismatch {
            rows,
            cols,
            rhs: rhs.len(),
        });
    }
    if rows == 0 {
        return Err(SolveError::EmptySystem);
    }

    let regularized = regularize(gram, lambda);
    let (min_eigenvalue, max_eigenvalue) = eigenvalue_range(&regularized)?;

    let tolerance =
        max_eigenvalue.abs().max(f64::MIN_POSITIVE) * rows as f64 * SINGULAR_RELATIVE_TOLERANCE;
    if !(min_eigenvalue > tolerance) {
        return Err(SolveError::SingularMatrix {
            min_eigenvalue,
            max_eigenvalue,
        });
    }

    let condition_number = max_eigenvalue / min_eigenvalue;
    if condition_number > limits.max {
        return Err(SolveError::IllConditioned {
            condition_number,
            limit: limits.max,
        });
    }
    if condition_number > limits.warning {
        log::warn!(
            "Regularized Gram matrix is poorly conditioned (condition number {:.3e}); the blend weights may be unstable.",
            condition_number
        );
    } else {
        log::debug!("Regularized Gram matrix condition number: {:.3e}", condition_number);
    }

    let factor = regularized
        .factorizec(UPLO::Lower)
        .map_err(SolveError::Factorization)?;
    let beta = factor
        .solvec(&rhs)
        .map_err(SolveError::Factorization)?;

    Ok(RidgeSolution {
        beta,
        condition_number,
        min_eigenvalue,
        max_eigenvalue,
    })
}
