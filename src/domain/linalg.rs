//! Dense linear solves for the closed-form allocators.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use super::error::EngineError;

/// Smallest accepted ratio between the smallest and largest squared diagonal
/// entry of the Cholesky factor. Below this the matrix is treated as
/// numerically singular.
pub const DIAGONAL_RATIO_FLOOR: f64 = 1e-12;

/// Solve `a · x = b` for a symmetric positive-definite `a` by Cholesky
/// factorization. Only the lower triangle of `a` is read.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, EngineError> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(EngineError::Optimization {
            reason: format!(
                "dimension mismatch: {}x{} matrix against vector of {}",
                a.nrows(),
                a.ncols(),
                n
            ),
        });
    }
    if n == 0 {
        return Err(EngineError::Optimization {
            reason: "empty system".into(),
        });
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(EngineError::Optimization {
            reason: "system contains non-finite entries".into(),
        });
    }

    let m = DMatrix::from_fn(n, n, |i, j| a[[i, j]]);
    let rhs = DVector::from_iterator(n, b.iter().copied());

    let cholesky = m.cholesky().ok_or_else(|| EngineError::Optimization {
        reason: "covariance matrix is not positive definite".into(),
    })?;

    let diagonal = cholesky.l_dirty().diagonal().map(|d| d * d);
    let ratio = diagonal.min() / diagonal.max();
    if ratio < DIAGONAL_RATIO_FLOOR {
        return Err(EngineError::Optimization {
            reason: format!("covariance matrix is near-singular (diagonal ratio {ratio:.3e})"),
        });
    }

    let x = cholesky.solve(&rhs);
    Ok(x.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn solves_two_by_two() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn solves_three_by_three_covariance() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let b = array![1.0, 1.0, 1.0];
        let x = solve(&a, &b).unwrap();
        let back = a.dot(&x);
        for i in 0..3 {
            assert_abs_diff_eq!(back[i], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn indefinite_matrix_is_rejected() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        let b = array![2.0, 7.0];
        let err = solve(&a, &b).unwrap_err();
        assert!(matches!(err, EngineError::Optimization { .. }));
    }

    #[test]
    fn singular_matrix_is_an_optimization_error() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 1.0];
        let err = solve(&a, &b).unwrap_err();
        assert!(matches!(err, EngineError::Optimization { .. }));
    }

    #[test]
    fn near_singular_matrix_is_rejected() {
        let a = array![[1.0, 1.0], [1.0, 1.0 + 1e-14]];
        let b = array![1.0, 1.0];
        assert!(solve(&a, &b).is_err());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 1.0, 1.0];
        assert!(solve(&a, &b).is_err());
    }

    #[test]
    fn non_finite_entries_are_rejected() {
        let a = array![[f64::NAN, 0.0], [0.0, 1.0]];
        let b = array![1.0, 1.0];
        assert!(solve(&a, &b).is_err());
    }
}
