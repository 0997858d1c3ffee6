//! Finite-difference Jacobian and the covariance built from it

use argmin::core::Error;
use nalgebra::{DMatrix, DVector};

/// Relative forward-difference step. Smaller steps drown in the
/// integrator's own error at the default tolerances.
pub const FD_RELATIVE_STEP: f64 = 1e-4;

/// Forward-difference Jacobian of `residuals` at `params`
///
/// `base` must hold the residuals at `params`. Each step is
/// `FD_RELATIVE_STEP * max(|p|, 0.01 * (upper - lower))` and is taken toward
/// the side of the box with more room, so no trial leaves the bounds. A
/// parameter whose bounds coincide gets a zero column.
pub fn forward_difference<F>(
    params: &[f64],
    base: &[f64],
    bounds: &[(f64, f64)],
    mut residuals: F,
) -> Result<DMatrix<f64>, Error>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>, Error>,
{
    let m = base.len();
    let mut jacobian = DMatrix::zeros(m, params.len());
    let mut trial = params.to_vec();

    for (j, &(lower, upper)) in bounds.iter().enumerate() {
        let p = params[j];
        let room_up = upper - p;
        let room_down = p - lower;
        let nominal = FD_RELATIVE_STEP * p.abs().max(1e-2 * (upper - lower));

        let step = if room_up >= nominal {
            nominal
        } else if room_down >= nominal {
            -nominal
        } else if room_up >= room_down {
            room_up
        } else {
            -room_down
        };
        if step == 0.0 {
            continue;
        }

        trial[j] = p + step;
        let shifted = residuals(&trial)?;
        trial[j] = p;

        if shifted.len() != m {
            return Err(Error::msg(format!(
                "residual length changed from {} to {}",
                m,
                shifted.len()
            )));
        }
        for (i, (r_new, r_old)) in shifted.iter().zip(base).enumerate() {
            jacobian[(i, j)] = (r_new - r_old) / step;
        }
    }

    Ok(jacobian)
}

/// `s² (JᵀJ)⁻¹` over the parameters flagged in `free`, with
/// `s² = ssr / (m - n_free)`
///
/// Rows and columns of parameters that are not free are zero. Returns None
/// when there are no more residuals than free parameters or when the normal
/// matrix is singular.
pub fn covariance(jacobian: &DMatrix<f64>, ssr: f64, free: &[bool]) -> Option<Vec<Vec<f64>>> {
    let n = jacobian.ncols();
    let columns: Vec<usize> = (0..n).filter(|&j| free[j]).collect();
    let m = jacobian.nrows();
    if columns.is_empty() || m <= columns.len() || !ssr.is_finite() {
        return None;
    }

    let reduced = jacobian.select_columns(columns.iter());
    let normal = reduced.transpose() * &reduced;
    let inverse = normal.try_inverse()?;
    let s2 = ssr / (m - columns.len()) as f64;

    let mut full = vec![vec![0.0; n]; n];
    for (a, &ja) in columns.iter().enumerate() {
        for (b, &jb) in columns.iter().enumerate() {
            full[ja][jb] = s2 * inverse[(a, b)];
        }
    }
    if full.iter().flatten().all(|v| v.is_finite()) {
        Some(full)
    } else {
        None
    }
}

/// `Jᵀ r`
pub fn gradient(jacobian: &DMatrix<f64>, residuals: &[f64]) -> DVector<f64> {
    jacobian.tr_mul(&DVector::from_column_slice(residuals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(p: &[f64]) -> Result<Vec<f64>, Error> {
        Ok(vec![2.0 * p[0] + p[1], p[0] - 3.0 * p[1], 4.0 * p[1]])
    }

    #[test]
    fn test_linear_residuals_recover_exact_jacobian() {
        let p = [0.3, 0.2];
        let base = linear(&p).unwrap();
        let jac = forward_difference(&p, &base, &[(0.0, 1.0), (0.0, 1.0)], linear).unwrap();
        let expected = DMatrix::from_row_slice(3, 2, &[2.0, 1.0, 1.0, -3.0, 0.0, 4.0]);
        assert!((jac - expected).abs().max() < 1e-9);
    }

    #[test]
    fn test_steps_stay_inside_bounds() {
        let p = [1.0, 0.0];
        let bounds = [(0.0, 1.0), (0.0, 1.0)];
        let base = linear(&p).unwrap();
        let mut seen = Vec::new();
        forward_difference(&p, &base, &bounds, |trial| {
            seen.push(trial.to_vec());
            linear(trial)
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        for trial in seen {
            for (value, (lower, upper)) in trial.iter().zip(bounds) {
                assert!(*value >= lower && *value <= upper);
            }
        }
    }

    #[test]
    fn test_fixed_parameter_has_zero_column() {
        let p = [0.5, 0.2];
        let base = linear(&p).unwrap();
        let jac = forward_difference(&p, &base, &[(0.5, 0.5), (0.0, 1.0)], linear).unwrap();
        assert!(jac.column(0).iter().all(|v| *v == 0.0));
        assert!((jac[(2, 1)] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_covariance_of_straight_line_fit() {
        // y = a + b x at x = 0, 1, 2, 3
        let jac = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let cov = covariance(&jac, 2.0, &[true, true]).unwrap();
        // (JᵀJ)⁻¹ = [[0.7, -0.3], [-0.3, 0.2]], s² = 2 / 2
        assert!((cov[0][0] - 0.7).abs() < 1e-12);
        assert!((cov[0][1] + 0.3).abs() < 1e-12);
        assert!((cov[1][1] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_unavailable() {
        let jac = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(covariance(&jac, 1.0, &[true, true]).is_none());
        let tall = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        assert!(covariance(&tall, 1.0, &[true, true]).is_none());
        let pinned = covariance(&tall, 1.0, &[true, false]).unwrap();
        assert_eq!(pinned[1], vec![0.0, 0.0]);
        assert!(pinned[0][0] > 0.0);
    }
}
