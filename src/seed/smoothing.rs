//! Polynomial smoothing of seed trajectories
//!
//! Each joint row is replaced by the least-squares polynomial through its
//! samples, constrained to pass exactly through both endpoints.

use nalgebra::{DMatrix, DVector};

use crate::common::{JointModelGroup, PlanningError, PlanningResult, TrajectoryMatrix};

/// Fit one polynomial per joint row and write the fitted values back.
///
/// Fails if the constrained fit is singular, misses an endpoint by more
/// than `tolerance`, or leaves the joint bounds (widened by `tolerance`).
pub fn apply_polynomial_smoothing(
    group: &JointModelGroup,
    parameters: &mut TrajectoryMatrix,
    degree: usize,
    tolerance: f64,
) -> PlanningResult<()> {
    let steps = parameters.ncols();
    if steps < 2 {
        return Err(PlanningError::SmoothingFailed(format!("cannot fit {} samples", steps)));
    }
    if degree == 0 {
        return Err(PlanningError::SmoothingFailed("polynomial degree must be at least 1".into()));
    }
    let degree = degree.min(steps - 1);

    let times: Vec<f64> = (0..steps).map(|t| t as f64 / (steps - 1) as f64).collect();
    let vandermonde = DMatrix::from_fn(steps, degree + 1, |i, k| times[i].powi(k as i32));

    for row in 0..parameters.nrows() {
        let samples: DVector<f64> = parameters.row(row).transpose();
        let fitted = fit_with_fixed_endpoints(&vandermonde, &samples).ok_or_else(|| {
            PlanningError::SmoothingFailed(format!("singular fit for joint {}", row))
        })?;

        let first_error = (fitted[0] - samples[0]).abs();
        let last_error = (fitted[steps - 1] - samples[steps - 1]).abs();
        if first_error > tolerance || last_error > tolerance || fitted.iter().any(|v| !v.is_finite()) {
            return Err(PlanningError::SmoothingFailed(format!(
                "fit for joint {} misses its endpoints ({:.2e}, {:.2e})",
                row, first_error, last_error
            )));
        }

        for t in 1..steps - 1 {
            parameters[(row, t)] = fitted[t];
        }
    }

    if let Some(t) = (0..steps).find(|&t| {
        !group.satisfies_bounds_with_margin(&parameters.column(t).into_owned(), tolerance)
    }) {
        return Err(PlanningError::SmoothingFailed(format!(
            "smoothed trajectory leaves the joint limits at step {}",
            t
        )));
    }

    Ok(())
}

/// Solve min |A c - y|^2 subject to p(0) = y_0 and p(1) = y_n through the
/// KKT system, returning the fitted samples A c.
fn fit_with_fixed_endpoints(vandermonde: &DMatrix<f64>, samples: &DVector<f64>) -> Option<DVector<f64>> {
    let n = vandermonde.nrows();
    let m = vandermonde.ncols();
    let last = n - 1;

    let normal = vandermonde.transpose() * vandermonde * 2.0;
    let rhs_top = vandermonde.transpose() * samples * 2.0;

    let mut kkt = DMatrix::<f64>::zeros(m + 2, m + 2);
    kkt.view_mut((0, 0), (m, m)).copy_from(&normal);
    for k in 0..m {
        let at_start = vandermonde[(0, k)];
        let at_end = vandermonde[(last, k)];
        kkt[(m, k)] = at_start;
        kkt[(k, m)] = at_start;
        kkt[(m + 1, k)] = at_end;
        kkt[(k, m + 1)] = at_end;
    }

    let mut rhs = DVector::<f64>::zeros(m + 2);
    rhs.rows_mut(0, m).copy_from(&rhs_top);
    rhs[m] = samples[0];
    rhs[m + 1] = samples[last];

    let solution = kkt.lu().solve(&rhs)?;
    let coefficients = solution.rows(0, m).into_owned();
    Some(vandermonde * coefficients)
}
