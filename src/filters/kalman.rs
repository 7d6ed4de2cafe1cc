//! Linear Kalman predict/update shared by both estimators.
//!
//! Dimensions are const generics: `N` state, `U` control, `M` measurement.
//! Shape mismatches are therefore compile errors rather than runtime checks.

use nalgebra::{Cholesky, SMatrix, SVector};

use crate::error::{FusionError, FusionResult};

/// One predict + update cycle.
///
/// Predict: `x' = F x + B u`, `P' = F P F^T + Q`.
/// Update:  `y = z - H x'`, `S = H P' H^T + R`, `K = P' H^T S^-1`,
///          `x = x' + K y`, `P = (I - K H) P'`.
///
/// The updated covariance is symmetrised before it is returned. Fails with
/// [`FusionError::Numerical`] when `S` cannot be inverted; nothing is
/// substituted for the missing gain.
#[allow(clippy::too_many_arguments)]
pub fn predict_update<const N: usize, const U: usize, const M: usize>(
    state: &SVector<f64, N>,
    covariance: &SMatrix<f64, N, N>,
    transition: &SMatrix<f64, N, N>,
    control: &SMatrix<f64, N, U>,
    control_input: &SVector<f64, U>,
    measurement_map: &SMatrix<f64, M, N>,
    measurement: &SVector<f64, M>,
    process_noise: &SMatrix<f64, N, N>,
    measurement_noise: &SMatrix<f64, M, M>,
) -> FusionResult<(SVector<f64, N>, SMatrix<f64, N, N>)> {
    let (x_pred, p_pred) = predict(
        state,
        covariance,
        transition,
        control,
        control_input,
        process_noise,
    );

    let h_t = measurement_map.transpose();
    let innovation = measurement - measurement_map * x_pred;
    let s = measurement_map * p_pred * h_t + measurement_noise;
    let s_inv = s
        .try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or_else(|| FusionError::numerical("Innovation covariance is singular"))?;

    let gain = p_pred * h_t * s_inv;
    let x_new = x_pred + gain * innovation;

    let identity = SMatrix::<f64, N, N>::identity();
    let p_new = (identity - gain * measurement_map) * p_pred;

    // Force symmetry
    let p_new = (p_new + p_new.transpose()) * 0.5;

    if x_new.iter().chain(p_new.iter()).any(|v| !v.is_finite()) {
        return Err(FusionError::numerical(
            "Kalman update produced a non-finite state or covariance",
        ));
    }

    Ok((x_new, p_new))
}

/// Time update only: `x' = F x + B u`, `P' = F P F^T + Q`.
pub fn predict<const N: usize, const U: usize>(
    state: &SVector<f64, N>,
    covariance: &SMatrix<f64, N, N>,
    transition: &SMatrix<f64, N, N>,
    control: &SMatrix<f64, N, U>,
    control_input: &SVector<f64, U>,
    process_noise: &SMatrix<f64, N, N>,
) -> (SVector<f64, N>, SMatrix<f64, N, N>) {
    let x_pred = transition * state + control * control_input;
    let p_pred = transition * covariance * transition.transpose() + process_noise;
    (x_pred, p_pred)
}

/// Check that a covariance matrix is symmetric and positive semi-definite.
///
/// Semi-definiteness is tested by factorising `P + tol * I`, which succeeds
/// for any matrix whose smallest eigenvalue is above `-tol`.
pub fn covariance_is_well_formed<const N: usize>(covariance: &SMatrix<f64, N, N>, tol: f64) -> bool {
    if covariance.iter().any(|v| !v.is_finite()) {
        return false;
    }

    let scale = covariance.amax().max(1.0);
    let asymmetry = (covariance - covariance.transpose()).amax();
    if asymmetry > tol * scale {
        return false;
    }

    let shifted = covariance + SMatrix::<f64, N, N>::identity() * tol;
    Cholesky::new(shifted).is_some()
}
