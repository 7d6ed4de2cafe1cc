use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, FusionResult};

/// Samples kept per accelerometer axis: two prior readings plus the current one.
pub const ACCEL_HISTORY_LEN: usize = 3;

/// Fixed-capacity FIFO of the most recent values, averaged on demand.
///
/// Starts full of zeros, so the first readings are averaged against an
/// at-rest history rather than against a shorter window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollingMean<const N: usize> {
    window: [f64; N],
    head: usize,
}

impl<const N: usize> RollingMean<N> {
    pub fn new() -> Self {
        Self {
            window: [0.0; N],
            head: 0,
        }
    }

    /// Insert a value, evicting the oldest, and return the new mean.
    pub fn push(&mut self, value: f64) -> f64 {
        self.window[self.head] = value;
        self.head = (self.head + 1) % N;
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        self.window.iter().sum::<f64>() / N as f64
    }

    /// Values from oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..N).map(move |i| self.window[(self.head + i) % N])
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<const N: usize> Default for RollingMean<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-axis rolling history of raw accelerometer readings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccelHistory {
    x: RollingMean<ACCEL_HISTORY_LEN>,
    y: RollingMean<ACCEL_HISTORY_LEN>,
    z: RollingMean<ACCEL_HISTORY_LEN>,
}

impl AccelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one raw reading and return the smoothed (per-axis mean) vector.
    pub fn push(&mut self, accel: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            self.x.push(accel.x),
            self.y.push(accel.y),
            self.z.push(accel.z),
        )
    }

    pub fn mean(&self) -> Vector3<f64> {
        Vector3::new(self.x.mean(), self.y.mean(), self.z.mean())
    }
}

/// Early window used to estimate a constant offset in a batch output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineWindow {
    /// Sample indices `start..end`. The default `100..200` assumes ~100 Hz data.
    Samples { start: usize, end: usize },
    /// Seconds `start..end` measured from the first timestamp.
    Seconds { start: f64, end: f64 },
}

impl Default for BaselineWindow {
    fn default() -> Self {
        BaselineWindow::Samples {
            start: 100,
            end: 200,
        }
    }
}

impl BaselineWindow {
    /// Resolve the window to sample indices for a given time axis.
    ///
    /// Fails when the data does not reach the end of the window.
    pub fn indices(&self, time: &[f64]) -> FusionResult<std::ops::Range<usize>> {
        match *self {
            BaselineWindow::Samples { start, end } => {
                if start >= end {
                    return Err(FusionError::invalid(format!(
                        "baseline window {start}..{end} is empty"
                    )));
                }
                if time.len() < end {
                    return Err(FusionError::invalid(format!(
                        "baseline window {start}..{end} needs at least {end} samples, got {}",
                        time.len()
                    )));
                }
                Ok(start..end)
            }
            BaselineWindow::Seconds { start, end } => {
                if !(start.is_finite() && end.is_finite() && start >= 0.0 && start < end) {
                    return Err(FusionError::invalid(format!(
                        "baseline window {start}s..{end}s is not a valid interval"
                    )));
                }
                let t0 = time.first().copied().unwrap_or(0.0);
                let span = time.last().map(|t| t - t0).unwrap_or(0.0);
                if span < end {
                    return Err(FusionError::invalid(format!(
                        "baseline window ends at {end}s but data only spans {span:.3}s"
                    )));
                }
                let first = time.partition_point(|t| t - t0 < start);
                let last = time.partition_point(|t| t - t0 < end);
                if first >= last {
                    return Err(FusionError::invalid(format!(
                        "no samples fall inside baseline window {start}s..{end}s"
                    )));
                }
                Ok(first..last)
            }
        }
    }
}

/// Subtract the mean over `window` from every value.
pub fn remove_baseline(
    values: &[f64],
    time: &[f64],
    window: &BaselineWindow,
) -> FusionResult<Vec<f64>> {
    if values.len() != time.len() {
        return Err(FusionError::invalid(format!(
            "series has {} values but time axis has {}",
            values.len(),
            time.len()
        )));
    }
    let range = window.indices(time)?;
    let slice = &values[range];
    let offset = slice.iter().sum::<f64>() / slice.len() as f64;
    Ok(values.iter().map(|v| v - offset).collect())
}

/// Iteration cap for the smoothing-parameter search.
const SPLINE_MAX_ITER: usize = 60;
/// Relative tolerance on the residual target.
const SPLINE_RESIDUAL_TOL: f64 = 1e-6;
/// First fallback start for the parameter search, relative to `tr(Q^T Q) / tr(T)`.
const SPLINE_FALLBACK_START: f64 = 1e-12;

/// Natural cubic smoothing spline with a knot at every sample.
///
/// Minimises the integral of `g''^2` subject to
/// `sum (y_i - g(t_i))^2 <= smoothing`. With `smoothing = 0` the spline
/// interpolates the data; as `smoothing` grows it tends to the
/// least-squares straight line.
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    /// Spline values at the knots
    values: Vec<f64>,
    /// Second derivatives at the knots (zero at both ends)
    curvature: Vec<f64>,
}

impl SmoothingSpline {
    pub fn fit(time: &[f64], values: &[f64], smoothing: f64) -> FusionResult<Self> {
        if time.len() != values.len() {
            return Err(FusionError::invalid(format!(
                "spline needs equal-length inputs, got {} times and {} values",
                time.len(),
                values.len()
            )));
        }
        if !(smoothing.is_finite() && smoothing >= 0.0) {
            return Err(FusionError::invalid(format!(
                "smoothing coefficient must be finite and non-negative, got {smoothing}"
            )));
        }
        crate::dataset::validate_time_axis(time)?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::invalid("spline values must be finite"));
        }

        let n = time.len();
        if n < 3 {
            return Ok(Self {
                knots: time.to_vec(),
                values: values.to_vec(),
                curvature: vec![0.0; n],
            });
        }

        let system = BandedSystem::new(time, values);
        let (fitted, curvature) = system.solve_for_residual(smoothing)?;

        Ok(Self {
            knots: time.to_vec(),
            values: fitted,
            curvature,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Spline values at the knots.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Evaluate the spline at `t`; linear extrapolation outside the knots.
    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.knots.len();
        match n {
            0 => return f64::NAN,
            1 => return self.values[0],
            _ => {}
        }

        if t <= self.knots[0] {
            return self.values[0] + self.slope_at(0) * (t - self.knots[0]);
        }
        if t >= self.knots[n - 1] {
            return self.values[n - 1] + self.slope_at(n - 1) * (t - self.knots[n - 1]);
        }

        let i = self.knots.partition_point(|k| *k <= t) - 1;
        let h = self.knots[i + 1] - self.knots[i];
        let a = (self.knots[i + 1] - t) / h;
        let b = 1.0 - a;
        a * self.values[i]
            + b * self.values[i + 1]
            + ((a * a * a - a) * self.curvature[i] + (b * b * b - b) * self.curvature[i + 1]) * h * h
                / 6.0
    }

    /// First derivative at knot `i`, used for extrapolation.
    fn slope_at(&self, i: usize) -> f64 {
        let n = self.knots.len();
        if i + 1 < n {
            let h = self.knots[i + 1] - self.knots[i];
            (self.values[i + 1] - self.values[i]) / h
                - h * (2.0 * self.curvature[i] + self.curvature[i + 1]) / 6.0
        } else {
            let h = self.knots[i] - self.knots[i - 1];
            (self.values[i] - self.values[i - 1]) / h
                + h * (self.curvature[i - 1] + 2.0 * self.curvature[i]) / 6.0
        }
    }
}

/// Fit a smoothing spline and evaluate it back at the input timestamps.
pub fn smooth_series(time: &[f64], values: &[f64], smoothing: f64) -> FusionResult<Vec<f64>> {
    Ok(SmoothingSpline::fit(time, values, smoothing)?.into_values())
}

/// Pentadiagonal system `(Q^T Q + p T) u = Q^T y` over the interior knots.
///
/// `Q` is the n×(n-2) second-difference operator and `T` the (n-2)×(n-2)
/// tridiagonal spline matrix; both are stored by diagonals.
struct BandedSystem {
    time: Vec<f64>,
    y: Vec<f64>,
    // Q columns: entries at rows j, j+1, j+2
    q0: Vec<f64>,
    q1: Vec<f64>,
    q2: Vec<f64>,
    // T diagonal and first off-diagonal
    t0: Vec<f64>,
    t1: Vec<f64>,
    // Q^T Q by diagonals
    qa: Vec<f64>,
    qb: Vec<f64>,
    qc: Vec<f64>,
    rhs: Vec<f64>,
}

impl BandedSystem {
    fn new(time: &[f64], y: &[f64]) -> Self {
        let n = time.len();
        let m = n - 2;
        let h: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();

        let q0: Vec<f64> = (0..m).map(|j| 1.0 / h[j]).collect();
        let q1: Vec<f64> = (0..m).map(|j| -1.0 / h[j] - 1.0 / h[j + 1]).collect();
        let q2: Vec<f64> = (0..m).map(|j| 1.0 / h[j + 1]).collect();
        let t0: Vec<f64> = (0..m).map(|j| (h[j] + h[j + 1]) / 3.0).collect();
        let t1: Vec<f64> = (0..m).map(|j| h[j + 1] / 6.0).collect();

        let qa = (0..m)
            .map(|j| q0[j] * q0[j] + q1[j] * q1[j] + q2[j] * q2[j])
            .collect();
        let qb = (0..m)
            .map(|j| {
                if j + 1 < m {
                    q1[j] * q0[j + 1] + q2[j] * q1[j + 1]
                } else {
                    0.0
                }
            })
            .collect();
        let qc = (0..m)
            .map(|j| if j + 2 < m { q2[j] * q0[j + 2] } else { 0.0 })
            .collect();
        let rhs = (0..m)
            .map(|j| q0[j] * y[j] + q1[j] * y[j + 1] + q2[j] * y[j + 2])
            .collect();

        Self {
            time: time.to_vec(),
            y: y.to_vec(),
            q0,
            q1,
            q2,
            t0,
            t1,
            qa,
            qb,
            qc,
            rhs,
        }
    }

    fn interior(&self) -> usize {
        self.t0.len()
    }

    /// Find the smallest-curvature fit whose squared residual is `target`.
    ///
    /// Newton iteration on `1/F(p)`, where `F(p)` is the residual norm,
    /// starting from `p = 0` (the least-squares line).
    fn solve_for_residual(&self, target: f64) -> FusionResult<(Vec<f64>, Vec<f64>)> {
        if target == 0.0 {
            let curvature = self.interpolating_curvature()?;
            return Ok((self.y.clone(), curvature));
        }

        let (line, line_residual) = self.least_squares_line();
        if line_residual <= target {
            let n = self.y.len();
            return Ok((line, vec![0.0; n]));
        }

        let (mut p, mut u) = self.starting_point()?;
        let mut converged = false;
        for _ in 0..SPLINE_MAX_ITER {
            let residual = self.apply_q(&u);
            let e: f64 = residual.iter().map(|r| r * r).sum();
            if e <= target * (1.0 + SPLINE_RESIDUAL_TOL) {
                converged = true;
                break;
            }

            let tu = self.apply_t(&u);
            let f: f64 = dot(&u, &tu);
            let w = self.solve(p, &tu)?;
            let g: f64 = dot(&w, &tu);
            let denom = f - p * g;
            if !(denom.is_finite() && denom > 0.0) {
                break;
            }

            let step = (e * (e / target).sqrt() - e) / denom;
            p += step;
            u = self.solve(p, &self.rhs)?;
            if step <= p * 1e-12 {
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "Smoothing spline stopped after {} iterations before reaching residual {}",
                SPLINE_MAX_ITER,
                target
            );
        }

        let residual = self.apply_q(&u);
        let fitted = self.y.iter().zip(&residual).map(|(y, r)| y - r).collect();
        let mut curvature = Vec::with_capacity(self.y.len());
        curvature.push(0.0);
        curvature.extend(u.iter().map(|v| p * v));
        curvature.push(0.0);
        Ok((fitted, curvature))
    }

    /// The `p -> 0` limit of the spline, with its squared residual.
    fn least_squares_line(&self) -> (Vec<f64>, f64) {
        let n = self.time.len() as f64;
        let t_mean = self.time.iter().sum::<f64>() / n;
        let y_mean = self.y.iter().sum::<f64>() / n;
        let (sxx, sxy) = self
            .time
            .iter()
            .zip(&self.y)
            .fold((0.0, 0.0), |(sxx, sxy), (t, y)| {
                let dt = t - t_mean;
                (sxx + dt * dt, sxy + dt * (y - y_mean))
            });
        let slope = sxy / sxx;
        let line: Vec<f64> = self
            .time
            .iter()
            .map(|t| y_mean + slope * (t - t_mean))
            .collect();
        let residual: f64 = line.iter().zip(&self.y).map(|(l, y)| (y - l).powi(2)).sum();
        (line, residual)
    }

    /// Solve at `p = 0` when `Q^T Q` factorises.
    ///
    /// Near-coincident knots make `Q^T Q` numerically singular; the search then
    /// starts from the smallest `p` (growing from a trace-scaled floor) at which
    /// `Q^T Q + p T` factorises.
    fn starting_point(&self) -> FusionResult<(f64, Vec<f64>)> {
        let err = match self.solve(0.0, &self.rhs) {
            Ok(u) => return Ok((0.0, u)),
            Err(err) => err,
        };

        let scale = self.qa.iter().sum::<f64>() / self.t0.iter().sum::<f64>();
        let mut p = scale * SPLINE_FALLBACK_START;
        while p <= scale {
            if let Ok(u) = self.solve(p, &self.rhs) {
                log::debug!("Spline search starts at p = {p:.3e} (Q^T Q is near-singular)");
                return Ok((p, u));
            }
            p *= 100.0;
        }
        Err(err)
    }

    /// Second derivatives of the natural interpolating spline: `T c = Q^T y`.
    fn interpolating_curvature(&self) -> FusionResult<Vec<f64>> {
        let m = self.interior();
        let zeros = vec![0.0; m];
        let c = solve_pentadiagonal(&self.t0, &self.t1, &zeros, &self.rhs)?;
        let mut curvature = Vec::with_capacity(m + 2);
        curvature.push(0.0);
        curvature.extend(c);
        curvature.push(0.0);
        Ok(curvature)
    }

    fn solve(&self, p: f64, rhs: &[f64]) -> FusionResult<Vec<f64>> {
        let a: Vec<f64> = self.qa.iter().zip(&self.t0).map(|(q, t)| q + p * t).collect();
        let b: Vec<f64> = self.qb.iter().zip(&self.t1).map(|(q, t)| q + p * t).collect();
        solve_pentadiagonal(&a, &b, &self.qc, rhs)
    }

    /// `Q u`, length n.
    fn apply_q(&self, u: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.y.len()];
        for (j, uj) in u.iter().enumerate() {
            out[j] += self.q0[j] * uj;
            out[j + 1] += self.q1[j] * uj;
            out[j + 2] += self.q2[j] * uj;
        }
        out
    }

    /// `T u`, length n-2.
    fn apply_t(&self, u: &[f64]) -> Vec<f64> {
        let m = u.len();
        (0..m)
            .map(|j| {
                let mut v = self.t0[j] * u[j];
                if j + 1 < m {
                    v += self.t1[j] * u[j + 1];
                }
                if j >= 1 {
                    v += self.t1[j - 1] * u[j - 1];
                }
                v
            })
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solve a symmetric pentadiagonal system by `L D L^T` factorisation.
///
/// `a` is the diagonal, `b[i]` the entry at (i, i+1), `c[i]` the entry at (i, i+2).
fn solve_pentadiagonal(a: &[f64], b: &[f64], c: &[f64], rhs: &[f64]) -> FusionResult<Vec<f64>> {
    let m = a.len();
    let mut d = vec![0.0; m];
    let mut e = vec![0.0; m];
    let mut f = vec![0.0; m];

    for i in 0..m {
        let mut di = a[i];
        if i >= 1 {
            di -= e[i - 1] * e[i - 1] * d[i - 1];
        }
        if i >= 2 {
            di -= f[i - 2] * f[i - 2] * d[i - 2];
        }
        if !(di.is_finite() && di > f64::EPSILON * a[i].abs().max(1.0)) {
            return Err(FusionError::numerical(format!(
                "spline system is not positive definite at row {i}"
            )));
        }
        d[i] = di;

        let mut ei = b[i];
        if i >= 1 {
            ei -= f[i - 1] * e[i - 1] * d[i - 1];
        }
        e[i] = ei / di;
        f[i] = c[i] / di;
    }

    let mut z = vec![0.0; m];
    for i in 0..m {
        let mut zi = rhs[i];
        if i >= 1 {
            zi -= e[i - 1] * z[i - 1];
        }
        if i >= 2 {
            zi -= f[i - 2] * z[i - 2];
        }
        z[i] = zi;
    }
    for (zi, di) in z.iter_mut().zip(&d) {
        *zi /= di;
    }

    let mut u = vec![0.0; m];
    for i in (0..m).rev() {
        let mut ui = z[i];
        if i + 1 < m {
            ui -= e[i] * u[i + 1];
        }
        if i + 2 < m {
            ui -= f[i] * u[i + 2];
        }
        u[i] = ui;
    }
    Ok(u)
}
