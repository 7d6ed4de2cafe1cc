//! Roll/pitch Kalman filter fusing gyroscope and accelerometer readings.
//!
//! State Vector (4D):
//! [0]: Roll (rad)
//! [1]: Roll rate term (gyro bias, rad/s)
//! [2]: Pitch (rad)
//! [3]: Pitch rate term (gyro bias, rad/s)
//!
//! The gyro-derived Euler rates drive the prediction; the tilt implied by the
//! smoothed accelerometer vector is the measurement.

use nalgebra::{Matrix2, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::dataset::OrientationDataset;
use crate::error::{check_dt, FusionError, FusionResult};
use crate::filters::kalman::predict_update;
use crate::smoothing::{remove_baseline, smooth_series, AccelHistory, BaselineWindow};
use crate::types::{
    Attitude, OrientControlMat, OrientControlVec, OrientMeasureMap, OrientMeasureNoise,
    OrientMeasureVec, OrientStateMat, OrientStateVec,
};

/// How the accelerometer vector is turned into roll and pitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiltModel {
    /// roll = atan2(az, sqrt(ax² + ay²)): elevation of the sensor z axis.
    #[default]
    AxisElevation,
    /// roll = atan2(ay, az): sensor mounted with gravity along +z at rest.
    GravityAlignedZ,
}

impl TiltModel {
    /// Accelerometer-implied (roll, pitch) in radians.
    pub fn angles(&self, accel: &Vector3<f64>) -> (f64, f64) {
        let (ax, ay, az) = (accel.x, accel.y, accel.z);
        let roll = match self {
            TiltModel::AxisElevation => az.atan2((ay * ay + ax * ax).sqrt()),
            TiltModel::GravityAlignedZ => ay.atan2(az),
        };
        let pitch = (-ax).atan2((az * az + ay * ay).sqrt());
        (roll, pitch)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Q: higher values let the accelerometer angles dominate
    pub process_noise: OrientStateMat,
    /// R: higher values let the gyro model dominate
    pub measurement_noise: OrientMeasureNoise,
    /// Spline smoothing applied in batch mode (0 = interpolate)
    pub smoothing_coefficient: f64,
    pub tilt_model: TiltModel,
    /// Offset removal window for batch mode; `None` skips the step
    pub baseline: Option<BaselineWindow>,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            // Angle terms 1e-3, bias terms 1e-6. Equal 1e-6 on all four lets the
            // bias terms soak up a tilt change and overshoot it by several degrees.
            process_noise: Matrix4::from_diagonal(&OrientStateVec::new(1e-3, 1e-6, 1e-3, 1e-6)),
            measurement_noise: Matrix2::new(1e-3, 0.0, 0.0, 1e-2),
            smoothing_coefficient: 1.0,
            tilt_model: TiltModel::default(),
            baseline: Some(BaselineWindow::default()),
        }
    }
}

/// Batch output: one roll/pitch pair per input sample [deg].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationSeries {
    pub time: Vec<f64>,
    pub roll: Vec<f64>,
    pub pitch: Vec<f64>,
}

impl OrientationSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

pub struct OrientationFilter {
    config: OrientationConfig,
    state: OrientStateVec,
    covariance: OrientStateMat,
    history: AccelHistory,
    measurement_map: OrientMeasureMap,
    updates: u64,
}

impl OrientationFilter {
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            state: OrientStateVec::zeros(),
            covariance: OrientStateMat::identity(),
            history: AccelHistory::new(),
            // Roll and pitch are observed, the rate terms are latent
            measurement_map: OrientMeasureMap::new(
                1.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            ),
            updates: 0,
        }
    }

    /// Return to the canonical start: zero state, identity covariance,
    /// zero-filled accelerometer history.
    pub fn reset(&mut self) {
        self.state = OrientStateVec::zeros();
        self.covariance = OrientStateMat::identity();
        self.history = AccelHistory::new();
        self.updates = 0;
    }

    /// Replace the configuration. Resets the filter so a run never mixes two configs.
    pub fn reconfigure(&mut self, config: OrientationConfig) {
        self.config = config;
        self.reset();
    }

    pub fn config(&self) -> &OrientationConfig {
        &self.config
    }

    pub fn state(&self) -> &OrientStateVec {
        &self.state
    }

    pub fn covariance(&self) -> &OrientStateMat {
        &self.covariance
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Current estimate [deg].
    pub fn attitude(&self) -> Attitude {
        Attitude {
            roll: self.state[0].to_degrees(),
            pitch: self.state[2].to_degrees(),
        }
    }

    /// Advance the filter by one sample.
    ///
    /// `gyro` is in deg/s, `dt` in seconds. On error the filter is left
    /// exactly as it was before the call.
    pub fn update(
        &mut self,
        gyro: &Vector3<f64>,
        accel: &Vector3<f64>,
        dt: f64,
    ) -> FusionResult<Attitude> {
        check_dt(dt)?;
        if gyro.iter().chain(accel.iter()).any(|v| !v.is_finite()) {
            return Err(FusionError::invalid("gyro and accel readings must be finite"));
        }

        let mut history = self.history;
        let accel_mean = history.push(accel);
        let (accel_roll, accel_pitch) = self.config.tilt_model.angles(&accel_mean);

        let rates = gyro.map(f64::to_radians);
        let control_input = euler_rates(self.state[0], self.state[2], &rates);

        let (state, covariance) = predict_update(
            &self.state,
            &self.covariance,
            &transition(dt),
            &control(dt),
            &control_input,
            &self.measurement_map,
            &OrientMeasureVec::new(accel_roll, accel_pitch),
            &self.config.process_noise,
            &self.config.measurement_noise,
        )?;

        self.state = state;
        self.covariance = covariance;
        self.history = history;
        self.updates += 1;
        Ok(self.attitude())
    }

    /// Run the whole dataset, then remove the baseline offset and smooth.
    ///
    /// Resets the filter first. Index 0 of the output is the reset estimate;
    /// each later sample is stepped with `dt = t[i] - t[i-1]`.
    pub fn analyze_dataset(&mut self, dataset: &OrientationDataset) -> FusionResult<OrientationSeries> {
        let time = dataset.time();
        if let Some(window) = &self.config.baseline {
            window.indices(time)?;
        }
        let smoothing = self.config.smoothing_coefficient;
        if !(smoothing.is_finite() && smoothing >= 0.0) {
            return Err(FusionError::invalid(format!(
                "smoothing coefficient must be finite and non-negative, got {smoothing}"
            )));
        }

        log::debug!(
            "Orientation analysis: {} samples, tilt model {:?}, smoothing {}",
            dataset.len(),
            self.config.tilt_model,
            smoothing
        );

        self.reset();
        let mut roll = Vec::with_capacity(dataset.len());
        let mut pitch = Vec::with_capacity(dataset.len());
        if !dataset.is_empty() {
            let start = self.attitude();
            roll.push(start.roll);
            pitch.push(start.pitch);
        }
        for i in 1..dataset.len() {
            let sample = dataset.sample(i);
            let dt = time[i] - time[i - 1];
            let attitude = self.update(&sample.gyro_vec(), &sample.accel_vec(), dt)?;
            roll.push(attitude.roll);
            pitch.push(attitude.pitch);
        }

        if let Some(window) = &self.config.baseline {
            roll = remove_baseline(&roll, time, window)?;
            pitch = remove_baseline(&pitch, time, window)?;
        }

        let roll = smooth_series(time, &roll, smoothing)?;
        let pitch = smooth_series(time, &pitch, smoothing)?;

        log::debug!("Orientation analysis complete after {} updates", self.updates);

        Ok(OrientationSeries {
            time: time.to_vec(),
            roll,
            pitch,
        })
    }
}

impl Default for OrientationFilter {
    fn default() -> Self {
        Self::new(OrientationConfig::default())
    }
}

/// Gyro body rates to (roll_dot, pitch_dot).
fn euler_rates(roll: f64, pitch: f64, gyro: &Vector3<f64>) -> OrientControlVec {
    let (gx, gy, gz) = (gyro.x, gyro.y, gyro.z);
    let tan_pitch = pitch.tan();
    let roll_dot = gx + roll.sin() * tan_pitch * gz + roll.cos() * tan_pitch * gy;
    let pitch_dot = roll.cos() * gz - roll.sin() * gy;
    OrientControlVec::new(roll_dot, pitch_dot)
}

/// Each angle integrates minus its rate term over dt.
fn transition(dt: f64) -> OrientStateMat {
    OrientStateMat::new(
        1.0, -dt, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, -dt, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn control(dt: f64) -> OrientControlMat {
    OrientControlMat::new(
        dt, 0.0, //
        0.0, 0.0, //
        0.0, dt, //
        0.0, 0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kalman::covariance_is_well_formed;
    use approx::assert_relative_eq;

    fn gravity_z_filter() -> OrientationFilter {
        OrientationFilter::new(OrientationConfig {
            tilt_model: TiltModel::GravityAlignedZ,
            ..OrientationConfig::default()
        })
    }

    #[test]
    fn test_tilt_models() {
        let tilted = Vector3::new(0.5, 0.0, 0.75_f64.sqrt());
        let (roll, pitch) = TiltModel::GravityAlignedZ.angles(&tilted);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pitch.to_degrees(), -30.0, epsilon = 1e-9);

        let (roll, pitch) = TiltModel::AxisElevation.angles(&tilted);
        assert_relative_eq!(roll.to_degrees(), 60.0, epsilon = 1e-9);
        assert_relative_eq!(pitch.to_degrees(), -30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_euler_rates_level() {
        let rates = euler_rates(0.0, 0.0, &Vector3::new(0.1, 0.2, 0.3));
        assert_relative_eq!(rates[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(rates[1], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_state() {
        let mut filter = gravity_z_filter();
        filter
            .update(&Vector3::new(1.0, 2.0, 3.0), &Vector3::new(0.1, 0.2, 0.9), 0.01)
            .unwrap();
        assert_eq!(filter.update_count(), 1);
        filter.reset();
        assert_eq!(filter.state(), &OrientStateVec::zeros());
        assert_eq!(filter.covariance(), &OrientStateMat::identity());
        assert_eq!(filter.update_count(), 0);
    }

    #[test]
    fn test_rejects_bad_dt_without_mutation() {
        let mut filter = gravity_z_filter();
        let gyro = Vector3::new(5.0, 0.0, 0.0);
        let accel = Vector3::new(0.1, 0.0, 1.0);
        filter.update(&gyro, &accel, 0.01).unwrap();

        let state = *filter.state();
        let covariance = *filter.covariance();
        for dt in [0.0, -0.01, f64::INFINITY] {
            let err = filter.update(&gyro, &accel, dt).unwrap_err();
            assert!(matches!(err, FusionError::InvalidInput(_)));
        }
        assert_eq!(filter.state(), &state);
        assert_eq!(filter.covariance(), &covariance);
        assert_eq!(filter.update_count(), 1);

        // History untouched too: next step matches a filter that never saw the failures
        let mut reference = gravity_z_filter();
        reference.update(&gyro, &accel, 0.01).unwrap();
        assert_eq!(
            filter.update(&gyro, &accel, 0.01).unwrap(),
            reference.update(&gyro, &accel, 0.01).unwrap()
        );
    }

    #[test]
    fn test_singular_innovation_leaves_filter_unchanged() {
        // P' = I + Q on the observed diagonal (Q = 0, dt coupling adds dt²); R = -(H P' H^T)
        let dt: f64 = 0.5;
        let mut filter = OrientationFilter::new(OrientationConfig {
            process_noise: OrientStateMat::zeros(),
            measurement_noise: Matrix2::new(-(1.0 + dt * dt), 0.0, 0.0, -(1.0 + dt * dt)),
            ..OrientationConfig::default()
        });
        let err = filter
            .update(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0), dt)
            .unwrap_err();
        assert!(matches!(err, FusionError::Numerical(_)));
        assert_eq!(filter.state(), &OrientStateVec::zeros());
        assert_eq!(filter.covariance(), &OrientStateMat::identity());
    }

    #[test]
    fn test_gyro_rotation_tracks_before_accel_catches_up() {
        // Pure roll rate with a level accelerometer: estimate moves toward the gyro
        let mut filter = OrientationFilter::new(OrientationConfig {
            measurement_noise: Matrix2::new(1e3, 0.0, 0.0, 1e3),
            tilt_model: TiltModel::GravityAlignedZ,
            ..OrientationConfig::default()
        });
        let mut attitude = Attitude::default();
        for _ in 0..10 {
            attitude = filter
                .update(&Vector3::new(100.0, 0.0, 0.0), &Vector3::new(0.0, 0.0, 1.0), 0.01)
                .unwrap();
        }
        assert!(attitude.roll > 5.0, "roll {}", attitude.roll);
        assert_relative_eq!(attitude.pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_covariance_stays_well_formed() {
        let mut filter = gravity_z_filter();
        for i in 0..1000 {
            let t = i as f64 * 0.01;
            let gyro = Vector3::new(20.0 * t.sin(), 10.0 * (2.0 * t).cos(), -5.0);
            let accel = Vector3::new(0.2 * t.cos(), 0.1 * (3.0 * t).sin(), 0.95);
            filter.update(&gyro, &accel, 0.01).unwrap();
            assert!(covariance_is_well_formed(filter.covariance(), 1e-9));
        }
    }

    #[test]
    fn test_analyze_dataset_requires_baseline_length() {
        let n = 150;
        let dataset = OrientationDataset::from_samples(
            &(0..n)
                .map(|i| crate::types::OrientationSample {
                    timestamp: i as f64 * 0.01,
                    gyro: (0.0, 0.0, 0.0),
                    accel: (0.0, 0.0, 1.0),
                })
                .collect::<Vec<_>>(),
        )
        .unwrap();

        let mut filter = OrientationFilter::default();
        assert!(matches!(
            filter.analyze_dataset(&dataset),
            Err(FusionError::InvalidInput(_))
        ));

        filter.reconfigure(OrientationConfig {
            baseline: None,
            ..OrientationConfig::default()
        });
        let series = filter.analyze_dataset(&dataset).unwrap();
        assert_eq!(series.len(), n);
    }
}
