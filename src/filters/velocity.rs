//! Forward-speed Kalman filter fusing acceleration with position-derived speed.
//!
//! State Vector (2D):
//! [0]: Position error term (integrated speed)
//! [1]: Forward speed
//!
//! Forward acceleration (x axis resolved through pitch) is the control input;
//! the finite-difference speed from consecutive positions is the measurement.

use nalgebra::{Matrix2, Vector3};
use serde::{Deserialize, Serialize};

use crate::dataset::VelocityDataset;
use crate::error::{check_dt, FusionError, FusionResult};
use crate::filters::kalman::predict_update;
use crate::smoothing::{smooth_series, AccelHistory};
use crate::types::{
    VelControlMat, VelControlVec, VelMeasureMap, VelMeasureNoise, VelMeasureVec, VelStateMat,
    VelStateVec,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub process_noise: VelStateMat,
    pub measurement_noise: VelMeasureNoise,
    /// Spline smoothing applied in batch mode; `None` returns the raw estimates
    pub smoothing_coefficient: Option<f64>,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            process_noise: Matrix2::identity() * 1e-4,
            measurement_noise: Matrix2::new(1e-3, 0.0, 0.0, 1e-2),
            smoothing_coefficient: None,
        }
    }
}

/// Batch output: one speed per input sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSeries {
    pub time: Vec<f64>,
    pub speed: Vec<f64>,
}

impl SpeedSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

pub struct VelocityFilter {
    config: VelocityConfig,
    state: VelStateVec,
    covariance: VelStateMat,
    history: AccelHistory,
    previous_position: f64,
    updates: u64,
}

impl VelocityFilter {
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            state: VelStateVec::zeros(),
            covariance: VelStateMat::identity(),
            history: AccelHistory::new(),
            previous_position: 0.0,
            updates: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = VelStateVec::zeros();
        self.covariance = VelStateMat::identity();
        self.history = AccelHistory::new();
        self.previous_position = 0.0;
        self.updates = 0;
    }

    /// Replace the configuration and reset.
    pub fn reconfigure(&mut self, config: VelocityConfig) {
        self.config = config;
        self.reset();
    }

    /// Set the position the next measured speed is differenced against.
    pub fn prime_position(&mut self, position: f64) {
        self.previous_position = position;
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    pub fn state(&self) -> &VelStateVec {
        &self.state
    }

    pub fn covariance(&self) -> &VelStateMat {
        &self.covariance
    }

    pub fn previous_position(&self) -> f64 {
        self.previous_position
    }

    pub fn speed(&self) -> f64 {
        self.state[1]
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Advance the filter by one sample and return the speed estimate.
    ///
    /// `pitch` is in degrees. On error nothing is mutated, including the
    /// previous-position memory.
    pub fn update(
        &mut self,
        accel: &Vector3<f64>,
        pitch: f64,
        position: f64,
        dt: f64,
    ) -> FusionResult<f64> {
        check_dt(dt)?;
        if accel.iter().any(|v| !v.is_finite()) || !pitch.is_finite() || !position.is_finite() {
            return Err(FusionError::invalid(
                "accel, pitch and position readings must be finite",
            ));
        }

        let mut history = self.history;
        let accel_mean = history.push(accel);
        let forward_accel = accel_mean.x * pitch.to_radians().cos();
        let measured_speed = (position - self.previous_position) / dt;

        let transition = transition(dt);
        let control = control(dt);
        let control_input = VelControlVec::new(forward_accel);

        // The position error term has no direct sensor; it is observed at its
        // own prediction, so only the speed row carries an innovation.
        let predicted_error = (transition * self.state + control * control_input)[0];
        let measurement = VelMeasureVec::new(predicted_error, measured_speed);

        let (state, covariance) = predict_update(
            &self.state,
            &self.covariance,
            &transition,
            &control,
            &control_input,
            &VelMeasureMap::identity(),
            &measurement,
            &self.config.process_noise,
            &self.config.measurement_noise,
        )?;

        self.state = state;
        self.covariance = covariance;
        self.history = history;
        self.previous_position = position;
        self.updates += 1;
        Ok(self.speed())
    }

    /// Run the whole dataset and return one speed per sample.
    ///
    /// Resets the filter and primes the position memory with the first
    /// sample. Smoothing is applied only when configured.
    pub fn analyze_dataset(&mut self, dataset: &VelocityDataset) -> FusionResult<SpeedSeries> {
        let time = dataset.time();
        if let Some(smoothing) = self.config.smoothing_coefficient {
            if !(smoothing.is_finite() && smoothing >= 0.0) {
                return Err(FusionError::invalid(format!(
                    "smoothing coefficient must be finite and non-negative, got {smoothing}"
                )));
            }
        }

        log::debug!(
            "Velocity analysis: {} samples, smoothing {:?}",
            dataset.len(),
            self.config.smoothing_coefficient
        );

        self.reset();
        let mut speed = Vec::with_capacity(dataset.len());
        if !dataset.is_empty() {
            self.prime_position(dataset.sample(0).position);
            speed.push(self.speed());
        }
        for i in 1..dataset.len() {
            let sample = dataset.sample(i);
            let dt = time[i] - time[i - 1];
            speed.push(self.update(&sample.accel_vec(), sample.pitch, sample.position, dt)?);
        }

        if let Some(smoothing) = self.config.smoothing_coefficient {
            speed = smooth_series(time, &speed, smoothing)?;
        }

        log::debug!("Velocity analysis complete after {} updates", self.updates);

        Ok(SpeedSeries {
            time: time.to_vec(),
            speed,
        })
    }

    /// Spline-smooth a speed series against its time axis.
    pub fn smooth(&self, speed: &[f64], time: &[f64], smoothing: f64) -> FusionResult<Vec<f64>> {
        smooth_series(time, speed, smoothing)
    }
}

impl Default for VelocityFilter {
    fn default() -> Self {
        Self::new(VelocityConfig::default())
    }
}

fn transition(dt: f64) -> VelStateMat {
    VelStateMat::new(
        1.0, dt, //
        0.0, 1.0,
    )
}

fn control(dt: f64) -> VelControlMat {
    VelControlMat::new(-(dt * dt) / 2.0, dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kalman::covariance_is_well_formed;
    use approx::assert_relative_eq;

    #[test]
    fn test_measured_speed_drives_estimate() {
        let mut filter = VelocityFilter::default();
        let mut speed = 0.0;
        for i in 1..=30 {
            speed = filter
                .update(&Vector3::zeros(), 0.0, i as f64 * 0.1, 0.1)
                .unwrap();
        }
        assert_relative_eq!(speed, 1.0, max_relative = 0.01);
        assert_relative_eq!(filter.previous_position(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_acceleration_uses_pitch() {
        // With position frozen and measurement noise huge, speed follows the control input
        let config = VelocityConfig {
            measurement_noise: Matrix2::new(1e9, 0.0, 0.0, 1e9),
            ..VelocityConfig::default()
        };
        let mut level = VelocityFilter::new(config.clone());
        let mut pitched = VelocityFilter::new(config);
        let accel = Vector3::new(1.0, 0.0, 0.0);
        for _ in 0..10 {
            level.update(&accel, 0.0, 0.0, 0.1).unwrap();
            pitched.update(&accel, 60.0, 0.0, 0.1).unwrap();
        }
        assert!(level.speed() > 0.0);
        assert_relative_eq!(pitched.speed(), level.speed() * 0.5, max_relative = 1e-6);
    }

    #[test]
    fn test_zero_dt_rejected_without_mutation() {
        let mut filter = VelocityFilter::default();
        filter.update(&Vector3::zeros(), 0.0, 1.0, 0.1).unwrap();
        let state = *filter.state();
        let covariance = *filter.covariance();

        for dt in [0.0, -0.1] {
            assert!(matches!(
                filter.update(&Vector3::zeros(), 0.0, 2.0, dt),
                Err(FusionError::InvalidInput(_))
            ));
        }
        assert_eq!(filter.state(), &state);
        assert_eq!(filter.covariance(), &covariance);
        assert_eq!(filter.previous_position(), 1.0);
        assert_eq!(filter.update_count(), 1);
    }

    #[test]
    fn test_singular_innovation_reported() {
        // Q = 0, dt = 1: P' = [[2,1],[1,1]], so R = -P' makes S singular
        let mut filter = VelocityFilter::new(VelocityConfig {
            process_noise: Matrix2::zeros(),
            measurement_noise: Matrix2::new(-2.0, -1.0, -1.0, -1.0),
            smoothing_coefficient: None,
        });
        let err = filter.update(&Vector3::zeros(), 0.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, FusionError::Numerical(_)));
        assert_eq!(filter.previous_position(), 0.0);
        assert_eq!(filter.state(), &VelStateVec::zeros());
    }

    #[test]
    fn test_covariance_stays_well_formed() {
        let mut filter = VelocityFilter::default();
        let mut position = 0.0;
        for i in 0..1000 {
            let t = i as f64 * 0.01;
            position += 0.012 + 0.004 * (5.0 * t).sin();
            let accel = Vector3::new(0.3 * (5.0 * t).cos(), 0.0, 1.0);
            filter.update(&accel, 5.0 * t.sin(), position, 0.01).unwrap();
            assert!(covariance_is_well_formed(filter.covariance(), 1e-9));
        }
    }

    #[test]
    fn test_smooth_speed_series() {
        let time: Vec<f64> = (0..50).map(|i| i as f64 * 0.02).collect();
        let speed: Vec<f64> = (0..50)
            .map(|i| 1.2 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let filter = VelocityFilter::default();

        assert_eq!(filter.smooth(&speed, &time, 0.0).unwrap(), speed);

        let smoothed = filter.smooth(&speed, &time, 0.05).unwrap();
        let residual: f64 = smoothed
            .iter()
            .zip(&speed)
            .map(|(s, v)| (s - v).powi(2))
            .sum();
        assert_relative_eq!(residual, 0.05, max_relative = 1e-3);
        let spread = |v: &[f64]| {
            v.iter().cloned().fold(f64::MIN, f64::max) - v.iter().cloned().fold(f64::MAX, f64::min)
        };
        assert!(spread(&smoothed) < spread(&speed));
    }

    #[test]
    fn test_analyze_primes_position() {
        let n = 50;
        let dataset = VelocityDataset::from_samples(
            &(0..n)
                .map(|i| crate::types::VelocitySample {
                    timestamp: i as f64 * 0.1,
                    accel: (0.0, 0.0, 0.0),
                    pitch: 0.0,
                    position: 100.0 + i as f64 * 0.1,
                })
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let mut filter = VelocityFilter::default();
        let series = filter.analyze_dataset(&dataset).unwrap();
        assert_eq!(series.len(), n);
        assert_eq!(series.speed[0], 0.0);
        // No spike from an implicit zero origin
        assert!(series.speed.iter().all(|s| *s <= 1.0 + 1e-9));
        assert_relative_eq!(series.speed[n - 1], 1.0, max_relative = 0.01);
    }
}
