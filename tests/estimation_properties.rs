//! Behavioural properties of both estimators, exercised through the public API.

use approx::assert_relative_eq;
use nalgebra::Vector3;

use gait_fusion::filters::covariance_is_well_formed;
use gait_fusion::types::{Attitude, OrientationSample, VelocitySample};
use gait_fusion::{
    FusionError, OrientationConfig, OrientationDataset, OrientationFilter, TiltModel,
    VelocityDataset, VelocityFilter,
};

const DT: f64 = 0.01;

fn gravity_z_filter() -> OrientationFilter {
    OrientationFilter::new(OrientationConfig {
        tilt_model: TiltModel::GravityAlignedZ,
        ..OrientationConfig::default()
    })
}

/// Level for `level_samples`, then a 30° forward tilt.
fn tilt_step_accel(i: usize, level_samples: usize) -> Vector3<f64> {
    if i < level_samples {
        Vector3::new(0.0, 0.0, 1.0)
    } else {
        Vector3::new(0.5, 0.0, 0.866)
    }
}

fn run_orientation(filter: &mut OrientationFilter, n: usize) -> Vec<Attitude> {
    (0..n)
        .map(|i| {
            filter
                .update(&Vector3::zeros(), &tilt_step_accel(i, n / 2), DT)
                .unwrap()
        })
        .collect()
}

fn run_velocity(filter: &mut VelocityFilter, steps: usize) -> Vec<f64> {
    (1..=steps)
        .map(|i| {
            filter
                .update(&Vector3::zeros(), 0.0, i as f64, DT)
                .unwrap()
        })
        .collect()
}

#[test]
fn orientation_is_deterministic() {
    let first = run_orientation(&mut gravity_z_filter(), 300);
    let second = run_orientation(&mut gravity_z_filter(), 300);
    assert_eq!(first, second);
}

#[test]
fn velocity_is_deterministic() {
    let first = run_velocity(&mut VelocityFilter::default(), 100);
    let second = run_velocity(&mut VelocityFilter::default(), 100);
    assert_eq!(first, second);
}

#[test]
fn covariance_stays_symmetric_psd() {
    let mut orientation = gravity_z_filter();
    let mut velocity = VelocityFilter::default();
    for i in 0..300 {
        let t = i as f64 * DT;
        let gyro = Vector3::new(30.0 * (4.0 * t).sin(), -15.0, 10.0 * t.cos());
        orientation
            .update(&gyro, &tilt_step_accel(i, 150), DT)
            .unwrap();
        velocity
            .update(&Vector3::new(0.5 * t.sin(), 0.0, 1.0), 10.0, 1.2 * t, DT)
            .unwrap();
        assert!(covariance_is_well_formed(orientation.covariance(), 1e-9));
        assert!(covariance_is_well_formed(velocity.covariance(), 1e-9));
    }
}

#[test]
fn static_orientation_converges_to_level() {
    let mut filter = gravity_z_filter();
    for i in 0..150 {
        let attitude = filter
            .update(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0), DT)
            .unwrap();
        if i >= 50 {
            assert!(attitude.roll.abs() < 0.5, "roll {} at {i}", attitude.roll);
            assert!(attitude.pitch.abs() < 0.5, "pitch {} at {i}", attitude.pitch);
        }
    }
}

#[test]
fn constant_velocity_converges() {
    let speeds = run_velocity(&mut VelocityFilter::default(), 20);
    let expected = 1.0 / DT;
    assert_relative_eq!(*speeds.last().unwrap(), expected, max_relative = 0.01);
}

#[test]
fn reset_reproduces_first_run() {
    let mut orientation = gravity_z_filter();
    let first = run_orientation(&mut orientation, 200);
    orientation.reset();
    assert_eq!(run_orientation(&mut orientation, 200), first);

    let mut velocity = VelocityFilter::default();
    let first = run_velocity(&mut velocity, 50);
    velocity.reset();
    assert_eq!(run_velocity(&mut velocity, 50), first);
}

#[test]
fn degenerate_dt_leaves_filters_untouched() {
    let mut orientation = gravity_z_filter();
    run_orientation(&mut orientation, 20);
    let state = *orientation.state();
    let covariance = *orientation.covariance();
    for dt in [0.0, -DT] {
        assert!(matches!(
            orientation.update(&Vector3::zeros(), &Vector3::new(0.0, 0.0, 1.0), dt),
            Err(FusionError::InvalidInput(_))
        ));
    }
    assert_eq!(orientation.state(), &state);
    assert_eq!(orientation.covariance(), &covariance);

    let mut velocity = VelocityFilter::default();
    run_velocity(&mut velocity, 5);
    let state = *velocity.state();
    let covariance = *velocity.covariance();
    for dt in [0.0, -DT] {
        assert!(matches!(
            velocity.update(&Vector3::zeros(), 0.0, 6.0, dt),
            Err(FusionError::InvalidInput(_))
        ));
    }
    assert_eq!(velocity.state(), &state);
    assert_eq!(velocity.covariance(), &covariance);
    assert_eq!(velocity.previous_position(), 5.0);
}

#[test]
fn tilt_step_end_to_end() {
    let attitudes = run_orientation(&mut gravity_z_filter(), 300);

    assert!(attitudes.iter().all(|a| a.roll.abs() < 0.5));
    assert!(attitudes[..150].iter().all(|a| a.pitch.abs() < 0.5));

    assert_relative_eq!(attitudes[250].pitch, -30.0, epsilon = 2.0);
    // Approach without ringing past the target
    let lowest = attitudes
        .iter()
        .map(|a| a.pitch)
        .fold(f64::INFINITY, f64::min);
    assert!(lowest > -31.0, "overshoot to {lowest}");
    assert!(attitudes[150..].iter().all(|a| a.pitch < 0.5));
}

#[test]
fn batch_orientation_removes_constant_tilt() {
    let (s, c) = 20.0_f64.to_radians().sin_cos();
    let samples: Vec<_> = (0..300)
        .map(|i| OrientationSample {
            timestamp: i as f64 * DT,
            gyro: (0.0, 0.0, 0.0),
            accel: (s, 0.0, c),
        })
        .collect();
    let dataset = OrientationDataset::from_samples(&samples).unwrap();

    let mut filter = OrientationFilter::default();
    let series = filter.analyze_dataset(&dataset).unwrap();
    assert_eq!(series.len(), samples.len());
    for i in 100..series.len() {
        assert!(series.pitch[i].abs() < 0.1, "pitch {} at {i}", series.pitch[i]);
        assert!(series.roll[i].abs() < 0.1, "roll {} at {i}", series.roll[i]);
    }

    // A second run on the same instance is identical
    assert_eq!(filter.analyze_dataset(&dataset).unwrap(), series);
}

#[test]
fn batch_velocity_from_json_channels() {
    let samples: Vec<_> = (0..40)
        .map(|i| VelocitySample {
            timestamp: i as f64 * 0.1,
            accel: (0.0, 0.0, 1.0),
            pitch: 0.0,
            position: 2.0 + 0.15 * i as f64,
        })
        .collect();
    let dataset = VelocityDataset::from_samples(&samples).unwrap();
    let json = serde_json::to_string(&dataset).unwrap();
    let parsed: VelocityDataset = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), dataset.len());

    let series = VelocityFilter::default().analyze_dataset(&parsed).unwrap();
    assert_eq!(series.speed.len(), 40);
    assert_relative_eq!(series.speed[39], 1.5, max_relative = 0.01);
}
