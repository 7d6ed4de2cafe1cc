//! Linear algebra type system for the estimators
//!
//! Provides compile-time dimension checking and clean type aliases
//! for both Kalman filters.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const ORIENT_STATE_DIM: usize = 4; // roll, roll rate term, pitch, pitch rate term
pub const VEL_STATE_DIM: usize = 2; // position error term, speed

// ===== Control Dimensions =====
pub const ORIENT_CONTROL_DIM: usize = 2; // roll_dot, pitch_dot
pub const VEL_CONTROL_DIM: usize = 1; // forward acceleration

// ===== Measurement Dimensions =====
pub const ORIENT_MEASURE_DIM: usize = 2; // accel roll, accel pitch
pub const VEL_MEASURE_DIM: usize = 2; // position error, speed

// ===== Orientation Filter Types =====
pub type OrientStateVec = SVector<f64, ORIENT_STATE_DIM>;
pub type OrientStateMat = SMatrix<f64, ORIENT_STATE_DIM, ORIENT_STATE_DIM>;
pub type OrientControlMat = SMatrix<f64, ORIENT_STATE_DIM, ORIENT_CONTROL_DIM>;
pub type OrientControlVec = SVector<f64, ORIENT_CONTROL_DIM>;
pub type OrientMeasureVec = SVector<f64, ORIENT_MEASURE_DIM>;
pub type OrientMeasureMap = SMatrix<f64, ORIENT_MEASURE_DIM, ORIENT_STATE_DIM>; // 2×4
pub type OrientMeasureNoise = SMatrix<f64, ORIENT_MEASURE_DIM, ORIENT_MEASURE_DIM>;

// ===== Velocity Filter Types =====
pub type VelStateVec = SVector<f64, VEL_STATE_DIM>;
pub type VelStateMat = SMatrix<f64, VEL_STATE_DIM, VEL_STATE_DIM>;
pub type VelControlMat = SMatrix<f64, VEL_STATE_DIM, VEL_CONTROL_DIM>; // 2×1
pub type VelControlVec = SVector<f64, VEL_CONTROL_DIM>;
pub type VelMeasureVec = SVector<f64, VEL_MEASURE_DIM>;
pub type VelMeasureMap = SMatrix<f64, VEL_MEASURE_DIM, VEL_STATE_DIM>;
pub type VelMeasureNoise = SMatrix<f64, VEL_MEASURE_DIM, VEL_MEASURE_DIM>;
