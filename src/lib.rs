//! Post-processing of wearable inertial-sensor recordings for gait research.
//!
//! Two independent Kalman estimators share one predict/update step:
//! [`OrientationFilter`] fuses gyroscope and accelerometer readings into roll
//! and pitch, [`VelocityFilter`] fuses forward acceleration with
//! position-derived speed. Both can run sample by sample or over a whole
//! dataset.

pub mod analysis;
pub mod batch;
pub mod dataset;
pub mod error;
pub mod filters;
pub mod smoothing;
pub mod types;

pub use dataset::{OrientationDataset, VelocityDataset};
pub use error::{FusionError, FusionResult};
pub use filters::{
    OrientationConfig, OrientationFilter, OrientationSeries, SpeedSeries, TiltModel,
    VelocityConfig, VelocityFilter,
};
pub use smoothing::BaselineWindow;
