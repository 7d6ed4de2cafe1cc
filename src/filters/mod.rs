pub mod kalman;
pub mod orientation;
pub mod velocity;

pub use kalman::{covariance_is_well_formed, predict_update};
pub use orientation::{OrientationConfig, OrientationFilter, OrientationSeries, TiltModel};
pub use velocity::{SpeedSeries, VelocityConfig, VelocityFilter};
