pub mod annotate;
#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod convert;
pub mod tracker;

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraStream, available_cameras, start_camera_stream};
pub use tracker::start_tracker;
