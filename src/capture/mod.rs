pub mod camera;
pub mod commands;
pub mod controller;
pub mod events;
pub mod state;

pub use camera::{CameraFailure, WebviewCameraHost};
pub use controller::CaptureController;
pub use events::CaptureSnapshot;
