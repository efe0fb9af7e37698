//! Camera lifecycle: open, switch devices, preview and still capture

pub mod controller;

pub use controller::CameraController;
