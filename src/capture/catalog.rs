use serde::{Deserialize, Serialize};

use crate::platform::{DeviceInfo, DeviceKind};

/// A video input device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

/// Snapshot of the available cameras, in platform order
///
/// Rebuilt on every enumeration. An empty catalog means switching by device
/// is not possible; it is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCatalog {
    cameras: Vec<CameraDevice>,
}

impl CameraCatalog {
    /// Keep only video inputs; blank labels become "Camera N"
    pub fn from_devices(devices: &[DeviceInfo]) -> Self {
        let cameras = devices
            .iter()
            .filter(|device| device.kind == DeviceKind::VideoInput)
            .enumerate()
            .map(|(index, device)| CameraDevice {
                id: device.id.clone(),
                label: if device.label.trim().is_empty() {
                    format!("Camera {}", index + 1)
                } else {
                    device.label.clone()
                },
            })
            .collect();

        Self { cameras }
    }

    pub fn cameras(&self) -> &[CameraDevice] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Whether device-based switching is possible
    pub fn can_switch(&self) -> bool {
        self.cameras.len() > 1
    }

    pub fn position(&self, device_id: &str) -> Option<usize> {
        self.cameras.iter().position(|camera| camera.id == device_id)
    }

    /// The camera whose label is `label`, if exactly one camera carries it
    pub fn find_by_label(&self, label: &str) -> Option<&CameraDevice> {
        let mut matches = self.cameras.iter().filter(|camera| camera.label == label);
        match (matches.next(), matches.next()) {
            (Some(camera), None) => Some(camera),
            _ => None,
        }
    }

    /// The camera after `device_id`, wrapping around
    ///
    /// An unknown or absent `device_id` counts as sitting on the first
    /// camera, so the second one is returned when there is one.
    pub fn next_after(&self, device_id: Option<&str>) -> Option<&CameraDevice> {
        if self.cameras.is_empty() {
            return None;
        }

        let current = device_id.and_then(|id| self.position(id)).unwrap_or(0);
        self.cameras.get((current + 1) % self.cameras.len())
    }
}
