//! [`ScriptedVisionSource`] – a [`VisionSource`] fed from queues.
//!
//! Tests and the simulator push frames (or faults) per camera; each
//! `read_camera` pops the next one.  An empty queue reads as "no target".
//! Clones share the same queues, so one handle can feed the source while the
//! pipeline owns another.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_types::{CameraId, CameraObservation};
//! use fieldpose_vision::sim::ScriptedVisionSource;
//! use fieldpose_vision::transport::VisionSource;
//!
//! let feeder = ScriptedVisionSource::new();
//! let mut source = feeder.clone();
//!
//! feeder.push_frame(CameraId::A, CameraObservation { sees_target: true, ..Default::default() });
//! assert!(source.read_camera(CameraId::A).unwrap().sees_target);
//! assert!(!source.read_camera(CameraId::A).unwrap().sees_target);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use fieldpose_types::{CameraId, CameraObservation, FieldPoseError};
use parking_lot::Mutex;

use crate::transport::VisionSource;

type Script = VecDeque<Result<CameraObservation, FieldPoseError>>;

#[derive(Debug, Default)]
struct Scripts {
    camera_a: Script,
    camera_b: Script,
}

impl Scripts {
    fn queue(&mut self, camera: CameraId) -> &mut Script {
        match camera {
            CameraId::A => &mut self.camera_a,
            CameraId::B => &mut self.camera_b,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedVisionSource {
    scripts: Arc<Mutex<Scripts>>,
}

impl ScriptedVisionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for `camera`.
    pub fn push_frame(&self, camera: CameraId, observation: CameraObservation) {
        self.scripts.lock().queue(camera).push_back(Ok(observation));
    }

    /// Queue a transport fault for `camera`.
    pub fn push_fault(&self, camera: CameraId, details: impl Into<String>) {
        self.scripts
            .lock()
            .queue(camera)
            .push_back(Err(FieldPoseError::Transport {
                camera: camera.label().to_string(),
                details: details.into(),
            }));
    }

    /// Frames still queued for `camera`.
    pub fn pending(&self, camera: CameraId) -> usize {
        self.scripts.lock().queue(camera).len()
    }
}

impl VisionSource for ScriptedVisionSource {
    fn read_camera(&mut self, camera: CameraId) -> Result<CameraObservation, FieldPoseError> {
        self.scripts
            .lock()
            .queue(camera)
            .pop_front()
            .unwrap_or_else(|| Ok(CameraObservation::not_visible()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_replayed_in_order_per_camera() {
        let mut source = ScriptedVisionSource::new();
        source.push_frame(
            CameraId::B,
            CameraObservation {
                megatag_count: 1,
                ..CameraObservation::default()
            },
        );
        source.push_frame(
            CameraId::B,
            CameraObservation {
                megatag_count: 2,
                ..CameraObservation::default()
            },
        );
        assert_eq!(source.pending(CameraId::A), 0);
        assert_eq!(source.pending(CameraId::B), 2);

        assert_eq!(source.read_camera(CameraId::B).unwrap().megatag_count, 1);
        assert_eq!(source.read_camera(CameraId::B).unwrap().megatag_count, 2);
        assert_eq!(
            source.read_camera(CameraId::B).unwrap(),
            CameraObservation::not_visible()
        );
    }

    #[test]
    fn faults_are_replayed() {
        let mut source = ScriptedVisionSource::new();
        source.push_fault(CameraId::A, "bus off");
        let err = source.read_camera(CameraId::A).unwrap_err();
        assert_eq!(
            err,
            FieldPoseError::Transport {
                camera: "CameraA".to_string(),
                details: "bus off".to_string()
            }
        );
    }
}
