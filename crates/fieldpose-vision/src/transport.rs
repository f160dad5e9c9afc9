//! Boundary between the camera link and the pipeline.
//!
//! A [`VisionSource`] delivers one [`CameraObservation`] per camera per
//! cycle.  Transport faults stop here: [`read_inputs`] logs them and
//! substitutes a "no target visible" snapshot so the gates never see a
//! half-read frame.

use fieldpose_types::{CameraId, CameraObservation, FieldPoseError, VisionInputs};
use tracing::warn;

/// Supplies raw per-camera snapshots.
pub trait VisionSource: Send {
    /// Read the newest snapshot for `camera`.
    ///
    /// # Errors
    ///
    /// [`FieldPoseError::Transport`] when the link faulted or returned a
    /// malformed frame.
    fn read_camera(&mut self, camera: CameraId) -> Result<CameraObservation, FieldPoseError>;
}

/// Refresh `inputs` from `source`, one camera at a time.
///
/// Returns the number of cameras whose read faulted this cycle.
pub fn read_inputs(source: &mut dyn VisionSource, inputs: &mut VisionInputs) -> usize {
    let mut faults = 0;
    for camera in CameraId::ALL {
        *inputs.camera_mut(camera) = match source.read_camera(camera) {
            Ok(observation) => observation,
            Err(e) => {
                warn!(
                    camera = camera.label(),
                    error = %e,
                    "camera read failed; treating as no target"
                );
                faults += 1;
                CameraObservation::not_visible()
            }
        };
    }
    faults
}
