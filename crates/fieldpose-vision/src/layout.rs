//! Field layout: where each fiducial sits in field coordinates.
//!
//! The gyro fallback path needs the absolute pose of the single tag it saw.
//! [`FieldLayout`] is the seam; [`TagLayout`] is the JSON-backed
//! implementation loaded at startup.
//!
//! ```json
//! [
//!   { "id": 7, "pose": { "x": 8.0, "y": 4.0, "z": 0.5, "roll": 0.0, "pitch": 0.0, "yaw": 3.14159 } }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use fieldpose_types::{FieldPoseError, Pose3d};
use serde::{Deserialize, Serialize};

/// Looks up the field pose of a fiducial by id.
pub trait FieldLayout: Send + Sync {
    fn tag_pose(&self, id: i32) -> Option<Pose3d>;
}

/// One entry of the layout file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub id: i32,
    pub pose: Pose3d,
}

/// In-memory tag table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagLayout {
    tags: HashMap<i32, Pose3d>,
}

impl TagLayout {
    /// A layout with no tags; the gyro fallback never succeeds against it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = TagEntry>) -> Self {
        Self {
            tags: entries.into_iter().map(|e| (e.id, e.pose)).collect(),
        }
    }

    /// Parse a JSON array of [`TagEntry`].
    pub fn from_json_str(json: &str) -> Result<Self, FieldPoseError> {
        let entries: Vec<TagEntry> =
            serde_json::from_str(json).map_err(|e| FieldPoseError::Layout(e.to_string()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> Result<Self, FieldPoseError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FieldPoseError::Layout(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FieldLayout for TagLayout {
    fn tag_pose(&self, id: i32) -> Option<Pose3d> {
        self.tags.get(&id).copied()
    }
}
