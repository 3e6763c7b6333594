//! JSON parameters for a [`Rig`](crate::Rig).

use std::{fs, path::Path};

use marker_rig_core::{Flip, FrameFormat};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_camera_name() -> String {
    "camera".to_string()
}

fn default_true() -> bool {
    true
}

/// Camera controller parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraParams {
    #[serde(default = "default_camera_name")]
    pub name: String,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    #[serde(default)]
    pub auto_start: bool,
    /// Stream layouts. Empty means "ask the frame source".
    #[serde(default)]
    pub streams: Vec<FrameFormat>,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            name: default_camera_name(),
            flip_horizontal: false,
            flip_vertical: false,
            auto_start: false,
            streams: Vec::new(),
        }
    }
}

impl CameraParams {
    /// Flip applied to every captured frame, derived from the mirroring
    /// settings.
    pub fn flip(&self) -> Flip {
        Flip::from_mirroring(self.flip_horizontal, self.flip_vertical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndistortionParams {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl Default for UndistortionParams {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerParams {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Write the last tracked frame set back into the displayed frames.
    #[serde(default)]
    pub copy_back_images: bool,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_start: true,
            copy_back_images: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigParams {
    #[serde(default)]
    pub camera: CameraParams,
    #[serde(default)]
    pub undistortion: UndistortionParams,
    #[serde(default)]
    pub tracker: TrackerParams,
}

impl RigParams {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON config from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let params = RigParams::from_json_str("{}").expect("parse");
        assert_eq!(params, RigParams::default());
        assert_eq!(params.camera.name, "camera");
        assert!(params.tracker.enabled);
        assert!(!params.undistortion.enabled);
        assert_eq!(params.camera.flip(), Flip::Vertical);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let raw = r#"{
            "camera": {
                "flip_horizontal": true,
                "streams": [{ "width": 4, "height": 2, "bytes_per_pixel": 1 }]
            },
            "tracker": { "copy_back_images": true }
        }"#;
        let params = RigParams::from_json_str(raw).expect("parse");
        assert_eq!(params.camera.streams, vec![FrameFormat::gray8(4, 2)]);
        assert_eq!(params.camera.flip(), Flip::Both);
        assert!(!params.camera.auto_start);
        assert!(params.tracker.copy_back_images);
        assert!(params.tracker.auto_start);
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            RigParams::from_json_str("{ \"camera\": 3 }"),
            Err(ConfigError::Json(_))
        ));
    }
}
