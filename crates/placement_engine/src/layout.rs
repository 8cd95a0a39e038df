//! On-disk form of the registry's descriptor list.

use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::geometry::Pose;
use crate::placement::Descriptor;

pub const LAYOUT_SAVE_VERSION: u32 = 1;
pub const LAYOUT_FILE_NAME: &str = "layout.json";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("read layout '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write layout '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encode layout json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("parse layout json{}: {message}", at_path(.path))]
    Parse { path: String, message: String },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

fn at_path(path: &str) -> String {
    if path.is_empty() || path == "." {
        String::new()
    } else {
        format!(" at {path}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SavedVec3 {
    fn from_vec3(value: Vec3) -> Self {
        Self {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }

    fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl SavedQuat {
    fn from_quat(value: Quat) -> Self {
        Self {
            x: value.x,
            y: value.y,
            z: value.z,
            w: value.w,
        }
    }

    fn to_quat(self) -> Quat {
        Quat::from_xyzw(self.x, self.y, self.z, self.w).normalize()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedDescriptor {
    pub template_id: String,
    pub position: SavedVec3,
    pub orientation: SavedQuat,
    pub category: String,
}

impl SavedDescriptor {
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        Self {
            template_id: descriptor.template_id.clone(),
            position: SavedVec3::from_vec3(descriptor.pose.position),
            orientation: SavedQuat::from_quat(descriptor.pose.orientation),
            category: descriptor.category.clone(),
        }
    }

    pub fn to_descriptor(&self) -> Descriptor {
        Descriptor {
            template_id: self.template_id.clone(),
            pose: Pose::new(self.position.to_vec3(), self.orientation.to_quat()),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutFile {
    pub save_version: u32,
    pub descriptors: Vec<SavedDescriptor>,
}

impl LayoutFile {
    pub fn from_descriptors(descriptors: &[Descriptor]) -> Self {
        Self {
            save_version: LAYOUT_SAVE_VERSION,
            descriptors: descriptors
                .iter()
                .map(SavedDescriptor::from_descriptor)
                .collect(),
        }
    }

    pub fn to_descriptors(&self) -> Vec<Descriptor> {
        self.descriptors
            .iter()
            .map(SavedDescriptor::to_descriptor)
            .collect()
    }
}

pub fn layout_file_path(saves_dir: &Path) -> PathBuf {
    saves_dir.join(LAYOUT_FILE_NAME)
}

pub fn save_layout(path: &Path, descriptors: &[Descriptor]) -> Result<(), LayoutError> {
    let layout = LayoutFile::from_descriptors(descriptors);
    let json = serde_json::to_string_pretty(&layout).map_err(LayoutError::Encode)?;
    write_replacing(path, &json).map_err(|source| LayoutError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        descriptor_count = layout.descriptors.len(),
        "layout_saved"
    );
    Ok(())
}

// Readers see either the previous layout or the new one, never a partial write.
fn write_replacing(path: &Path, json: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json)?;
    fs::rename(&staging, path).inspect_err(|_| {
        let _ = fs::remove_file(&staging);
    })
}

/// Returns `Ok(None)` when no layout has been saved yet.
pub fn load_layout(path: &Path) -> Result<Option<Vec<Descriptor>>, LayoutError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LayoutError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let layout = parse_layout_json(&raw)?;
    validate_layout(&layout)?;
    info!(
        path = %path.display(),
        descriptor_count = layout.descriptors.len(),
        "layout_loaded"
    );
    Ok(Some(layout.to_descriptors()))
}

pub fn parse_layout_json(raw: &str) -> Result<LayoutFile, LayoutError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, LayoutFile>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        LayoutError::Parse {
            path,
            message: error.into_inner().to_string(),
        }
    })
}

fn invalid(path: impl Into<String>, message: impl Into<String>) -> LayoutError {
    LayoutError::Invalid {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(
    path: impl Into<String>,
    expected: impl Display,
    actual: impl Display,
) -> LayoutError {
    invalid(path, format!("expected {expected}, got {actual}"))
}

pub fn validate_layout(layout: &LayoutFile) -> Result<(), LayoutError> {
    if layout.save_version != LAYOUT_SAVE_VERSION {
        return Err(expected_actual(
            "saveVersion",
            LAYOUT_SAVE_VERSION,
            layout.save_version,
        ));
    }

    for (index, descriptor) in layout.descriptors.iter().enumerate() {
        if descriptor.template_id.trim().is_empty() {
            return Err(invalid(
                format!("descriptors[{index}].templateId"),
                "must not be empty",
            ));
        }

        let position = descriptor.position;
        for (axis, value) in [("x", position.x), ("y", position.y), ("z", position.z)] {
            if !value.is_finite() {
                return Err(expected_actual(
                    format!("descriptors[{index}].position.{axis}"),
                    "finite number",
                    value,
                ));
            }
        }

        let orientation = descriptor.orientation;
        let components = [
            ("x", orientation.x),
            ("y", orientation.y),
            ("z", orientation.z),
            ("w", orientation.w),
        ];
        for (axis, value) in components {
            if !value.is_finite() {
                return Err(expected_actual(
                    format!("descriptors[{index}].orientation.{axis}"),
                    "finite number",
                    value,
                ));
            }
        }
        let norm_squared = components.iter().map(|(_, value)| value * value).sum::<f32>();
        if norm_squared <= f32::EPSILON {
            return Err(invalid(
                format!("descriptors[{index}].orientation"),
                "quaternion must have non-zero length",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(template_id: &str, x: f32, yaw: f32) -> Descriptor {
        Descriptor {
            template_id: template_id.to_string(),
            pose: Pose::new(Vec3::new(x, 0.0, -1.0), Quat::from_rotation_y(yaw)),
            category: "storage".to_string(),
        }
    }

    #[test]
    fn saved_layout_loads_back_with_the_same_poses() {
        let temp = tempfile::tempdir().expect("temp");
        let path = layout_file_path(&temp.path().join("saves"));
        let descriptors = vec![descriptor("shelf", 1.0, 0.0), descriptor("bin", -2.5, 1.2)];

        save_layout(&path, &descriptors).expect("save");
        let loaded = load_layout(&path).expect("load").expect("layout present");

        assert_eq!(loaded.len(), 2);
        for (expected, actual) in descriptors.iter().zip(&loaded) {
            assert_eq!(expected.template_id, actual.template_id);
            assert_eq!(expected.category, actual.category);
            assert!(expected.pose.approx_eq(&actual.pose, 1.0e-6));
        }
    }

    #[test]
    fn saving_twice_replaces_the_file_without_leftovers() {
        let temp = tempfile::tempdir().expect("temp");
        let saves = temp.path().join("saves");
        let path = layout_file_path(&saves);

        save_layout(&path, &[descriptor("shelf", 0.0, 0.0)]).expect("first save");
        save_layout(&path, &[]).expect("second save");

        let loaded = load_layout(&path).expect("load").expect("layout present");
        assert!(loaded.is_empty());
        let entries = fs::read_dir(&saves).expect("saves dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let temp = tempfile::tempdir().expect("temp");
        let loaded = load_layout(&temp.path().join("absent.json")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn json_uses_camel_case_template_id() {
        let layout = LayoutFile::from_descriptors(&[descriptor("counter", 0.0, 0.0)]);
        let json = serde_json::to_string(&layout).expect("encode");
        assert!(json.contains("\"templateId\":\"counter\""));
        assert!(json.contains("\"saveVersion\":1"));
    }

    #[test]
    fn parse_error_reports_json_path() {
        let raw = r#"{
            "saveVersion": 1,
            "descriptors": [
                {
                    "templateId": "shelf",
                    "position": { "x": 0.0, "y": 0.0, "z": "far" },
                    "orientation": { "x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0 },
                    "category": "storage"
                }
            ]
        }"#;
        let error = parse_layout_json(raw).expect_err("bad number");
        match error {
            LayoutError::Parse { path, .. } => assert_eq!(path, "descriptors[0].position.z"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut layout = LayoutFile::from_descriptors(&[]);
        layout.save_version = 7;
        let error = validate_layout(&layout).expect_err("version");
        assert_eq!(
            error.to_string(),
            "validation failed at saveVersion: expected 1, got 7"
        );
    }

    #[test]
    fn zero_quaternion_and_empty_id_are_rejected() {
        let mut layout = LayoutFile::from_descriptors(&[
            descriptor("shelf", 0.0, 0.0),
            descriptor("bin", 2.0, 0.0),
        ]);
        layout.descriptors[1].orientation = SavedQuat {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
        };
        let error = validate_layout(&layout).expect_err("zero quat");
        assert!(error.to_string().contains("descriptors[1].orientation"));

        layout.descriptors[1].orientation = SavedQuat::from_quat(Quat::IDENTITY);
        layout.descriptors[0].template_id = "  ".to_string();
        let error = validate_layout(&layout).expect_err("empty id");
        assert!(error.to_string().contains("descriptors[0].templateId"));
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let mut layout = LayoutFile::from_descriptors(&[descriptor("shelf", 0.0, 0.0)]);
        layout.descriptors[0].position.y = f32::INFINITY;
        let error = validate_layout(&layout).expect_err("non-finite");
        assert_eq!(
            error.to_string(),
            "validation failed at descriptors[0].position.y: expected finite number, got inf"
        );
    }

    #[test]
    fn unknown_top_level_shape_reports_root_error() {
        let error = parse_layout_json("[]").expect_err("not an object");
        let message = error.to_string();
        assert!(message.starts_with("parse layout json: "), "{message}");
    }
}
