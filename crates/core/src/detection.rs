//! Person / face detection result model.
//!
//! Serialized with the camelCase field names the dashboard consumes
//! (`peopleFromObjects`, `facesDetected`, `boundingBox`).

use serde::{Deserialize, Serialize};

/// Object label the vision service uses for people.
pub const PERSON_LABEL: &str = "person";

/// A vertex in normalized `[0, 1]` image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// A vertex in pixel coordinates of the analyzed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelVertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// One localized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    /// Quad in clockwise order starting top-left.
    pub bounding_box: Vec<NormalizedVertex>,
}

impl DetectedObject {
    pub fn is_person(&self) -> bool {
        self.name.eq_ignore_ascii_case(PERSON_LABEL)
    }
}

/// Likelihood strings as reported by the vision service
/// (`VERY_UNLIKELY` .. `VERY_LIKELY`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceExpressions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorrow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surprise: Option<String>,
}

/// One detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    pub confidence: f64,
    pub bounding_box: Vec<PixelVertex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions: Option<FaceExpressions>,
}

/// Output of one detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// `max(people_from_objects, faces_detected)`.
    pub people: u32,
    pub people_from_objects: u32,
    pub faces_detected: u32,
    pub objects: Vec<DetectedObject>,
    pub faces: Vec<DetectedFace>,
}

impl DetectionResult {
    /// Build a result from raw annotations, deriving all counts.
    ///
    /// The people count is the larger of the person-object count and the
    /// face count.
    pub fn from_annotations(objects: Vec<DetectedObject>, faces: Vec<DetectedFace>) -> Self {
        let people_from_objects = objects.iter().filter(|o| o.is_person()).count() as u32;
        let faces_detected = faces.len() as u32;
        Self {
            people: people_from_objects.max(faces_detected),
            people_from_objects,
            faces_detected,
            objects,
            faces,
        }
    }

    pub fn empty() -> Self {
        Self::from_annotations(Vec::new(), Vec::new())
    }

    pub fn person_objects(&self) -> impl Iterator<Item = &DetectedObject> {
        self.objects.iter().filter(|o| o.is_person())
    }
}
