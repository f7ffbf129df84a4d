//! REST client for the Google Cloud Vision `images:annotate` endpoint.
//!
//! One request carries both `OBJECT_LOCALIZATION` and `FACE_DETECTION`
//! features. There are no retries: a failed call surfaces as a
//! [`DetectionError`] and the caller decides what to do with it.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crowdwatch_core::detection::{
    DetectedFace, DetectedObject, DetectionResult, FaceExpressions, NormalizedVertex, PixelVertex,
};
use crowdwatch_core::frame::{self, FrameError};

/// Public endpoint of the Vision API.
pub const DEFAULT_VISION_URL: &str = "https://vision.googleapis.com";

/// Upper bound on annotations requested per feature.
pub const MAX_RESULTS: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from a detection call.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// No API key is configured. No request was made.
    #[error("Vision API not configured")]
    Unconfigured,

    /// The image payload was missing or not decodable.
    #[error("invalid image: {0}")]
    BadRequest(String),

    /// The service answered with an error.
    #[error("Vision API error (status {status:?}): {message}")]
    UpstreamError {
        status: Option<u16>,
        message: String,
    },

    /// The request never produced a response.
    #[error("Vision API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<FrameError> for DetectionError {
    fn from(err: FrameError) -> Self {
        DetectionError::BadRequest(err.to_string())
    }
}

/// Strip an optional `data:image/<fmt>;base64,` prefix and decode.
///
/// Empty or undecodable input is a [`DetectionError::BadRequest`].
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, DetectionError> {
    Ok(frame::decode_image_payload(payload)?)
}

/// Seam through which frames are submitted for detection.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, DetectionError>;

    /// Whether a call could possibly succeed (credentials present).
    fn is_configured(&self) -> bool {
        true
    }
}

/// HTTP client for the Vision API.
pub struct VisionApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl VisionApi {
    /// * `base_url` - e.g. [`DEFAULT_VISION_URL`]; a trailing slash is ignored.
    /// * `api_key` - `None` (or blank) leaves the client unconfigured.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, base_url, api_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn request_body(image: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "requests": [{
                "image": { "content": base64::engine::general_purpose::STANDARD.encode(image) },
                "features": [
                    { "type": "OBJECT_LOCALIZATION", "maxResults": MAX_RESULTS },
                    { "type": "FACE_DETECTION", "maxResults": MAX_RESULTS },
                ],
            }],
        })
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DetectionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        // Google wraps errors as {"error": {"message": ...}}.
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or(body);
        Err(DetectionError::UpstreamError {
            status: Some(status.as_u16()),
            message,
        })
    }
}

#[async_trait]
impl Detector for VisionApi {
    async fn detect(&self, image: &[u8]) -> Result<DetectionResult, DetectionError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(DetectionError::Unconfigured);
        };
        if image.is_empty() {
            return Err(DetectionError::BadRequest("image is empty".into()));
        }

        let response = self
            .client
            .post(format!("{}/v1/images:annotate", self.base_url))
            .query(&[("key", key)])
            .json(&Self::request_body(image))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let batch: BatchResponse = response.json().await?;

        let result = into_detection(batch)?;
        tracing::debug!(
            people = result.people,
            people_from_objects = result.people_from_objects,
            faces = result.faces_detected,
            "Vision detection completed",
        );
        Ok(result)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: WireStatus,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    localized_object_annotations: Vec<ObjectAnnotation>,
    #[serde(default)]
    face_annotations: Vec<FaceAnnotation>,
    #[serde(default)]
    error: Option<WireStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectAnnotation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaceAnnotation {
    #[serde(default)]
    detection_confidence: f64,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
    joy_likelihood: Option<String>,
    sorrow_likelihood: Option<String>,
    anger_likelihood: Option<String>,
    surprise_likelihood: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<PixelVertex>,
    #[serde(default)]
    normalized_vertices: Vec<NormalizedVertex>,
}

fn into_detection(batch: BatchResponse) -> Result<DetectionResult, DetectionError> {
    let Some(response) = batch.responses.into_iter().next() else {
        return Err(DetectionError::UpstreamError {
            status: None,
            message: "No response from Vision API".into(),
        });
    };
    if let Some(error) = response.error {
        return Err(DetectionError::UpstreamError {
            status: None,
            message: error
                .message
                .unwrap_or_else(|| "image annotation failed".into()),
        });
    }

    let objects = response
        .localized_object_annotations
        .into_iter()
        .map(|o| DetectedObject {
            name: o.name,
            confidence: o.score,
            bounding_box: o
                .bounding_poly
                .map(|p| p.normalized_vertices)
                .unwrap_or_default(),
        })
        .collect();

    let faces = response
        .face_annotations
        .into_iter()
        .map(|f| DetectedFace {
            confidence: f.detection_confidence,
            bounding_box: f.bounding_poly.map(|p| p.vertices).unwrap_or_default(),
            expressions: Some(FaceExpressions {
                joy: f.joy_likelihood,
                sorrow: f.sorrow_likelihood,
                anger: f.anger_likelihood,
                surprise: f.surprise_likelihood,
            }),
        })
        .collect();

    Ok(DetectionResult::from_annotations(objects, faces))
}
