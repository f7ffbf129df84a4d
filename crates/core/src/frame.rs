//! Still-frame encoding helpers.
//!
//! Frames travel through the system as JPEG bytes and, on the HTTP
//! surface, as `data:image/jpeg;base64,...` URIs.

use std::sync::OnceLock;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use regex::Regex;

/// JPEG quality used for every sampled frame (0.8 on a 0-1 scale).
pub const JPEG_QUALITY: u8 = 80;

/// Canvas size thumbnails are drawn onto before encoding.
pub const THUMBNAIL_WIDTH: u32 = 1280;
pub const THUMBNAIL_HEIGHT: u32 = 720;

/// Frame size used when a local source reports no dimensions.
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("image payload is empty")]
    Empty,

    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("raw frame has {actual} bytes, expected {expected} for {width}x{height} RGB")]
    RawSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// A JPEG-encoded still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    /// Encode an RGB image at [`JPEG_QUALITY`].
    pub fn encode(image: &RgbImage) -> Result<Self, FrameError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(image)?;
        Ok(Self {
            jpeg,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Wrap tightly packed `rgb24` pixels, as produced by ffmpeg's
    /// `rawvideo` muxer, and encode them.
    pub fn from_raw_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        let actual = pixels.len();
        let image = RgbImage::from_raw(width, height, pixels).ok_or(FrameError::RawSizeMismatch {
            width,
            height,
            expected,
            actual,
        })?;
        Self::encode(&image)
    }

    /// Decode any supported image and redraw it onto a fixed-size canvas.
    pub fn redraw(bytes: &[u8], width: u32, height: u32) -> Result<Self, FrameError> {
        let decoded = image::load_from_memory(bytes)?;
        let resized = decoded.resize_exact(width, height, FilterType::Triangle);
        Self::encode(&DynamicImage::into_rgb8(resized))
    }

    /// Re-read an arbitrary JPEG and capture its dimensions.
    pub fn from_jpeg(jpeg: Vec<u8>) -> Result<Self, FrameError> {
        let decoded = image::load_from_memory(&jpeg)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            jpeg,
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

fn data_uri_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^data:image/\w+;base64,").expect("prefix pattern is valid"))
}

/// Strip an optional data-URI prefix and base64-decode the payload.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, FrameError> {
    let trimmed = payload.trim();
    let base64_part = data_uri_prefix().replace(trimmed, "");
    if base64_part.is_empty() {
        return Err(FrameError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_part.as_bytes())?;
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(bytes)
}
