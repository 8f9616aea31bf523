use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::CodecError;

/// Largest upload kept after compression.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Longest side of an uploaded image after downscaling.
pub const MAX_IMAGE_DIMENSION: u32 = 1920;
/// JPEG quality used when re-encoding uploads.
pub const DEFAULT_IMAGE_QUALITY: u8 = 92;

/// True for inline `data:` URLs, the only payloads worth compressing.
pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Decoded size of a base64 data URL, computed from its text length.
pub fn estimate_data_url_bytes(data_url: &str) -> usize {
    let payload = data_url.split_once(',').map(|(_, p)| p).unwrap_or("");
    let padding = payload.len() - payload.trim_end_matches('=').len();
    (payload.len() * 3 / 4).saturating_sub(padding)
}

/// A parsed `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub data: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn parse(url: &str) -> Result<Self, CodecError> {
        let rest = url.strip_prefix("data:").ok_or(CodecError::InvalidDataUrl)?;
        let (meta, payload) = rest.split_once(',').ok_or(CodecError::InvalidDataUrl)?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or(CodecError::InvalidDataUrl)?;
        let data = STANDARD
            .decode(payload.trim())
            .map_err(|_| CodecError::InvalidDataUrl)?;
        Ok(Self::new(mime, data))
    }

    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }
}

/// Shrinks images so they fit a byte budget.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Return a data URL whose decoded payload is at most `max_bytes`.
    ///
    /// Inputs already within budget come back unchanged.
    async fn compress_to_max_bytes(&self, data_url: &str, max_bytes: usize)
        -> Result<String, CodecError>;
}

/// An upload ready to be used as the working image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub data_url: String,
    pub original_size: usize,
    pub final_size: usize,
}

impl PreparedImage {
    pub fn compression_ratio(&self) -> f64 {
        if self.final_size == 0 {
            return 0.0;
        }
        self.original_size as f64 / self.final_size as f64
    }
}

/// True for the MIME types accepted as uploads.
pub fn is_supported_upload(mime: &str) -> bool {
    matches!(
        mime.trim().to_ascii_lowercase().as_str(),
        "image/png" | "image/jpeg" | "image/jpg"
    )
}

/// Re-encodes images as JPEG at decreasing quality until they fit.
///
/// Encoding runs on the blocking pool so it does not stall other tasks.
/// The same codec prepares uploads: downscale, re-encode, then compress.
#[derive(Debug, Clone)]
pub struct JpegCodec {
    start_quality: u8,
    quality_step: u8,
    min_quality: u8,
    max_dimension: u32,
    upload_quality: u8,
    max_upload_bytes: usize,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self {
            start_quality: 90,
            quality_step: 10,
            min_quality: 10,
            max_dimension: MAX_IMAGE_DIMENSION,
            upload_quality: DEFAULT_IMAGE_QUALITY,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl JpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quality range to walk, from `start` down to `min` in steps of `step`.
    pub fn with_quality_range(mut self, start: u8, min: u8, step: u8) -> Self {
        self.start_quality = start.clamp(1, 100);
        self.min_quality = min.clamp(1, self.start_quality);
        self.quality_step = step.max(1);
        self
    }

    /// Limits applied by [`prepare_upload`](Self::prepare_upload).
    pub fn with_upload_limits(mut self, max_dimension: u32, quality: u8, max_bytes: usize) -> Self {
        self.max_dimension = max_dimension.max(1);
        self.upload_quality = quality.clamp(1, 100);
        self.max_upload_bytes = max_bytes;
        self
    }

    /// Turn an uploaded PNG or JPEG file into a JPEG data URL.
    ///
    /// The image is scaled so its longest side is at most the configured
    /// dimension, re-encoded, then compressed to the upload byte limit.
    pub fn prepare_upload(&self, bytes: &[u8], mime: &str) -> Result<PreparedImage, CodecError> {
        if !is_supported_upload(mime) {
            return Err(CodecError::InvalidFormat {
                mime: mime.to_string(),
            });
        }

        let img = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        let img = self.downscale(img);
        let encoded = DataUrl::new("image/jpeg", encode_jpeg(&img, self.upload_quality)?).encode();
        let data_url = self.compress_blocking(&encoded, self.max_upload_bytes)?;

        let prepared = PreparedImage {
            final_size: estimate_data_url_bytes(&data_url),
            original_size: bytes.len(),
            data_url,
        };
        tracing::debug!(
            original = prepared.original_size,
            prepared = prepared.final_size,
            "Prepared upload"
        );
        Ok(prepared)
    }

    fn downscale(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let longest = width.max(height);
        if longest <= self.max_dimension {
            return img;
        }
        let scale = self.max_dimension as f64 / longest as f64;
        let new_width = ((width as f64 * scale).round() as u32).max(1);
        let new_height = ((height as f64 * scale).round() as u32).max(1);
        img.resize_exact(new_width, new_height, FilterType::Triangle)
    }

    /// Synchronous form of [`ImageCodec::compress_to_max_bytes`].
    pub fn compress_blocking(&self, data_url: &str, max_bytes: usize) -> Result<String, CodecError> {
        if estimate_data_url_bytes(data_url) <= max_bytes {
            return Ok(data_url.to_string());
        }

        let parsed = DataUrl::parse(data_url)?;
        let rgb = image::load_from_memory(&parsed.data)
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .to_rgb8();

        let mut quality = self.start_quality;
        loop {
            let buf = encode_rgb(&rgb, quality)?;

            if buf.len() <= max_bytes {
                tracing::debug!(quality, bytes = buf.len(), max_bytes, "Re-encoded image");
                return Ok(DataUrl::new("image/jpeg", buf).encode());
            }
            if quality <= self.min_quality {
                break;
            }
            quality = quality
                .saturating_sub(self.quality_step)
                .max(self.min_quality);
        }

        Err(CodecError::TooLarge { max_bytes })
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    encode_rgb(&img.to_rgb8(), quality)
}

fn encode_rgb(rgb: &image::RgbImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(rgb)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

#[async_trait]
impl ImageCodec for JpegCodec {
    async fn compress_to_max_bytes(
        &self,
        data_url: &str,
        max_bytes: usize,
    ) -> Result<String, CodecError> {
        if estimate_data_url_bytes(data_url) <= max_bytes {
            return Ok(data_url.to_string());
        }

        let codec = self.clone();
        let data_url = data_url.to_string();
        tokio::task::spawn_blocking(move || codec.compress_blocking(&data_url, max_bytes))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))?
    }
}
