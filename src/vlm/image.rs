// ABOUTME: Image preparation for vision-model dispatch
// ABOUTME: Decodes uploads, downscales to a bounded thumbnail, re-encodes as JPEG
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Image Preparation
//!
//! Uploaded photos are decoded once, downscaled to fit 1024x1024 and
//! re-encoded as JPEG before dispatch. This bounds the payload (and token
//! cost) for both provider families; providers only ever see the prepared
//! JPEG, never the original upload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView as _;

use crate::errors::{AppError, AppResult};

/// Longest side of the prepared thumbnail, in pixels
const MAX_SIDE: u32 = 1024;

/// JPEG quality for the re-encode
const JPEG_QUALITY: u8 = 85;

/// A decoded, downscaled, JPEG-re-encoded image ready for a provider call
#[derive(Debug, Clone)]
pub struct PreparedImage {
    jpeg: Vec<u8>,
}

impl PreparedImage {
    /// Decode raw upload bytes and prepare them for inference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ErrorCode::InvalidInput`] when the bytes are
    /// not a decodable image, and an internal error if JPEG re-encoding
    /// fails (which indicates a bug, not bad input).
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AppError::invalid_input(format!("Invalid image: {e}")))?;

        let (width, height) = decoded.dimensions();
        let bounded = if width > MAX_SIDE || height > MAX_SIDE {
            decoded.thumbnail(MAX_SIDE, MAX_SIDE)
        } else {
            decoded
        };

        // JPEG has no alpha channel; flatten whatever the upload was
        let rgb = bounded.to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| AppError::internal(format!("JPEG re-encode failed: {e}")))?;

        Ok(Self { jpeg })
    }

    /// Prepared JPEG bytes
    #[must_use]
    pub fn as_jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Base64 of the prepared JPEG, for the Ollama `images` field
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.jpeg)
    }

    /// Data URL of the prepared JPEG, for the OpenAI `image_url` part
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }
}
