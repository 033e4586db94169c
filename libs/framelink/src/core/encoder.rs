// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! JPEG frame encoding
//!
//! Samples the live buffer, scales the frame to the target resolution, and
//! produces the `data:image/jpeg;base64,` payload sent on every tick. Each
//! call is stateless: nothing is carried between cycles beyond the source
//! buffer itself.

use crate::core::frame::{EncodedFrame, RawFrame};
use crate::core::source::LiveBuffer;
use crate::core::{PipelineError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tracing::warn;

/// Encodes raw frames at a fixed target resolution and JPEG quality.
pub struct FrameEncoder {
    width: u32,
    height: u32,
    quality: u8,
}

impl FrameEncoder {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
        }
    }

    /// Samples the live buffer and encodes the current frame.
    ///
    /// Returns `None` when the source has not published a frame yet, or when
    /// the frame fails to encode. The caller skips the cycle either way; a
    /// miss is not an error.
    pub fn sample(&self, buffer: &LiveBuffer) -> Option<EncodedFrame> {
        let frame = buffer.lock().clone()?;
        match self.encode(&frame) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                warn!("[Encoder] dropping frame: {}", e);
                None
            }
        }
    }

    /// Encodes one raw frame into a self-describing data-URI.
    ///
    /// Frames whose native size differs from the target are resized first.
    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame> {
        if frame.data.len() != frame.expected_len() {
            return Err(PipelineError::EncodingError(format!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            )));
        }

        let image: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
                || PipelineError::EncodingError("frame buffer does not match dimensions".into()),
            )?;
        let image = if (frame.width, frame.height) == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image)
            .map_err(|e| PipelineError::EncodingError(e.to_string()))?;

        Ok(EncodedFrame::from_data_uri(format!(
            "data:image/jpeg;base64,{}",
            BASE64_STANDARD.encode(&jpeg)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::is_image_data_uri;
    use image::GenericImageView;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> RawFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgb);
        }
        RawFrame {
            width,
            height,
            data,
        }
    }

    fn decode_jpeg_body(encoded: &EncodedFrame) -> image::DynamicImage {
        let body = encoded
            .as_str()
            .strip_prefix("data:image/jpeg;base64,")
            .expect("payload must carry the jpeg data-URI prefix");
        let jpeg = BASE64_STANDARD.decode(body).expect("body must be base64");
        image::load_from_memory(&jpeg).expect("body must decode as an image")
    }

    #[test]
    fn test_encodes_valid_data_uri_at_target_resolution() {
        let encoder = FrameEncoder::new(640, 480, 70);
        let encoded = encoder.encode(&solid_frame(640, 480, [10, 200, 60])).unwrap();
        assert!(is_image_data_uri(encoded.as_str()));
        assert_eq!(decode_jpeg_body(&encoded).dimensions(), (640, 480));
    }

    #[test]
    fn test_resizes_native_frames_to_target() {
        let encoder = FrameEncoder::new(640, 480, 70);
        let encoded = encoder.encode(&solid_frame(320, 240, [128, 0, 255])).unwrap();
        assert_eq!(decode_jpeg_body(&encoded).dimensions(), (640, 480));
    }

    #[test]
    fn test_encode_is_stateless_across_calls() {
        let encoder = FrameEncoder::new(64, 48, 70);
        let frame = solid_frame(64, 48, [1, 2, 3]);
        let first = encoder.encode(&frame).unwrap();
        let second = encoder.encode(&frame).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_mismatched_buffer_length() {
        let encoder = FrameEncoder::new(640, 480, 70);
        let bad = RawFrame {
            width: 640,
            height: 480,
            data: vec![0; 10],
        };
        assert!(matches!(
            encoder.encode(&bad),
            Err(PipelineError::EncodingError(_))
        ));
    }

    #[test]
    fn test_sample_skips_when_no_frame_published() {
        let encoder = FrameEncoder::new(640, 480, 70);
        let empty: LiveBuffer = Arc::new(Mutex::new(None));
        assert!(encoder.sample(&empty).is_none());
    }

    #[test]
    fn test_sample_encodes_published_frame() {
        let encoder = FrameEncoder::new(64, 48, 70);
        let buffer: LiveBuffer = Arc::new(Mutex::new(Some(solid_frame(64, 48, [9, 9, 9]))));
        let encoded = encoder.sample(&buffer).expect("published frame must encode");
        assert!(is_image_data_uri(encoded.as_str()));
    }
}
