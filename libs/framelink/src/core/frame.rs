// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// Frame value types shared by the source, encoder, and renderer.

use std::fmt;

/// One uncompressed camera sample: packed RGB24, row-major, top-left origin.
///
/// Produced by a frame source backend, consumed by the encoder. Never leaves
/// the process; the wire format is [`EncodedFrame`].
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Packed RGB24 pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Byte length implied by the stated dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// One compressed image in self-describing data-URI form
/// (`data:image/jpeg;base64,...`).
///
/// Created fresh every encoding cycle; has no identity beyond its content and
/// is not retained after send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame(String);

impl EncodedFrame {
    pub(crate) fn from_data_uri(uri: String) -> Self {
        Self(uri)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Length of the full data-URI string in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true if `value` looks like a base64 image data-URI.
///
/// The renderer gates cropped-slot display on this check; values that fail it
/// are suppressed without touching display state.
pub fn is_image_data_uri(value: &str) -> bool {
    value.starts_with("data:image/") && value.contains("base64,")
}
