//! Pipeline Configuration Types
//!
//! This module defines the configuration passed to [`StreamPipeline::new`].
//! All values default to the reference deployment (640x480 JPEG frames at
//! 5 fps against a local processing service).
//!
//! [`StreamPipeline::new`]: crate::core::pipeline::StreamPipeline::new

use std::time::Duration;

/// Default service address for the processing peer.
pub const DEFAULT_SERVICE_URL: &str = "ws://localhost:8000/ws/video";

/// Streaming cadence: one encode-and-send tick every 200 ms.
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Cropped-result decay window: the cropped slot clears if no refresh
/// arrives within this window of the last update.
pub const CROPPED_DECAY: Duration = Duration::from_millis(500);

/// Which frame source backend the pipeline acquires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FrameSourceKind {
    /// Platform camera (V4L2 on Linux). Falls back to an error on
    /// platforms with no camera backend.
    #[default]
    Camera,
    /// Synthetic moving-gradient generator. No device access; used by
    /// tests and by examples on camera-less hosts.
    TestPattern,
}

/// Configuration for a streaming pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// WebSocket address of the processing service
    pub service_url: String,
    /// Frame source backend to acquire
    pub source: FrameSourceKind,
    /// Optional camera device index (Linux: /dev/video{index})
    /// If None, uses device 0
    pub device_index: Option<usize>,
    /// Encoded frame width in pixels
    pub frame_width: u32,
    /// Encoded frame height in pixels
    pub frame_height: u32,
    /// JPEG quality factor, 1-100 (0.7 of max in the reference client)
    pub jpeg_quality: u8,
    /// Period of the encode-and-send tick
    pub tick_interval: Duration,
    /// Inactivity window after which the cropped display slot self-clears
    pub cropped_decay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            source: FrameSourceKind::default(),
            device_index: None,
            frame_width: 640,
            frame_height: 480,
            jpeg_quality: 70,
            tick_interval: TICK_INTERVAL,
            cropped_decay: CROPPED_DECAY,
        }
    }
}

// Note: no timeout is applied to device acquisition or connect. A hung
// attempt holds that resource until the environment intervenes. Known gap,
// kept to match the reference client until product guidance says otherwise.
