// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! framelink — real-time camera → WebSocket → display streaming pipeline.
//!
//! Captures frames from a local camera, ships them to a processing service
//! over a persistent WebSocket as JPEG data-URIs, and renders the service's
//! asynchronous results — a processed frame plus an ephemeral cropped
//! sub-frame that decays when the service stops refreshing it.
//!
//! ```ignore
//! use framelink::{PipelineConfig, StreamPipeline};
//!
//! let mut pipeline = StreamPipeline::new(PipelineConfig::default());
//! pipeline.start().await?;
//! // ... poll pipeline.display() from the UI layer ...
//! pipeline.teardown();
//! ```
//!
//! Delivery is best-effort by design: frames are dropped, never queued, when
//! the channel is not open, and a lost connection stays lost until the owner
//! builds a fresh pipeline.

pub mod core;

// Linux platform services (V4L2 capture)
#[cfg(target_os = "linux")]
pub(crate) mod linux;

pub use core::{
    acquire_source, is_image_data_uri, ChannelState, DisplayState, EncodedFrame, FrameEncoder,
    FrameSource, FrameSourceKind, LiveBuffer, PipelineConfig, PipelineError, RawFrame, Result,
    ResultRenderer, StreamPipeline, TestPatternSource, TransportChannel, CROPPED_DECAY,
    DEFAULT_SERVICE_URL, TICK_INTERVAL,
};
