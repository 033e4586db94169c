// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod channel;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod renderer;
pub mod source;

pub use channel::{ChannelState, TransportChannel};
pub use config::{
    FrameSourceKind, PipelineConfig, CROPPED_DECAY, DEFAULT_SERVICE_URL, TICK_INTERVAL,
};
pub use encoder::FrameEncoder;
pub use error::{PipelineError, Result};
pub use frame::{is_image_data_uri, EncodedFrame, RawFrame};
pub use pipeline::StreamPipeline;
pub use renderer::{DisplayState, ResultRenderer};
pub use source::{acquire_source, FrameSource, LiveBuffer, TestPatternSource};
