// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Streaming pipeline
//!
//! Owns the four moving parts — frame source, encoder, transport channel,
//! result renderer — and the two timers that drive them. `start` acquires
//! the camera, then dials the service in the background; the streaming loop
//! begins only once the channel reports ready. `teardown` releases
//! everything in a fixed order: streaming timer, decay timer, transport,
//! camera. Every step is a no-op if its resource never came up.
//!
//! There is no automatic retry or reconnection here. When the connection is
//! gone, the pipeline idles until the owner builds a fresh instance.

use crate::core::channel::{ChannelState, TransportChannel};
use crate::core::config::PipelineConfig;
use crate::core::encoder::FrameEncoder;
use crate::core::error::{PipelineError, Result};
use crate::core::renderer::{DisplayState, ResultRenderer};
use crate::core::source::{acquire_source, FrameSource};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

/// One camera-to-service streaming session.
///
/// Single-use: after [`teardown`](StreamPipeline::teardown) the instance is
/// inert and a new one must be built to stream again.
pub struct StreamPipeline {
    config: PipelineConfig,
    channel: TransportChannel,
    renderer: ResultRenderer,
    source: Option<Box<dyn FrameSource>>,
    startup_task: Option<JoinHandle<()>>,
    ticker_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    running: Arc<AtomicBool>,
    started: bool,
    torn_down: bool,
}

impl StreamPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let renderer = ResultRenderer::new(config.cropped_decay);
        Self {
            config,
            channel: TransportChannel::new(),
            renderer,
            source: None,
            startup_task: None,
            ticker_task: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            started: false,
            torn_down: false,
        }
    }

    /// Acquires the camera and starts connecting to the service.
    ///
    /// Camera acquisition failure aborts startup entirely — the channel is
    /// never dialed — and is returned to the caller. The dial itself runs in
    /// the background: streaming begins when the channel opens, and a failed
    /// dial leaves the pipeline idle with the error logged.
    ///
    /// Must be called from within the tokio runtime.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "pipeline already started; build a new instance to stream again"
            )));
        }
        self.started = true;

        info!(
            "[Pipeline] starting ({}x{} @ {:?} to {})",
            self.config.frame_width,
            self.config.frame_height,
            self.config.tick_interval,
            self.config.service_url
        );

        let source = acquire_source(&self.config)?;
        let live = source.live_buffer();
        self.source = Some(source);
        self.running.store(true, Ordering::SeqCst);

        let renderer = self.renderer.clone();
        self.channel.on_message(move |raw| renderer.on_message(raw));
        self.channel.on_error(|error| {
            error!("[Pipeline] transport error: {}", error);
        });
        self.channel.on_close(|| {
            info!("[Pipeline] service connection closed");
        });

        // Streaming loop arms only when the channel reports ready.
        let encoder = FrameEncoder::new(
            self.config.frame_width,
            self.config.frame_height,
            self.config.jpeg_quality,
        );
        let tick_interval = self.config.tick_interval;
        let send_channel = self.channel.clone();
        let ticker_slot = Arc::clone(&self.ticker_task);
        let running = Arc::clone(&self.running);
        self.channel.on_ready(move || {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            debug!("[Pipeline] channel ready; starting streaming loop");
            let ticker = tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(
                    tokio::time::Instant::now() + tick_interval,
                    tick_interval,
                );
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    match encoder.sample(&live) {
                        Some(frame) => send_channel.send(frame.as_str()),
                        None => trace!("[Pipeline] no frame ready; skipping tick"),
                    }
                }
            });
            *ticker_slot.lock() = Some(ticker);
        });

        let connect_channel = self.channel.clone();
        let url = self.config.service_url.clone();
        self.startup_task = Some(tokio::spawn(async move {
            if let Err(e) = connect_channel.connect(&url).await {
                error!("[Pipeline] connect failed: {}", e);
            }
        }));

        Ok(())
    }

    /// Current display snapshot for the consumer to render.
    pub fn display(&self) -> DisplayState {
        self.renderer.display()
    }

    /// Latest processed frame, toggle-independent.
    pub fn processed_image(&self) -> Option<String> {
        self.renderer.processed_image()
    }

    /// Current cropped slot value, ungated by the visibility toggle.
    pub fn cropped_image(&self) -> Option<String> {
        self.renderer.cropped_image()
    }

    /// Flips cropped-slot visibility. Never touches the slots or the decay
    /// timer.
    pub fn set_show_cropped(&self, show: bool) {
        self.renderer.set_show_cropped(show);
    }

    pub fn show_cropped(&self) -> bool {
        self.renderer.show_cropped()
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Frames dropped because the channel was not Open at tick time.
    pub fn dropped_frames(&self) -> u64 {
        self.channel.dropped_frames()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tears the session down: streaming timer, decay timer, transport,
    /// camera, in that order. Idempotent, and safe even if acquisition or
    /// the dial never completed.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("[Pipeline] tearing down");
        self.running.store(false, Ordering::SeqCst);

        // 1. Streaming timer: no further ticks, no further sends.
        if let Some(startup) = self.startup_task.take() {
            startup.abort();
        }
        if let Some(ticker) = self.ticker_task.lock().take() {
            ticker.abort();
        }

        // 2. Decay timer.
        self.renderer.stop_decay();

        // 3. Transport.
        self.channel.close();

        // 4. Camera.
        if let Some(mut source) = self.source.take() {
            source.release();
        }

        info!("[Pipeline] teardown complete");
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
