// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame sources
//!
//! A frame source owns capture of a live video device (or a synthetic
//! generator) and publishes the most recent sample into a shared live buffer.
//! The encoder samples that buffer synchronously on every tick; the source
//! overwrites it at its own rate. Acquisition happens once per source and any
//! failure is terminal for that source instance.

use crate::core::config::{FrameSourceKind, PipelineConfig};
use crate::core::{RawFrame, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared live buffer: the most recent raw frame published by a source.
/// `None` until the first frame lands and again after release.
pub type LiveBuffer = Arc<Mutex<Option<RawFrame>>>;

/// A continuously live visual buffer suitable for synchronous sampling.
pub trait FrameSource: Send {
    /// Returns the buffer this source publishes into.
    fn live_buffer(&self) -> LiveBuffer;

    /// Stops capture and releases the underlying device.
    ///
    /// Idempotent, and safe to call even if the source never produced a
    /// frame. The live buffer reads `None` afterwards.
    fn release(&mut self);
}

/// Acquires the frame source backend named by the config.
///
/// Camera acquisition failures map to `PermissionDenied` or
/// `DeviceUnavailable` and must be surfaced by the caller; there is no retry.
pub fn acquire_source(config: &PipelineConfig) -> Result<Box<dyn FrameSource>> {
    match config.source {
        FrameSourceKind::TestPattern => Ok(Box::new(TestPatternSource::acquire(
            config.frame_width,
            config.frame_height,
        )?)),
        FrameSourceKind::Camera => {
            #[cfg(target_os = "linux")]
            {
                let index = config.device_index.unwrap_or(0);
                Ok(Box::new(crate::linux::CameraSource::acquire(
                    index,
                    config.frame_width,
                    config.frame_height,
                )?))
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err(crate::core::PipelineError::DeviceUnavailable(
                    "no camera backend on this platform; use FrameSourceKind::TestPattern".into(),
                ))
            }
        }
    }
}

/// Synthetic moving-gradient source.
///
/// Publishes ~30 frames per second without touching any device. Used by tests
/// and by examples on camera-less hosts.
pub struct TestPatternSource {
    buffer: LiveBuffer,
    running: Arc<AtomicBool>,
    generator: Option<std::thread::JoinHandle<()>>,
}

impl TestPatternSource {
    const FRAME_INTERVAL: Duration = Duration::from_millis(33);

    pub fn acquire(width: u32, height: u32) -> Result<Self> {
        let buffer: LiveBuffer = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let thread_buffer = Arc::clone(&buffer);
        let thread_running = Arc::clone(&running);
        let generator = std::thread::Builder::new()
            .name("framelink-pattern".into())
            .spawn(move || {
                let mut tick: u32 = 0;
                while thread_running.load(Ordering::SeqCst) {
                    *thread_buffer.lock() = Some(render_pattern(width, height, tick));
                    tick = tick.wrapping_add(1);
                    std::thread::sleep(Self::FRAME_INTERVAL);
                }
            })?;

        debug!("[TestPattern] generating {}x{} frames", width, height);
        Ok(Self {
            buffer,
            running,
            generator: Some(generator),
        })
    }
}

impl FrameSource for TestPatternSource {
    fn live_buffer(&self) -> LiveBuffer {
        Arc::clone(&self.buffer)
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(generator) = self.generator.take() {
            let _ = generator.join();
        }
        self.buffer.lock().take();
        debug!("[TestPattern] released");
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn render_pattern(width: u32, height: u32, tick: u32) -> RawFrame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = (x.wrapping_add(tick.wrapping_mul(4)) & 0xff) as u8;
            let g = (y.wrapping_add(tick.wrapping_mul(2)) & 0xff) as u8;
            let b = ((x ^ y) & 0xff) as u8;
            data.extend_from_slice(&[r, g, b]);
        }
    }
    RawFrame {
        width,
        height,
        data,
    }
}
