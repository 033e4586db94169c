// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! V4L2 camera source
//!
//! Opens `/dev/video{index}`, negotiates YUYV at the requested size, and runs
//! a capture thread that converts each sample to RGB and publishes it into
//! the live buffer. Acquisition maps EACCES/EPERM to `PermissionDenied` and
//! everything else to `DeviceUnavailable`; there is no retry.

use crate::core::source::{FrameSource, LiveBuffer};
use crate::core::{PipelineError, RawFrame, Result};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const YUYV: &[u8; 4] = b"YUYV";

/// Live camera acquired through V4L2.
pub struct CameraSource {
    buffer: LiveBuffer,
    running: Arc<AtomicBool>,
    capture: Option<std::thread::JoinHandle<()>>,
}

impl CameraSource {
    /// Acquires the device and starts the capture thread.
    ///
    /// The driver may adjust the negotiated size; frames are published at
    /// whatever the device actually delivers and the encoder rescales them.
    pub fn acquire(index: usize, width: u32, height: u32) -> Result<Self> {
        let device = Device::new(index).map_err(|e| map_open_error(index, &e))?;

        let requested = Format::new(width, height, FourCC::new(YUYV));
        let format = device.set_format(&requested).map_err(|e| {
            PipelineError::DeviceUnavailable(format!(
                "/dev/video{}: cannot set {}x{} YUYV: {}",
                index, width, height, e
            ))
        })?;
        if &format.fourcc.repr != YUYV {
            return Err(PipelineError::DeviceUnavailable(format!(
                "/dev/video{}: YUYV not supported (driver offered {})",
                index, format.fourcc
            )));
        }
        info!(
            "[Camera] /dev/video{} open at {}x{} {}",
            index, format.width, format.height, format.fourcc
        );

        let buffer: LiveBuffer = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let thread_buffer = Arc::clone(&buffer);
        let thread_running = Arc::clone(&running);
        let capture = std::thread::Builder::new()
            .name("framelink-camera".into())
            .spawn(move || {
                capture_loop(
                    device,
                    format.width,
                    format.height,
                    thread_buffer,
                    thread_running,
                );
            })?;

        Ok(Self {
            buffer,
            running,
            capture: Some(capture),
        })
    }
}

impl FrameSource for CameraSource {
    fn live_buffer(&self) -> LiveBuffer {
        Arc::clone(&self.buffer)
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(capture) = self.capture.take() {
            if capture.join().is_err() {
                warn!("[Camera] capture thread panicked");
            }
        }
        self.buffer.lock().take();
        debug!("[Camera] released");
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn map_open_error(index: usize, error: &io::Error) -> PipelineError {
    match error.kind() {
        io::ErrorKind::PermissionDenied => {
            PipelineError::PermissionDenied(format!("/dev/video{}: {}", index, error))
        }
        _ => PipelineError::DeviceUnavailable(format!("/dev/video{}: {}", index, error)),
    }
}

fn capture_loop(
    device: Device,
    width: u32,
    height: u32,
    buffer: LiveBuffer,
    running: Arc<AtomicBool>,
) {
    let mut stream = match v4l::io::mmap::Stream::with_buffers(&device, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            error!("[Camera] cannot map capture buffers: {}", e);
            return;
        }
    };

    let expected = (width * height * 2) as usize;
    while running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((data, _meta)) => {
                if data.len() < expected {
                    warn!(
                        "[Camera] short capture buffer: {} bytes, expected {}",
                        data.len(),
                        expected
                    );
                    continue;
                }
                let rgb = yuyv_to_rgb(&data[..expected]);
                *buffer.lock() = Some(RawFrame {
                    width,
                    height,
                    data: rgb,
                });
            }
            Err(e) => {
                warn!("[Camera] capture failed: {}", e);
                break;
            }
        }
    }
    debug!("[Camera] capture thread exiting");
}

/// YUYV 4:2:2 to packed RGB24, BT.601 full range.
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for chunk in yuyv.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let cb = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let cr = chunk[3] as f32 - 128.0;
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, cb, cr));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, cb, cr));
    }
    rgb
}

fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [r, g, b].map(|v| v.clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_yuyv_conversion_black_and_white() {
        // Two black pixels, then two white pixels.
        let yuyv = [0u8, 128, 0, 128, 255, 128, 255, 128];
        let rgb = yuyv_to_rgb(&yuyv);
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&rgb[6..], &[255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_conversion_red_leaning() {
        // High Cr pushes red above the other components.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 255]);
        assert!(rgb[0] > rgb[1] && rgb[0] > rgb[2]);
    }

    #[test]
    fn test_open_error_mapping() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "EACCES");
        assert!(matches!(
            map_open_error(0, &denied),
            PipelineError::PermissionDenied(_)
        ));
        let missing = io::Error::new(io::ErrorKind::NotFound, "ENOENT");
        assert!(matches!(
            map_open_error(0, &missing),
            PipelineError::DeviceUnavailable(_)
        ));
    }

    #[test]
    fn test_absent_device_is_unavailable() {
        // Device indices this high do not exist on any sane host.
        let result = CameraSource::acquire(250, 640, 480);
        assert!(matches!(
            result,
            Err(PipelineError::DeviceUnavailable(_) | PipelineError::PermissionDenied(_))
        ));
    }

    /// Requires a physical camera; run with `cargo test -- --ignored`.
    #[test]
    #[serial]
    #[ignore = "requires a V4L2 camera at /dev/video0"]
    fn test_camera_smoke_capture() {
        let mut source = CameraSource::acquire(0, 640, 480).unwrap();
        let buffer = source.live_buffer();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if let Some(frame) = buffer.lock().clone() {
                assert_eq!(frame.data.len(), frame.expected_len());
                break;
            }
            assert!(std::time::Instant::now() < deadline, "no frame within 5s");
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        source.release();
    }
}
