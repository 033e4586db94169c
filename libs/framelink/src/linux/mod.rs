// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux platform services: V4L2 camera capture.

mod camera;

pub use camera::CameraSource;
