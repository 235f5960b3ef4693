// SPDX-License-Identifier: MPL-2.0

//! rpi-video - fixed-duration video capture for the Raspberry Pi camera
//!
//! Configures the camera and the hardware H.264 encoder, tunnels one into the
//! other and writes the encoded elementary stream to `<unix-timestamp>.h264`.
//!
//! # Architecture
//!
//! - [`backends`]: Media framework seam with the MMAL and simulated backends
//! - [`pipelines`]: Camera and encoder stages and the capture session
//! - [`config`]: Capture parameters
//! - [`storage`]: Output file sink
//! - [`signals`]: Interrupt handling
//!
//! # Example
//!
//! ```no_run
//! use rpi_video::backends::simulated::SimulatedFramework;
//! use rpi_video::{CaptureSession, VideoParam};
//! use std::sync::Arc;
//!
//! let framework = Arc::new(SimulatedFramework::new());
//! let report = CaptureSession::new(framework, VideoParam::default()).run();
//! std::process::exit(report.exit_code().into());
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod signals;
pub mod storage;

// Re-export commonly used types
pub use backends::MediaFramework;
pub use config::VideoParam;
pub use constants::VideoCodec;
pub use errors::{VideoError, VideoResult};
pub use pipelines::video::{CaptureSession, SessionReport, SessionState};
pub use signals::{CancelToken, SignalPolicy};
