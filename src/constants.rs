// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants
//!
//! Capture parameters are compile-time constants; there is no configuration
//! file and no command line.

use crate::backends::Encoding;

/// Default capture width in pixels
pub const DEFAULT_WIDTH: u32 = 1920;
/// Default capture height in pixels
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Default encoder target bit rate (bits per second)
pub const DEFAULT_BIT_RATE: u32 = 17_000_000;
/// Default camera frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Default capture duration in seconds
pub const DEFAULT_MAX_SECONDS: u64 = 5;

/// Camera output port carrying the preview stream
pub const CAMERA_PREVIEW_PORT: usize = 0;
/// Camera output port carrying the video stream fed to the encoder
pub const CAMERA_VIDEO_PORT: usize = 1;
/// Camera output port carrying still captures
pub const CAMERA_CAPTURE_PORT: usize = 2;

/// Minimum number of buffers on every camera output port
pub const MIN_CAMERA_PORT_BUFFERS: u32 = 3;
/// Frames the camera keeps for preview/video
pub const NUM_PREVIEW_VIDEO_FRAMES: u32 = 3;

/// Encoder ports used by the pipeline
pub const ENCODER_INPUT_PORT: usize = 0;
pub const ENCODER_OUTPUT_PORT: usize = 0;

/// Compressed codec produced by the hardware encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoCodec {
    /// H.264/AVC elementary stream (default)
    #[default]
    H264,
    /// Motion JPEG
    Mjpeg,
}

impl VideoCodec {
    /// Get all codec variants
    pub const ALL: [VideoCodec; 2] = [VideoCodec::H264, VideoCodec::Mjpeg];

    /// Output file extension for a raw elementary stream of this codec
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Mjpeg => "mjpeg",
        }
    }

    /// Encoder output encoding
    pub fn encoding(&self) -> Encoding {
        match self {
            VideoCodec::H264 => Encoding::H264,
            VideoCodec::Mjpeg => Encoding::Mjpeg,
        }
    }

    /// Get display name for the codec
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::Mjpeg => "MJPEG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_port_is_between_preview_and_capture() {
        assert!(CAMERA_PREVIEW_PORT < CAMERA_VIDEO_PORT);
        assert!(CAMERA_VIDEO_PORT < CAMERA_CAPTURE_PORT);
    }
}
