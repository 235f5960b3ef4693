// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use rpi_video::backends::Encoding;
use rpi_video::constants::{CAMERA_CAPTURE_PORT, CAMERA_PREVIEW_PORT, CAMERA_VIDEO_PORT, VideoCodec};

#[test]
fn test_codec_values() {
    // Test that all codecs exist (H.264, MJPEG)
    assert_eq!(VideoCodec::ALL.len(), 2);
    assert_eq!(VideoCodec::default(), VideoCodec::H264);
}

#[test]
fn test_codec_extensions_are_distinct() {
    assert_eq!(VideoCodec::H264.extension(), "h264");
    assert_ne!(VideoCodec::H264.extension(), VideoCodec::Mjpeg.extension());
}

#[test]
fn test_codec_encodings() {
    assert_eq!(VideoCodec::H264.encoding(), Encoding::H264);
    assert_eq!(VideoCodec::Mjpeg.encoding(), Encoding::Mjpeg);
}

#[test]
fn test_codec_display_names() {
    // Test that all codecs have non-empty display names
    for codec in VideoCodec::ALL {
        assert!(!codec.display_name().is_empty());
    }
}

#[test]
fn test_camera_ports_are_distinct() {
    let ports = [CAMERA_PREVIEW_PORT, CAMERA_VIDEO_PORT, CAMERA_CAPTURE_PORT];
    for (i, a) in ports.iter().enumerate() {
        for b in &ports[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
