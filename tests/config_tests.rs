// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use rpi_video::{SignalPolicy, VideoCodec, VideoError, VideoParam};
use std::time::Duration;

#[test]
fn test_param_default() {
    // The recorder's compile-time defaults
    let param = VideoParam::default();

    assert_eq!(param.width, 1920);
    assert_eq!(param.height, 1080);
    assert_eq!(param.bit_rate, 17_000_000);
    assert_eq!(param.frame_rate, 30);
    assert_eq!(param.codec, VideoCodec::H264);
    assert_eq!(
        param.signal_policy,
        SignalPolicy::Exit,
        "Interrupts should exit immediately by default"
    );
    assert!(param.validate().is_ok());
}

#[test]
fn test_default_output_is_timestamp_in_working_dir() {
    let param = VideoParam::default();
    let path = param.output_file_path;

    assert!(path.parent().is_none_or(|p| p.as_os_str().is_empty()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("h264"));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap();
    assert!(stem.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_output_dir_keeps_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let param = VideoParam::default();
    let name = param.output_file_path.file_name().unwrap().to_owned();

    let moved = param.with_output_dir(dir.path());
    assert_eq!(moved.output_file_path, dir.path().join(name));
}

#[test]
fn test_duration_from_max_seconds() {
    let param = VideoParam {
        max_seconds: 7,
        ..Default::default()
    };
    assert_eq!(param.duration(), Duration::from_secs(7));
}

#[test]
fn test_zero_fields_rejected() {
    let cases = [
        VideoParam {
            width: 0,
            ..Default::default()
        },
        VideoParam {
            height: 0,
            ..Default::default()
        },
        VideoParam {
            bit_rate: 0,
            ..Default::default()
        },
        VideoParam {
            max_seconds: 0,
            ..Default::default()
        },
    ];

    for param in cases {
        assert!(
            matches!(param.validate(), Err(VideoError::ConfigurationFailure { .. })),
            "{:?} should be rejected",
            param
        );
    }
}

#[test]
fn test_oversized_dimensions_rejected() {
    let param = VideoParam {
        width: u32::MAX,
        ..Default::default()
    };
    assert!(param.validate().is_err());
}
