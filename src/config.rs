// SPDX-License-Identifier: GPL-3.0-only

//! Capture session parameters

use crate::constants::{
    DEFAULT_BIT_RATE, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_MAX_SECONDS, DEFAULT_WIDTH,
    VideoCodec,
};
use crate::errors::{VideoError, VideoResult};
use crate::signals::SignalPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parameters for one capture run
///
/// Fixed for the whole session and shared by the camera and encoder stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParam {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Encoder target bit rate (bits per second)
    pub bit_rate: u32,
    /// Camera frame rate
    pub frame_rate: u32,
    /// Capture duration in seconds
    pub max_seconds: u64,
    /// Compressed codec written to the output file
    pub codec: VideoCodec,
    /// Output file, `<unix-timestamp>.<ext>` unless overridden
    pub output_file_path: PathBuf,
    /// What an interrupt signal does to a running capture
    pub signal_policy: SignalPolicy,
}

impl Default for VideoParam {
    fn default() -> Self {
        let codec = VideoCodec::default();
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            bit_rate: DEFAULT_BIT_RATE,
            frame_rate: DEFAULT_FRAME_RATE,
            max_seconds: DEFAULT_MAX_SECONDS,
            codec,
            output_file_path: PathBuf::from(timestamped_file_name(codec)),
            signal_policy: SignalPolicy::default(),
        }
    }
}

impl VideoParam {
    /// Place the timestamped output file in `dir` instead of the working directory
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let file_name = self
            .output_file_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(timestamped_file_name(self.codec)));
        self.output_file_path = dir.as_ref().join(file_name);
        self
    }

    /// Switch codec, keeping the output file name in step with it
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self.output_file_path = self.output_file_path.with_extension(codec.extension());
        self
    }

    /// Capture duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }

    /// Check every field is usable before any hardware is touched
    pub fn validate(&self) -> VideoResult<()> {
        let positive = [
            ("width", self.width as u64),
            ("height", self.height as u64),
            ("bit_rate", self.bit_rate as u64),
            ("frame_rate", self.frame_rate as u64),
            ("max_seconds", self.max_seconds),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(VideoError::ConfigurationFailure {
                message: format!("`{}` must be positive", name),
                status: None,
            });
        }

        // Crop rectangles and frame rates are signed on the hardware side
        if self.width > i32::MAX as u32
            || self.height > i32::MAX as u32
            || self.frame_rate > i32::MAX as u32
        {
            return Err(VideoError::ConfigurationFailure {
                message: format!(
                    "{}x{}@{} is out of range",
                    self.width, self.height, self.frame_rate
                ),
                status: None,
            });
        }

        if self.output_file_path.as_os_str().is_empty() {
            return Err(VideoError::ConfigurationFailure {
                message: "`output_file_path` is empty".to_string(),
                status: None,
            });
        }

        Ok(())
    }
}

/// `<unix-timestamp>.<ext>` for the current wall-clock time
pub fn timestamped_file_name(codec: VideoCodec) -> String {
    format!("{}.{}", chrono::Utc::now().timestamp(), codec.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_unix_timestamp() {
        let name = timestamped_file_name(VideoCodec::H264);
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "h264");
        let seconds: i64 = stem.parse().unwrap();
        assert!((chrono::Utc::now().timestamp() - seconds).abs() < 5);
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let param = VideoParam {
            frame_rate: 0,
            ..Default::default()
        };
        match param.validate() {
            Err(VideoError::ConfigurationFailure { message, .. }) => {
                assert!(message.contains("frame_rate"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_codec_switch_updates_extension() {
        let param = VideoParam::default().with_codec(VideoCodec::Mjpeg);
        assert_eq!(
            param.output_file_path.extension().and_then(|e| e.to_str()),
            Some("mjpeg")
        );
    }
}
