// SPDX-License-Identifier: MPL-2.0

//! Capture session
//!
//! Drives one recording through
//! `Init → CameraReady → EncoderReady → Connected → FileOpen → Streaming`
//! and always finishes with a single teardown, whichever state was reached:
//!
//! 1. disable the encoder output port (waits for in-flight deliveries)
//! 2. destroy the camera to encoder connection
//! 3. close the output file
//! 4. disable the encoder, then the camera
//! 5. destroy the encoder (pool before component)
//! 6. destroy the camera

use super::camera_stage::CameraStage;
use super::connector::{StageConnection, connect};
use super::delivery::{DeliveryStats, EncoderDelivery};
use super::encoder_stage::EncoderStage;
use crate::backends::MediaFramework;
use crate::config::VideoParam;
use crate::errors::{VideoError, VideoResult};
use crate::signals::{CancelToken, WaitOutcome};
use crate::storage::{OutputSink, SharedSink, lock_sink};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Init,
    CameraReady,
    EncoderReady,
    Connected,
    FileOpen,
    Streaming,
    Complete,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::CameraReady => "camera ready",
            SessionState::EncoderReady => "encoder ready",
            SessionState::Connected => "connected",
            SessionState::FileOpen => "file open",
            SessionState::Streaming => "streaming",
            SessionState::Complete => "complete",
            SessionState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// `Complete` or `Aborted`
    pub outcome: SessionState,
    /// Last state reached before teardown
    pub reached: SessionState,
    pub output_path: PathBuf,
    /// Whether the output file was created (it is kept even on failure)
    pub output_created: bool,
    pub bytes_written: u64,
    /// Encoded buffers appended to the file
    pub buffers_delivered: u64,
    /// Buffers handed to the encoder before the capture wait
    pub primed_buffers: usize,
    pub delivery: DeliveryStats,
    /// Error that ended the session early
    pub error: Option<VideoError>,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == SessionState::Complete
    }

    /// Process exit code: 0 when complete, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.is_complete() { 0 } else { 1 }
    }
}

/// One capture run and every resource it holds
pub struct CaptureSession<F: MediaFramework> {
    framework: Arc<F>,
    param: VideoParam,
    cancel: CancelToken,
    state: SessionState,
    camera: Option<CameraStage<F>>,
    encoder: Option<EncoderStage<F>>,
    connection: Option<StageConnection<F>>,
    sink: Option<SharedSink>,
    delivery: Option<Arc<EncoderDelivery<F>>>,
    primed: usize,
    torn_down: bool,
}

impl<F: MediaFramework> CaptureSession<F> {
    pub fn new(framework: Arc<F>, param: VideoParam) -> Self {
        Self {
            framework,
            param,
            cancel: CancelToken::new(),
            state: SessionState::Init,
            camera: None,
            encoder: None,
            connection: None,
            sink: None,
            delivery: None,
            primed: 0,
            torn_down: false,
        }
    }

    /// Use `token` to end the capture wait early
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn param(&self) -> &VideoParam {
        &self.param
    }

    /// Record for `max_seconds`, tear down and report
    pub fn run(mut self) -> SessionReport {
        info!(
            width = self.param.width,
            height = self.param.height,
            bit_rate = self.param.bit_rate,
            frame_rate = self.param.frame_rate,
            seconds = self.param.max_seconds,
            output = %self.param.output_file_path.display(),
            "Starting capture session"
        );

        let result = self.capture();
        let reached = self.state;

        if let Err(e) = &result {
            error!(error = %e, state = %reached, "Capture session failed");
        }

        let teardown = self.teardown();
        let error = result.err().or(teardown.err());
        let outcome = if error.is_none() {
            SessionState::Complete
        } else {
            SessionState::Aborted
        };
        self.transition(outcome);

        self.report(outcome, reached, error)
    }

    fn capture(&mut self) -> VideoResult<()> {
        self.param.validate()?;

        let camera = CameraStage::create(Arc::clone(&self.framework), &self.param)?;
        let source = camera.video_port();
        self.camera = Some(camera);
        self.transition(SessionState::CameraReady);

        let encoder = EncoderStage::create(Arc::clone(&self.framework), &self.param)?;
        let sink_port = encoder.input_port();
        self.encoder = Some(encoder);
        self.transition(SessionState::EncoderReady);

        self.connection = Some(connect(Arc::clone(&self.framework), source, sink_port)?);
        self.transition(SessionState::Connected);

        let sink = OutputSink::create(&self.param.output_file_path)?.into_shared();
        self.sink = Some(Arc::clone(&sink));
        self.transition(SessionState::FileOpen);

        self.start_streaming(sink)?;
        self.transition(SessionState::Streaming);

        self.wait()
    }

    fn start_streaming(&mut self, sink: SharedSink) -> VideoResult<()> {
        let (Some(camera), Some(encoder)) = (self.camera.as_ref(), self.encoder.as_ref()) else {
            return Err(VideoError::FatalInvariantViolation(
                "streaming started without both stages".to_string(),
            ));
        };
        let pool = encoder.pool().ok_or_else(|| {
            VideoError::FatalInvariantViolation("encoder has no output pool".to_string())
        })?;

        let delivery = EncoderDelivery::new(Arc::clone(&self.framework), pool, sink);
        encoder.enable_output(delivery.callback())?;
        self.delivery = Some(delivery);

        camera.start_capture()?;

        self.primed = encoder.prime()?;
        Ok(())
    }

    /// Block for the capture duration; the only wait in the session
    fn wait(&self) -> VideoResult<()> {
        info!(seconds = self.param.max_seconds, "Recording");
        match self.cancel.wait(self.param.duration()) {
            WaitOutcome::Elapsed => Ok(()),
            WaitOutcome::Cancelled => Err(VideoError::Interrupted),
        }
    }

    /// Release everything in dependency order; runs at most once
    fn teardown(&mut self) -> VideoResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        debug!(state = %self.state, "Tearing down capture session");

        if let Some(encoder) = self.encoder.as_ref() {
            encoder.disable_output();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.destroy();
        }

        let closed = match self.sink.as_ref() {
            Some(sink) => lock_sink(sink).close(),
            None => Ok(()),
        };
        if let Err(e) = &closed {
            warn!(error = %e, "Failed to close output file");
        }

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.disable();
        }
        if let Some(camera) = self.camera.as_mut() {
            camera.disable();
        }
        if let Some(mut encoder) = self.encoder.take() {
            encoder.destroy();
        }
        if let Some(mut camera) = self.camera.take() {
            camera.destroy();
        }

        info!("Capture session torn down");
        closed
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
    }

    fn report(
        &self,
        outcome: SessionState,
        reached: SessionState,
        error: Option<VideoError>,
    ) -> SessionReport {
        let delivery = self
            .delivery
            .as_ref()
            .map(|d| d.stats())
            .unwrap_or_default();
        let bytes_written = self
            .sink
            .as_ref()
            .map_or(0, |sink| lock_sink(sink).bytes_written());

        SessionReport {
            outcome,
            reached,
            output_path: self.param.output_file_path.clone(),
            output_created: self.sink.is_some(),
            bytes_written,
            buffers_delivered: delivery.payload_buffers,
            primed_buffers: self.primed,
            delivery,
            error,
        }
    }
}

impl<F: MediaFramework> Drop for CaptureSession<F> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Teardown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::SimulatedFramework;

    #[test]
    fn test_state_order() {
        assert!(SessionState::Init < SessionState::CameraReady);
        assert!(SessionState::FileOpen < SessionState::Streaming);
        assert_eq!(SessionState::EncoderReady.to_string(), "encoder ready");
    }

    #[test]
    fn test_invalid_param_touches_no_hardware() {
        let framework = Arc::new(SimulatedFramework::new());
        let param = VideoParam {
            width: 0,
            ..Default::default()
        };

        let report = CaptureSession::new(Arc::clone(&framework), param).run();
        assert_eq!(report.outcome, SessionState::Aborted);
        assert_eq!(report.reached, SessionState::Init);
        assert_eq!(report.exit_code(), 1);
        assert!(!report.output_created);
        assert!(framework.events().is_empty());
    }

    #[test]
    fn test_dropped_session_tears_down() {
        let framework = Arc::new(SimulatedFramework::new());
        let dir = tempfile::tempdir().unwrap();
        let param = VideoParam::default().with_output_dir(dir.path());

        let mut session = CaptureSession::new(Arc::clone(&framework), param);
        session.capture_until_connected();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(framework.live_resources().connections, 1);

        drop(session);
        assert!(framework.live_resources().is_empty());
        assert!(framework.violations().is_empty());
    }

    impl<F: MediaFramework> CaptureSession<F> {
        fn capture_until_connected(&mut self) {
            let camera = CameraStage::create(Arc::clone(&self.framework), &self.param).unwrap();
            let encoder = EncoderStage::create(Arc::clone(&self.framework), &self.param).unwrap();
            let connection = connect(
                Arc::clone(&self.framework),
                camera.video_port(),
                encoder.input_port(),
            )
            .unwrap();
            self.camera = Some(camera);
            self.encoder = Some(encoder);
            self.connection = Some(connection);
            self.state = SessionState::Connected;
        }
    }
}
