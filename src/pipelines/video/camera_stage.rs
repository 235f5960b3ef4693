// SPDX-License-Identifier: MPL-2.0

//! Camera stage
//!
//! Owns the hardware camera component. All three output ports are given the
//! full-frame opaque format; only the video port feeds the encoder.

use crate::backends::{
    BoolParameter, CameraConfig, ComponentKind, Encoding, MediaFramework, PortCallback,
    PortFormat, Rational, Rect, TimestampMode, VideoFormat,
};
use crate::config::VideoParam;
use crate::constants::{
    CAMERA_CAPTURE_PORT, CAMERA_PREVIEW_PORT, CAMERA_VIDEO_PORT, MIN_CAMERA_PORT_BUFFERS,
    NUM_PREVIEW_VIDEO_FRAMES,
};
use crate::errors::{VideoError, VideoResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order in which output port formats are committed
const PORT_SETUP_ORDER: [(usize, &str); 3] = [
    (CAMERA_CAPTURE_PORT, "capture"),
    (CAMERA_PREVIEW_PORT, "preview"),
    (CAMERA_VIDEO_PORT, "video"),
];

/// Configured and enabled camera component
pub struct CameraStage<F: MediaFramework> {
    framework: Arc<F>,
    component: Option<F::Component>,
    video_port: F::Port,
    enabled: bool,
}

impl<F: MediaFramework> CameraStage<F> {
    /// Create, configure and enable the camera
    ///
    /// On failure the component is destroyed before returning.
    pub fn create(framework: Arc<F>, param: &VideoParam) -> VideoResult<Self> {
        let component = framework
            .create_component(ComponentKind::Camera)
            .map_err(|status| VideoError::creation("Failed to create camera component", status))?;

        match Self::configure(&framework, component, param) {
            Ok(video_port) => {
                info!(
                    width = param.width,
                    height = param.height,
                    frame_rate = param.frame_rate,
                    "Camera ready"
                );
                Ok(Self {
                    framework,
                    component: Some(component),
                    video_port,
                    enabled: true,
                })
            }
            Err(e) => {
                warn!(error = %e, "Camera setup failed, releasing component");
                framework.destroy_component(component);
                Err(e)
            }
        }
    }

    fn configure(
        framework: &Arc<F>,
        component: F::Component,
        param: &VideoParam,
    ) -> VideoResult<F::Port> {
        let outputs = framework.output_count(component);
        if outputs <= CAMERA_CAPTURE_PORT {
            return Err(VideoError::CreationFailure {
                message: format!(
                    "Camera exposes {} output ports, {} required",
                    outputs,
                    CAMERA_CAPTURE_PORT + 1
                ),
                status: None,
            });
        }

        let control = framework.control_port(component);
        framework
            .enable_port(control, control_callback(framework))
            .map_err(|status| {
                VideoError::configuration("Failed to enable camera control port", status)
            })?;

        // Firmware that does not know the block still records fine
        if let Err(status) = framework.set_camera_config(control, &camera_config(param)) {
            warn!(%status, "Camera rejected its configuration block");
        }

        let format = full_frame_format(param);
        let mut video_port = None;
        for (index, name) in PORT_SETUP_ORDER {
            let port = framework
                .output_port(component, index)
                .ok_or_else(|| VideoError::CreationFailure {
                    message: format!("Camera has no {} port", name),
                    status: None,
                })?;

            framework.commit_port_format(port, &format).map_err(|status| {
                VideoError::configuration(format!("Failed to commit camera {} format", name), status)
            })?;

            let buffers = framework.buffer_requirements(port);
            if buffers.num < MIN_CAMERA_PORT_BUFFERS {
                framework.set_buffer_layout(port, MIN_CAMERA_PORT_BUFFERS, buffers.size);
            }
            debug!(port = name, buffers = buffers.num.max(MIN_CAMERA_PORT_BUFFERS), "Committed camera port");

            if index == CAMERA_VIDEO_PORT {
                video_port = Some(port);
            }
        }

        framework
            .enable_component(component)
            .map_err(|status| VideoError::creation("Failed to enable camera component", status))?;

        video_port.ok_or_else(|| VideoError::CreationFailure {
            message: "Camera has no video port".to_string(),
            status: None,
        })
    }

    /// Output port that feeds the encoder
    pub fn video_port(&self) -> F::Port {
        self.video_port
    }

    /// Start streaming frames out of the video port
    pub fn start_capture(&self) -> VideoResult<()> {
        if self.component.is_none() {
            return Err(VideoError::FatalInvariantViolation(
                "capture started on a destroyed camera".to_string(),
            ));
        }

        self.framework
            .set_bool_parameter(self.video_port, BoolParameter::Capture, true)
            .map_err(|status| VideoError::configuration("Failed to start camera capture", status))?;

        info!("Camera capture started");
        Ok(())
    }

    /// Disable the component; no-op if already disabled or destroyed
    pub fn disable(&mut self) {
        if let (true, Some(component)) = (self.enabled, self.component) {
            self.framework.disable_component(component);
            self.enabled = false;
            debug!("Camera disabled");
        }
    }

    /// Destroy the component; no-op if already destroyed
    pub fn destroy(&mut self) {
        self.disable();
        if let Some(component) = self.component.take() {
            self.framework.destroy_component(component);
            info!("Camera destroyed");
        }
    }

    pub fn is_live(&self) -> bool {
        self.component.is_some()
    }
}

impl<F: MediaFramework> Drop for CameraStage<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Control port events carry nothing we need; hand the header straight back
fn control_callback<F: MediaFramework>(framework: &Arc<F>) -> PortCallback<F> {
    let framework = Arc::downgrade(framework);
    Box::new(move |_port, buffer| {
        match framework.upgrade() {
            Some(framework) => {
                debug!(length = framework.buffer_length(buffer), "Camera control event");
                framework.release_buffer(buffer);
            }
            None => warn!("Camera control event after framework shutdown, header not returned"),
        }
    })
}

fn camera_config(param: &VideoParam) -> CameraConfig {
    CameraConfig {
        max_stills_w: param.width,
        max_stills_h: param.height,
        stills_yuv422: false,
        one_shot_stills: false,
        max_preview_video_w: param.width,
        max_preview_video_h: param.height,
        num_preview_video_frames: NUM_PREVIEW_VIDEO_FRAMES,
        stills_capture_circular_buffer_height: 0,
        fast_preview_resume: false,
        timestamp_mode: TimestampMode::ResetStc,
    }
}

fn full_frame_format(param: &VideoParam) -> PortFormat {
    PortFormat {
        encoding: Encoding::Opaque,
        encoding_variant: Some(Encoding::I420),
        bitrate: 0,
        video: VideoFormat {
            width: param.width,
            height: param.height,
            crop: Rect {
                x: 0,
                y: 0,
                width: param.width as i32,
                height: param.height as i32,
            },
            frame_rate: Rational {
                num: param.frame_rate as i32,
                den: 1,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::{FaultPoint, FrameworkEvent, PortKind, SimulatedFramework};

    fn param() -> VideoParam {
        VideoParam {
            width: 640,
            height: 480,
            ..Default::default()
        }
    }

    #[test]
    fn test_ports_committed_capture_preview_video() {
        let framework = Arc::new(SimulatedFramework::new());
        let camera = CameraStage::create(Arc::clone(&framework), &param()).unwrap();

        let committed: Vec<usize> = framework
            .events()
            .iter()
            .filter_map(|e| match e {
                FrameworkEvent::FormatCommitted { port, format } => {
                    assert_eq!(format.video.crop.width, 640);
                    assert_eq!(format.video.frame_rate, Rational { num: 30, den: 1 });
                    Some(port.index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(committed, vec![2, 0, 1]);
        assert_eq!(camera.video_port().kind, PortKind::Output);
        assert_eq!(camera.video_port().index, CAMERA_VIDEO_PORT);
        assert_eq!(framework.buffer_requirements(camera.video_port()).num, 3);

        let config = framework.last_camera_config().unwrap();
        assert_eq!((config.max_stills_w, config.max_preview_video_h), (640, 480));
        assert_eq!(config.timestamp_mode, TimestampMode::ResetStc);
    }

    #[test]
    fn test_control_event_buffer_is_returned() {
        let framework = Arc::new(SimulatedFramework::new());
        let _camera = CameraStage::create(Arc::clone(&framework), &param()).unwrap();

        let stats = framework.stats();
        assert_eq!(stats.control_events, 1);
        assert_eq!(stats.buffers_released, 1);
    }

    #[test]
    fn test_commit_failure_releases_component() {
        let framework = Arc::new(
            SimulatedFramework::builder()
                .fail_at(FaultPoint::FormatCommit {
                    kind: ComponentKind::Camera,
                    output: CAMERA_VIDEO_PORT,
                })
                .build(),
        );

        let err = CameraStage::create(Arc::clone(&framework), &param())
            .err()
            .unwrap();
        assert!(matches!(err, VideoError::ConfigurationFailure { .. }));
        assert!(framework.live_resources().is_empty());
        assert!(!framework
            .events()
            .iter()
            .any(|e| matches!(e, FrameworkEvent::ComponentEnabled(_))));
    }

    #[test]
    fn test_control_event_after_framework_drop_is_tolerated() {
        let framework = Arc::new(SimulatedFramework::new());
        let callback = control_callback(&framework);

        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        let output = framework.output_port(encoder, 0).unwrap();
        let pool = framework.create_pool(output, 1, 64).unwrap();
        let buffer = framework.pool_get(pool).unwrap();
        let control = framework.control_port(encoder);
        drop(framework);

        callback(control, buffer);
    }

    #[test]
    fn test_rejected_config_block_is_not_fatal() {
        let framework = Arc::new(
            SimulatedFramework::builder()
                .fail_at(FaultPoint::CameraConfig)
                .build(),
        );
        assert!(CameraStage::create(Arc::clone(&framework), &param()).is_ok());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let framework = Arc::new(SimulatedFramework::new());
        let mut camera = CameraStage::create(Arc::clone(&framework), &param()).unwrap();

        camera.destroy();
        camera.destroy();
        drop(camera);

        assert!(framework.live_resources().is_empty());
        assert!(framework.violations().is_empty());
    }
}
