// SPDX-License-Identifier: MPL-2.0

//! Encoder stage
//!
//! Owns the hardware encoder component and the pool of output buffer headers
//! the delivery callback cycles through.

use crate::backends::{ComponentKind, MediaFramework, PortCallback};
use crate::config::VideoParam;
use crate::constants::{ENCODER_INPUT_PORT, ENCODER_OUTPUT_PORT};
use crate::errors::{VideoError, VideoResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configured and enabled encoder with its output pool
pub struct EncoderStage<F: MediaFramework> {
    framework: Arc<F>,
    component: Option<F::Component>,
    pool: Option<F::Pool>,
    input: F::Port,
    output: F::Port,
    enabled: bool,
}

struct Configured<F: MediaFramework> {
    input: F::Port,
    output: F::Port,
    pool: F::Pool,
}

impl<F: MediaFramework> EncoderStage<F> {
    /// Create, configure and enable the encoder, then allocate its output pool
    ///
    /// Any failure, including pool allocation after the component is
    /// enabled, destroys the component before returning.
    pub fn create(framework: Arc<F>, param: &VideoParam) -> VideoResult<Self> {
        let component = framework
            .create_component(ComponentKind::VideoEncoder)
            .map_err(|status| {
                VideoError::creation("Failed to create video encoder component", status)
            })?;

        match Self::configure(&framework, component, param) {
            Ok(configured) => Ok(Self {
                framework,
                component: Some(component),
                pool: Some(configured.pool),
                input: configured.input,
                output: configured.output,
                enabled: true,
            }),
            Err(e) => {
                warn!(error = %e, "Encoder setup failed, releasing component");
                framework.destroy_component(component);
                Err(e)
            }
        }
    }

    fn configure(
        framework: &Arc<F>,
        component: F::Component,
        param: &VideoParam,
    ) -> VideoResult<Configured<F>> {
        let ports = (
            framework.input_port(component, ENCODER_INPUT_PORT),
            framework.output_port(component, ENCODER_OUTPUT_PORT),
        );
        let (Some(input), Some(output)) = ports else {
            return Err(VideoError::CreationFailure {
                message: "Video encoder is missing its input or output port".to_string(),
                status: None,
            });
        };

        // Resolution and frame rate come from whatever gets connected upstream
        framework.copy_port_format(output, input);
        let mut format = framework.port_format(output);
        format.encoding = param.codec.encoding();
        format.bitrate = param.bit_rate;

        let buffers = framework.buffer_requirements(output);
        let size = buffers.size_recommended.max(buffers.size_min);
        let num = buffers.num_recommended.max(buffers.num_min);
        framework.set_buffer_layout(output, num, size);

        framework.commit_port_format(output, &format).map_err(|status| {
            VideoError::configuration("Failed to commit encoder output format", status)
        })?;

        framework.enable_component(component).map_err(|status| {
            VideoError::creation("Failed to enable video encoder component", status)
        })?;

        let buffers = framework.buffer_requirements(output);
        let pool = match framework.create_pool(output, buffers.num, buffers.size) {
            Ok(pool) => pool,
            Err(status) => {
                framework.disable_component(component);
                return Err(VideoError::resource(
                    "Failed to create encoder output buffer pool",
                    status,
                ));
            }
        };

        info!(
            codec = param.codec.display_name(),
            bit_rate = param.bit_rate,
            buffers = buffers.num,
            buffer_size = buffers.size,
            "Encoder ready"
        );

        Ok(Configured {
            input,
            output,
            pool,
        })
    }

    pub fn input_port(&self) -> F::Port {
        self.input
    }

    pub fn output_port(&self) -> F::Port {
        self.output
    }

    /// Output pool, `None` once destroyed
    pub fn pool(&self) -> Option<F::Pool> {
        self.pool
    }

    /// Enable the output port with the delivery callback
    pub fn enable_output(&self, callback: PortCallback<F>) -> VideoResult<()> {
        if self.component.is_none() {
            return Err(VideoError::FatalInvariantViolation(
                "output enabled on a destroyed encoder".to_string(),
            ));
        }

        self.framework
            .enable_port(self.output, callback)
            .map_err(|status| {
                VideoError::configuration("Failed to enable encoder output port", status)
            })?;
        debug!("Encoder output port enabled");
        Ok(())
    }

    /// Disable the output port; no-op if it is not enabled
    ///
    /// Returns only after every in-flight delivery callback has finished.
    pub fn disable_output(&self) {
        if self.component.is_none() || !self.framework.is_port_enabled(self.output) {
            return;
        }

        match self.framework.disable_port(self.output) {
            Ok(()) => debug!("Encoder output port disabled"),
            Err(status) => warn!(%status, "Failed to disable encoder output port"),
        }
    }

    /// Hand every idle pool buffer to the output port
    ///
    /// Returns the number of buffers sent, which equals the pool queue length
    /// when priming starts.
    pub fn prime(&self) -> VideoResult<usize> {
        let pool = self.pool.ok_or_else(|| {
            VideoError::FatalInvariantViolation("encoder primed without a pool".to_string())
        })?;

        let count = self.framework.pool_queue_len(pool);
        for sent in 0..count {
            let buffer = self.framework.pool_get(pool).ok_or_else(|| {
                VideoError::FatalInvariantViolation(format!(
                    "encoder pool ran dry after {} of {} buffers",
                    sent, count
                ))
            })?;
            self.framework.send_buffer(self.output, buffer).map_err(|status| {
                VideoError::resource("Failed to send a buffer to the encoder output port", status)
            })?;
        }

        debug!(buffers = count, "Primed encoder output port");
        Ok(count)
    }

    /// Disable the component; no-op if already disabled or destroyed
    pub fn disable(&mut self) {
        if let (true, Some(component)) = (self.enabled, self.component) {
            self.framework.disable_component(component);
            self.enabled = false;
            debug!("Encoder disabled");
        }
    }

    /// Destroy the pool, then the component; no-op if already destroyed
    pub fn destroy(&mut self) {
        self.disable_output();
        self.disable();

        if let Some(pool) = self.pool.take() {
            self.framework.destroy_pool(self.output, pool);
            debug!("Encoder output pool destroyed");
        }
        if let Some(component) = self.component.take() {
            self.framework.destroy_component(component);
            info!("Encoder destroyed");
        }
    }

    pub fn is_live(&self) -> bool {
        self.component.is_some()
    }
}

impl<F: MediaFramework> Drop for EncoderStage<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::{FaultPoint, FrameworkEvent, SimulatedFramework};
    use crate::backends::{BufferRequirements, Encoding};
    use crate::constants::VideoCodec;

    #[test]
    fn test_buffer_layout_clamped_to_minimum() {
        let framework = Arc::new(
            SimulatedFramework::builder()
                .encoder_output_buffers(BufferRequirements {
                    num: 1,
                    num_min: 4,
                    num_recommended: 2,
                    size: 0,
                    size_min: 8192,
                    size_recommended: 1024,
                })
                .build(),
        );
        let encoder = EncoderStage::create(Arc::clone(&framework), &VideoParam::default()).unwrap();

        let pool = encoder.pool().unwrap();
        assert_eq!(framework.pool_queue_len(pool), 4);
        assert!(framework.events().iter().any(|e| matches!(
            e,
            FrameworkEvent::PoolCreated { num: 4, size: 8192, .. }
        )));
    }

    #[test]
    fn test_output_format_carries_codec_and_bit_rate() {
        let framework = Arc::new(SimulatedFramework::new());
        let param = VideoParam::default().with_codec(VideoCodec::Mjpeg);
        let encoder = EncoderStage::create(Arc::clone(&framework), &param).unwrap();

        let format = framework.port_format(encoder.output_port());
        assert_eq!(format.encoding, Encoding::Mjpeg);
        assert_eq!(format.bitrate, param.bit_rate);
    }

    #[test]
    fn test_pool_failure_after_enable_rolls_back() {
        let framework = Arc::new(
            SimulatedFramework::builder()
                .fail_at(FaultPoint::PoolCreate)
                .build(),
        );

        let err = EncoderStage::create(Arc::clone(&framework), &VideoParam::default())
            .err()
            .unwrap();
        assert!(matches!(err, VideoError::ResourceFailure { .. }));
        assert!(framework.live_resources().is_empty());
        assert!(framework
            .events()
            .iter()
            .any(|e| matches!(e, FrameworkEvent::ComponentEnabled(_))));
    }

    #[test]
    fn test_prime_sends_whole_pool() {
        let framework = Arc::new(SimulatedFramework::new());
        let mut encoder =
            EncoderStage::create(Arc::clone(&framework), &VideoParam::default()).unwrap();
        encoder.enable_output(Box::new(|_, _| {})).unwrap();

        let primed = encoder.prime().unwrap();
        assert_eq!(primed, 3);
        assert_eq!(framework.pool_queue_len(encoder.pool().unwrap()), 0);
        assert_eq!(framework.stats().buffers_sent, 3);

        encoder.destroy();
        encoder.destroy();
        assert!(framework.live_resources().is_empty());
        assert!(framework.violations().is_empty());
    }
}
