// SPDX-License-Identifier: MPL-2.0

//! Encoder output delivery
//!
//! The encoder hands every filled output buffer to [`EncoderDelivery::on_buffer`]
//! on a framework-owned thread. The payload is appended to the output sink,
//! the header goes back to the framework and, while the port is still
//! enabled, a fresh header from the pool is resubmitted so the encoder always
//! has somewhere to write.

use crate::backends::{MediaFramework, PortCallback};
use crate::errors::{VideoError, VideoResult};
use crate::storage::{SharedSink, lock_sink};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace, warn};

/// Counters kept by the delivery callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryStats {
    /// Callback invocations
    pub callbacks: u64,
    /// Invocations that carried a payload
    pub payload_buffers: u64,
    /// Payload bytes appended to the sink
    pub bytes_written: u64,
    /// Fresh buffers sent back to the encoder
    pub resubmitted: u64,
    /// Buffers returned after the port was disabled (not resubmitted)
    pub released_while_disabled: u64,
    /// Payloads that could not be read or written
    pub write_errors: u64,
}

#[derive(Default)]
struct Counters {
    callbacks: AtomicU64,
    payload_buffers: AtomicU64,
    bytes_written: AtomicU64,
    resubmitted: AtomicU64,
    released_while_disabled: AtomicU64,
    write_errors: AtomicU64,
}

/// State the encoder output callback needs
pub struct EncoderDelivery<F: MediaFramework> {
    framework: Arc<F>,
    pool: F::Pool,
    sink: SharedSink,
    counters: Counters,
}

impl<F: MediaFramework> EncoderDelivery<F> {
    pub fn new(framework: Arc<F>, pool: F::Pool, sink: SharedSink) -> Arc<Self> {
        Arc::new(Self {
            framework,
            pool,
            sink,
            counters: Counters::default(),
        })
    }

    /// Callback to register on the encoder output port
    ///
    /// A failure inside the callback cannot be reported to anyone, so it is
    /// logged and the process aborts.
    pub fn callback(self: &Arc<Self>) -> PortCallback<F> {
        let delivery = Arc::clone(self);
        Box::new(move |port, buffer| {
            if let Err(e) = delivery.on_buffer(port, buffer) {
                error!(error = %e, "Encoder delivery failed, aborting");
                std::process::abort();
            }
        })
    }

    /// Handle one buffer returned by the encoder output port
    pub fn on_buffer(&self, port: F::Port, buffer: F::Buffer) -> VideoResult<()> {
        self.counters.callbacks.fetch_add(1, Ordering::Relaxed);

        let length = self.framework.buffer_length(buffer);
        if length > 0 {
            let written = self.write_payload(buffer);
            if let Err(e) = written {
                self.framework.release_buffer(buffer);
                return Err(e);
            }
        }

        self.framework.release_buffer(buffer);

        if !self.framework.is_port_enabled(port) {
            self.counters
                .released_while_disabled
                .fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let fresh = self.framework.pool_get(self.pool).ok_or_else(|| {
            VideoError::FatalInvariantViolation(
                "encoder output pool is empty while the port is enabled".to_string(),
            )
        })?;
        self.framework.send_buffer(port, fresh).map_err(|status| {
            VideoError::FatalInvariantViolation(format!(
                "failed to return a buffer to the encoder output port ({})",
                status
            ))
        })?;
        self.counters.resubmitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Append the payload of `buffer` to the sink
    ///
    /// Only a closed sink is fatal; read and write errors are counted.
    fn write_payload(&self, buffer: F::Buffer) -> VideoResult<()> {
        let mut sink = lock_sink(&self.sink);
        if !sink.is_open() {
            return Err(VideoError::FatalInvariantViolation(
                "encoded data arrived with no open output file".to_string(),
            ));
        }

        let mut appended = Ok(0);
        let read = self.framework.read_buffer(buffer, &mut |data| {
            appended = sink.append(data).map(|()| data.len());
        });

        match (read, appended) {
            (Ok(()), Ok(bytes)) => {
                trace!(bytes, "Appended encoded buffer");
                self.counters.payload_buffers.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_written
                    .fetch_add(bytes as u64, Ordering::Relaxed);
            }
            (Err(status), _) => {
                warn!(%status, "Failed to lock encoder buffer");
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
            }
            (Ok(()), Err(e)) => {
                warn!(error = %e, path = %sink.path().display(), "Failed to write encoded data");
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            callbacks: self.counters.callbacks.load(Ordering::Relaxed),
            payload_buffers: self.counters.payload_buffers.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            resubmitted: self.counters.resubmitted.load(Ordering::Relaxed),
            released_while_disabled: self
                .counters
                .released_while_disabled
                .load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulated::{SimPort, SimulatedFramework};
    use crate::backends::{ComponentKind, MediaFramework};
    use crate::storage::OutputSink;

    struct Fixture {
        framework: Arc<SimulatedFramework>,
        encoder: <SimulatedFramework as MediaFramework>::Component,
        output: SimPort,
        pool: <SimulatedFramework as MediaFramework>::Pool,
        _dir: tempfile::TempDir,
        sink: SharedSink,
    }

    fn fixture(pool_size: u32) -> Fixture {
        let framework = Arc::new(SimulatedFramework::new());
        let encoder = framework
            .create_component(ComponentKind::VideoEncoder)
            .unwrap();
        let output = framework.output_port(encoder, 0).unwrap();
        let pool = framework.create_pool(output, pool_size, 256).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::create(dir.path().join("out.h264"))
            .unwrap()
            .into_shared();
        Fixture {
            framework,
            encoder,
            output,
            pool,
            _dir: dir,
            sink,
        }
    }

    impl Fixture {
        fn teardown(self) {
            self.framework.destroy_pool(self.output, self.pool);
            self.framework.destroy_component(self.encoder);
            assert!(self.framework.violations().is_empty());
        }
    }

    #[test]
    fn test_empty_buffer_released_without_resubmit_when_disabled() {
        let fx = fixture(2);
        let delivery = EncoderDelivery::new(Arc::clone(&fx.framework), fx.pool, fx.sink.clone());

        let buffer = fx.framework.pool_get(fx.pool).unwrap();
        delivery.on_buffer(fx.output, buffer).unwrap();

        let stats = delivery.stats();
        assert_eq!(stats.callbacks, 1);
        assert_eq!(stats.released_while_disabled, 1);
        assert_eq!(stats.resubmitted, 0);
        assert_eq!(fx.framework.pool_queue_len(fx.pool), 2);
        fx.teardown();
    }

    #[test]
    fn test_enabled_port_gets_exactly_one_resubmission() {
        let fx = fixture(2);
        let delivery = EncoderDelivery::new(Arc::clone(&fx.framework), fx.pool, fx.sink.clone());
        fx.framework
            .enable_port(fx.output, Box::new(|_, _| {}))
            .unwrap();

        let buffer = fx.framework.pool_get(fx.pool).unwrap();
        delivery.on_buffer(fx.output, buffer).unwrap();

        assert_eq!(delivery.stats().resubmitted, 1);
        assert_eq!(fx.framework.stats().buffers_sent, 1);
        assert_eq!(fx.framework.pool_queue_len(fx.pool), 1);

        fx.framework.disable_port(fx.output).unwrap();
        fx.teardown();
    }

    #[test]
    fn test_payload_is_appended_in_order() {
        let fx = fixture(2);
        let delivery = EncoderDelivery::new(Arc::clone(&fx.framework), fx.pool, fx.sink.clone());

        for payload in [&b"\x00\x00\x00\x01\x67"[..], &b"\x00\x00\x00\x01\x65\xaa"[..]] {
            let buffer = fx.framework.pool_get(fx.pool).unwrap();
            fx.framework.write_payload(buffer, payload).unwrap();
            delivery.on_buffer(fx.output, buffer).unwrap();
        }

        let stats = delivery.stats();
        assert_eq!(stats.payload_buffers, 2);
        assert_eq!(stats.bytes_written, 11);

        let path = {
            let mut sink = lock_sink(&fx.sink);
            sink.close().unwrap();
            sink.path().to_path_buf()
        };
        assert_eq!(
            std::fs::read(path).unwrap(),
            b"\x00\x00\x00\x01\x67\x00\x00\x00\x01\x65\xaa"
        );
        fx.teardown();
    }

    #[test]
    fn test_payload_into_closed_sink_is_fatal() {
        let fx = fixture(1);
        let delivery = EncoderDelivery::new(Arc::clone(&fx.framework), fx.pool, fx.sink.clone());
        lock_sink(&fx.sink).close().unwrap();

        let buffer = fx.framework.pool_get(fx.pool).unwrap();
        fx.framework.write_payload(buffer, b"late").unwrap();
        let err = delivery.on_buffer(fx.output, buffer).unwrap_err();

        assert!(matches!(err, VideoError::FatalInvariantViolation(_)));
        assert_eq!(fx.framework.pool_queue_len(fx.pool), 1);
        fx.teardown();
    }

    #[test]
    fn test_empty_pool_is_fatal() {
        let fx = fixture(1);
        let delivery = EncoderDelivery::new(Arc::clone(&fx.framework), fx.pool, fx.sink.clone());
        fx.framework
            .enable_port(fx.output, Box::new(|_, _| {}))
            .unwrap();

        // The returned header belongs to another pool, so ours stays drained
        let other = fx.framework.create_pool(fx.output, 1, 256).unwrap();
        let held = fx.framework.pool_get(fx.pool).unwrap();
        let foreign = fx.framework.pool_get(other).unwrap();

        let err = delivery.on_buffer(fx.output, foreign).unwrap_err();
        assert!(matches!(err, VideoError::FatalInvariantViolation(_)));

        fx.framework.disable_port(fx.output).unwrap();
        fx.framework.release_buffer(held);
        fx.framework.destroy_pool(fx.output, other);
        fx.teardown();
    }
}
