// SPDX-License-Identifier: GPL-3.0-only

//! Frame clock of a simulated encoder
//!
//! One thread per enabled encoder. It ticks at the frame rate propagated to
//! the encoder input and asks the framework to deliver a frame on each tick.
//! The thread holds only a weak reference so the framework can be dropped
//! while it runs.

use super::Shared;
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }

    /// Sleep until `deadline`; returns true if stopped first
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            stopped = self
                .condvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

pub(super) struct EncoderThread {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl EncoderThread {
    pub(super) fn spawn(shared: Weak<Shared>, component: u32) -> io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name(format!("sim-encoder-{}", component))
            .spawn(move || run(shared, component, thread_signal))?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop the clock and wait for the in-flight delivery to finish
    pub(super) fn stop(mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Simulated encoder thread panicked");
        }
    }
}

impl Drop for EncoderThread {
    fn drop(&mut self) {
        // May run on the encoder thread itself, so never join here
        self.signal.stop();
    }
}

fn run(shared: Weak<Shared>, component: u32, signal: Arc<StopSignal>) {
    debug!(component, "Simulated encoder started");

    let mut next = Instant::now();
    let mut frame_index = 0u64;

    loop {
        let Some(interval) = shared.upgrade().and_then(|s| s.frame_interval(component)) else {
            break;
        };
        next += interval;

        if signal.wait_until(next) {
            break;
        }

        let Some(framework) = shared.upgrade() else {
            break;
        };
        if framework.deliver_frame(component, frame_index) {
            frame_index += 1;
        }
    }

    debug!(component, frames = frame_index, "Simulated encoder stopped");
}
