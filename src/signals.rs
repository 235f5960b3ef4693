// SPDX-License-Identifier: GPL-3.0-only

//! Interrupt handling
//!
//! The handler is process-wide and installed once. With the default
//! [`SignalPolicy::Exit`] an interrupt terminates the process immediately with
//! exit code 1 and the session teardown does not run: components, the tunnel
//! and the pool are left to the framework and the output file is not synced.
//! [`SignalPolicy::Cooperative`] instead cancels the session's wait so the
//! normal teardown runs before the process exits with code 1.

use crate::errors::{VideoError, VideoResult};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What an interrupt signal does to a running capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPolicy {
    /// Exit with code 1 at once, skipping teardown
    #[default]
    Exit,
    /// Cancel the capture wait and let the session tear down
    Cooperative,
}

/// How a capture wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed
    Elapsed,
    /// The token was cancelled first
    Cancelled,
}

/// One-shot cancellation flag the capture wait blocks on
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every waiter
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `duration` has elapsed or the token is cancelled
    pub fn wait(&self, duration: Duration) -> WaitOutcome {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);

        // Loop only to absorb spurious wakeups
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Elapsed;
            }
            cancelled = condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        WaitOutcome::Cancelled
    }
}

/// Install the process-wide interrupt handler
///
/// Fails if a handler is already installed.
pub fn install(policy: SignalPolicy, token: CancelToken) -> VideoResult<()> {
    let result = match policy {
        SignalPolicy::Exit => ctrlc::set_handler(|| {
            warn!("Interrupted, exiting without teardown");
            std::process::exit(1);
        }),
        SignalPolicy::Cooperative => ctrlc::set_handler(move || {
            warn!("Interrupted, stopping capture");
            token.cancel();
        }),
    };

    result.map_err(|e| VideoError::ConfigurationFailure {
        message: format!("Failed to install interrupt handler: {}", e),
        status: None,
    })?;

    info!(?policy, "Installed interrupt handler");
    Ok(())
}
