// SPDX-License-Identifier: MPL-2.0

//! Tunnelled connection from the camera video port to the encoder input

use crate::backends::{ConnectionFlags, MediaFramework};
use crate::errors::{VideoError, VideoResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Live camera to encoder tunnel
pub struct StageConnection<F: MediaFramework> {
    framework: Arc<F>,
    connection: Option<F::Connection>,
}

/// Create and enable a tunnel between `source` and `sink`
///
/// Nothing is left live on failure.
pub fn connect<F: MediaFramework>(
    framework: Arc<F>,
    source: F::Port,
    sink: F::Port,
) -> VideoResult<StageConnection<F>> {
    let connection = framework
        .create_connection(source, sink, ConnectionFlags::TUNNELLED)
        .map_err(|status| {
            VideoError::connection("Failed to connect camera video port to encoder", status)
        })?;

    if let Err(status) = framework.enable_connection(connection) {
        framework.destroy_connection(connection);
        return Err(VideoError::connection(
            "Failed to enable camera to encoder connection",
            status,
        ));
    }

    info!("Camera connected to encoder");
    Ok(StageConnection {
        framework,
        connection: Some(connection),
    })
}

impl<F: MediaFramework> StageConnection<F> {
    pub fn is_live(&self) -> bool {
        self.connection.is_some()
    }

    /// Tear the tunnel down; no-op if already destroyed
    pub fn destroy(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.framework.destroy_connection(connection);
            debug!("Camera to encoder connection destroyed");
        }
    }
}

impl<F: MediaFramework> Drop for StageConnection<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}
