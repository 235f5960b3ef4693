// SPDX-License-Identifier: MPL-2.0

//! Media framework abstraction
//!
//! The camera sensor pipeline and the video encoder are fixed-function
//! hardware blocks reached through a vendor media framework. This module
//! models that framework as the [`MediaFramework`] trait so the capture
//! pipeline can be written once and driven by either backend:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  pipelines::video (session) │
//! └──────────────┬──────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────┐
//! │   MediaFramework trait      │  ← create/destroy pairs, opaque handles
//! └──────┬───────────────┬──────┘
//!        │               │
//!        ▼               ▼
//!   ┌────────┐     ┌───────────┐
//!   │  MMAL  │     │ Simulated │
//!   └────────┘     └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`mmal`]: VideoCore MMAL via `mmal-sys` (feature `mmal`, ARM only)
//! - [`simulated`]: in-process camera and encoder with a resource ledger
//! - [`types`]: formats, status codes and configuration blocks

#[cfg(all(feature = "mmal", any(target_arch = "arm", target_arch = "aarch64")))]
pub mod mmal;
pub mod simulated;
pub mod types;

pub use types::*;

use std::fmt::Debug;
use std::hash::Hash;

/// Callback invoked by the framework for every buffer returned on a port
///
/// Runs on a framework-owned context, never on the thread that enabled the port.
pub type PortCallback<F> =
    Box<dyn Fn(<F as MediaFramework>::Port, <F as MediaFramework>::Buffer) + Send + Sync>;

/// Operations the capture pipeline consumes from the media framework
///
/// Handles are opaque, copyable tokens. Ownership is tracked by the pipeline
/// stages, not by the handles: every `create_*` must be paired with exactly one
/// `destroy_*`, and a handle must not be used after it is destroyed.
pub trait MediaFramework: Send + Sync + Sized + 'static {
    type Component: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    type Port: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    type Pool: Copy + Eq + Debug + Send + Sync + 'static;
    type Connection: Copy + Eq + Debug + Send + Sync + 'static;
    type Buffer: Copy + Eq + Debug + Send + Sync + 'static;

    // ===== Components =====

    /// Instantiate a hardware component
    fn create_component(&self, kind: ComponentKind) -> FrameworkResult<Self::Component>;

    /// Destroy a component and everything the framework allocated for it
    fn destroy_component(&self, component: Self::Component);

    fn enable_component(&self, component: Self::Component) -> FrameworkResult<()>;

    fn disable_component(&self, component: Self::Component);

    /// Control port used for configuration and status events
    fn control_port(&self, component: Self::Component) -> Self::Port;

    /// Number of output ports the component exposes
    fn output_count(&self, component: Self::Component) -> usize;

    fn input_port(&self, component: Self::Component, index: usize) -> Option<Self::Port>;

    fn output_port(&self, component: Self::Component, index: usize) -> Option<Self::Port>;

    // ===== Ports =====

    /// Enable a port and register the callback that receives its buffers
    fn enable_port(
        &self,
        port: Self::Port,
        callback: PortCallback<Self>,
    ) -> FrameworkResult<()>;

    /// Disable a port
    ///
    /// Buffers still held by the port are returned through its callback before
    /// this returns; no callback runs for the port afterwards.
    fn disable_port(&self, port: Self::Port) -> FrameworkResult<()>;

    fn is_port_enabled(&self, port: Self::Port) -> bool;

    fn port_format(&self, port: Self::Port) -> PortFormat;

    /// Store `format` on the port and commit it
    fn commit_port_format(&self, port: Self::Port, format: &PortFormat) -> FrameworkResult<()>;

    /// Copy the format of `source` onto `destination` without committing
    fn copy_port_format(&self, destination: Self::Port, source: Self::Port);

    fn buffer_requirements(&self, port: Self::Port) -> BufferRequirements;

    /// Set the buffer count and size the port will use once enabled
    fn set_buffer_layout(&self, port: Self::Port, num: u32, size: u32);

    fn set_bool_parameter(
        &self,
        port: Self::Port,
        parameter: BoolParameter,
        value: bool,
    ) -> FrameworkResult<()>;

    /// Apply a camera configuration block through a camera's control port
    fn set_camera_config(&self, port: Self::Port, config: &CameraConfig) -> FrameworkResult<()>;

    /// Hand a buffer to a port for the hardware to fill or consume
    fn send_buffer(&self, port: Self::Port, buffer: Self::Buffer) -> FrameworkResult<()>;

    // ===== Buffer pools =====

    fn create_pool(&self, port: Self::Port, num: u32, size: u32) -> FrameworkResult<Self::Pool>;

    fn destroy_pool(&self, port: Self::Port, pool: Self::Pool);

    /// Number of idle buffers waiting in the pool queue
    fn pool_queue_len(&self, pool: Self::Pool) -> usize;

    /// Take one idle buffer from the pool queue
    fn pool_get(&self, pool: Self::Pool) -> Option<Self::Buffer>;

    // ===== Buffer headers =====

    /// Payload length in bytes
    fn buffer_length(&self, buffer: Self::Buffer) -> usize;

    /// Lock the payload for reading, pass it to `read`, unlock
    fn read_buffer(
        &self,
        buffer: Self::Buffer,
        read: &mut dyn FnMut(&[u8]),
    ) -> FrameworkResult<()>;

    /// Return a buffer header to its owner
    fn release_buffer(&self, buffer: Self::Buffer);

    // ===== Connections =====

    fn create_connection(
        &self,
        source: Self::Port,
        sink: Self::Port,
        flags: ConnectionFlags,
    ) -> FrameworkResult<Self::Connection>;

    fn enable_connection(&self, connection: Self::Connection) -> FrameworkResult<()>;

    /// Disable (if needed) and destroy a connection
    fn destroy_connection(&self, connection: Self::Connection);
}
