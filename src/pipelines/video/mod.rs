// SPDX-License-Identifier: MPL-2.0

//! Video capture pipeline
//!
//! This module wires the camera video port to the hardware encoder and
//! streams the encoded output to a file:
//! - [`camera_stage`] and [`encoder_stage`] own one hardware component each
//! - [`connector`] tunnels camera frames into the encoder
//! - [`delivery`] keeps the encoder output port supplied with buffers
//! - [`session`] sequences everything and guarantees teardown

pub mod camera_stage;
pub mod connector;
pub mod delivery;
pub mod encoder_stage;
pub mod session;

// Re-export commonly used types
pub use camera_stage::CameraStage;
pub use connector::{StageConnection, connect};
pub use delivery::{DeliveryStats, EncoderDelivery};
pub use encoder_stage::EncoderStage;
pub use session::{CaptureSession, SessionReport, SessionState};
