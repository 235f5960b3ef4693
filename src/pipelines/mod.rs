// SPDX-License-Identifier: MPL-2.0

//! Capture pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │    Camera    │ ──▶ │  Hardware encoder │ ──▶ │  .h264 file  │
//! │ (video port) │     │  (tunnelled in,   │     │ (raw stream) │
//! │              │     │   pooled out)     │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`video`]: Fixed-duration video capture session

pub mod video;
