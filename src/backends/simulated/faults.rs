// SPDX-License-Identifier: GPL-3.0-only

//! Fault injection points for the simulated framework

use crate::backends::{ComponentKind, Status};

/// A framework call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Component instantiation
    ComponentCreate(ComponentKind),
    /// Component is created but exposes no output ports
    MissingOutputs(ComponentKind),
    /// Enabling a component's control port
    ControlPortEnable,
    /// Applying the camera configuration block
    CameraConfig,
    /// Committing the format of an output port
    FormatCommit { kind: ComponentKind, output: usize },
    /// Enabling a component
    ComponentEnable(ComponentKind),
    /// Allocating a buffer pool
    PoolCreate,
    /// Creating a connection
    ConnectionCreate,
    /// Enabling a connection
    ConnectionEnable,
    /// Enabling the encoder output port
    EncoderOutputEnable,
    /// Setting the capture parameter on a camera port
    CaptureTrigger,
}

impl FaultPoint {
    /// Every fault that aborts capture start-up, in the order the session meets them
    pub const STARTUP: [FaultPoint; 15] = [
        FaultPoint::ComponentCreate(ComponentKind::Camera),
        FaultPoint::MissingOutputs(ComponentKind::Camera),
        FaultPoint::ControlPortEnable,
        FaultPoint::FormatCommit {
            kind: ComponentKind::Camera,
            output: 2,
        },
        FaultPoint::FormatCommit {
            kind: ComponentKind::Camera,
            output: 0,
        },
        FaultPoint::FormatCommit {
            kind: ComponentKind::Camera,
            output: 1,
        },
        FaultPoint::ComponentEnable(ComponentKind::Camera),
        FaultPoint::ComponentCreate(ComponentKind::VideoEncoder),
        FaultPoint::FormatCommit {
            kind: ComponentKind::VideoEncoder,
            output: 0,
        },
        FaultPoint::ComponentEnable(ComponentKind::VideoEncoder),
        FaultPoint::PoolCreate,
        FaultPoint::ConnectionCreate,
        FaultPoint::ConnectionEnable,
        FaultPoint::EncoderOutputEnable,
        FaultPoint::CaptureTrigger,
    ];

    /// Status the failing call reports
    pub fn status(&self) -> Status {
        match self {
            FaultPoint::ComponentCreate(_) | FaultPoint::PoolCreate => Status::Enomem,
            FaultPoint::MissingOutputs(_) => Status::Enoent,
            FaultPoint::ComponentEnable(_) => Status::Enospc,
            FaultPoint::ConnectionCreate | FaultPoint::ConnectionEnable => Status::Eio,
            FaultPoint::ControlPortEnable
            | FaultPoint::CameraConfig
            | FaultPoint::FormatCommit { .. }
            | FaultPoint::EncoderOutputEnable
            | FaultPoint::CaptureTrigger => Status::Einval,
        }
    }
}
