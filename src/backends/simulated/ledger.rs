// SPDX-License-Identifier: GPL-3.0-only

//! Record of every lifecycle call made against the simulated framework

use super::{SimComponent, SimConnection, SimPool, SimPort};
use crate::backends::{BoolParameter, ComponentKind, ConnectionFlags, PortFormat};

/// Lifecycle call observed by the simulated framework, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkEvent {
    ComponentCreated {
        component: SimComponent,
        kind: ComponentKind,
    },
    ComponentEnabled(SimComponent),
    ComponentDisabled(SimComponent),
    ComponentDestroyed(SimComponent),
    CameraConfigured(SimComponent),
    PortEnabled(SimPort),
    PortDisabled(SimPort),
    FormatCommitted {
        port: SimPort,
        format: PortFormat,
    },
    ParameterSet {
        port: SimPort,
        parameter: BoolParameter,
        value: bool,
    },
    PoolCreated {
        pool: SimPool,
        port: SimPort,
        num: u32,
        size: u32,
    },
    PoolDestroyed(SimPool),
    ConnectionCreated {
        connection: SimConnection,
        source: SimPort,
        sink: SimPort,
        flags: ConnectionFlags,
    },
    ConnectionEnabled(SimConnection),
    ConnectionDestroyed(SimConnection),
}

/// Resources created by the client and not yet destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveResources {
    pub components: usize,
    pub pools: usize,
    pub connections: usize,
}

impl LiveResources {
    pub fn is_empty(&self) -> bool {
        self.components == 0 && self.pools == 0 && self.connections == 0
    }
}

/// Buffer traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulatedStats {
    /// Buffers handed to ports by the client
    pub buffers_sent: u64,
    /// Filled encoder buffers returned through the output callback
    pub buffers_delivered: u64,
    /// Payload bytes in delivered buffers
    pub bytes_delivered: u64,
    /// Frames the encoder dropped because no output buffer was queued
    pub stalls: u64,
    /// Control port events delivered
    pub control_events: u64,
    /// Buffer headers released back to their pool
    pub buffers_released: u64,
}
