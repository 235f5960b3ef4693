// SPDX-License-Identifier: GPL-3.0-only

//! Simulated media framework
//!
//! In-process camera and encoder that honour the same contracts as the
//! VideoCore components: buffers come back on a framework-owned thread,
//! disabling a port flushes what it holds, and a connection propagates the
//! source format to its sink. Every lifecycle call is recorded so callers can
//! check ordering, and misuse (double destroy, a pool outliving its component,
//! a double release) is collected as a violation instead of crashing.
//!
//! Any fallible start-up call can be made to fail through [`FaultPoint`].

mod encoder_thread;
mod faults;
mod ledger;
mod stream;

pub use faults::FaultPoint;
pub use ledger::{FrameworkEvent, LiveResources, SimulatedStats};
pub use stream::parse_frame_indices;

use super::{
    BoolParameter, BufferRequirements, CameraConfig, ComponentKind, ConnectionFlags, Encoding,
    FrameworkResult, MediaFramework, PortCallback, PortFormat, Status,
};
use crate::constants::DEFAULT_FRAME_RATE;
use encoder_thread::EncoderThread;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const CONTROL_EVENT_SIZE: usize = 64;
const MIN_FRAME_SIZE: usize = 64;
const UNRATED_FRAME_SIZE: usize = 4096;

// ===== Handles =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimComponent(u32);

impl SimComponent {
    pub fn id(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Control,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimPort {
    pub component: SimComponent,
    pub kind: PortKind,
    pub index: usize,
}

impl SimPort {
    fn new(component: u32, kind: PortKind, index: usize) -> Self {
        Self {
            component: SimComponent(component),
            kind,
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimPool(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimConnection(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimBuffer {
    pool: u32,
    index: usize,
}

// ===== Hardware profile =====

/// Port layout and buffer negotiation values the simulated components report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProfile {
    pub camera_outputs: usize,
    pub camera_port_buffers: BufferRequirements,
    pub encoder_input_buffers: BufferRequirements,
    pub encoder_output_buffers: BufferRequirements,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            camera_outputs: 3,
            camera_port_buffers: BufferRequirements {
                num: 1,
                num_min: 1,
                num_recommended: 1,
                size: 128,
                size_min: 128,
                size_recommended: 128,
            },
            encoder_input_buffers: BufferRequirements {
                num: 1,
                num_min: 1,
                num_recommended: 1,
                size: 128,
                size_min: 128,
                size_recommended: 128,
            },
            encoder_output_buffers: BufferRequirements {
                num: 1,
                num_min: 1,
                num_recommended: 3,
                size: 2048,
                size_min: 2048,
                size_recommended: 65536,
            },
        }
    }
}

/// Builder for [`SimulatedFramework`]
#[derive(Debug, Default)]
pub struct SimulatedBuilder {
    profile: HardwareProfile,
    faults: HashSet<FaultPoint>,
}

impl SimulatedBuilder {
    pub fn profile(mut self, profile: HardwareProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn encoder_output_buffers(mut self, buffers: BufferRequirements) -> Self {
        self.profile.encoder_output_buffers = buffers;
        self
    }

    /// Make the given call fail every time it is made
    pub fn fail_at(mut self, point: FaultPoint) -> Self {
        self.faults.insert(point);
        self
    }

    pub fn build(self) -> SimulatedFramework {
        SimulatedFramework {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                delivery: Mutex::new(()),
                profile: self.profile,
                faults: self.faults,
            }),
        }
    }
}

// ===== Registry =====

type SharedCallback = Arc<PortCallback<SimulatedFramework>>;

struct PortState {
    format: PortFormat,
    buffers: BufferRequirements,
    enabled: bool,
    capture: bool,
    callback: Option<SharedCallback>,
    /// Buffers handed to the port and not yet returned
    queued: VecDeque<SimBuffer>,
}

impl PortState {
    fn new(format: PortFormat, buffers: BufferRequirements) -> Self {
        Self {
            format,
            buffers,
            enabled: false,
            capture: false,
            callback: None,
            queued: VecDeque::new(),
        }
    }
}

struct ComponentState {
    kind: ComponentKind,
    enabled: bool,
    control: PortState,
    inputs: Vec<PortState>,
    outputs: Vec<PortState>,
    control_pool: u32,
    encoder: Option<EncoderThread>,
}

struct BufferSlot {
    data: Vec<u8>,
    length: usize,
}

struct PoolState {
    port: SimPort,
    /// Owned by the framework, not the client
    internal: bool,
    slots: Vec<BufferSlot>,
    idle: VecDeque<usize>,
}

impl PoolState {
    fn new(port: SimPort, internal: bool, num: u32, size: usize) -> Self {
        Self {
            port,
            internal,
            slots: (0..num)
                .map(|_| BufferSlot {
                    data: vec![0; size],
                    length: 0,
                })
                .collect(),
            idle: (0..num as usize).collect(),
        }
    }
}

struct ConnectionState {
    source: SimPort,
    sink: SimPort,
    enabled: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u32,
    components: HashMap<u32, ComponentState>,
    pools: HashMap<u32, PoolState>,
    connections: HashMap<u32, ConnectionState>,
    events: Vec<FrameworkEvent>,
    violations: Vec<String>,
    stats: SimulatedStats,
    delivered_lengths: Vec<usize>,
    last_camera_config: Option<CameraConfig>,
}

impl Registry {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, event: FrameworkEvent) {
        self.events.push(event);
    }

    fn violation(&mut self, message: String) {
        warn!(%message, "Framework contract violated");
        self.violations.push(message);
    }

    fn kind_of(&self, component: SimComponent) -> Option<ComponentKind> {
        self.components.get(&component.0).map(|c| c.kind)
    }

    fn port(&self, port: SimPort) -> Option<&PortState> {
        let component = self.components.get(&port.component.0)?;
        match port.kind {
            PortKind::Control => Some(&component.control),
            PortKind::Input => component.inputs.get(port.index),
            PortKind::Output => component.outputs.get(port.index),
        }
    }

    fn port_mut(&mut self, port: SimPort) -> Option<&mut PortState> {
        let component = self.components.get_mut(&port.component.0)?;
        match port.kind {
            PortKind::Control => Some(&mut component.control),
            PortKind::Input => component.inputs.get_mut(port.index),
            PortKind::Output => component.outputs.get_mut(port.index),
        }
    }

    fn slot(&self, buffer: SimBuffer) -> Option<&BufferSlot> {
        self.pools.get(&buffer.pool)?.slots.get(buffer.index)
    }

    fn slot_mut(&mut self, buffer: SimBuffer) -> Option<&mut BufferSlot> {
        self.pools.get_mut(&buffer.pool)?.slots.get_mut(buffer.index)
    }

    fn is_connected(&self, port: SimPort) -> bool {
        self.connections
            .values()
            .any(|c| c.source == port || c.sink == port)
    }

    /// Fill a control buffer announcing that the camera started
    fn take_control_event(
        &mut self,
        component: SimComponent,
    ) -> Option<(SharedCallback, SimPort, SimBuffer)> {
        let port = SimPort::new(component.0, PortKind::Control, 0);
        let state = self.port(port)?;
        if !state.enabled {
            return None;
        }
        let callback = Arc::clone(state.callback.as_ref()?);

        let pool = self.components.get(&component.0)?.control_pool;
        let index = self.pools.get_mut(&pool)?.idle.pop_front()?;
        let buffer = SimBuffer { pool, index };

        let slot = self.slot_mut(buffer)?;
        let message = b"camera ready";
        slot.data[..message.len()].copy_from_slice(message);
        slot.length = message.len();
        self.stats.control_events += 1;

        Some((callback, port, buffer))
    }
}

// ===== Framework =====

struct Shared {
    registry: Mutex<Registry>,
    /// Held across every encoder delivery; `disable_port` takes it first so no
    /// delivery is in flight once a port reports disabled
    delivery: Mutex<()>,
    profile: HardwareProfile,
    faults: HashSet<FaultPoint>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn injects(&self, point: FaultPoint) -> Option<Status> {
        self.faults.contains(&point).then(|| {
            debug!(?point, "Injecting framework fault");
            point.status()
        })
    }

    /// Frame period of an encoder, `None` once it is destroyed
    fn frame_interval(&self, component: u32) -> Option<Duration> {
        let registry = self.registry();
        let state = registry.components.get(&component)?;
        let rate = state
            .inputs
            .first()
            .map(|p| p.format.video.frame_rate)
            .unwrap_or_default();

        if rate.num > 0 && rate.den > 0 {
            Some(Duration::from_secs_f64(rate.den as f64 / rate.num as f64))
        } else {
            Some(Duration::from_secs(1) / DEFAULT_FRAME_RATE)
        }
    }

    /// Encode one frame into the next queued output buffer and return it
    ///
    /// Returns false when the encoder is not fed, its output is disabled, or
    /// no buffer is queued (the frame is dropped).
    fn deliver_frame(&self, component: u32, frame_index: u64) -> bool {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let Some((callback, port, buffer)) = self.fill_output_buffer(component, frame_index) else {
            return false;
        };
        callback(port, buffer);
        true
    }

    fn fill_output_buffer(
        &self,
        component: u32,
        frame_index: u64,
    ) -> Option<(SharedCallback, SimPort, SimBuffer)> {
        let mut registry = self.registry();
        let input = SimPort::new(component, PortKind::Input, 0);
        let output = SimPort::new(component, PortKind::Output, 0);

        if !registry.components.get(&component)?.enabled {
            return None;
        }

        let fed = registry.connections.values().any(|c| {
            c.enabled && c.sink == input && registry.port(c.source).is_some_and(|p| p.capture)
        });
        if !fed {
            return None;
        }

        let frame_rate = registry.port(input)?.format.video.frame_rate;
        let port = registry.port(output)?;
        if !port.enabled {
            return None;
        }
        let callback = Arc::clone(port.callback.as_ref()?);
        let (encoding, bitrate) = (port.format.encoding, port.format.bitrate);

        let Some(buffer) = registry.port_mut(output)?.queued.pop_front() else {
            registry.stats.stalls += 1;
            return None;
        };

        let fps = if frame_rate.num > 0 && frame_rate.den > 0 {
            (frame_rate.num / frame_rate.den).max(1) as u64
        } else {
            DEFAULT_FRAME_RATE as u64
        };
        let target = if bitrate == 0 {
            UNRATED_FRAME_SIZE
        } else {
            (bitrate as u64 / 8 / fps) as usize
        };

        let slot = registry.slot_mut(buffer)?;
        let size = target.max(MIN_FRAME_SIZE).min(slot.data.len());
        let frame = stream::synthetic_frame(encoding, frame_index, fps, size);
        slot.data[..frame.len()].copy_from_slice(&frame);
        slot.length = frame.len();

        registry.stats.buffers_delivered += 1;
        registry.stats.bytes_delivered += frame.len() as u64;
        registry.delivered_lengths.push(frame.len());

        Some((callback, output, buffer))
    }
}

/// In-process media framework
pub struct SimulatedFramework {
    shared: Arc<Shared>,
}

impl Default for SimulatedFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedFramework {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SimulatedBuilder {
        SimulatedBuilder::default()
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.shared.profile
    }

    /// Lifecycle calls made so far, in order
    pub fn events(&self) -> Vec<FrameworkEvent> {
        self.shared.registry().events.clone()
    }

    /// Contract violations observed so far
    pub fn violations(&self) -> Vec<String> {
        self.shared.registry().violations.clone()
    }

    /// Client-created resources not yet destroyed
    pub fn live_resources(&self) -> LiveResources {
        let registry = self.shared.registry();
        LiveResources {
            components: registry.components.len(),
            pools: registry.pools.values().filter(|p| !p.internal).count(),
            connections: registry.connections.len(),
        }
    }

    pub fn stats(&self) -> SimulatedStats {
        self.shared.registry().stats
    }

    /// Payload length of every delivered encoder buffer, in delivery order
    pub fn delivered_lengths(&self) -> Vec<usize> {
        self.shared.registry().delivered_lengths.clone()
    }

    pub fn last_camera_config(&self) -> Option<CameraConfig> {
        self.shared.registry().last_camera_config
    }

    /// Fill a buffer the way the encoder would, truncating to its capacity
    pub fn write_payload(&self, buffer: SimBuffer, payload: &[u8]) -> FrameworkResult<()> {
        let mut registry = self.shared.registry();
        let slot = registry.slot_mut(buffer).ok_or(Status::Einval)?;
        let length = payload.len().min(slot.data.len());
        slot.data[..length].copy_from_slice(&payload[..length]);
        slot.length = length;
        Ok(())
    }

    fn dispatch_control_event(&self, event: Option<(SharedCallback, SimPort, SimBuffer)>) {
        let Some((callback, port, buffer)) = event else {
            return;
        };

        let spawned = thread::Builder::new()
            .name("sim-control".into())
            .spawn(move || callback(port, buffer));

        match spawned {
            Ok(handle) => {
                if handle.join().is_err() {
                    warn!("Control port callback panicked");
                }
            }
            Err(e) => warn!(error = %e, "Failed to deliver control event"),
        }
    }
}

impl MediaFramework for SimulatedFramework {
    type Component = SimComponent;
    type Port = SimPort;
    type Pool = SimPool;
    type Connection = SimConnection;
    type Buffer = SimBuffer;

    // ===== Components =====

    fn create_component(&self, kind: ComponentKind) -> FrameworkResult<SimComponent> {
        if let Some(status) = self.shared.injects(FaultPoint::ComponentCreate(kind)) {
            return Err(status);
        }

        let profile = self.shared.profile;
        let missing_outputs = self.shared.injects(FaultPoint::MissingOutputs(kind)).is_some();

        let (inputs, outputs) = match kind {
            ComponentKind::Camera => {
                let format = PortFormat {
                    encoding: Encoding::Opaque,
                    encoding_variant: Some(Encoding::I420),
                    ..Default::default()
                };
                let count = if missing_outputs { 0 } else { profile.camera_outputs };
                let outputs = (0..count)
                    .map(|_| PortState::new(format, profile.camera_port_buffers))
                    .collect();
                (Vec::new(), outputs)
            }
            ComponentKind::VideoEncoder => {
                let format = PortFormat {
                    encoding: Encoding::H264,
                    ..Default::default()
                };
                let count = if missing_outputs { 0 } else { 1 };
                let outputs = (0..count)
                    .map(|_| PortState::new(format, profile.encoder_output_buffers))
                    .collect();
                let inputs = vec![PortState::new(
                    PortFormat::default(),
                    profile.encoder_input_buffers,
                )];
                (inputs, outputs)
            }
        };

        let mut registry = self.shared.registry();
        let id = registry.next_id();
        let component = SimComponent(id);

        let control_pool = registry.next_id();
        registry.pools.insert(
            control_pool,
            PoolState::new(
                SimPort::new(id, PortKind::Control, 0),
                true,
                1,
                CONTROL_EVENT_SIZE,
            ),
        );

        registry.components.insert(
            id,
            ComponentState {
                kind,
                enabled: false,
                control: PortState::new(PortFormat::default(), BufferRequirements::default()),
                inputs,
                outputs,
                control_pool,
                encoder: None,
            },
        );
        registry.record(FrameworkEvent::ComponentCreated { component, kind });

        debug!(%kind, id, "Created simulated component");
        Ok(component)
    }

    fn destroy_component(&self, component: SimComponent) {
        let (state, encoder) = {
            let mut registry = self.shared.registry();
            let Some(mut state) = registry.components.remove(&component.0) else {
                registry.violation(format!("destroy of unknown component {}", component.0));
                return;
            };

            let leaked_pools: Vec<u32> = registry
                .pools
                .iter()
                .filter(|(_, p)| !p.internal && p.port.component == component)
                .map(|(id, _)| *id)
                .collect();
            for pool in leaked_pools {
                registry.violation(format!(
                    "pool {} outlived component {}",
                    pool, component.0
                ));
            }

            let dangling: Vec<u32> = registry
                .connections
                .iter()
                .filter(|(_, c)| c.source.component == component || c.sink.component == component)
                .map(|(id, _)| *id)
                .collect();
            for connection in dangling {
                registry.violation(format!(
                    "connection {} outlived component {}",
                    connection, component.0
                ));
            }

            registry.pools.remove(&state.control_pool);
            registry.record(FrameworkEvent::ComponentDestroyed(component));

            let encoder = state.encoder.take();
            (state, encoder)
        };

        if let Some(encoder) = encoder {
            encoder.stop();
        }
        drop(state);
        debug!(id = component.0, "Destroyed simulated component");
    }

    fn enable_component(&self, component: SimComponent) -> FrameworkResult<()> {
        let mut registry = self.shared.registry();

        let Some(kind) = registry.kind_of(component) else {
            registry.violation(format!("enable of unknown component {}", component.0));
            return Err(Status::Einval);
        };
        if let Some(status) = self.shared.injects(FaultPoint::ComponentEnable(kind)) {
            return Err(status);
        }

        let Some(state) = registry.components.get_mut(&component.0) else {
            return Err(Status::Einval);
        };
        if kind == ComponentKind::VideoEncoder && state.encoder.is_none() {
            let encoder = EncoderThread::spawn(Arc::downgrade(&self.shared), component.0)
                .map_err(|e| {
                    warn!(error = %e, "Failed to start simulated encoder");
                    Status::Enospc
                })?;
            state.encoder = Some(encoder);
        }
        state.enabled = true;
        registry.record(FrameworkEvent::ComponentEnabled(component));

        let control_event = match kind {
            ComponentKind::Camera => registry.take_control_event(component),
            ComponentKind::VideoEncoder => None,
        };
        drop(registry);

        self.dispatch_control_event(control_event);
        Ok(())
    }

    fn disable_component(&self, component: SimComponent) {
        let encoder = {
            let mut registry = self.shared.registry();
            let Some(state) = registry.components.get_mut(&component.0) else {
                registry.violation(format!("disable of unknown component {}", component.0));
                return;
            };
            state.enabled = false;
            let encoder = state.encoder.take();
            registry.record(FrameworkEvent::ComponentDisabled(component));
            encoder
        };

        if let Some(encoder) = encoder {
            encoder.stop();
        }
    }

    fn control_port(&self, component: SimComponent) -> SimPort {
        SimPort::new(component.0, PortKind::Control, 0)
    }

    fn output_count(&self, component: SimComponent) -> usize {
        self.shared
            .registry()
            .components
            .get(&component.0)
            .map_or(0, |c| c.outputs.len())
    }

    fn input_port(&self, component: SimComponent, index: usize) -> Option<SimPort> {
        let port = SimPort::new(component.0, PortKind::Input, index);
        self.shared.registry().port(port).map(|_| port)
    }

    fn output_port(&self, component: SimComponent, index: usize) -> Option<SimPort> {
        let port = SimPort::new(component.0, PortKind::Output, index);
        self.shared.registry().port(port).map(|_| port)
    }

    // ===== Ports =====

    fn enable_port(&self, port: SimPort, callback: PortCallback<Self>) -> FrameworkResult<()> {
        let mut registry = self.shared.registry();

        let Some(kind) = registry.kind_of(port.component) else {
            registry.violation(format!("enable of port on unknown component {:?}", port));
            return Err(Status::Einval);
        };
        let fault = match (port.kind, kind) {
            (PortKind::Control, _) => Some(FaultPoint::ControlPortEnable),
            (PortKind::Output, ComponentKind::VideoEncoder) => Some(FaultPoint::EncoderOutputEnable),
            _ => None,
        };
        if let Some(status) = fault.and_then(|point| self.shared.injects(point)) {
            return Err(status);
        }

        let state = registry.port_mut(port).ok_or(Status::Einval)?;
        if state.enabled {
            return Err(Status::Einval);
        }
        state.enabled = true;
        state.callback = Some(Arc::new(callback));
        registry.record(FrameworkEvent::PortEnabled(port));
        Ok(())
    }

    fn disable_port(&self, port: SimPort) -> FrameworkResult<()> {
        let _delivery = self
            .shared
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (callback, flushed) = {
            let mut registry = self.shared.registry();
            let state = registry.port_mut(port).ok_or(Status::Einval)?;
            if !state.enabled {
                return Err(Status::Einval);
            }
            state.enabled = false;
            let flushed: Vec<SimBuffer> = state.queued.drain(..).collect();
            let callback = state.callback.clone();

            for buffer in &flushed {
                if let Some(slot) = registry.slot_mut(*buffer) {
                    slot.length = 0;
                }
            }
            (callback, flushed)
        };

        // Buffers still held by the port go back through its callback, empty
        if let Some(callback) = &callback {
            for buffer in flushed {
                callback(port, buffer);
            }
        }

        let released = {
            let mut registry = self.shared.registry();
            let released = registry.port_mut(port).and_then(|state| state.callback.take());
            registry.record(FrameworkEvent::PortDisabled(port));
            released
        };
        drop(released);
        Ok(())
    }

    fn is_port_enabled(&self, port: SimPort) -> bool {
        self.shared
            .registry()
            .port(port)
            .is_some_and(|state| state.enabled)
    }

    fn port_format(&self, port: SimPort) -> PortFormat {
        self.shared
            .registry()
            .port(port)
            .map_or_else(PortFormat::default, |state| state.format)
    }

    fn commit_port_format(&self, port: SimPort, format: &PortFormat) -> FrameworkResult<()> {
        let mut registry = self.shared.registry();

        let kind = registry.kind_of(port.component).ok_or(Status::Einval)?;
        if port.kind == PortKind::Control {
            return Err(Status::Einval);
        }
        if port.kind == PortKind::Output
            && let Some(status) = self.shared.injects(FaultPoint::FormatCommit {
                kind,
                output: port.index,
            })
        {
            return Err(status);
        }

        let state = registry.port_mut(port).ok_or(Status::Einval)?;
        state.format = *format;
        registry.record(FrameworkEvent::FormatCommitted {
            port,
            format: *format,
        });
        Ok(())
    }

    fn copy_port_format(&self, destination: SimPort, source: SimPort) {
        let mut registry = self.shared.registry();
        let Some(format) = registry.port(source).map(|state| state.format) else {
            return;
        };
        if let Some(state) = registry.port_mut(destination) {
            state.format = format;
        }
    }

    fn buffer_requirements(&self, port: SimPort) -> BufferRequirements {
        self.shared
            .registry()
            .port(port)
            .map_or_else(BufferRequirements::default, |state| state.buffers)
    }

    fn set_buffer_layout(&self, port: SimPort, num: u32, size: u32) {
        if let Some(state) = self.shared.registry().port_mut(port) {
            state.buffers.num = num;
            state.buffers.size = size;
        }
    }

    fn set_bool_parameter(
        &self,
        port: SimPort,
        parameter: BoolParameter,
        value: bool,
    ) -> FrameworkResult<()> {
        if let Some(status) = self.shared.injects(FaultPoint::CaptureTrigger) {
            return Err(status);
        }

        let mut registry = self.shared.registry();
        let kind = registry.kind_of(port.component).ok_or(Status::Einval)?;
        if kind != ComponentKind::Camera || port.kind != PortKind::Output {
            return Err(Status::Enosys);
        }

        let state = registry.port_mut(port).ok_or(Status::Einval)?;
        match parameter {
            BoolParameter::Capture => state.capture = value,
        }
        registry.record(FrameworkEvent::ParameterSet {
            port,
            parameter,
            value,
        });
        Ok(())
    }

    fn set_camera_config(&self, port: SimPort, config: &CameraConfig) -> FrameworkResult<()> {
        if let Some(status) = self.shared.injects(FaultPoint::CameraConfig) {
            return Err(status);
        }

        let mut registry = self.shared.registry();
        if registry.kind_of(port.component) != Some(ComponentKind::Camera)
            || port.kind != PortKind::Control
        {
            return Err(Status::Einval);
        }

        registry.last_camera_config = Some(*config);
        registry.record(FrameworkEvent::CameraConfigured(port.component));
        Ok(())
    }

    fn send_buffer(&self, port: SimPort, buffer: SimBuffer) -> FrameworkResult<()> {
        let mut registry = self.shared.registry();

        if !registry.pools.contains_key(&buffer.pool) {
            registry.violation(format!("send of buffer from unknown pool {}", buffer.pool));
            return Err(Status::Einval);
        }

        let state = registry.port_mut(port).ok_or(Status::Einval)?;
        if !state.enabled {
            return Err(Status::Einval);
        }
        if state.queued.contains(&buffer) {
            registry.violation(format!("buffer {:?} sent twice", buffer));
            return Err(Status::Einval);
        }
        state.queued.push_back(buffer);
        registry.stats.buffers_sent += 1;
        Ok(())
    }

    // ===== Buffer pools =====

    fn create_pool(&self, port: SimPort, num: u32, size: u32) -> FrameworkResult<SimPool> {
        if let Some(status) = self.shared.injects(FaultPoint::PoolCreate) {
            return Err(status);
        }
        if num == 0 {
            return Err(Status::Einval);
        }

        let mut registry = self.shared.registry();
        if registry.port(port).is_none() {
            return Err(Status::Einval);
        }

        let id = registry.next_id();
        registry
            .pools
            .insert(id, PoolState::new(port, false, num, size as usize));
        registry.record(FrameworkEvent::PoolCreated {
            pool: SimPool(id),
            port,
            num,
            size,
        });
        Ok(SimPool(id))
    }

    fn destroy_pool(&self, port: SimPort, pool: SimPool) {
        let mut registry = self.shared.registry();

        let Some(state) = registry.pools.get(&pool.0) else {
            registry.violation(format!("destroy of unknown pool {}", pool.0));
            return;
        };
        let foreign = state.internal || state.port != port;
        if foreign {
            registry.violation(format!("pool {} destroyed through the wrong port", pool.0));
        }
        if registry.port(port).is_some_and(|p| p.enabled) {
            registry.violation(format!("pool {} destroyed while its port is enabled", pool.0));
        }

        if let Some(state) = registry.port_mut(port) {
            state.queued.retain(|b| b.pool != pool.0);
        }
        registry.pools.remove(&pool.0);
        registry.record(FrameworkEvent::PoolDestroyed(pool));
    }

    fn pool_queue_len(&self, pool: SimPool) -> usize {
        self.shared
            .registry()
            .pools
            .get(&pool.0)
            .map_or(0, |p| p.idle.len())
    }

    fn pool_get(&self, pool: SimPool) -> Option<SimBuffer> {
        let index = self.shared.registry().pools.get_mut(&pool.0)?.idle.pop_front()?;
        Some(SimBuffer {
            pool: pool.0,
            index,
        })
    }

    // ===== Buffer headers =====

    fn buffer_length(&self, buffer: SimBuffer) -> usize {
        self.shared
            .registry()
            .slot(buffer)
            .map_or(0, |slot| slot.length)
    }

    fn read_buffer(&self, buffer: SimBuffer, read: &mut dyn FnMut(&[u8])) -> FrameworkResult<()> {
        let payload = {
            let registry = self.shared.registry();
            let slot = registry.slot(buffer).ok_or(Status::Einval)?;
            slot.data[..slot.length].to_vec()
        };
        read(&payload);
        Ok(())
    }

    fn release_buffer(&self, buffer: SimBuffer) {
        let mut registry = self.shared.registry();

        let Some(pool) = registry.pools.get_mut(&buffer.pool) else {
            registry.violation(format!("release of buffer from destroyed pool {}", buffer.pool));
            return;
        };
        if pool.idle.contains(&buffer.index) {
            registry.violation(format!("buffer {:?} released twice", buffer));
            return;
        }
        if let Some(slot) = pool.slots.get_mut(buffer.index) {
            slot.length = 0;
        }
        pool.idle.push_back(buffer.index);
        registry.stats.buffers_released += 1;
    }

    // ===== Connections =====

    fn create_connection(
        &self,
        source: SimPort,
        sink: SimPort,
        flags: ConnectionFlags,
    ) -> FrameworkResult<SimConnection> {
        if let Some(status) = self.shared.injects(FaultPoint::ConnectionCreate) {
            return Err(status);
        }
        if source.kind != PortKind::Output || sink.kind != PortKind::Input {
            return Err(Status::Einval);
        }

        let mut registry = self.shared.registry();
        let format = registry.port(source).ok_or(Status::Einval)?.format;
        if registry.port(sink).is_none() {
            return Err(Status::Einval);
        }
        if registry.is_connected(source) || registry.is_connected(sink) {
            return Err(Status::Eisconn);
        }

        // The sink takes the source format
        if let Some(state) = registry.port_mut(sink) {
            state.format = format;
        }

        let id = registry.next_id();
        registry.connections.insert(
            id,
            ConnectionState {
                source,
                sink,
                enabled: false,
            },
        );
        registry.record(FrameworkEvent::ConnectionCreated {
            connection: SimConnection(id),
            source,
            sink,
            flags,
        });
        Ok(SimConnection(id))
    }

    fn enable_connection(&self, connection: SimConnection) -> FrameworkResult<()> {
        if let Some(status) = self.shared.injects(FaultPoint::ConnectionEnable) {
            return Err(status);
        }

        let mut registry = self.shared.registry();
        let Some(state) = registry.connections.get_mut(&connection.0) else {
            registry.violation(format!("enable of unknown connection {}", connection.0));
            return Err(Status::Einval);
        };
        state.enabled = true;
        registry.record(FrameworkEvent::ConnectionEnabled(connection));
        Ok(())
    }

    fn destroy_connection(&self, connection: SimConnection) {
        let mut registry = self.shared.registry();
        if registry.connections.remove(&connection.0).is_none() {
            registry.violation(format!("destroy of unknown connection {}", connection.0));
            return;
        }
        registry.record(FrameworkEvent::ConnectionDestroyed(connection));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Rational, VideoFormat};
    use std::sync::mpsc;

    fn camera_format() -> PortFormat {
        PortFormat {
            encoding: Encoding::Opaque,
            encoding_variant: Some(Encoding::I420),
            bitrate: 0,
            video: VideoFormat {
                width: 640,
                height: 480,
                frame_rate: Rational { num: 100, den: 1 },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_create_destroy_leaves_nothing_live() {
        let framework = SimulatedFramework::new();
        let camera = framework.create_component(ComponentKind::Camera).unwrap();
        assert_eq!(framework.output_count(camera), 3);
        assert_eq!(framework.live_resources().components, 1);

        framework.destroy_component(camera);
        assert!(framework.live_resources().is_empty());
        assert!(framework.violations().is_empty());
    }

    #[test]
    fn test_double_destroy_is_a_violation() {
        let framework = SimulatedFramework::new();
        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        framework.destroy_component(encoder);
        framework.destroy_component(encoder);
        assert_eq!(framework.violations().len(), 1);
    }

    #[test]
    fn test_pool_outliving_component_is_a_violation() {
        let framework = SimulatedFramework::new();
        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        let output = framework.output_port(encoder, 0).unwrap();
        let pool = framework.create_pool(output, 2, 256).unwrap();

        framework.destroy_component(encoder);
        assert_eq!(framework.live_resources().pools, 1);
        assert!(framework.violations()[0].contains("outlived"));

        framework.destroy_pool(output, pool);
        assert!(framework.live_resources().is_empty());
    }

    #[test]
    fn test_injected_fault_reports_status() {
        let framework = SimulatedFramework::builder()
            .fail_at(FaultPoint::ComponentCreate(ComponentKind::VideoEncoder))
            .build();
        assert!(framework.create_component(ComponentKind::Camera).is_ok());
        assert_eq!(
            framework.create_component(ComponentKind::VideoEncoder),
            Err(Status::Enomem)
        );
    }

    #[test]
    fn test_disable_flushes_queued_buffers_empty() {
        let framework = SimulatedFramework::new();
        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        let output = framework.output_port(encoder, 0).unwrap();
        let pool = framework.create_pool(output, 2, 256).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        framework
            .enable_port(
                output,
                Box::new(move |_, buffer| {
                    let _ = tx.lock().unwrap().send(buffer);
                }),
            )
            .unwrap();

        while let Some(buffer) = framework.pool_get(pool) {
            framework.send_buffer(output, buffer).unwrap();
        }
        framework.disable_port(output).unwrap();

        let flushed: Vec<SimBuffer> = rx.try_iter().collect();
        assert_eq!(flushed.len(), 2);
        assert!(flushed.iter().all(|b| framework.buffer_length(*b) == 0));
        assert_eq!(framework.disable_port(output), Err(Status::Einval));

        for buffer in flushed {
            framework.release_buffer(buffer);
        }
        framework.destroy_pool(output, pool);
        framework.destroy_component(encoder);
        assert!(framework.violations().is_empty());
    }

    #[test]
    fn test_connection_propagates_format() {
        let framework = SimulatedFramework::new();
        let camera = framework.create_component(ComponentKind::Camera).unwrap();
        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        let video = framework.output_port(camera, 1).unwrap();
        let input = framework.input_port(encoder, 0).unwrap();

        framework.commit_port_format(video, &camera_format()).unwrap();
        let connection = framework
            .create_connection(video, input, ConnectionFlags::TUNNELLED)
            .unwrap();
        assert_eq!(framework.port_format(input), camera_format());
        assert_eq!(
            framework.create_connection(video, input, ConnectionFlags::TUNNELLED),
            Err(Status::Eisconn)
        );

        framework.destroy_connection(connection);
        framework.destroy_component(encoder);
        framework.destroy_component(camera);
        assert!(framework.live_resources().is_empty());
    }

    #[test]
    fn test_encoder_delivers_only_while_capturing() {
        let framework = SimulatedFramework::new();
        let camera = framework.create_component(ComponentKind::Camera).unwrap();
        let encoder = framework.create_component(ComponentKind::VideoEncoder).unwrap();
        let video = framework.output_port(camera, 1).unwrap();
        let input = framework.input_port(encoder, 0).unwrap();
        let output = framework.output_port(encoder, 0).unwrap();

        framework.commit_port_format(video, &camera_format()).unwrap();
        let connection = framework
            .create_connection(video, input, ConnectionFlags::TUNNELLED)
            .unwrap();
        framework.enable_connection(connection).unwrap();
        framework.enable_component(camera).unwrap();
        framework.enable_component(encoder).unwrap();
        let pool = framework.create_pool(output, 1, 1024).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        framework
            .enable_port(
                output,
                Box::new(move |_, buffer| {
                    let _ = tx.lock().unwrap().send(buffer);
                }),
            )
            .unwrap();
        let buffer = framework.pool_get(pool).unwrap();
        framework.send_buffer(output, buffer).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        framework
            .set_bool_parameter(video, BoolParameter::Capture, true)
            .unwrap();
        let delivered = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(framework.buffer_length(delivered) > 0);

        let mut payload = Vec::new();
        framework
            .read_buffer(delivered, &mut |data| payload.extend_from_slice(data))
            .unwrap();
        assert_eq!(parse_frame_indices(&payload), vec![0]);

        framework.release_buffer(delivered);
        framework.disable_port(output).unwrap();
        framework.destroy_connection(connection);
        framework.disable_component(encoder);
        framework.disable_component(camera);
        framework.destroy_pool(output, pool);
        framework.destroy_component(encoder);
        framework.destroy_component(camera);

        assert!(framework.live_resources().is_empty());
        assert!(framework.violations().is_empty());
        assert_eq!(framework.stats().buffers_delivered, 1);
    }
}
