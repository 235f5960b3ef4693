// SPDX-License-Identifier: GPL-3.0-only

//! VideoCore MMAL backend via `mmal-sys`
//!
//! Thin mapping of [`MediaFramework`] onto the MMAL C API. Handles wrap the
//! raw MMAL pointers; ownership is tracked by the pipeline stages, which pair
//! every create with exactly one destroy.
//!
//! Port callbacks are boxed and stored in the port's `userdata`. MMAL calls a
//! single trampoline from its own worker thread, which forwards to the boxed
//! closure. The box is reclaimed when the port is disabled (MMAL guarantees no
//! callback runs after `mmal_port_disable` returns) or when the owning
//! component is destroyed.

use super::{
    BoolParameter, BufferRequirements, CameraConfig, ComponentKind, ConnectionFlags, Encoding,
    FrameworkResult, MediaFramework, PortCallback, PortFormat, Rational, Rect, Status,
    TimestampMode, VideoFormat,
};
use mmal_sys as ffi;
use std::mem;
use std::os::raw::c_char;
use std::ptr;
use std::sync::Once;
use tracing::{debug, info, warn};

static INIT: Once = Once::new();

fn check(status: ffi::MMAL_STATUS_T::Type) -> FrameworkResult<()> {
    match Status::from_raw(status as u32) {
        None => Ok(()),
        Some(status) => Err(status),
    }
}

// ===== Handles =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmalComponent(*mut ffi::MMAL_COMPONENT_T);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmalPort(*mut ffi::MMAL_PORT_T);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmalPool(*mut ffi::MMAL_POOL_T);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmalConnection(*mut ffi::MMAL_CONNECTION_T);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MmalBuffer(*mut ffi::MMAL_BUFFER_HEADER_T);

// MMAL objects are internally synchronised and may be used from any thread
unsafe impl Send for MmalComponent {}
unsafe impl Sync for MmalComponent {}
unsafe impl Send for MmalPort {}
unsafe impl Sync for MmalPort {}
unsafe impl Send for MmalPool {}
unsafe impl Sync for MmalPool {}
unsafe impl Send for MmalConnection {}
unsafe impl Sync for MmalConnection {}
unsafe impl Send for MmalBuffer {}
unsafe impl Sync for MmalBuffer {}

// ===== Callbacks =====

type BoxedCallback = Box<PortCallback<MmalFramework>>;

unsafe extern "C" fn port_trampoline(
    port: *mut ffi::MMAL_PORT_T,
    buffer: *mut ffi::MMAL_BUFFER_HEADER_T,
) {
    unsafe {
        let callback = (*port).userdata as *const PortCallback<MmalFramework>;
        if callback.is_null() {
            ffi::mmal_buffer_header_release(buffer);
            return;
        }
        (*callback)(MmalPort(port), MmalBuffer(buffer));
    }
}

/// Detach the callback box stored on a port, if any
///
/// The port's `userdata` is nulled before the box is handed back, so the
/// trampoline releases any later buffer instead of calling into it.
unsafe fn take_callback(port: *mut ffi::MMAL_PORT_T) -> Option<BoxedCallback> {
    unsafe {
        if port.is_null() || (*port).userdata.is_null() {
            return None;
        }
        let raw = (*port).userdata as *mut PortCallback<MmalFramework>;
        (*port).userdata = ptr::null_mut();
        Some(Box::from_raw(raw))
    }
}

fn component_ports(component: *mut ffi::MMAL_COMPONENT_T) -> Vec<*mut ffi::MMAL_PORT_T> {
    unsafe {
        let mut ports = vec![(*component).control];
        for i in 0..(*component).input_num as usize {
            ports.push(*(*component).input.add(i));
        }
        for i in 0..(*component).output_num as usize {
            ports.push(*(*component).output.add(i));
        }
        ports
    }
}

fn encoding_to_raw(encoding: Encoding) -> u32 {
    match encoding {
        Encoding::Opaque => ffi::MMAL_ENCODING_OPAQUE,
        Encoding::I420 => ffi::MMAL_ENCODING_I420,
        Encoding::H264 => ffi::MMAL_ENCODING_H264,
        Encoding::Mjpeg => ffi::MMAL_ENCODING_MJPEG,
        Encoding::Other(code) => code,
    }
}

fn timestamp_mode_to_raw(mode: TimestampMode) -> ffi::MMAL_PARAMETER_CAMERA_CONFIG_TIMESTAMP_MODE_T::Type {
    use ffi::MMAL_PARAMETER_CAMERA_CONFIG_TIMESTAMP_MODE_T as Mode;
    match mode {
        TimestampMode::Zero => Mode::MMAL_PARAM_TIMESTAMP_MODE_ZERO,
        TimestampMode::RawStc => Mode::MMAL_PARAM_TIMESTAMP_MODE_RAW_STC,
        TimestampMode::ResetStc => Mode::MMAL_PARAM_TIMESTAMP_MODE_RESET_STC,
    }
}

// ===== Framework =====

/// MMAL userland libraries on a Raspberry Pi
pub struct MmalFramework {
    _private: (),
}

impl MmalFramework {
    /// Initialise the host interface and the VideoCore connection (once per process)
    pub fn new() -> Self {
        INIT.call_once(|| {
            unsafe {
                ffi::bcm_host_init();
                ffi::vcos_init();
                ffi::mmal_vc_init();
            }
            info!("Initialised VideoCore host interface");
        });
        Self { _private: () }
    }
}

impl Default for MmalFramework {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFramework for MmalFramework {
    type Component = MmalComponent;
    type Port = MmalPort;
    type Pool = MmalPool;
    type Connection = MmalConnection;
    type Buffer = MmalBuffer;

    // ===== Components =====

    fn create_component(&self, kind: ComponentKind) -> FrameworkResult<MmalComponent> {
        let name: &[u8] = match kind {
            ComponentKind::Camera => ffi::MMAL_COMPONENT_DEFAULT_CAMERA,
            ComponentKind::VideoEncoder => ffi::MMAL_COMPONENT_DEFAULT_VIDEO_ENCODER,
        };

        let mut component: *mut ffi::MMAL_COMPONENT_T = ptr::null_mut();
        check(unsafe { ffi::mmal_component_create(name.as_ptr() as *const c_char, &mut component) })?;
        if component.is_null() {
            return Err(Status::Enomem);
        }

        debug!(%kind, "Created MMAL component");
        Ok(MmalComponent(component))
    }

    fn destroy_component(&self, component: MmalComponent) {
        // Ports are freed with the component: detach their callbacks first,
        // drop them only once destroy has disabled every port
        let callbacks: Vec<BoxedCallback> = component_ports(component.0)
            .into_iter()
            .filter_map(|port| unsafe { take_callback(port) })
            .collect();

        let status = unsafe { ffi::mmal_component_destroy(component.0) };
        if let Err(status) = check(status) {
            warn!(%status, "mmal_component_destroy failed");
        }
        drop(callbacks);
    }

    fn enable_component(&self, component: MmalComponent) -> FrameworkResult<()> {
        check(unsafe { ffi::mmal_component_enable(component.0) })
    }

    fn disable_component(&self, component: MmalComponent) {
        if let Err(status) = check(unsafe { ffi::mmal_component_disable(component.0) }) {
            warn!(%status, "mmal_component_disable failed");
        }
    }

    fn control_port(&self, component: MmalComponent) -> MmalPort {
        MmalPort(unsafe { (*component.0).control })
    }

    fn output_count(&self, component: MmalComponent) -> usize {
        unsafe { (*component.0).output_num as usize }
    }

    fn input_port(&self, component: MmalComponent, index: usize) -> Option<MmalPort> {
        unsafe {
            if index >= (*component.0).input_num as usize {
                return None;
            }
            Some(MmalPort(*(*component.0).input.add(index)))
        }
    }

    fn output_port(&self, component: MmalComponent, index: usize) -> Option<MmalPort> {
        unsafe {
            if index >= (*component.0).output_num as usize {
                return None;
            }
            Some(MmalPort(*(*component.0).output.add(index)))
        }
    }

    // ===== Ports =====

    fn enable_port(&self, port: MmalPort, callback: PortCallback<Self>) -> FrameworkResult<()> {
        let boxed: BoxedCallback = Box::new(callback);
        unsafe {
            // The live callback may be running on the framework thread
            if (*port.0).is_enabled != 0 {
                return Err(Status::Einval);
            }
            drop(take_callback(port.0));
            (*port.0).userdata = Box::into_raw(boxed) as *mut ffi::MMAL_PORT_USERDATA_T;

            let result = check(ffi::mmal_port_enable(port.0, Some(port_trampoline)));
            if result.is_err() {
                drop(take_callback(port.0));
            }
            result
        }
    }

    fn disable_port(&self, port: MmalPort) -> FrameworkResult<()> {
        unsafe {
            if (*port.0).is_enabled == 0 {
                return Err(Status::Einval);
            }
            let result = check(ffi::mmal_port_disable(port.0));
            if result.is_ok() {
                drop(take_callback(port.0));
            }
            result
        }
    }

    fn is_port_enabled(&self, port: MmalPort) -> bool {
        unsafe { (*port.0).is_enabled != 0 }
    }

    fn port_format(&self, port: MmalPort) -> PortFormat {
        unsafe {
            let format = (*port.0).format;
            let video = (*(*format).es).video;
            PortFormat {
                encoding: Encoding::from_fourcc((*format).encoding),
                encoding_variant: match (*format).encoding_variant {
                    0 => None,
                    code => Some(Encoding::from_fourcc(code)),
                },
                bitrate: (*format).bitrate,
                video: VideoFormat {
                    width: video.width,
                    height: video.height,
                    crop: Rect {
                        x: video.crop.x,
                        y: video.crop.y,
                        width: video.crop.width,
                        height: video.crop.height,
                    },
                    frame_rate: Rational {
                        num: video.frame_rate.num,
                        den: video.frame_rate.den,
                    },
                },
            }
        }
    }

    fn commit_port_format(&self, port: MmalPort, format: &PortFormat) -> FrameworkResult<()> {
        unsafe {
            let raw = (*port.0).format;
            (*raw).encoding = encoding_to_raw(format.encoding);
            (*raw).encoding_variant = format.encoding_variant.map_or(0, encoding_to_raw);
            (*raw).bitrate = format.bitrate;

            let video = &mut (*(*raw).es).video;
            video.width = format.video.width;
            video.height = format.video.height;
            video.crop.x = format.video.crop.x;
            video.crop.y = format.video.crop.y;
            video.crop.width = format.video.crop.width;
            video.crop.height = format.video.crop.height;
            video.frame_rate.num = format.video.frame_rate.num;
            video.frame_rate.den = format.video.frame_rate.den;

            check(ffi::mmal_port_format_commit(port.0))
        }
    }

    fn copy_port_format(&self, destination: MmalPort, source: MmalPort) {
        unsafe { ffi::mmal_format_copy((*destination.0).format, (*source.0).format) };
    }

    fn buffer_requirements(&self, port: MmalPort) -> BufferRequirements {
        unsafe {
            let p = &*port.0;
            BufferRequirements {
                num: p.buffer_num,
                num_min: p.buffer_num_min,
                num_recommended: p.buffer_num_recommended,
                size: p.buffer_size,
                size_min: p.buffer_size_min,
                size_recommended: p.buffer_size_recommended,
            }
        }
    }

    fn set_buffer_layout(&self, port: MmalPort, num: u32, size: u32) {
        unsafe {
            (*port.0).buffer_num = num;
            (*port.0).buffer_size = size;
        }
    }

    fn set_bool_parameter(
        &self,
        port: MmalPort,
        parameter: BoolParameter,
        value: bool,
    ) -> FrameworkResult<()> {
        let id = match parameter {
            BoolParameter::Capture => ffi::MMAL_PARAMETER_CAPTURE as u32,
        };
        check(unsafe { ffi::mmal_port_parameter_set_boolean(port.0, id, value as i32) })
    }

    fn set_camera_config(&self, port: MmalPort, config: &CameraConfig) -> FrameworkResult<()> {
        let mut raw = ffi::MMAL_PARAMETER_CAMERA_CONFIG_T {
            hdr: ffi::MMAL_PARAMETER_HEADER_T {
                id: ffi::MMAL_PARAMETER_CAMERA_CONFIG as u32,
                size: mem::size_of::<ffi::MMAL_PARAMETER_CAMERA_CONFIG_T>() as u32,
            },
            max_stills_w: config.max_stills_w,
            max_stills_h: config.max_stills_h,
            stills_yuv422: config.stills_yuv422 as u32,
            one_shot_stills: config.one_shot_stills as u32,
            max_preview_video_w: config.max_preview_video_w,
            max_preview_video_h: config.max_preview_video_h,
            num_preview_video_frames: config.num_preview_video_frames,
            stills_capture_circular_buffer_height: config.stills_capture_circular_buffer_height,
            fast_preview_resume: config.fast_preview_resume as u32,
            use_stc_timestamp: timestamp_mode_to_raw(config.timestamp_mode),
        };
        check(unsafe { ffi::mmal_port_parameter_set(port.0, &mut raw.hdr) })
    }

    fn send_buffer(&self, port: MmalPort, buffer: MmalBuffer) -> FrameworkResult<()> {
        check(unsafe { ffi::mmal_port_send_buffer(port.0, buffer.0) })
    }

    // ===== Buffer pools =====

    fn create_pool(&self, port: MmalPort, num: u32, size: u32) -> FrameworkResult<MmalPool> {
        let pool = unsafe { ffi::mmal_port_pool_create(port.0, num, size) };
        if pool.is_null() {
            return Err(Status::Enomem);
        }
        Ok(MmalPool(pool))
    }

    fn destroy_pool(&self, port: MmalPort, pool: MmalPool) {
        unsafe { ffi::mmal_port_pool_destroy(port.0, pool.0) };
    }

    fn pool_queue_len(&self, pool: MmalPool) -> usize {
        unsafe { ffi::mmal_queue_length((*pool.0).queue) as usize }
    }

    fn pool_get(&self, pool: MmalPool) -> Option<MmalBuffer> {
        let buffer = unsafe { ffi::mmal_queue_get((*pool.0).queue) };
        (!buffer.is_null()).then_some(MmalBuffer(buffer))
    }

    // ===== Buffer headers =====

    fn buffer_length(&self, buffer: MmalBuffer) -> usize {
        unsafe { (*buffer.0).length as usize }
    }

    fn read_buffer(&self, buffer: MmalBuffer, read: &mut dyn FnMut(&[u8])) -> FrameworkResult<()> {
        unsafe {
            check(ffi::mmal_buffer_header_mem_lock(buffer.0))?;
            let header = &*buffer.0;
            let data = std::slice::from_raw_parts(
                header.data.add(header.offset as usize),
                header.length as usize,
            );
            read(data);
            ffi::mmal_buffer_header_mem_unlock(buffer.0);
        }
        Ok(())
    }

    fn release_buffer(&self, buffer: MmalBuffer) {
        unsafe { ffi::mmal_buffer_header_release(buffer.0) };
    }

    // ===== Connections =====

    fn create_connection(
        &self,
        source: MmalPort,
        sink: MmalPort,
        flags: ConnectionFlags,
    ) -> FrameworkResult<MmalConnection> {
        let mut raw_flags = 0;
        if flags.tunnelling {
            raw_flags |= ffi::MMAL_CONNECTION_FLAG_TUNNELLING;
        }
        if flags.allocation_on_input {
            raw_flags |= ffi::MMAL_CONNECTION_FLAG_ALLOCATION_ON_INPUT;
        }

        let mut connection: *mut ffi::MMAL_CONNECTION_T = ptr::null_mut();
        check(unsafe {
            ffi::mmal_connection_create(&mut connection, source.0, sink.0, raw_flags as u32)
        })?;
        if connection.is_null() {
            return Err(Status::Enomem);
        }
        Ok(MmalConnection(connection))
    }

    fn enable_connection(&self, connection: MmalConnection) -> FrameworkResult<()> {
        check(unsafe { ffi::mmal_connection_enable(connection.0) })
    }

    fn destroy_connection(&self, connection: MmalConnection) {
        if let Err(status) = check(unsafe { ffi::mmal_connection_destroy(connection.0) }) {
            warn!(%status, "mmal_connection_destroy failed");
        }
    }
}
