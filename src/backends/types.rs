// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the media framework abstraction

//! Shared types for media framework backends

use std::fmt;

/// Framework status code
///
/// Mirrors the MMAL status codes so errors keep the hardware's own diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Out of memory
    Enomem,
    /// Out of resources (other than memory)
    Enospc,
    /// Argument is invalid
    Einval,
    /// Function not implemented
    Enosys,
    /// No such file or directory
    Enoent,
    /// No such device or address
    Enxio,
    /// I/O error
    Eio,
    /// Illegal seek
    Espipe,
    /// Data is corrupt
    Ecorrupt,
    /// Component is not ready
    Enotready,
    /// Component is not configured
    Econfig,
    /// Port is already connected
    Eisconn,
    /// Port is disconnected
    Enotconn,
    /// Resource temporarily unavailable
    Eagain,
    /// Bad address
    Efault,
    /// Code the bindings do not know about
    Unknown(u32),
}

impl Status {
    /// Map a raw MMAL status value (0 is success and has no variant)
    pub fn from_raw(code: u32) -> Option<Self> {
        let status = match code {
            0 => return None,
            1 => Status::Enomem,
            2 => Status::Enospc,
            3 => Status::Einval,
            4 => Status::Enosys,
            5 => Status::Enoent,
            6 => Status::Enxio,
            7 => Status::Eio,
            8 => Status::Espipe,
            9 => Status::Ecorrupt,
            10 => Status::Enotready,
            11 => Status::Econfig,
            12 => Status::Eisconn,
            13 => Status::Enotconn,
            14 => Status::Eagain,
            15 => Status::Efault,
            other => Status::Unknown(other),
        };
        Some(status)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Enomem => write!(f, "ENOMEM"),
            Status::Enospc => write!(f, "ENOSPC"),
            Status::Einval => write!(f, "EINVAL"),
            Status::Enosys => write!(f, "ENOSYS"),
            Status::Enoent => write!(f, "ENOENT"),
            Status::Enxio => write!(f, "ENXIO"),
            Status::Eio => write!(f, "EIO"),
            Status::Espipe => write!(f, "ESPIPE"),
            Status::Ecorrupt => write!(f, "ECORRUPT"),
            Status::Enotready => write!(f, "ENOTREADY"),
            Status::Econfig => write!(f, "ECONFIG"),
            Status::Eisconn => write!(f, "EISCONN"),
            Status::Enotconn => write!(f, "ENOTCONN"),
            Status::Eagain => write!(f, "EAGAIN"),
            Status::Efault => write!(f, "EFAULT"),
            Status::Unknown(code) => write!(f, "status {}", code),
        }
    }
}

/// Result of a framework call
pub type FrameworkResult<T> = Result<T, Status>;

/// Hardware component kinds this recorder instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Camera sensor pipeline (`vc.ril.camera`)
    Camera,
    /// Video encoder (`vc.ril.video_encode`)
    VideoEncoder,
}

impl ComponentKind {
    /// Framework component name
    pub fn component_name(&self) -> &'static str {
        match self {
            ComponentKind::Camera => "vc.ril.camera",
            ComponentKind::VideoEncoder => "vc.ril.video_encode",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Camera => write!(f, "camera"),
            ComponentKind::VideoEncoder => write!(f, "video encoder"),
        }
    }
}

/// Elementary stream encodings used on ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Framework-internal zero-copy image handles
    Opaque,
    /// Planar YUV 4:2:0
    #[default]
    I420,
    /// H.264/AVC elementary stream
    H264,
    /// Motion JPEG
    Mjpeg,
    /// FourCC this crate does not name
    Other(u32),
}

impl Encoding {
    /// FourCC code as stored by the framework
    pub fn fourcc(&self) -> u32 {
        match self {
            Encoding::Opaque => fourcc(b"OPQV"),
            Encoding::I420 => fourcc(b"I420"),
            Encoding::H264 => fourcc(b"H264"),
            Encoding::Mjpeg => fourcc(b"MJPG"),
            Encoding::Other(code) => *code,
        }
    }

    pub fn from_fourcc(code: u32) -> Self {
        [
            Encoding::Opaque,
            Encoding::I420,
            Encoding::H264,
            Encoding::Mjpeg,
        ]
        .into_iter()
        .find(|e| e.fourcc() == code)
        .unwrap_or(Encoding::Other(code))
    }
}

/// Little-endian FourCC, the layout MMAL_FOURCC produces
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

/// Rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Rational number (frame rates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

/// Video-specific part of a port format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub crop: Rect,
    pub frame_rate: Rational,
}

/// Negotiable port format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortFormat {
    pub encoding: Encoding,
    /// Fallback encoding for opaque ports
    pub encoding_variant: Option<Encoding>,
    /// Target bit rate in bits per second (encoders only)
    pub bitrate: u32,
    pub video: VideoFormat,
}

/// Buffer negotiation values of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferRequirements {
    /// Currently configured count
    pub num: u32,
    pub num_min: u32,
    pub num_recommended: u32,
    /// Currently configured size in bytes
    pub size: u32,
    pub size_min: u32,
    pub size_recommended: u32,
}

/// Timestamp mode for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Always zero
    Zero,
    /// Raw STC value
    RawStc,
    /// STC reset to zero at the start of capture
    #[default]
    ResetStc,
}

/// Camera configuration block applied through the control port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraConfig {
    pub max_stills_w: u32,
    pub max_stills_h: u32,
    pub stills_yuv422: bool,
    pub one_shot_stills: bool,
    pub max_preview_video_w: u32,
    pub max_preview_video_h: u32,
    pub num_preview_video_frames: u32,
    pub stills_capture_circular_buffer_height: u32,
    pub fast_preview_resume: bool,
    pub timestamp_mode: TimestampMode,
}

/// Connection behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionFlags {
    /// Buffers pass hardware to hardware without the client
    pub tunnelling: bool,
    /// Buffers are allocated on the input port
    pub allocation_on_input: bool,
}

impl ConnectionFlags {
    /// Zero-copy tunnel with input-side allocation
    pub const TUNNELLED: ConnectionFlags = ConnectionFlags {
        tunnelling: true,
        allocation_on_input: true,
    };
}

/// Boolean port parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolParameter {
    /// Start/stop capturing on a camera output port
    Capture,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_round_trip_known_encodings() {
        assert_eq!(Encoding::from_fourcc(Encoding::H264.fourcc()), Encoding::H264);
        assert_eq!(Encoding::from_fourcc(fourcc(b"RGB3")), Encoding::Other(fourcc(b"RGB3")));
    }

    #[test]
    fn test_fourcc_layout() {
        // MMAL_FOURCC('H','2','6','4')
        assert_eq!(fourcc(b"H264"), 0x3436_3248);
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(Status::from_raw(0), None);
        assert_eq!(Status::from_raw(3), Some(Status::Einval));
        assert_eq!(Status::from_raw(99), Some(Status::Unknown(99)));
    }
}
