//! Core of a capture device manager that multiplexes two logically
//! independent streams, a continuous *video* stream and a single-shot
//! *still* stream, over one underlying DMA-capable image pipeline that
//! can serve only one of them at a time.
//!
//! The crate is split along the seams of that problem:
//!
//! * [`framebuf`] holds the per-stream buffer queue with its
//!   free/queued/in-flight/done slot partition and ring/fifo policies.
//! * [`arbiter`] is the pure function deciding who owns the DMA engine
//!   after each transition cause.
//! * [`format`] intersects sensor and pipeline capabilities into the
//!   format catalog and frame-size ranges.
//! * [`manager`] composes the above into the blocking operation surface
//!   (request-buffers, queue, dequeue, stream on/off, take-picture) and
//!   the completion path called from the pipeline's interrupt context.
//! * [`hal`] declares the capability records the sensor and the image
//!   pipeline are injected through.
//!
//! The manager never allocates image memory: buffers are borrowed from
//! the caller between `queue` and `dequeue` by pointer and length.

pub mod arbiter;
pub mod buffer;
pub mod controls;
pub mod format;
pub mod framebuf;
pub mod hal;
pub mod ioctl;
pub mod manager;
pub mod state;

use std::fmt;
use std::fmt::Display;

use enumn::N;
use thiserror::Error;

pub use manager::StreamManager;
pub use state::StreamState;

/// The two capture streams sharing the image pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum StreamKind {
    /// Continuous capture; keeps the DMA engine whenever still is idle.
    Video = 1,
    /// Bounded burst capture; preempts video for the DMA engine.
    Still = 2,
}

impl StreamKind {
    /// Decodes the wire representation of a stream kind, as it appears
    /// in ioctl-style records. Unknown values are an error, not a
    /// panic.
    pub fn from_raw(v: u32) -> Result<Self> {
        Self::n(v).ok_or(Error::InvalidArg)
    }
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => f.write_str("video"),
            StreamKind::Still => f.write_str("still"),
        }
    }
}

/// Errors surfaced by the operation surface.
///
/// The set deliberately mirrors the errno-style answers a capture driver
/// gives back to user space; every operation returns one of these as a
/// value, nothing is reported through side channels.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Out-of-range input, unknown stream kind, or a control type the
    /// legacy control surface cannot represent.
    #[error("invalid argument")]
    InvalidArg,
    /// The operation is forbidden in the stream's current state.
    #[error("operation not permitted in current state")]
    NotPermitted,
    /// The queue is exhausted or an allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// The blocking dequeue was cancelled.
    #[error("dequeue cancelled")]
    Canceled,
    /// The sensor or the image pipeline refused the format or control.
    #[error("not supported by sensor or image pipeline")]
    NotSupported,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A Fourcc pixel format code. It can be converted back and forth from a
/// 32-bit integer, or a 4-bytes string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct PixelFormat(u32);

impl PixelFormat {
    pub const fn from_u32(v: u32) -> Self {
        Self(v)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn from_fourcc(n: &[u8; 4]) -> Self {
        Self(n[0] as u32 | (n[1] as u32) << 8 | (n[2] as u32) << 16 | (n[3] as u32) << 24)
    }

    pub const fn to_fourcc(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for PixelFormat {
    fn from(i: u32) -> Self {
        Self::from_u32(i)
    }
}

impl From<PixelFormat> for u32 {
    fn from(format: PixelFormat) -> Self {
        format.to_u32()
    }
}

/// Simple way to convert a string literal (e.g. `b"YUYV"`) into a pixel
/// format.
///
/// # Examples
///
/// ```
/// # use capmux::PixelFormat;
/// let yuyv = b"YUYV";
/// let f = PixelFormat::from(yuyv);
/// assert_eq!(&f.to_fourcc(), yuyv);
/// ```
impl From<&[u8; 4]> for PixelFormat {
    fn from(n: &[u8; 4]) -> Self {
        Self::from_fourcc(n)
    }
}

/// Produces a debug string for this `PixelFormat`, including its
/// hexadecimal and string representation.
///
/// # Examples
///
/// ```
/// # use capmux::PixelFormat;
/// let f = PixelFormat::from(b"YUYV");
/// assert_eq!(format!("{:?}", f), "0x56595559 (YUYV)");
/// ```
impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!("0x{:08x} ({})", self.0, self))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fourcc = self
            .0
            .to_le_bytes()
            .iter()
            .map(|&x| x as char)
            .collect::<String>();
        f.write_str(fourcc.as_str())
    }
}

/// Active capture format for one stream.
///
/// Single-planar by construction; the sub-image fields carry the
/// secondary image some pipelines emit next to a compressed main one
/// (e.g. a thumbnail next to a JPEG).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Format {
    /// Width of the image in pixels.
    pub width: u32,
    /// Height of the image in pixels.
    pub height: u32,
    /// Format each pixel is encoded in.
    pub pixelformat: PixelFormat,
    /// Format of the sub-image, if the pipeline produces one.
    pub sub_pixelformat: PixelFormat,
    pub sub_width: u32,
    pub sub_height: u32,
    /// Bytes one captured frame occupies; zero when the sensor does not
    /// advertise it.
    pub sizeimage: u32,
}

/// Quickly build a usable `Format` from a pixel format and resolution.
///
/// # Examples
///
/// ```
/// # use capmux::Format;
/// let f = Format::from((b"YUYV", (640, 480)));
/// assert_eq!(f.width, 640);
/// assert_eq!(f.height, 480);
/// assert_eq!(f.pixelformat.to_string(), "YUYV");
/// ```
impl<T: Into<PixelFormat>> From<(T, (u32, u32))> for Format {
    fn from((pixel_format, (width, height)): (T, (u32, u32))) -> Self {
        Format {
            width,
            height,
            pixelformat: pixel_format.into(),
            ..Default::default()
        }
    }
}
