//! Capability records of the two external collaborators.
//!
//! The sensor control block and the image-data pipeline are injected
//! into the manager at construction as trait objects; the core only
//! ever talks to the capability set declared here. Implementations must
//! tolerate calls from the completion path (no blocking, no re-entry
//! into the manager).

use crate::controls::{CtrlClass, ExtControl, QueryExtCtrl, QueryMenu, SceneMode};
use crate::format::FmtDesc;
use crate::{Format, PixelFormat, Result, StreamKind};

/// A discrete frame size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Discrete {
    pub width: u32,
    pub height: u32,
}

/// A stepwise frame size range: every size `min + k * step` up to the
/// maximum, on both axes independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

/// Size capability answer, covering the main image and the sub-image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeRange {
    Discrete { size: Discrete, sub: Discrete },
    Stepwise { size: Stepwise, sub: Stepwise },
}

/// Input record for a frame-size capability query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSizeQuery {
    pub stream: StreamKind,
    /// Enumeration cursor; discrete providers answer one pair per
    /// index, stepwise providers answer index 0 only.
    pub index: u32,
    pub pixelformat: PixelFormat,
    pub sub_pixelformat: PixelFormat,
}

/// A frame duration as a rational number of seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fract {
    pub numerator: u32,
    pub denominator: u32,
}

/// Frame-interval enumeration record, passed through to the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameIntervalEnum {
    pub stream: StreamKind,
    pub index: u32,
    pub pixelformat: PixelFormat,
    pub sub_pixelformat: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Filled by the sensor.
    pub interval: Fract,
}

/// Streaming parameters, passed through to the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParm {
    pub stream: StreamKind,
    pub timeperframe: Fract,
}

/// Control surface of the image sensor.
pub trait SensorCtl: Send + Sync {
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;

    /// Formats the sensor advertises for `stream`, enumerated from
    /// index zero. `None` is the terminal sentinel.
    fn format_range(&self, stream: StreamKind, index: u32) -> Option<FmtDesc>;

    /// Size capability for the queried pixel format, or `None` when the
    /// index runs past the last supported entry.
    fn framesize_range(&self, query: &FrameSizeQuery) -> Option<SizeRange>;

    fn frameinterval_range(&self, frmival: &mut FrameIntervalEnum) -> Result<()>;

    fn try_format(&self, format: &Format) -> Result<()>;
    fn set_format(&self, format: &Format) -> Result<()>;
    fn set_frameinterval(&self, parm: &StreamParm) -> Result<()>;

    /// Selects which stream the next transfer belongs to. The value is
    /// read back by the completion path to attribute transfers.
    fn set_buftype(&self, stream: StreamKind);
    fn get_buftype(&self) -> Option<StreamKind>;

    /// Active format for `stream`, as the pipeline must be programmed.
    fn get_format(&self, stream: StreamKind) -> Format;

    fn do_halfpush(&self, enable: bool) -> Result<()>;

    fn ctrl_range(&self, ctrl: &mut QueryExtCtrl) -> Result<()>;
    fn ctrl_menu(&self, menu: &mut QueryMenu) -> Result<()>;
    fn get_ctrl(&self, class: CtrlClass, ctrl: &mut ExtControl) -> Result<()>;
    fn set_ctrl(&self, class: CtrlClass, ctrl: &ExtControl) -> Result<()>;

    fn scene_range(&self, mode: SceneMode, ctrl: &mut QueryExtCtrl) -> Result<()>;
    fn scene_menu(&self, mode: SceneMode, menu: &mut QueryMenu) -> Result<()>;
    fn get_scene_param(
        &self,
        mode: SceneMode,
        class: CtrlClass,
        ctrl: &mut ExtControl,
    ) -> Result<()>;
    fn set_scene_param(
        &self,
        mode: SceneMode,
        class: CtrlClass,
        ctrl: &ExtControl,
    ) -> Result<()>;
}

/// Transfer surface of the image-data pipeline.
pub trait ImageData: Send + Sync {
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;

    /// Whether the pipeline can emit this pixel format pair at all.
    fn accepts_format(&self, pixelformat: PixelFormat, sub_pixelformat: PixelFormat) -> bool;

    /// Size capability of the pipeline for the queried pixel format.
    fn framesize_range(&self, query: &FrameSizeQuery) -> Option<SizeRange>;

    fn try_format(&self, format: &Format) -> Result<()>;

    /// Starts a transfer of one frame in `format` into the caller
    /// memory at `userptr`. Completion is reported asynchronously
    /// through the manager's notify entry point.
    fn start_dma(&self, format: &Format, userptr: u64, length: u32) -> Result<()>;

    /// Chains the next target buffer while a transfer sequence is
    /// running.
    fn set_dmabuf(&self, userptr: u64, length: u32) -> Result<()>;

    /// Cancels the in-flight transfer. The hardware may still deliver a
    /// final completion carrying an error, or swallow the cancel
    /// silently.
    fn cancel_dma(&self) -> Result<()>;
}
