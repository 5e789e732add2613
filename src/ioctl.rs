//! Command-discriminated operation surface.
//!
//! Everything the manager can do is also reachable through a single
//! entry point taking a [`Request`]: the variant plays the role of the
//! command code, the payload is the argument record, and records that
//! carry results back are borrowed mutably. Character-device glue only
//! needs to decode its command word into one of these.

use crate::buffer::{BufMode, Buffer};
use crate::controls::{
    Control, ExtControls, ExtControlsScene, QueryCtrl, QueryExtCtrl, QueryExtCtrlScene, QueryMenu,
    QueryMenuScene,
};
use crate::format::FmtDesc;
use crate::hal::{FrameIntervalEnum, FrameSizeQuery, SizeRange, StreamParm};
use crate::manager::StreamManager;
use crate::{Format, PixelFormat, Result, StreamKind};

/// Frame-size enumeration record: the query fields go in, `sizes`
/// comes back filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSizeEnum {
    pub stream: StreamKind,
    pub index: u32,
    pub pixelformat: PixelFormat,
    pub sub_pixelformat: PixelFormat,
    pub sizes: Option<SizeRange>,
}

/// One request to the capture device.
pub enum Request<'a> {
    ReqBufs {
        stream: StreamKind,
        count: u32,
        mode: BufMode,
    },
    QBuf(&'a Buffer),
    /// May block; see [`StreamManager::dequeue`].
    DqBuf {
        stream: StreamKind,
        buf: &'a mut Buffer,
    },
    CancelDqBuf(StreamKind),
    StreamOn(StreamKind),
    StreamOff(StreamKind),
    DoHalfPush(bool),
    TakePictStart(i32),
    TakePictStop(bool),
    /// `stream` and `index` go in, the rest comes back filled.
    EnumFmt(&'a mut FmtDesc),
    EnumFrameSizes(&'a mut FrameSizeEnum),
    EnumFrameIntervals(&'a mut FrameIntervalEnum),
    TryFmt(&'a Format),
    SFmt(&'a Format),
    SParm(&'a StreamParm),
    QueryCtrl(&'a mut QueryCtrl),
    QueryExtCtrl(&'a mut QueryExtCtrl),
    QueryMenu(&'a mut QueryMenu),
    GCtrl(&'a mut Control),
    SCtrl(&'a Control),
    GExtCtrls(&'a mut ExtControls),
    SExtCtrls(&'a mut ExtControls),
    QueryExtCtrlScene(&'a mut QueryExtCtrlScene),
    QueryMenuScene(&'a mut QueryMenuScene),
    GExtCtrlsScene(&'a mut ExtControlsScene),
    SExtCtrlsScene(&'a mut ExtControlsScene),
}

impl StreamManager {
    /// Dispatches one [`Request`] to the matching operation.
    pub fn ioctl(&self, request: Request<'_>) -> Result<()> {
        match request {
            Request::ReqBufs {
                stream,
                count,
                mode,
            } => self.request_buffers(stream, count, mode),
            Request::QBuf(buf) => self.queue(buf),
            Request::DqBuf { stream, buf } => {
                *buf = self.dequeue(stream)?;
                Ok(())
            }
            Request::CancelDqBuf(stream) => self.cancel_dequeue(stream),
            Request::StreamOn(stream) => self.stream_on(stream),
            Request::StreamOff(stream) => self.stream_off(stream),
            Request::DoHalfPush(enable) => self.do_halfpush(enable),
            Request::TakePictStart(capture_num) => self.take_picture_start(capture_num),
            Request::TakePictStop(halfpush) => self.take_picture_stop(halfpush),
            Request::EnumFmt(desc) => {
                *desc = self.enum_fmt(desc.stream, desc.index)?;
                Ok(())
            }
            Request::EnumFrameSizes(frmsize) => {
                frmsize.sizes = Some(self.enum_frame_sizes(&FrameSizeQuery {
                    stream: frmsize.stream,
                    index: frmsize.index,
                    pixelformat: frmsize.pixelformat,
                    sub_pixelformat: frmsize.sub_pixelformat,
                })?);
                Ok(())
            }
            Request::EnumFrameIntervals(frmival) => self.enum_frame_intervals(frmival),
            Request::TryFmt(format) => self.try_fmt(format),
            Request::SFmt(format) => self.s_fmt(format),
            Request::SParm(parm) => self.s_parm(parm),
            Request::QueryCtrl(ctrl) => self.query_ctrl(ctrl),
            Request::QueryExtCtrl(ctrl) => self.query_ext_ctrl(ctrl),
            Request::QueryMenu(menu) => self.query_menu(menu),
            Request::GCtrl(ctrl) => self.g_ctrl(ctrl),
            Request::SCtrl(ctrl) => self.s_ctrl(ctrl),
            Request::GExtCtrls(ctrls) => self.g_ext_ctrls(ctrls),
            Request::SExtCtrls(ctrls) => self.s_ext_ctrls(ctrls),
            Request::QueryExtCtrlScene(ctrl) => self.query_ext_ctrl_scene(ctrl),
            Request::QueryMenuScene(menu) => self.query_menu_scene(menu),
            Request::GExtCtrlsScene(ctrls) => self.g_ext_ctrls_scene(ctrls),
            Request::SExtCtrlsScene(ctrls) => self.s_ext_ctrls_scene(ctrls),
        }
    }
}
