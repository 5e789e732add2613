//! The stream manager: public operation surface, DMA arbitration and
//! the completion path.
//!
//! # Locking
//!
//! Three layers, from outermost to innermost:
//!
//! * `open_lock` only serializes open/close reference counting.
//! * one operation lock per stream serializes user operations that
//!   read-modify-write that stream's state through the arbiter. An
//!   operation that must arbitrate across streams takes its own
//!   stream's lock first, then the sibling's, never the reverse.
//! * `streams` is the shared critical section: every touch of queue,
//!   state or rendezvous data happens under it. The completion path
//!   takes only this lock, so it can never deadlock against a user
//!   thread holding an operation lock.
//!
//! Only [`StreamManager::dequeue`] blocks; it waits on the stream's
//! condition variable with the critical section released.

use std::sync::{Arc, Condvar, Mutex};

use log::{debug, error};

use crate::arbiter::{self, TransitionCause};
use crate::buffer::{BufMode, Buffer};
use crate::controls::{
    Control, CtrlClass, ExtControl, ExtControls, ExtControlsScene, QueryCtrl, QueryExtCtrl,
    QueryExtCtrlScene, QueryMenu, QueryMenuScene,
};
use crate::format::{self, FmtDesc, FormatCatalog};
use crate::hal::{FrameIntervalEnum, FrameSizeQuery, ImageData, SensorCtl, SizeRange, StreamParm};
use crate::state::{StreamInner, StreamState, WaitCause, REMAINING_INFINITE};
use crate::{Error, Format, Result, StreamKind};

const MAX_DEVICE_PATH: usize = 32;

/// Snapshot of one stream's slot accounting, mostly useful to assert
/// queue health from tests and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueStats {
    pub free: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub done: usize,
}

#[derive(Debug)]
struct Streams {
    video: StreamInner,
    still: StreamInner,
}

impl Streams {
    fn get(&self, stream: StreamKind) -> &StreamInner {
        match stream {
            StreamKind::Video => &self.video,
            StreamKind::Still => &self.still,
        }
    }

    fn get_mut(&mut self, stream: StreamKind) -> &mut StreamInner {
        match stream {
            StreamKind::Video => &mut self.video,
            StreamKind::Still => &mut self.still,
        }
    }
}

/// Capture device manager multiplexing the video and still streams over
/// one image pipeline.
pub struct StreamManager {
    devpath: String,
    sensor: Arc<dyn SensorCtl>,
    imgdata: Arc<dyn ImageData>,
    open_lock: Mutex<u32>,
    video_op: Mutex<()>,
    still_op: Mutex<()>,
    streams: Mutex<Streams>,
    video_wake: Condvar,
    still_wake: Condvar,
    video_formats: FormatCatalog,
    still_formats: FormatCatalog,
}

impl StreamManager {
    /// Builds a manager for the device at `devpath`, injecting the
    /// sensor and pipeline capability records.
    ///
    /// The format catalogs are computed here, once; they never change
    /// afterwards. The path must be absolute and short enough for the
    /// platform's device registry.
    pub fn new(
        devpath: &str,
        sensor: Arc<dyn SensorCtl>,
        imgdata: Arc<dyn ImageData>,
    ) -> Result<Self> {
        if devpath.len() < 2 || devpath.len() >= MAX_DEVICE_PATH || !devpath.starts_with('/') {
            return Err(Error::InvalidArg);
        }

        let video_formats =
            FormatCatalog::build(StreamKind::Video, sensor.as_ref(), imgdata.as_ref());
        let still_formats =
            FormatCatalog::build(StreamKind::Still, sensor.as_ref(), imgdata.as_ref());

        Ok(StreamManager {
            devpath: devpath.to_owned(),
            sensor,
            imgdata,
            open_lock: Mutex::new(0),
            video_op: Mutex::new(()),
            still_op: Mutex::new(()),
            streams: Mutex::new(Streams {
                video: StreamInner::new(),
                still: StreamInner::new(),
            }),
            video_wake: Condvar::new(),
            still_wake: Condvar::new(),
            video_formats,
            still_formats,
        })
    }

    pub fn device_path(&self) -> &str {
        &self.devpath
    }

    fn wake(&self, stream: StreamKind) -> &Condvar {
        match stream {
            StreamKind::Video => &self.video_wake,
            StreamKind::Still => &self.still_wake,
        }
    }

    /// Opens the device. The first open brings up the sensor and the
    /// pipeline and resets both streams; later opens only count.
    pub fn open(&self) -> Result<()> {
        let mut open_num = self.open_lock.lock().unwrap();

        if *open_num == 0 {
            self.sensor.open()?;
            if let Err(e) = self.imgdata.open() {
                let _ = self.sensor.close();
                return Err(e);
            }
            let mut streams = self.streams.lock().unwrap();
            streams.video.reset();
            streams.still.reset();
        }

        *open_num += 1;
        Ok(())
    }

    /// Closes the device. The last close cancels any in-flight DMA,
    /// drops all stream resources and shuts down sensor and pipeline.
    pub fn close(&self) -> Result<()> {
        let mut open_num = self.open_lock.lock().unwrap();

        if *open_num == 0 {
            return Ok(());
        }

        *open_num -= 1;
        if *open_num == 0 {
            let mut streams = self.streams.lock().unwrap();
            if streams.video.state == StreamState::Dma || streams.still.state == StreamState::Dma
            {
                let _ = self.imgdata.cancel_dma();
            }
            streams.video.reset();
            streams.still.reset();
            drop(streams);

            let _ = self.sensor.close();
            let _ = self.imgdata.close();
        }

        Ok(())
    }

    /// Sets the buffering mode and resizes `stream`'s queue to `count`
    /// slots. Zero releases every descriptor. Refused while the stream
    /// is under DMA.
    pub fn request_buffers(&self, stream: StreamKind, count: u32, mode: BufMode) -> Result<()> {
        let mut streams = self.streams.lock().unwrap();
        let inner = streams.get_mut(stream);

        if inner.state == StreamState::Dma {
            return Err(Error::NotPermitted);
        }

        inner.queue.set_mode(mode);
        inner.queue.realloc(count as usize)?;

        Ok(())
    }

    fn is_bufsize_sufficient(&self, stream: StreamKind, length: u32) -> bool {
        if length == 0 {
            return false;
        }
        let format = self.sensor.get_format(stream);
        format.sizeimage == 0 || length >= format.sizeimage
    }

    /// Hands a caller buffer to `stream`'s queue.
    ///
    /// If the stream was already triggered but idle, this may start the
    /// DMA engine right away; for video only when the arbiter grants
    /// it, for still unconditionally.
    pub fn queue(&self, buf: &Buffer) -> Result<()> {
        let stream = buf.stream;

        if !self.is_bufsize_sufficient(stream, buf.length) {
            return Err(Error::InvalidArg);
        }

        {
            let mut streams = self.streams.lock().unwrap();
            streams.get_mut(stream).queue.enqueue(*buf)?;
        }

        match stream {
            StreamKind::Video => {
                let _own = self.video_op.lock().unwrap();
                let _sibling = self.still_op.lock().unwrap();
                let mut streams = self.streams.lock().unwrap();
                if streams.video.state == StreamState::StreamOn {
                    let next = arbiter::next_video_state(
                        streams.video.state,
                        streams.still.state,
                        TransitionCause::VideoStart,
                    );
                    self.apply_video_state(&mut streams, next);
                }
            }
            StreamKind::Still => {
                let _own = self.still_op.lock().unwrap();
                let mut streams = self.streams.lock().unwrap();
                if streams.still.state == StreamState::StreamOn {
                    self.start_dma(&mut streams, StreamKind::Still);
                }
            }
        }

        Ok(())
    }

    /// Takes the oldest completed buffer of `stream`, blocking until a
    /// transfer completes or the wait is cancelled.
    ///
    /// A blocked video dequeue is also the point where video DMA is
    /// started lazily: each pass re-runs the arbiter, so a wake caused
    /// by the still stream finishing re-arms the engine and waits
    /// again.
    pub fn dequeue(&self, stream: StreamKind) -> Result<Buffer> {
        let mut streams = self.streams.lock().unwrap();

        if let Some(buf) = streams.get_mut(stream).queue.pop_done() {
            streams.get_mut(stream).queue.release();
            return Ok(buf);
        }

        streams.get_mut(stream).wait.begin();

        loop {
            if stream == StreamKind::Video {
                let next = arbiter::next_video_state(
                    streams.video.state,
                    streams.still.state,
                    TransitionCause::VideoDqbuf,
                );
                self.apply_video_state(&mut streams, next);
            }

            while !streams.get(stream).wait.posted {
                streams = self.wake(stream).wait(streams).unwrap();
            }
            streams.get_mut(stream).wait.posted = false;

            if streams.get(stream).wait.cause != WaitCause::StillStop {
                break;
            }
        }

        let inner = streams.get_mut(stream);
        inner.wait.waiting = false;
        match inner.wait.done.take() {
            Some(buf) => {
                inner.queue.release();
                Ok(buf)
            }
            None => Err(Error::Canceled),
        }
    }

    /// Wakes a dequeue blocked on `stream`, making it fail with
    /// [`Error::Canceled`]. Ok and a no-op when nothing is waiting.
    pub fn cancel_dequeue(&self, stream: StreamKind) -> Result<()> {
        let mut streams = self.streams.lock().unwrap();
        let inner = streams.get_mut(stream);

        if !inner.wait.waiting {
            return Ok(());
        }

        // A completion that slipped in just before this call wins: the
        // waiter finds the delivered buffer and returns it instead of
        // failing.
        inner.wait.cause = WaitCause::DqCancel;
        inner.wait.posted = true;
        self.wake(stream).notify_one();

        Ok(())
    }

    /// Triggers the continuous video stream. The still stream is
    /// triggered with [`take_picture_start`](Self::take_picture_start)
    /// instead; for it this is an accepted no-op.
    pub fn stream_on(&self, stream: StreamKind) -> Result<()> {
        if stream != StreamKind::Video {
            return Ok(());
        }

        let _own = self.video_op.lock().unwrap();
        let mut streams = self.streams.lock().unwrap();

        if streams.video.state != StreamState::StreamOff {
            return Err(Error::NotPermitted);
        }

        debug!("video stream on");
        let next = arbiter::next_video_state(
            streams.video.state,
            streams.still.state,
            TransitionCause::VideoStart,
        );
        self.apply_video_state(&mut streams, next);

        Ok(())
    }

    /// Stops the video stream, cancelling its in-flight transfer if
    /// any. Accepted no-op for the still stream.
    pub fn stream_off(&self, stream: StreamKind) -> Result<()> {
        if stream != StreamKind::Video {
            return Ok(());
        }

        let mut streams = self.streams.lock().unwrap();

        if streams.video.state == StreamState::StreamOff {
            return Err(Error::NotPermitted);
        }

        debug!("video stream off");
        let next = arbiter::next_video_state(
            streams.video.state,
            streams.still.state,
            TransitionCause::VideoStop,
        );
        self.apply_video_state(&mut streams, next);

        Ok(())
    }

    /// Starts a still burst of `capture_num` frames (zero or negative
    /// means unbounded, until [`take_picture_stop`](Self::take_picture_stop)).
    ///
    /// Still has priority: an active video transfer is demoted to
    /// pending and the engine switches over.
    pub fn take_picture_start(&self, capture_num: i32) -> Result<()> {
        let _own = self.still_op.lock().unwrap();
        let mut streams = self.streams.lock().unwrap();

        if streams.still.state != StreamState::StreamOff {
            return Err(Error::NotPermitted);
        }

        streams.still.remaining = if capture_num > 0 {
            capture_num
        } else {
            REMAINING_INFINITE
        };
        debug!(
            "still capture start, {} frame(s)",
            if capture_num > 0 {
                capture_num.to_string()
            } else {
                "unbounded".to_string()
            }
        );

        // Make the video stream yield the engine first.
        let next = arbiter::next_video_state(
            streams.video.state,
            streams.still.state,
            TransitionCause::StillStart,
        );
        self.apply_video_state(&mut streams, next);

        if !self.start_dma(&mut streams, StreamKind::Still) {
            streams.still.state = StreamState::StreamOn;
        }

        Ok(())
    }

    /// Ends the still burst: cancels an in-flight still transfer,
    /// resets the capture budget and hands the engine back to video if
    /// it is pending. Fails only when no burst was ever started.
    pub fn take_picture_stop(&self, _halfpush: bool) -> Result<()> {
        let _own = self.still_op.lock().unwrap();

        {
            let mut streams = self.streams.lock().unwrap();

            if streams.still.state == StreamState::StreamOff
                && streams.still.remaining == REMAINING_INFINITE
            {
                return Err(Error::NotPermitted);
            }

            if streams.still.state == StreamState::Dma {
                let _ = self.imgdata.cancel_dma();
                streams.still.queue.abort_dma();
            }
            streams.still.state = StreamState::StreamOff;
            streams.still.remaining = REMAINING_INFINITE;
            debug!("still capture stop");
        }

        let _video = self.video_op.lock().unwrap();
        let mut streams = self.streams.lock().unwrap();
        let next = arbiter::next_video_state(
            streams.video.state,
            streams.still.state,
            TransitionCause::StillStop,
        );
        self.apply_video_state(&mut streams, next);

        Ok(())
    }

    /// Passes the half-push (focus) trigger through to the sensor.
    pub fn do_halfpush(&self, enable: bool) -> Result<()> {
        self.sensor.do_halfpush(enable)
    }

    /// Completion entry point, called by the image pipeline for every
    /// finished or failed transfer. Interrupt-context safe: it never
    /// takes an operation lock, only the shared critical section, and
    /// never fails: completions it cannot attribute are dropped with a
    /// trace.
    pub fn notify_dma_done(&self, err_code: u8, datasize: u32) {
        let mut streams = self.streams.lock().unwrap();

        let Some(stream) = self.sensor.get_buftype() else {
            debug!("DMA completion with no buffer type selected, dropped");
            return;
        };

        let mut still_finished = false;
        {
            let inner = streams.get_mut(stream);

            if !inner.queue.has_dma() {
                debug!("{} DMA completion without an in-flight slot, dropped", stream);
                return;
            }

            let ok = err_code == 0;
            inner.queue.dma_done(datasize, !ok);
            if ok && inner.remaining > 0 {
                inner.remaining -= 1;
            }

            // Deliver to a waiter that has not been posted yet; once a
            // wake is pending, further completions stay in the done
            // list for later dequeues.
            if inner.wait.waiting && !inner.wait.posted {
                inner.wait.done = inner.queue.pop_done();
                inner.wait.cause = WaitCause::DmaDone;
                inner.wait.posted = true;
                self.wake(stream).notify_one();
            }

            if inner.remaining == 0 {
                // The burst hit its count.
                let _ = self.imgdata.cancel_dma();
                inner.state = StreamState::StreamOff;
                debug!("{} reached its capture count, stream off", stream);
                still_finished = stream == StreamKind::Still;
            } else if let Some(buf) = inner.queue.pop_for_dma() {
                let _ = self.imgdata.set_dmabuf(buf.userptr, buf.length);
            } else {
                let _ = self.imgdata.cancel_dma();
                inner.state = StreamState::StreamOn;
            }
        }

        if still_finished {
            if streams.video.wait.waiting && !streams.video.wait.posted {
                // Invite the blocked video dequeue to re-run the
                // arbiter; it re-enters the wait afterwards.
                streams.video.wait.cause = WaitCause::StillStop;
                streams.video.wait.posted = true;
                self.video_wake.notify_one();
            } else {
                let next = arbiter::next_video_state(
                    streams.video.state,
                    streams.still.state,
                    TransitionCause::StillStop,
                );
                self.apply_video_state(&mut streams, next);
            }
        }
    }

    /// Programs the head queued slot of `stream` into the pipeline and
    /// starts a transfer. Returns whether a transfer was started; the
    /// stream is in the DMA state when it was.
    fn start_dma(&self, streams: &mut Streams, stream: StreamKind) -> bool {
        let inner = streams.get_mut(stream);

        let Some(buf) = inner.queue.pop_for_dma() else {
            return false;
        };

        self.sensor.set_buftype(stream);
        let format = self.sensor.get_format(stream);
        if let Err(e) = self.imgdata.start_dma(&format, buf.userptr, buf.length) {
            error!("failed to start {} DMA: {}", stream, e);
            inner.queue.abort_dma();
            return false;
        }

        debug!("{} DMA started on buffer {}", stream, buf.index);
        inner.state = StreamState::Dma;
        true
    }

    /// Makes the hardware and the video stream follow the arbiter's
    /// verdict: entering the DMA state programs the next queued buffer
    /// (falling back to pending when none is available), leaving it
    /// cancels the in-flight transfer and reclaims its slot.
    fn apply_video_state(&self, streams: &mut Streams, next: StreamState) {
        let cur = streams.video.state;

        if cur != StreamState::Dma && next == StreamState::Dma {
            if !self.start_dma(streams, StreamKind::Video) {
                streams.video.state = StreamState::StreamOn;
            }
        } else {
            if cur == StreamState::Dma && next != StreamState::Dma {
                let _ = self.imgdata.cancel_dma();
                streams.video.queue.abort_dma();
            }
            streams.video.state = next;
        }
    }

    /// Current state of `stream`.
    pub fn stream_state(&self, stream: StreamKind) -> StreamState {
        self.streams.lock().unwrap().get(stream).state
    }

    /// Remaining captures of `stream`; [`REMAINING_INFINITE`] when
    /// unbounded.
    pub fn remaining_captures(&self, stream: StreamKind) -> i32 {
        self.streams.lock().unwrap().get(stream).remaining
    }

    /// Slot accounting of `stream`'s queue.
    pub fn queue_stats(&self, stream: StreamKind) -> QueueStats {
        let streams = self.streams.lock().unwrap();
        let queue = &streams.get(stream).queue;
        QueueStats {
            free: queue.num_free(),
            queued: queue.num_queued(),
            in_flight: usize::from(queue.has_dma()),
            done: queue.num_done(),
        }
    }

    fn catalog(&self, stream: StreamKind) -> &FormatCatalog {
        match stream {
            StreamKind::Video => &self.video_formats,
            StreamKind::Still => &self.still_formats,
        }
    }

    /// Returns the `index`-th format supported by both the sensor and
    /// the pipeline for `stream`.
    pub fn enum_fmt(&self, stream: StreamKind, index: u32) -> Result<FmtDesc> {
        self.catalog(stream)
            .get(index)
            .cloned()
            .ok_or(Error::InvalidArg)
    }

    /// Enumerates the frame sizes supported by both the sensor and the
    /// pipeline for the queried pixel format.
    pub fn enum_frame_sizes(&self, query: &FrameSizeQuery) -> Result<SizeRange> {
        format::enum_frame_sizes(self.sensor.as_ref(), self.imgdata.as_ref(), query)
    }

    /// Frame-interval enumeration, answered by the sensor alone.
    pub fn enum_frame_intervals(&self, frmival: &mut FrameIntervalEnum) -> Result<()> {
        self.sensor.frameinterval_range(frmival)
    }

    /// Checks `format` against the pipeline, then the sensor, without
    /// applying anything.
    pub fn try_fmt(&self, format: &Format) -> Result<()> {
        self.imgdata.try_format(format)?;
        self.sensor.try_format(format)
    }

    /// Applies `format` on the sensor, after a pipeline pre-check so an
    /// unsupported format is refused before anything is committed.
    pub fn s_fmt(&self, format: &Format) -> Result<()> {
        self.imgdata.try_format(format)?;
        self.sensor.set_format(format)
    }

    /// Applies streaming parameters (frame interval) on the sensor.
    pub fn s_parm(&self, parm: &StreamParm) -> Result<()> {
        self.sensor.set_frameinterval(parm)
    }

    /// Extended control range query, answered by the sensor.
    pub fn query_ext_ctrl(&self, ctrl: &mut QueryExtCtrl) -> Result<()> {
        self.sensor.ctrl_range(ctrl)
    }

    /// Legacy control range query. Delegates to the extended query and
    /// narrows the answer; control types that do not fit the 32-bit
    /// records are refused.
    pub fn query_ctrl(&self, ctrl: &mut QueryCtrl) -> Result<()> {
        let mut ext = QueryExtCtrl::new(ctrl.ctrl_class, ctrl.id);
        self.query_ext_ctrl(&mut ext)?;

        if ext.ctrl_type.is_ext_only() {
            return Err(Error::InvalidArg);
        }

        ctrl.ctrl_type = ext.ctrl_type;
        ctrl.minimum = ext.minimum as i32;
        ctrl.maximum = ext.maximum as i32;
        ctrl.step = ext.step as i32;
        ctrl.default_value = ext.default_value as i32;
        ctrl.flags = ext.flags;
        ctrl.name = ext.name;

        Ok(())
    }

    /// Menu entry query, answered by the sensor.
    pub fn query_menu(&self, menu: &mut QueryMenu) -> Result<()> {
        self.sensor.ctrl_menu(menu)
    }

    /// Legacy single-control read, wrapped over the extended batch
    /// surface with the user control class.
    pub fn g_ctrl(&self, ctrl: &mut Control) -> Result<()> {
        let mut ext = ExtControls::new(
            CtrlClass::User,
            vec![ExtControl {
                id: ctrl.id,
                value: 0,
            }],
        );
        self.g_ext_ctrls(&mut ext)?;
        ctrl.value = ext.controls[0].value as i32;
        Ok(())
    }

    /// Legacy single-control write, wrapped over the extended batch
    /// surface with the user control class.
    pub fn s_ctrl(&self, ctrl: &Control) -> Result<()> {
        let mut ext = ExtControls::new(
            CtrlClass::User,
            vec![ExtControl {
                id: ctrl.id,
                value: i64::from(ctrl.value),
            }],
        );
        self.s_ext_ctrls(&mut ext)
    }

    /// Reads a batch of extended controls in order. On failure
    /// `error_idx` reports how many were processed before the failing
    /// one, and its error is returned.
    pub fn g_ext_ctrls(&self, ctrls: &mut ExtControls) -> Result<()> {
        let class = ctrls.ctrl_class;
        for (idx, control) in ctrls.controls.iter_mut().enumerate() {
            if let Err(e) = self.sensor.get_ctrl(class, control) {
                ctrls.error_idx = idx as u32;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Writes a batch of extended controls in order, with the same
    /// partial-failure reporting as [`g_ext_ctrls`](Self::g_ext_ctrls).
    pub fn s_ext_ctrls(&self, ctrls: &mut ExtControls) -> Result<()> {
        let class = ctrls.ctrl_class;
        for (idx, control) in ctrls.controls.iter().enumerate() {
            if let Err(e) = self.sensor.set_ctrl(class, control) {
                ctrls.error_idx = idx as u32;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Scene-parameter range query, answered by the sensor.
    pub fn query_ext_ctrl_scene(&self, ctrl: &mut QueryExtCtrlScene) -> Result<()> {
        self.sensor.scene_range(ctrl.mode, &mut ctrl.control)
    }

    /// Scene-parameter menu query, answered by the sensor.
    pub fn query_menu_scene(&self, menu: &mut QueryMenuScene) -> Result<()> {
        self.sensor.scene_menu(menu.mode, &mut menu.menu)
    }

    /// Reads a batch of scene parameters for one scene mode.
    pub fn g_ext_ctrls_scene(&self, ctrls: &mut ExtControlsScene) -> Result<()> {
        let mode = ctrls.mode;
        let class = ctrls.control.ctrl_class;
        for (idx, control) in ctrls.control.controls.iter_mut().enumerate() {
            if let Err(e) = self.sensor.get_scene_param(mode, class, control) {
                ctrls.control.error_idx = idx as u32;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Writes a batch of scene parameters for one scene mode.
    pub fn s_ext_ctrls_scene(&self, ctrls: &mut ExtControlsScene) -> Result<()> {
        let mode = ctrls.mode;
        let class = ctrls.control.ctrl_class;
        for (idx, control) in ctrls.control.controls.iter().enumerate() {
            if let Err(e) = self.sensor.set_scene_param(mode, class, control) {
                ctrls.control.error_idx = idx as u32;
                return Err(e);
            }
        }
        Ok(())
    }
}
