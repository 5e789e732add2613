//! Scripted sensor and pipeline doubles for exercising the manager
//! without hardware.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use capmux::controls::{
    CtrlClass, CtrlType, ExtControl, QueryExtCtrl, QueryMenu, SceneMode,
};
use capmux::format::{FmtDesc, FormatFlags};
use capmux::hal::{
    Discrete, FrameIntervalEnum, FrameSizeQuery, Fract, ImageData, SensorCtl, SizeRange,
    StreamParm,
};
use capmux::{Error, Format, PixelFormat, Result, StreamKind, StreamManager};

pub const YUYV: PixelFormat = PixelFormat::from_fourcc(b"YUYV");
pub const RGB565: PixelFormat = PixelFormat::from_fourcc(b"RGBP");
pub const JPEG: PixelFormat = PixelFormat::from_fourcc(b"JPEG");
pub const NO_SUB: PixelFormat = PixelFormat::from_u32(0);

/// Control id the mock sensor always refuses to set.
pub const BAD_CTRL_ID: u32 = 0xdead;

pub fn fmt_desc(pixelformat: PixelFormat, description: &str) -> FmtDesc {
    FmtDesc {
        index: 0,
        stream: StreamKind::Video,
        flags: FormatFlags::empty(),
        pixelformat,
        sub_pixelformat: NO_SUB,
        description: description.to_owned(),
    }
}

#[derive(Default)]
pub struct SensorState {
    pub opens: u32,
    pub closes: u32,
    pub buftype: Option<StreamKind>,
    pub applied_format: Option<Format>,
    pub frame_interval: Option<Fract>,
    pub halfpush: Option<bool>,
    pub ctrls: HashMap<u32, i64>,
    pub scene_params: HashMap<(u32, u32), i64>,
}

pub struct MockSensor {
    pub formats: Vec<FmtDesc>,
    pub sizes: Vec<SizeRange>,
    pub active_format: Format,
    pub ctrl_type: CtrlType,
    pub state: Mutex<SensorState>,
}

impl MockSensor {
    pub fn new(formats: Vec<FmtDesc>) -> Self {
        MockSensor {
            formats,
            sizes: Vec::new(),
            active_format: Format::from((b"YUYV", (640, 480))),
            ctrl_type: CtrlType::Integer,
            state: Mutex::new(SensorState::default()),
        }
    }

    pub fn buftype(&self) -> Option<StreamKind> {
        self.state.lock().unwrap().buftype
    }
}

impl SensorCtl for MockSensor {
    fn open(&self) -> Result<()> {
        self.state.lock().unwrap().opens += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }

    fn format_range(&self, _stream: StreamKind, index: u32) -> Option<FmtDesc> {
        self.formats.get(index as usize).cloned()
    }

    fn framesize_range(&self, query: &FrameSizeQuery) -> Option<SizeRange> {
        self.sizes.get(query.index as usize).copied()
    }

    fn frameinterval_range(&self, frmival: &mut FrameIntervalEnum) -> Result<()> {
        if frmival.index != 0 {
            return Err(Error::InvalidArg);
        }
        frmival.interval = Fract {
            numerator: 1,
            denominator: 30,
        };
        Ok(())
    }

    fn try_format(&self, _format: &Format) -> Result<()> {
        Ok(())
    }

    fn set_format(&self, format: &Format) -> Result<()> {
        self.state.lock().unwrap().applied_format = Some(*format);
        Ok(())
    }

    fn set_frameinterval(&self, parm: &StreamParm) -> Result<()> {
        self.state.lock().unwrap().frame_interval = Some(parm.timeperframe);
        Ok(())
    }

    fn set_buftype(&self, stream: StreamKind) {
        self.state.lock().unwrap().buftype = Some(stream);
    }

    fn get_buftype(&self) -> Option<StreamKind> {
        self.state.lock().unwrap().buftype
    }

    fn get_format(&self, _stream: StreamKind) -> Format {
        self.active_format
    }

    fn do_halfpush(&self, enable: bool) -> Result<()> {
        self.state.lock().unwrap().halfpush = Some(enable);
        Ok(())
    }

    fn ctrl_range(&self, ctrl: &mut QueryExtCtrl) -> Result<()> {
        ctrl.ctrl_type = self.ctrl_type;
        ctrl.name = "brightness".to_owned();
        ctrl.minimum = -128;
        ctrl.maximum = 127;
        ctrl.step = 1;
        ctrl.default_value = 8;
        ctrl.flags = 0;
        ctrl.elems = 1;
        Ok(())
    }

    fn ctrl_menu(&self, menu: &mut QueryMenu) -> Result<()> {
        menu.name = format!("item-{}", menu.index);
        Ok(())
    }

    fn get_ctrl(&self, _class: CtrlClass, ctrl: &mut ExtControl) -> Result<()> {
        match self.state.lock().unwrap().ctrls.get(&ctrl.id) {
            Some(value) => {
                ctrl.value = *value;
                Ok(())
            }
            None => Err(Error::NotSupported),
        }
    }

    fn set_ctrl(&self, _class: CtrlClass, ctrl: &ExtControl) -> Result<()> {
        if ctrl.id == BAD_CTRL_ID {
            return Err(Error::NotSupported);
        }
        self.state.lock().unwrap().ctrls.insert(ctrl.id, ctrl.value);
        Ok(())
    }

    fn scene_range(&self, _mode: SceneMode, ctrl: &mut QueryExtCtrl) -> Result<()> {
        self.ctrl_range(ctrl)
    }

    fn scene_menu(&self, _mode: SceneMode, menu: &mut QueryMenu) -> Result<()> {
        self.ctrl_menu(menu)
    }

    fn get_scene_param(
        &self,
        mode: SceneMode,
        _class: CtrlClass,
        ctrl: &mut ExtControl,
    ) -> Result<()> {
        match self
            .state
            .lock()
            .unwrap()
            .scene_params
            .get(&(mode as u32, ctrl.id))
        {
            Some(value) => {
                ctrl.value = *value;
                Ok(())
            }
            None => Err(Error::NotSupported),
        }
    }

    fn set_scene_param(
        &self,
        mode: SceneMode,
        _class: CtrlClass,
        ctrl: &ExtControl,
    ) -> Result<()> {
        if ctrl.id == BAD_CTRL_ID {
            return Err(Error::NotSupported);
        }
        self.state
            .lock()
            .unwrap()
            .scene_params
            .insert((mode as u32, ctrl.id), ctrl.value);
        Ok(())
    }
}

/// What the pipeline was asked to do, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaCall {
    Start { userptr: u64, length: u32 },
    SetNext { userptr: u64, length: u32 },
    Cancel,
}

pub struct MockPipeline {
    pub accepted: Vec<PixelFormat>,
    pub sizes: Vec<SizeRange>,
    /// Upper bound enforced by `try_format`, for discrete filtering.
    pub max_size: Option<Discrete>,
    pub calls: Mutex<Vec<DmaCall>>,
}

impl MockPipeline {
    pub fn new(accepted: Vec<PixelFormat>) -> Self {
        MockPipeline {
            accepted,
            sizes: Vec::new(),
            max_size: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DmaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<DmaCall> {
        self.calls.lock().unwrap().last().copied()
    }
}

impl ImageData for MockPipeline {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn accepts_format(&self, pixelformat: PixelFormat, _sub_pixelformat: PixelFormat) -> bool {
        self.accepted.contains(&pixelformat)
    }

    fn framesize_range(&self, query: &FrameSizeQuery) -> Option<SizeRange> {
        self.sizes.get(query.index as usize).copied()
    }

    fn try_format(&self, format: &Format) -> Result<()> {
        if !self.accepted.contains(&format.pixelformat) {
            return Err(Error::NotSupported);
        }
        if let Some(max) = self.max_size {
            if format.width > max.width || format.height > max.height {
                return Err(Error::NotSupported);
            }
        }
        Ok(())
    }

    fn start_dma(&self, _format: &Format, userptr: u64, length: u32) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DmaCall::Start { userptr, length });
        Ok(())
    }

    fn set_dmabuf(&self, userptr: u64, length: u32) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DmaCall::SetNext { userptr, length });
        Ok(())
    }

    fn cancel_dma(&self) -> Result<()> {
        self.calls.lock().unwrap().push(DmaCall::Cancel);
        Ok(())
    }
}

/// An opened manager over a YUYV sensor/pipeline pair.
pub fn make_manager() -> (Arc<StreamManager>, Arc<MockSensor>, Arc<MockPipeline>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let sensor = Arc::new(MockSensor::new(vec![fmt_desc(YUYV, "YUYV 4:2:2")]));
    let pipeline = Arc::new(MockPipeline::new(vec![YUYV]));
    let manager = Arc::new(
        StreamManager::new("/dev/video0", sensor.clone(), pipeline.clone())
            .expect("manager construction"),
    );
    manager.open().expect("first open");

    (manager, sensor, pipeline)
}
