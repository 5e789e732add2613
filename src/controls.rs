//! Control, menu and scene-parameter records.
//!
//! These are pass-through payloads: the manager validates and forwards
//! them to the sensor, converting between the legacy single-control
//! surface and the extended one where needed.

use enumn::N;

/// Data type of a control value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum CtrlType {
    Integer = 1,
    Boolean = 2,
    Menu = 3,
    Button = 4,
    Integer64 = 5,
    CtrlClass = 6,
    String = 7,
    Bitmask = 8,
    IntegerMenu = 9,
    U8 = 0x0100,
    U16 = 0x0101,
    U32 = 0x0102,
}

impl CtrlType {
    /// Types whose values do not fit the legacy 32-bit control records.
    pub fn is_ext_only(self) -> bool {
        matches!(
            self,
            CtrlType::Integer64 | CtrlType::U8 | CtrlType::U16 | CtrlType::U32
        )
    }
}

/// Class a control belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum CtrlClass {
    User = 0x0098_0000,
    Camera = 0x009a_0000,
    Flash = 0x009c_0000,
    Jpeg = 0x009d_0000,
}

/// Scene program selector for the scene-parameter surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum SceneMode {
    None = 0,
    Backlight = 1,
    BeachSnow = 2,
    CandleLight = 3,
    DawnDusk = 4,
    FallColors = 5,
    Fireworks = 6,
    Landscape = 7,
    Night = 8,
    PartyIndoor = 9,
    Portrait = 10,
    Sports = 11,
    Sunset = 12,
    Text = 13,
}

/// Extended control range query. The caller fills `ctrl_class` and
/// `id`; the sensor fills the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryExtCtrl {
    pub ctrl_class: CtrlClass,
    pub id: u32,
    pub ctrl_type: CtrlType,
    pub name: String,
    pub minimum: i64,
    pub maximum: i64,
    pub step: u64,
    pub default_value: i64,
    pub flags: u32,
    /// Number of value elements; 1 for scalar controls.
    pub elems: u32,
}

impl QueryExtCtrl {
    pub fn new(ctrl_class: CtrlClass, id: u32) -> Self {
        QueryExtCtrl {
            ctrl_class,
            id,
            ctrl_type: CtrlType::Integer,
            name: String::new(),
            minimum: 0,
            maximum: 0,
            step: 0,
            default_value: 0,
            flags: 0,
            elems: 1,
        }
    }
}

/// Legacy control range query with 32-bit value fields.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryCtrl {
    pub ctrl_class: CtrlClass,
    pub id: u32,
    pub ctrl_type: CtrlType,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl QueryCtrl {
    pub fn new(ctrl_class: CtrlClass, id: u32) -> Self {
        QueryCtrl {
            ctrl_class,
            id,
            ctrl_type: CtrlType::Integer,
            name: String::new(),
            minimum: 0,
            maximum: 0,
            step: 0,
            default_value: 0,
            flags: 0,
        }
    }
}

/// Menu entry query for a menu-typed control. The sensor fills `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryMenu {
    pub ctrl_class: CtrlClass,
    pub id: u32,
    pub index: u32,
    pub name: String,
}

/// Legacy single control value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Control {
    pub id: u32,
    pub value: i32,
}

/// One extended control value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtControl {
    pub id: u32,
    pub value: i64,
}

/// A batch of extended controls processed in order.
///
/// On failure `error_idx` reports how many controls were successfully
/// processed before the failing one.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtControls {
    pub ctrl_class: CtrlClass,
    pub error_idx: u32,
    pub controls: Vec<ExtControl>,
}

impl ExtControls {
    pub fn new(ctrl_class: CtrlClass, controls: Vec<ExtControl>) -> Self {
        ExtControls {
            ctrl_class,
            error_idx: 0,
            controls,
        }
    }
}

/// Scene-mode variant of [`QueryExtCtrl`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryExtCtrlScene {
    pub mode: SceneMode,
    pub control: QueryExtCtrl,
}

/// Scene-mode variant of [`QueryMenu`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryMenuScene {
    pub mode: SceneMode,
    pub menu: QueryMenu,
}

/// Scene-mode variant of [`ExtControls`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExtControlsScene {
    pub mode: SceneMode,
    pub control: ExtControls,
}
