pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Configuration schema version this client is built against.
pub const SCHEMA_VERSION: u32 = 1;

/// A complete configuration snapshot as exchanged with the device.
///
/// Collections are dense and index-addressed: the wire index of an entity is
/// its position in the list. `joysticks` and `selectors` are device-variant
/// specific and keep their presence across a load/save cycle. Top-level
/// sections this client does not model are carried in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigPayload {
    #[serde(
        rename = "schemaVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_version: Option<u32>,

    #[serde(default)]
    pub buttons: Vec<Button>,

    #[serde(default)]
    pub leds: Vec<Led>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joysticks: Option<Vec<Joystick>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Selectors>,

    #[serde(default)]
    pub bindings: Vec<Binding>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigPayload {
    /// Number of entities of `kind`. Selectors count as one when present.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Button => self.buttons.len(),
            EntityKind::Led => self.leds.len(),
            EntityKind::Joystick => self.joysticks.as_ref().map_or(0, Vec::len),
            EntityKind::Selectors => usize::from(self.selectors.is_some()),
            EntityKind::Binding => self.bindings.len(),
        }
    }
}

/// A physical button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    #[serde(default = "default_button_name")]
    pub name: String,

    #[serde(default)]
    pub is_toggle: bool,

    /// 0 = no group; buttons sharing a nonzero id are mutually exclusive.
    #[serde(default)]
    pub radio_group_id: i32,
}

/// A status LED and what drives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Led {
    #[serde(default = "default_led_name")]
    pub name: String,

    /// Raw `LedBinding` code.
    #[serde(default)]
    pub binding_type: i32,

    /// Button index when bound to a button, -1 otherwise.
    #[serde(default = "unset_index")]
    pub bound_button_index: i32,

    /// Machine state bit when bound to machine state, -1 otherwise.
    #[serde(default = "unset_index")]
    pub lcnc_state_bit: i32,
}

impl Led {
    pub fn binding(&self) -> Option<LedBinding> {
        LedBinding::from_code(self.binding_type)
    }
}

/// A joystick and its per-axis tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joystick {
    /// Display name supplied by the device. Never sent back.
    #[serde(default, skip_serializing)]
    pub name: Option<String>,

    #[serde(default)]
    pub axes: Vec<JoystickAxis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoystickAxis {
    #[serde(default)]
    pub is_inverted: bool,

    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,

    #[serde(default = "default_deadzone")]
    pub center_deadzone: i32,
}

/// Named positions of the axis and step selector switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(default)]
    pub axis_names: Vec<String>,

    #[serde(default)]
    pub step_names: Vec<String>,

    /// Number of DRO axes shown, 1-6.
    #[serde(default = "default_dro_axes")]
    pub num_dro_axes: i32,
}

/// A rule: while the machine is in `trigger` state, perform `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(default)]
    pub is_active: bool,

    /// Raw `TriggerType` code.
    pub trigger: i32,

    /// Raw `ActionType` code.
    pub action: i32,
}

/// The entity collections of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Button,
    Led,
    Joystick,
    Selectors,
    Binding,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Button => "button",
            Self::Led => "led",
            Self::Joystick => "joystick",
            Self::Selectors => "selectors",
            Self::Binding => "binding",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedBinding {
    Unbound,
    BoundToButton,
    BoundToState,
}

impl LedBinding {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unbound),
            1 => Some(Self::BoundToButton),
            2 => Some(Self::BoundToState),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unbound => 0,
            Self::BoundToButton => 1,
            Self::BoundToState => 2,
        }
    }
}

/// Machine states a binding can be triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    MachineOn,
    AutoMode,
    MdiMode,
    JogMode,
    ProgramRunning,
    ProgramPaused,
    OnHome,
    SpindleOn,
    SpindleAtSpeed,
    MistOn,
    FloodOn,
}

impl TriggerType {
    pub const ALL: [Self; 11] = [
        Self::MachineOn,
        Self::AutoMode,
        Self::MdiMode,
        Self::JogMode,
        Self::ProgramRunning,
        Self::ProgramPaused,
        Self::OnHome,
        Self::SpindleOn,
        Self::SpindleAtSpeed,
        Self::MistOn,
        Self::FloodOn,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn code(self) -> i32 {
        match self {
            Self::MachineOn => 0,
            Self::AutoMode => 1,
            Self::MdiMode => 2,
            Self::JogMode => 3,
            Self::ProgramRunning => 4,
            Self::ProgramPaused => 5,
            Self::OnHome => 6,
            Self::SpindleOn => 16,
            Self::SpindleAtSpeed => 17,
            Self::MistOn => 18,
            Self::FloodOn => 19,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MachineOn => "Machine is ON",
            Self::AutoMode => "In AUTO Mode",
            Self::MdiMode => "In MDI Mode",
            Self::JogMode => "In JOG Mode",
            Self::ProgramRunning => "Program is Running",
            Self::ProgramPaused => "Program is Paused",
            Self::OnHome => "On Home Position",
            Self::SpindleOn => "Spindle is ON",
            Self::SpindleAtSpeed => "Spindle at Speed",
            Self::MistOn => "Mist Coolant is ON",
            Self::FloodOn => "Flood Coolant is ON",
        }
    }
}

/// Actions the device performs when a binding fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    NoAction,
    EnableJoystick1,
    DisableJoystick1,
}

impl ActionType {
    pub const ALL: [Self; 3] = [Self::NoAction, Self::EnableJoystick1, Self::DisableJoystick1];

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    pub fn code(self) -> i32 {
        match self {
            Self::NoAction => 0,
            Self::EnableJoystick1 => 1,
            Self::DisableJoystick1 => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoAction => "No Action",
            Self::EnableJoystick1 => "Enable Joystick 1",
            Self::DisableJoystick1 => "Disable Joystick 1",
        }
    }

    /// Actions that switch a physical input device on or off.
    pub fn is_sensitive(self) -> bool {
        matches!(self, Self::EnableJoystick1 | Self::DisableJoystick1)
    }

    /// Whether a raw action code is a declared sensitive action.
    pub fn is_sensitive_code(code: i32) -> bool {
        Self::from_code(code).is_some_and(Self::is_sensitive)
    }
}

// --- Defaults ---

fn default_button_name() -> String {
    "Button".to_string()
}

fn default_led_name() -> String {
    "LED".to_string()
}

fn unset_index() -> i32 {
    -1
}

fn default_sensitivity() -> f32 {
    1.0
}

fn default_deadzone() -> i32 {
    50
}

fn default_dro_axes() -> i32 {
    3
}
