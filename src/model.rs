//! In-memory configuration model.
//!
//! Holds the last configuration the device sent (or the last one we sent it)
//! and a staging copy that local edits mutate. Both are replaced wholesale on
//! every snapshot.

use crate::error::{Result, SyncError};
use crate::schema::{
    Binding, Button, ConfigPayload, EntityKind, Joystick, JoystickAxis, Led, Selectors,
};
use tracing::debug;

/// Field-level changes for a single button. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ButtonPatch {
    pub name: Option<String>,
    pub is_toggle: Option<bool>,
    pub radio_group_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedPatch {
    pub name: Option<String>,
    pub binding_type: Option<i32>,
    pub bound_button_index: Option<i32>,
    pub lcnc_state_bit: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisPatch {
    pub is_inverted: Option<bool>,
    pub sensitivity: Option<f32>,
    pub center_deadzone: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorPatch {
    pub axis_names: Option<Vec<String>>,
    pub step_names: Option<Vec<String>>,
    pub num_dro_axes: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingPatch {
    pub is_active: Option<bool>,
    pub trigger: Option<i32>,
    pub action: Option<i32>,
}

/// An edit to one entity. The entity kind is implied by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Button(ButtonPatch),
    Led(LedPatch),
    /// Addresses one axis of the joystick at the update index.
    JoystickAxis { axis: usize, patch: AxisPatch },
    /// Selectors are a single entity; the update index must be 0.
    Selectors(SelectorPatch),
    Binding(BindingPatch),
}

impl Patch {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Button(_) => EntityKind::Button,
            Self::Led(_) => EntityKind::Led,
            Self::JoystickAxis { .. } => EntityKind::Joystick,
            Self::Selectors(_) => EntityKind::Selectors,
            Self::Binding(_) => EntityKind::Binding,
        }
    }
}

/// Replace `target` with the patched value, returning the value it held.
fn swap<T>(target: &mut T, value: Option<T>) -> Option<T> {
    value.map(|v| std::mem::replace(target, v))
}

/// `Some(new)` when the two differ.
fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

impl ButtonPatch {
    fn apply(self, button: &mut Button) -> Self {
        Self {
            name: swap(&mut button.name, self.name),
            is_toggle: swap(&mut button.is_toggle, self.is_toggle),
            radio_group_id: swap(&mut button.radio_group_id, self.radio_group_id),
        }
    }

    fn between(old: &Button, new: &Button) -> Self {
        Self {
            name: changed(&old.name, &new.name),
            is_toggle: changed(&old.is_toggle, &new.is_toggle),
            radio_group_id: changed(&old.radio_group_id, &new.radio_group_id),
        }
    }
}

impl LedPatch {
    fn apply(self, led: &mut Led) -> Self {
        Self {
            name: swap(&mut led.name, self.name),
            binding_type: swap(&mut led.binding_type, self.binding_type),
            bound_button_index: swap(&mut led.bound_button_index, self.bound_button_index),
            lcnc_state_bit: swap(&mut led.lcnc_state_bit, self.lcnc_state_bit),
        }
    }

    fn between(old: &Led, new: &Led) -> Self {
        Self {
            name: changed(&old.name, &new.name),
            binding_type: changed(&old.binding_type, &new.binding_type),
            bound_button_index: changed(&old.bound_button_index, &new.bound_button_index),
            lcnc_state_bit: changed(&old.lcnc_state_bit, &new.lcnc_state_bit),
        }
    }
}

impl AxisPatch {
    fn apply(self, axis: &mut JoystickAxis) -> Self {
        Self {
            is_inverted: swap(&mut axis.is_inverted, self.is_inverted),
            sensitivity: swap(&mut axis.sensitivity, self.sensitivity),
            center_deadzone: swap(&mut axis.center_deadzone, self.center_deadzone),
        }
    }

    fn between(old: &JoystickAxis, new: &JoystickAxis) -> Self {
        Self {
            is_inverted: changed(&old.is_inverted, &new.is_inverted),
            sensitivity: changed(&old.sensitivity, &new.sensitivity),
            center_deadzone: changed(&old.center_deadzone, &new.center_deadzone),
        }
    }
}

impl SelectorPatch {
    fn apply(self, selectors: &mut Selectors) -> Self {
        Self {
            axis_names: swap(&mut selectors.axis_names, self.axis_names),
            step_names: swap(&mut selectors.step_names, self.step_names),
            num_dro_axes: swap(&mut selectors.num_dro_axes, self.num_dro_axes),
        }
    }

    fn between(old: &Selectors, new: &Selectors) -> Self {
        Self {
            axis_names: changed(&old.axis_names, &new.axis_names),
            step_names: changed(&old.step_names, &new.step_names),
            num_dro_axes: changed(&old.num_dro_axes, &new.num_dro_axes),
        }
    }
}

impl BindingPatch {
    fn apply(self, binding: &mut Binding) -> Self {
        Self {
            is_active: swap(&mut binding.is_active, self.is_active),
            trigger: swap(&mut binding.trigger, self.trigger),
            action: swap(&mut binding.action, self.action),
        }
    }

    fn between(old: &Binding, new: &Binding) -> Self {
        Self {
            is_active: changed(&old.is_active, &new.is_active),
            trigger: changed(&old.trigger, &new.trigger),
            action: changed(&old.action, &new.action),
        }
    }
}

fn entry<T>(items: &mut [T], kind: EntityKind, index: usize) -> Result<&mut T> {
    let len = items.len();
    items
        .get_mut(index)
        .ok_or(SyncError::IndexOutOfRange { kind, index, len })
}

fn same_len(kind: EntityKind, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SyncError::ShapeMismatch {
            kind,
            expected,
            found,
        })
    }
}

/// The device configuration as last loaded, plus local edits.
#[derive(Debug, Default)]
pub struct ConfigModel {
    committed: Option<ConfigPayload>,
    staging: Option<ConfigPayload>,
}

impl ConfigModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh snapshot. Pending edits are dropped.
    pub fn load(&mut self, snapshot: ConfigPayload) {
        debug!(
            "loading snapshot: {} buttons, {} leds, {} bindings",
            snapshot.buttons.len(),
            snapshot.leds.len(),
            snapshot.bindings.len()
        );
        self.staging = Some(snapshot.clone());
        self.committed = Some(snapshot);
    }

    pub fn is_loaded(&self) -> bool {
        self.staging.is_some()
    }

    /// The staging configuration, including unsaved edits.
    pub fn staged(&self) -> Option<&ConfigPayload> {
        self.staging.as_ref()
    }

    /// The configuration the device is believed to hold.
    pub fn committed(&self) -> Option<&ConfigPayload> {
        self.committed.as_ref()
    }

    pub fn buttons(&self) -> &[Button] {
        self.staging
            .as_ref()
            .map(|c| c.buttons.as_slice())
            .unwrap_or_default()
    }

    pub fn leds(&self) -> &[Led] {
        self.staging
            .as_ref()
            .map(|c| c.leds.as_slice())
            .unwrap_or_default()
    }

    pub fn joysticks(&self) -> &[Joystick] {
        self.staging
            .as_ref()
            .and_then(|c| c.joysticks.as_deref())
            .unwrap_or_default()
    }

    pub fn selectors(&self) -> Option<&Selectors> {
        self.staging.as_ref()?.selectors.as_ref()
    }

    pub fn bindings(&self) -> &[Binding] {
        self.staging
            .as_ref()
            .map(|c| c.bindings.as_slice())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.staging.as_ref().map_or(0, |c| c.count(kind))
    }

    /// Apply `patch` to the staged entity at `index`.
    ///
    /// Returns the inverse patch: applying it restores the previous values.
    ///
    /// # Errors
    /// Returns `SyncError::NotLoaded` before the first snapshot and
    /// `SyncError::IndexOutOfRange` if the entity does not exist.
    pub fn update(&mut self, index: usize, patch: Patch) -> Result<Patch> {
        let config = self.staging.as_mut().ok_or(SyncError::NotLoaded)?;
        let kind = patch.kind();

        let inverse = match patch {
            Patch::Button(p) => Patch::Button(p.apply(entry(&mut config.buttons, kind, index)?)),
            Patch::Led(p) => Patch::Led(p.apply(entry(&mut config.leds, kind, index)?)),
            Patch::JoystickAxis { axis, patch } => {
                let joysticks = config.joysticks.as_deref_mut().unwrap_or_default();
                let joystick = entry(joysticks, kind, index)?;
                let len = joystick.axes.len();
                let target = joystick
                    .axes
                    .get_mut(axis)
                    .ok_or(SyncError::IndexOutOfRange {
                        kind,
                        index: axis,
                        len,
                    })?;
                Patch::JoystickAxis {
                    axis,
                    patch: patch.apply(target),
                }
            }
            Patch::Selectors(p) => {
                let len = usize::from(config.selectors.is_some());
                match config.selectors.as_mut() {
                    Some(selectors) if index == 0 => Patch::Selectors(p.apply(selectors)),
                    _ => return Err(SyncError::IndexOutOfRange { kind, index, len }),
                }
            }
            Patch::Binding(p) => Patch::Binding(p.apply(entry(&mut config.bindings, kind, index)?)),
        };

        Ok(inverse)
    }

    /// Express an edited configuration as per-entity patches against staging.
    ///
    /// Collections must keep their length: entities are addressed by position
    /// and cannot be added, removed or reordered.
    ///
    /// # Errors
    /// Returns `SyncError::NotLoaded` before the first snapshot and
    /// `SyncError::ShapeMismatch` if a collection changed size.
    pub fn diff(&self, edited: &ConfigPayload) -> Result<Vec<(usize, Patch)>> {
        let current = self.staging.as_ref().ok_or(SyncError::NotLoaded)?;

        for kind in [
            EntityKind::Button,
            EntityKind::Led,
            EntityKind::Joystick,
            EntityKind::Selectors,
            EntityKind::Binding,
        ] {
            same_len(kind, current.count(kind), edited.count(kind))?;
        }

        let mut patches = Vec::new();

        for (i, (old, new)) in current.buttons.iter().zip(&edited.buttons).enumerate() {
            if old != new {
                patches.push((i, Patch::Button(ButtonPatch::between(old, new))));
            }
        }
        for (i, (old, new)) in current.leds.iter().zip(&edited.leds).enumerate() {
            if old != new {
                patches.push((i, Patch::Led(LedPatch::between(old, new))));
            }
        }

        let old_joysticks = current.joysticks.as_deref().unwrap_or_default();
        let new_joysticks = edited.joysticks.as_deref().unwrap_or_default();
        for (i, (old, new)) in old_joysticks.iter().zip(new_joysticks).enumerate() {
            same_len(EntityKind::Joystick, old.axes.len(), new.axes.len())?;
            for (axis, (a, b)) in old.axes.iter().zip(&new.axes).enumerate() {
                if a != b {
                    patches.push((
                        i,
                        Patch::JoystickAxis {
                            axis,
                            patch: AxisPatch::between(a, b),
                        },
                    ));
                }
            }
        }

        if let (Some(old), Some(new)) = (&current.selectors, &edited.selectors) {
            if old != new {
                patches.push((0, Patch::Selectors(SelectorPatch::between(old, new))));
            }
        }

        for (i, (old, new)) in current.bindings.iter().zip(&edited.bindings).enumerate() {
            if old != new {
                patches.push((i, Patch::Binding(BindingPatch::between(old, new))));
            }
        }

        Ok(patches)
    }

    /// The staged configuration in wire form, tagged with `schema_version`.
    ///
    /// # Errors
    /// Returns `SyncError::NotLoaded` before the first snapshot.
    pub fn to_payload(&self, schema_version: u32) -> Result<ConfigPayload> {
        let mut payload = self.staging.clone().ok_or(SyncError::NotLoaded)?;
        payload.schema_version = Some(schema_version);
        Ok(payload)
    }

    /// Treat the staged configuration as the device's configuration.
    pub fn commit(&mut self) {
        if let Some(staged) = &self.staging {
            self.committed = Some(staged.clone());
        }
    }

    /// Drop local edits, returning staging to the committed configuration.
    pub fn discard_staged(&mut self) {
        if self.has_staged_changes() {
            debug!("discarding staged edits");
        }
        self.staging.clone_from(&self.committed);
    }

    pub fn has_staged_changes(&self) -> bool {
        self.staging != self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_VERSION;

    fn snapshot() -> ConfigPayload {
        serde_json::from_str(
            r#"{
                "schemaVersion": 1,
                "buttons": [
                    {"name": "Cycle Start", "is_toggle": false, "radio_group_id": 0},
                    {"name": "Mode AUTO", "is_toggle": true, "radio_group_id": 1}
                ],
                "leds": [{"name": "Cycle Active", "binding_type": 2, "bound_button_index": -1, "lcnc_state_bit": 0}],
                "joysticks": [{"name": "Joystick 1", "axes": [
                    {"is_inverted": false, "sensitivity": 1.0, "center_deadzone": 50},
                    {"is_inverted": false, "sensitivity": 1.0, "center_deadzone": 50}
                ]}],
                "bindings": [{"is_active": true, "trigger": 0, "action": 0}]
            }"#,
        )
        .unwrap()
    }

    fn loaded() -> ConfigModel {
        let mut model = ConfigModel::new();
        model.load(snapshot());
        model
    }

    #[test]
    fn empty_until_first_snapshot() {
        let mut model = ConfigModel::new();
        assert!(!model.is_loaded());
        assert!(model.buttons().is_empty());
        assert_eq!(model.count(EntityKind::Led), 0);
        assert!(matches!(
            model.update(0, Patch::Button(ButtonPatch::default())),
            Err(SyncError::NotLoaded)
        ));
        assert!(matches!(model.to_payload(SCHEMA_VERSION), Err(SyncError::NotLoaded)));
    }

    #[test]
    fn update_returns_inverse() {
        let mut model = loaded();
        let inverse = model
            .update(
                1,
                Patch::Button(ButtonPatch {
                    name: Some("Mode MDI".into()),
                    radio_group_id: Some(2),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(model.buttons()[1].name, "Mode MDI");
        assert_eq!(model.buttons()[1].radio_group_id, 2);
        assert!(model.buttons()[1].is_toggle);
        assert!(model.has_staged_changes());

        model.update(1, inverse).unwrap();
        assert_eq!(model.buttons()[1].name, "Mode AUTO");
        assert!(!model.has_staged_changes());
    }

    #[test]
    fn update_joystick_axis() {
        let mut model = loaded();
        model
            .update(
                0,
                Patch::JoystickAxis {
                    axis: 1,
                    patch: AxisPatch {
                        is_inverted: Some(true),
                        ..Default::default()
                    },
                },
            )
            .unwrap();
        assert!(model.joysticks()[0].axes[1].is_inverted);
        assert!(!model.joysticks()[0].axes[0].is_inverted);

        let err = model
            .update(
                0,
                Patch::JoystickAxis {
                    axis: 3,
                    patch: AxisPatch::default(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::IndexOutOfRange { index: 3, len: 2, .. }));
    }

    #[test]
    fn out_of_range_and_missing_selectors() {
        let mut model = loaded();
        let err = model
            .update(5, Patch::Led(LedPatch::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::IndexOutOfRange {
                kind: EntityKind::Led,
                index: 5,
                len: 1
            }
        ));
        let err = model
            .update(0, Patch::Selectors(SelectorPatch::default()))
            .unwrap_err();
        assert!(matches!(err, SyncError::IndexOutOfRange { len: 0, .. }));
    }

    #[test]
    fn load_replaces_staged_edits() {
        let mut model = loaded();
        model
            .update(
                0,
                Patch::Binding(BindingPatch {
                    action: Some(1),
                    ..Default::default()
                }),
            )
            .unwrap();
        model.load(snapshot());
        assert_eq!(model.bindings()[0].action, 0);
        assert!(!model.has_staged_changes());
    }

    #[test]
    fn discard_and_commit() {
        let mut model = loaded();
        let rename = || {
            Patch::Led(LedPatch {
                name: Some("Running".into()),
                ..Default::default()
            })
        };
        model.update(0, rename()).unwrap();
        model.discard_staged();
        assert_eq!(model.leds()[0].name, "Cycle Active");

        model.update(0, rename()).unwrap();
        model.commit();
        assert!(!model.has_staged_changes());
        assert_eq!(model.committed().unwrap().leds[0].name, "Running");
    }

    #[test]
    fn payload_omits_transient_fields() {
        let model = loaded();
        let payload = serde_json::to_value(model.to_payload(SCHEMA_VERSION).unwrap()).unwrap();
        assert_eq!(payload["schemaVersion"], SCHEMA_VERSION);
        assert!(payload["joysticks"][0].get("name").is_none());
        assert_eq!(payload["joysticks"][0]["axes"].as_array().unwrap().len(), 2);
        assert!(payload.get("selectors").is_none());
    }

    #[test]
    fn payload_carries_the_requested_schema_version() {
        let model = loaded();
        assert_eq!(model.to_payload(2).unwrap().schema_version, Some(2));
        assert_ne!(model.staged().unwrap().schema_version, Some(2));
    }

    #[test]
    fn diff_produces_minimal_patches() {
        let model = loaded();
        let mut edited = snapshot();
        edited.buttons[0].is_toggle = true;
        edited.joysticks.as_mut().unwrap()[0].axes[1].center_deadzone = 30;
        edited.bindings[0].action = 2;

        let patches = model.diff(&edited).unwrap();
        assert_eq!(
            patches,
            vec![
                (
                    0,
                    Patch::Button(ButtonPatch {
                        is_toggle: Some(true),
                        ..Default::default()
                    })
                ),
                (
                    0,
                    Patch::JoystickAxis {
                        axis: 1,
                        patch: AxisPatch {
                            center_deadzone: Some(30),
                            ..Default::default()
                        }
                    }
                ),
                (
                    0,
                    Patch::Binding(BindingPatch {
                        action: Some(2),
                        ..Default::default()
                    })
                ),
            ]
        );
    }

    #[test]
    fn diff_rejects_resized_collections() {
        let model = loaded();
        let mut edited = snapshot();
        edited.buttons.pop();
        assert!(matches!(
            model.diff(&edited),
            Err(SyncError::ShapeMismatch {
                kind: EntityKind::Button,
                expected: 2,
                found: 1
            })
        ));
    }
}
