use super::{ActionType, ConfigPayload, EntityKind, LedBinding, TriggerType};
use std::fmt;

/// A single rule violation, located by entity kind, index and field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: EntityKind,
    pub index: usize,
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(kind: EntityKind, index: usize, field: impl Into<String>, message: String) -> Self {
        Self {
            kind,
            index,
            field: field.into(),
            message,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} {}: {}", self.kind, self.index, self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<FieldError>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn errors(&self) -> &[FieldError] {
        match self {
            Self::Valid => &[],
            Self::Invalid(errors) => errors,
        }
    }
}

/// Check a configuration before it is sent to the device.
///
/// Every violation is reported, in entity order. Cross-references such as an
/// LED's bound button index are only range-checked against -1; the device
/// resolves them when it applies the configuration.
pub fn validate(config: &ConfigPayload) -> ValidationResult {
    let mut errors = Vec::new();

    for (i, button) in config.buttons.iter().enumerate() {
        if button.radio_group_id < 0 {
            errors.push(FieldError::new(
                EntityKind::Button,
                i,
                "radio_group_id",
                format!("must be >= 0, got {}", button.radio_group_id),
            ));
        }
    }

    for (i, led) in config.leds.iter().enumerate() {
        if LedBinding::from_code(led.binding_type).is_none() {
            errors.push(FieldError::new(
                EntityKind::Led,
                i,
                "binding_type",
                format!("unknown binding type {}", led.binding_type),
            ));
        }
        if led.bound_button_index < -1 {
            errors.push(FieldError::new(
                EntityKind::Led,
                i,
                "bound_button_index",
                format!("must be >= -1, got {}", led.bound_button_index),
            ));
        }
        if led.lcnc_state_bit < -1 {
            errors.push(FieldError::new(
                EntityKind::Led,
                i,
                "lcnc_state_bit",
                format!("must be >= -1, got {}", led.lcnc_state_bit),
            ));
        }
    }

    for (i, joystick) in config.joysticks.iter().flatten().enumerate() {
        for (a, axis) in joystick.axes.iter().enumerate() {
            if !axis.sensitivity.is_finite() {
                errors.push(FieldError::new(
                    EntityKind::Joystick,
                    i,
                    format!("axes[{a}].sensitivity"),
                    "must be a finite number".to_string(),
                ));
            }
            if axis.center_deadzone < 0 {
                errors.push(FieldError::new(
                    EntityKind::Joystick,
                    i,
                    format!("axes[{a}].center_deadzone"),
                    format!("must be >= 0, got {}", axis.center_deadzone),
                ));
            }
        }
    }

    if let Some(selectors) = &config.selectors {
        if !(1..=6).contains(&selectors.num_dro_axes) {
            errors.push(FieldError::new(
                EntityKind::Selectors,
                0,
                "num_dro_axes",
                format!("must be 1-6, got {}", selectors.num_dro_axes),
            ));
        }
    }

    for (i, binding) in config.bindings.iter().enumerate() {
        if TriggerType::from_code(binding.trigger).is_none() {
            errors.push(FieldError::new(
                EntityKind::Binding,
                i,
                "trigger",
                format!("unknown trigger code {}", binding.trigger),
            ));
        }
        if ActionType::from_code(binding.action).is_none() {
            errors.push(FieldError::new(
                EntityKind::Binding,
                i,
                "action",
                format!("unknown action code {}", binding.action),
            ));
        }
    }

    if errors.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid(errors)
    }
}
