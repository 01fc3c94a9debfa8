use std::ops::RangeInclusive;

use four_cc::FourCC;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A discrete (integer) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<i32>,
    default: i32,
    unit: &'static str,
}

impl IntegerParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<i32>,
        default: i32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        assert!(*range.start() < *range.end(), "Invalid parameter range");
        Self {
            id,
            name,
            range,
            default,
            unit: "",
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Create a raw ParameterValueUpdate for this parameter.
    #[must_use]
    pub fn value_update(&self, value: i32) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Box::new(value)))
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn range(&self) -> &RangeInclusive<i32> {
        &self.range
    }

    pub const fn default_value(&self) -> i32 {
        self.default
    }

    pub fn clamp_value(&self, value: i32) -> i32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    pub fn normalize_value(&self, value: i32) -> f32 {
        (self.clamp_value(value) as f32 - *self.range.start() as f32)
            / (*self.range.end() as f32 - *self.range.start() as f32)
    }

    pub fn denormalize_value(&self, normalized: f32) -> i32 {
        debug_assert!((0.0..=1.0).contains(&normalized));
        let value = *self.range.start() as f32
            + normalized.clamp(0.0, 1.0)
                * (*self.range.end() as f32 - *self.range.start() as f32);
        value.round() as i32
    }
}

impl Parameter for IntegerParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Integer
    }

    fn default_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn value_to_string(&self, normalized: f32, include_unit: bool) -> String {
        let value = self.denormalize_value(normalized.clamp(0.0, 1.0));
        if include_unit && !self.unit.is_empty() {
            format!("{} {}", value, self.unit)
        } else {
            value.to_string()
        }
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let value = string
            .trim()
            .trim_end_matches(self.unit)
            .trim()
            .parse::<i32>()
            .ok()?;
        Some(self.normalize_value(value))
    }
}

// -------------------------------------------------------------------------------------------------
