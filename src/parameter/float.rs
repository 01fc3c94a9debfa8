use std::{fmt::Debug, ops::RangeInclusive};

use four_cc::FourCC;

use super::{Parameter, ParameterScaling, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    scaling: ParameterScaling,
    unit: &'static str,
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub const fn new(
        id: FourCC,
        name: &'static str,
        range: RangeInclusive<f32>,
        default: f32,
    ) -> Self {
        assert!(
            default >= *range.start() && default <= *range.end(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            range,
            default,
            scaling: ParameterScaling::Linear,
            unit: "",
        }
    }

    /// Optional unit for string displays.
    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional scaling, applied when converting from and to normalized values.
    pub const fn with_scaling(mut self, scaling: ParameterScaling) -> Self {
        scaling.validate();
        self.scaling = scaling;
        self
    }

    /// Create a raw ParameterValueUpdate for this parameter.
    #[must_use]
    pub fn value_update(&self, value: f32) -> (FourCC, ParameterValueUpdate) {
        (self.id, ParameterValueUpdate::Raw(Box::new(value)))
    }

    /// The parameter's identifier.
    pub const fn id(&self) -> FourCC {
        self.id
    }

    /// The parameter's name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parameter's value range.
    pub const fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub const fn default_value(&self) -> f32 {
        self.default
    }

    /// The parameter's normalized value scaling.
    pub const fn scaling(&self) -> &ParameterScaling {
        &self.scaling
    }

    /// Clamp the given plain value to the parameter's range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Normalize the given plain value to a 0.0-1.0 range.
    pub fn normalize_value(&self, value: f32) -> f32 {
        let (start, end) = (*self.range.start(), *self.range.end());
        let linear = ((self.clamp_value(value) - start) / (end - start)).clamp(0.0, 1.0);
        self.scaling.unscale(linear)
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding plain value.
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        debug_assert!((0.0..=1.0).contains(&normalized));
        let (start, end) = (*self.range.start(), *self.range.end());
        start + self.scaling.scale(normalized.clamp(0.0, 1.0)) * (end - start)
    }

    /// Convert the given plain value to a string.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{:.2} {}", value, self.unit)
        } else {
            format!("{:.2}", value)
        }
    }

    /// Convert the given string to a plain value.
    pub fn string_to_value(&self, string: &str) -> Option<f32> {
        let value = string
            .trim()
            .trim_end_matches(self.unit)
            .trim()
            .parse()
            .ok()?;
        Some(self.clamp_value(value))
    }
}

impl Parameter for FloatParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Float
    }

    fn default_value(&self) -> f32 {
        self.normalize_value(self.default)
    }

    fn value_to_string(&self, normalized: f32, include_unit: bool) -> String {
        let value = self.denormalize_value(normalized.clamp(0.0, 1.0));
        self.value_to_string(value, include_unit)
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let value = self.string_to_value(&string)?;
        Some(self.normalize_value(value))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION: FloatParameter =
        FloatParameter::new(FourCC(*b"TDUR"), "Duration", 0.0..=1.0, 0.25)
            .with_scaling(ParameterScaling::Exponential(2.0));

    #[test]
    fn normalization() {
        let gain = FloatParameter::new(FourCC(*b"TGAN"), "Gain", 0.0..=2.0, 1.0).with_unit("x");
        assert_eq!(gain.normalize_value(1.0), 0.5);
        assert_eq!(gain.denormalize_value(0.25), 0.5);
        assert_eq!(gain.clamp_value(3.0), 2.0);
        assert_eq!(Parameter::default_value(&gain), 0.5);

        assert!((DURATION.denormalize_value(0.5) - 0.25).abs() < 1e-6);
        assert!((Parameter::default_value(&DURATION) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn string_conversion() {
        let gain = FloatParameter::new(FourCC(*b"TGAN"), "Gain", 0.0..=2.0, 1.0).with_unit("x");
        assert_eq!(gain.value_to_string(1.5, true), "1.50 x");
        assert_eq!(gain.value_to_string(1.5, false), "1.50");
        assert_eq!(gain.string_to_value(" 1.25 x"), Some(1.25));
        assert_eq!(gain.string_to_value("5"), Some(2.0));
        assert_eq!(gain.string_to_value("loud"), None);
    }
}
