use std::fmt::Debug;

use four_cc::FourCC;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// An enum parameter descriptor.
///
/// Values usually are strum `VariantNames` of the enum type the parameter selects, so
/// the plain value of the parameter is the variant's index in that list.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameter {
    id: FourCC,
    name: &'static str,
    values: &'static [&'static str],
    default_index: usize,
}

impl EnumParameter {
    pub const fn new(
        id: FourCC,
        name: &'static str,
        values: &'static [&'static str],
        default_index: usize,
    ) -> Self {
        assert!(!values.is_empty(), "Enum parameters need at least one value");
        assert!(
            default_index < values.len(),
            "Invalid parameter default value"
        );
        Self {
            id,
            name,
            values,
            default_index,
        }
    }

    /// Create a raw ParameterValueUpdate for this parameter from a string value.
    #[must_use]
    pub fn value_update<T: ToString>(&self, value: T) -> (FourCC, ParameterValueUpdate) {
        (
            self.id,
            ParameterValueUpdate::Raw(Box::new(value.to_string())),
        )
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn values(&self) -> &'static [&'static str] {
        self.values
    }

    pub const fn default_index(&self) -> usize {
        self.default_index
    }

    /// Index of the given string value, if it's part of the parameter's values.
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values
            .iter()
            .position(|v| v.eq_ignore_ascii_case(value.trim()))
    }

    pub fn normalize_index(&self, index: usize) -> f32 {
        if self.values.len() <= 1 {
            return 0.0;
        }
        index.min(self.values.len() - 1) as f32 / (self.values.len() - 1) as f32
    }

    pub fn denormalize_index(&self, normalized: f32) -> usize {
        debug_assert!((0.0..=1.0).contains(&normalized));
        (normalized.clamp(0.0, 1.0) * (self.values.len() - 1) as f32).round() as usize
    }
}

impl Parameter for EnumParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Enum {
            values: self.values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn default_value(&self) -> f32 {
        self.normalize_index(self.default_index)
    }

    fn value_to_string(&self, normalized: f32, _include_unit: bool) -> String {
        self.values[self.denormalize_index(normalized)].to_string()
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let index = self.index_of(&string)?;
        Some(self.normalize_index(index))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: EnumParameter =
        EnumParameter::new(FourCC(*b"TMOD"), "Mode", &["Slow", "Medium", "Fast"], 1);

    #[test]
    fn index_conversion() {
        assert_eq!(MODE.default_value(), 0.5);
        assert_eq!(MODE.denormalize_index(1.0), 2);
        assert_eq!(MODE.denormalize_index(0.2), 0);
        assert_eq!(MODE.index_of("fast"), Some(2));
        assert_eq!(MODE.index_of("Turbo"), None);
    }

    #[test]
    fn string_conversion() {
        assert_eq!(MODE.value_to_string(0.0, true), "Slow");
        assert_eq!(MODE.string_to_value("Fast".to_string()), Some(1.0));
        assert!(matches!(
            MODE.parameter_type(),
            ParameterType::Enum { values } if values.len() == 3
        ));
    }
}
