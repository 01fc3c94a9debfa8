//! Parameter descriptors and value updates.

use std::{any::Any, fmt::Debug};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Value kind of a [`Parameter`], e.g. to pick a slider, stepper, menu or toggle in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// Continuous value, such as grain position or duration.
    Float,
    /// Stepped value, such as the transpose amount in semitones.
    Integer,
    /// One of the given choices, such as the playing mode or key count.
    Enum { values: Vec<String> },
    /// On/off toggle, such as a flux mode flag.
    Boolean,
}

// -------------------------------------------------------------------------------------------------

/// Describes a single grain processor parameter for hosts, UIs or automation.
///
/// [`GrainProcessor::parameters`](crate::GrainProcessor::parameters) lists all descriptors.
/// Their ids address [`SharedParameters::set`](crate::SharedParameters::set) updates, and
/// hosts which only deal with normalized values can use the default and string conversions
/// to display and edit values, without knowing the concrete descriptor type.
pub trait Parameter: Debug + Send + Sync {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// The parameter type.
    fn parameter_type(&self) -> ParameterType;

    /// Default value of parameter, expressed as normalized floating point value in range \[0,1\].
    fn default_value(&self) -> f32;

    /// Convert the given normalized floating point value to a string value.
    fn value_to_string(&self, value: f32, include_unit: bool) -> String;

    /// Convert the given string value to a normalized floating point value.
    /// Returns `None` when conversion failed, else a valid normalized value.
    fn string_to_value(&self, string: String) -> Option<f32>;
}

// -------------------------------------------------------------------------------------------------

/// An update for a [`Parameter`]'s value. Sent via
/// [`GrainProcessorHandle::set_parameter`](crate::GrainProcessorHandle::set_parameter) and
/// seen by the audio thread with the next block's parameter snapshot.
#[derive(Debug)]
pub enum ParameterValueUpdate {
    /// Plain, type-erased value: `f32`/`f64` for floats, `i32`/`i64` for integers, `bool` for
    /// toggles, and for enums the enum value itself, its name or its index.
    Raw(Box<dyn Any + Send + Sync>),
    /// A float value in range `0.0..=1.0`.
    Normalized(f32),
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::FloatParameter;

mod integer;
pub use integer::IntegerParameter;

mod r#enum;
pub use r#enum::EnumParameter;

mod boolean;
pub use boolean::BooleanParameter;

mod scaling;
pub use scaling::ParameterScaling;

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::GrainProcessor;

    #[test]
    fn processor_descriptors() {
        let parameters = GrainProcessor::parameters();
        for parameter in &parameters {
            let default = parameter.default_value();
            assert!((0.0..=1.0).contains(&default), "{}", parameter.name());
            // defaults survive a round trip through their string representation
            let string = parameter.value_to_string(default, false);
            let value = parameter.string_to_value(string);
            assert!(value.is_some_and(|v| (v - default).abs() < 1e-3), "{}", parameter.name());
        }
        let play_mode = parameters
            .iter()
            .find(|p| p.id() == FourCC(*b"PMOD"))
            .map(|p| p.parameter_type());
        assert_eq!(
            play_mode,
            Some(ParameterType::Enum {
                values: vec!["Position".to_string(), "Pitch".to_string()]
            })
        );
    }
}
