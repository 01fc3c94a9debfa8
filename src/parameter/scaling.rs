use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Parameter scaling for float parameters, applied to convert normalized UI or automation
/// values to the internal values.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub enum ParameterScaling {
    #[default]
    /// Linear scaling: `y = x` (no transformation applied)
    Linear,

    /// Exponential scaling: `y = x^factor`
    /// Factor must be > 0.0.
    ///
    /// Values > 1.0 spend more of the normalized range on small values.
    Exponential(f32),
}

impl ParameterScaling {
    /// Apply scaling to a normalized f32 value.
    pub fn scale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => value.powf(*factor),
        }
    }

    /// Apply inverse scaling to a normalized f32 value.
    pub fn unscale(&self, value: f32) -> f32 {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "Expecting a normalized value here"
        );
        match self {
            ParameterScaling::Linear => value,
            ParameterScaling::Exponential(factor) => {
                let factor = factor.abs().max(0.001);
                value.powf(1.0 / factor)
            }
        }
    }

    pub(crate) const fn validate(&self) {
        match self {
            ParameterScaling::Linear => {}
            ParameterScaling::Exponential(factor) => {
                assert!(
                    *factor > 0.0,
                    "Invalid exponential parameter scaling factor (must be > 0)"
                );
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_scaling() {
        let scaling = ParameterScaling::Exponential(2.0);
        assert_eq!(scaling.scale(0.0), 0.0);
        assert_eq!(scaling.scale(1.0), 1.0);
        assert!((scaling.scale(0.5) - 0.25).abs() < 1e-6);
        assert!((scaling.unscale(scaling.scale(0.3)) - 0.3).abs() < 1e-5);
    }

    #[test]
    fn linear_scaling() {
        let scaling = ParameterScaling::default();
        assert_eq!(scaling, ParameterScaling::Linear);
        assert_eq!(scaling.scale(0.42), 0.42);
        assert_eq!(scaling.unscale(0.42), 0.42);
    }
}
