use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use atomic_float::AtomicF32;
use four_cc::FourCC;
use strum::VariantNames;

use crate::{
    generator::granular::{EnvelopeShape, KeyCount, PlayMode},
    parameter::{
        BooleanParameter, EnumParameter, FloatParameter, IntegerParameter, Parameter,
        ParameterScaling, ParameterValueUpdate,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Grain processor parameter values, as seen by the audio thread at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub play_mode: PlayMode,
    pub key_count_index: usize,
    pub flux_flags: [f32; 4],
    pub flux_range: f32,
    pub position: f32,
    pub duration: f32,
    pub spread: f32,
    pub gain: f32,
    pub transpose: i32,
}

// -------------------------------------------------------------------------------------------------

/// Lock-free grain processor parameter store.
///
/// Any thread may set values, the audio thread reads all of them once per block via
/// [`SharedParameters::snapshot`]. The latest written value wins. The envelope shape is not
/// part of snapshots: it directly writes into the shared [`EnvelopeShape`] voices read.
#[derive(Debug)]
pub struct SharedParameters {
    play_mode: AtomicUsize,
    key_count: AtomicUsize,
    flux_flags: [AtomicBool; 4],
    flux_range: AtomicF32,
    position: AtomicF32,
    duration: AtomicF32,
    spread: AtomicF32,
    gain: AtomicF32,
    transpose: AtomicI32,
    envelope_shape: EnvelopeShape,
}

impl SharedParameters {
    pub const PLAY_MODE: EnumParameter = EnumParameter::new(
        FourCC(*b"PMOD"),
        "Playing Mode",
        PlayMode::VARIANTS,
        PlayMode::Pitch as usize,
    );
    pub const KEY_COUNT: EnumParameter = EnumParameter::new(
        FourCC(*b"NKEY"),
        "Keys Available",
        KeyCount::VARIANTS,
        KeyCount::Keys12 as usize,
    );

    pub const FLUX_FORWARD: BooleanParameter =
        BooleanParameter::new(FourCC(*b"FLX1"), "Flux Forward", false);
    pub const FLUX_BACKWARD: BooleanParameter =
        BooleanParameter::new(FourCC(*b"FLX2"), "Flux Backward", false);
    pub const FLUX_ZIGZAG: BooleanParameter =
        BooleanParameter::new(FourCC(*b"FLX3"), "Flux ZigZag", false);
    pub const FLUX_RANDOM: BooleanParameter =
        BooleanParameter::new(FourCC(*b"FLX4"), "Flux Random", false);
    pub const FLUX_RANGE: FloatParameter =
        FloatParameter::new(FourCC(*b"FRNG"), "Flux Range", 0.0..=1.0, 1.0);

    pub const POSITION: FloatParameter =
        FloatParameter::new(FourCC(*b"GPOS"), "Position", 0.0..=1.0, 0.25);
    pub const DURATION: FloatParameter =
        FloatParameter::new(FourCC(*b"GDUR"), "Duration", 0.0..=1.0, 0.15)
            .with_scaling(ParameterScaling::Exponential(2.5));
    pub const SPREAD: FloatParameter =
        FloatParameter::new(FourCC(*b"GSPR"), "Spread", 0.0..=1.0, 1.0)
            .with_scaling(ParameterScaling::Exponential(2.5));
    pub const GAIN: FloatParameter = FloatParameter::new(FourCC(*b"GAIN"), "Gain", 0.0..=1.0, 0.7);
    pub const ENVELOPE_SHAPE: FloatParameter =
        FloatParameter::new(FourCC(*b"ESHP"), "Shape", 0.0..=1.0, 0.0);
    pub const TRANSPOSE: IntegerParameter =
        IntegerParameter::new(FourCC(*b"TRNS"), "Transpose", -24..=24, 0).with_unit("st");

    const FLUX_FLAGS: [BooleanParameter; 4] = [
        Self::FLUX_FORWARD,
        Self::FLUX_BACKWARD,
        Self::FLUX_ZIGZAG,
        Self::FLUX_RANDOM,
    ];

    /// Create a new parameter store with default values which writes envelope shape
    /// changes into the given shared shape.
    pub fn new(envelope_shape: EnvelopeShape) -> Self {
        envelope_shape.set(Self::ENVELOPE_SHAPE.default_value());
        Self {
            play_mode: AtomicUsize::new(Self::PLAY_MODE.default_index()),
            key_count: AtomicUsize::new(Self::KEY_COUNT.default_index()),
            flux_flags: Self::FLUX_FLAGS.map(|flag| AtomicBool::new(flag.default_value())),
            flux_range: AtomicF32::new(Self::FLUX_RANGE.default_value()),
            position: AtomicF32::new(Self::POSITION.default_value()),
            duration: AtomicF32::new(Self::DURATION.default_value()),
            spread: AtomicF32::new(Self::SPREAD.default_value()),
            gain: AtomicF32::new(Self::GAIN.default_value()),
            transpose: AtomicI32::new(Self::TRANSPOSE.default_value()),
            envelope_shape,
        }
    }

    /// All parameter descriptors.
    pub fn descriptors() -> Vec<Box<dyn Parameter>> {
        vec![
            Box::new(Self::PLAY_MODE),
            Box::new(Self::KEY_COUNT),
            Box::new(Self::FLUX_FORWARD),
            Box::new(Self::FLUX_BACKWARD),
            Box::new(Self::FLUX_ZIGZAG),
            Box::new(Self::FLUX_RANDOM),
            Box::new(Self::FLUX_RANGE),
            Box::new(Self::POSITION),
            Box::new(Self::DURATION),
            Box::new(Self::SPREAD),
            Box::new(Self::GAIN),
            Box::new(Self::ENVELOPE_SHAPE),
            Box::new(Self::TRANSPOSE),
        ]
    }

    /// The shared envelope shape which the `ENVELOPE_SHAPE` parameter writes into.
    pub fn envelope_shape(&self) -> &EnvelopeShape {
        &self.envelope_shape
    }

    /// Apply a parameter value update. Out of range values get clamped.
    pub fn set(&self, id: FourCC, update: &ParameterValueUpdate) -> Result<(), Error> {
        match id {
            _ if id == Self::PLAY_MODE.id() => {
                let index = enum_update_index::<PlayMode>(update, &Self::PLAY_MODE)?;
                self.play_mode.store(index, Ordering::Relaxed);
            }
            _ if id == Self::KEY_COUNT.id() => {
                let index = enum_update_index::<KeyCount>(update, &Self::KEY_COUNT)?;
                self.key_count.store(index, Ordering::Relaxed);
            }
            _ if id == Self::FLUX_RANGE.id() => {
                let value = float_update_value(update, &Self::FLUX_RANGE)?;
                self.flux_range.store(value, Ordering::Relaxed);
            }
            _ if id == Self::POSITION.id() => {
                let value = float_update_value(update, &Self::POSITION)?;
                self.position.store(value, Ordering::Relaxed);
            }
            _ if id == Self::DURATION.id() => {
                let value = float_update_value(update, &Self::DURATION)?;
                self.duration.store(value, Ordering::Relaxed);
            }
            _ if id == Self::SPREAD.id() => {
                let value = float_update_value(update, &Self::SPREAD)?;
                self.spread.store(value, Ordering::Relaxed);
            }
            _ if id == Self::GAIN.id() => {
                let value = float_update_value(update, &Self::GAIN)?;
                self.gain.store(value, Ordering::Relaxed);
            }
            _ if id == Self::ENVELOPE_SHAPE.id() => {
                let value = float_update_value(update, &Self::ENVELOPE_SHAPE)?;
                self.envelope_shape.set(value);
            }
            _ if id == Self::TRANSPOSE.id() => {
                let value = integer_update_value(update, &Self::TRANSPOSE)?;
                self.transpose.store(value, Ordering::Relaxed);
            }
            _ => {
                let Some(index) = Self::FLUX_FLAGS.iter().position(|flag| flag.id() == id)
                else {
                    return Err(Error::ParameterError(format!(
                        "Invalid/unknown grain parameter '{id}'"
                    )));
                };
                let value = boolean_update_value(update, &Self::FLUX_FLAGS[index])?;
                self.flux_flags[index].store(value, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Read all current values. Real-time safe.
    pub fn snapshot(&self) -> ParameterSnapshot {
        let flux_flags = [0, 1, 2, 3].map(|index| {
            if self.flux_flags[index].load(Ordering::Relaxed) {
                1.0
            } else {
                0.0
            }
        });
        let play_mode = PlayMode::from_repr(self.play_mode.load(Ordering::Relaxed) as u8)
            .unwrap_or_default();
        ParameterSnapshot {
            play_mode,
            key_count_index: self.key_count.load(Ordering::Relaxed),
            flux_flags,
            flux_range: self.flux_range.load(Ordering::Relaxed),
            position: self.position.load(Ordering::Relaxed),
            duration: self.duration.load(Ordering::Relaxed),
            spread: self.spread.load(Ordering::Relaxed),
            gain: self.gain.load(Ordering::Relaxed),
            transpose: self.transpose.load(Ordering::Relaxed),
        }
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new(EnvelopeShape::default())
    }
}

// -------------------------------------------------------------------------------------------------

fn float_update_value(
    update: &ParameterValueUpdate,
    descriptor: &FloatParameter,
) -> Result<f32, Error> {
    match update {
        ParameterValueUpdate::Normalized(norm) => {
            Ok(descriptor.denormalize_value(norm.clamp(0.0, 1.0)))
        }
        ParameterValueUpdate::Raw(raw) => {
            if let Some(v) = raw.downcast_ref::<f32>() {
                Ok(descriptor.clamp_value(*v))
            } else if let Some(v) = raw.downcast_ref::<f64>() {
                Ok(descriptor.clamp_value(*v as f32))
            } else {
                Err(Error::ParameterError(format!(
                    "Unsupported payload type for grain parameter '{}'",
                    descriptor.name()
                )))
            }
        }
    }
}

fn integer_update_value(
    update: &ParameterValueUpdate,
    descriptor: &IntegerParameter,
) -> Result<i32, Error> {
    match update {
        ParameterValueUpdate::Normalized(norm) => {
            Ok(descriptor.denormalize_value(norm.clamp(0.0, 1.0)))
        }
        ParameterValueUpdate::Raw(raw) => {
            if let Some(v) = raw.downcast_ref::<i32>() {
                Ok(descriptor.clamp_value(*v))
            } else if let Some(v) = raw.downcast_ref::<i64>() {
                Ok(descriptor.clamp_value((*v).clamp(i32::MIN as i64, i32::MAX as i64) as i32))
            } else {
                Err(Error::ParameterError(format!(
                    "Unsupported payload type for grain parameter '{}'",
                    descriptor.name()
                )))
            }
        }
    }
}

fn boolean_update_value(
    update: &ParameterValueUpdate,
    descriptor: &BooleanParameter,
) -> Result<bool, Error> {
    match update {
        ParameterValueUpdate::Normalized(norm) => {
            Ok(descriptor.denormalize_value(norm.clamp(0.0, 1.0)))
        }
        ParameterValueUpdate::Raw(raw) => raw.downcast_ref::<bool>().copied().ok_or_else(|| {
            Error::ParameterError(format!(
                "Unsupported payload type for grain parameter '{}'",
                descriptor.name()
            ))
        }),
    }
}

/// Resolve an enum parameter update to a value index. Raw updates may be the enum value itself,
/// its string representation or a value index.
fn enum_update_index<T: ToString + 'static>(
    update: &ParameterValueUpdate,
    descriptor: &EnumParameter,
) -> Result<usize, Error> {
    match update {
        ParameterValueUpdate::Normalized(norm) => {
            Ok(descriptor.denormalize_index(norm.clamp(0.0, 1.0)))
        }
        ParameterValueUpdate::Raw(raw) => {
            let index = if let Some(value) = raw.downcast_ref::<T>() {
                descriptor.index_of(&value.to_string())
            } else if let Some(value) = raw.downcast_ref::<String>() {
                descriptor.index_of(value)
            } else if let Some(value) = raw.downcast_ref::<&'static str>() {
                descriptor.index_of(value)
            } else if let Some(index) = raw.downcast_ref::<usize>() {
                Some(*index).filter(|index| *index < descriptor.values().len())
            } else {
                return Err(Error::ParameterError(format!(
                    "Unsupported payload type for grain parameter '{}'",
                    descriptor.name()
                )));
            };
            index.ok_or_else(|| {
                Error::ParameterError(format!(
                    "Invalid value for enum parameter '{}'",
                    descriptor.name()
                ))
            })
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let parameters = SharedParameters::default();
        let snapshot = parameters.snapshot();
        assert_eq!(snapshot.play_mode, PlayMode::Pitch);
        assert_eq!(snapshot.key_count_index, 0);
        assert_eq!(snapshot.flux_flags, [0.0; 4]);
        assert_eq!(snapshot.flux_range, 1.0);
        assert_eq!(snapshot.position, 0.25);
        assert_eq!(snapshot.duration, 0.15);
        assert_eq!(snapshot.spread, 1.0);
        assert_eq!(snapshot.gain, 0.7);
        assert_eq!(snapshot.transpose, 0);
        assert_eq!(parameters.envelope_shape().get(), 0.0);
        assert_eq!(SharedParameters::descriptors().len(), 13);
    }

    #[test]
    fn raw_updates() -> Result<(), Error> {
        let parameters = SharedParameters::default();
        parameters.set(
            SharedParameters::PLAY_MODE.id(),
            &ParameterValueUpdate::Raw(Box::new(PlayMode::Position)),
        )?;
        let (id, update) = SharedParameters::KEY_COUNT.value_update(KeyCount::Keys48);
        parameters.set(id, &update)?;
        let (id, update) = SharedParameters::POSITION.value_update(1.5);
        parameters.set(id, &update)?;
        let (id, update) = SharedParameters::TRANSPOSE.value_update(-7);
        parameters.set(id, &update)?;
        let (id, update) = SharedParameters::FLUX_ZIGZAG.value_update(true);
        parameters.set(id, &update)?;
        let (id, update) = SharedParameters::ENVELOPE_SHAPE.value_update(0.5);
        parameters.set(id, &update)?;

        let snapshot = parameters.snapshot();
        assert_eq!(snapshot.play_mode, PlayMode::Position);
        assert_eq!(snapshot.key_count_index, 2);
        assert_eq!(snapshot.position, 1.0);
        assert_eq!(snapshot.transpose, -7);
        assert_eq!(snapshot.flux_flags, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(parameters.envelope_shape().get(), 0.5);
        Ok(())
    }

    #[test]
    fn normalized_updates() -> Result<(), Error> {
        let parameters = SharedParameters::default();
        parameters.set(
            SharedParameters::DURATION.id(),
            &ParameterValueUpdate::Normalized(0.5),
        )?;
        parameters.set(
            SharedParameters::KEY_COUNT.id(),
            &ParameterValueUpdate::Normalized(1.0),
        )?;
        parameters.set(
            SharedParameters::FLUX_RANDOM.id(),
            &ParameterValueUpdate::Normalized(1.0),
        )?;
        let snapshot = parameters.snapshot();
        assert!((snapshot.duration - 0.5_f32.powf(2.5)).abs() < 1e-6);
        assert_eq!(snapshot.key_count_index, 3);
        assert_eq!(snapshot.flux_flags, [0.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn invalid_updates() {
        let parameters = SharedParameters::default();
        assert!(parameters
            .set(FourCC(*b"NOPE"), &ParameterValueUpdate::Normalized(0.0))
            .is_err());
        assert!(parameters
            .set(
                SharedParameters::GAIN.id(),
                &ParameterValueUpdate::Raw(Box::new("loud"))
            )
            .is_err());
        assert!(parameters
            .set(
                SharedParameters::PLAY_MODE.id(),
                &ParameterValueUpdate::Raw(Box::new("Sideways".to_string()))
            )
            .is_err());
        assert_eq!(parameters.snapshot().gain, 0.7);
    }
}
