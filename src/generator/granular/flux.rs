//! Flux sequencing: moves grain start positions across a quantized set of key slots.

use rand::Rng;

// -------------------------------------------------------------------------------------------------

/// How grain start positions move from grain to grain.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum FluxMode {
    /// Every grain restarts at its base slot.
    #[default]
    None,
    /// Walk upwards through the slots.
    Forward,
    /// Walk downwards through the slots.
    Backward,
    /// Alternate around the base slot with growing distance: 0, 1, -1, 2, -2, ...
    ZigZag,
    /// Pick a random slot for every grain.
    Random,
}

impl FluxMode {
    /// Resolve the flux mode from the forward, backward, zigzag and random toggles.
    /// When more than one toggle is active, the last active one wins.
    pub fn from_flags(flags: [f32; 4]) -> Self {
        flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag > 0.0)
            .last()
            .and_then(|(index, _)| Self::from_repr(index as u8 + 1))
            .unwrap_or(Self::None)
    }
}

// -------------------------------------------------------------------------------------------------

/// Direction of the next zigzag step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FluxDirection {
    #[default]
    Up,
    Down,
}

// -------------------------------------------------------------------------------------------------

/// Flux sequencer state. Transitions are pure, apart from the random mode's RNG.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FluxState {
    offset: u32,
    direction: FluxDirection,
}

impl FluxState {
    /// Number of slots a flux sequence moves across: the given fraction of the available keys,
    /// but at least one.
    pub fn key_range(num_keys: i32, flux_range: f32) -> u32 {
        let range = (num_keys.max(0) as f32 * flux_range.clamp(0.0, 1.0)).floor();
        (range as u32).max(1)
    }

    /// Signed slot offset of the current state.
    pub fn offset(&self) -> i32 {
        match self.direction {
            FluxDirection::Up => self.offset as i32,
            FluxDirection::Down => -(self.offset as i32),
        }
    }

    pub fn direction(&self) -> FluxDirection {
        self.direction
    }

    /// Advance the sequencer within the given key range.
    #[must_use]
    pub fn next<R: Rng>(self, mode: FluxMode, key_range: u32, rng: &mut R) -> Self {
        let key_range = key_range.max(1);
        match mode {
            FluxMode::None => Self::default(),
            FluxMode::Forward | FluxMode::Backward => Self {
                offset: (self.offset + 1) % key_range,
                direction: FluxDirection::Up,
            },
            FluxMode::ZigZag => {
                if self.offset() <= 0 {
                    Self {
                        offset: (self.offset + 1) % key_range.div_ceil(2),
                        direction: FluxDirection::Up,
                    }
                } else {
                    Self {
                        offset: self.offset,
                        direction: FluxDirection::Down,
                    }
                }
            }
            FluxMode::Random => Self {
                offset: rng.random_range(0..key_range),
                direction: FluxDirection::Up,
            },
        }
    }
}

// -------------------------------------------------------------------------------------------------
