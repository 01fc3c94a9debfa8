//! Wavetable based grain amplitude envelope.

use std::sync::{atomic::Ordering, Arc};

use assume::assume;
use atomic_float::AtomicF32;

// -------------------------------------------------------------------------------------------------

/// Shared, lock-free envelope shape value in range `0.0..=1.0`.
///
/// A single writer (usually the parameter layer) sets the shape, all grain voices and envelope
/// displays read it. Clones refer to the same value.
#[derive(Debug, Clone)]
pub struct EnvelopeShape(Arc<AtomicF32>);

impl EnvelopeShape {
    pub fn new(shape: f32) -> Self {
        Self(Arc::new(AtomicF32::new(Self::sanitize(shape))))
    }

    /// Current shape value.
    #[inline]
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Set a new shape. Values get clamped into range `0.0..=1.0`.
    pub fn set(&self, shape: f32) {
        self.0.store(Self::sanitize(shape), Ordering::Relaxed);
    }

    fn sanitize(shape: f32) -> f32 {
        if shape.is_nan() {
            0.0
        } else {
            shape.clamp(0.0, 1.0)
        }
    }
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// -------------------------------------------------------------------------------------------------

const ENVELOPE_TABLE_SIZE: usize = 2048;

/// Grain amplitude envelope, precomputed into a lookup table and played back with linear
/// interpolation at a given frequency.
///
/// The table follows a gaussian curve whose tails get steeper with higher shape values:
/// `exp(-x^2)^k` with `x` in range `-2..2` and `k = 4 * shape + 0.5`.
///
/// The table has one extra entry which mirrors the first one, so interpolation never needs to
/// wrap the index. Regenerating the table does not allocate.
#[derive(Clone)]
pub struct WavetableEnvelope {
    table: Box<[f32; ENVELOPE_TABLE_SIZE + 1]>,
    shape: f32,
    phase: f32,
    delta: f32,
}

impl WavetableEnvelope {
    /// Number of envelope values in one envelope cycle.
    pub const TABLE_SIZE: usize = ENVELOPE_TABLE_SIZE;

    const _VERIFY_TABLE_SIZE: () = assert!(
        Self::TABLE_SIZE.is_power_of_two(),
        "Envelope table size must be a pow2 value"
    );

    /// Create a new envelope with the given shape value and zero frequency.
    pub fn new(shape: f32) -> Self {
        let mut envelope = Self {
            table: Box::new([0.0; Self::TABLE_SIZE + 1]),
            shape: f32::NAN,
            phase: 0.0,
            delta: 0.0,
        };
        envelope.configure(shape);
        envelope
    }

    /// The currently applied shape value.
    pub fn shape(&self) -> f32 {
        self.shape
    }

    /// Access to the envelope table, e.g. for visualization. Includes the wraparound entry.
    pub fn table(&self) -> &[f32] {
        self.table.as_slice()
    }

    /// Regenerate the envelope table for the given shape value in range `0.0..=1.0`.
    pub fn configure(&mut self, shape: f32) {
        let shape = if shape.is_nan() {
            0.0
        } else {
            shape.clamp(0.0, 1.0)
        };
        let k = shape * 4.0 + 0.5;
        let center = (Self::TABLE_SIZE / 2) as f32;
        let width = (Self::TABLE_SIZE / 4) as f32;
        for (index, value) in self.table[..Self::TABLE_SIZE].iter_mut().enumerate() {
            let x = (index as f32 - center) / width;
            *value = (-x * x).exp().powf(k).clamp(0.0, 1.0);
        }
        self.table[Self::TABLE_SIZE] = self.table[0];
        self.shape = shape;
    }

    /// Regenerate the table when the given shared shape differs from the applied one.
    /// Returns true when the table got regenerated.
    pub fn update_shape(&mut self, shape: &EnvelopeShape) -> bool {
        let shape = shape.get();
        if shape != self.shape {
            self.configure(shape);
            true
        } else {
            false
        }
    }

    /// Set the number of envelope cycles per second. A frequency of zero holds the envelope
    /// at its current phase.
    pub fn set_frequency(&mut self, frequency: f32, sample_rate: u32) {
        let delta = if sample_rate > 0 {
            frequency * Self::TABLE_SIZE as f32 / sample_rate as f32
        } else {
            0.0
        };
        self.delta = if delta.is_finite() && delta > 0.0 {
            delta
        } else {
            0.0
        };
    }

    /// Table index increment per sample.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Current table read position in range `0..TABLE_SIZE`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Restart the envelope at its first table entry.
    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    /// Interpolated envelope value at the current phase, then advance the phase.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let index = (self.phase as usize).min(Self::TABLE_SIZE - 1);
        let fraction = self.phase - index as f32;

        assume!(unsafe: index + 1 < self.table.len(), "Index is clamped to the table size");
        let value0 = self.table[index];
        let value1 = self.table[index + 1];

        self.phase += self.delta;
        if self.phase >= Self::TABLE_SIZE as f32 {
            self.phase -= Self::TABLE_SIZE as f32;
            if self.phase >= Self::TABLE_SIZE as f32 {
                self.phase %= Self::TABLE_SIZE as f32;
            }
        }

        value0 + (value1 - value0) * fraction
    }
}

impl std::fmt::Debug for WavetableEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavetableEnvelope")
            .field("shape", &self.shape)
            .field("phase", &self.phase)
            .field("delta", &self.delta)
            .finish()
    }
}

impl Default for WavetableEnvelope {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = WavetableEnvelope::TABLE_SIZE;

    #[test]
    fn table_is_bounded() {
        for shape in [0.0, 0.1, 0.5, 0.9, 1.0] {
            let envelope = WavetableEnvelope::new(shape);
            let table = envelope.table();
            assert_eq!(table.len(), SIZE + 1);
            assert!(table.iter().all(|v| (0.0..=1.0).contains(v)));
            assert_eq!(table[0], table[SIZE]);
            assert!((table[SIZE / 2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn shape_steepens_tails() {
        let soft = WavetableEnvelope::new(0.0);
        let steep = WavetableEnvelope::new(1.0);
        assert!(steep.table()[SIZE / 8] < soft.table()[SIZE / 8]);
        assert!(steep.table()[0] < 1e-6);
    }

    #[test]
    fn frequency_and_wraparound() {
        let mut envelope = WavetableEnvelope::new(0.5);
        // one table entry per sample
        envelope.set_frequency(1000.0 / SIZE as f32, 1000);
        assert!((envelope.delta() - 1.0).abs() < 1e-6);
        let expected = envelope.table().to_vec();
        for value in expected.iter().take(SIZE) {
            assert!((envelope.next_sample() - value).abs() < 1e-6);
        }
        // wrapped around to the start
        assert!(envelope.phase() < 1e-3);
        assert!((envelope.next_sample() - expected[0]).abs() < 1e-6);

        // increments larger than the table size still stay in range
        envelope.set_frequency(3.5 * 1000.0, 1000);
        for _ in 0..100 {
            let value = envelope.next_sample();
            assert!((0.0..=1.0).contains(&value));
            assert!(envelope.phase() < SIZE as f32);
        }
    }

    #[test]
    fn zero_frequency_holds_start_value() {
        let mut envelope = WavetableEnvelope::new(0.3);
        envelope.set_frequency(0.0, 44100);
        let start = envelope.table()[0];
        for _ in 0..64 {
            assert_eq!(envelope.next_sample(), start);
        }
        envelope.set_frequency(f32::NAN, 44100);
        assert_eq!(envelope.delta(), 0.0);
    }

    #[test]
    fn shared_shape_updates() {
        let shape = EnvelopeShape::new(0.25);
        let mut envelope = WavetableEnvelope::new(0.25);
        assert!(!envelope.update_shape(&shape));
        shape.set(2.0);
        assert_eq!(shape.get(), 1.0);
        assert!(envelope.update_shape(&shape));
        assert_eq!(envelope.shape(), 1.0);
        assert!(!envelope.update_shape(&shape.clone()));
    }
}
