//! Planar audio buffers and buffer helpers.

// -------------------------------------------------------------------------------------------------

/// A planar (de-interleaved) f32 audio buffer with a fixed channel layout.
///
/// Buffers get allocated once and then are reused: all methods, except `new` and `resize`,
/// are real-time safe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frame_count: usize,
}

impl AudioBuffer {
    /// Create a new, silent buffer with the given layout.
    pub fn new(channel_count: usize, frame_count: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frame_count]; channel_count],
            frame_count,
        }
    }

    /// Create a buffer from the given planar channel data.
    /// All channels must have the same length.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let frame_count = channels.first().map_or(0, Vec::len);
        debug_assert!(
            channels.iter().all(|c| c.len() == frame_count),
            "All channels must have the same length"
        );
        Self {
            channels,
            frame_count,
        }
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Access all planar channels at once.
    #[inline]
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mutable access to the first two channels, e.g. for stereo rendering.
    /// Returns `None` for mono buffers.
    pub fn stereo_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        match self.channels.as_mut_slice() {
            [left, right, ..] => Some((left.as_mut_slice(), right.as_mut_slice())),
            _ => None,
        }
    }

    /// Resize all channels to the given frame count. Not real-time safe when growing.
    pub fn resize(&mut self, frame_count: usize) {
        for channel in &mut self.channels {
            channel.resize(frame_count, 0.0);
        }
        self.frame_count = frame_count;
    }

    /// Fill the whole buffer with silence.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            clear_buffer(channel);
        }
    }

    /// Fill the given frame range with silence.
    pub fn clear_range(&mut self, start: usize, len: usize) {
        let end = (start + len).min(self.frame_count);
        for channel in &mut self.channels {
            clear_buffer(&mut channel[start.min(end)..end]);
        }
    }

    /// Multiply the given frame range with a constant gain.
    pub fn apply_gain(&mut self, start: usize, len: usize, gain: f32) {
        if gain == 1.0 {
            return;
        }
        let end = (start + len).min(self.frame_count);
        for channel in &mut self.channels {
            scale_buffer(&mut channel[start.min(end)..end], gain);
        }
    }

    /// Multiply the given frame range with a gain which linearly ramps from `start_gain`
    /// to `end_gain`.
    pub fn apply_gain_ramp(&mut self, start: usize, len: usize, start_gain: f32, end_gain: f32) {
        if start_gain == end_gain {
            self.apply_gain(start, len, start_gain);
            return;
        }
        let end = (start + len).min(self.frame_count);
        let start = start.min(end);
        if end == start {
            return;
        }
        let step = (end_gain - start_gain) / (end - start) as f32;
        for channel in &mut self.channels {
            let mut gain = start_gain;
            for sample in &mut channel[start..end] {
                *sample *= gain;
                gain += step;
            }
        }
    }

    /// Copy the buffer into an interleaved output slice.
    pub fn copy_to_interleaved(&self, interleaved: &mut [f32]) {
        planar_to_interleaved(&self.channels, interleaved);
    }
}

// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with silence.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Multiply all samples in the given buffer with a constant factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], scale: f32) {
    for sample in buffer.iter_mut() {
        *sample *= scale;
    }
}

// -------------------------------------------------------------------------------------------------

/// Copy the given planar buffer into an interleaved one.
/// The planar buffer's layout defines layout of the interleaved buffer (channel and frame count).
pub fn planar_to_interleaved(planar: &[Vec<f32>], interleaved: &mut [f32]) {
    let channel_count = planar.len();
    match channel_count {
        0 => {}
        1 => {
            for (i, p) in interleaved.iter_mut().zip(planar[0].iter()) {
                *i = *p;
            }
        }
        2 => {
            for ((l, r), frame) in planar[0]
                .iter()
                .zip(planar[1].iter())
                .zip(interleaved.chunks_exact_mut(2))
            {
                frame[0] = *l;
                frame[1] = *r;
            }
        }
        _ => {
            for (channel_index, channel_values) in planar.iter().enumerate() {
                for (frame, value) in interleaved
                    .chunks_exact_mut(channel_count)
                    .zip(channel_values.iter())
                {
                    frame[channel_index] = *value;
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_interleaved() {
        // mono
        let planar_mono = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let mut interleaved_mono = vec![0.0; 4];
        planar_to_interleaved(&planar_mono, &mut interleaved_mono);
        assert_eq!(interleaved_mono, vec![1.0, 2.0, 3.0, 4.0]);

        // stereo
        let planar_stereo = vec![vec![1.0, 2.0, 3.0, 4.0], vec![4.0, 3.0, 2.0, 1.0]];
        let mut interleaved_stereo = vec![0.0; 8];
        planar_to_interleaved(&planar_stereo, &mut interleaved_stereo);
        assert_eq!(
            interleaved_stereo,
            vec![1.0, 4.0, 2.0, 3.0, 3.0, 2.0, 4.0, 1.0]
        );

        // general
        let planar_general = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let mut interleaved_general = vec![0.0; 6];
        planar_to_interleaved(&planar_general, &mut interleaved_general);
        assert_eq!(interleaved_general, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn gain_ramps() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0; 4], vec![2.0; 4]]);
        buffer.apply_gain_ramp(0, 4, 0.0, 1.0);
        assert_eq!(buffer.channel(0), &[0.0, 0.25, 0.5, 0.75]);
        assert_eq!(buffer.channel(1), &[0.0, 0.5, 1.0, 1.5]);

        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0; 4]]);
        buffer.apply_gain(2, 10, 0.5);
        assert_eq!(buffer.channel(0), &[1.0, 1.0, 0.5, 0.5]);
        buffer.clear_range(0, 1);
        assert_eq!(buffer.channel(0), &[0.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn layout() {
        let mut buffer = AudioBuffer::new(2, 16);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frame_count(), 16);
        assert!(buffer.stereo_mut().is_some());
        buffer.resize(32);
        assert_eq!(buffer.channel(1).len(), 32);
        assert!(AudioBuffer::new(1, 16).stereo_mut().is_none());
    }
}
