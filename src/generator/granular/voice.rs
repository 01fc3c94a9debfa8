use assume::assume;
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    generator::{
        granular::{EnvelopeShape, FluxMode, FluxState, GrainSound, PlayMode, WavetableEnvelope},
        Voice,
    },
    utils::{
        adsr::{AdsrEnvelope, AdsrParameters},
        buffer::AudioBuffer,
        speed_from_note,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A single, reusable voice which plays grains of a [`GrainSound`].
///
/// A note plays a sequence of grains: each grain starts at a flux-selected position, plays
/// `duration` frames of the sound at the note's pitch, shaped by the wavetable envelope and the
/// note's ADSR envelope, then the next grain starts. Releasing the key stops retriggering and
/// fades out the current grain with the ADSR's release.
pub struct GrainVoice {
    sample_rate: u32,
    current_note: Option<u8>,
    key_down: bool,
    velocity_gain: f32,
    pitch_ratio: f64,
    position: f64,
    played_samples: f64,
    grains_started: u64,
    flux: FluxState,
    rng: SmallRng,
    envelope: WavetableEnvelope,
    envelope_shape: EnvelopeShape,
    adsr: AdsrEnvelope,
    adsr_parameters: AdsrParameters,
}

impl GrainVoice {
    /// Create a new idle voice which reads its grain envelope shape from the given shared shape.
    pub fn new(envelope_shape: EnvelopeShape) -> Self {
        let envelope = WavetableEnvelope::new(envelope_shape.get());
        Self {
            sample_rate: 0,
            current_note: None,
            key_down: false,
            velocity_gain: 0.0,
            pitch_ratio: 1.0,
            position: 0.0,
            played_samples: 0.0,
            grains_started: 0,
            flux: FluxState::default(),
            rng: SmallRng::from_os_rng(),
            envelope,
            envelope_shape,
            adsr: AdsrEnvelope::new(),
            adsr_parameters: AdsrParameters::default(),
        }
    }

    /// Current read position in frames, or 0 when the key no longer is pressed.
    pub fn position(&self) -> f64 {
        if self.key_down {
            self.position
        } else {
            0.0
        }
    }

    /// Current playback speed, relative to the host's sample rate.
    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    /// Number of grains started since the voice got created.
    pub fn grains_started(&self) -> u64 {
        self.grains_started
    }

    /// The voice's grain envelope.
    pub fn envelope(&self) -> &WavetableEnvelope {
        &self.envelope
    }

    /// Current flux sequencer state.
    pub fn flux_state(&self) -> FluxState {
        self.flux
    }

    /// True when the note's ADSR envelope is releasing.
    pub fn is_releasing(&self) -> bool {
        self.current_note.is_some() && !self.key_down
    }

    fn set_pitch_ratio(&mut self, sound: &GrainSound) {
        let note = match sound.play_mode() {
            PlayMode::Pitch => {
                let note = self.current_note.unwrap_or(0) as i32;
                (note + sound.transpose()).rem_euclid(120)
            }
            PlayMode::Position => 60 + sound.transpose(),
        };
        self.pitch_ratio = speed_from_note(
            note,
            sound.root_note(),
            sound.source_sample_rate(),
            self.sample_rate,
        );
    }

    fn set_start_position(&mut self, sound: &GrainSound, newly_started: bool) {
        self.envelope.reset_phase();
        let grain_seconds = (sound.duration() / self.pitch_ratio) / self.sample_rate as f64;
        let frequency = if grain_seconds.is_finite() && grain_seconds > 0.0 {
            1.0 / grain_seconds
        } else {
            0.0
        };
        self.envelope.set_frequency(frequency as f32, self.sample_rate);

        let num_keys = sound.num_keys().max(1);
        if newly_started {
            self.flux = FluxState::default();
        } else {
            let key_range = FluxState::key_range(num_keys, sound.flux_range());
            self.flux = self.flux.next(sound.flux_mode(), key_range, &mut self.rng);
        }
        let offset = match sound.flux_mode() {
            FluxMode::Backward => -self.flux.offset(),
            _ => self.flux.offset(),
        };
        let base_note = match sound.play_mode() {
            PlayMode::Position => self.current_note.unwrap_or(0) as i32,
            PlayMode::Pitch => sound.root_note(),
        };
        let slot = (base_note + offset).rem_euclid(num_keys);

        let length = sound.length() as f64;
        let slot_offset = slot as f64 * length * sound.spread() as f64 / num_keys as f64;
        let position = (sound.position() + slot_offset).rem_euclid(length);
        // rem_euclid may round up to `length`
        self.position = if position.is_finite() && position < length {
            position
        } else {
            0.0
        };
        self.grains_started += 1;
    }

    fn stop_note(&mut self) {
        self.current_note = None;
        self.key_down = false;
        self.adsr.reset();
    }

    /// Render the note and pass each rendered (left, right) frame to `write` with its frame
    /// index. Stops early when the note ended.
    #[inline]
    fn render_frames<W: FnMut(usize, f32, f32)>(
        &mut self,
        sound: &GrainSound,
        start: usize,
        len: usize,
        mut write: W,
    ) {
        let length = sound.length();
        let data = sound.data();
        let left = data.channel(0);
        let right = data.channel(data.channel_count() - 1);
        assume!(
            unsafe: left.len() == length + GrainSound::GUARD_FRAMES,
            "Sample data has guard frames"
        );
        assume!(unsafe: right.len() == left.len(), "Sample channels have the same length");

        for frame in start..start + len {
            let index = (self.position as usize).min(length - 1);
            let alpha = (self.position - index as f64) as f32;
            let inv_alpha = 1.0 - alpha;
            assume!(unsafe: index + 1 < left.len(), "Read position stays within guard frames");
            let l = left[index] * inv_alpha + left[index + 1] * alpha;
            let r = right[index] * inv_alpha + right[index + 1] * alpha;

            let adsr = self.adsr.run(&self.adsr_parameters);
            let gain = adsr * self.envelope.next_sample() * self.velocity_gain;
            write(frame, l * gain, r * gain);

            self.position += self.pitch_ratio;
            if self.position >= length as f64 {
                self.position = self.position.rem_euclid(length as f64);
                if self.position >= length as f64 {
                    self.position = 0.0;
                }
            }
            self.played_samples += self.pitch_ratio;

            if !self.adsr.is_active() {
                self.stop_note();
                break;
            }
            if self.key_down && self.played_samples > sound.duration() {
                self.played_samples = 0.0;
                self.set_pitch_ratio(sound);
                self.set_start_position(sound, false);
            }
        }
    }
}

impl Voice for GrainVoice {
    type Sound = GrainSound;

    fn can_play(&self, sound: &GrainSound) -> bool {
        !sound.is_empty()
    }

    fn note_on(&mut self, note: u8, velocity: f32, sound: &GrainSound, _pitch_wheel: i32) {
        if sound.is_empty() || self.sample_rate == 0 {
            return;
        }
        self.envelope.update_shape(&self.envelope_shape);

        self.current_note = Some(note);
        self.key_down = true;
        self.set_pitch_ratio(sound);
        self.set_start_position(sound, true);
        self.played_samples = 0.0;
        self.velocity_gain = if velocity.is_nan() {
            0.0
        } else {
            velocity.clamp(0.0, 1.0)
        };

        let sound_parameters = sound.adsr_parameters();
        if let Err(err) = self.adsr_parameters.setup(
            sound_parameters.attack_time(),
            sound_parameters.decay_time(),
            sound_parameters.sustain_level(),
            sound_parameters.release_time(),
        ) {
            log::warn!("Failed to apply note envelope parameters: {err}");
        }
        self.adsr.note_on(&self.adsr_parameters);
    }

    fn note_off(&mut self, _velocity: f32, allow_tail_off: bool) {
        if allow_tail_off && self.current_note.is_some() {
            self.key_down = false;
            self.adsr.note_off(&self.adsr_parameters);
            if !self.adsr.is_active() {
                self.stop_note();
            }
        } else {
            self.stop_note();
        }
    }

    fn render_next_block(
        &mut self,
        sound: &GrainSound,
        output: &mut AudioBuffer,
        start: usize,
        len: usize,
    ) {
        if self.current_note.is_none() {
            return;
        }
        if sound.is_empty() {
            self.stop_note();
            return;
        }
        let len = len.min(output.frame_count().saturating_sub(start));
        if let Some((out_left, out_right)) = output.stereo_mut() {
            self.render_frames(sound, start, len, |frame, l, r| {
                out_left[frame] += l;
                out_right[frame] += r;
            });
        } else if output.channel_count() > 0 {
            let out_mono = output.channel_mut(0);
            let mono_source = sound.channel_count() == 1;
            self.render_frames(sound, start, len, |frame, l, r| {
                out_mono[frame] += if mono_source { l } else { (l + r) * 0.5 };
            });
        }
    }

    fn is_active(&self) -> bool {
        self.current_note.is_some()
    }

    fn is_key_down(&self) -> bool {
        self.key_down
    }

    fn current_note(&self) -> Option<u8> {
        self.current_note
    }

    fn set_playback_sample_rate(&mut self, sample_rate: u32) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "Invalid playback sample rate: must be > 0".to_string(),
            ));
        }
        self.adsr_parameters.set_sample_rate(sample_rate)?;
        self.sample_rate = sample_rate;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::generator::granular::{MemorySampleReader, MidiNoteMask};

    const RATE: u32 = 44100;

    fn ramp_sound(length: usize, release: Duration) -> Result<GrainSound, Box<Error>> {
        // a ramp makes read positions visible in the output
        let data = (0..length).map(|i| i as f32 / length as f32).collect();
        let mut reader = MemorySampleReader::new(RATE, vec![data])?;
        Ok(GrainSound::new(
            "ramp",
            &mut reader,
            MidiNoteMask::all(),
            60,
            Duration::ZERO,
            release,
            Duration::from_secs(180),
        )?)
    }

    fn voice() -> Result<GrainVoice, Box<Error>> {
        let mut voice = GrainVoice::new(EnvelopeShape::new(0.0));
        voice.set_playback_sample_rate(RATE)?;
        Ok(voice)
    }

    #[test]
    fn pitch_ratios() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(RATE as usize, Duration::from_millis(10))?;
        let mut voice = voice()?;

        voice.note_on(60, 1.0, &sound, 0);
        assert_eq!(voice.pitch_ratio(), 1.0);
        voice.note_on(72, 1.0, &sound, 0);
        assert!((voice.pitch_ratio() - 2.0).abs() < 1e-9);

        // position mode ignores the played note
        sound.update(PlayMode::Position, 0, 0.25, 0.1, 0.0, [0.0; 4], 12, 1.0);
        voice.note_on(40, 1.0, &sound, 0);
        assert!((voice.pitch_ratio() - 2.0).abs() < 1e-9);

        // source and host rates differ
        voice.set_playback_sample_rate(2 * RATE)?;
        sound.update(PlayMode::Pitch, 0, 0.25, 0.1, 0.0, [0.0; 4], 0, 1.0);
        voice.note_on(60, 1.0, &sound, 0);
        assert_eq!(voice.pitch_ratio(), 0.5);
        Ok(())
    }

    #[test]
    fn grains_retrigger_at_duration() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(RATE as usize, Duration::from_millis(10))?;
        sound.update(PlayMode::Pitch, 0, 0.25, 0.1, 0.0, [0.0; 4], 0, 1.0);
        let mut voice = voice()?;
        voice.note_on(60, 1.0, &sound, 0);
        assert_eq!(voice.position(), 11025.0);
        assert_eq!(voice.grains_started(), 1);

        let mut output = AudioBuffer::new(1, 1);
        let mut retriggers: Vec<usize> = Vec::new();
        for frame in 0..20_000 {
            let grains = voice.grains_started();
            output.clear();
            voice.render_next_block(&sound, &mut output, 0, 1);
            if voice.grains_started() != grains {
                retriggers.push(frame + 1);
                // restarts at the same base position without flux
                assert_eq!(voice.position(), 11025.0);
            }
        }
        assert_eq!(retriggers.len(), 4);
        for (index, frame) in retriggers.iter().enumerate() {
            let expected = (index + 1) * 4411;
            assert!(frame.abs_diff(expected) <= index + 1);
        }
        Ok(())
    }

    #[test]
    fn positions_wrap_around() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(1000, Duration::from_millis(10))?;
        sound.update(PlayMode::Pitch, 0, 0.9, 1.0, 0.0, [0.0; 4], 0, 1.0);
        let mut voice = voice()?;
        voice.note_on(84, 1.0, &sound, 0);

        let mut output = AudioBuffer::new(2, 64);
        for _ in 0..100 {
            voice.render_next_block(&sound, &mut output, 0, 64);
            assert!((0.0..1000.0).contains(&voice.position()));
        }
        Ok(())
    }

    #[test]
    fn flux_moves_grain_starts() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(12_000, Duration::from_millis(10))?;
        // forward flux over all 12 keys, full spread, 40 frame grains
        sound.update(PlayMode::Pitch, 0, 0.0, 0.0, 1.0, [1.0, 0.0, 0.0, 0.0], 0, 1.0);
        let mut voice = voice()?;
        voice.note_on(60, 1.0, &sound, 0);
        assert_eq!(voice.position(), 0.0);

        let mut output = AudioBuffer::new(1, 41);
        voice.render_next_block(&sound, &mut output, 0, 41);
        assert_eq!(voice.grains_started(), 2);
        assert_eq!(voice.position(), 1000.0);

        // backward flux walks downwards and wraps to the end of the sample
        sound.update(PlayMode::Pitch, 0, 0.0, 0.0, 1.0, [0.0, 1.0, 0.0, 0.0], 0, 1.0);
        voice.note_on(60, 1.0, &sound, 0);
        voice.render_next_block(&sound, &mut output, 0, 41);
        assert_eq!(voice.position(), 11000.0);
        Ok(())
    }

    #[test]
    fn position_mode_slots() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(12_000, Duration::from_millis(10))?;
        sound.update(PlayMode::Position, 0, 0.0, 0.5, 1.0, [0.0; 4], 0, 1.0);
        let mut voice = voice()?;
        voice.note_on(63, 1.0, &sound, 0);
        assert_eq!(voice.position(), 3000.0);
        assert_eq!(voice.pitch_ratio(), 1.0);
        Ok(())
    }

    #[test]
    fn release_tails_off() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(RATE as usize, Duration::from_millis(10))?;
        sound.update(PlayMode::Pitch, 0, 0.5, 0.5, 0.0, [0.0; 4], 0, 1.0);
        let mut voice = voice()?;
        voice.note_on(60, 1.0, &sound, 0);

        let mut output = AudioBuffer::new(1, 4096);
        voice.render_next_block(&sound, &mut output, 0, 4096);
        let grains = voice.grains_started();

        voice.note_off(0.0, true);
        assert!(voice.is_active());
        assert!(voice.is_releasing());
        assert_eq!(voice.position(), 0.0);

        output.clear();
        voice.render_next_block(&sound, &mut output, 0, 4096);
        let tail = output.channel(0);
        assert!(tail[0] != 0.0);
        // 10 ms release at 44.1 kHz
        assert!(tail[500..].iter().all(|s| *s == 0.0));
        assert!(!voice.is_active());
        assert_eq!(voice.grains_started(), grains);
        Ok(())
    }

    #[test]
    fn envelope_shape_changes_apply_on_note_on() -> Result<(), Box<Error>> {
        let sound = ramp_sound(RATE as usize, Duration::from_millis(10))?;
        let shape = EnvelopeShape::new(0.0);
        let mut voice = GrainVoice::new(shape.clone());
        voice.set_playback_sample_rate(RATE)?;
        let initial_table = voice.envelope().table().to_vec();

        voice.note_on(60, 1.0, &sound, 0);
        assert_eq!(voice.envelope().shape(), 0.0);

        // rendering keeps the table of the playing note
        shape.set(0.8);
        let mut output = AudioBuffer::new(1, 256);
        voice.render_next_block(&sound, &mut output, 0, 256);
        assert_eq!(voice.envelope().shape(), 0.0);
        assert_eq!(voice.envelope().table(), initial_table.as_slice());

        voice.note_on(62, 1.0, &sound, 0);
        assert_eq!(voice.envelope().shape(), 0.8);
        assert_ne!(voice.envelope().table(), initial_table.as_slice());
        // steeper shapes narrow the envelope's tails
        let quarter = WavetableEnvelope::TABLE_SIZE / 4;
        assert!(voice.envelope().table()[quarter] < initial_table[quarter]);
        Ok(())
    }

    #[test]
    fn wrapped_positions_stay_below_length() -> Result<(), Box<Error>> {
        let mut sound = ramp_sound(1000, Duration::from_millis(10))?;
        // a start position just below the end, moved by a full spread slot
        sound.update(PlayMode::Position, 0, 1.0, 1.0, 1.0, [0.0; 4], 0, 1.0);
        let mut voice = voice()?;
        for note in 0..128 {
            voice.note_on(note, 1.0, &sound, 0);
            assert!((0.0..1000.0).contains(&voice.position()));
        }
        Ok(())
    }

    #[test]
    fn hard_stop() -> Result<(), Box<Error>> {
        let sound = ramp_sound(RATE as usize, Duration::from_millis(10))?;
        let mut voice = voice()?;
        voice.note_on(60, 1.0, &sound, 0);
        voice.note_off(0.0, false);
        assert!(!voice.is_active());

        let mut output = AudioBuffer::new(2, 64);
        voice.render_next_block(&sound, &mut output, 0, 64);
        assert!(output.channel(0).iter().all(|s| *s == 0.0));
        Ok(())
    }

    #[test]
    fn empty_sounds_are_refused() -> Result<(), Box<Error>> {
        let sound = ramp_sound(0, Duration::ZERO)?;
        let mut voice = voice()?;
        assert!(!voice.can_play(&sound));
        voice.note_on(60, 1.0, &sound, 0);
        assert!(!voice.is_active());
        Ok(())
    }
}
