//! Sample data and per block parameters of the granular generator.

use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use crate::{
    generator::{granular::FluxMode, Sound},
    utils::{adsr::AdsrParameters, buffer::AudioBuffer},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// What the played MIDI note controls.
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
pub enum PlayMode {
    /// Notes select the grain start slot, pitch follows the transpose setting only.
    Position,
    /// Notes set the playback pitch, slots are relative to the root note.
    #[default]
    Pitch,
}

// -------------------------------------------------------------------------------------------------

/// Size of the quantization grid grain start slots snap to.
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
pub enum KeyCount {
    #[default]
    #[strum(serialize = "12 Keys")]
    Keys12,
    #[strum(serialize = "24 Keys")]
    Keys24,
    #[strum(serialize = "48 Keys")]
    Keys48,
    #[strum(serialize = "96 Keys")]
    Keys96,
}

impl KeyCount {
    /// Map a key count choice index. Out of range indices select the largest grid.
    pub fn from_index(index: usize) -> Self {
        u8::try_from(index)
            .ok()
            .and_then(Self::from_repr)
            .unwrap_or(Self::Keys96)
    }

    /// Number of slots in the grid.
    pub fn count(self) -> i32 {
        match self {
            Self::Keys12 => 12,
            Self::Keys24 => 24,
            Self::Keys48 => 48,
            Self::Keys96 => 96,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Set of MIDI notes a sound responds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiNoteMask(u128);

impl MidiNoteMask {
    /// All 128 MIDI notes.
    pub const fn all() -> Self {
        Self(u128::MAX)
    }

    /// No notes at all.
    pub const fn none() -> Self {
        Self(0)
    }

    /// An inclusive range of notes.
    pub fn range(notes: RangeInclusive<u8>) -> Self {
        let mut mask = Self::none();
        for note in notes.filter(|note| *note < 128) {
            mask.insert(note);
        }
        mask
    }

    pub fn insert(&mut self, note: u8) {
        if note < 128 {
            self.0 |= 1 << note;
        }
    }

    pub fn contains(&self, note: u8) -> bool {
        note < 128 && self.0 & (1 << note) != 0
    }
}

impl Default for MidiNoteMask {
    fn default() -> Self {
        Self::all()
    }
}

// -------------------------------------------------------------------------------------------------

/// Source of planar sample data for a [`GrainSound`].
///
/// Decoding audio files is not part of this crate: wrap a decoder of your choice into a
/// reader, or use a [`MemorySampleReader`] for already decoded data.
pub trait SampleReader {
    /// Sample rate of the source data.
    fn sample_rate(&self) -> u32;
    /// Number of channels in the source data.
    fn channel_count(&self) -> usize;
    /// Number of frames in the source data.
    fn frame_count(&self) -> usize;
    /// Fill the given planar channels, starting at `start_frame`. Channels which do not exist
    /// in the source and frames past the source's end must be filled with silence.
    fn read(&mut self, output: &mut [Vec<f32>], start_frame: usize) -> Result<(), Error>;
}

// -------------------------------------------------------------------------------------------------

/// [`SampleReader`] for already decoded, planar sample data.
#[derive(Debug, Clone)]
pub struct MemorySampleReader {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl MemorySampleReader {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, Error> {
        if channels.is_empty() {
            return Err(Error::SampleError(
                "Sample data needs at least one channel".to_string(),
            ));
        }
        let frame_count = channels[0].len();
        if channels.iter().any(|channel| channel.len() != frame_count) {
            return Err(Error::SampleError(
                "All sample channels must have the same length".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }
}

impl SampleReader for MemorySampleReader {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    fn read(&mut self, output: &mut [Vec<f32>], start_frame: usize) -> Result<(), Error> {
        for (channel_index, output) in output.iter_mut().enumerate() {
            output.fill(0.0);
            if let Some(source) = self.channels.get(channel_index) {
                if start_frame < source.len() {
                    let source = &source[start_frame..];
                    let len = source.len().min(output.len());
                    output[..len].copy_from_slice(&source[..len]);
                }
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// A loaded sample with the grain parameters voices apply to it.
///
/// Sample data gets captured once on construction and is read-only afterwards. Grain
/// parameters are updated once per block via [`GrainSound::update`] and are read by all
/// [`GrainVoice`](super::GrainVoice)s which play the sound.
#[derive(Debug, Clone)]
pub struct GrainSound {
    name: String,
    data: Arc<AudioBuffer>,
    source_sample_rate: u32,
    length: usize,
    midi_notes: MidiNoteMask,
    root_note: i32,
    adsr_parameters: AdsrParameters,
    // block parameters
    play_mode: PlayMode,
    num_keys: i32,
    position: f64,
    duration: f64,
    spread: f32,
    flux_mode: FluxMode,
    flux_range: f32,
    transpose: i32,
}

impl GrainSound {
    /// Number of interpolation guard frames, appended to the sample data.
    pub const GUARD_FRAMES: usize = 4;
    /// Sample length in frames above which grain durations get scaled down.
    pub const MAX_UNSCALED_LENGTH: usize = 88200;
    /// Shortest possible grain duration in frames.
    pub const MIN_DURATION: f64 = 40.0;

    /// Read up to `max_length` of the given reader's data into a new sound.
    ///
    /// Readers with no frames or an invalid sample rate result in an empty sound, which no
    /// voice will play.
    pub fn new<R: SampleReader + ?Sized>(
        name: &str,
        reader: &mut R,
        midi_notes: MidiNoteMask,
        root_note: u8,
        attack_time: Duration,
        release_time: Duration,
        max_length: Duration,
    ) -> Result<Self, Error> {
        let source_sample_rate = reader.sample_rate();
        let max_frames = (max_length.as_secs_f64() * source_sample_rate as f64) as usize;
        let length = reader.frame_count().min(max_frames);
        let channel_count = reader.channel_count().clamp(1, 2);

        let data = if length > 0 && source_sample_rate > 0 {
            let mut channels = vec![vec![0.0; length + Self::GUARD_FRAMES]; channel_count];
            reader.read(&mut channels, 0)?;
            for channel in &mut channels {
                // guard frames must always be silent
                channel[length..].fill(0.0);
            }
            log::info!(
                "Loaded sample '{name}': {length} frames, {channel_count} channel(s) at {source_sample_rate} Hz"
            );
            AudioBuffer::from_channels(channels)
        } else {
            log::warn!("Sample '{name}' contains no playable frames");
            AudioBuffer::new(channel_count, 0)
        };
        let length = data.frame_count().saturating_sub(Self::GUARD_FRAMES);

        let adsr_parameters = AdsrParameters::new(
            attack_time,
            Duration::from_millis(100),
            1.0,
            release_time,
        )?;

        let mut sound = Self {
            name: name.to_string(),
            data: Arc::new(data),
            source_sample_rate,
            length,
            midi_notes,
            root_note: root_note.min(127) as i32,
            adsr_parameters,
            play_mode: PlayMode::default(),
            num_keys: KeyCount::default().count(),
            position: 0.0,
            duration: Self::MIN_DURATION,
            spread: 1.0,
            flux_mode: FluxMode::default(),
            flux_range: 1.0,
            transpose: 0,
        };
        sound.update(PlayMode::Pitch, 0, 0.25, 0.15, 1.0, [0.0; 4], 0, 1.0);
        Ok(sound)
    }

    /// Apply normalized grain parameters. Called once per block, before voices render.
    ///
    /// `position`, `duration` and `spread` are normalized to the sample length. `flux_flags`
    /// are the forward, backward, zigzag and random toggles: the last active one wins.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        mode: PlayMode,
        key_count_index: usize,
        position: f32,
        duration: f32,
        spread: f32,
        flux_flags: [f32; 4],
        transpose: i32,
        flux_range: f32,
    ) {
        let length = self.length as f64;

        self.play_mode = mode;
        self.num_keys = KeyCount::from_index(key_count_index).count();
        self.flux_mode = FluxMode::from_flags(flux_flags);
        self.flux_range = sanitize_normalized(flux_range);
        self.transpose = transpose;
        self.spread = sanitize_normalized(spread);
        self.position = sanitize_normalized(position) as f64 * length;

        let mut duration = sanitize_normalized(duration) as f64;
        if self.length > Self::MAX_UNSCALED_LENGTH {
            duration *= Self::MAX_UNSCALED_LENGTH as f64 / length;
        }
        self.duration = (duration * length).max(Self::MIN_DURATION);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the sound has no playable frames.
    pub fn is_empty(&self) -> bool {
        self.length == 0 || self.source_sample_rate == 0
    }

    /// Shared sample data: `length() + GUARD_FRAMES` frames with 1 or 2 channels.
    pub fn data(&self) -> &AudioBuffer {
        &self.data
    }

    /// Playable length in frames, without guard frames.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn channel_count(&self) -> usize {
        self.data.channel_count()
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn root_note(&self) -> i32 {
        self.root_note
    }

    pub fn midi_notes(&self) -> MidiNoteMask {
        self.midi_notes
    }

    /// Note envelope parameters, without a valid sample rate applied.
    pub fn adsr_parameters(&self) -> &AdsrParameters {
        &self.adsr_parameters
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    /// Number of slots in the position quantization grid.
    pub fn num_keys(&self) -> i32 {
        self.num_keys
    }

    /// Base grain start position in frames.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Grain duration in frames.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn spread(&self) -> f32 {
        self.spread
    }

    pub fn flux_mode(&self) -> FluxMode {
        self.flux_mode
    }

    pub fn flux_range(&self) -> f32 {
        self.flux_range
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }
}

impl Sound for GrainSound {
    fn applies_to_note(&self, note: u8) -> bool {
        self.midi_notes.contains(note)
    }
}

fn sanitize_normalized(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// -------------------------------------------------------------------------------------------------
