//! Real-time grain processor and its control-side handle.

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use atomic_float::AtomicF64;
use basedrop::{Collector, Handle, Owned};
use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;

use crate::{
    generator::{
        granular::{EnvelopeShape, GrainSound, GrainVoice, MidiNoteMask, SampleReader},
        NoteEvent, Synthesizer, TimedNoteEvent,
    },
    parameter::{Parameter, ParameterValueUpdate},
    utils::buffer::AudioBuffer,
    Error,
};

// -------------------------------------------------------------------------------------------------

mod parameters;

pub use parameters::{ParameterSnapshot, SharedParameters};

// -------------------------------------------------------------------------------------------------

/// Messages the [`GrainProcessorHandle`] sends to the [`GrainProcessor`].
pub enum ProcessorMessage {
    /// Apply a note event at the start of the next block.
    Note(NoteEvent),
    /// Replace the played sound. The old sound gets dropped in the collector's thread.
    LoadSound(Owned<GrainSound>),
}

// -------------------------------------------------------------------------------------------------

/// Lock-free read positions of all processor voices, normalized to the sample length.
///
/// Written by the processor at the end of each block, read by displays. Clones refer to the
/// same positions. Voices which are not playing report position `0.0`.
#[derive(Debug, Clone)]
pub struct VoicePositions(Arc<[AtomicF64]>);

impl VoicePositions {
    fn new(voice_count: usize) -> Self {
        Self((0..voice_count).map(|_| AtomicF64::new(0.0)).collect())
    }

    /// Number of voices.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalized position of the given voice, or `0.0` for invalid voice indices.
    pub fn get(&self, voice_index: usize) -> f64 {
        self.0
            .get(voice_index)
            .map_or(0.0, |position| position.load(Ordering::Relaxed))
    }

    /// Copy all positions into the given slice.
    pub fn load_into(&self, positions: &mut [f64]) {
        for (target, position) in positions.iter_mut().zip(self.0.iter()) {
            *target = position.load(Ordering::Relaxed);
        }
    }

    fn store(&self, voice_index: usize, position: f64) {
        if let Some(target) = self.0.get(voice_index) {
            target.store(position, Ordering::Relaxed);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Renders granular voices of a single loaded sample in the audio thread.
///
/// Create it together with its [`GrainProcessorHandle`] via [`GrainProcessor::new`], then move
/// the processor into the audio thread and call [`GrainProcessor::process`] for each block.
pub struct GrainProcessor {
    synth: Synthesizer<GrainVoice>,
    parameters: Arc<SharedParameters>,
    message_queue: Arc<ArrayQueue<ProcessorMessage>>,
    voice_positions: VoicePositions,
    sample_rate: u32,
    current_gain: f32,
}

impl GrainProcessor {
    /// Number of voices the processor plays.
    pub const VOICE_COUNT: usize = 6;
    /// Root note of loaded samples.
    pub const ROOT_NOTE: u8 = 60;
    /// Note attack time of loaded samples.
    pub const ATTACK_TIME: Duration = Duration::ZERO;
    /// Note release time of loaded samples.
    pub const RELEASE_TIME: Duration = Duration::from_millis(10);
    /// Maximum length of loaded samples. Longer samples get truncated.
    pub const MAX_SAMPLE_LENGTH: Duration = Duration::from_secs(180);

    const MESSAGE_QUEUE_SIZE: usize = 1024;

    /// Create a new processor which renders at the given sample rate, and a handle to control it.
    pub fn new(sample_rate: u32) -> Result<(Self, GrainProcessorHandle), Error> {
        let envelope_shape = EnvelopeShape::default();
        let parameters = Arc::new(SharedParameters::new(envelope_shape.clone()));

        let voices = (0..Self::VOICE_COUNT)
            .map(|_| GrainVoice::new(envelope_shape.clone()))
            .collect();
        let mut synth = Synthesizer::new(voices);
        synth.set_playback_sample_rate(sample_rate)?;

        let message_queue = Arc::new(ArrayQueue::new(Self::MESSAGE_QUEUE_SIZE));
        let voice_positions = VoicePositions::new(Self::VOICE_COUNT);
        let current_gain = parameters.snapshot().gain;

        let processor = Self {
            synth,
            parameters: Arc::clone(&parameters),
            message_queue: Arc::clone(&message_queue),
            voice_positions: voice_positions.clone(),
            sample_rate,
            current_gain,
        };
        let handle = GrainProcessorHandle {
            parameters,
            message_queue,
            voice_positions,
            envelope_shape,
            collector: Collector::new(),
        };
        Ok((processor, handle))
    }

    /// All parameter descriptors of the processor.
    pub fn parameters() -> Vec<Box<dyn Parameter>> {
        SharedParameters::descriptors()
    }

    /// The sample rate the processor renders at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Access to the processor's voices and sound.
    pub fn synthesizer(&self) -> &Synthesizer<GrainVoice> {
        &self.synth
    }

    /// Render the next block into the given output buffer, overwriting its content.
    ///
    /// Parameter changes get applied first, then note events sent via the handle, then the
    /// given timed events at their frame offsets. Real-time safe: does not allocate, block or
    /// panic.
    pub fn process(&mut self, output: &mut AudioBuffer, events: &[TimedNoteEvent]) {
        let parameters = self.parameters.snapshot();
        if let Some(sound) = self.synth.sound_mut() {
            apply_parameters(sound, &parameters);
        }
        self.process_messages(&parameters);

        output.clear();
        let frame_count = output.frame_count();
        self.synth.render_next_block(output, 0, frame_count, events);

        output.apply_gain_ramp(0, frame_count, self.current_gain, parameters.gain);
        self.current_gain = parameters.gain;

        self.publish_voice_positions();
    }

    fn process_messages(&mut self, parameters: &ParameterSnapshot) {
        while let Some(message) = self.message_queue.pop() {
            match message {
                ProcessorMessage::Note(event) => self.synth.handle_event(event),
                ProcessorMessage::LoadSound(sound) => {
                    // dropping the old sound only enqueues it for the collector
                    drop(self.synth.set_sound(sound));
                    if let Some(sound) = self.synth.sound_mut() {
                        apply_parameters(sound, parameters);
                    }
                }
            }
        }
    }

    fn publish_voice_positions(&self) {
        let length = self.synth.sound().map_or(0, |sound| sound.length());
        for (index, voice) in self.synth.voices().iter().enumerate() {
            let position = if length > 0 {
                voice.position() / length as f64
            } else {
                0.0
            };
            self.voice_positions.store(index, position);
        }
    }
}

fn apply_parameters(sound: &mut GrainSound, parameters: &ParameterSnapshot) {
    sound.update(
        parameters.play_mode,
        parameters.key_count_index,
        parameters.position,
        parameters.duration,
        parameters.spread,
        parameters.flux_flags,
        parameters.transpose,
        parameters.flux_range,
    );
}

// -------------------------------------------------------------------------------------------------

/// Control-side handle of a [`GrainProcessor`].
///
/// Sends note events and sounds to the processor and sets its parameters. Sample loading
/// happens in the caller's thread: call [`GrainProcessorHandle::collect_garbage`] regularly
/// to free sounds the processor no longer uses.
pub struct GrainProcessorHandle {
    parameters: Arc<SharedParameters>,
    message_queue: Arc<ArrayQueue<ProcessorMessage>>,
    voice_positions: VoicePositions,
    envelope_shape: EnvelopeShape,
    collector: Collector,
}

impl GrainProcessorHandle {
    /// Current parameter values.
    pub fn parameters(&self) -> ParameterSnapshot {
        self.parameters.snapshot()
    }

    /// Set a parameter's value via the given raw or normalized value update definition.
    ///
    /// Note: Value update (id, value) tuples can be created safely via `value_update` functions
    /// of the parameter descriptors in [SharedParameters].
    pub fn set_parameter(
        &self,
        (parameter_id, update): (FourCC, ParameterValueUpdate),
    ) -> Result<(), Error> {
        if let ParameterValueUpdate::Normalized(normalized_value) = update {
            if !(0.0..=1.0).contains(&normalized_value) {
                return Err(Error::ParameterError(format!(
                    "Invalid parameter update: value should be a normalized value, but is: '{normalized_value}'"
                )));
            }
        }
        self.parameters.set(parameter_id, &update).inspect_err(|err| {
            log::warn!("Ignoring parameter update for '{parameter_id}': {err}");
        })
    }

    /// Start playing a note. Velocity is in range `0.0..=1.0`.
    pub fn note_on(&self, note: u8, velocity: f32) -> Result<(), Error> {
        self.send_note_event(NoteEvent::NoteOn { note, velocity }, "note_on")
    }

    /// Release a playing note.
    pub fn note_off(&self, note: u8) -> Result<(), Error> {
        let event = NoteEvent::NoteOff {
            note,
            velocity: 0.0,
        };
        self.send_note_event(event, "note_off")
    }

    /// Release all playing notes.
    pub fn all_notes_off(&self) -> Result<(), Error> {
        let event = NoteEvent::AllNotesOff {
            allow_tail_off: true,
        };
        self.send_note_event(event, "all_notes_off")
    }

    /// Load a new sample from the given reader and send it to the processor, which replaces
    /// the currently played sample with it. The sample applies to all MIDI notes.
    pub fn load_sample<R: SampleReader + ?Sized>(
        &self,
        name: &str,
        reader: &mut R,
    ) -> Result<(), Error> {
        let sound = GrainSound::new(
            name,
            reader,
            MidiNoteMask::all(),
            GrainProcessor::ROOT_NOTE,
            GrainProcessor::ATTACK_TIME,
            GrainProcessor::RELEASE_TIME,
            GrainProcessor::MAX_SAMPLE_LENGTH,
        )?;
        let sound = Owned::new(&self.collector_handle(), sound);
        if self
            .message_queue
            .push(ProcessorMessage::LoadSound(sound))
            .is_err()
        {
            return Err(Self::message_queue_error("load_sample"));
        }
        Ok(())
    }

    /// Free sounds the processor no longer uses.
    pub fn collect_garbage(&mut self) {
        self.collector.collect();
    }

    /// The shared grain envelope shape, e.g. to draw the envelope.
    pub fn envelope_shape(&self) -> &EnvelopeShape {
        &self.envelope_shape
    }

    /// Normalized read positions of the processor's voices.
    pub fn voice_positions(&self) -> &VoicePositions {
        &self.voice_positions
    }

    fn collector_handle(&self) -> Handle {
        self.collector.handle()
    }

    fn send_note_event(&self, event: NoteEvent, event_name: &str) -> Result<(), Error> {
        if self
            .message_queue
            .push(ProcessorMessage::Note(event))
            .is_err()
        {
            return Err(Self::message_queue_error(event_name));
        }
        Ok(())
    }

    fn message_queue_error(event_name: &str) -> Error {
        log::warn!("Processor's message queue is full. Failed to send a {event_name} event.");
        Error::SendError("Processor queue is full".to_string())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::generator::{
        granular::{MemorySampleReader, PlayMode},
        Voice,
    };

    const SAMPLE_RATE: u32 = 44100;

    fn sine_reader(frames: usize) -> Result<MemorySampleReader, Error> {
        let data = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / SAMPLE_RATE as f32).sin())
            .collect();
        MemorySampleReader::new(SAMPLE_RATE, vec![data])
    }

    fn peak(buffer: &AudioBuffer) -> f32 {
        buffer
            .channels()
            .iter()
            .flatten()
            .fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    #[test]
    fn silent_without_sound() -> Result<(), Error> {
        let (mut processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.note_on(60, 1.0)?;
        let mut output = AudioBuffer::new(2, 256);
        output.channel_mut(0).fill(1.0);
        processor.process(&mut output, &[]);
        assert_eq!(peak(&output), 0.0);
        assert_eq!(processor.synthesizer().active_voice_count(), 0);
        Ok(())
    }

    #[test]
    fn plays_loaded_samples() -> Result<(), Error> {
        let (mut processor, mut handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.load_sample("sine", &mut sine_reader(SAMPLE_RATE as usize)?)?;
        handle.note_on(60, 1.0)?;
        handle.note_on(64, 1.0)?;

        let mut output = AudioBuffer::new(2, 512);
        processor.process(&mut output, &[]);
        assert_eq!(processor.synthesizer().active_voice_count(), 2);
        assert!(peak(&output) > 0.0);
        assert!(handle.voice_positions().get(0) > 0.0);
        assert!(handle.voice_positions().get(0) < 1.0);
        assert_eq!(handle.voice_positions().get(5), 0.0);

        // replacing the sound stops all voices and frees the old one
        handle.load_sample("sine2", &mut sine_reader(1000)?)?;
        processor.process(&mut output, &[]);
        assert_eq!(processor.synthesizer().active_voice_count(), 0);
        assert_eq!(
            processor.synthesizer().sound().map(|s| s.name().to_string()),
            Some("sine2".to_string())
        );
        handle.collect_garbage();
        Ok(())
    }

    #[test]
    fn timed_events() -> Result<(), Error> {
        let (mut processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.load_sample("sine", &mut sine_reader(SAMPLE_RATE as usize)?)?;

        let mut output = AudioBuffer::new(1, 256);
        let events = [TimedNoteEvent::new(
            128,
            NoteEvent::NoteOn {
                note: 60,
                velocity: 1.0,
            },
        )];
        processor.process(&mut output, &events);
        assert!(output.channel(0)[..128].iter().all(|s| *s == 0.0));
        assert!(output.channel(0)[128..].iter().any(|s| *s != 0.0));
        Ok(())
    }

    #[test]
    fn notes_use_current_parameters() -> Result<(), Error> {
        let (mut processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.set_parameter(SharedParameters::PLAY_MODE.value_update(PlayMode::Position))?;
        handle.set_parameter(SharedParameters::TRANSPOSE.value_update(12))?;
        handle.set_parameter(SharedParameters::SPREAD.value_update(0.0))?;
        // sound, parameters and note arrive within the same block
        handle.load_sample("sine", &mut sine_reader(SAMPLE_RATE as usize)?)?;
        handle.note_on(40, 1.0)?;

        let mut output = AudioBuffer::new(2, 64);
        processor.process(&mut output, &[]);
        let voice = &processor.synthesizer().voices()[0];
        assert!(voice.is_active());
        assert!((voice.pitch_ratio() - 2.0).abs() < 1e-9);
        // first grain starts at the base position, advanced by 64 frames at double speed
        assert!((voice.position() - (0.25 * SAMPLE_RATE as f64 + 128.0)).abs() < 1e-6);

        // changes apply to notes started in later blocks too
        handle.set_parameter(SharedParameters::PLAY_MODE.value_update(PlayMode::Pitch))?;
        handle.note_on(72, 1.0)?;
        processor.process(&mut output, &[]);
        let voice = &processor.synthesizer().voices()[1];
        assert!((voice.pitch_ratio() - 4.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn gain_ramps() -> Result<(), Error> {
        let (mut processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.load_sample("sine", &mut sine_reader(SAMPLE_RATE as usize)?)?;
        handle.note_on(60, 1.0)?;

        let mut output = AudioBuffer::new(2, 256);
        processor.process(&mut output, &[]);
        assert!(peak(&output) > 0.0);

        handle.set_parameter(SharedParameters::GAIN.value_update(0.0))?;
        processor.process(&mut output, &[]);
        // ramps down from the previous gain
        assert!(output.channel(0)[..64].iter().any(|s| *s != 0.0));
        assert!(output.channel(0)[255].abs() < 0.01);

        processor.process(&mut output, &[]);
        assert_eq!(peak(&output), 0.0);
        Ok(())
    }

    #[test]
    fn parameter_updates() -> Result<(), Error> {
        let (_processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        assert_eq!(GrainProcessor::parameters().len(), 13);

        handle.set_parameter(SharedParameters::ENVELOPE_SHAPE.value_update(0.75))?;
        assert_eq!(handle.envelope_shape().get(), 0.75);

        handle.set_parameter(SharedParameters::TRANSPOSE.value_update(12))?;
        assert_eq!(handle.parameters().transpose, 12);

        assert!(handle
            .set_parameter((
                SharedParameters::POSITION.id(),
                ParameterValueUpdate::Normalized(2.0)
            ))
            .is_err());
        assert!(handle
            .set_parameter((FourCC(*b"NOPE"), ParameterValueUpdate::Normalized(0.5)))
            .is_err());
        Ok(())
    }

    #[test]
    fn release_clears_positions() -> Result<(), Error> {
        let (mut processor, handle) = GrainProcessor::new(SAMPLE_RATE)?;
        handle.load_sample("sine", &mut sine_reader(SAMPLE_RATE as usize)?)?;
        handle.note_on(60, 1.0)?;
        let mut output = AudioBuffer::new(2, 512);
        processor.process(&mut output, &[]);
        assert!(handle.voice_positions().get(0) > 0.0);

        handle.all_notes_off()?;
        for _ in 0..4 {
            processor.process(&mut output, &[]);
        }
        assert_eq!(processor.synthesizer().active_voice_count(), 0);
        let mut positions = [1.0; GrainProcessor::VOICE_COUNT];
        handle.voice_positions().load_into(&mut positions);
        assert_eq!(positions, [0.0; GrainProcessor::VOICE_COUNT]);
        Ok(())
    }
}
