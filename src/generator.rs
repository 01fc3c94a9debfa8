//! Polyphonic note dispatch for sounds which are played by a set of voices.

use basedrop::Owned;

use crate::{utils::buffer::AudioBuffer, Error};

// -------------------------------------------------------------------------------------------------

pub mod granular;

// -------------------------------------------------------------------------------------------------

/// Something a [`Voice`] can play.
pub trait Sound: Send + 'static {
    /// Returns true when the sound should be played for the given MIDI note.
    fn applies_to_note(&self, note: u8) -> bool;
}

// -------------------------------------------------------------------------------------------------

/// A reusable, real-time voice slot of a [`Synthesizer`] which plays notes of a [`Sound`].
///
/// All functions, apart from `set_playback_sample_rate`, get called in the audio thread and
/// must not allocate, block or panic.
pub trait Voice: Send {
    /// The sound type this voice can play.
    type Sound: Sound;

    /// Returns true when the voice is able to play the given sound.
    fn can_play(&self, sound: &Self::Sound) -> bool;

    /// Start playing a new note.
    fn note_on(&mut self, note: u8, velocity: f32, sound: &Self::Sound, pitch_wheel: i32);
    /// Stop playing the current note. With `allow_tail_off` the voice may fade out.
    fn note_off(&mut self, velocity: f32, allow_tail_off: bool);

    /// Add `len` frames of the current note into `output`, starting at frame `start`.
    fn render_next_block(
        &mut self,
        sound: &Self::Sound,
        output: &mut AudioBuffer,
        start: usize,
        len: usize,
    );

    /// Returns true while the voice is playing or fading out a note.
    fn is_active(&self) -> bool;
    /// Returns true while the note's key is held.
    fn is_key_down(&self) -> bool;
    /// The note which is currently played, if any.
    fn current_note(&self) -> Option<u8>;

    /// Set the sample rate the voice renders at.
    fn set_playback_sample_rate(&mut self, sample_rate: u32) -> Result<(), Error>;
}

// -------------------------------------------------------------------------------------------------

/// Note events a [`Synthesizer`] handles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: f32 },
    NoteOff { note: u8, velocity: f32 },
    AllNotesOff { allow_tail_off: bool },
}

/// A [`NoteEvent`] at a frame offset within the block that is rendered next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedNoteEvent {
    pub frame_offset: usize,
    pub event: NoteEvent,
}

impl TimedNoteEvent {
    pub fn new(frame_offset: usize, event: NoteEvent) -> Self {
        Self {
            frame_offset,
            event,
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct VoiceSlot {
    started_at: u64,
    released_at: Option<u64>,
}

// -------------------------------------------------------------------------------------------------

/// Dispatches notes to a fixed set of voices which all play a single shared sound.
///
/// The sound is held as a basedrop [`Owned`] value, so replacing it never frees memory in
/// the audio thread.
pub struct Synthesizer<V: Voice> {
    voices: Vec<V>,
    slots: Vec<VoiceSlot>,
    sound: Option<Owned<V::Sound>>,
    event_counter: u64,
}

impl<V: Voice> Synthesizer<V> {
    /// Create a new synthesizer with the given voices. Voices need a valid sample rate.
    pub fn new(voices: Vec<V>) -> Self {
        let slots = vec![VoiceSlot::default(); voices.len()];
        Self {
            voices,
            slots,
            sound: None,
            event_counter: 0,
        }
    }

    /// Access to all voices.
    pub fn voices(&self) -> &[V] {
        &self.voices
    }

    /// Number of voices which are playing or fading out a note.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// The currently played sound, if any.
    pub fn sound(&self) -> Option<&V::Sound> {
        self.sound.as_deref()
    }

    /// Mutable access to the currently played sound, e.g. to update its parameters.
    pub fn sound_mut(&mut self) -> Option<&mut V::Sound> {
        self.sound.as_deref_mut()
    }

    /// Replace the played sound. All voices get stopped first. Returns the old sound.
    pub fn set_sound(&mut self, sound: Owned<V::Sound>) -> Option<Owned<V::Sound>> {
        self.all_notes_off(false);
        self.sound.replace(sound)
    }

    /// Set the sample rate all voices render at.
    pub fn set_playback_sample_rate(&mut self, sample_rate: u32) -> Result<(), Error> {
        for voice in &mut self.voices {
            voice.set_playback_sample_rate(sample_rate)?;
        }
        Ok(())
    }

    /// Immediately handle the given note event.
    pub fn handle_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
            NoteEvent::NoteOff { note, velocity } => self.note_off(note, velocity),
            NoteEvent::AllNotesOff { allow_tail_off } => self.all_notes_off(allow_tail_off),
        }
    }

    /// Start a note on a free or stolen voice. Notes which are already sounding get released
    /// first. Ignored when there is no sound or the sound does not apply to the note.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        let Some(sound) = self.sound.as_deref() else {
            return;
        };
        if !sound.applies_to_note(note) {
            return;
        }
        for (voice, slot) in self.voices.iter_mut().zip(self.slots.iter_mut()) {
            if voice.current_note() == Some(note) && voice.is_key_down() {
                voice.note_off(0.0, true);
                slot.released_at = Some(self.event_counter);
                self.event_counter += 1;
            }
        }
        let Some(voice_index) = self.next_free_voice_index() else {
            return;
        };
        let voice = &mut self.voices[voice_index];
        if !voice.can_play(sound) {
            return;
        }
        if voice.is_active() {
            voice.note_off(0.0, false);
        }
        voice.note_on(note, velocity, sound, 0);
        self.slots[voice_index] = VoiceSlot {
            started_at: self.event_counter,
            released_at: None,
        };
        self.event_counter += 1;
    }

    /// Release all voices which play the given note.
    pub fn note_off(&mut self, note: u8, velocity: f32) {
        for (voice, slot) in self.voices.iter_mut().zip(self.slots.iter_mut()) {
            if voice.current_note() == Some(note) && voice.is_key_down() {
                voice.note_off(velocity, true);
                slot.released_at = Some(self.event_counter);
                self.event_counter += 1;
            }
        }
    }

    /// Release or stop all voices.
    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        for (voice, slot) in self.voices.iter_mut().zip(self.slots.iter_mut()) {
            if voice.is_active() {
                voice.note_off(0.0, allow_tail_off);
                slot.released_at = Some(self.event_counter);
            }
        }
        self.event_counter += 1;
    }

    /// Render `len` frames, starting at frame `start`, into the given output. Voices get
    /// added into the output, so clear it before when necessary.
    ///
    /// Events are applied at their frame offsets, relative to `start`, and must be sorted by
    /// offset. Events past the end of the block are applied at its end.
    pub fn render_next_block(
        &mut self,
        output: &mut AudioBuffer,
        start: usize,
        len: usize,
        events: &[TimedNoteEvent],
    ) {
        let end = start + len;
        let mut position = start;
        for timed_event in events {
            let event_position = (start + timed_event.frame_offset).clamp(position, end);
            if event_position > position {
                self.render_voices(output, position, event_position - position);
                position = event_position;
            }
            self.handle_event(timed_event.event);
        }
        if end > position {
            self.render_voices(output, position, end - position);
        }
    }

    fn render_voices(&mut self, output: &mut AudioBuffer, start: usize, len: usize) {
        let Some(sound) = self.sound.as_deref() else {
            return;
        };
        for voice in &mut self.voices {
            if voice.is_active() {
                voice.render_next_block(sound, output, start, len);
            }
        }
    }

    /// Find a free voice or steal one: the voice which got released first, else the oldest one.
    fn next_free_voice_index(&self) -> Option<usize> {
        if self.voices.is_empty() {
            return None;
        }
        // Try to find a completely free voice first
        if let Some(index) = self.voices.iter().position(|v| !v.is_active()) {
            return Some(index);
        }
        // Prioritize voices that are releasing
        let releasing = self
            .voices
            .iter()
            .zip(self.slots.iter())
            .enumerate()
            .filter(|(_, (voice, _))| !voice.is_key_down())
            .filter_map(|(index, (_, slot))| slot.released_at.map(|time| (index, time)))
            .min_by_key(|(_, time)| *time);
        if let Some((index, _)) = releasing {
            return Some(index);
        }
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.started_at)
            .map(|(index, _)| index)
    }
}

// -------------------------------------------------------------------------------------------------
