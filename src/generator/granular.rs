//! Granular playback: grain envelopes, flux sequencing, grain sounds and voices.

mod envelope;
mod flux;
mod sound;
mod voice;

pub use envelope::{EnvelopeShape, WavetableEnvelope};
pub use flux::{FluxDirection, FluxMode, FluxState};
pub use sound::{GrainSound, KeyCount, MemorySampleReader, MidiNoteMask, PlayMode, SampleReader};
pub use voice::GrainVoice;
