#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod error;
mod generator;
mod parameter;
mod processor;

// public, flat re-exports
pub use error::Error;

pub use processor::{
    GrainProcessor, GrainProcessorHandle, ParameterSnapshot, ProcessorMessage, SharedParameters,
    VoicePositions,
};

// public mods
pub mod utils;

pub mod generators {
    //! Polyphonic voice dispatch and the granular sound and voice implementations.

    pub use super::generator::{
        granular::{
            EnvelopeShape, FluxDirection, FluxMode, FluxState, GrainSound, GrainVoice, KeyCount,
            MemorySampleReader, MidiNoteMask, PlayMode, SampleReader, WavetableEnvelope,
        },
        NoteEvent, Sound, Synthesizer, TimedNoteEvent, Voice,
    };
}

pub mod parameters {
    //! Parameter descriptors and value updates of the grain processor.

    pub use super::parameter::{
        BooleanParameter, EnumParameter, FloatParameter, IntegerParameter, Parameter,
        ParameterScaling, ParameterType, ParameterValueUpdate,
    };
}
