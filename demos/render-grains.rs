//! Renders a short granular note sequence from a synthesized sample into a wav file.

use std::path::PathBuf;

use arg::{parse_args, Args};
use hound::{SampleFormat, WavSpec, WavWriter};

use grainflux::{
    generators::{KeyCount, MemorySampleReader, NoteEvent, PlayMode, TimedNoteEvent},
    utils::buffer::AudioBuffer,
    GrainProcessor, SharedParameters,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const SAMPLE_RATE: u32 = 44100;
const BLOCK_SIZE: usize = 512;

/// Length of a single note step in blocks.
const STEP_BLOCKS: usize = 40;
/// Played notes. `None` steps release all notes.
const NOTES: [Option<u8>; 8] = [
    Some(60),
    Some(67),
    None,
    Some(63),
    Some(72),
    Some(58),
    None,
    Some(60),
];

const DEFAULT_OUTPUT_PATH: &str = "grains.wav";
const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

// -------------------------------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "o", long = "output")]
    /// Write rendered grains into the given wav file. By default \"grains.wav\".
    output_path: Option<PathBuf>,
    #[arg(short = "p", long = "position-mode")]
    /// Let notes select grain slots instead of the playback pitch.
    position_mode: bool,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

/// Two second stereo test sample: a falling sine sweep with a slowly detuned right channel.
fn synthesize_sample() -> Vec<Vec<f32>> {
    let frames = 2 * SAMPLE_RATE as usize;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    let (mut phase_left, mut phase_right) = (0.0_f32, 0.0_f32);
    for frame in 0..frames {
        let t = frame as f32 / frames as f32;
        let frequency = 880.0 - 660.0 * t;
        phase_left += frequency / SAMPLE_RATE as f32;
        phase_right += frequency * (1.0 + 0.01 * t) / SAMPLE_RATE as f32;
        left.push((phase_left.fract() * std::f32::consts::TAU).sin() * 0.5);
        right.push((phase_right.fract() * std::f32::consts::TAU).sin() * 0.5);
    }
    vec![left, right]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments and init logger
    let args = parse_args::<Arguments>();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()?;

    // Create processor and load the sample
    let (mut processor, mut handle) = GrainProcessor::new(SAMPLE_RATE)?;
    let mut reader = MemorySampleReader::new(SAMPLE_RATE, synthesize_sample())?;
    handle.load_sample("sweep", &mut reader)?;

    // Configure grains
    let play_mode = if args.position_mode {
        PlayMode::Position
    } else {
        PlayMode::Pitch
    };
    handle.set_parameter(SharedParameters::PLAY_MODE.value_update(play_mode))?;
    handle.set_parameter(SharedParameters::KEY_COUNT.value_update(KeyCount::Keys24))?;
    handle.set_parameter(SharedParameters::DURATION.value_update(0.04))?;
    handle.set_parameter(SharedParameters::SPREAD.value_update(0.5))?;
    handle.set_parameter(SharedParameters::ENVELOPE_SHAPE.value_update(0.3))?;
    handle.set_parameter(SharedParameters::FLUX_ZIGZAG.value_update(true))?;
    handle.set_parameter(SharedParameters::FLUX_RANGE.value_update(0.5))?;

    // Render note steps
    let output_path = args
        .output_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output_path, spec)?;

    let mut output = AudioBuffer::new(2, BLOCK_SIZE);
    let mut interleaved = vec![0.0; 2 * BLOCK_SIZE];
    let mut events = Vec::with_capacity(2);

    for (step, note) in NOTES.iter().chain([None].iter()).enumerate() {
        for block in 0..STEP_BLOCKS {
            events.clear();
            if block == 0 {
                events.push(TimedNoteEvent::new(
                    0,
                    NoteEvent::AllNotesOff {
                        allow_tail_off: true,
                    },
                ));
                if let Some(note) = note {
                    events.push(TimedNoteEvent::new(
                        BLOCK_SIZE / 2,
                        NoteEvent::NoteOn {
                            note: *note,
                            velocity: 0.8,
                        },
                    ));
                }
            }
            if block == STEP_BLOCKS / 2 {
                // morph the envelope shape while the note plays
                let shape = (step as f32 / NOTES.len() as f32).min(1.0);
                handle.set_parameter(SharedParameters::ENVELOPE_SHAPE.value_update(shape))?;
            }

            #[cfg(not(feature = "assert-allocs"))]
            processor.process(&mut output, &events);
            #[cfg(feature = "assert-allocs")]
            assert_no_alloc::assert_no_alloc(|| processor.process(&mut output, &events));

            output.copy_to_interleaved(&mut interleaved);
            for sample in &interleaved {
                writer.write_sample(*sample)?;
            }
        }
        handle.collect_garbage();
    }
    writer.finalize()?;

    log::info!("Wrote rendered grains to '{}'", output_path.display());
    Ok(())
}
