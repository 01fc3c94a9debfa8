pub mod adsr;
pub mod buffer;

// -------------------------------------------------------------------------------------------------

/// Equal tempered playback speed ratio for the given semitone distance.
pub fn speed_from_semitones(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Playback speed ratio which plays a sample recorded at `root_note` and `source_rate` at the
/// given MIDI note in the host's `target_rate`.
pub fn speed_from_note(note: i32, root_note: i32, source_rate: u32, target_rate: u32) -> f64 {
    if target_rate == 0 {
        return 0.0;
    }
    speed_from_semitones((note - root_note) as f64) * source_rate as f64 / target_rate as f64
}

// -------------------------------------------------------------------------------------------------
