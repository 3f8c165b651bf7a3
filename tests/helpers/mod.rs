//! Test helpers for cliprec integration tests.
//!
//! Drives a recording processor with manual cycle control, the way an audio engine
//! would, and reads recorded takes back from disk.

use cliprec::prelude::*;
use std::path::Path;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

/// Tolerance for samples that went through a 32-bit float file.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Feed `channels` (one slice per input, equal lengths) through `track` in cycles of
/// `block` frames starting at sample 0. Returns the cycle after the last one.
pub fn run_cycles(
    track: &RecordingProcessor,
    channels: &[&[f32]],
    block: usize,
    midi: &[(usize, MidiEvent)],
) -> ProcessCycle {
    let len = channels.first().map_or(0, |c| c.len());
    let mut cycle = ProcessCycle::new(0, block);
    let mut offset = 0;

    while offset < len {
        let n = block.min(len - offset);
        cycle = ProcessCycle::new(cycle.start, n);
        let inputs: Vec<&[f32]> = channels.iter().map(|c| &c[offset..offset + n]).collect();
        let events: Vec<MidiEvent> = midi
            .iter()
            .filter(|(at, _)| (offset..offset + n).contains(at))
            .map(|(at, ev)| MidiEvent::new((at - offset) as u32, ev.bytes()))
            .collect();

        track.run(&BufferSet::audio(&inputs).with_midi(&events), &cycle);
        offset += n;
        cycle = cycle.next(block);
    }
    cycle
}

/// Read a mono float WAV.
pub fn read_wav(path: &Path) -> (hound::WavSpec, Vec<f32>) {
    let mut reader = hound::WavReader::open(path).expect("open recorded wav");
    let spec = reader.spec();
    let samples = reader
        .samples::<f32>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .expect("read recorded wav");
    (spec, samples)
}

pub fn assert_samples_eq(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= FLOAT_EPSILON,
            "sample {} differs: {} vs {}",
            i,
            a,
            e
        );
    }
}
