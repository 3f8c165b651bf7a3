//! Standard MIDI File endpoint.

use super::MidiWriteSource;
use crate::error::{Error, Result};
use midly::{
    live::LiveEvent,
    num::{u15, u24, u28},
    Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Ticks per quarter note.
pub const SMF_PPQ: u16 = 960;

/// Microseconds per quarter note (120 BPM).
pub const SMF_TEMPO_USEC: u32 = 500_000;

const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Single-track SMF written when the take completes.
///
/// Events are buffered as they arrive. Times are absolute sample positions, converted to
/// ticks at [`SMF_PPQ`] and [`SMF_TEMPO_USEC`]. Only channel voice messages are kept.
pub struct SmfMidiSource {
    name: String,
    path: PathBuf,
    sample_rate: f64,
    events: Vec<(u64, Vec<u8>)>,
    written: bool,
}

impl SmfMidiSource {
    pub fn create(path: impl AsRef<Path>, sample_rate: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail at take start rather than at finalize if the location is unusable.
        File::create(&path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            path,
            sample_rate,
            events: Vec::new(),
            written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn samples_to_ticks(&self, samples: u64) -> u64 {
        let quarters_per_second = 1_000_000.0 / f64::from(SMF_TEMPO_USEC);
        let seconds = samples as f64 / self.sample_rate;
        (seconds * quarters_per_second * f64::from(SMF_PPQ)).round() as u64
    }

    fn encode(&self) -> Result<()> {
        let mut track = Vec::with_capacity(self.events.len() + 2);
        track.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(SMF_TEMPO_USEC))),
        });

        let mut previous_tick = 0_u64;
        for (time, bytes) in &self.events {
            let live = LiveEvent::parse(bytes).map_err(|e| Error::Midi(e.to_string()))?;
            let LiveEvent::Midi { channel, message } = live else {
                continue;
            };
            let tick = self.samples_to_ticks(*time);
            let delta = tick.saturating_sub(previous_tick).min(MAX_DELTA) as u32;
            track.push(TrackEvent {
                delta: u28::from(delta),
                kind: TrackEventKind::Midi { channel, message },
            });
            previous_tick = tick;
        }

        track.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(u15::from(SMF_PPQ)),
            },
            tracks: vec![track],
        };
        smf.write_std(BufWriter::new(File::create(&self.path)?))?;
        Ok(())
    }
}

impl MidiWriteSource for SmfMidiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn midi_write(&mut self, time: u64, bytes: &[u8]) -> Result<usize> {
        if self.written {
            return Ok(0);
        }
        self.events.push((time, bytes.to_vec()));
        Ok(bytes.len())
    }

    fn mark_streaming_write_completed(&mut self) -> Result<()> {
        if self.written {
            return Ok(());
        }
        self.written = true;
        self.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::MidiMessage;

    #[test]
    fn test_writes_single_track_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.mid");

        let mut source = SmfMidiSource::create(&path, 48000.0).unwrap();
        source.midi_write(0, &[0x90, 60, 100]).unwrap();
        // 24000 samples at 48k = 0.5 s = one quarter note at 120 BPM.
        source.midi_write(24000, &[0x80, 60, 0]).unwrap();
        // Realtime message: not stored in the file.
        source.midi_write(24000, &[0xF8]).unwrap();
        source.mark_streaming_write_completed().unwrap();

        let data = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&data).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(SMF_PPQ)));
        assert_eq!(smf.tracks.len(), 1);

        let notes: Vec<_> = smf.tracks[0]
            .iter()
            .filter_map(|ev| match ev.kind {
                TrackEventKind::Midi { message, .. } => Some((ev.delta.as_int(), message)),
                _ => None,
            })
            .collect();
        assert_eq!(notes.len(), 2);
        assert!(matches!(notes[0], (0, MidiMessage::NoteOn { .. })));
        assert_eq!(notes[1].0, u32::from(SMF_PPQ));
        assert!(matches!(notes[1].1, MidiMessage::NoteOff { .. }));
    }
}
