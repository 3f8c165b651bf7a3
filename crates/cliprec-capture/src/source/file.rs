//! File-backed source factory.

use super::{
    audio_handle, file_stem, midi_handle, AudioSourceHandle, MidiSourceHandle, SmfMidiSource,
    SourceFactory, TakeInfo, WavFileSource,
};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Creates one WAV per channel and one SMF per take inside a directory.
///
/// - `<dir>/<processor>-take<N>-ch<M>.wav`
/// - `<dir>/<processor>-take<N>.mid`
#[derive(Debug, Clone)]
pub struct FileTakeFactory {
    dir: PathBuf,
    sample_rate: f64,
}

impl FileTakeFactory {
    pub fn new(dir: impl Into<PathBuf>, sample_rate: f64) -> Self {
        Self {
            dir: dir.into(),
            sample_rate,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn audio_path(&self, take: &TakeInfo, channel: usize) -> PathBuf {
        self.dir.join(format!(
            "{}-take{}-ch{}.wav",
            file_stem(&take.processor),
            take.take,
            channel
        ))
    }

    pub fn midi_path(&self, take: &TakeInfo) -> PathBuf {
        self.dir
            .join(format!("{}-take{}.mid", file_stem(&take.processor), take.take))
    }
}

impl SourceFactory for FileTakeFactory {
    fn audio_source(&self, take: &TakeInfo, channel: usize) -> Result<AudioSourceHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let source = WavFileSource::create(self.audio_path(take, channel), self.sample_rate)?;
        Ok(audio_handle(source))
    }

    fn midi_source(&self, take: &TakeInfo) -> Result<MidiSourceHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let source = SmfMidiSource::create(self.midi_path(take), self.sample_rate)?;
        Ok(midi_handle(source))
    }
}
