//! WAV file endpoint.

use super::{AudioWriteSource, PeakSummary};
use crate::error::Result;
use cliprec_core::Sample;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Mono 32-bit float WAV file with a `.peak` sidecar.
pub struct WavFileSource {
    name: String,
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    peaks: PeakSummary,
    peaks_written: bool,
}

impl WavFileSource {
    pub fn create(path: impl AsRef<Path>, sample_rate: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: 1,
            sample_rate: sample_rate as u32,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::new(BufWriter::new(File::create(&path)?), spec)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            path,
            writer: Some(writer),
            peaks: PeakSummary::default(),
            peaks_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<file>.peak`
    pub fn peak_path(&self) -> PathBuf {
        let mut peak = self.path.clone().into_os_string();
        peak.push(".peak");
        PathBuf::from(peak)
    }
}

impl AudioWriteSource for WavFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, samples: &[Sample]) -> Result<usize> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };
        let written = match write_samples(writer, samples) {
            Ok(n) => n,
            Err((0, e)) => return Err(e.into()),
            Err((n, e)) => {
                warn!(file = %self.path.display(), written = n, error = %e, "short WAV write");
                n
            }
        };
        self.peaks.push(&samples[..written]);
        Ok(written)
    }

    fn mark_streaming_write_completed(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }

    fn done_with_peakfile_writes(&mut self) -> Result<()> {
        if self.peaks_written {
            return Ok(());
        }
        self.peaks_written = true;
        self.peaks.finish();
        self.peaks.write_to(&self.peak_path())
    }
}

/// Write `samples` in order. On failure, returns how many were accepted before it.
fn write_samples<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    samples: &[Sample],
) -> std::result::Result<usize, (usize, hound::Error)> {
    for (i, &sample) in samples.iter().enumerate() {
        writer.write_sample(sample).map_err(|e| (i, e))?;
    }
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::read_peak_file;
    use std::cell::Cell;
    use std::io::{self, Cursor, SeekFrom};
    use std::rc::Rc;

    /// In-memory sink that starts refusing bytes once its budget runs out.
    struct LimitedSink {
        inner: Cursor<Vec<u8>>,
        budget: Rc<Cell<Option<usize>>>,
    }

    impl Write for LimitedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(left) = self.budget.get() {
                if left < buf.len() {
                    return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
                }
                self.budget.set(Some(left - buf.len()));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for LimitedSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_failed_write_reports_accepted_prefix() {
        let budget = Rc::new(Cell::new(None));
        let sink = LimitedSink {
            inner: Cursor::new(Vec::new()),
            budget: Rc::clone(&budget),
        };
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::new(sink, spec).unwrap();

        // Room for three 32-bit samples.
        budget.set(Some(12));
        let err = write_samples(&mut writer, &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert_eq!(err.0, 3);

        budget.set(Some(0));
        assert_eq!(write_samples(&mut writer, &[5.0]).unwrap_err().0, 0);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let mut source = WavFileSource::create(&path, 48000.0).unwrap();
        let ramp: Vec<f32> = (0..600).map(|i| i as f32 / 600.0).collect();
        assert_eq!(source.write(&ramp).unwrap(), 600);
        source.mark_streaming_write_completed().unwrap();
        source.done_with_peakfile_writes().unwrap();

        // Completed: further writes are short.
        assert_eq!(source.write(&[0.0]).unwrap(), 0);

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 48000);
        let read: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(read, ramp);

        let peaks = read_peak_file(&source.peak_path()).unwrap();
        assert_eq!(peaks.len(), 3);
        approx::assert_relative_eq!(peaks[0].0, 0.0);
        approx::assert_relative_eq!(peaks[2].1, 599.0 / 600.0);
    }
}
