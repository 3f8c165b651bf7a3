//! Min/max peak summaries for recorded audio.

use crate::error::Result;
use cliprec_core::Sample;
use std::path::Path;

/// Frames summarized by one peak entry.
pub const DEFAULT_PEAK_BLOCK: usize = 256;

/// Running min/max summary, one `(min, max)` pair per block of frames.
#[derive(Debug, Clone)]
pub struct PeakSummary {
    block: usize,
    peaks: Vec<(f32, f32)>,
    current: Option<(f32, f32)>,
    in_block: usize,
}

impl Default for PeakSummary {
    fn default() -> Self {
        Self::new(DEFAULT_PEAK_BLOCK)
    }
}

impl PeakSummary {
    pub fn new(block: usize) -> Self {
        Self {
            block: block.max(1),
            peaks: Vec::new(),
            current: None,
            in_block: 0,
        }
    }

    pub fn push(&mut self, samples: &[Sample]) {
        for &sample in samples {
            let (lo, hi) = self.current.get_or_insert((sample, sample));
            *lo = lo.min(sample);
            *hi = hi.max(sample);
            self.in_block += 1;
            if self.in_block == self.block {
                self.close_block();
            }
        }
    }

    /// Close the trailing partial block, if any.
    pub fn finish(&mut self) {
        self.close_block();
    }

    fn close_block(&mut self) {
        if let Some(peak) = self.current.take() {
            self.peaks.push(peak);
        }
        self.in_block = 0;
    }

    pub fn peaks(&self) -> &[(f32, f32)] {
        &self.peaks
    }

    pub fn block(&self) -> usize {
        self.block
    }

    /// Little-endian `f32` min/max pairs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.peaks.len() * 8);
        for (lo, hi) in &self.peaks {
            bytes.extend_from_slice(&lo.to_le_bytes());
            bytes.extend_from_slice(&hi.to_le_bytes());
        }
        bytes
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

/// Read a peak file written by [`PeakSummary::write_to`].
pub fn read_peak_file(path: &Path) -> Result<Vec<(f32, f32)>> {
    let bytes = std::fs::read(path)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|pair| {
            let lo = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
            let hi = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
            (lo, hi)
        })
        .collect())
}
