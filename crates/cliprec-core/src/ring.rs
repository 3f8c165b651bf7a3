//! Lock-free sample ring buffers for the capture path.
//!
//! One [`SampleRing`] per recorded channel. The audio thread owns the [`RingWriter`],
//! the disk writer owns the [`RingReader`], and either side (or anyone else) can hold a
//! [`RingObserver`] for occupancy queries.
//!
//! Access goes through [`RwVector`]s: up to two contiguous segments, split at the
//! physical end of the storage. Producers copy into the write vector and then publish
//! with [`RingWriter::increment_write_ptr`]; consumers take the read vector, hand the
//! segments to storage and free them with [`RingReader::increment_read_ptr`].

use crate::error::{Error, Result};
use crate::{Arc, AtomicU64, Ordering, Sample};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

/// A contiguous region of ring storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Segment {
    /// Physical offset into the ring storage.
    pub offset: usize,
    /// Length in frames.
    pub len: usize,
}

impl Segment {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Transient two-segment view of a ring's readable or writable region.
///
/// Only valid until the next cursor movement on the side that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwVector {
    pub segments: [Segment; 2],
}

impl RwVector {
    #[inline]
    pub fn first(&self) -> Segment {
        self.segments[0]
    }

    #[inline]
    pub fn second(&self) -> Segment {
        self.segments[1]
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.segments[0].len + self.segments[1].len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// How `frames` would be split across the two segments.
    ///
    /// Returns `None` if they do not fit.
    #[inline]
    pub fn split(&self, frames: usize) -> Option<(usize, usize)> {
        if frames > self.total() {
            return None;
        }
        let first = frames.min(self.segments[0].len);
        Some((first, frames - first))
    }
}

/// Published/consumed frame totals, shared by both halves.
#[derive(Debug)]
struct Cursors {
    capacity: usize,
    written: AtomicU64,
    read: AtomicU64,
}

impl Cursors {
    #[inline]
    fn occupied(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let written = self.written.load(Ordering::Acquire);
        (written.wrapping_sub(read) as usize).min(self.capacity)
    }

    #[inline]
    fn write_offset(&self) -> usize {
        (self.written.load(Ordering::Acquire) % self.capacity as u64) as usize
    }

    #[inline]
    fn read_offset(&self) -> usize {
        (self.read.load(Ordering::Acquire) % self.capacity as u64) as usize
    }
}

/// Ring buffer factory.
pub struct SampleRing;

impl SampleRing {
    #[allow(clippy::new_ret_no_self)]
    pub fn with_capacity(frames: usize) -> Result<(RingWriter, RingReader)> {
        if frames == 0 {
            return Err(Error::InvalidCapacity(frames));
        }

        let rb = HeapRb::<Sample>::new(frames);
        let (prod, cons) = rb.split();

        let cursors = Arc::new(Cursors {
            capacity: frames,
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
        });

        let writer = RingWriter {
            prod,
            cursors: Arc::clone(&cursors),
            staged: 0,
        };
        let reader = RingReader { cons, cursors };

        Ok((writer, reader))
    }
}

/// Producer half, owned by the audio thread.
pub struct RingWriter {
    prod: HeapProd<Sample>,
    cursors: Arc<Cursors>,
    /// Frames copied into the write vector but not yet published.
    staged: usize,
}

impl RingWriter {
    /// Free space ahead of the write pointer.
    pub fn get_write_vector(&self) -> RwVector {
        let (first, second) = self.prod.vacant_slices();
        RwVector {
            segments: [
                Segment {
                    offset: self.cursors.write_offset(),
                    len: first.len(),
                },
                Segment {
                    offset: 0,
                    len: second.len(),
                },
            ],
        }
    }

    /// Copy `incoming` into the write vector, first segment then second.
    ///
    /// Nothing becomes visible to the reader until [`increment_write_ptr`]. Returns the
    /// number of frames staged, which is less than `incoming.len()` only if the ring is
    /// too full.
    ///
    /// [`increment_write_ptr`]: RingWriter::increment_write_ptr
    #[inline]
    pub fn stage(&mut self, incoming: &[Sample]) -> usize {
        let (first, second) = self.prod.vacant_slices_mut();

        let head = incoming.len().min(first.len());
        for (slot, &sample) in first[..head].iter_mut().zip(&incoming[..head]) {
            slot.write(sample);
        }

        let rest = &incoming[head..];
        let tail = rest.len().min(second.len());
        for (slot, &sample) in second[..tail].iter_mut().zip(&rest[..tail]) {
            slot.write(sample);
        }

        self.staged = head + tail;
        self.staged
    }

    /// Publish `frames` staged frames to the reader.
    ///
    /// Clamped to what was staged; returns the number actually published.
    #[inline]
    pub fn increment_write_ptr(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.staged);
        if frames == 0 {
            return 0;
        }
        // SAFETY: the `frames` slots after the write index were initialized by `stage`
        // and the write index has not moved since.
        unsafe { self.prod.advance_write_index(frames) };
        self.staged -= frames;
        self.cursors
            .written
            .fetch_add(frames as u64, Ordering::Release);
        frames
    }

    /// All-or-nothing write. On overrun the write cursor is left untouched.
    #[inline]
    pub fn push(&mut self, incoming: &[Sample]) -> Result<usize> {
        let available = self.prod.vacant_len();
        if incoming.len() > available {
            return Err(Error::Overrun {
                requested: incoming.len(),
                available,
            });
        }
        let staged = self.stage(incoming);
        Ok(self.increment_write_ptr(staged))
    }

    #[inline]
    pub fn read_space(&self) -> usize {
        self.prod.occupied_len()
    }

    #[inline]
    pub fn write_space(&self) -> usize {
        self.prod.vacant_len()
    }

    #[inline]
    pub fn bufsize(&self) -> usize {
        self.cursors.capacity
    }

    pub fn observer(&self) -> RingObserver {
        RingObserver {
            cursors: Arc::clone(&self.cursors),
        }
    }
}

/// Consumer half, owned by the disk writer.
pub struct RingReader {
    cons: HeapCons<Sample>,
    cursors: Arc<Cursors>,
}

impl RingReader {
    /// Readable region, oldest frames first.
    pub fn get_read_vector(&self) -> RwVector {
        let (first, second) = self.cons.as_slices();
        RwVector {
            segments: [
                Segment {
                    offset: self.cursors.read_offset(),
                    len: first.len(),
                },
                Segment {
                    offset: 0,
                    len: second.len(),
                },
            ],
        }
    }

    /// The samples behind [`get_read_vector`](RingReader::get_read_vector).
    #[inline]
    pub fn read_segments(&self) -> (&[Sample], &[Sample]) {
        self.cons.as_slices()
    }

    /// Free `frames` from the front of the ring. Clamped to the readable amount.
    pub fn increment_read_ptr(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.cons.occupied_len());
        if frames == 0 {
            return 0;
        }
        // SAFETY: `frames` does not exceed the occupied length, and f32 needs no drop.
        unsafe { self.cons.advance_read_index(frames) };
        self.cursors.read.fetch_add(frames as u64, Ordering::Release);
        frames
    }

    /// Discard everything readable.
    pub fn clear(&mut self) -> usize {
        let occupied = self.cons.occupied_len();
        self.increment_read_ptr(occupied)
    }

    #[inline]
    pub fn read_space(&self) -> usize {
        self.cons.occupied_len()
    }

    #[inline]
    pub fn write_space(&self) -> usize {
        self.cons.vacant_len()
    }

    #[inline]
    pub fn bufsize(&self) -> usize {
        self.cursors.capacity
    }

    pub fn observer(&self) -> RingObserver {
        RingObserver {
            cursors: Arc::clone(&self.cursors),
        }
    }
}

/// Lock-free occupancy view of a ring. May be stale by the time it is read.
#[derive(Debug, Clone)]
pub struct RingObserver {
    cursors: Arc<Cursors>,
}

impl RingObserver {
    #[inline]
    pub fn read_space(&self) -> usize {
        self.cursors.occupied()
    }

    #[inline]
    pub fn write_space(&self) -> usize {
        self.cursors.capacity - self.cursors.occupied()
    }

    #[inline]
    pub fn bufsize(&self) -> usize {
        self.cursors.capacity
    }

    /// Fraction of the ring that is free, 0.0 (full) to 1.0 (empty).
    #[inline]
    pub fn free_fraction(&self) -> f32 {
        (self.write_space() as f64 / self.bufsize() as f64) as f32
    }
}
