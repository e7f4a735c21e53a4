//! Fixed-capacity receive log shared between the receive thread and its readers.
//!
//! The ring is a passive circular log, not a queue: one writer appends bytes at the cursor and
//! publishes the new cursor, any number of readers take snapshots and diff cursor values to find
//! data that arrived since they last looked. Nothing is ever consumed.
//!
//! Readers that fall more than one full lap behind the writer lose the overwritten data. A cursor
//! that moved backwards between two observations means the writer crossed the end of the buffer.
//! The writer also publishes the running total of bytes written, and the cursor is that total
//! modulo the capacity, so a reader holding a previous total can tell an exact lap from no data
//! and can detect overwritten data.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::error::{Error, Result};

/// Circular byte store with an atomically published write position.
///
/// The buffer has a single writer. Bytes are stored before the running total is released, so a
/// reader that acquires a total also observes every byte that precedes it.
pub struct RingBuffer {
    data: Box<[AtomicU8]>,
    total: AtomicU64,
}

impl RingBuffer {
    /// Allocates a zero-filled ring of `capacity` bytes.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("receive buffer capacity must be non-zero"));
        }

        let data = (0..capacity).map(|_| AtomicU8::new(0)).collect::<Vec<_>>();

        Ok(RingBuffer {
            data: data.into_boxed_slice(),
            total: AtomicU64::new(0),
        })
    }

    /// Number of bytes the ring holds.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Index of the next write position.
    pub fn cursor(&self) -> usize {
        self.cursor_for(self.total())
    }

    /// Bytes written since the ring was created. Grows past the capacity.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    fn cursor_for(&self, total: u64) -> usize {
        (total % self.data.len() as u64) as usize
    }

    /// A view of the whole backing store, regardless of how much has been written.
    pub fn buffer(&self) -> ReceiveBuffer<'_> {
        ReceiveBuffer { data: &self.data }
    }

    /// The backing store together with the current cursor.
    ///
    /// Safe to call while a write is in progress: the cursor is either the value from before the
    /// write or the one after it, and all bytes before it are visible.
    pub fn snapshot(&self) -> (ReceiveBuffer<'_>, usize) {
        let cursor = self.cursor();
        (self.buffer(), cursor)
    }

    /// Like `snapshot()`, with the running total in place of the cursor.
    pub fn snapshot_total(&self) -> (ReceiveBuffer<'_>, u64) {
        let total = self.total();
        (self.buffer(), total)
    }

    /// Appends `bytes` at the cursor, wrapping to index 0 at the end, and publishes the new
    /// position once. Returns the new cursor.
    ///
    /// Must only be called from one thread at a time.
    pub fn write_region(&self, bytes: &[u8]) -> usize {
        let len = self.data.len();

        // only the writer stores the total, so its own last store is current
        let total = self.total.load(Ordering::Relaxed);
        let mut cursor = self.cursor_for(total);

        for &byte in bytes {
            self.data[cursor].store(byte, Ordering::Relaxed);
            cursor = (cursor + 1) % len;
        }

        self.total.store(total + bytes.len() as u64, Ordering::Release);
        cursor
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("total", &self.total())
            .finish()
    }
}

/// Borrowed, non-copying view of a ring's backing store.
///
/// Bytes may change underneath the view as the writer laps the ring; only the range behind a
/// cursor obtained with `RingBuffer::cursor()` is stable until the writer comes around again.
#[derive(Copy, Clone)]
pub struct ReceiveBuffer<'a> {
    data: &'a [AtomicU8],
}

impl<'a> ReceiveBuffer<'a> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).map(|b| b.load(Ordering::Relaxed))
    }

    /// Appends the circular range `[start, end)` to `out` and returns how many bytes were copied.
    ///
    /// `end < start` is read as a wraparound: `[start, len)` followed by `[0, end)`.
    /// `start == end` copies nothing.
    pub fn copy_range(&self, start: usize, end: usize, out: &mut Vec<u8>) -> usize {
        let len = self.data.len();
        let start = start % len;
        let end = end % len;

        let before = out.len();

        if end >= start {
            out.extend(self.data[start..end].iter().map(|b| b.load(Ordering::Relaxed)));
        } else {
            out.extend(self.data[start..].iter().map(|b| b.load(Ordering::Relaxed)));
            out.extend(self.data[..end].iter().map(|b| b.load(Ordering::Relaxed)));
        }

        out.len() - before
    }

    /// Appends one full lap starting at `start`: `[start, len)` followed by `[0, start)`. Returns
    /// the buffer's length.
    pub fn copy_lap(&self, start: usize, out: &mut Vec<u8>) -> usize {
        let start = start % self.data.len();

        out.extend(self.data[start..].iter().map(|b| b.load(Ordering::Relaxed)));
        out.extend(self.data[..start].iter().map(|b| b.load(Ordering::Relaxed)));

        self.data.len()
    }

    /// Copies the whole backing store.
    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + 'a {
        self.data.iter().map(|b| b.load(Ordering::Relaxed))
    }
}

impl<'a> fmt::Debug for ReceiveBuffer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Result of reading a ring with `CursorTracker::read_total()`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Received {
    /// Bytes appended to the output.
    pub count: usize,

    /// More than a full ring of data arrived since the previous read, so the oldest of it was
    /// overwritten before it could be read. Only the newest lap was returned.
    pub overrun: bool,
}

/// Consumer-side bookkeeping for reading a ring by cursor diffs.
///
/// Holds the position seen on the previous read. `read_new()` works from cursors alone and
/// reconstructs a single wraparound as two segments. `read_total()` works from running totals,
/// which also tells an exact full lap apart from no data and reports overwritten data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CursorTracker {
    cursor: usize,
    received: u64,
}

impl CursorTracker {
    /// Starts tracking from `cursor`; data before it is treated as already seen.
    pub fn new(cursor: usize) -> Self {
        CursorTracker { cursor, received: 0 }
    }

    /// Starts tracking from a running total taken from a ring of `capacity` bytes.
    pub fn from_total(total: u64, capacity: usize) -> Self {
        CursorTracker {
            cursor: (total % capacity as u64) as usize,
            received: total,
        }
    }

    /// Cursor observed on the last read.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Running total observed on the last read, or the bytes read so far for a tracker that
    /// only sees cursors.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Forward distance from the last observed cursor to `cursor` in a ring of `capacity` bytes.
    pub fn pending(&self, cursor: usize, capacity: usize) -> usize {
        if cursor >= self.cursor {
            cursor - self.cursor
        } else {
            capacity - self.cursor + cursor
        }
    }

    /// Appends bytes that arrived since the last read to `out` and advances to `cursor`.
    pub fn read_new(&mut self, buffer: ReceiveBuffer<'_>, cursor: usize, out: &mut Vec<u8>) -> usize {
        let count = buffer.copy_range(self.cursor, cursor, out);
        self.cursor = cursor;
        self.received += count as u64;
        count
    }

    /// Appends bytes that arrived since the last read to `out` and advances to `total`.
    ///
    /// The tracker must have been created with `from_total()` on the same ring. If more than a
    /// full lap arrived, only the newest lap is returned and `overrun` is set.
    pub fn read_total(&mut self, buffer: ReceiveBuffer<'_>, total: u64, out: &mut Vec<u8>) -> Received {
        let capacity = buffer.len() as u64;
        let delta = total.saturating_sub(self.received);
        let cursor = (total % capacity) as usize;

        let count = if delta >= capacity {
            buffer.copy_lap(cursor, out)
        } else {
            buffer.copy_range(self.cursor, cursor, out)
        };

        self.cursor = cursor;
        self.received = total;

        Received {
            count,
            overrun: delta > capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    use crate::error::ErrorKind;

    #[test]
    fn ring_rejects_zero_capacity() {
        let err = RingBuffer::new(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn ring_starts_at_zero() {
        for capacity in &[1usize, 2, 32, 1024] {
            let ring = RingBuffer::new(*capacity).unwrap();
            let (buffer, cursor) = ring.snapshot();

            assert_eq!(cursor, 0);
            assert_eq!(buffer.len(), *capacity);
            assert!(buffer.iter().all(|b| b == 0));
        }
    }

    #[test]
    fn ring_writes_at_cursor() {
        let ring = RingBuffer::new(8).unwrap();

        assert_eq!(ring.write_region(b"abc"), 3);
        assert_eq!(ring.write_region(b"de"), 5);
        assert_eq!(&ring.buffer().to_vec()[..5], b"abcde");
    }

    #[test]
    fn ring_wraps_to_start() {
        let ring = RingBuffer::new(4).unwrap();

        ring.write_region(b"abc");
        assert_eq!(ring.write_region(b"def"), 2);
        assert_eq!(ring.buffer().to_vec(), b"efcd");
    }

    #[test]
    fn ring_of_one_byte_keeps_cursor_at_zero() {
        let ring = RingBuffer::new(1).unwrap();

        assert_eq!(ring.write_region(b"xyz"), 0);
        assert_eq!(ring.buffer().get(0), Some(b'z'));
    }

    #[test]
    fn empty_write_keeps_cursor() {
        let ring = RingBuffer::new(4).unwrap();
        ring.write_region(b"ab");

        assert_eq!(ring.write_region(&[]), 2);
        assert_eq!(ring.cursor(), 2);
    }

    #[test]
    fn consecutive_snapshots_are_equal() {
        let ring = RingBuffer::new(16).unwrap();
        ring.write_region(b"hello");

        let (_, first) = ring.snapshot();
        let (_, second) = ring.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn copy_range_handles_wraparound() {
        let ring = RingBuffer::new(6).unwrap();
        ring.write_region(b"012345");
        let buffer = ring.buffer();

        let mut out = Vec::new();
        assert_eq!(buffer.copy_range(4, 2, &mut out), 4);
        assert_eq!(out, b"4501");

        out.clear();
        assert_eq!(buffer.copy_range(3, 3, &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn tracker_reads_forward_delta() {
        let ring = RingBuffer::new(16).unwrap();
        let mut tracker = CursorTracker::new(ring.cursor());

        ring.write_region(b"hello");
        let (buffer, cursor) = ring.snapshot();

        let mut out = Vec::new();
        assert_eq!(tracker.pending(cursor, buffer.len()), 5);
        assert_eq!(tracker.read_new(buffer, cursor, &mut out), 5);
        assert_eq!(out, b"hello");
        assert_eq!(tracker.cursor(), 5);
    }

    #[test]
    fn tracker_reconstructs_one_wraparound() {
        let ring = RingBuffer::new(8).unwrap();
        ring.write_region(b"abcdef");

        let mut tracker = CursorTracker::new(ring.cursor());
        ring.write_region(b"ghijk");

        let (buffer, cursor) = ring.snapshot();
        assert!(cursor < tracker.cursor());

        let mut out = Vec::new();
        assert_eq!(tracker.read_new(buffer, cursor, &mut out), 5);
        assert_eq!(out, b"ghijk");
    }

    #[test]
    fn tracker_returns_exact_full_lap() {
        let ring = RingBuffer::new(8).unwrap();
        ring.write_region(b"xyz");

        let mut tracker = CursorTracker::from_total(ring.total(), ring.capacity());
        ring.write_region(b"ABCDEFGH");
        assert_eq!(ring.cursor(), tracker.cursor());

        let (buffer, total) = ring.snapshot_total();
        let mut out = Vec::new();
        assert_eq!(tracker.read_total(buffer, total, &mut out), Received { count: 8, overrun: false });
        assert_eq!(out, b"ABCDEFGH");
    }

    #[test]
    fn tracker_reports_no_data_when_total_unchanged() {
        let ring = RingBuffer::new(8).unwrap();
        ring.write_region(b"abc");

        let mut tracker = CursorTracker::from_total(ring.total(), ring.capacity());
        let (buffer, total) = ring.snapshot_total();

        let mut out = Vec::new();
        assert_eq!(tracker.read_total(buffer, total, &mut out), Received { count: 0, overrun: false });
        assert!(out.is_empty());
    }

    #[test]
    fn tracker_keeps_newest_lap_after_overrun() {
        let ring = RingBuffer::new(8).unwrap();
        let mut tracker = CursorTracker::from_total(ring.total(), ring.capacity());

        ring.write_region(b"0123456789ab");

        let (buffer, total) = ring.snapshot_total();
        let mut out = Vec::new();
        assert_eq!(tracker.read_total(buffer, total, &mut out), Received { count: 8, overrun: true });
        assert_eq!(out, b"456789ab");
        assert_eq!(tracker.received(), 12);
    }

    #[test]
    fn tracker_counts_chunks_across_wrap_without_overrun() {
        let ring = RingBuffer::new(8).unwrap();
        let mut tracker = CursorTracker::from_total(ring.total(), ring.capacity());
        let mut out = Vec::new();

        ring.write_region(b"01234");
        let (buffer, total) = ring.snapshot_total();
        assert_eq!(tracker.read_total(buffer, total, &mut out), Received { count: 5, overrun: false });

        ring.write_region(b"5678");
        let (buffer, total) = ring.snapshot_total();
        assert_eq!(tracker.read_total(buffer, total, &mut out), Received { count: 4, overrun: false });
        assert_eq!(out, b"012345678");
    }

    #[test]
    fn reader_sees_bytes_behind_published_cursor() {
        let ring = Arc::new(RingBuffer::new(64).unwrap());
        let writer_ring = Arc::clone(&ring);

        let writer = thread::spawn(move || {
            for chunk in 0..200u32 {
                let bytes: Vec<u8> = (0..7).map(|i| ((chunk * 7 + i) % 251) as u8).collect();
                writer_ring.write_region(&bytes);
            }
        });

        for _ in 0..1000 {
            let (buffer, cursor) = ring.snapshot();
            assert!(cursor < buffer.len());
        }

        writer.join().unwrap();

        let (buffer, cursor) = ring.snapshot();
        assert_eq!(cursor, (200 * 7) % 64);
        assert_eq!(ring.total(), 200 * 7);

        let last = (cursor + buffer.len() - 1) % buffer.len();
        assert_eq!(buffer.get(last), Some(((200 * 7 - 1) % 251) as u8));
    }
}
