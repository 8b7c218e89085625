//! Lock-free single-producer/single-consumer byte ring buffer.
//!
//! One slot is always left empty so that `read == write` means empty, which makes
//! `available_to_read() + available_to_write() == capacity - 1` hold at all times.
//! The producer publishes its index with `Release` after copying, the consumer loads
//! it with `Acquire` before copying, so every byte below the published index is visible.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Capacities must be a multiple of this.
pub const RING_ALIGNMENT: usize = 256;

/// Cache-line aligned index so producer and consumer don't false-share.
#[derive(Debug, Default)]
#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

struct Shared {
    data: *mut u8,
    capacity: usize,
    write_idx: PaddedIndex,
    read_idx: PaddedIndex,
}

// SAFETY: the producer only writes bytes in the free region and the consumer only
// reads bytes in the filled region; the regions are handed over through the
// acquire/release index stores, so no byte is accessed by both sides at once.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn available_to_write(&self) -> usize {
        let read = self.read_idx.0.load(Ordering::Acquire);
        let write = self.write_idx.0.load(Ordering::Acquire);
        (self.capacity + read - write - 1) % self.capacity
    }

    #[inline]
    fn available_to_read(&self) -> usize {
        let read = self.read_idx.0.load(Ordering::Acquire);
        let write = self.write_idx.0.load(Ordering::Acquire);
        (self.capacity + write - read) % self.capacity
    }

    /// Copies `src` in at `idx`, wrapping at the end. Returns the next index.
    ///
    /// # Safety
    /// Caller must be the producer and `src.len()` must fit in the free region.
    #[inline]
    unsafe fn copy_in(&self, idx: usize, src: &[u8]) -> usize {
        let len = src.len();
        let first = len.min(self.capacity - idx);
        ptr::copy_nonoverlapping(src.as_ptr(), self.data.add(idx), first);
        ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data, len - first);
        (idx + len) % self.capacity
    }

    /// # Safety
    /// Same as [`Shared::copy_in`].
    #[inline]
    unsafe fn fill(&self, idx: usize, value: u8, len: usize) -> usize {
        let first = len.min(self.capacity - idx);
        ptr::write_bytes(self.data.add(idx), value, first);
        ptr::write_bytes(self.data, value, len - first);
        (idx + len) % self.capacity
    }

    /// # Safety
    /// Caller must be the consumer and `dest.len()` must fit in the filled region.
    #[inline]
    unsafe fn copy_out(&self, idx: usize, dest: &mut [u8]) -> usize {
        let len = dest.len();
        let first = len.min(self.capacity - idx);
        ptr::copy_nonoverlapping(self.data.add(idx), dest.as_mut_ptr(), first);
        ptr::copy_nonoverlapping(self.data, dest.as_mut_ptr().add(first), len - first);
        (idx + len) % self.capacity
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // SAFETY: `data` came from `Box::into_raw` of a slice of exactly `capacity` bytes.
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.data,
                self.capacity,
            )));
        }
    }
}

/// Fixed-capacity byte ring buffer, split into a [`Producer`] and a [`Consumer`].
///
/// # Example
/// ```
/// use tessera_core::RingBuffer;
///
/// let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
/// producer.write(&[b"hello ", b"world"]).unwrap();
///
/// let mut out = [0u8; 11];
/// consumer.read(&mut out).unwrap();
/// assert_eq!(&out, b"hello world");
/// ```
pub struct RingBuffer {
    shared: Arc<Shared>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity % RING_ALIGNMENT != 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        let data = Box::into_raw(vec![0u8; capacity].into_boxed_slice()) as *mut u8;
        Ok(Self {
            shared: Arc::new(Shared {
                data,
                capacity,
                write_idx: PaddedIndex::default(),
                read_idx: PaddedIndex::default(),
            }),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn split(self) -> (Producer, Consumer) {
        (
            Producer {
                shared: self.shared.clone(),
            },
            Consumer {
                shared: self.shared,
            },
        )
    }
}

/// Writer half. Owned by exactly one thread at a time.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Lower bound while the consumer is reading concurrently.
    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.shared.available_to_write()
    }

    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.shared.available_to_read()
    }

    /// Writes all `sources` back to back, or nothing at all.
    ///
    /// Never blocks and never allocates.
    pub fn write(&mut self, sources: &[&[u8]]) -> Result<()> {
        let requested: usize = sources.iter().map(|s| s.len()).sum();
        let available = self.available_to_write();
        if requested > available {
            return Err(Error::InsufficientSpace {
                requested,
                available,
            });
        }

        let mut idx = self.shared.write_idx.0.load(Ordering::Relaxed);
        for src in sources {
            // SAFETY: we are the only producer and the total fits in the free region.
            idx = unsafe { self.shared.copy_in(idx, src) };
        }
        self.shared.write_idx.0.store(idx, Ordering::Release);
        Ok(())
    }

    /// Writes `len` copies of `value`, or nothing at all.
    pub fn write_fill(&mut self, value: u8, len: usize) -> Result<()> {
        let available = self.available_to_write();
        if len > available {
            return Err(Error::InsufficientSpace {
                requested: len,
                available,
            });
        }
        let idx = self.shared.write_idx.0.load(Ordering::Relaxed);
        // SAFETY: as in `write`.
        let idx = unsafe { self.shared.fill(idx, value, len) };
        self.shared.write_idx.0.store(idx, Ordering::Release);
        Ok(())
    }

    /// Resets both indices.
    ///
    /// Requiring both halves mutably guarantees nobody is reading or writing.
    pub fn clear(&mut self, consumer: &mut Consumer) {
        debug_assert!(Arc::ptr_eq(&self.shared, &consumer.shared));
        self.shared.read_idx.0.store(0, Ordering::Release);
        self.shared.write_idx.0.store(0, Ordering::Release);
    }
}

/// Reader half. Owned by exactly one thread at a time.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.shared.available_to_write()
    }

    /// Upper bound on what a concurrent producer has not yet published.
    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.shared.available_to_read()
    }

    /// Reads exactly `dest.len()` bytes, or nothing at all.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<()> {
        if dest.is_empty() {
            return Ok(());
        }
        // The acquire load of the write index here makes the producer's bytes visible.
        let available = self.available_to_read();
        if dest.len() > available {
            return Err(Error::InsufficientData {
                requested: dest.len(),
                available,
            });
        }
        let idx = self.shared.read_idx.0.load(Ordering::Relaxed);
        // SAFETY: we are the only consumer and `dest` fits in the filled region.
        let idx = unsafe { self.shared.copy_out(idx, dest) };
        self.shared.read_idx.0.store(idx, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capacity_must_be_aligned() {
        assert!(RingBuffer::new(0).is_err());
        assert!(RingBuffer::new(100).is_err());
        assert!(RingBuffer::new(512).is_ok());
    }

    #[test]
    fn test_full_buffer_rejects_one_more_byte() {
        let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
        producer.write(&[&[7u8; 255]]).unwrap();
        assert_eq!(producer.available_to_write(), 0);
        assert_eq!(consumer.available_to_read(), 255);

        assert_eq!(
            producer.write(&[&[1u8]]),
            Err(Error::InsufficientSpace {
                requested: 1,
                available: 0
            })
        );
        assert_eq!(consumer.available_to_read(), 255);

        let mut out = [0u8; 255];
        consumer.read(&mut out).unwrap();
        assert!(out.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_multi_source_write_is_all_or_nothing() {
        let (mut producer, consumer) = RingBuffer::new(256).unwrap().split();
        producer.write(&[&[0u8; 200]]).unwrap();
        assert!(producer.write(&[&[1u8; 40], &[2u8; 40]]).is_err());
        assert_eq!(consumer.available_to_read(), 200);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
        let mut scratch = [0u8; 200];
        producer.write(&[&[0u8; 200]]).unwrap();
        consumer.read(&mut scratch).unwrap();

        let payload: Vec<u8> = (0..150u8).collect();
        producer.write(&[&payload[..70], &payload[70..]]).unwrap();
        let mut out = vec![0u8; 150];
        consumer.read(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_read_more_than_available_fails() {
        let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
        producer.write(&[b"abc"]).unwrap();
        let mut out = [0u8; 4];
        assert!(consumer.read(&mut out).is_err());
        assert_eq!(consumer.available_to_read(), 3);
    }

    #[test]
    fn test_write_fill_and_clear() {
        let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
        producer.write_fill(0xaa, 10).unwrap();
        assert_eq!(consumer.available_to_read(), 10);
        producer.clear(&mut consumer);
        assert_eq!(consumer.available_to_read(), 0);
        assert_eq!(producer.available_to_write(), 255);
    }

    #[test]
    fn test_spsc_threads_preserve_stream() {
        let (mut producer, mut consumer) = RingBuffer::new(1024).unwrap().split();
        const TOTAL: usize = 100_000;

        let writer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let chunk: Vec<u8> = (next..(next + 13).min(TOTAL)).map(|i| i as u8).collect();
                if producer.write(&[&chunk]).is_ok() {
                    next += chunk.len();
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = 0usize;
        let mut buf = vec![0u8; 1024];
        while received < TOTAL {
            let n = consumer.available_to_read();
            if n == 0 {
                std::thread::yield_now();
                continue;
            }
            consumer.read(&mut buf[..n]).unwrap();
            for &b in &buf[..n] {
                assert_eq!(b, received as u8);
                received += 1;
            }
        }
        writer.join().unwrap();
    }

    proptest! {
        #[test]
        fn round_trip_concatenates_writes(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
            offset in 0usize..512,
        ) {
            let (mut producer, mut consumer) = RingBuffer::new(512).unwrap().split();
            // Move the indices so writes land across the wrap point.
            producer.write_fill(0, offset.min(511)).unwrap();
            let mut skip = vec![0u8; offset.min(511)];
            consumer.read(&mut skip).unwrap();

            let total: usize = chunks.iter().map(Vec::len).sum();
            prop_assume!(total <= producer.available_to_write());

            let sources: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
            producer.write(&sources).unwrap();

            let mut out = vec![0u8; total];
            consumer.read(&mut out).unwrap();
            prop_assert_eq!(out, chunks.concat());
        }

        #[test]
        fn available_counts_sum_to_capacity_minus_one(
            ops in prop::collection::vec((any::<bool>(), 0usize..300), 0..64),
        ) {
            let (mut producer, mut consumer) = RingBuffer::new(256).unwrap().split();
            let mut scratch = vec![0u8; 300];
            for (is_write, len) in ops {
                let before = consumer.available_to_read();
                if is_write {
                    let ok = producer.write_fill(1, len).is_ok();
                    let expected = if ok { before + len } else { before };
                    prop_assert_eq!(consumer.available_to_read(), expected);
                } else {
                    let _ = consumer.read(&mut scratch[..len]);
                }
                prop_assert_eq!(
                    producer.available_to_write() + consumer.available_to_read(),
                    255
                );
            }
        }
    }
}
