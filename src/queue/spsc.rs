//! Lock-free single-producer/single-consumer ring channel.
//!
//! The network thread pushes engine events, the compute thread pops them.
//! Both operations are wait-free: one acquire load, one release store, no
//! CAS loops. Per-slot sequence numbers carry the full/empty state, so the
//! producer and consumer never write to each other's index.
//!
//! The producer/consumer split is enforced by ownership: `channel()` hands
//! out exactly one [`Producer`] and one [`Consumer`], neither of which is
//! cloneable.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pads an atomic index to its own cache line so the producer's tail and the
/// consumer's head never false-share.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct Slot<T> {
    /// Slot state: `== pos` means writable by the producer at `pos`,
    /// `== pos + 1` means readable by the consumer at `pos`.
    sequence: AtomicUsize,
    storage: UnsafeCell<MaybeUninit<T>>,
}

struct Ring<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    head: CacheAligned<AtomicUsize>,
    tail: CacheAligned<AtomicUsize>,
}

// The ring hands each value from exactly one thread to exactly one other;
// T itself never needs Sync.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "spsc capacity must be non-zero");
        assert!(
            capacity.is_power_of_two(),
            "spsc capacity must be a power of two, got {capacity}"
        );

        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                storage: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            slots,
            mask: capacity - 1,
            head: CacheAligned(AtomicUsize::new(0)),
            tail: CacheAligned(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn len_approx(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Exclusive access here: drop whatever is still queued.
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        for pos in head..tail {
            let slot = &self.slots[pos & self.mask];
            if slot.sequence.load(Ordering::Relaxed) == pos.wrapping_add(1) {
                unsafe {
                    (*slot.storage.get()).assume_init_drop();
                }
            }
        }
    }
}

/// The push side of the channel. Exactly one exists per channel.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

/// The pop side of the channel. Exactly one exists per channel.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

unsafe impl<T: Send> Send for Producer<T> {}
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Producer<T> {
    /// Push a value, or hand it back when the ring is full.
    ///
    /// Never blocks. The caller is expected to drop (and count) the value on
    /// `Err`; the stream is recoverable, a later sequence gap resyncs.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let pos = ring.tail.0.load(Ordering::Relaxed);
        let slot = &ring.slots[pos & ring.mask];

        if slot.sequence.load(Ordering::Acquire) != pos {
            return Err(value);
        }

        unsafe {
            (*slot.storage.get()).write(value);
        }

        // Publishes the write above to the consumer's matching acquire.
        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
        ring.tail.0.store(pos.wrapping_add(1), Ordering::Relaxed);
        Ok(())
    }

    /// Advisory queue depth; stale under concurrent mutation.
    #[inline]
    pub fn len_approx(&self) -> usize {
        self.ring.len_approx()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}

impl<T> Consumer<T> {
    /// Pop the oldest value, or `None` when the ring is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let pos = ring.head.0.load(Ordering::Relaxed);
        let slot = &ring.slots[pos & ring.mask];

        if slot.sequence.load(Ordering::Acquire) != pos.wrapping_add(1) {
            return None;
        }

        let value = unsafe { (*slot.storage.get()).assume_init_read() };

        // Re-arm the slot for the producer's next wrap.
        slot.sequence
            .store(pos.wrapping_add(ring.slots.len()), Ordering::Release);
        ring.head.0.store(pos.wrapping_add(1), Ordering::Relaxed);
        Some(value)
    }

    /// Advisory queue depth; stale under concurrent mutation.
    #[inline]
    pub fn len_approx(&self) -> usize {
        self.ring.len_approx()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len_approx() == 0
    }
}

/// Create a bounded SPSC channel. `capacity` must be a power of two; a bad
/// capacity is a construction-time programmer error and panics.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let ring = Arc::new(Ring::with_capacity(capacity));
    (
        Producer { ring: Arc::clone(&ring) },
        Consumer { ring },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_pop_round_trip() {
        let (mut tx, mut rx) = channel::<u64>(8);
        assert!(rx.try_pop().is_none());
        tx.try_push(42).unwrap();
        assert_eq!(rx.try_pop(), Some(42));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_move_only_payload() {
        let (mut tx, mut rx) = channel::<Box<String>>(4);
        tx.try_push(Box::new("depth".to_string())).unwrap();
        assert_eq!(*rx.try_pop().unwrap(), "depth");
    }

    #[test]
    fn test_full_returns_value() {
        let (mut tx, mut rx) = channel::<u32>(2);
        tx.try_push(1).unwrap();
        tx.try_push(2).unwrap();
        assert_eq!(tx.try_push(3), Err(3));
        assert_eq!(rx.try_pop(), Some(1));
        tx.try_push(3).unwrap();
        assert_eq!(rx.try_pop(), Some(2));
        assert_eq!(rx.try_pop(), Some(3));
    }

    #[test]
    fn test_wraps_many_times() {
        let (mut tx, mut rx) = channel::<usize>(4);
        for i in 0..1000 {
            tx.try_push(i).unwrap();
            assert_eq!(rx.try_pop(), Some(i));
        }
    }

    #[test]
    fn test_len_approx() {
        let (mut tx, mut rx) = channel::<u8>(8);
        assert!(rx.is_empty());
        tx.try_push(1).unwrap();
        tx.try_push(2).unwrap();
        assert_eq!(tx.len_approx(), 2);
        rx.try_pop();
        assert_eq!(rx.len_approx(), 1);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_non_power_of_two_capacity_panics() {
        let _ = channel::<u8>(12);
    }

    #[test]
    fn test_drops_queued_values() {
        // Leak check by proxy: Arc strong counts drop back to 1.
        let tracker = Arc::new(());
        {
            let (mut tx, _rx) = channel::<Arc<()>>(4);
            tx.try_push(Arc::clone(&tracker)).unwrap();
            tx.try_push(Arc::clone(&tracker)).unwrap();
        }
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_threaded_fifo() {
        const N: u64 = 100_000;
        let (mut tx, mut rx) = channel::<u64>(1024);

        let producer = thread::spawn(move || {
            let mut next = 0u64;
            while next < N {
                match tx.try_push(next) {
                    Ok(()) => next += 1,
                    Err(_) => thread::yield_now(),
                }
            }
        });

        let mut expected = 0u64;
        while expected < N {
            match rx.try_pop() {
                Some(v) => {
                    assert_eq!(v, expected, "FIFO order violated");
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_threaded_strings_survive_handoff() {
        const N: usize = 10_000;
        let (mut tx, mut rx) = channel::<String>(64);

        let producer = thread::spawn(move || {
            let mut i = 0;
            while i < N {
                let msg = format!("evt-{i}");
                match tx.try_push(msg) {
                    Ok(()) => i += 1,
                    Err(_) => thread::yield_now(),
                }
            }
        });

        let mut received = 0;
        while received < N {
            if let Some(v) = rx.try_pop() {
                assert_eq!(v, format!("evt-{received}"));
                received += 1;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
