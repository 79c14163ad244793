use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;

use super::{Sequence, WaitStrategy};
use crate::error::ConfigError;

/// Spins before the producer starts yielding on a full queue.
const PRODUCER_SPIN_TRIES: u32 = 100;

struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: i64,
    /// Highest sequence published by the producer.
    cursor: Sequence,
    /// Highest sequence the consumer has finished with.
    gating: Sequence,
    wait_strategy: Arc<dyn WaitStrategy>,
}

// SAFETY: a slot is only ever accessed by one side at a time. The producer
// writes slot `s` only after the consumer released `s - capacity`, and the
// consumer reads `s` only after the producer published it. Both hand-offs go
// through a Release store / Acquire load pair on `cursor` or `gating`.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn capacity(&self) -> i64 {
        self.mask + 1
    }

    #[inline]
    fn slot(&self, sequence: i64) -> *mut T {
        self.slots[(sequence & self.mask) as usize].get()
    }
}

/// Create a preallocated ring of `capacity` slots built by `factory`.
///
/// Returns the single producer and single consumer handles. Capacity must be
/// a non-zero power of two so that a sequence maps to its slot with a mask.
pub fn ring_buffer<T, F>(
    capacity: usize,
    mut factory: F,
    wait_strategy: Arc<dyn WaitStrategy>,
) -> Result<(Producer<T>, Consumer<T>), ConfigError>
where
    F: FnMut() -> T,
{
    if !capacity.is_power_of_two() {
        return Err(ConfigError::InvalidCapacity(capacity));
    }

    let slots: Box<[UnsafeCell<T>]> = (0..capacity)
        .map(|_| UnsafeCell::new(factory()))
        .collect();

    let shared = Arc::new(Shared {
        slots,
        mask: capacity as i64 - 1,
        cursor: Sequence::default(),
        gating: Sequence::default(),
        wait_strategy,
    });

    let producer = Producer {
        shared: Arc::clone(&shared),
        next: 0,
        cached_gating: shared.gating.get(),
    };
    let consumer = Consumer { shared, next: 0 };
    Ok((producer, consumer))
}

/// Writing side of the ring. There is exactly one per ring.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    next: i64,
    cached_gating: i64,
}

impl<T> Producer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }

    /// Claim the next slot, blocking while the ring is full.
    ///
    /// The returned guard publishes the slot when it is dropped.
    pub fn claim(&mut self) -> Claim<'_, T> {
        let wrap_point = self.next - self.shared.capacity();
        let mut spins = PRODUCER_SPIN_TRIES;
        while wrap_point > self.cached_gating {
            self.cached_gating = self.shared.gating.get();
            if wrap_point <= self.cached_gating {
                break;
            }
            if spins > 0 {
                spins -= 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
        self.take_next()
    }

    /// Claim the next slot, or `None` if the ring is full.
    pub fn try_claim(&mut self) -> Option<Claim<'_, T>> {
        let wrap_point = self.next - self.shared.capacity();
        if wrap_point > self.cached_gating {
            self.cached_gating = self.shared.gating.get();
            if wrap_point > self.cached_gating {
                return None;
            }
        }
        Some(self.take_next())
    }

    /// Slots that can be claimed without blocking right now.
    pub fn remaining_capacity(&self) -> usize {
        let in_flight = (self.next - 1) - self.shared.gating.get();
        (self.shared.capacity() - in_flight) as usize
    }

    fn take_next(&mut self) -> Claim<'_, T> {
        let sequence = self.next;
        self.next += 1;
        Claim {
            shared: &self.shared,
            sequence,
        }
    }
}

/// A claimed, not yet published slot.
///
/// Dereferences to the slot for in-place mutation. Dropping the guard
/// publishes the sequence, making the writes visible to the consumer.
pub struct Claim<'a, T> {
    shared: &'a Shared<T>,
    sequence: i64,
}

impl<T> Claim<'_, T> {
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn publish(self) {}
}

impl<T> Deref for Claim<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the slot was released by the consumer and is not yet
        // published, so the producer has exclusive access.
        unsafe { &*self.shared.slot(self.sequence) }
    }
}

impl<T> DerefMut for Claim<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `deref`.
        unsafe { &mut *self.shared.slot(self.sequence) }
    }
}

impl<T> Drop for Claim<'_, T> {
    fn drop(&mut self) {
        self.shared.cursor.set(self.sequence);
        self.shared.wait_strategy.signal_all_when_blocking();
    }
}

/// Reading side of the ring. There is exactly one per ring.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    next: i64,
}

impl<T> Consumer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }

    /// Wait for at least one published slot, then hand every available slot
    /// to `handler` in sequence order.
    ///
    /// `handler` receives the slot, its sequence and whether it is the last
    /// slot of this batch. Slots are released back to the producer once the
    /// whole batch has been handled. Returns the number of slots handled.
    pub fn process_batch<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(&T, i64, bool),
    {
        let available = self
            .shared
            .wait_strategy
            .wait_for(self.next, &self.shared.cursor);
        self.handle_up_to(available, handler)
    }

    /// Like [`process_batch`](Self::process_batch) but returns `0` instead of
    /// waiting when nothing is published.
    pub fn try_process_batch<F>(&mut self, handler: F) -> usize
    where
        F: FnMut(&T, i64, bool),
    {
        let available = self.shared.cursor.get();
        self.handle_up_to(available, handler)
    }

    fn handle_up_to<F>(&mut self, available: i64, mut handler: F) -> usize
    where
        F: FnMut(&T, i64, bool),
    {
        if available < self.next {
            return 0;
        }

        for sequence in self.next..=available {
            // SAFETY: `sequence` is published and not yet released, so the
            // producer cannot claim this slot until `gating` moves past it.
            let slot = unsafe { &*self.shared.slot(sequence) };
            handler(slot, sequence, sequence == available);
        }

        let handled = (available - self.next + 1) as usize;
        self.next = available + 1;
        self.shared.gating.set(available);
        handled
    }
}
