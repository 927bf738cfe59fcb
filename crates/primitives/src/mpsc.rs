//! Multi-producer/single-consumer lock-free ring queue.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Slot<T> {
    /// Monotone turn counter gating slot ownership: equal to the producer's
    /// ticket when writable, ticket + 1 when readable, ticket + capacity
    /// once recycled.
    turn: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPSC ring.
///
/// Producers claim a ticket by CAS-incrementing the shared head; winning
/// the CAS grants exclusive write access to that slot, published by
/// advancing the slot's turn. The single consumer reads slots in ticket
/// order and recycles them by bumping the turn a full lap ahead.
///
/// Contract: any number of threads may call [`push`](Self::push); at most
/// one thread calls [`pop`](Self::pop).
pub struct MpscQueue<T> {
    mask: usize,
    capacity: usize,
    slots: Box<[Slot<T>]>,
    head: CachePadded<AtomicUsize>,
    /// Consumer-private; atomic only so the queue stays `Sync`.
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> MpscQueue<T> {
    /// Creates a ring with `capacity` slots, all usable.
    ///
    /// # Panics
    /// If `capacity` is zero or not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity > 0,
            "capacity must be a power of two"
        );
        let slots = (0..capacity)
            .map(|i| Slot {
                turn: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            mask: capacity - 1,
            capacity,
            slots,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueues `item`; returns it back if the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head & self.mask];
            let turn = slot.turn.load(Ordering::Acquire);
            if turn == head {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(item) };
                        slot.turn.store(head.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => head = current,
                }
            } else if turn < head {
                // Slot still holds an unconsumed lap: the queue is full.
                return Err(item);
            } else {
                // Another producer is mid-claim; re-read the head.
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeues the oldest item, if any. Single consumer only.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail & self.mask];
        let turn = slot.turn.load(Ordering::Acquire);
        if turn != tail.wrapping_add(1) {
            return None;
        }
        let item = unsafe { (*slot.value.get()).assume_init_read() };
        slot.turn
            .store(tail.wrapping_add(self.capacity), Ordering::Release);
        self.tail.store(tail.wrapping_add(1), Ordering::Relaxed);
        Some(item)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }

    /// Approximate occupancy.
    #[must_use]
    pub fn len_approx(&self) -> usize {
        self.head
            .load(Ordering::Relaxed)
            .wrapping_sub(self.tail.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
