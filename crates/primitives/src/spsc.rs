//! Single-producer/single-consumer lock-free ring queue.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Bounded SPSC ring.
///
/// Head and tail live on separate cache lines so the producer and consumer
/// never contend on the same line. The ring distinguishes full from empty
/// by sacrificing one slot: a queue of capacity `C` holds at most `C - 1`
/// items.
///
/// Contract: at most one thread calls [`push`](Self::push) and at most one
/// (possibly different) thread calls [`pop`](Self::pop) at any time.
pub struct SpscQueue<T> {
    mask: usize,
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Producer-owned write index; consumer reads it with acquire.
    head: CachePadded<AtomicUsize>,
    /// Consumer-owned read index; producer reads it with acquire.
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Creates a ring with `capacity` slots (`capacity - 1` usable).
    ///
    /// # Panics
    /// If `capacity` is zero or not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity > 1,
            "capacity must be a power of two > 1"
        );
        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            mask: capacity - 1,
            buf,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueues `item`; returns it back if the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & self.mask;
        if next == self.tail.load(Ordering::Acquire) {
            return Err(item);
        }
        unsafe { (*self.buf[head].get()).write(item) };
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Dequeues the oldest item, if any.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let item = unsafe { (*self.buf[tail].get()).assume_init_read() };
        self.tail.store((tail + 1) & self.mask, Ordering::Release);
        Some(item)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Approximate occupancy; exact only when both sides are quiescent.
    #[must_use]
    pub fn len_approx(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & self.mask
    }

    /// Constructed slot count; one slot is never occupied.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    #[should_panic]
    fn test_rejects_non_power_of_two() {
        let _ = SpscQueue::<u64>::new(100);
    }

    #[test]
    fn test_push_pop_fifo() {
        let q = SpscQueue::new(8);
        for i in 0..5 {
            q.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_full_at_capacity_minus_one() {
        let q = SpscQueue::new(8);
        for i in 0..7 {
            q.push(i).unwrap();
        }
        assert_eq!(q.len_approx(), 7);
        assert_eq!(q.push(99), Err(99));
        q.pop().unwrap();
        q.push(99).unwrap();
    }

    #[test]
    fn test_wrap_around() {
        let q = SpscQueue::new(4);
        for round in 0..100 {
            q.push(round).unwrap();
            q.push(round + 1000).unwrap();
            assert_eq!(q.pop(), Some(round));
            assert_eq!(q.pop(), Some(round + 1000));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_cross_thread_order_preserved() {
        const N: u64 = 100_000;
        let q = Arc::new(SpscQueue::new(1024));

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..N {
                    loop {
                        if q.push(i).is_ok() {
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut expected = 0u64;
                while expected < N {
                    if let Some(v) = q.pop() {
                        assert_eq!(v, expected);
                        expected += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
    }

    #[test]
    fn test_drop_releases_remaining_items() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        struct Counted(Arc<std::sync::atomic::AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        {
            let q = SpscQueue::new(8);
            for _ in 0..5 {
                q.push(Counted(Arc::clone(&counter))).map_err(|_| ()).unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
