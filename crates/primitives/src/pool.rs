//! Fixed-count object pool with lock-free recycling.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const NIL: u32 = u32::MAX;

struct PoolShared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Free-list links, indexed by slot.
    next: Box<[AtomicU64]>,
    /// Packed `(tag << 32) | head_index`; the tag defeats ABA on the
    /// free-list head.
    head: AtomicU64,
    available: AtomicUsize,
    fallbacks: AtomicU64,
}

unsafe impl<T: Send> Send for PoolShared<T> {}
unsafe impl<T: Send> Sync for PoolShared<T> {}

impl<T> PoolShared<T> {
    fn pop_free(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let idx = (head & 0xFFFF_FFFF) as u32;
            if idx == NIL {
                return None;
            }
            let next = self.next[idx as usize].load(Ordering::Relaxed) & 0xFFFF_FFFF;
            let tag = (head >> 32).wrapping_add(1);
            let new = (tag << 32) | next;
            match self
                .head
                .compare_exchange_weak(head, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.available.fetch_sub(1, Ordering::Relaxed);
                    return Some(idx);
                }
                Err(current) => head = current,
            }
        }
    }

    fn push_free(&self, idx: u32) {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            self.next[idx as usize].store(u64::from(head as u32), Ordering::Relaxed);
            let tag = (head >> 32).wrapping_add(1);
            let new = (tag << 32) | u64::from(idx);
            match self
                .head
                .compare_exchange_weak(head, new, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.available.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(current) => head = current,
            }
        }
    }
}

/// Pre-allocated pool of `T` slots.
///
/// [`create`](Self::create) hands out owning [`Pooled`] handles; dropping a
/// handle returns its slot. When every slot is in flight the pool falls
/// back to a heap allocation (counted, never `None`), so hot paths always
/// get an object.
pub struct ObjectPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ObjectPool<T> {
    /// Creates a pool of `capacity` slots.
    ///
    /// # Panics
    /// If `capacity` is zero or does not fit a `u32` index.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity < NIL as usize, "bad pool capacity");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        // Link slot i -> i + 1, terminated with NIL.
        let next = (0..capacity)
            .map(|i| {
                let link = if i + 1 < capacity { (i + 1) as u32 } else { NIL };
                AtomicU64::new(u64::from(link))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shared: Arc::new(PoolShared {
                slots,
                next,
                head: AtomicU64::new(0),
                available: AtomicUsize::new(capacity),
                fallbacks: AtomicU64::new(0),
            }),
        }
    }

    /// Takes a slot and moves `value` into it; heap-allocates when the pool
    /// is exhausted.
    #[must_use]
    pub fn create(&self, value: T) -> Pooled<T> {
        match self.shared.pop_free() {
            Some(idx) => {
                unsafe { (*self.shared.slots[idx as usize].get()).write(value) };
                Pooled {
                    inner: PooledInner::Slot {
                        shared: Arc::clone(&self.shared),
                        idx,
                    },
                }
            }
            None => {
                self.shared.fallbacks.fetch_add(1, Ordering::Relaxed);
                Pooled {
                    inner: PooledInner::Heap(Box::new(value)),
                }
            }
        }
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.available.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Heap allocations served after exhaustion.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.shared.fallbacks.load(Ordering::Relaxed)
    }
}

enum PooledInner<T> {
    Slot { shared: Arc<PoolShared<T>>, idx: u32 },
    Heap(Box<T>),
}

/// Owning handle to a pooled (or fallback-heap) object. Dropping it returns
/// the slot to the pool.
pub struct Pooled<T> {
    inner: PooledInner<T>,
}

unsafe impl<T: Send> Send for Pooled<T> {}
unsafe impl<T: Sync> Sync for Pooled<T> {}

impl<T> Pooled<T> {
    /// False when this handle was served from the heap fallback.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(self.inner, PooledInner::Slot { .. })
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            PooledInner::Slot { shared, idx } => unsafe {
                (*shared.slots[*idx as usize].get()).assume_init_ref()
            },
            PooledInner::Heap(boxed) => boxed,
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            PooledInner::Slot { shared, idx } => unsafe {
                (*shared.slots[*idx as usize].get()).assume_init_mut()
            },
            PooledInner::Heap(boxed) => boxed,
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let PooledInner::Slot { shared, idx } = &self.inner {
            unsafe {
                std::ptr::drop_in_place((*shared.slots[*idx as usize].get()).as_mut_ptr());
            }
            shared.push_free(*idx);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_create_and_deref() {
        let pool: ObjectPool<u64> = ObjectPool::new(4);
        let mut handle = pool.create(42);
        assert_eq!(*handle, 42);
        *handle = 43;
        assert_eq!(*handle, 43);
        assert!(handle.is_pooled());
    }

    #[test]
    fn test_conservation() {
        let pool: ObjectPool<u64> = ObjectPool::new(8);
        assert_eq!(pool.available(), 8);
        let handles: Vec<_> = (0..8).map(|i| pool.create(i)).collect();
        assert_eq!(pool.available(), 0);
        drop(handles);
        assert_eq!(pool.available(), 8);
        assert_eq!(pool.fallback_count(), 0);
    }

    #[test]
    fn test_address_reuse() {
        let pool: ObjectPool<u64> = ObjectPool::new(1);
        let first = pool.create(1);
        let addr = std::ptr::from_ref::<u64>(&*first) as usize;
        drop(first);
        let second = pool.create(2);
        assert_eq!(std::ptr::from_ref::<u64>(&*second) as usize, addr);
    }

    #[test]
    fn test_heap_fallback_on_exhaustion() {
        let pool: ObjectPool<u64> = ObjectPool::new(2);
        let _a = pool.create(1);
        let _b = pool.create(2);
        let c = pool.create(3);
        assert!(!c.is_pooled());
        assert_eq!(*c, 3);
        assert_eq!(pool.fallback_count(), 1);
    }

    #[test]
    fn test_drop_runs_destructors() {
        let counter = Arc::new(AtomicUsize::new(0));
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let pool: ObjectPool<Counted> = ObjectPool::new(2);
        drop(pool.create(Counted(Arc::clone(&counter))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_concurrent_create_destroy() {
        let pool: ObjectPool<u64> = ObjectPool::new(64);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..10_000u64 {
                        let h = pool.create(t * 1_000_000 + i);
                        assert_eq!(*h, t * 1_000_000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.available(), 64);
    }
}
