use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

/// Hard ceiling on segment capacity.
///
/// Capacities double from one segment to the next; the ceiling keeps the
/// doubling from overflowing and bounds the size of a single allocation.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Capacity of the segment that follows one of `capacity` slots.
#[inline]
pub(crate) fn next_capacity(capacity: usize) -> usize {
    capacity.saturating_mul(2).min(MAX_CAPACITY)
}

/// One write-once storage position.
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Set with release ordering once `value` is initialized.
    ready: AtomicBool,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            ready: AtomicBool::new(false),
        }
    }
}

/// Fixed-capacity block in the collector's append-only chain.
///
/// `count` is bumped on every reservation attempt, including the ones that
/// land past the end, so it may exceed `capacity`. Slots below
/// `min(count, capacity)` are owned by exactly one writer each. `next` goes
/// from null to a leaked `Box<Segment<T>>` exactly once and is never reset;
/// whoever owns the head segment frees the chain.
pub(crate) struct Segment<T> {
    slots: Box<[Slot<T>]>,
    count: AtomicUsize,
    next: AtomicPtr<Segment<T>>,
}

// SAFETY: a segment only hands out `&T` to readers and moves `T` in from
// writers; every slot has a single writer enforced by `reserve_slot`.
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Send + Sync> Sync for Segment<T> {}

impl<T> Segment<T> {
    /// Allocate an empty segment.
    pub(crate) fn new(capacity: usize) -> Box<Self> {
        debug_assert!(capacity > 0 && capacity <= MAX_CAPACITY);
        let slots = (0..capacity).map(|_| Slot::empty()).collect();
        Box::new(Self {
            slots,
            count: AtomicUsize::new(0),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    /// Allocate a segment whose first slot already holds `first`.
    ///
    /// The segment is private to the caller until it is published through
    /// [`try_set_link`](Self::try_set_link), so plain stores suffice here.
    pub(crate) fn with_first(capacity: usize, first: T) -> Box<Self> {
        let mut segment = Self::new(capacity);
        let slot = &mut segment.slots[0];
        slot.value.get_mut().write(first);
        *slot.ready.get_mut() = true;
        *segment.count.get_mut() = 1;
        segment
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claim the next slot index. Indices at or past `capacity` mean the
    /// segment is full and nothing must be written.
    #[inline]
    pub(crate) fn reserve_slot(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel)
    }

    /// Store `value` into a reserved slot.
    ///
    /// # Safety
    ///
    /// `index` must have been returned by [`reserve_slot`](Self::reserve_slot)
    /// on this segment, be below `capacity`, and not have been written before.
    #[inline]
    pub(crate) unsafe fn write_slot(&self, index: usize, value: T) {
        let slot = self.slots.get_unchecked(index);
        (*slot.value.get()).write(value);
        slot.ready.store(true, Ordering::Release);
    }

    /// Borrow the value of a reserved slot, waiting for its writer if the
    /// reservation is still being filled.
    ///
    /// # Safety
    ///
    /// `index` must be below [`len`](Self::len). The returned reference is
    /// valid for as long as the segment is.
    pub(crate) unsafe fn read_slot(&self, index: usize) -> &T {
        let slot = self.slots.get_unchecked(index);
        let backoff = Backoff::new();
        while !slot.ready.load(Ordering::Acquire) {
            backoff.snooze();
        }
        (*slot.value.get()).assume_init_ref()
    }

    /// Number of reserved slots.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire).min(self.capacity())
    }

    #[inline]
    pub(crate) fn next_ptr(&self) -> *mut Segment<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Publish `next` as the successor of this segment.
    ///
    /// Succeeds at most once per segment. On failure the caller gets the
    /// segment back, untouched, for reuse or disposal.
    pub(crate) fn try_set_link(
        &self,
        next: Box<Segment<T>>,
    ) -> Result<*mut Segment<T>, Box<Segment<T>>> {
        let raw = Box::into_raw(next);
        match self
            .next
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(raw),
            // SAFETY: the exchange failed, so `raw` was never published and
            // we still hold the only pointer to it.
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }

    /// Take back the seeded first element of a segment that was never
    /// linked into a chain.
    pub(crate) fn into_first(mut self: Box<Self>) -> T {
        let slot = &mut self.slots[0];
        assert!(*slot.ready.get_mut(), "segment has no seeded element");
        *slot.ready.get_mut() = false;
        // SAFETY: `ready` was set so the value is initialized; clearing the
        // flag keeps `Drop` from dropping it a second time.
        unsafe { slot.value.get_mut().assume_init_read() }
    }
}

impl<T> fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("linked", &!self.next_ptr().is_null())
            .finish()
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        // Successors are freed by the chain owner, not recursively here.
        for slot in self.slots.iter_mut() {
            if *slot.ready.get_mut() {
                // SAFETY: `ready` is only set after the value is written.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

/// Walks a segment chain from a given segment to the last one.
pub(crate) struct Chain<'a, T> {
    current: *const Segment<T>,
    _marker: PhantomData<&'a Segment<T>>,
}

impl<'a, T> Chain<'a, T> {
    pub(crate) fn new(head: &'a Segment<T>) -> Self {
        Self {
            current: head,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Chain<'a, T> {
    type Item = &'a Segment<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        // SAFETY: segments reachable from a live head are never freed while
        // the head is borrowed.
        let segment = unsafe { &*self.current };
        self.current = segment.next_ptr();
        Some(segment)
    }
}

/// Free a chain starting at `head`, iteratively.
///
/// # Safety
///
/// `head` must come from `Box::into_raw`, every link in the chain must be
/// owned by it, and no other reference to any segment may outlive this call.
pub(crate) unsafe fn free_chain<T>(head: *mut Segment<T>) {
    let mut current = head;
    while !current.is_null() {
        let mut segment = Box::from_raw(current);
        current = *segment.next.get_mut();
        drop(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reservations_are_sequential_and_overflow_past_capacity() {
        let segment = Segment::<u32>::new(2);
        assert_eq!(segment.reserve_slot(), 0);
        assert_eq!(segment.reserve_slot(), 1);
        assert_eq!(segment.reserve_slot(), 2);
        assert_eq!(segment.reserve_slot(), 3);
        // The counter keeps counting, the visible length does not.
        assert_eq!(segment.len(), 2);
        assert_eq!(segment.capacity(), 2);
    }

    #[test]
    fn write_then_read() {
        let segment = Segment::new(4);
        for value in ["a", "b", "c"] {
            let index = segment.reserve_slot();
            unsafe { segment.write_slot(index, value.to_string()) };
        }
        assert_eq!(segment.len(), 3);
        let read: Vec<&str> = (0..segment.len())
            .map(|i| unsafe { segment.read_slot(i) }.as_str())
            .collect();
        assert_eq!(read, ["a", "b", "c"]);
    }

    #[test]
    fn seeded_segment_starts_with_one_element() {
        let segment = Segment::with_first(8, 42u64);
        assert_eq!(segment.len(), 1);
        assert_eq!(unsafe { *segment.read_slot(0) }, 42);
        assert_eq!(segment.reserve_slot(), 1);
    }

    #[test]
    fn link_is_set_once() {
        let head = Segment::<u8>::new(1);
        let first = head.try_set_link(Segment::new(2));
        assert!(first.is_ok());
        let second = head.try_set_link(Segment::with_first(2, 9));
        let rejected = second.expect_err("second link must fail");
        assert_eq!(rejected.into_first(), 9);
        assert_eq!(head.next_ptr(), first.unwrap());
        unsafe { free_chain(Box::into_raw(head)) };
    }

    #[test]
    fn next_capacity_doubles_and_saturates() {
        assert_eq!(next_capacity(1), 2);
        assert_eq!(next_capacity(16), 32);
        assert_eq!(next_capacity(MAX_CAPACITY / 2), MAX_CAPACITY);
        assert_eq!(next_capacity(MAX_CAPACITY), MAX_CAPACITY);
    }

    #[test]
    fn drop_releases_written_values_only() {
        let marker = Arc::new(());
        let segment = Segment::new(4);
        let index = segment.reserve_slot();
        unsafe { segment.write_slot(index, Arc::clone(&marker)) };
        // A reservation past a written slot that is never filled.
        segment.reserve_slot();
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(segment);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn into_first_does_not_double_drop() {
        let marker = Arc::new(());
        let segment = Segment::with_first(2, Arc::clone(&marker));
        let first = segment.into_first();
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(first);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn chain_walks_every_linked_segment() {
        let head = Segment::<u8>::new(1);
        let second = head.try_set_link(Segment::new(2)).unwrap();
        unsafe { &*second }.try_set_link(Segment::new(4)).unwrap();
        let capacities: Vec<usize> = Chain::new(&head).map(Segment::capacity).collect();
        assert_eq!(capacities, [1, 2, 4]);
        unsafe { free_chain(Box::into_raw(head)) };
    }
}
