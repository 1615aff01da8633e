use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicBool, AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::segment::{free_chain, next_capacity, Segment};
use crate::sequence::Sequence;

/// Concurrent append-only collector.
///
/// Any number of threads may [`add`](Self::add) through a shared reference
/// without locking. A single [`build`](Self::build) call moves the collector
/// into the built state and returns the [`Sequence`] of everything added.
/// From then on `add` and `build` fail with [`CollectorError::AlreadyBuilt`].
///
/// Storage is a singly linked chain of segments whose capacities double from
/// the configured initial capacity up to
/// [`MAX_CAPACITY`](crate::MAX_CAPACITY). Producers claim slots with one
/// atomic increment; a producer that finds the last segment full links a new
/// one, already holding its element.
///
/// # Ordering
///
/// Elements appear in the order their slots were reserved. If every `add` of
/// one thread completes before another thread's first `add` (for example the
/// first thread is joined), the first thread's elements come first.
/// Otherwise the interleaving is unspecified but nothing is lost, duplicated,
/// or torn.
pub struct Collector<T> {
    /// First segment; owns the whole chain.
    head: NonNull<Segment<T>>,
    /// Some segment at or before the last one. May lag behind.
    tail: CachePadded<AtomicPtr<Segment<T>>>,
    built: CachePadded<AtomicBool>,
    _owns: PhantomData<Box<Segment<T>>>,
}

// SAFETY: producers move `T` across threads into segments, which needs only
// `T: Send`. A shared collector never exposes `&T` through `add`, `is_built`
// or `Debug`; the one successful `build` hands `&T` to its calling thread
// alone, and `Sequence` is only `Send` when `T: Sync`, so no `&T` is shared
// between threads unless `T` allows it.
unsafe impl<T: Send> Send for Collector<T> {}
unsafe impl<T: Send> Sync for Collector<T> {}

/// An element waiting to be stored, possibly already seeded into a segment
/// that lost a link race.
enum Pending<T> {
    Item(T),
    Seeded(Box<Segment<T>>),
}

impl<T> Pending<T> {
    fn into_item(self) -> T {
        match self {
            Pending::Item(item) => item,
            Pending::Seeded(segment) => segment.into_first(),
        }
    }

    /// A segment of `capacity` slots holding the pending element first.
    /// A previously seeded segment is reused when its capacity still fits.
    fn into_seeded(self, capacity: usize) -> Box<Segment<T>> {
        match self {
            Pending::Seeded(segment) if segment.capacity() == capacity => segment,
            other => Segment::with_first(capacity, other.into_item()),
        }
    }
}

impl<T> Collector<T> {
    /// Create a collector with the default head capacity.
    pub fn new() -> Self {
        Self::from_head(Segment::new(CollectorConfig::default().initial_capacity))
    }

    /// Create a collector whose head segment holds `initial_capacity` slots.
    pub fn with_capacity(initial_capacity: usize) -> Result<Self> {
        Self::with_config(&CollectorConfig::default().with_initial_capacity(initial_capacity))
    }

    pub fn with_config(config: &CollectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_head(Segment::new(config.initial_capacity)))
    }

    fn from_head(head: Box<Segment<T>>) -> Self {
        let head = NonNull::from(Box::leak(head));
        Self {
            head,
            tail: CachePadded::new(AtomicPtr::new(head.as_ptr())),
            built: CachePadded::new(AtomicBool::new(false)),
            _owns: PhantomData,
        }
    }

    fn head(&self) -> &Segment<T> {
        // SAFETY: the head is allocated in `from_head` and freed only in `drop`.
        unsafe { self.head.as_ref() }
    }

    /// Append `item`.
    ///
    /// Never blocks; under contention it retries until its reservation or
    /// link succeeds. Returns `self` so calls can be chained.
    pub fn add(&self, item: T) -> Result<&Self> {
        let mut pending = Pending::Item(item);
        // Relaxed: a fast rejection path only. Visibility comes from `build`.
        while !self.built.load(Ordering::Relaxed) {
            let tail_ptr = self.tail.load(Ordering::Acquire);
            // SAFETY: `tail` only ever points at segments of this chain,
            // which live until the collector is dropped.
            let tail = unsafe { &*tail_ptr };
            let mut next = tail.next_ptr();

            if next.is_null() {
                let index = tail.reserve_slot();
                if index < tail.capacity() {
                    // SAFETY: `index` was just reserved by this call alone.
                    unsafe { tail.write_slot(index, pending.into_item()) };
                    return Ok(self);
                }

                // Full, either already or because another producer took the
                // last slot. Try to become the one that links the successor.
                let capacity = next_capacity(tail.capacity());
                match tail.try_set_link(pending.into_seeded(capacity)) {
                    Ok(linked) => {
                        // Losing this race is fine: whoever wins also moves
                        // the tail forward.
                        let _ = self.tail.compare_exchange_weak(
                            tail_ptr,
                            linked,
                            Ordering::Release,
                            Ordering::Relaxed,
                        );
                        debug!(capacity, "linked new segment");
                        return Ok(self);
                    }
                    Err(seeded) => {
                        pending = Pending::Seeded(seeded);
                        next = tail.next_ptr();
                    }
                }
            }

            trace!("helping advance stale tail");
            let _ = self
                .tail
                .compare_exchange(tail_ptr, next, Ordering::Release, Ordering::Relaxed);
        }
        Err(CollectorError::AlreadyBuilt)
    }

    /// Append every item of `items`, stopping at the first failure.
    pub fn add_all<I>(&self, items: I) -> Result<&Self>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add(item)?;
        }
        Ok(self)
    }

    /// Move into the built state and return the view of every element.
    ///
    /// Succeeds exactly once. Every `add` that happened before this call
    /// returned is visible through the returned sequence.
    pub fn build(&self) -> Result<Sequence<'_, T>> {
        self.built
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .map_err(|_| CollectorError::AlreadyBuilt)?;
        fence(Ordering::SeqCst);

        let sequence = Sequence::new(self.head());
        debug!(
            elements = sequence.estimate_size(),
            segments = sequence.segment_count(),
            "collector built"
        );
        Ok(sequence)
    }

    /// Whether [`build`](Self::build) has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("head", self.head())
            .field("built", &self.is_built())
            .finish()
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out producers and outstanding sequences,
        // and the head was leaked from a `Box` in `from_head`.
        unsafe { free_chain(self.head.as_ptr()) };
    }
}
