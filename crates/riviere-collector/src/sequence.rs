use std::fmt;
use std::iter::FusedIterator;
use std::ops::BitOr;

use crate::segment::{Chain, Segment};

/// Traversal properties advertised by a [`Sequence`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristics(u8);

impl Characteristics {
    /// Elements are encountered in a defined order.
    pub const ORDERED: Self = Self(1);
    /// The element count is known exactly before traversal.
    pub const SIZED: Self = Self(1 << 1);
    /// The source cannot be modified during traversal.
    pub const IMMUTABLE: Self = Self(1 << 2);
    /// The traversal can be split into independent sub-ranges.
    pub const SPLITTABLE: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Characteristics {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Characteristics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ORDERED, "ORDERED"),
            (Self::SIZED, "SIZED"),
            (Self::IMMUTABLE, "IMMUTABLE"),
            (Self::SPLITTABLE, "SPLITTABLE"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in names {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Ordered, read-only view over the elements of a built
/// [`Collector`](crate::Collector).
///
/// Elements come out in chain order, then in reservation order within each
/// segment. The element count is fixed when the view is created, so
/// [`estimate_size`](Self::estimate_size) is exact and never changes.
/// Traversal is single-pass and cannot be split.
pub struct Sequence<'a, T> {
    segment: Option<&'a Segment<T>>,
    index: usize,
    remaining: usize,
    size: usize,
    segments: usize,
}

impl<'a, T> Sequence<'a, T> {
    /// Create a view rooted at `head`. Only called once the owning
    /// collector has entered the built state.
    pub(crate) fn new(head: &'a Segment<T>) -> Self {
        let (size, segments) = Chain::new(head)
            .fold((0, 0), |(size, segments), segment| (size + segment.len(), segments + 1));
        Self {
            segment: Some(head),
            index: 0,
            remaining: size,
            size,
            segments,
        }
    }

    /// Pull the next element, or `None` once the view is exhausted.
    pub fn try_advance(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            self.segment = None;
            return None;
        }
        loop {
            let segment = self.segment?;
            if self.index < segment.len() {
                // SAFETY: `index` is below the reserved length of a segment
                // that lives as long as the borrowed collector.
                let item = unsafe { segment.read_slot(self.index) };
                self.index += 1;
                self.remaining -= 1;
                return Some(item);
            }
            let next = segment.next_ptr();
            // SAFETY: linked segments are owned by the chain and outlive `'a`.
            self.segment = unsafe { next.as_ref() };
            self.index = 0;
        }
    }

    /// Total number of elements in the view.
    pub fn estimate_size(&self) -> usize {
        self.size
    }

    /// Number of segments the elements are spread across.
    pub fn segment_count(&self) -> usize {
        self.segments
    }

    pub fn characteristics(&self) -> Characteristics {
        Characteristics::ORDERED | Characteristics::SIZED | Characteristics::IMMUTABLE
    }

    /// Always `None`: traversal is strictly sequential.
    pub fn try_split(&mut self) -> Option<Self> {
        None
    }
}

impl<'a, T> Iterator for Sequence<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.try_advance()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Sequence<'_, T> {}

impl<T> FusedIterator for Sequence<'_, T> {}

impl<T> fmt::Debug for Sequence<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("size", &self.size)
            .field("remaining", &self.remaining)
            .field("segments", &self.segments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Characteristics, Collector};

    #[test]
    fn empty_sequence_is_exhausted_immediately() {
        let collector = Collector::<u32>::new();
        let mut seq = collector.build().unwrap();
        assert_eq!(seq.estimate_size(), 0);
        assert_eq!(seq.try_advance(), None);
        assert_eq!(seq.try_advance(), None);
        assert_eq!(seq.segment_count(), 1);
    }

    #[test]
    fn size_hint_tracks_consumption() {
        let collector = Collector::with_capacity(2).unwrap();
        for i in 0..5 {
            collector.add(i).unwrap();
        }
        let mut seq = collector.build().unwrap();
        assert_eq!(seq.len(), 5);
        seq.next();
        seq.next();
        assert_eq!(seq.len(), 3);
        // The estimate is the size of the whole view, not what is left.
        assert_eq!(seq.estimate_size(), 5);
        assert_eq!(seq.copied().collect::<Vec<_>>(), [2, 3, 4]);
    }

    #[test]
    fn walks_across_segments_in_order() {
        let collector = Collector::with_capacity(1).unwrap();
        for i in 0..10 {
            collector.add(i).unwrap();
        }
        let seq = collector.build().unwrap();
        // 1 + 2 + 4 + 8 slots.
        assert_eq!(seq.segment_count(), 4);
        assert_eq!(seq.copied().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn advertises_ordered_sized_immutable_only() {
        let collector = Collector::<u8>::new();
        let mut seq = collector.build().unwrap();
        let flags = seq.characteristics();
        assert!(flags.contains(Characteristics::ORDERED));
        assert!(flags.contains(Characteristics::SIZED));
        assert!(flags.contains(Characteristics::IMMUTABLE));
        assert!(!flags.contains(Characteristics::SPLITTABLE));
        assert!(seq.try_split().is_none());
    }

    #[test]
    fn characteristics_debug_lists_flags() {
        let flags = Characteristics::ORDERED | Characteristics::SIZED;
        assert_eq!(format!("{flags:?}"), "{ORDERED, SIZED}");
        assert_eq!(format!("{:?}", Characteristics::empty()), "{}");
    }
}
