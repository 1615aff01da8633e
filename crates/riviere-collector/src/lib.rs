//! Lock-free append-only collector.
//!
//! Many producer threads [`add`](Collector::add) elements through a shared
//! reference without blocking each other. One [`build`](Collector::build)
//! call freezes the collector and returns an ordered, exactly sized,
//! single-pass [`Sequence`] over everything that was added.
//!
//! # Key Types
//!
//! - [`Collector`] -- the concurrent builder and its segment chain
//! - [`Sequence`] -- read-only view produced by a successful build
//! - [`CollectorConfig`] -- head segment capacity
//! - [`CollectorError`] -- `AlreadyBuilt` and configuration failures
//!
//! # Design Rules
//!
//! 1. Producers never lock. Each slot is claimed with one atomic increment;
//!    a full segment is extended by a single compare-and-swap on its link.
//! 2. Segments are never removed, reused, or rewritten.
//! 3. Segment capacities double up to [`MAX_CAPACITY`].
//! 4. The built flag flips exactly once; afterwards every `add` and `build`
//!    fails with [`CollectorError::AlreadyBuilt`].
//! 5. Elements come out in reservation order, which respects any
//!    happens-before order between producers.

pub mod collector;
pub mod config;
pub mod error;
mod segment;
pub mod sequence;
pub mod typed;

pub use collector::Collector;
pub use config::{CollectorConfig, DEFAULT_INITIAL_CAPACITY};
pub use error::{CollectorError, Result};
pub use segment::MAX_CAPACITY;
pub use sequence::{Characteristics, Sequence};
pub use typed::{
    DoubleCollector, IntCollector, LongCollector, Numeric, NumericSequence, NullableCollector,
};

// Too slow under Miri; the collector tests cover the unsafe paths there.
#[cfg(all(test, not(miri)))]
mod proptests {
    use super::Collector;
    use proptest::prelude::*;
    use std::thread;

    proptest! {
        #[test]
        fn sequential_adds_round_trip_in_order(
            items in proptest::collection::vec(any::<Option<i64>>(), 0..300),
            capacity in 1usize..64,
        ) {
            let collector = Collector::with_capacity(capacity).unwrap();
            collector.add_all(items.iter().copied()).unwrap();
            let seq = collector.build().unwrap();
            prop_assert_eq!(seq.estimate_size(), items.len());
            prop_assert_eq!(seq.copied().collect::<Vec<_>>(), items);
        }

        #[test]
        fn concurrent_adds_keep_every_element(
            threads in 1usize..8,
            per_thread in 0usize..400,
            capacity in 1usize..32,
        ) {
            let collector = Collector::with_capacity(capacity).unwrap();
            thread::scope(|s| {
                for t in 0..threads {
                    let collector = &collector;
                    s.spawn(move || {
                        for i in 0..per_thread {
                            collector.add(t * per_thread + i).unwrap();
                        }
                    });
                }
            });
            let seq = collector.build().unwrap();
            prop_assert_eq!(seq.estimate_size(), threads * per_thread);
            let mut elements: Vec<usize> = seq.copied().collect();
            elements.sort_unstable();
            prop_assert_eq!(elements, (0..threads * per_thread).collect::<Vec<_>>());
        }
    }
}
