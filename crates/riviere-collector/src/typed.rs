//! Element-type instantiations.
//!
//! The collector is generic over its element type, so numeric elements are
//! stored inline in segment slots without boxing. The aliases below name the
//! common instantiations, and [`NumericSequence`] adds the terminal
//! reductions usually wanted from a built numeric sequence.

use crate::collector::Collector;
use crate::sequence::Sequence;

/// Collector of unboxed `f64` values.
pub type DoubleCollector = Collector<f64>;

/// Collector of unboxed `i64` values.
pub type LongCollector = Collector<i64>;

/// Collector of unboxed `i32` values.
pub type IntCollector = Collector<i32>;

/// Collector whose elements may be absent. Absent elements are real
/// elements: they are counted and keep their position.
pub type NullableCollector<T> = Collector<Option<T>>;

/// Primitive numeric element.
pub trait Numeric: Copy + PartialOrd + Send + Sync + 'static {
    const ZERO: Self;

    /// Sum of two values. Integers wrap on overflow.
    fn accumulate(self, other: Self) -> Self;

    fn to_f64(self) -> f64;

    /// Smaller of two values. For floats a NaN operand is ignored.
    fn min_of(self, other: Self) -> Self;

    /// Larger of two values. For floats a NaN operand is ignored.
    fn max_of(self, other: Self) -> Self;
}

macro_rules! impl_numeric_int {
    ($($ty:ty),*) => {$(
        impl Numeric for $ty {
            const ZERO: Self = 0;

            #[inline]
            fn accumulate(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn min_of(self, other: Self) -> Self {
                Ord::min(self, other)
            }

            #[inline]
            fn max_of(self, other: Self) -> Self {
                Ord::max(self, other)
            }
        }
    )*};
}

impl_numeric_int!(i32, i64);

impl Numeric for f64 {
    const ZERO: Self = 0.0;

    #[inline]
    fn accumulate(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn min_of(self, other: Self) -> Self {
        f64::min(self, other)
    }

    #[inline]
    fn max_of(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

/// Reductions over a built sequence of [`Numeric`] values. Each one consumes
/// the remaining elements.
pub trait NumericSequence<N: Numeric> {
    fn to_vec(self) -> Vec<N>;

    /// Sum of the elements; zero when none remain.
    fn total(self) -> N;

    fn minimum(self) -> Option<N>;

    fn maximum(self) -> Option<N>;

    /// Arithmetic mean, or `None` when no elements remain.
    fn average(self) -> Option<f64>;
}

impl<N: Numeric> NumericSequence<N> for Sequence<'_, N> {
    fn to_vec(self) -> Vec<N> {
        self.copied().collect()
    }

    fn total(self) -> N {
        self.fold(N::ZERO, |acc, &n| acc.accumulate(n))
    }

    fn minimum(self) -> Option<N> {
        self.copied().reduce(N::min_of)
    }

    fn maximum(self) -> Option<N> {
        self.copied().reduce(N::max_of)
    }

    fn average(self) -> Option<f64> {
        let (count, total) = self.fold((0usize, 0.0f64), |(count, total), &n| {
            (count + 1, total + n.to_f64())
        });
        (count > 0).then(|| total / count as f64)
    }
}
