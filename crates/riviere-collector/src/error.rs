/// Errors produced by the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CollectorError {
    /// The collector has been built; no further elements or builds are accepted.
    #[error("collector is in built state")]
    AlreadyBuilt,

    /// A segment capacity outside `1..=max` was requested.
    #[error("invalid segment capacity {requested}: must be between 1 and {max}")]
    InvalidCapacity { requested: usize, max: usize },
}

/// Convenience alias used throughout the collector crate.
pub type Result<T> = std::result::Result<T, CollectorError>;
