//! Concurrent log line buffering on top of `riviere-collector`.
//!
//! Request handlers running on a thread pool call [`LogBuffer::log`] without
//! contending on a lock; at shutdown [`LogBuffer::flush`] writes every line
//! to disk in collection order.

pub mod buffer;
pub mod error;

pub use buffer::{LogBuffer, LogConfig};
pub use error::{LogError, Result};
