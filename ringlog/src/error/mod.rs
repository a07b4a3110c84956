use crate::change::ChangeKind;

/// Errors raised by [`RingBuffer`](crate::buffer::RingBuffer) and the views
/// derived from it.
///
/// Every variant except [`RingError::Desynchronized`] is returned before the
/// buffer is touched, so a failed call never leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
  /// A buffer was requested with a capacity of zero.
  #[error("ring buffer capacity must be greater than 0")]
  ZeroCapacity,

  /// The initial items do not fit into the requested capacity.
  #[error("{len} initial items do not fit into a ring buffer of capacity {capacity}")]
  TooManyItems { len: usize, capacity: usize },

  /// A logical index at or past the current length.
  #[error("index {index} out of range for ring buffer of length {len}")]
  OutOfRange { index: usize, len: usize },

  /// Reading or popping an end of an empty buffer.
  #[error("ring buffer is empty")]
  Empty,

  /// A subscriber tried to mutate the buffer while a change was being
  /// delivered to two or more subscribers.
  #[error("reentrant mutation is not allowed while notifying multiple subscribers")]
  Reentrancy,

  /// A subscriber tried to mutate a buffer it may only read, such as the
  /// contents of a filtered view.
  #[error("buffer is read-only to its subscribers")]
  ReadOnly,

  /// A subscriber cannot follow this kind of change.
  #[error("{0:?} is not supported by an attached subscriber")]
  Unsupported(ChangeKind),

  /// The derived buffer of a filtered view ran out of room. This is a bug in
  /// the synchronisation, never a caller error.
  #[error("filtered view out of sync: derived buffer of capacity {capacity} is already full")]
  Desynchronized { capacity: usize },
}

/// Errors raised while building a log session from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid session configuration: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid filter query: {0}")]
  Query(#[from] regex::Error),

  #[error(transparent)]
  Ring(#[from] RingError),
}
