//! # Log Session
//!
//! Keeps the most recent log records in a [`RingBuffer`] and switches what is
//! shown between the full buffer and a [`FilteredView`] of it.
//!
//! Records come in either directly through [`LogSession::record`] or from a
//! channel fed by a [`CaptureLayer`](crate::trace_layer::CaptureLayer) on
//! other threads, drained on the session's own thread with
//! [`LogSession::drain`]. The session itself is single-threaded.
//!
//! ```rust
//! use ringlog::event::{LogLevel, LogRecord};
//! use ringlog::filter::RecordFilter;
//! use ringlog::session::LogSession;
//!
//! let mut session = LogSession::new(3).unwrap();
//! session.record(LogRecord::new(1, LogLevel::Info, "app", "started")).unwrap();
//! session.record(LogRecord::new(2, LogLevel::Error, "db", "connection lost")).unwrap();
//!
//! session.set_filter(Some(RecordFilter::new(Some(LogLevel::Warn), None).unwrap())).unwrap();
//! assert_eq!(session.active_len(), 1);
//!
//! session.set_filter(None).unwrap();
//! assert_eq!(session.active_len(), 2);
//! ```

mod __test__;

use crossbeam_channel::Receiver;

use crate::buffer::RingBuffer;
use crate::change::{Change, SubscriptionId};
use crate::config::SessionConfig;
use crate::error::{ConfigError, RingError};
use crate::event::{LogRecord, Shared, SharedRecord};
use crate::filter::RecordFilter;
use crate::filtered::FilteredView;

#[derive(Debug)]
pub struct LogSession {
  source: RingBuffer<SharedRecord>,
  view: Option<FilteredView<SharedRecord>>,
  filter: Option<RecordFilter>,
}

impl LogSession {
  /// Creates an unfiltered session keeping up to `capacity` records.
  pub fn new(capacity: usize) -> Result<Self, RingError> {
    Ok(Self {
      source: RingBuffer::new(capacity)?,
      view: None,
      filter: None,
    })
  }

  /// Creates a session with the capacity and initial filter from `config`.
  pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
    let mut session = Self::new(config.capacity)?;
    session.set_filter(config.filter()?)?;
    Ok(session)
  }

  /// Appends a record, evicting the oldest one when full.
  ///
  /// Returns the evicted record, if any.
  pub fn record(&mut self, record: LogRecord) -> Result<Option<SharedRecord>, RingError> {
    self.source.push_back(Shared::new(record))
  }

  /// Moves every record currently waiting in `receiver` into the session
  /// without blocking. Returns how many were taken.
  pub fn drain(&mut self, receiver: &Receiver<LogRecord>) -> Result<usize, RingError> {
    let mut taken = 0;
    for record in receiver.try_iter() {
      self.record(record)?;
      taken += 1;
    }
    if taken > 0 {
      tracing::trace!(taken, len = self.source.len(), "drained log records");
    }
    Ok(taken)
  }

  /// Removes every record.
  pub fn clear(&mut self) -> Result<(), RingError> {
    self.source.clear()
  }

  /// Installs, replaces or removes the filter.
  ///
  /// A filter that does not restrict anything is the same as `None`: the
  /// view is detached and the full buffer becomes active again. Subscribers
  /// of a detached view stop receiving changes.
  pub fn set_filter(&mut self, filter: Option<RecordFilter>) -> Result<(), RingError> {
    let filter = filter.filter(RecordFilter::is_active);

    match (&filter, self.view.take()) {
      (Some(filter), Some(view)) => {
        let outcome = view.set_predicate(&self.source, filter.clone().into_predicate());
        self.view = Some(view);
        outcome?;
      },
      (Some(filter), None) => {
        self.view = Some(FilteredView::attach(
          &mut self.source,
          filter.clone().into_predicate(),
        )?);
      },
      (None, Some(view)) => {
        view.detach(&mut self.source);
      },
      (None, None) => {},
    }

    tracing::debug!(
      filtered = filter.is_some(),
      visible = self.active_len(),
      "log session filter changed"
    );
    self.filter = filter;
    Ok(())
  }

  pub fn filter(&self) -> Option<&RecordFilter> {
    self.filter.as_ref()
  }

  pub fn is_filtered(&self) -> bool {
    self.view.is_some()
  }

  /// Number of records in the active collection.
  pub fn active_len(&self) -> usize {
    match &self.view {
      Some(view) => view.len(),
      None => self.source.len(),
    }
  }

  pub fn active_is_empty(&self) -> bool {
    self.active_len() == 0
  }

  /// The records of the active collection, oldest first.
  pub fn visible(&self) -> Vec<SharedRecord> {
    match &self.view {
      Some(view) => view.to_vec(),
      None => self.source.to_vec(),
    }
  }

  /// Every record kept by the session, ignoring the filter.
  pub fn source(&self) -> &RingBuffer<SharedRecord> {
    &self.source
  }

  /// Subscribes `f` to the changes of the active collection.
  ///
  /// The subscription lives on whichever buffer is active right now and
  /// does not follow later filter switches.
  pub fn subscribe_active<F>(&mut self, f: F) -> SubscriptionId
  where
    F: FnMut(&mut RingBuffer<SharedRecord>, &Change<'_, SharedRecord>) + 'static,
  {
    match &self.view {
      Some(view) => view.subscribe_fn(f),
      None => self.source.subscribe_fn(f),
    }
  }
}
