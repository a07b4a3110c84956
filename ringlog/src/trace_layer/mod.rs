
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::event::{LogLevel, LogRecord};

const OWN_TARGET: &str = "ringlog";

/// A `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// sends them to a log session.
///
/// Sending never blocks: when the channel is full or its receiver is gone
/// the record is dropped and counted. Events emitted by this crate are
/// skipped so that a session never records its own bookkeeping.
#[derive(Debug, Clone)]
pub struct CaptureLayer {
  sender: Sender<LogRecord>,
  dropped: Arc<AtomicUsize>,
}

impl CaptureLayer {
  pub fn new(sender: Sender<LogRecord>) -> Self {
    Self {
      sender,
      dropped: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Number of records that could not be sent.
  pub fn dropped(&self) -> usize {
    self.dropped.load(Ordering::Relaxed)
  }

  fn is_own(target: &str) -> bool {
    target == OWN_TARGET || target.starts_with("ringlog::")
  }
}

impl<S> Layer<S> for CaptureLayer
where
  S: Subscriber + for<'a> LookupSpan<'a>,
{
  fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
    let metadata = event.metadata();
    if Self::is_own(metadata.target()) {
      return;
    }

    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);

    let record = LogRecord::new(
      Utc::now().timestamp_millis() as u64,
      LogLevel::from(metadata.level()),
      metadata.target(),
      visitor.finish(),
    );

    match self.sender.try_send(record) {
      Ok(()) => {},
      Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
        self.dropped.fetch_add(1, Ordering::Relaxed);
      },
    }
  }
}

/// Renders the `message` field followed by the other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
  message: String,
  fields: String,
}

impl MessageVisitor {
  fn finish(self) -> String {
    match (self.message.is_empty(), self.fields.is_empty()) {
      (_, true) => self.message,
      (true, false) => self.fields,
      (false, false) => format!("{} {}", self.message, self.fields),
    }
  }

  fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
    if !self.fields.is_empty() {
      self.fields.push(' ');
    }
    let _ = write!(self.fields, "{}={}", field.name(), value);
  }
}

impl Visit for MessageVisitor {
  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message = value.to_string();
    } else {
      self.push_field(field, format_args!("{value}"));
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    if field.name() == "message" {
      self.message = format!("{value:?}");
    } else {
      self.push_field(field, format_args!("{value:?}"));
    }
  }
}
