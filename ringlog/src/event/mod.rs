
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Defines the severity or importance level of a record.
///
/// The levels are ordered from the most detailed to the most severe:
/// `Trace < Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
  /// Very detailed information, mostly useful for debugging
  Trace,
  /// Debug-level information, used for development or troubleshooting
  Debug,
  /// General informational messages, typically useful in production
  Info,
  /// Warning messages that indicate potential issues
  Warn,
  /// Error messages that indicate a failure or critical problem
  Error,
}

impl LogLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogLevel::Trace => "TRACE",
      LogLevel::Debug => "DEBUG",
      LogLevel::Info => "INFO",
      LogLevel::Warn => "WARN",
      LogLevel::Error => "ERROR",
    }
  }
}

impl From<&tracing::Level> for LogLevel {
  fn from(level: &tracing::Level) -> Self {
    match *level {
      tracing::Level::TRACE => LogLevel::Trace,
      tracing::Level::DEBUG => LogLevel::Debug,
      tracing::Level::INFO => LogLevel::Info,
      tracing::Level::WARN => LogLevel::Warn,
      tracing::Level::ERROR => LogLevel::Error,
    }
  }
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One captured log line.
///
/// `LogRecord` is what a log session keeps in its ring buffer, wrapped in
/// [`Shared`] so that every record has its own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
  /// Milliseconds since the Unix epoch.
  pub timestamp: u64,

  /// Severity of the record.
  pub level: LogLevel,

  /// Module path or component that produced the record.
  pub target: String,

  /// The rendered message, including any structured fields.
  pub message: String,
}

impl LogRecord {
  /// Creates a new `LogRecord` with the provided values.
  ///
  /// # Example
  ///
  /// ```rust
  /// use ringlog::event::{LogLevel, LogRecord};
  /// let record = LogRecord::new(1_692_105_600_000, LogLevel::Info, "auth", "User logged in");
  /// assert_eq!(record.level, LogLevel::Info);
  /// ```
  pub fn new(timestamp: u64, level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      timestamp,
      level,
      target: target.into(),
      message: message.into(),
    }
  }

  /// Creates a record stamped with the current time.
  pub fn now(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(Utc::now().timestamp_millis() as u64, level, target, message)
  }

  /// Serializes the record into a JSON string.
  ///
  /// # Example
  ///
  /// ```rust
  /// use ringlog::event::{LogLevel, LogRecord};
  /// let record = LogRecord::new(123, LogLevel::Warn, "main", "Hello");
  /// let json = record.to_json().unwrap();
  /// assert!(json.contains("\"timestamp\":123"));
  /// assert!(json.contains("\"level\":\"WARN\""));
  /// ```
  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }

  /// Parses a record from its JSON form.
  pub fn from_json(json: &str) -> serde_json::Result<Self> {
    serde_json::from_str(json)
  }
}

impl fmt::Display for LogRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}: {}", self.level, self.target, self.message)
  }
}

/// Reference-counted item compared by identity.
///
/// Two `Shared` values are equal only if they point at the same allocation,
/// whatever their contents. This is the element type to use when a
/// [`FilteredView`](crate::filtered::FilteredView) has to tell apart items
/// whose contents may repeat, such as log records.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<T>);

impl<T> Shared<T> {
  pub fn new(value: T) -> Self {
    Self(Arc::new(value))
  }

  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    Arc::ptr_eq(&this.0, &other.0)
  }

  pub fn into_inner(self) -> Arc<T> {
    self.0
  }
}

impl<T> Clone for Shared<T> {
  fn clone(&self) -> Self {
    Self(Arc::clone(&self.0))
  }
}

impl<T> PartialEq for Shared<T> {
  fn eq(&self, other: &Self) -> bool {
    Shared::ptr_eq(self, other)
  }
}

impl<T> Eq for Shared<T> {}

impl<T> Deref for Shared<T> {
  type Target = T;

  fn deref(&self) -> &T {
    &self.0
  }
}

impl<T> From<T> for Shared<T> {
  fn from(value: T) -> Self {
    Self::new(value)
  }
}

impl<T: fmt::Display> fmt::Display for Shared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl<T: Serialize> Serialize for Shared<T> {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.0.serialize(serializer)
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Shared<T> {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    T::deserialize(deserializer).map(Shared::new)
  }
}

/// Records as stored by a log session.
pub type SharedRecord = Shared<LogRecord>;
