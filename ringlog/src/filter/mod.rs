
use regex::{Regex, RegexBuilder};

use crate::event::{LogLevel, LogRecord, SharedRecord};
use crate::filtered::Predicate;

/// What a log session shows when filtering is on.
///
/// A record passes when its level is at least `min_level` and, if a query is
/// set, the query occurs in its message or its target. The query is a plain
/// substring matched case-insensitively, not a pattern.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
  min_level: Option<LogLevel>,
  query: Option<Regex>,
}

impl RecordFilter {
  /// Builds a filter. An empty query is treated as no query.
  ///
  /// # Example
  ///
  /// ```rust
  /// use ringlog::event::{LogLevel, LogRecord};
  /// use ringlog::filter::RecordFilter;
  ///
  /// let filter = RecordFilter::new(Some(LogLevel::Warn), Some("disk")).unwrap();
  /// assert!(filter.matches(&LogRecord::new(0, LogLevel::Error, "io", "Disk full")));
  /// assert!(!filter.matches(&LogRecord::new(0, LogLevel::Info, "io", "Disk full")));
  /// ```
  pub fn new(min_level: Option<LogLevel>, query: Option<&str>) -> Result<Self, regex::Error> {
    let query = match query.map(str::trim).filter(|q| !q.is_empty()) {
      Some(q) => Some(
        RegexBuilder::new(&regex::escape(q))
          .case_insensitive(true)
          .build()?,
      ),
      None => None,
    };
    Ok(Self { min_level, query })
  }

  pub fn min_level(&self) -> Option<LogLevel> {
    self.min_level
  }

  /// The query as given, regex-escaped.
  pub fn query(&self) -> Option<&str> {
    self.query.as_ref().map(Regex::as_str)
  }

  /// Whether this filter restricts anything at all.
  pub fn is_active(&self) -> bool {
    self.min_level.is_some() || self.query.is_some()
  }

  pub fn matches(&self, record: &LogRecord) -> bool {
    if self.min_level.is_some_and(|min| record.level < min) {
      return false;
    }
    match &self.query {
      Some(query) => query.is_match(&record.message) || query.is_match(&record.target),
      None => true,
    }
  }

  /// Turns the filter into a predicate over session records.
  pub fn into_predicate(self) -> Predicate<SharedRecord> {
    Box::new(move |record: &SharedRecord| self.matches(record))
  }
}
