mod __test__;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::LogLevel;
use crate::filter::RecordFilter;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings for a [`LogSession`](crate::session::LogSession).
///
/// Every field is optional in the JSON form:
///
/// ```rust
/// use ringlog::config::SessionConfig;
/// use ringlog::event::LogLevel;
///
/// let config = SessionConfig::from_json(r#"{ "capacity": 64, "min_level": "WARN" }"#).unwrap();
/// assert_eq!(config.capacity, 64);
/// assert_eq!(config.channel_capacity, 256);
/// assert_eq!(config.min_level, Some(LogLevel::Warn));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// How many records the session keeps before evicting the oldest.
  pub capacity: usize,

  /// Bound of the channel a capture layer sends records through.
  pub channel_capacity: usize,

  /// Initial minimum level of the filter.
  pub min_level: Option<LogLevel>,

  /// Initial text query of the filter.
  pub query: Option<String>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      channel_capacity: DEFAULT_CHANNEL_CAPACITY,
      min_level: None,
      query: None,
    }
  }
}

impl SessionConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  /// The initial filter, `None` if the config does not restrict anything.
  pub fn filter(&self) -> Result<Option<RecordFilter>, ConfigError> {
    let filter = RecordFilter::new(self.min_level, self.query.as_deref())?;
    Ok(filter.is_active().then_some(filter))
  }
}
