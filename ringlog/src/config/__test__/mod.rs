#[cfg(test)]
mod __test__ {
  use crate::config::{SessionConfig, DEFAULT_CAPACITY, DEFAULT_CHANNEL_CAPACITY};
  use crate::error::ConfigError;
  use crate::event::LogLevel;

  #[test]
  fn test_defaults() {
    let config = SessionConfig::default();

    assert_eq!(config.capacity, DEFAULT_CAPACITY);
    assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    assert!(config.filter().unwrap().is_none());
  }

  #[test]
  fn test_empty_json_uses_defaults() {
    assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
  }

  #[test]
  fn test_full_json() {
    let config = SessionConfig::from_json(
      r#"{ "capacity": 8, "channel_capacity": 4, "min_level": "ERROR", "query": "db" }"#,
    )
    .unwrap();

    assert_eq!(config.capacity, 8);
    assert_eq!(config.channel_capacity, 4);

    let filter = config.filter().unwrap().unwrap();
    assert_eq!(filter.min_level(), Some(LogLevel::Error));
    assert_eq!(filter.query(), Some("db"));
  }

  #[test]
  fn test_invalid_json() {
    let err = SessionConfig::from_json(r#"{ "capacity": "lots" }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
    assert!(err.to_string().starts_with("invalid session configuration"));
  }

  #[test]
  fn test_unknown_level_is_rejected() {
    assert!(SessionConfig::from_json(r#"{ "min_level": "LOUD" }"#).is_err());
  }
}
