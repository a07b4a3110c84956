#[cfg(test)]
mod __test__ {
  use std::cell::RefCell;
  use std::rc::Rc;

  use crossbeam_channel::bounded;

  use crate::change::ChangeKind;
  use crate::config::SessionConfig;
  use crate::event::{LogLevel, LogRecord, Shared};
  use crate::filter::RecordFilter;
  use crate::session::LogSession;

  fn info(message: &str) -> LogRecord {
    LogRecord::new(0, LogLevel::Info, "app", message)
  }

  fn error(message: &str) -> LogRecord {
    LogRecord::new(0, LogLevel::Error, "app", message)
  }

  fn warn_and_up() -> Option<RecordFilter> {
    Some(RecordFilter::new(Some(LogLevel::Warn), None).unwrap())
  }

  fn messages(session: &LogSession) -> Vec<String> {
    session
      .visible()
      .iter()
      .map(|record| record.message.clone())
      .collect()
  }

  #[test]
  fn test_unfiltered_session_shows_everything() {
    let mut session = LogSession::new(2).unwrap();
    assert!(session.active_is_empty());

    session.record(info("a")).unwrap();
    session.record(error("b")).unwrap();
    let evicted = session.record(info("c")).unwrap();

    assert_eq!(evicted.map(|r| r.message.clone()), Some("a".to_string()));
    assert!(!session.is_filtered());
    assert_eq!(messages(&session), vec!["b", "c"]);
  }

  #[test]
  fn test_filter_switches_active_collection() {
    let mut session = LogSession::new(4).unwrap();
    session.record(info("a")).unwrap();
    session.record(error("b")).unwrap();

    session.set_filter(warn_and_up()).unwrap();
    assert!(session.is_filtered());
    assert_eq!(messages(&session), vec!["b"]);

    session.record(error("c")).unwrap();
    session.record(info("d")).unwrap();
    assert_eq!(session.active_len(), 2);

    session.set_filter(None).unwrap();
    assert!(!session.is_filtered());
    assert_eq!(session.active_len(), 4);
    assert_eq!(session.source().feed().subscriber_count(), 0);
  }

  #[test]
  fn test_inactive_filter_means_unfiltered() {
    let mut session = LogSession::new(4).unwrap();
    session.set_filter(Some(RecordFilter::default())).unwrap();

    assert!(!session.is_filtered());
    assert!(session.filter().is_none());
  }

  #[test]
  fn test_replacing_filter_reuses_view() {
    let mut session = LogSession::new(4).unwrap();
    session.record(info("disk ok")).unwrap();
    session.record(error("disk full")).unwrap();
    session.record(error("net down")).unwrap();

    session.set_filter(warn_and_up()).unwrap();
    session
      .set_filter(Some(RecordFilter::new(None, Some("DISK")).unwrap()))
      .unwrap();

    assert_eq!(messages(&session), vec!["disk ok", "disk full"]);
    assert_eq!(session.source().feed().subscriber_count(), 1);
  }

  #[test]
  fn test_identical_records_keep_their_identity() {
    let mut session = LogSession::new(3).unwrap();
    session.set_filter(warn_and_up()).unwrap();

    session.record(error("same")).unwrap();
    session.record(info("noise")).unwrap();
    session.record(error("same")).unwrap();
    let source = session.source().to_vec();
    let visible = session.visible();

    assert_eq!(visible.len(), 2);
    assert!(Shared::ptr_eq(&visible[0], &source[0]));
    assert!(Shared::ptr_eq(&visible[1], &source[2]));
    assert_ne!(visible[0], visible[1]);

    // Evicting the first "same" must drop exactly that one from the view
    session.record(info("more")).unwrap();
    let visible = session.visible();
    assert_eq!(visible.len(), 1);
    assert!(Shared::ptr_eq(&visible[0], &source[2]));
  }

  #[test]
  fn test_drain_takes_everything_waiting() {
    let (sender, receiver) = bounded(8);
    let mut session = LogSession::new(8).unwrap();

    std::thread::spawn(move || {
      for i in 0..5 {
        sender.send(info(&format!("m{i}"))).unwrap();
      }
    })
    .join()
    .unwrap();

    assert_eq!(session.drain(&receiver).unwrap(), 5);
    assert_eq!(session.drain(&receiver).unwrap(), 0);
    assert_eq!(messages(&session), vec!["m0", "m1", "m2", "m3", "m4"]);
  }

  #[test]
  fn test_subscribe_active_follows_current_collection() {
    let mut session = LogSession::new(4).unwrap();
    session.set_filter(warn_and_up()).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session.subscribe_active(move |_, change| sink.borrow_mut().push(change.kind()));

    session.record(info("a")).unwrap();
    session.record(error("b")).unwrap();
    session.clear().unwrap();

    assert_eq!(*seen.borrow(), vec![ChangeKind::PushBack, ChangeKind::Clear]);
  }

  #[test]
  fn test_from_config() {
    let config = SessionConfig {
      capacity: 2,
      min_level: Some(LogLevel::Error),
      ..SessionConfig::default()
    };
    let mut session = LogSession::from_config(&config).unwrap();

    session.record(info("a")).unwrap();
    session.record(error("b")).unwrap();
    session.record(error("c")).unwrap();

    assert_eq!(session.source().capacity(), 2);
    assert_eq!(messages(&session), vec!["b", "c"]);
  }

  #[test]
  fn test_from_config_rejects_zero_capacity() {
    let config = SessionConfig {
      capacity: 0,
      ..SessionConfig::default()
    };
    assert!(LogSession::from_config(&config).is_err());
  }
}
