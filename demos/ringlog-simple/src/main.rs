use std::{thread, time::Duration};

use crossbeam_channel::bounded;
use ringlog::config::SessionConfig;
use ringlog::error::ConfigError;
use ringlog::event::LogLevel;
use ringlog::filter::RecordFilter;
use ringlog::session::LogSession;
use ringlog::trace_layer::CaptureLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn main() -> Result<(), ConfigError> {
  // Keep the last 50 records, start with everything visible
  let config = SessionConfig::from_json(r#"{ "capacity": 50, "channel_capacity": 1000 }"#)?;
  let (sender, receiver) = bounded(config.channel_capacity);

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(LevelFilter::INFO),
    )
    .with(CaptureLayer::new(sender))
    .init();

  let mut session = LogSession::from_config(&config)?;
  session.subscribe_active(|buffer, change| {
    if let Some(record) = change.item() {
      println!("  [{:>2}] {} {}", buffer.len(), change.kind(), record);
    }
  });

  info!("Application started successfully");
  simulate_concurrent_work();
  session.drain(&receiver)?;
  println!("captured {} records", session.active_len());

  // Only warnings and errors mentioning a worker
  session.set_filter(Some(RecordFilter::new(Some(LogLevel::Warn), Some("worker"))?))?;
  println!("{} records match the filter:", session.active_len());
  for record in session.visible() {
    println!("  {record}");
  }

  // Subscribed on the filtered view: only matching records are echoed
  session.subscribe_active(|_, change| {
    if let Some(record) = change.item() {
      println!("  (filtered) {} {}", change.kind(), record);
    }
  });
  warn!("Worker 9 is running late");
  debug!("Worker 9 detail that the filter hides");
  error!("Disk almost full");
  session.drain(&receiver)?;

  session.set_filter(None)?;
  println!("filter removed, {} records visible", session.active_len());
  Ok(())
}

fn simulate_concurrent_work() {
  let handles: Vec<_> = (0..3)
    .map(|worker_id| {
      thread::spawn(move || {
        for task in 0..10 {
          if task % 5 == 4 {
            warn!("Worker {} checkpoint at task {}", worker_id, task);
          } else {
            debug!("Worker {} completed task {}", worker_id, task);
          }
          thread::sleep(Duration::from_millis(1));
        }
        info!("Worker {} finished all tasks", worker_id);
      })
    })
    .collect();

  for handle in handles {
    if handle.join().is_err() {
      error!("worker thread panicked");
    }
  }
}
