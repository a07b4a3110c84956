pub mod buffer;
pub mod change;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod filtered;
pub mod session;
pub mod trace_layer;

pub use buffer::RingBuffer;
pub use change::{Change, ChangeKind, Subscriber, SubscriptionId};
pub use error::{ConfigError, RingError};
pub use filtered::FilteredView;
pub use session::LogSession;
