//! # Filtered View
//!
//! A derived ring buffer that mirrors the ordered subsequence of a source
//! buffer whose items satisfy a predicate, kept in sync from the source's
//! change feed instead of by rescanning.
//!
//! ## Synchronisation
//!
//! | Source change | Derived buffer |
//! |---|---|
//! | `PushBack(x)` / `PushFront(x)` | same push if `predicate(x)` |
//! | `PopFront(x)` / `PopBack(x)` | same pop if that end of the derived buffer is `x` |
//! | `Replace` | refused up front, the source rejects `set` |
//! | `Clear` | clear |
//! | `Reset` | full rebuild |
//!
//! A source pop only ever removes the source's current extreme item. If that
//! item passed the predicate it is also the derived buffer's extreme item on
//! the same side, so comparing against the derived end is enough.
//!
//! The derived buffer has the source's capacity, so a matching push can never
//! need an eviction. Running out of room means the two buffers diverged; the
//! view logs the defect and panics rather than carry on with corrupt state.
//!
//! ## Identity
//!
//! Items are compared with `PartialEq`. Plain values compare structurally;
//! log records are stored as [`Shared`](crate::event::Shared), whose equality
//! is pointer identity, so two records with the same content never alias.
//!
//! ## Usage
//!
//! ```rust
//! use ringlog::buffer::RingBuffer;
//! use ringlog::filtered::FilteredView;
//!
//! let mut source = RingBuffer::new(4).unwrap();
//! let view = FilteredView::attach(&mut source, |x: &i32| x % 2 == 0).unwrap();
//!
//! for value in 1..=6 {
//!   source.push_back(value).unwrap();
//! }
//! assert_eq!(source.to_vec(), vec![3, 4, 5, 6]);
//! assert_eq!(view.to_vec(), vec![4, 6]);
//!
//! view.set_predicate(&source, |x: &i32| *x > 4).unwrap();
//! assert_eq!(view.to_vec(), vec![5, 6]);
//! ```

mod __test__;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::buffer::RingBuffer;
use crate::change::{Change, ChangeKind, Subscriber, SubscriptionId};
use crate::error::RingError;

/// Boxed item predicate.
pub type Predicate<T> = Box<dyn Fn(&T) -> bool>;

struct ViewState<T> {
  predicate: Predicate<T>,
  derived: RingBuffer<T>,
}

impl<T: Clone + PartialEq> ViewState<T> {
  /// Applies one source change to the derived buffer.
  fn apply(&mut self, source: &RingBuffer<T>, change: &Change<'_, T>) {
    let outcome = match *change {
      Change::PushBack(item) => self.push_matching(item, RingBuffer::push_back),
      Change::PushFront(item) => self.push_matching(item, RingBuffer::push_front),
      Change::PopFront(item) => {
        if self.derived.front().is_ok_and(|front| front == item) {
          self.derived.pop_front().map(drop)
        } else {
          Ok(())
        }
      },
      Change::PopBack(item) => {
        if self.derived.back().is_ok_and(|back| back == item) {
          self.derived.pop_back().map(drop)
        } else {
          Ok(())
        }
      },
      Change::Replace { index, .. } => {
        tracing::error!(index, "filtered view received a replace it had refused");
        Err(RingError::Unsupported(ChangeKind::Replace))
      },
      Change::Clear => self.derived.clear(),
      Change::Reset => self.rebuild(source),
    };

    if let Err(err) = outcome {
      tracing::error!(%err, kind = %change.kind(), "filtered view lost sync with its source");
      panic!("{err}");
    }
  }

  fn push_matching(
    &mut self,
    item: &T,
    push: fn(&mut RingBuffer<T>, T) -> Result<Option<T>, RingError>,
  ) -> Result<(), RingError> {
    if !(self.predicate)(item) {
      return Ok(());
    }
    if self.derived.is_full() {
      return Err(RingError::Desynchronized {
        capacity: self.derived.capacity(),
      });
    }
    push(&mut self.derived, item.clone()).map(drop)
  }

  /// Recomputes the derived buffer from scratch and emits a single `Reset`.
  fn rebuild(&mut self, source: &RingBuffer<T>) -> Result<(), RingError> {
    let ViewState { predicate, derived } = self;
    if source.capacity() != derived.capacity() {
      return Err(RingError::Desynchronized {
        capacity: derived.capacity(),
      });
    }

    let scope = derived.suppress_updates();
    derived.clear()?;
    for item in source.iter().filter(|&item| predicate(item)) {
      derived.push_back(item.clone())?;
    }
    drop(scope);

    tracing::debug!(
      source_len = source.len(),
      derived_len = derived.len(),
      "filtered view rebuilt"
    );
    derived.notify_reset();
    Ok(())
  }
}

/// The view's subscription on the source feed.
struct ViewSync<T> {
  state: Weak<RefCell<ViewState<T>>>,
}

impl<T: Clone + PartialEq> Subscriber<T> for ViewSync<T> {
  fn on_change(&mut self, source: &mut RingBuffer<T>, change: &Change<'_, T>) {
    if let Some(state) = self.state.upgrade() {
      state.borrow_mut().apply(source, change);
    }
  }

  fn accepts(&self, kind: ChangeKind) -> bool {
    kind != ChangeKind::Replace
  }

  fn is_closed(&self) -> bool {
    self.state.strong_count() == 0
  }
}

/// A [`RingBuffer`] incrementally kept equal to `source.filter(predicate)`.
///
/// Subscribers of the view are registered on the derived buffer and receive
/// it as their `buffer` argument. The derived buffer is sealed: any mutation
/// they attempt fails with [`RingError::ReadOnly`]. They must not reach back
/// into the view through this handle while being notified.
pub struct FilteredView<T> {
  state: Rc<RefCell<ViewState<T>>>,
  subscription: SubscriptionId,
}

impl<T: Clone + PartialEq + 'static> FilteredView<T> {
  /// Builds a view over `source` and subscribes it to the source feed.
  ///
  /// The derived buffer is filled from the current source contents before
  /// this returns.
  pub fn attach<P>(source: &mut RingBuffer<T>, predicate: P) -> Result<Self, RingError>
  where
    P: Fn(&T) -> bool + 'static,
  {
    let derived = RingBuffer::new(source.capacity())?;
    derived.seal();
    let state = Rc::new(RefCell::new(ViewState {
      predicate: Box::new(predicate),
      derived,
    }));
    state.borrow_mut().rebuild(source)?;

    let subscription = source.subscribe(ViewSync {
      state: Rc::downgrade(&state),
    });
    tracing::debug!(
      subscription = subscription.get(),
      capacity = source.capacity(),
      "filtered view attached"
    );

    Ok(Self { state, subscription })
  }

  /// Rebuilds the derived buffer from `source` and emits one
  /// [`Change::Reset`] to the view's subscribers.
  ///
  /// This is the only full scan the view performs. `source` must be the
  /// buffer the view is attached to.
  pub fn refresh(&self, source: &RingBuffer<T>) -> Result<(), RingError> {
    self.state.borrow_mut().rebuild(source)
  }

  /// Swaps the predicate and refreshes.
  pub fn set_predicate<P>(&self, source: &RingBuffer<T>, predicate: P) -> Result<(), RingError>
  where
    P: Fn(&T) -> bool + 'static,
  {
    let mut state = self.state.borrow_mut();
    state.predicate = Box::new(predicate);
    state.rebuild(source)
  }

  /// Unsubscribes from `source` and drops the view.
  pub fn detach(self, source: &mut RingBuffer<T>) -> bool {
    let removed = source.unsubscribe(self.subscription);
    tracing::debug!(subscription = self.subscription.get(), removed, "filtered view detached");
    removed
  }

  /// Whether `item` passes the current predicate.
  pub fn matches(&self, item: &T) -> bool {
    (self.state.borrow().predicate)(item)
  }

  pub fn len(&self) -> usize {
    self.state.borrow().derived.len()
  }

  pub fn is_empty(&self) -> bool {
    self.state.borrow().derived.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.state.borrow().derived.capacity()
  }

  pub fn to_vec(&self) -> Vec<T> {
    self.state.borrow().derived.to_vec()
  }

  /// Read access to the derived buffer.
  pub fn with_derived<R>(&self, f: impl FnOnce(&RingBuffer<T>) -> R) -> R {
    f(&self.state.borrow().derived)
  }

  /// Registers a subscriber for the view's own changes.
  pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
  where
    S: Subscriber<T> + 'static,
  {
    self.state.borrow_mut().derived.subscribe(subscriber)
  }

  pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
  where
    F: FnMut(&mut RingBuffer<T>, &Change<'_, T>) + 'static,
  {
    self.state.borrow_mut().derived.subscribe_fn(f)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.state.borrow_mut().derived.unsubscribe(id)
  }

  /// The view's subscription on its source.
  pub fn subscription(&self) -> SubscriptionId {
    self.subscription
  }
}

impl<T: fmt::Debug> fmt::Debug for FilteredView<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut out = f.debug_struct("FilteredView");
    out.field("subscription", &self.subscription);
    match self.state.try_borrow() {
      Ok(state) => out.field("derived", &state.derived),
      Err(_) => out.field("derived", &"<updating>"),
    };
    out.finish()
  }
}
