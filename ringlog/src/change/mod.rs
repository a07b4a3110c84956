//! # Change feed
//!
//! Synchronous change notifications for [`RingBuffer`].
//!
//! Every mutating call on a ring buffer produces exactly one [`Change`]
//! (two when a push overflows: the implicit pop, then the push). Changes are
//! delivered synchronously, in registration order, after the mutation took
//! effect. A change only borrows the items it describes, so it cannot be
//! stored past the callback: subscribers that need the data copy it out.
//!
//! ## Reentrancy
//!
//! Subscribers receive the buffer itself and may mutate it from inside the
//! callback, but only when the change is being delivered to a single
//! subscriber. With two or more subscribers a nested mutation would let the
//! later ones observe an intermediate state, so it fails with
//! [`RingError::Reentrancy`]. A nested change is queued and delivered, in
//! order, once the callback that caused it has returned. While an eviction
//! is being reported the buffer cannot be refilled: nested pushes fail with
//! [`RingError::Reentrancy`] too.
//!
//! A sealed feed (the one behind a filtered view) rejects every nested
//! mutation with [`RingError::ReadOnly`].
//!
//! ## Suppression
//!
//! [`SuppressionScope`] silences a feed for bulk rebuilds. The caller emits a
//! single consolidated notification (usually [`Change::Reset`]) once the
//! scope is dropped.


use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::buffer::RingBuffer;
use crate::error::RingError;

/// Description of one completed mutation.
///
/// Items are borrowed: `Change` lives on the stack of the mutating call and
/// is handed out by reference.
#[derive(Debug, PartialEq, Eq)]
pub enum Change<'a, T> {
  /// An item was inserted at the front.
  PushFront(&'a T),
  /// An item was inserted at the back.
  PushBack(&'a T),
  /// The front item was removed, explicitly or by eviction.
  PopFront(&'a T),
  /// The back item was removed, explicitly or by eviction.
  PopBack(&'a T),
  /// The item at `index` was overwritten.
  Replace { old: &'a T, new: &'a T, index: usize },
  /// Every item was removed.
  Clear,
  /// The contents were rebuilt wholesale while notifications were suppressed.
  Reset,
}

impl<'a, T> Change<'a, T> {
  /// Payload-free discriminant of this change.
  pub fn kind(&self) -> ChangeKind {
    match self {
      Change::PushFront(_) => ChangeKind::PushFront,
      Change::PushBack(_) => ChangeKind::PushBack,
      Change::PopFront(_) => ChangeKind::PopFront,
      Change::PopBack(_) => ChangeKind::PopBack,
      Change::Replace { .. } => ChangeKind::Replace,
      Change::Clear => ChangeKind::Clear,
      Change::Reset => ChangeKind::Reset,
    }
  }

  /// The pushed or popped item, if this change carries exactly one.
  pub fn item(&self) -> Option<&'a T> {
    match *self {
      Change::PushFront(item) | Change::PushBack(item) => Some(item),
      Change::PopFront(item) | Change::PopBack(item) => Some(item),
      _ => None,
    }
  }
}

/// The kind of a [`Change`], without its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
  PushFront,
  PushBack,
  PopFront,
  PopBack,
  Replace,
  Clear,
  Reset,
}

impl ChangeKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ChangeKind::PushFront => "push_front",
      ChangeKind::PushBack => "push_back",
      ChangeKind::PopFront => "pop_front",
      ChangeKind::PopBack => "pop_back",
      ChangeKind::Replace => "replace",
      ChangeKind::Clear => "clear",
      ChangeKind::Reset => "reset",
    }
  }
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Receiver of ring buffer changes.
///
/// Called synchronously from inside the mutating call. The buffer passed in
/// already reflects the change; for a queued nested change it may also
/// reflect the mutations made after it.
pub trait Subscriber<T> {
  /// Handle a single change.
  ///
  /// No error return: anything a subscriber cannot follow has to be refused
  /// up front through [`Subscriber::accepts`].
  fn on_change(&mut self, buffer: &mut RingBuffer<T>, change: &Change<'_, T>);

  /// Optional: whether this subscriber can follow changes of `kind`.
  ///
  /// A mutation whose kind is refused by any subscriber fails with
  /// [`RingError::Unsupported`] before the buffer is touched.
  fn accepts(&self, _kind: ChangeKind) -> bool {
    true
  }

  /// Optional: a closed subscriber is dropped on the next dispatch.
  fn is_closed(&self) -> bool {
    false
  }
}

/// Adapts a closure into a [`Subscriber`].
pub struct FnSubscriber<F>(pub F);

impl<T, F> Subscriber<T> for FnSubscriber<F>
where
  F: FnMut(&mut RingBuffer<T>, &Change<'_, T>),
{
  fn on_change(&mut self, buffer: &mut RingBuffer<T>, change: &Change<'_, T>) {
    (self.0)(buffer, change)
  }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
  pub fn get(&self) -> u64 {
    self.0
  }
}

/// Dispatch bookkeeping shared with the scope guards.
#[derive(Debug, Default)]
struct FeedState {
  /// Number of dispatches currently on the call stack.
  depth: Cell<usize>,
  /// Subscriber count of the innermost in-flight dispatch.
  fanout: Cell<usize>,
  /// Number of live suppression scopes.
  suppressed: Cell<usize>,
  /// Number of evictions currently being reported.
  evicting: Cell<usize>,
  /// Subscribers may not mutate the buffer.
  sealed: Cell<bool>,
}

pub(crate) struct Entry<T> {
  id: SubscriptionId,
  subscriber: Box<dyn Subscriber<T>>,
}

impl<T> Entry<T> {
  pub(crate) fn deliver(&mut self, buffer: &mut RingBuffer<T>, change: &Change<'_, T>) {
    self.subscriber.on_change(buffer, change)
  }
}

pub(crate) type Entries<T> = SmallVec<[Entry<T>; 4]>;

/// Owned copy of a change made from inside a callback, waiting for delivery.
pub(crate) enum Deferred<T> {
  PushFront(T),
  PushBack(T),
  PopFront(T),
  PopBack(T),
  Replace { old: T, new: T, index: usize },
  Clear,
  Reset,
}

impl<T: Clone> Deferred<T> {
  fn capture(change: &Change<'_, T>) -> Self {
    match *change {
      Change::PushFront(item) => Deferred::PushFront(item.clone()),
      Change::PushBack(item) => Deferred::PushBack(item.clone()),
      Change::PopFront(item) => Deferred::PopFront(item.clone()),
      Change::PopBack(item) => Deferred::PopBack(item.clone()),
      Change::Replace { old, new, index } => Deferred::Replace {
        old: old.clone(),
        new: new.clone(),
        index,
      },
      Change::Clear => Deferred::Clear,
      Change::Reset => Deferred::Reset,
    }
  }
}

impl<T> Deferred<T> {
  pub(crate) fn as_change(&self) -> Change<'_, T> {
    match self {
      Deferred::PushFront(item) => Change::PushFront(item),
      Deferred::PushBack(item) => Change::PushBack(item),
      Deferred::PopFront(item) => Change::PopFront(item),
      Deferred::PopBack(item) => Change::PopBack(item),
      Deferred::Replace { old, new, index } => Change::Replace {
        old,
        new,
        index: *index,
      },
      Deferred::Clear => Change::Clear,
      Deferred::Reset => Change::Reset,
    }
  }
}

/// Ordered subscriber list plus the reentrancy and suppression state of one
/// ring buffer.
pub struct ChangeFeed<T> {
  entries: Entries<T>,
  next_id: u64,
  /// Ids of the entries checked out by the dispatch in flight.
  checked_out: SmallVec<[SubscriptionId; 4]>,
  /// Unsubscribed while their entry was checked out for a dispatch.
  detached: SmallVec<[SubscriptionId; 2]>,
  /// Changes made by a subscriber during the dispatch in flight.
  pending: VecDeque<Deferred<T>>,
  state: Rc<FeedState>,
}

impl<T> ChangeFeed<T> {
  pub fn new() -> Self {
    Self {
      entries: SmallVec::new(),
      next_id: 0,
      checked_out: SmallVec::new(),
      detached: SmallVec::new(),
      pending: VecDeque::new(),
      state: Rc::new(FeedState::default()),
    }
  }

  /// Registers a subscriber at the end of the delivery order.
  pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber<T>>) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.entries.push(Entry { id, subscriber });
    tracing::debug!(subscription = id.0, "subscriber registered");
    id
  }

  /// Removes a subscriber. Returns `false` if `id` is unknown.
  ///
  /// While a dispatch is in flight the removal of an entry that is currently
  /// being notified is deferred until that dispatch ends, and reported as
  /// successful.
  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
      self.entries.remove(pos);
      tracing::debug!(subscription = id.0, "subscriber removed");
      return true;
    }
    if self.checked_out.contains(&id) && !self.detached.contains(&id) {
      self.detached.push(id);
      return true;
    }
    false
  }

  /// Number of registered subscribers that are not closed.
  ///
  /// During a dispatch only subscribers added by that dispatch are counted.
  pub fn subscriber_count(&self) -> usize {
    self.entries.iter().filter(|e| !e.subscriber.is_closed()).count()
  }

  pub fn is_dispatching(&self) -> bool {
    self.state.depth.get() > 0
  }

  pub fn is_suppressed(&self) -> bool {
    self.state.suppressed.get() > 0
  }

  /// Starts a suppression scope. Notifications resume when every scope has
  /// been dropped.
  pub fn suppress(&self) -> SuppressionScope {
    self.state.suppressed.set(self.state.suppressed.get() + 1);
    SuppressionScope {
      state: Rc::clone(&self.state),
    }
  }

  /// Whether a change emitted right now would reach anyone.
  pub(crate) fn is_live(&self) -> bool {
    !self.is_suppressed() && (self.is_dispatching() || !self.entries.is_empty())
  }

  /// Makes every nested mutation fail with [`RingError::ReadOnly`].
  pub(crate) fn seal(&self) {
    self.state.sealed.set(true);
  }

  /// Fails if a mutation of `kind` made from inside a callback is not
  /// allowed.
  pub(crate) fn check_reentrancy(&self, kind: ChangeKind) -> Result<(), RingError> {
    let state = &self.state;
    if state.depth.get() == 0 {
      return Ok(());
    }
    if state.sealed.get() {
      tracing::warn!(kind = kind.as_str(), "rejected mutation of a sealed buffer");
      return Err(RingError::ReadOnly);
    }
    let refilling = state.evicting.get() > 0
      && matches!(kind, ChangeKind::PushFront | ChangeKind::PushBack);
    if state.fanout.get() >= 2 || refilling {
      tracing::warn!(
        fanout = state.fanout.get(),
        kind = kind.as_str(),
        "rejected reentrant mutation during dispatch"
      );
      return Err(RingError::Reentrancy);
    }
    Ok(())
  }

  /// Marks an eviction as being reported until the guard is dropped.
  pub(crate) fn begin_eviction(&self) -> EvictionGuard {
    self.state.evicting.set(self.state.evicting.get() + 1);
    EvictionGuard {
      state: Rc::clone(&self.state),
    }
  }

  /// Queues a change made from inside a callback.
  pub(crate) fn defer(&mut self, change: &Change<'_, T>)
  where
    T: Clone,
  {
    self.pending.push_back(Deferred::capture(change));
  }

  /// Next queued change of the dispatch in flight.
  pub(crate) fn next_deferred(&mut self) -> Option<Deferred<T>> {
    self.pending.pop_front()
  }

  /// Fails if a subscriber that would receive a change of `kind` refuses it.
  pub(crate) fn check_accepts(&self, kind: ChangeKind) -> Result<(), RingError> {
    if self.is_suppressed() {
      return Ok(());
    }
    let refused = self
      .entries
      .iter()
      .any(|e| !e.subscriber.is_closed() && !e.subscriber.accepts(kind));
    if refused {
      tracing::warn!(kind = kind.as_str(), "mutation refused by subscriber");
      return Err(RingError::Unsupported(kind));
    }
    Ok(())
  }

  /// Checks out the subscriber list for one dispatch.
  ///
  /// Closed subscribers are pruned here. The returned guard keeps the
  /// reentrancy counters raised until it is dropped.
  pub(crate) fn begin_dispatch(&mut self) -> (Entries<T>, DispatchGuard) {
    let mut entries = std::mem::take(&mut self.entries);
    entries.retain(|e| {
      let closed = e.subscriber.is_closed();
      if closed {
        tracing::debug!(subscription = e.id.0, "pruned closed subscriber");
      }
      !closed
    });

    self.checked_out = entries.iter().map(|e| e.id).collect();
    let guard = DispatchGuard {
      previous_fanout: self.state.fanout.replace(entries.len()),
      state: Rc::clone(&self.state),
    };
    self.state.depth.set(self.state.depth.get() + 1);
    (entries, guard)
  }

  /// Returns the checked-out list, keeping subscribers registered during the
  /// dispatch after the existing ones.
  pub(crate) fn end_dispatch(&mut self, mut entries: Entries<T>, guard: DispatchGuard) {
    drop(guard);
    entries.extend(self.entries.drain(..));
    self.checked_out.clear();
    if !self.detached.is_empty() {
      let detached = std::mem::take(&mut self.detached);
      entries.retain(|e| !detached.contains(&e.id));
    }
    self.entries = entries;
  }
}

impl<T> Default for ChangeFeed<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for ChangeFeed<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChangeFeed")
      .field("subscribers", &self.entries.len())
      .field("depth", &self.state.depth.get())
      .field("suppressed", &self.state.suppressed.get())
      .field("sealed", &self.state.sealed.get())
      .finish()
  }
}

/// Raised dispatch depth for the duration of one dispatch.
pub(crate) struct DispatchGuard {
  previous_fanout: usize,
  state: Rc<FeedState>,
}

impl Drop for DispatchGuard {
  fn drop(&mut self) {
    self.state.depth.set(self.state.depth.get() - 1);
    self.state.fanout.set(self.previous_fanout);
  }
}

/// Raised eviction counter for the duration of one eviction report.
pub(crate) struct EvictionGuard {
  state: Rc<FeedState>,
}

impl Drop for EvictionGuard {
  fn drop(&mut self) {
    self.state.evicting.set(self.state.evicting.get() - 1);
  }
}

/// Keeps a feed silent while alive.
///
/// The scope does not borrow the buffer, so the buffer can be mutated freely
/// while it is held.
#[must_use = "notifications resume as soon as the scope is dropped"]
#[derive(Debug)]
pub struct SuppressionScope {
  state: Rc<FeedState>,
}

impl Drop for SuppressionScope {
  fn drop(&mut self) {
    self.state.suppressed.set(self.state.suppressed.get() - 1);
  }
}
