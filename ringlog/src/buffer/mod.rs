
use std::fmt;
use std::slice;

use serde::{Deserialize, Serialize};

use crate::change::{
  Change, ChangeFeed, ChangeKind, FnSubscriber, Subscriber, SubscriptionId, SuppressionScope,
};
use crate::error::RingError;

/// A fixed-capacity ring buffer that stores items in insertion order and
/// reports every mutation to its [`ChangeFeed`].
///
/// Both ends are mutable. When the buffer is full, pushing at one end evicts
/// the item at the opposite end first, so a buffer fed with `push_back` keeps
/// the most recent `capacity` items.
///
/// Logical index `i` lives in backing slot `(start + i) mod capacity`. Slots
/// outside `[0, len)` are always empty, and reading them is an error even
/// though they are allocated.
///
/// # Type Parameters
/// * `T` - The type of the items stored in the buffer. Mutations require
///   `Clone` so that pushed items can be shown to subscribers.
pub struct RingBuffer<T> {
  /// Backing slots, `None` when logically unoccupied
  storage: Box<[Option<T>]>,

  /// Backing index of the front item
  start: usize,

  /// Number of items currently held
  size: usize,

  feed: ChangeFeed<T>,
}

impl<T> RingBuffer<T> {
  /// Creates a new empty ring buffer with the specified capacity.
  ///
  /// # Errors
  /// [`RingError::ZeroCapacity`] if `capacity` is 0.
  ///
  /// # Example
  /// ```rust
  /// use ringlog::buffer::RingBuffer;
  ///
  /// let buffer: RingBuffer<i32> = RingBuffer::new(10).unwrap();
  /// assert_eq!(buffer.len(), 0);
  /// assert_eq!(buffer.capacity(), 10);
  /// ```
  pub fn new(capacity: usize) -> Result<Self, RingError> {
    if capacity == 0 {
      return Err(RingError::ZeroCapacity);
    }

    Ok(Self {
      storage: (0..capacity).map(|_| None).collect(),
      start: 0,
      size: 0,
      feed: ChangeFeed::new(),
    })
  }

  /// Creates a ring buffer pre-filled with `items`, front first.
  ///
  /// No notification is emitted.
  ///
  /// # Errors
  /// [`RingError::ZeroCapacity`] if `capacity` is 0,
  /// [`RingError::TooManyItems`] if `items` is longer than `capacity`.
  ///
  /// # Example
  /// ```rust
  /// use ringlog::buffer::RingBuffer;
  ///
  /// let buffer = RingBuffer::with_items(4, vec![1, 2, 3]).unwrap();
  /// assert_eq!(buffer.to_vec(), vec![1, 2, 3]);
  /// assert!(RingBuffer::with_items(2, vec![1, 2, 3]).is_err());
  /// ```
  pub fn with_items(capacity: usize, items: Vec<T>) -> Result<Self, RingError> {
    if capacity == 0 {
      return Err(RingError::ZeroCapacity);
    }
    if items.len() > capacity {
      return Err(RingError::TooManyItems {
        len: items.len(),
        capacity,
      });
    }

    let size = items.len();
    let storage = items
      .into_iter()
      .map(Some)
      .chain((size..capacity).map(|_| None))
      .collect();

    Ok(Self {
      storage,
      start: 0,
      size,
      feed: ChangeFeed::new(),
    })
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.storage.len()
  }

  /// Returns the number of items currently in the buffer.
  #[inline]
  pub fn len(&self) -> usize {
    self.size
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.size == self.capacity()
  }

  /// The front (oldest, for a `push_back` fed buffer) item.
  pub fn front(&self) -> Result<&T, RingError> {
    if self.is_empty() {
      return Err(RingError::Empty);
    }
    self.slot(self.start)
  }

  /// The back (newest, for a `push_back` fed buffer) item.
  pub fn back(&self) -> Result<&T, RingError> {
    if self.is_empty() {
      return Err(RingError::Empty);
    }
    self.slot(self.internal_index(self.size - 1))
  }

  /// The item at logical `index`.
  ///
  /// # Errors
  /// [`RingError::OutOfRange`] unless `index < len()`.
  pub fn get(&self, index: usize) -> Result<&T, RingError> {
    self.check_index(index)?;
    self.slot(self.internal_index(index))
  }

  /// Maps a logical index to its backing slot.
  ///
  /// Defined for `index < capacity`; callers check the logical range.
  #[inline]
  pub fn internal_index(&self, index: usize) -> usize {
    let capacity = self.capacity();
    if index < capacity - self.start {
      self.start + index
    } else {
      self.start + index - capacity
    }
  }

  /// Maps a backing slot back to its logical index. Inverse of
  /// [`RingBuffer::internal_index`].
  #[inline]
  pub fn external_index(&self, slot: usize) -> usize {
    if slot >= self.start {
      slot - self.start
    } else {
      slot + self.capacity() - self.start
    }
  }

  /// The contents as at most two contiguous spans, in logical order.
  ///
  /// The second span is non-empty only when the contents wrap around the end
  /// of the backing storage.
  pub fn segments(&self) -> (Segment<'_, T>, Segment<'_, T>) {
    let first_len = self.size.min(self.capacity() - self.start);
    let first = &self.storage[self.start..self.start + first_len];
    let second = &self.storage[..self.size - first_len];
    (Segment { slots: first }, Segment { slots: second })
  }

  /// Iterates front to back.
  pub fn iter(&self) -> Iter<'_, T> {
    let (first, second) = self.segments();
    Iter {
      first: first.slots.iter(),
      second: second.slots.iter(),
    }
  }

  /// Registers a subscriber on this buffer's feed.
  pub fn subscribe<S>(&mut self, subscriber: S) -> SubscriptionId
  where
    S: Subscriber<T> + 'static,
  {
    self.feed.subscribe(Box::new(subscriber))
  }

  /// Registers a closure on this buffer's feed.
  ///
  /// # Example
  /// ```rust
  /// use ringlog::buffer::RingBuffer;
  /// use ringlog::change::ChangeKind;
  /// use std::cell::RefCell;
  /// use std::rc::Rc;
  ///
  /// let seen = Rc::new(RefCell::new(Vec::new()));
  /// let sink = Rc::clone(&seen);
  ///
  /// let mut buffer = RingBuffer::new(1).unwrap();
  /// buffer.subscribe_fn(move |_, change| sink.borrow_mut().push(change.kind()));
  /// buffer.push_back(1).unwrap();
  /// buffer.push_back(2).unwrap();
  ///
  /// assert_eq!(
  ///   *seen.borrow(),
  ///   vec![ChangeKind::PushBack, ChangeKind::PopFront, ChangeKind::PushBack]
  /// );
  /// ```
  pub fn subscribe_fn<F>(&mut self, f: F) -> SubscriptionId
  where
    F: FnMut(&mut RingBuffer<T>, &Change<'_, T>) + 'static,
  {
    self.subscribe(FnSubscriber(f))
  }

  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    self.feed.unsubscribe(id)
  }

  pub fn feed(&self) -> &ChangeFeed<T> {
    &self.feed
  }

  /// Silences this buffer's feed until the returned scope is dropped.
  ///
  /// The caller is expected to follow up with one consolidated notification,
  /// typically [`RingBuffer::notify_reset`].
  pub fn suppress_updates(&self) -> SuppressionScope {
    self.feed.suppress()
  }

  fn check_index(&self, index: usize) -> Result<(), RingError> {
    if index >= self.size {
      return Err(RingError::OutOfRange {
        index,
        len: self.size,
      });
    }
    Ok(())
  }

  fn slot(&self, slot: usize) -> Result<&T, RingError> {
    self.storage[slot].as_ref().ok_or(RingError::OutOfRange {
      index: self.external_index(slot),
      len: self.size,
    })
  }

  /// Reentrancy and acceptance checks shared by every mutation.
  fn admit(&self, kind: ChangeKind) -> Result<(), RingError> {
    self.feed.check_reentrancy(kind)?;
    self.feed.check_accepts(kind)
  }

  /// Seals the feed: subscribers can no longer mutate this buffer.
  pub(crate) fn seal(&self) {
    self.feed.seal();
  }

  fn take_front(&mut self) -> Option<T> {
    if self.size == 0 {
      return None;
    }
    let item = self.storage[self.start].take();
    self.start = if self.start + 1 == self.capacity() { 0 } else { self.start + 1 };
    self.size -= 1;
    item
  }

  fn take_back(&mut self) -> Option<T> {
    if self.size == 0 {
      return None;
    }
    let slot = self.internal_index(self.size - 1);
    self.size -= 1;
    self.storage[slot].take()
  }

  fn put_front(&mut self, item: T) {
    self.start = if self.start == 0 { self.capacity() - 1 } else { self.start - 1 };
    self.storage[self.start] = Some(item);
    self.size += 1;
  }

  fn put_back(&mut self, item: T) {
    let slot = self.internal_index(self.size);
    self.storage[slot] = Some(item);
    self.size += 1;
  }

}

impl<T: Clone> RingBuffer<T> {
  /// Emits [`Change::Reset`] to every subscriber.
  pub fn notify_reset(&mut self) {
    self.notify(&Change::Reset);
  }

  /// Delivers `change` to every subscriber, in registration order.
  ///
  /// From inside a callback the change is queued instead, and delivered once
  /// the current change has reached every subscriber.
  fn notify(&mut self, change: &Change<'_, T>) {
    if !self.feed.is_live() {
      return;
    }
    if self.feed.is_dispatching() {
      self.feed.defer(change);
      return;
    }

    tracing::trace!(kind = %change.kind(), len = self.size, "dispatching change");
    let (mut entries, guard) = self.feed.begin_dispatch();
    for entry in entries.iter_mut() {
      entry.deliver(self, change);
    }
    while let Some(deferred) = self.feed.next_deferred() {
      let nested = deferred.as_change();
      tracing::trace!(kind = %nested.kind(), len = self.size, "dispatching nested change");
      for entry in entries.iter_mut() {
        entry.deliver(self, &nested);
      }
    }
    self.feed.end_dispatch(entries, guard);
  }

  /// Reports an eviction. Subscribers may not refill the buffer meanwhile.
  fn notify_eviction(&mut self, change: &Change<'_, T>) {
    let _guard = self.feed.begin_eviction();
    self.notify(change);
  }

  /// Adds an item at the back.
  ///
  /// If the buffer is full, the front item is evicted first and reported as
  /// [`Change::PopFront`] before the [`Change::PushBack`]. Subscribers of
  /// that eviction cannot push into the buffer.
  ///
  /// # Returns
  /// The evicted item, if any.
  ///
  /// # Example
  /// ```rust
  /// use ringlog::buffer::RingBuffer;
  ///
  /// let mut buffer = RingBuffer::new(2).unwrap();
  /// buffer.push_back(1).unwrap();
  /// buffer.push_back(2).unwrap();
  /// assert_eq!(buffer.push_back(3).unwrap(), Some(1));
  /// assert_eq!(buffer.to_vec(), vec![2, 3]);
  /// ```
  pub fn push_back(&mut self, item: T) -> Result<Option<T>, RingError> {
    self.admit(ChangeKind::PushBack)?;
    if self.is_full() {
      self.admit(ChangeKind::PopFront)?;
    }

    let mut evicted = None;
    if self.is_full() {
      if let Some(old) = self.take_front() {
        tracing::trace!(capacity = self.capacity(), "evicted front item");
        self.notify_eviction(&Change::PopFront(&old));
        evicted = Some(old);
      }
    }

    let shown = self.feed.is_live().then(|| item.clone());
    self.put_back(item);
    if let Some(shown) = shown {
      self.notify(&Change::PushBack(&shown));
    }
    Ok(evicted)
  }

  /// Adds an item at the front, evicting the back item when full.
  pub fn push_front(&mut self, item: T) -> Result<Option<T>, RingError> {
    self.admit(ChangeKind::PushFront)?;
    if self.is_full() {
      self.admit(ChangeKind::PopBack)?;
    }

    let mut evicted = None;
    if self.is_full() {
      if let Some(old) = self.take_back() {
        tracing::trace!(capacity = self.capacity(), "evicted back item");
        self.notify_eviction(&Change::PopBack(&old));
        evicted = Some(old);
      }
    }

    let shown = self.feed.is_live().then(|| item.clone());
    self.put_front(item);
    if let Some(shown) = shown {
      self.notify(&Change::PushFront(&shown));
    }
    Ok(evicted)
  }

  pub fn pop_front(&mut self) -> Result<T, RingError> {
    self.admit(ChangeKind::PopFront)?;
    let item = self.take_front().ok_or(RingError::Empty)?;
    self.notify(&Change::PopFront(&item));
    Ok(item)
  }

  pub fn pop_back(&mut self) -> Result<T, RingError> {
    self.admit(ChangeKind::PopBack)?;
    let item = self.take_back().ok_or(RingError::Empty)?;
    self.notify(&Change::PopBack(&item));
    Ok(item)
  }

  /// Replaces the item at logical `index` and returns the old one.
  ///
  /// # Errors
  /// [`RingError::OutOfRange`] unless `index < len()`;
  /// [`RingError::Unsupported`] if a subscriber cannot follow a replace
  /// (for instance an attached [`FilteredView`](crate::filtered::FilteredView)).
  pub fn set(&mut self, index: usize, value: T) -> Result<T, RingError> {
    self.check_index(index)?;
    self.admit(ChangeKind::Replace)?;

    let slot = self.internal_index(index);
    let shown = self.feed.is_live().then(|| value.clone());
    let old = self.storage[slot]
      .replace(value)
      .ok_or(RingError::OutOfRange { index, len: self.size })?;
    if let Some(shown) = shown {
      self.notify(&Change::Replace {
        old: &old,
        new: &shown,
        index,
      });
    }
    Ok(old)
  }

  /// Removes every item. Every slot is released, not just the logical range.
  pub fn clear(&mut self) -> Result<(), RingError> {
    self.admit(ChangeKind::Clear)?;
    self.release_all();
    self.notify(&Change::Clear);
    Ok(())
  }

  /// Removes and returns all items currently in the buffer, front first.
  ///
  /// Reported as a single [`Change::Clear`].
  ///
  /// # Example
  /// ```rust
  /// use ringlog::buffer::RingBuffer;
  ///
  /// let mut buffer = RingBuffer::new(3).unwrap();
  /// buffer.push_back(1).unwrap();
  /// buffer.push_back(2).unwrap();
  /// let snapshot = buffer.take_snapshot().unwrap();
  /// assert_eq!(snapshot, vec![1, 2]);
  /// assert!(buffer.is_empty());
  /// ```
  pub fn take_snapshot(&mut self) -> Result<Vec<T>, RingError> {
    self.admit(ChangeKind::Clear)?;
    let mut items = Vec::with_capacity(self.size);
    while let Some(item) = self.take_front() {
      items.push(item);
    }
    self.release_all();
    self.notify(&Change::Clear);
    Ok(items)
  }

  /// Copies the contents into one contiguous vector, front first.
  pub fn to_vec(&self) -> Vec<T> {
    self.iter().cloned().collect()
  }

  fn release_all(&mut self) {
    for slot in self.storage.iter_mut() {
      *slot = None;
    }
    self.start = 0;
    self.size = 0;
  }
}

impl<T: PartialEq> RingBuffer<T> {
  pub fn contains(&self, item: &T) -> bool {
    self.index_of(item).is_some()
  }

  /// Logical index of the first item equal to `item`.
  pub fn index_of(&self, item: &T) -> Option<usize> {
    let (first, second) = self.segments();
    first
      .iter()
      .chain(second.iter())
      .position(|candidate| candidate == item)
  }
}

impl<T: fmt::Debug> fmt::Debug for RingBuffer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
      .field("capacity", &self.capacity())
      .field("items", &self.iter().collect::<Vec<_>>())
      .field("feed", &self.feed)
      .finish()
  }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

/// One physically contiguous span of a [`RingBuffer`].
#[derive(Debug, Clone)]
pub struct Segment<'a, T> {
  slots: &'a [Option<T>],
}

impl<'a, T> Segment<'a, T> {
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a T> + 'a {
    self.slots.iter().filter_map(Option::as_ref)
  }
}

/// Front-to-back iterator over a [`RingBuffer`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
  first: slice::Iter<'a, Option<T>>,
  second: slice::Iter<'a, Option<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let slot = match self.first.next() {
        Some(slot) => slot,
        None => self.second.next()?,
      };
      if let Some(item) = slot {
        return Some(item);
      }
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = self.first.len() + self.second.len();
    (len, Some(len))
  }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
  fn next_back(&mut self) -> Option<Self::Item> {
    loop {
      let slot = match self.second.next_back() {
        Some(slot) => slot,
        None => self.first.next_back()?,
      };
      if let Some(item) = slot {
        return Some(item);
      }
    }
  }
}

impl<'a, T> ExactSizeIterator for Iter<'a, T> {}

impl<T: Serialize> Serialize for RingBuffer<T> {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    use serde::ser::SerializeStruct;

    let items: Vec<&T> = self.iter().collect();
    let mut state = serializer.serialize_struct("RingBuffer", 2)?;
    state.serialize_field("items", &items)?;
    state.serialize_field("capacity", &self.capacity())?;
    state.end()
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RingBuffer<T> {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    use serde::de::{self, MapAccess, Visitor};
    use std::marker::PhantomData;

    #[derive(Deserialize)]
    #[serde(field_identifier, rename_all = "lowercase")]
    enum Field {
      Items,
      Capacity,
    }

    struct RingBufferVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for RingBufferVisitor<T> {
      type Value = RingBuffer<T>;

      fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("struct RingBuffer")
      }

      fn visit_map<V>(self, mut map: V) -> Result<RingBuffer<T>, V::Error>
      where
        V: MapAccess<'de>,
      {
        let mut items = None;
        let mut capacity = None;

        while let Some(key) = map.next_key()? {
          match key {
            Field::Items => {
              if items.is_some() {
                return Err(de::Error::duplicate_field("items"));
              }
              items = Some(map.next_value()?);
            },
            Field::Capacity => {
              if capacity.is_some() {
                return Err(de::Error::duplicate_field("capacity"));
              }
              capacity = Some(map.next_value()?);
            },
          }
        }

        let items: Vec<T> = items.ok_or_else(|| de::Error::missing_field("items"))?;
        let capacity = capacity.ok_or_else(|| de::Error::missing_field("capacity"))?;

        // Capacity and length limits are enforced by the constructor
        RingBuffer::with_items(capacity, items).map_err(de::Error::custom)
      }
    }

    const FIELDS: &[&str] = &["items", "capacity"];

    deserializer.deserialize_struct("RingBuffer", FIELDS, RingBufferVisitor(PhantomData))
  }
}
