#[cfg(test)]
mod __test__ {
  use std::cell::RefCell;
  use std::rc::Rc;

  use crate::buffer::RingBuffer;
  use crate::change::{Change, ChangeKind};
  use crate::error::RingError;
  use crate::filtered::{FilteredView, ViewState};

  fn even(x: &i32) -> bool {
    x % 2 == 0
  }

  fn expected(source: &RingBuffer<i32>, predicate: impl Fn(&i32) -> bool) -> Vec<i32> {
    source.iter().copied().filter(|x| predicate(x)).collect()
  }

  #[test]
  fn test_attach_fills_from_current_contents() {
    let mut source = RingBuffer::with_items(5, vec![1, 2, 3, 4]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    assert_eq!(view.to_vec(), vec![2, 4]);
    assert_eq!(view.capacity(), 5);
    assert_eq!(source.feed().subscriber_count(), 1);
  }

  #[test]
  fn test_refresh_correctness() {
    let mut source = RingBuffer::with_items(5, vec![1, 2, 3, 4, 5]).unwrap();
    let view = FilteredView::attach(&mut source, |_: &i32| true).unwrap();

    view.set_predicate(&source, |x: &i32| *x > 2).unwrap();
    assert_eq!(view.to_vec(), vec![3, 4, 5]);

    view.refresh(&source).unwrap();
    assert_eq!(view.to_vec(), vec![3, 4, 5]);
  }

  #[test]
  fn test_push_back_and_eviction_stay_in_sync() {
    let mut source = RingBuffer::new(3).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    for value in 1..=10 {
      source.push_back(value).unwrap();
      assert_eq!(view.to_vec(), expected(&source, even), "after pushing {value}");
    }
    assert_eq!(view.to_vec(), vec![8, 10]);
  }

  #[test]
  fn test_push_front_and_eviction_stay_in_sync() {
    let mut source = RingBuffer::new(4).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    for value in 1..=9 {
      source.push_front(value).unwrap();
      assert_eq!(view.to_vec(), expected(&source, even));
    }
    assert_eq!(source.to_vec(), vec![9, 8, 7, 6]);
    assert_eq!(view.to_vec(), vec![8, 6]);
  }

  #[test]
  fn test_pops_only_remove_matching_ends() {
    let mut source = RingBuffer::with_items(6, vec![1, 2, 3, 4, 5]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    source.pop_front().unwrap();
    assert_eq!(view.to_vec(), vec![2, 4]);

    source.pop_front().unwrap();
    assert_eq!(view.to_vec(), vec![4]);

    source.pop_back().unwrap();
    assert_eq!(view.to_vec(), vec![4]);

    source.pop_back().unwrap();
    assert!(view.is_empty());
    assert_eq!(source.to_vec(), vec![3]);
  }

  #[test]
  fn test_duplicate_values_compare_structurally() {
    let mut source = RingBuffer::with_items(4, vec![2, 1, 2]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    source.pop_front().unwrap();
    assert_eq!(view.to_vec(), vec![2]);
    source.pop_back().unwrap();
    assert!(view.is_empty());
  }

  #[test]
  fn test_clear_propagates() {
    let mut source = RingBuffer::with_items(3, vec![2, 4, 6]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    source.clear().unwrap();
    assert!(view.is_empty());

    source.push_back(8).unwrap();
    assert_eq!(view.to_vec(), vec![8]);
  }

  #[test]
  fn test_replace_is_rejected_before_mutation() {
    let mut source = RingBuffer::with_items(3, vec![1, 2, 3]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    assert_eq!(
      source.set(0, 4),
      Err(RingError::Unsupported(ChangeKind::Replace))
    );
    assert_eq!(source.to_vec(), vec![1, 2, 3]);
    assert_eq!(view.to_vec(), vec![2]);
  }

  #[test]
  fn test_replace_out_of_range_reports_range() {
    let mut source = RingBuffer::with_items(4, vec![1, 2]).unwrap();
    let _view = FilteredView::attach(&mut source, even).unwrap();

    assert_eq!(
      source.set(5, 4),
      Err(RingError::OutOfRange { index: 5, len: 2 })
    );
  }

  #[test]
  fn test_view_subscribers_cannot_mutate_the_view() {
    let mut source = RingBuffer::new(4).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    let outcomes = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&outcomes);
    view.subscribe_fn(move |derived: &mut RingBuffer<i32>, _| {
      let mut outcomes = sink.borrow_mut();
      outcomes.push(derived.clear().err());
      outcomes.push(derived.push_back(100).err());
      outcomes.push(derived.pop_front().err());
    });

    for value in 1..=6 {
      source.push_back(value).unwrap();
      assert_eq!(view.to_vec(), expected(&source, even));
    }
    assert_eq!(view.to_vec(), vec![4, 6]);

    let outcomes = outcomes.borrow();
    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|err| *err == Some(RingError::ReadOnly)));
  }

  #[test]
  fn test_detach_allows_replace_again() {
    let mut source = RingBuffer::with_items(3, vec![1, 2, 3]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    assert!(view.detach(&mut source));
    assert_eq!(source.feed().subscriber_count(), 0);
    assert_eq!(source.set(0, 4), Ok(1));
  }

  #[test]
  fn test_dropped_view_is_pruned() {
    let mut source = RingBuffer::with_items(3, vec![1, 2, 3]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();
    drop(view);

    assert_eq!(source.feed().subscriber_count(), 0);
    assert_eq!(source.set(1, 5), Ok(2));
    source.push_back(6).unwrap();
    assert_eq!(source.to_vec(), vec![5, 3, 6]);
  }

  #[test]
  fn test_view_subscribers_see_derived_changes() {
    let mut source = RingBuffer::new(3).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    let kinds = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&kinds);
    view.subscribe_fn(move |derived: &mut RingBuffer<i32>, change| {
      sink.borrow_mut().push((change.kind(), derived.len()));
    });

    source.push_back(1).unwrap();
    source.push_back(2).unwrap();
    source.push_back(3).unwrap();
    // Evicts 1, which never made it into the view
    source.push_back(5).unwrap();
    // Evicts 2
    source.push_back(7).unwrap();

    assert_eq!(
      *kinds.borrow(),
      vec![(ChangeKind::PushBack, 1), (ChangeKind::PopFront, 0)]
    );
  }

  #[test]
  fn test_refresh_emits_single_reset() {
    let mut source = RingBuffer::with_items(6, vec![1, 2, 3, 4, 5, 6]).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    let kinds = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&kinds);
    view.subscribe_fn(move |_, change| sink.borrow_mut().push(change.kind()));

    view.set_predicate(&source, |x: &i32| x % 3 == 0).unwrap();

    assert_eq!(*kinds.borrow(), vec![ChangeKind::Reset]);
    assert_eq!(view.to_vec(), vec![3, 6]);
  }

  #[test]
  fn test_source_reset_triggers_rebuild() {
    let mut source = RingBuffer::new(4).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();

    {
      let _scope = source.suppress_updates();
      for value in 1..=4 {
        source.push_back(value).unwrap();
      }
    }
    assert!(view.is_empty());

    source.notify_reset();
    assert_eq!(view.to_vec(), vec![2, 4]);
  }

  #[test]
  fn test_refresh_against_foreign_source_is_rejected() {
    let mut source = RingBuffer::new(4).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();
    let other = RingBuffer::with_items(2, vec![2]).unwrap();

    assert_eq!(
      view.refresh(&other),
      Err(RingError::Desynchronized { capacity: 4 })
    );
  }

  #[test]
  fn test_matches_uses_current_predicate() {
    let mut source = RingBuffer::<i32>::new(2).unwrap();
    let view = FilteredView::attach(&mut source, even).unwrap();
    assert!(view.matches(&2));
    assert!(!view.matches(&3));

    view.set_predicate(&source, |x: &i32| *x == 3).unwrap();
    assert!(view.matches(&3));
  }

  #[test]
  fn test_two_views_on_one_source() {
    let mut source = RingBuffer::new(5).unwrap();
    let evens = FilteredView::attach(&mut source, even).unwrap();
    let big = FilteredView::attach(&mut source, |x: &i32| *x > 6).unwrap();

    for value in 1..=10 {
      source.push_back(value).unwrap();
    }
    source.pop_back().unwrap();

    assert_eq!(evens.to_vec(), vec![6, 8]);
    assert_eq!(big.to_vec(), vec![7, 8, 9]);
  }

  #[test]
  #[should_panic(expected = "filtered view out of sync")]
  fn test_full_derived_buffer_aborts() {
    let mut state = ViewState {
      predicate: Box::new(|_: &i32| true),
      derived: RingBuffer::with_items(1, vec![1]).unwrap(),
    };
    let source = RingBuffer::with_items(1, vec![2]).unwrap();

    state.apply(&source, &Change::PushBack(&2));
  }

  #[test]
  #[should_panic(expected = "Replace is not supported")]
  fn test_replace_reaching_the_view_aborts() {
    let mut state = ViewState {
      predicate: Box::new(|_: &i32| true),
      derived: RingBuffer::new(2).unwrap(),
    };
    let source = RingBuffer::with_items(2, vec![1]).unwrap();

    state.apply(
      &source,
      &Change::Replace {
        old: &1,
        new: &2,
        index: 0,
      },
    );
  }
}
