use std::fmt;
use std::sync::{Mutex, PoisonError, Weak};

use super::key::CacheKey;
use super::store::Store;

/// Keeps an observer registered on a cache entry. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<T> {
  store: Weak<Mutex<Store<T>>>,
  key: CacheKey,
  id: u64,
}

impl<T> Subscription<T> {
  pub(crate) fn new(store: Weak<Mutex<Store<T>>>, key: CacheKey, id: u64) -> Self {
    Self { store, key, id }
  }

  /// Remove the observer now rather than at drop.
  pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    let Some(store) = self.store.upgrade() else {
      return;
    };
    let removed = store
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove_observer(&self.key, self.id);
    drop(removed);
  }
}

impl<T> fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("id", &self.id)
      .finish()
  }
}
