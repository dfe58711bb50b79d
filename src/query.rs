//! Read hook over the list cache.
//!
//! Inspired by TanStack Query, a `Query<T>` watches one cache entry: it
//! subscribes to the entry, kicks off a load, and collects every state change
//! through a channel so an event loop can pick them up on its own schedule.
//!
//! # Example
//!
//! ```ignore
//! let mut query = cache.query(ListQuery::new(1, 20).filter("category", "shoes"));
//!
//! // Wait for the first settled state
//! query.settled().await;
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, re-render
//! }
//!
//! match (query.data(), query.error()) {
//!     (Some(page), _) => render(page),
//!     (None, Some(e)) => render_error(e),
//!     (None, None) => render_spinner(),
//! }
//! ```

use tokio::sync::mpsc;

use crate::cache::{
  CacheKey, FetchError, ListCache, ListPage, ListQuery, LoadOptions, Snapshot, Subscription,
};

/// Live view of one cached query.
///
/// Dropping the query unsubscribes it, after which invalidation no longer
/// refetches its entry.
pub struct Query<T> {
  key: CacheKey,
  params: ListQuery,
  cache: ListCache<T>,
  state: Snapshot<T>,
  receiver: mpsc::UnboundedReceiver<Snapshot<T>>,
  _subscription: Subscription<T>,
}

impl<T: Clone + Send + Sync + 'static> Query<T> {
  /// Subscribe to `params` and start loading it.
  pub fn new(cache: &ListCache<T>, params: ListQuery) -> Self {
    let key = params.key();
    let (tx, rx) = mpsc::unbounded_channel();

    let subscription = cache.subscribe(&key, move |snapshot: &Snapshot<T>| {
      // Ignore send errors - the query may be mid-drop
      let _ = tx.send(snapshot.clone());
    });
    drop(cache.load(&key, params.clone(), LoadOptions::default()));

    let mut query = Self {
      key,
      params,
      cache: cache.clone(),
      state: Snapshot::default(),
      receiver: rx,
      _subscription: subscription,
    };
    query.poll();
    query
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn params(&self) -> &ListQuery {
    &self.params
  }

  /// Latest snapshot seen by [`Query::poll`].
  pub fn state(&self) -> &Snapshot<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&ListPage<T>> {
    self.state.data.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.state.loading
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.state.error.as_ref()
  }

  /// Take every snapshot delivered since the last poll.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(snapshot) = self.receiver.try_recv() {
      self.state = snapshot;
      changed = true;
    }
    changed
  }

  /// Wait until the entry is no longer loading.
  pub async fn settled(&mut self) -> &Snapshot<T> {
    self.poll();
    while self.state.loading {
      match self.receiver.recv().await {
        Some(snapshot) => self.state = snapshot,
        None => break,
      }
    }
    &self.state
  }

  /// Force a refetch, even if fresh data or a fetch in flight exists.
  pub fn refetch(&self) {
    drop(
      self
        .cache
        .load(&self.key, self.params.clone(), LoadOptions::forced()),
    );
  }
}

impl<T: Clone + Send + Sync + 'static> ListCache<T> {
  /// Watch `params` through a [`Query`].
  pub fn query(&self, params: ListQuery) -> Query<T> {
    Query::new(self, params)
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
