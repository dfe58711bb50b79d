//! Cache layer that orchestrates range-aware lookups with network fetching.

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::key::{CacheKey, ListQuery};
use super::range::{can_cover, derive_slice};
use super::store::{is_within, LoadHandle, PendingRequest, Store, Subscriber};
use super::subscription::Subscription;
use super::traits::{ListPage, ListSource, Observer, Snapshot};

/// Default freshness window.
pub const DEFAULT_STALE_SECONDS: i64 = 120;

/// Options for [`ListCache::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
  /// Skip superset derivation, cached data and in-flight reuse.
  pub force: bool,
}

impl LoadOptions {
  pub fn forced() -> Self {
    Self { force: true }
  }
}

/// Counters describing the current cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  /// Entries currently holding data
  pub populated: usize,
  /// Entries whose data was derived from another entry
  pub derived: usize,
  pub in_flight: usize,
  pub subscribers: usize,
}

/// Client-side cache for a paginated list endpoint.
///
/// Every query maps to one entry under its canonical key. Loading an entry
/// tries, in order: deriving it from a fresh cached page that covers its
/// range, its own fresh data, the fetch already in flight for it, and only
/// then a new fetch from the [`ListSource`].
///
/// All entry state sits behind one lock that is never held across an await
/// or an observer call, which keeps the check-then-fetch sequence atomic and
/// limits each key to one in-flight fetch.
///
/// A fetch that completes after a newer forced fetch for the same key has
/// started still overwrites the entry's data: completion order wins.
pub struct ListCache<T> {
  store: Arc<Mutex<Store<T>>>,
  source: Arc<dyn ListSource<T>>,
  clock: Arc<dyn Clock>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<T> Clone for ListCache<T> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      source: Arc::clone(&self.source),
      clock: Arc::clone(&self.clock),
      stale_time: self.stale_time,
    }
  }
}

impl<T: Clone + Send + Sync + 'static> ListCache<T> {
  /// Create a cache fetching through `source`, using the wall clock.
  pub fn new(source: impl ListSource<T> + 'static) -> Self {
    Self {
      store: Arc::new(Mutex::new(Store::default())),
      source: Arc::new(source),
      clock: Arc::new(SystemClock),
      stale_time: Duration::seconds(DEFAULT_STALE_SECONDS),
    }
  }

  /// Replace the time source.
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  fn lock(&self) -> MutexGuard<'_, Store<T>> {
    self.store.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// [`ListCache::load`] with the key computed from `query`.
  pub fn load_query(&self, query: ListQuery, options: LoadOptions) -> LoadHandle<T> {
    let key = query.key();
    self.load(&key, query, options)
  }

  /// Resolve `key` for `query`.
  ///
  /// Everything up to starting the network fetch happens before this returns;
  /// the fetch itself runs on a spawned task and commits its result even if
  /// the returned handle is dropped. Must be called within a tokio runtime.
  pub fn load(&self, key: &CacheKey, query: ListQuery, options: LoadOptions) -> LoadHandle<T> {
    let now = self.clock.now();
    let mut store = self.lock();
    store.get_or_create(key).params = Some(query.clone());

    if !options.force {
      if let Some((superset_key, derived, fetched_at)) =
        self.find_superset(&store, key, &query, now)
      {
        let data = Arc::new(derived);
        let entry = store.get_or_create(key);
        entry.data = Some(Arc::clone(&data));
        entry.last_fetched = Some(fetched_at);
        entry.error = None;
        entry.loading = entry.pending.is_some();
        store.link(key, &superset_key);
        debug!(
          key = %key.digest(),
          superset = %superset_key.digest(),
          count = data.len(),
          "derived from cached superset"
        );

        let delivery = store.get_or_create(key).delivery();
        drop(store);
        delivery.send();
        return ready(Some(data));
      }
    }

    store.unlink(key);

    let entry = store.get_or_create(key);
    if !options.force && entry.is_fresh(now, self.stale_time) {
      entry.loading = entry.pending.is_some();
      let data = entry.data.clone();
      let delivery = entry.delivery();
      drop(store);
      delivery.send();
      return ready(data);
    }

    if !options.force {
      if let Some(pending) = &entry.pending {
        debug!(key = %key.digest(), "joining in-flight fetch");
        return pending.handle.clone();
      }
    }

    let request_id = store.next_id();
    let (tx, rx) = oneshot::channel();
    let handle: LoadHandle<T> = async move { rx.await.ok().flatten() }.boxed().shared();

    let entry = store.get_or_create(key);
    entry.loading = true;
    entry.error = None;
    entry.pending = Some(PendingRequest {
      id: request_id,
      handle: handle.clone(),
    });
    let delivery = entry.delivery();
    drop(store);
    delivery.send();

    let cache = self.clone();
    let key = key.clone();
    tokio::spawn(async move {
      let data = cache.run_fetch(key, query, request_id).await;
      let _ = tx.send(data);
    });

    handle
  }

  /// First fresh entry other than `key` whose data covers `query`.
  fn find_superset(
    &self,
    store: &Store<T>,
    key: &CacheKey,
    query: &ListQuery,
    now: DateTime<Utc>,
  ) -> Option<(CacheKey, ListPage<T>, DateTime<Utc>)> {
    store
      .iter()
      .filter(|(candidate, _)| *candidate != key)
      .find_map(|(candidate, entry)| {
        let params = entry.params.as_ref()?;
        let data = entry.data.as_ref()?;
        if !is_within(entry.last_fetched, now, self.stale_time) {
          return None;
        }
        if !can_cover(params, data.len(), query) {
          return None;
        }
        let derived = derive_slice(data, params, query)?;
        Some((candidate.clone(), derived, entry.last_fetched?))
      })
  }

  async fn run_fetch(
    self,
    key: CacheKey,
    query: ListQuery,
    request_id: u64,
  ) -> Option<Arc<ListPage<T>>> {
    debug!(
      key = %key.digest(),
      page = query.page(),
      limit = query.limit(),
      "fetching list"
    );
    let result = self.source.list(&query).await;
    let now = self.clock.now();

    let mut store = self.lock();
    let entry = store.get_or_create(&key);
    let succeeded = match result {
      Ok(page) => {
        debug!(key = %key.digest(), count = page.len(), "list fetched");
        entry.data = Some(Arc::new(page));
        entry.last_fetched = Some(now);
        entry.error = None;
        true
      }
      Err(error) => {
        if !error.is_plan_not_configured() {
          warn!(
            key = %key.digest(),
            status = ?error.status,
            error = %error,
            "list fetch failed"
          );
        }
        entry.error = Some(error);
        false
      }
    };
    // A forced fetch may have replaced this request in the meantime.
    if entry.pending.as_ref().is_some_and(|p| p.id == request_id) {
      entry.pending = None;
    }
    entry.loading = entry.pending.is_some();
    let data = entry.data.clone();
    drop(store);

    if succeeded {
      self.propagate_to_dependents(&key);
    }
    self.notify(&key);
    data
  }

  /// Re-derive the direct dependents of `key` from its new data.
  ///
  /// One hop only: dependents of dependents keep their data until they are
  /// loaded again. A dependent that can no longer be derived is detached and,
  /// if something is watching it, fetched on its own.
  fn propagate_to_dependents(&self, key: &CacheKey) {
    let mut refreshed = Vec::new();
    let mut refetch = Vec::new();
    {
      let mut store = self.lock();
      let Some(origin) = store.get(key) else {
        return;
      };
      let (Some(data), Some(params)) = (origin.data.clone(), origin.params.clone()) else {
        return;
      };
      let fetched_at = origin.last_fetched;
      let dependents: Vec<CacheKey> = origin.dependents.iter().cloned().collect();

      for dependent in dependents {
        let target = store.get(&dependent).and_then(|e| e.params.clone());
        let derived = target.as_ref().and_then(|target| {
          if can_cover(&params, data.len(), target) {
            derive_slice(&data, &params, target)
          } else {
            None
          }
        });

        match (derived, target) {
          (Some(page), _) => {
            let entry = store.get_or_create(&dependent);
            entry.data = Some(Arc::new(page));
            entry.last_fetched = fetched_at;
            entry.error = None;
            refreshed.push(dependent);
          }
          (None, target) => {
            store.unlink(&dependent);
            let watched = store.get_or_create(&dependent).has_subscribers();
            if let (true, Some(target)) = (watched, target) {
              refetch.push((dependent, target));
            }
          }
        }
      }
    }

    debug!(
      key = %key.digest(),
      refreshed = refreshed.len(),
      refetching = refetch.len(),
      "propagated to dependents"
    );
    for dependent in &refreshed {
      self.notify(dependent);
    }
    for (dependent, params) in refetch {
      self.refetch(&dependent, params);
    }
  }

  /// Start a forced load nobody waits on.
  fn refetch(&self, key: &CacheKey, params: ListQuery) {
    drop(self.load(key, params, LoadOptions::forced()));
  }

  /// Register `observer` on `key`, handing it the current snapshot at once.
  pub fn subscribe(
    &self,
    key: &CacheKey,
    observer: impl Observer<T> + 'static,
  ) -> Subscription<T> {
    let subscriber = Arc::new(Subscriber::new(Arc::new(observer)));
    let (id, delivery) = {
      let mut store = self.lock();
      let id = store.next_id();
      let entry = store.get_or_create(key);
      entry.subscribers.insert(id, Arc::clone(&subscriber));
      (id, entry.delivery_to(vec![subscriber]))
    };
    delivery.send();
    Subscription::new(Arc::downgrade(&self.store), key.clone(), id)
  }

  /// Deliver the current snapshot of `key` to its observers.
  pub fn notify(&self, key: &CacheKey) {
    let delivery = self.lock().get_mut(key).map(|entry| entry.delivery());
    if let Some(delivery) = delivery {
      delivery.send();
    }
  }

  /// Current state of `key`.
  pub fn snapshot(&self, key: &CacheKey) -> Snapshot<T> {
    self
      .lock()
      .get(key)
      .map(|entry| entry.snapshot())
      .unwrap_or_default()
  }

  /// Key of the entry `key`'s data was derived from.
  pub fn superset_of(&self, key: &CacheKey) -> Option<CacheKey> {
    self.lock().get(key).and_then(|entry| entry.superset.clone())
  }

  /// Mark everything stale after the backing data changed.
  ///
  /// Entries nobody watches drop their data and wait for their next
  /// subscriber; watched entries are refetched right away.
  pub fn invalidate_all(&self) {
    let refetch: Vec<(CacheKey, ListQuery)> = {
      let mut store = self.lock();
      store
        .iter_mut()
        .filter_map(|(key, entry)| {
          entry.last_fetched = None;
          if !entry.has_subscribers() {
            entry.data = None;
            return None;
          }
          entry.params.clone().map(|params| (key.clone(), params))
        })
        .collect()
    };

    info!(refetching = refetch.len(), "invalidated all cached lists");
    for (key, params) in refetch {
      self.refetch(&key, params);
    }
  }

  /// Run a mutation, invalidating the cache if it succeeds.
  pub async fn mutate<R, E, Fut>(&self, mutation: Fut) -> Result<R, E>
  where
    Fut: Future<Output = Result<R, E>>,
  {
    let output = mutation.await?;
    self.invalidate_all();
    Ok(output)
  }

  pub fn stats(&self) -> CacheStats {
    let store = self.lock();
    let mut stats = CacheStats::default();
    for (_, entry) in store.iter() {
      stats.entries += 1;
      stats.populated += usize::from(entry.data.is_some());
      stats.derived += usize::from(entry.superset.is_some());
      stats.in_flight += usize::from(entry.pending.is_some());
      stats.subscribers += entry.subscribers.len();
    }
    stats
  }
}

fn ready<T: Send + Sync + 'static>(data: Option<Arc<ListPage<T>>>) -> LoadHandle<T> {
  futures::future::ready(data).boxed().shared()
}
