//! In-memory entry store and the superset/dependent links between entries.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, Shared};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::key::{CacheKey, ListQuery};
use super::traits::{FetchError, ListPage, Observer, Snapshot};

/// Awaitable result of a load. Resolves to the entry's data once the load
/// settles; fetch errors land on the entry instead.
pub type LoadHandle<T> = Shared<BoxFuture<'static, Option<Arc<ListPage<T>>>>>;

/// The one in-flight fetch for an entry.
pub(crate) struct PendingRequest<T> {
  pub id: u64,
  pub handle: LoadHandle<T>,
}

/// Cached state for one canonical key.
pub(crate) struct Entry<T> {
  pub data: Option<Arc<ListPage<T>>>,
  pub loading: bool,
  pub error: Option<FetchError>,
  /// Unset when never populated or after invalidation
  pub last_fetched: Option<DateTime<Utc>>,
  pub pending: Option<PendingRequest<T>>,
  /// Query that produced `data`
  pub params: Option<ListQuery>,
  pub subscribers: BTreeMap<u64, Arc<Subscriber<T>>>,
  /// Bumped for every snapshot handed out, so deliveries can be ordered
  pub version: u64,
  /// Entries whose data was derived from this one
  pub dependents: BTreeSet<CacheKey>,
  /// Entry this one's data was derived from
  pub superset: Option<CacheKey>,
}

impl<T> Default for Entry<T> {
  fn default() -> Self {
    Self {
      data: None,
      loading: false,
      error: None,
      last_fetched: None,
      pending: None,
      params: None,
      subscribers: BTreeMap::new(),
      version: 0,
      dependents: BTreeSet::new(),
      superset: None,
    }
  }
}

impl<T> Entry<T> {
  pub fn snapshot(&self) -> Snapshot<T> {
    Snapshot {
      data: self.data.clone(),
      loading: self.loading,
      error: self.error.clone(),
    }
  }

  pub fn has_subscribers(&self) -> bool {
    !self.subscribers.is_empty()
  }

  /// Data is present and was fetched less than `stale_time` ago.
  pub fn is_fresh(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
    self.data.is_some() && is_within(self.last_fetched, now, stale_time)
  }

  /// Snapshot plus the observers to hand it to, taken under the store lock
  /// and delivered after it is released.
  pub fn delivery(&mut self) -> Delivery<T> {
    let subscribers = self.subscribers.values().cloned().collect();
    self.delivery_to(subscribers)
  }

  /// Current snapshot for `subscribers` only.
  pub fn delivery_to(&mut self, subscribers: Vec<Arc<Subscriber<T>>>) -> Delivery<T> {
    self.version += 1;
    Delivery {
      subscribers,
      version: self.version,
      snapshot: self.snapshot(),
    }
  }
}

pub(crate) fn is_within(
  last_fetched: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  stale_time: Duration,
) -> bool {
  last_fetched.is_some_and(|fetched_at| now - fetched_at < stale_time)
}

pub(crate) struct Delivery<T> {
  subscribers: Vec<Arc<Subscriber<T>>>,
  version: u64,
  snapshot: Snapshot<T>,
}

impl<T> Delivery<T> {
  pub fn send(self) {
    for subscriber in &self.subscribers {
      subscriber.deliver(self.version, &self.snapshot);
    }
  }
}

/// A registered observer and its queue of undelivered snapshots.
///
/// Deliveries for one entry can race each other once the store lock is
/// released. Each subscriber accepts only snapshots newer than the last one
/// it accepted, and only one thread at a time drains its queue, so the
/// observer sees the entry's states in order. A change the observer causes to
/// its own entry is queued and delivered after `on_change` returns.
pub(crate) struct Subscriber<T> {
  observer: Arc<dyn Observer<T>>,
  mailbox: Mutex<Mailbox<T>>,
}

struct Mailbox<T> {
  /// Version of the newest snapshot accepted
  latest: Option<u64>,
  /// Some thread is draining the queue
  draining: bool,
  queue: VecDeque<Snapshot<T>>,
}

impl<T> Subscriber<T> {
  pub fn new(observer: Arc<dyn Observer<T>>) -> Self {
    Self {
      observer,
      mailbox: Mutex::new(Mailbox {
        latest: None,
        draining: false,
        queue: VecDeque::new(),
      }),
    }
  }

  fn mailbox(&self) -> MutexGuard<'_, Mailbox<T>> {
    self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn deliver(&self, version: u64, snapshot: &Snapshot<T>) {
    {
      let mut mailbox = self.mailbox();
      if mailbox.latest.is_some_and(|latest| latest >= version) {
        return;
      }
      mailbox.latest = Some(version);
      mailbox.queue.push_back(snapshot.clone());
      if mailbox.draining {
        return;
      }
      mailbox.draining = true;
    }

    loop {
      let next = {
        let mut mailbox = self.mailbox();
        match mailbox.queue.pop_front() {
          Some(next) => next,
          None => {
            mailbox.draining = false;
            return;
          }
        }
      };
      self.observer.on_change(&next);
    }
  }
}

/// All entries, keyed and iterated in canonical key order.
pub(crate) struct Store<T> {
  entries: BTreeMap<CacheKey, Entry<T>>,
  next_id: u64,
}

impl<T> Default for Store<T> {
  fn default() -> Self {
    Self {
      entries: BTreeMap::new(),
      next_id: 0,
    }
  }
}

impl<T> Store<T> {
  /// Fetch the entry for `key`, creating an empty one on first use.
  pub fn get_or_create(&mut self, key: &CacheKey) -> &mut Entry<T> {
    self.entries.entry(key.clone()).or_default()
  }

  pub fn get(&self, key: &CacheKey) -> Option<&Entry<T>> {
    self.entries.get(key)
  }

  pub fn get_mut(&mut self, key: &CacheKey) -> Option<&mut Entry<T>> {
    self.entries.get_mut(key)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &Entry<T>)> {
    self.entries.iter()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = (&CacheKey, &mut Entry<T>)> {
    self.entries.iter_mut()
  }

  /// Ids for subscriptions and requests.
  pub fn next_id(&mut self) -> u64 {
    self.next_id += 1;
    self.next_id
  }

  /// Record that `child`'s data was derived from `superset`, replacing any
  /// previous link of `child`.
  pub fn link(&mut self, child: &CacheKey, superset: &CacheKey) {
    if child == superset {
      return;
    }
    self.unlink(child);
    self
      .get_or_create(superset)
      .dependents
      .insert(child.clone());
    self.get_or_create(child).superset = Some(superset.clone());
  }

  /// Detach `key` from the entry it was derived from, if any.
  pub fn unlink(&mut self, key: &CacheKey) {
    let Some(previous) = self.entries.get_mut(key).and_then(|e| e.superset.take()) else {
      return;
    };
    if let Some(parent) = self.entries.get_mut(&previous) {
      parent.dependents.remove(key);
    }
  }

  /// Remove one observer, handing it back so it is dropped outside the lock.
  pub fn remove_observer(&mut self, key: &CacheKey, id: u64) -> Option<Arc<Subscriber<T>>> {
    self.entries.get_mut(key)?.subscribers.remove(&id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(page: u32, limit: u32) -> CacheKey {
    ListQuery::new(page, limit).key()
  }

  #[test]
  fn test_get_or_create_is_idempotent() {
    let mut store: Store<u32> = Store::default();
    store.get_or_create(&key(1, 10)).loading = true;
    assert!(store.get_or_create(&key(1, 10)).loading);
    assert_eq!(store.iter().count(), 1);
  }

  #[test]
  fn test_link_and_unlink() {
    let mut store: Store<u32> = Store::default();
    let (wide, narrow) = (key(1, 10), key(1, 5));

    store.link(&narrow, &wide);
    assert_eq!(store.get(&narrow).unwrap().superset, Some(wide.clone()));
    assert!(store.get(&wide).unwrap().dependents.contains(&narrow));

    store.unlink(&narrow);
    assert_eq!(store.get(&narrow).unwrap().superset, None);
    assert!(store.get(&wide).unwrap().dependents.is_empty());
    // entries survive unlinking
    assert_eq!(store.iter().count(), 2);
  }

  #[test]
  fn test_relink_moves_dependent() {
    let mut store: Store<u32> = Store::default();
    let (first, second, child) = (key(1, 10), key(1, 20), key(2, 5));

    store.link(&child, &first);
    store.link(&child, &second);

    assert_eq!(store.get(&child).unwrap().superset, Some(second.clone()));
    assert!(store.get(&first).unwrap().dependents.is_empty());
    assert!(store.get(&second).unwrap().dependents.contains(&child));
  }

  #[test]
  fn test_self_link_is_noop() {
    let mut store: Store<u32> = Store::default();
    let k = key(1, 10);
    store.link(&k, &k);
    assert_eq!(store.get(&k).map(|e| e.superset.clone()), None);
  }

  #[derive(Clone, Default)]
  struct Seen(Arc<Mutex<Vec<u64>>>);

  impl Seen {
    fn subscriber(&self) -> Arc<Subscriber<u32>> {
      let seen = Arc::clone(&self.0);
      let observer = move |snapshot: &Snapshot<u32>| {
        let total = snapshot.data.as_ref().map_or(0, |page| page.total_count);
        seen.lock().unwrap().push(total);
      };
      Arc::new(Subscriber::new(Arc::new(observer)))
    }
  }

  fn snapshot(total: u64) -> Snapshot<u32> {
    Snapshot {
      data: Some(Arc::new(ListPage::new(vec![], total, 1, 10))),
      loading: false,
      error: None,
    }
  }

  #[test]
  fn test_subscriber_drops_outdated_snapshots() {
    let seen = Seen::default();
    let subscriber = seen.subscriber();

    subscriber.deliver(2, &snapshot(2));
    subscriber.deliver(1, &snapshot(1));
    subscriber.deliver(2, &snapshot(2));
    subscriber.deliver(3, &snapshot(3));

    assert_eq!(*seen.0.lock().unwrap(), vec![2, 3]);
  }

  #[test]
  fn test_deliveries_carry_increasing_versions() {
    let seen = Seen::default();
    let mut entry: Entry<u32> = Entry::default();
    entry.subscribers.insert(1, seen.subscriber());

    entry.data = Some(Arc::new(ListPage::new(vec![], 1, 1, 10)));
    let first = entry.delivery();
    entry.data = Some(Arc::new(ListPage::new(vec![], 2, 1, 10)));
    let second = entry.delivery();

    // delivered in the opposite order to how they were taken
    second.send();
    first.send();

    assert_eq!(*seen.0.lock().unwrap(), vec![2]);
  }

  #[test]
  fn test_freshness_window() {
    let now = Utc::now();
    let window = Duration::minutes(2);
    assert!(is_within(Some(now - Duration::seconds(119)), now, window));
    assert!(!is_within(Some(now - Duration::seconds(120)), now, window));
    assert!(!is_within(None, now, window));
  }
}
