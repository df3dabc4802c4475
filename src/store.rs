//! Dare store: the ongoing and completed collections and their lifecycle.
//!
//! The store exclusively owns both collections. Each mutation writes the
//! collection(s) it touched to the key-value medium before it returns; if a
//! write fails the in-memory state is left as it was. A dare id is never in
//! both collections at once.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Challenge, Collection, Dare, DareId};
use crate::error::StoreError;

/// Durable key -> string medium. Reads and writes replace whole values.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> io::Result<Option<String>>;
  fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One `<key>.json` file per key inside `dir`. Writes go to a temp file that
/// is renamed over the target, so a crash never leaves a half-written payload.
pub struct FileKvStore {
  dir: PathBuf,
}

impl FileKvStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.dir.join(format!("{key}.json"))
  }
}

impl KeyValueStore for FileKvStore {
  fn get(&self, key: &str) -> io::Result<Option<String>> {
    match std::fs::read_to_string(self.path_for(key)) {
      Ok(s) => Ok(Some(s)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn set(&self, key: &str, value: &str) -> io::Result<()> {
    std::fs::create_dir_all(&self.dir)?;
    let target = self.path_for(key);
    let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));

    let written = OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&tmp)
      .and_then(|mut f| {
        f.write_all(value.as_bytes())?;
        f.sync_all()
      })
      .and_then(|_| std::fs::rename(&tmp, &target));
    if let Err(e) = written {
      let _ = std::fs::remove_file(&tmp);
      return Err(e);
    }

    // Make the rename itself durable.
    #[cfg(unix)]
    std::fs::File::open(&self.dir)?.sync_all()?;
    Ok(())
  }
}

/// In-process medium; nothing survives a restart.
#[derive(Default)]
pub struct MemoryKvStore {
  map: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKvStore {
  fn get(&self, key: &str) -> io::Result<Option<String>> {
    let map = self.map.lock().map_err(|_| io::Error::other("memory store poisoned"))?;
    Ok(map.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> io::Result<()> {
    let mut map = self.map.lock().map_err(|_| io::Error::other("memory store poisoned"))?;
    map.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

/// What `load()` found for one collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionLoad {
  Missing,
  Loaded { count: usize },
  /// Payload unparsable; the collection starts empty and is replaced on the next write.
  Corrupt { reason: String },
  /// The medium failed to read the payload. Nothing writes this key until a
  /// later read succeeds.
  Unreadable { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadReport {
  pub ongoing: CollectionLoad,
  pub completed: CollectionLoad,
  /// Entries dropped because their id was duplicated or present in both collections.
  pub repaired: usize,
}

pub struct DareStore {
  kv: Arc<dyn KeyValueStore>,
  ongoing: Vec<Dare>,
  completed: Vec<Dare>,
  loaded: bool,
  unreadable: HashSet<Collection>,
  last_id: u64,
}

impl DareStore {
  pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
    Self {
      kv,
      ongoing: Vec::new(),
      completed: Vec::new(),
      loaded: false,
      unreadable: HashSet::new(),
      last_id: 0,
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  /// Newest first.
  pub fn ongoing(&self) -> &[Dare] {
    &self.ongoing
  }

  /// Newest first.
  pub fn completed(&self) -> &[Dare] {
    &self.completed
  }

  /// Read both collections. Missing or corrupt payloads become empty
  /// collections; a payload the medium cannot read is fenced off instead.
  /// This never fails.
  #[instrument(level = "info", skip(self))]
  pub fn load(&mut self) -> LoadReport {
    self.unreadable.clear();
    let (completed, completed_status) = self.load_collection(Collection::Completed);
    let (ongoing, ongoing_status) = self.load_collection(Collection::Ongoing);

    self.ongoing = ongoing;
    self.completed = completed;
    self.loaded = true;
    let repaired = self.repair();

    info!(target: "dares", ongoing = self.ongoing.len(), completed = self.completed.len(), "Dare store loaded");
    LoadReport { ongoing: ongoing_status, completed: completed_status, repaired }
  }

  /// Admit a challenge as a new ongoing dare.
  #[instrument(level = "info", skip(self, challenge), fields(title_len = challenge.title.len()))]
  pub fn accept(&mut self, challenge: Challenge) -> Result<Dare, StoreError> {
    self.ensure_loaded()?;
    self.ensure_readable(Collection::Ongoing)?;
    let id = self.next_id()?;
    let dare = Dare { id, challenge, accepted_at: Utc::now(), completed_at: None };

    let mut ongoing = Vec::with_capacity(self.ongoing.len() + 1);
    ongoing.push(dare.clone());
    ongoing.extend(self.ongoing.iter().cloned());
    self.write(Collection::Ongoing, &ongoing)?;

    self.last_id = id.0;
    self.ongoing = ongoing;
    info!(target: "dares", %id, "Dare accepted");
    Ok(dare)
  }

  /// Move an ongoing dare to completed and stamp `completedAt`.
  #[instrument(level = "info", skip(self), fields(%id))]
  pub fn complete(&mut self, id: DareId) -> Result<Dare, StoreError> {
    self.ensure_loaded()?;
    self.ensure_readable(Collection::Ongoing)?;
    self.ensure_readable(Collection::Completed)?;
    let idx = self.position(Collection::Ongoing, id)?;

    let mut dare = self.ongoing[idx].clone();
    dare.completed_at = Some(Utc::now());

    let mut ongoing = self.ongoing.clone();
    ongoing.remove(idx);
    let mut completed = Vec::with_capacity(self.completed.len() + 1);
    completed.push(dare.clone());
    completed.extend(self.completed.iter().cloned());

    // Completed first: if the second write is lost, load() drops the stale ongoing copy.
    self.write(Collection::Completed, &completed)?;
    if let Err(e) = self.write(Collection::Ongoing, &ongoing) {
      if let Err(undo) = self.write(Collection::Completed, &self.completed) {
        warn!(target: "dares", %id, error = %undo, "Could not roll back completed collection");
      }
      return Err(e);
    }

    self.ongoing = ongoing;
    self.completed = completed;
    info!(target: "dares", %id, "Dare completed");
    Ok(dare)
  }

  /// Remove a dare from the named collection only.
  #[instrument(level = "info", skip(self), fields(%id, %from))]
  pub fn delete(&mut self, id: DareId, from: Collection) -> Result<Dare, StoreError> {
    self.ensure_loaded()?;
    self.ensure_readable(from)?;
    let idx = self.position(from, id)?;

    let mut remaining = self.collection(from).to_vec();
    let removed = remaining.remove(idx);
    self.write(from, &remaining)?;

    match from {
      Collection::Ongoing => self.ongoing = remaining,
      Collection::Completed => self.completed = remaining,
    }
    info!(target: "dares", %id, %from, "Dare deleted");
    Ok(removed)
  }

  fn ensure_loaded(&self) -> Result<(), StoreError> {
    if self.loaded { Ok(()) } else { Err(StoreError::NotLoaded) }
  }

  /// Re-read a collection that failed to read at load before anything writes
  /// its key. Until a read succeeds, mutations touching it fail.
  fn ensure_readable(&mut self, c: Collection) -> Result<(), StoreError> {
    if !self.unreadable.contains(&c) {
      return Ok(());
    }
    let (found, status) = self
      .read_collection(c)
      .map_err(|source| StoreError::Unreadable { key: c.key(), source })?;
    info!(target: "dares", collection = %c, ?status, "Previously unreadable collection recovered");

    self.unreadable.remove(&c);
    match c {
      Collection::Ongoing => self.ongoing = found,
      Collection::Completed => self.completed = found,
    }
    self.repair();
    Ok(())
  }

  /// Drop duplicate ids (first occurrence wins) and ongoing copies of
  /// completed dares, then write back what changed. Returns the number of
  /// dropped entries.
  fn repair(&mut self) -> usize {
    let mut repaired = dedupe(&mut self.completed) + dedupe(&mut self.ongoing);

    // A crash between the two writes of `complete` can leave a dare in both; completed wins.
    let done: HashSet<DareId> = self.completed.iter().map(|d| d.id).collect();
    let before = self.ongoing.len();
    self.ongoing.retain(|d| !done.contains(&d.id));
    let overlap = before - self.ongoing.len();
    repaired += overlap;

    let highest = self.ongoing.iter().chain(self.completed.iter()).map(|d| d.id.0).max().unwrap_or(0);
    self.last_id = self.last_id.max(highest);

    if repaired > 0 {
      warn!(target: "dares", repaired, overlap, "Repaired duplicate dare ids");
      for c in [Collection::Ongoing, Collection::Completed] {
        if self.unreadable.contains(&c) {
          continue;
        }
        if let Err(e) = self.write(c, self.collection(c)) {
          warn!(target: "dares", collection = %c, error = %e, "Could not write back repaired collection");
        }
      }
    }
    repaired
  }

  fn collection(&self, c: Collection) -> &[Dare] {
    match c {
      Collection::Ongoing => &self.ongoing,
      Collection::Completed => &self.completed,
    }
  }

  fn position(&self, c: Collection, id: DareId) -> Result<usize, StoreError> {
    self
      .collection(c)
      .iter()
      .position(|d| d.id == id)
      .ok_or(StoreError::NotFound { id, collection: c })
  }

  /// Millisecond clock, bumped past the last issued id so ids never repeat.
  fn next_id(&self) -> Result<DareId, StoreError> {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let bumped = self.last_id.checked_add(1).ok_or(StoreError::IdsExhausted { last: DareId(self.last_id) })?;
    Ok(DareId(now.max(bumped)))
  }

  fn load_collection(&mut self, c: Collection) -> (Vec<Dare>, CollectionLoad) {
    match self.read_collection(c) {
      Ok(found) => found,
      Err(e) => {
        warn!(target: "dares", collection = %c, error = %e, "Persisted collection unreadable; writes to it are refused until it can be read");
        self.unreadable.insert(c);
        (Vec::new(), CollectionLoad::Unreadable { reason: e.to_string() })
      }
    }
  }

  fn read_collection(&self, c: Collection) -> io::Result<(Vec<Dare>, CollectionLoad)> {
    let raw = match self.kv.get(c.key())? {
      Some(s) if !s.trim().is_empty() => s,
      _ => {
        debug!(target: "dares", collection = %c, "No persisted collection; starting empty");
        return Ok((Vec::new(), CollectionLoad::Missing));
      }
    };
    Ok(match serde_json::from_str::<Vec<Dare>>(&raw) {
      Ok(dares) => {
        let count = dares.len();
        (dares, CollectionLoad::Loaded { count })
      }
      Err(e) => {
        warn!(target: "dares", collection = %c, error = %e, bytes = raw.len(), "Persisted collection corrupt; starting empty");
        (Vec::new(), CollectionLoad::Corrupt { reason: e.to_string() })
      }
    })
  }

  fn write(&self, c: Collection, dares: &[Dare]) -> Result<(), StoreError> {
    let key = c.key();
    let payload = serde_json::to_string(dares).map_err(|e| StoreError::Persistence { key, source: e.into() })?;
    self.kv.set(key, &payload).map_err(|source| StoreError::Persistence { key, source })?;
    debug!(target: "dares", collection = %c, count = dares.len(), bytes = payload.len(), "Collection persisted");
    Ok(())
  }
}

/// Keep the first occurrence of each id. Returns how many were dropped.
fn dedupe(dares: &mut Vec<Dare>) -> usize {
  let mut seen = HashSet::new();
  let before = dares.len();
  dares.retain(|d| seen.insert(d.id));
  before - dares.len()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  use crate::domain::Difficulty;

  fn challenge(title: &str) -> Challenge {
    Challenge {
      title: title.into(),
      difficulty: Difficulty::Medium,
      estimated_time: "15 minutes".into(),
      steps: vec!["Start".into(), "Finish".into()],
      fun_fact: "Fun.".into(),
    }
  }

  fn loaded_store() -> (Arc<MemoryKvStore>, DareStore) {
    let kv = Arc::new(MemoryKvStore::default());
    let mut store = DareStore::new(kv.clone());
    store.load();
    (kv, store)
  }

  fn ids(dares: &[Dare]) -> Vec<DareId> {
    dares.iter().map(|d| d.id).collect()
  }

  fn assert_disjoint(store: &DareStore) {
    let on: HashSet<DareId> = ids(store.ongoing()).into_iter().collect();
    assert!(store.completed().iter().all(|d| !on.contains(&d.id)), "collections overlap");
  }

  /// Fails writes on demand.
  #[derive(Default)]
  struct FlakyKv {
    inner: MemoryKvStore,
    fail_key: Mutex<Option<&'static str>>,
    failed: AtomicBool,
    fail_reads: AtomicBool,
  }

  impl KeyValueStore for FlakyKv {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
      if self.fail_reads.load(Ordering::SeqCst) {
        return Err(io::Error::other("EIO"));
      }
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
      if *self.fail_key.lock().expect("lock") == Some(key) {
        self.failed.store(true, Ordering::SeqCst);
        return Err(io::Error::other("disk full"));
      }
      self.inner.set(key, value)
    }
  }

  #[test]
  fn mutations_before_load_are_rejected() {
    let kv = Arc::new(MemoryKvStore::default());
    kv.set("ongoing", "[]").expect("seed");
    let mut store = DareStore::new(kv.clone());
    assert!(matches!(store.accept(challenge("early")), Err(StoreError::NotLoaded)));
    assert!(matches!(store.complete(DareId(1)), Err(StoreError::NotLoaded)));
    assert!(matches!(store.delete(DareId(1), Collection::Ongoing), Err(StoreError::NotLoaded)));
    // nothing was overwritten
    assert_eq!(kv.get("ongoing").expect("get").as_deref(), Some("[]"));
    assert_eq!(kv.get("completed").expect("get"), None);
  }

  #[test]
  fn accept_prepends_and_persists_ongoing() {
    let (kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept a");
    let b = store.accept(challenge("b")).expect("accept b");

    assert_ne!(a.id, b.id);
    assert!(b.id > a.id);
    assert_eq!(ids(store.ongoing()), vec![b.id, a.id]);
    assert!(a.completed_at.is_none());

    let raw = kv.get("ongoing").expect("get").expect("persisted");
    let on_disk: Vec<Dare> = serde_json::from_str(&raw).expect("parse");
    assert_eq!(on_disk, store.ongoing());
  }

  #[test]
  fn complete_moves_and_stamps() {
    let (kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept");
    let done = store.complete(a.id).expect("complete");

    assert!(done.completed_at.is_some());
    assert_eq!(done.accepted_at, a.accepted_at);
    assert!(store.ongoing().is_empty());
    assert_eq!(ids(store.completed()), vec![a.id]);
    assert_disjoint(&store);

    let on_disk: Vec<Dare> = serde_json::from_str(&kv.get("completed").expect("get").expect("persisted")).expect("parse");
    assert_eq!(on_disk[0].completed_at, done.completed_at);
    assert_eq!(kv.get("ongoing").expect("get").as_deref(), Some("[]"));
  }

  #[test]
  fn complete_unknown_id_changes_nothing() {
    let (_kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept");
    store.complete(a.id).expect("complete");
    let b = store.accept(challenge("b")).expect("accept");

    let before = (store.ongoing().to_vec(), store.completed().to_vec());
    // already completed: not in ongoing any more
    assert!(matches!(store.complete(a.id), Err(StoreError::NotFound { collection: Collection::Ongoing, .. })));
    assert!(matches!(store.complete(DareId(42)), Err(StoreError::NotFound { .. })));
    assert_eq!((store.ongoing().to_vec(), store.completed().to_vec()), before);
    assert_eq!(ids(store.ongoing()), vec![b.id]);
  }

  #[test]
  fn delete_only_touches_the_named_collection() {
    let (_kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept");
    let b = store.accept(challenge("b")).expect("accept");
    store.complete(a.id).expect("complete");
    let completed_before = store.completed().to_vec();

    // wrong origin is NotFound even though the id exists elsewhere
    assert!(matches!(store.delete(a.id, Collection::Ongoing), Err(StoreError::NotFound { .. })));

    let removed = store.delete(b.id, Collection::Ongoing).expect("delete");
    assert_eq!(removed.id, b.id);
    assert!(store.ongoing().is_empty());
    assert_eq!(store.completed(), completed_before.as_slice());

    let c = store.accept(challenge("c")).expect("accept");
    let ongoing_before = store.ongoing().to_vec();
    assert!(matches!(store.delete(c.id, Collection::Completed), Err(StoreError::NotFound { .. })));

    store.delete(a.id, Collection::Completed).expect("prune history");
    assert!(store.completed().is_empty());
    assert_eq!(store.ongoing(), ongoing_before.as_slice());
    assert_eq!(ids(store.ongoing()), vec![c.id]);
  }

  #[test]
  fn deleting_twice_is_success_then_not_found() {
    let (kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept");
    store.accept(challenge("b")).expect("accept");

    store.delete(a.id, Collection::Ongoing).expect("first delete");
    let after_one = (store.ongoing().to_vec(), kv.get("ongoing").expect("get"));
    assert!(matches!(store.delete(a.id, Collection::Ongoing), Err(StoreError::NotFound { .. })));
    let after_two = (store.ongoing().to_vec(), kv.get("ongoing").expect("get"));
    assert_eq!(after_one, after_two);
  }

  #[test]
  fn reload_reproduces_both_collections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kv = Arc::new(FileKvStore::new(dir.path().join("dares")));
    let mut store = DareStore::new(kv.clone());
    store.load();
    let a = store.accept(challenge("a")).expect("accept");
    store.accept(challenge("b")).expect("accept");
    store.accept(challenge("c")).expect("accept");
    store.complete(a.id).expect("complete");

    let mut reloaded = DareStore::new(kv);
    let report = reloaded.load();
    assert_eq!(report.ongoing, CollectionLoad::Loaded { count: 2 });
    assert_eq!(report.completed, CollectionLoad::Loaded { count: 1 });
    assert_eq!(reloaded.ongoing(), store.ongoing());
    assert_eq!(reloaded.completed(), store.completed());

    // ids keep increasing across restarts
    let d = reloaded.accept(challenge("d")).expect("accept");
    assert!(store.ongoing().iter().all(|x| x.id < d.id));
  }

  #[test]
  fn corrupt_or_missing_payloads_load_empty() {
    let kv = Arc::new(MemoryKvStore::default());
    kv.set("ongoing", "{not json").expect("seed");
    let mut store = DareStore::new(kv.clone());
    let report = store.load();

    assert!(matches!(report.ongoing, CollectionLoad::Corrupt { .. }));
    assert_eq!(report.completed, CollectionLoad::Missing);
    assert!(store.is_loaded());
    assert!(store.ongoing().is_empty());

    // the store is usable and overwrites the bad payload on the next mutation
    store.accept(challenge("fresh")).expect("accept");
    let raw = kv.get("ongoing").expect("get").expect("persisted");
    assert_eq!(serde_json::from_str::<Vec<Dare>>(&raw).expect("parse").len(), 1);
  }

  #[test]
  fn unreadable_payload_is_never_overwritten() {
    let kv = Arc::new(FlakyKv::default());
    let mut first = DareStore::new(kv.clone());
    first.load();
    for title in ["a", "b", "c"] {
      first.accept(challenge(title)).expect("seed");
    }
    let persisted = kv.get("ongoing").expect("get");

    kv.fail_reads.store(true, Ordering::SeqCst);
    let mut store = DareStore::new(kv.clone());
    let report = store.load();
    assert!(matches!(report.ongoing, CollectionLoad::Unreadable { .. }));
    assert!(matches!(report.completed, CollectionLoad::Unreadable { .. }));
    assert!(store.is_loaded());

    assert!(matches!(store.accept(challenge("d")), Err(StoreError::Unreadable { key: "ongoing", .. })));
    assert!(matches!(store.delete(DareId(1), Collection::Ongoing), Err(StoreError::Unreadable { .. })));
    assert!(matches!(store.complete(DareId(1)), Err(StoreError::Unreadable { .. })));
    assert_eq!(kv.inner.get("ongoing").expect("get"), persisted);
    assert_eq!(kv.inner.get("completed").expect("get"), None);

    // reads work again: the stored dares come back before the new one lands
    kv.fail_reads.store(false, Ordering::SeqCst);
    let d = store.accept(challenge("d")).expect("accept after recovery");
    assert_eq!(store.ongoing().len(), 4);
    assert_eq!(store.ongoing()[0].id, d.id);
    assert!(first.ongoing().iter().all(|x| x.id < d.id));
    let on_disk: Vec<Dare> = serde_json::from_str(&kv.get("ongoing").expect("get").expect("persisted")).expect("parse");
    assert_eq!(on_disk, store.ongoing());
  }

  #[test]
  fn highest_possible_id_does_not_panic() {
    let kv = Arc::new(MemoryKvStore::default());
    let last = Dare { id: DareId(u64::MAX), challenge: challenge("last"), accepted_at: Utc::now(), completed_at: None };
    kv.set("ongoing", &serde_json::to_string(&vec![last]).expect("encode")).expect("seed");

    let mut store = DareStore::new(kv.clone());
    store.load();
    assert!(matches!(store.accept(challenge("next")), Err(StoreError::IdsExhausted { .. })));
    assert_eq!(ids(store.ongoing()), vec![DareId(u64::MAX)]);

    // the existing dare can still move through its lifecycle
    store.complete(DareId(u64::MAX)).expect("complete");
    assert_eq!(ids(store.completed()), vec![DareId(u64::MAX)]);
  }

  #[test]
  fn file_store_replaces_whole_values_without_leftovers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let kv = FileKvStore::new(dir.path().join("nested"));
    assert_eq!(kv.get("ongoing").expect("get"), None);

    kv.set("ongoing", "[1,2,3]").expect("first write");
    kv.set("ongoing", "[]").expect("second write");
    assert_eq!(kv.get("ongoing").expect("get").as_deref(), Some("[]"));

    let names: Vec<String> = std::fs::read_dir(kv.dir())
      .expect("read dir")
      .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["ongoing.json".to_string()]);
  }

  #[test]
  fn load_repairs_overlap_in_favor_of_completed() {
    let (kv, mut store) = loaded_store();
    let a = store.accept(challenge("a")).expect("accept");
    let stale_ongoing = kv.get("ongoing").expect("get").expect("persisted");
    store.complete(a.id).expect("complete");
    // simulate a crash after the completed write but before the ongoing write
    kv.set("ongoing", &stale_ongoing).expect("seed");

    let mut reloaded = DareStore::new(kv.clone());
    let report = reloaded.load();
    assert_eq!(report.repaired, 1);
    assert!(reloaded.ongoing().is_empty());
    assert_eq!(ids(reloaded.completed()), vec![a.id]);
    assert_eq!(kv.get("ongoing").expect("get").as_deref(), Some("[]"));
  }

  #[test]
  fn failed_write_leaves_state_unchanged() {
    let kv = Arc::new(FlakyKv::default());
    let mut store = DareStore::new(kv.clone());
    store.load();
    let a = store.accept(challenge("a")).expect("accept");

    *kv.fail_key.lock().expect("lock") = Some("ongoing");
    assert!(matches!(store.accept(challenge("b")), Err(StoreError::Persistence { key: "ongoing", .. })));
    assert!(matches!(store.complete(a.id), Err(StoreError::Persistence { .. })));
    assert!(kv.failed.load(Ordering::SeqCst));

    assert_eq!(ids(store.ongoing()), vec![a.id]);
    assert!(store.completed().is_empty());
    // completed payload was rolled back too
    assert_eq!(kv.get("completed").expect("get").as_deref(), Some("[]"));
  }

  #[test]
  fn random_walk_keeps_collections_disjoint() {
    let (_kv, mut store) = loaded_store();
    let mut issued = Vec::new();
    for round in 0..60u64 {
      match round % 5 {
        0 | 1 => issued.push(store.accept(challenge("x")).expect("accept").id),
        2 => {
          if let Some(id) = issued.get((round as usize * 7) % issued.len().max(1)) {
            let _ = store.complete(*id);
          }
        }
        3 => {
          if let Some(id) = issued.get((round as usize * 3) % issued.len().max(1)) {
            let _ = store.delete(*id, Collection::Completed);
          }
        }
        _ => {
          if let Some(id) = issued.first() {
            let _ = store.delete(*id, Collection::Ongoing);
          }
        }
      }
      assert_disjoint(&store);
    }
  }
}
