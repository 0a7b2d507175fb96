//! # fennec-cache
//!
//! TTL-bounded response caching for the fennec resolver.
//!
//! Two instances of [`RecordCache`] exist in a running server: the lookup
//! cache, which holds upstream responses, honors TTLs, and is swept by a
//! background reaper; and the hosted cache, which holds records loaded from
//! zone files, never expires, and never runs a reaper.
//!
//! The cache is a single map under a reader-writer lock. `get` takes the
//! shared lock, everything else takes the exclusive lock, and no caller ever
//! holds either across I/O.

use fennec_proto::{Message, RecordType};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default interval between reaper sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Lowercases a domain name and ensures the trailing dot, producing the
/// canonical cache key form. DNS names are case-insensitive; keying is where
/// that gets enforced.
pub fn canonical_key(name: &str) -> String {
    let mut key = name.to_ascii_lowercase();
    if !key.ends_with('.') {
        key.push('.');
    }
    key
}

/// A cached DNS response: the message plus its creation time and derived
/// lifetime.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Canonical (lowercased) owner name.
    pub key: String,

    /// Record type the response answers.
    pub qtype: RecordType,

    /// The cached message.
    pub message: Message,

    /// When the response was inserted.
    pub created: Instant,

    /// Lifetime, derived from the minimum answer TTL.
    pub ttl: Duration,
}

impl CachedResponse {
    /// Creates a cache entry for `message`, deriving the lifetime from the
    /// minimum TTL across its answers. A message without answers gets a zero
    /// lifetime and will never be resident in a TTL-honoring cache.
    pub fn new(name: &str, qtype: RecordType, message: Message) -> Self {
        let ttl = Duration::from_secs(u64::from(message.min_answer_ttl()));
        Self::with_ttl(name, qtype, message, ttl)
    }

    /// Creates a cache entry with an explicit lifetime.
    pub fn with_ttl(name: &str, qtype: RecordType, message: Message, ttl: Duration) -> Self {
        Self {
            key: canonical_key(name),
            qtype,
            message,
            created: Instant::now(),
            ttl,
        }
    }

    /// Returns true once the entry's lifetime has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.created + self.ttl
    }
}

struct Reaper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type ResponseMap = HashMap<(String, RecordType), CachedResponse>;

/// A concurrent map from (name, record type) to cached responses.
pub struct RecordCache {
    // Shared with the reaper task, which holds its own handle to the map.
    map: Arc<RwLock<ResponseMap>>,
    sweep_interval: Duration,
    honor_ttl: bool,
    reaper: Mutex<Option<Reaper>>,
}

impl RecordCache {
    /// Creates a TTL-honoring cache. Call [`RecordCache::start_reaper`] to
    /// begin background sweeps.
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::new())),
            sweep_interval,
            honor_ttl: true,
            reaper: Mutex::new(None),
        }
    }

    /// Creates the hosted cache: entries never expire and no reaper runs, so
    /// zone records stay resident for the life of the process.
    pub fn hosted() -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::new())),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            honor_ttl: false,
            reaper: Mutex::new(None),
        }
    }

    /// Looks up a response. Expired entries report as misses; physical
    /// removal is left to the reaper.
    pub fn get(&self, name: &str, qtype: RecordType) -> Option<CachedResponse> {
        let key = (canonical_key(name), qtype);
        let map = self.map.read();
        let entry = map.get(&key)?;

        if self.honor_ttl && entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.clone())
    }

    /// Inserts a response, replacing any previous entry for the same key.
    /// In a TTL-honoring cache a zero-lifetime response is dropped instead
    /// of stored.
    pub fn add(&self, response: CachedResponse) {
        if self.honor_ttl && response.ttl.is_zero() {
            trace!(key = %response.key, qtype = %response.qtype, "not caching zero-ttl response");
            return;
        }

        let key = (response.key.clone(), response.qtype);
        self.map.write().insert(key, response);
    }

    /// Removes an entry. Idempotent.
    pub fn remove(&self, name: &str, qtype: RecordType) {
        self.map.write().remove(&(canonical_key(name), qtype));
    }

    /// Returns the number of resident entries, expired or not.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Removes every expired entry and returns how many were dropped. The
    /// exclusive lock is taken once for the whole scan.
    pub fn sweep(&self) -> usize {
        sweep_map(&self.map)
    }

    /// Starts the background reaper. Idempotent; a second call does nothing.
    pub fn start_reaper(&self) {
        let mut slot = self.reaper.lock();
        if slot.is_some() {
            return;
        }

        let (shutdown, mut rx) = watch::channel(false);
        let map = self.map.clone();
        let interval = self.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh cache
            // isn't swept before anything is inserted.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = sweep_map(&map);
                        if removed > 0 {
                            debug!(removed, "reaper swept expired cache entries");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });

        *slot = Some(Reaper { shutdown, task });
    }

    /// Stops the reaper. Safe to call before `start_reaper` or repeatedly.
    pub fn stop(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            let _ = reaper.shutdown.send(true);
            reaper.task.abort();
        }
    }
}

impl Drop for RecordCache {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep_map(map: &RwLock<ResponseMap>) -> usize {
    let now = Instant::now();
    let mut map = map.write();
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired(now));
    before - map.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fennec_proto::{Name, Question, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_response(name: &str, ttl: u32, addr: Ipv4Addr) -> CachedResponse {
        let qname = Name::from_str(name).unwrap();
        let mut message = Message::query(Question::a(qname.clone()));
        message.add_answer(ResourceRecord::a(qname, ttl, addr));
        CachedResponse::new(name, RecordType::A, message)
    }

    #[test]
    fn canonical_key_lowercases_and_dots() {
        assert_eq!(canonical_key("Example.COM"), "example.com.");
        assert_eq!(canonical_key("example.com."), "example.com.");
    }

    #[test]
    fn round_trip() {
        let cache = RecordCache::new(DEFAULT_SWEEP_INTERVAL);
        cache.add(a_response("example.com", 60, Ipv4Addr::new(1, 2, 3, 4)));

        let hit = cache.get("example.com", RecordType::A).unwrap();
        assert_eq!(hit.key, "example.com.");
        assert_eq!(hit.message.answers().len(), 1);

        // Lookup is case-insensitive.
        assert!(cache.get("EXAMPLE.com", RecordType::A).is_some());
        assert!(cache.get("example.com", RecordType::AAAA).is_none());
    }

    #[test]
    fn latest_insert_wins() {
        let cache = RecordCache::new(DEFAULT_SWEEP_INTERVAL);
        cache.add(a_response("example.com", 60, Ipv4Addr::new(1, 1, 1, 1)));
        cache.add(a_response("example.com", 60, Ipv4Addr::new(2, 2, 2, 2)));

        assert_eq!(cache.len(), 1);
        let hit = cache.get("example.com", RecordType::A).unwrap();
        assert_eq!(
            hit.message.answers()[0].rdata.as_a(),
            Some(Ipv4Addr::new(2, 2, 2, 2))
        );
    }

    #[test]
    fn expired_entries_miss() {
        let cache = RecordCache::new(DEFAULT_SWEEP_INTERVAL);
        let mut response = a_response("example.com", 60, Ipv4Addr::new(1, 2, 3, 4));
        response.ttl = Duration::from_millis(10);
        cache.add(response);

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("example.com", RecordType::A).is_none());
        // Still physically resident until a sweep.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn derived_ttl_is_minimum_answer_ttl() {
        let qname = Name::from_str("example.com").unwrap();
        let mut message = Message::query(Question::a(qname.clone()));
        message.add_answer(ResourceRecord::a(qname.clone(), 300, Ipv4Addr::new(1, 1, 1, 1)));
        message.add_answer(ResourceRecord::a(qname, 20, Ipv4Addr::new(2, 2, 2, 2)));

        let response = CachedResponse::new("example.com", RecordType::A, message);
        assert_eq!(response.ttl, Duration::from_secs(20));
    }

    #[test]
    fn zero_ttl_responses_are_not_resident() {
        let cache = RecordCache::new(DEFAULT_SWEEP_INTERVAL);
        let qname = Name::from_str("example.com").unwrap();
        let message = Message::query(Question::a(qname));

        cache.add(CachedResponse::new("example.com", RecordType::A, message));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let cache = RecordCache::new(DEFAULT_SWEEP_INTERVAL);
        cache.add(a_response("example.com", 60, Ipv4Addr::new(1, 2, 3, 4)));

        cache.remove("example.com", RecordType::A);
        cache.remove("example.com", RecordType::A);
        assert!(cache.get("example.com", RecordType::A).is_none());
    }

    #[test]
    fn hosted_cache_never_expires() {
        let cache = RecordCache::hosted();
        let mut response = a_response("local.test", 1, Ipv4Addr::new(10, 0, 0, 1));
        response.ttl = Duration::from_millis(1);
        cache.add(response);

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("local.test", RecordType::A).is_some());
    }

    #[test]
    fn hosted_cache_keeps_zero_ttl_records() {
        let cache = RecordCache::hosted();
        let mut response = a_response("local.test", 0, Ipv4Addr::new(10, 0, 0, 1));
        response.ttl = Duration::ZERO;
        cache.add(response);

        assert!(cache.get("local.test", RecordType::A).is_some());
    }

    #[tokio::test]
    async fn reaper_sweeps_expired_entries() {
        let cache = Arc::new(RecordCache::new(Duration::from_millis(50)));
        for (i, name) in ["a.test", "b.test", "c.test"].iter().enumerate() {
            let mut response = a_response(name, 60, Ipv4Addr::new(10, 0, 0, i as u8));
            response.ttl = Duration::from_millis(100);
            cache.add(response);
        }
        assert_eq!(cache.len(), 3);

        cache.start_reaper();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(cache.len(), 0);
        assert!(cache.get("a.test", RecordType::A).is_none());
        cache.stop();
    }

    #[tokio::test]
    async fn reaper_start_is_idempotent_and_stop_is_safe() {
        let cache = Arc::new(RecordCache::new(Duration::from_millis(50)));
        cache.stop(); // before start

        cache.start_reaper();
        cache.start_reaper();
        cache.stop();
        cache.stop();
    }
}
