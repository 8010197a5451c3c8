//! Sharded Tablet Store
//!
//! The data side of the in-process backend: one [`TabletStore`] per table.
//! It holds string and hash values with optional TTL and executes backend
//! requests with Redis semantics.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TabletStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads take the shard's read lock; writes take its write lock. Expired
//! entries are treated as absent and removed lazily on access.

use crate::client::{ReadRequest, RedisResponse, SetMode, WriteRequest};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards per tablet store.
const NUM_SHARDS: usize = 64;

const NOT_AN_INTEGER: &str = "value is not an integer or out of range";
const INCR_OVERFLOW: &str = "increment or decrement would overflow";

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
}

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// A TTL too large to represent as an `Instant` never expires.
    pub fn with_ttl(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Operation counters for a tablet store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabletStats {
    pub keys: u64,
    pub reads: u64,
    pub writes: u64,
    pub expired: u64,
}

/// Storage for one table.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use flashgate::client::{ReadRequest, RedisResponse, SetMode, WriteRequest};
/// use flashgate::storage::TabletStore;
///
/// let store = TabletStore::new();
/// store.write(&WriteRequest::Set {
///     key: Bytes::from("name"),
///     value: Bytes::from("Ariz"),
///     ttl: None,
///     mode: SetMode::Always,
/// });
///
/// let response = store.read(&ReadRequest::Get { key: Bytes::from("name") });
/// assert_eq!(response, RedisResponse::Bulk(Bytes::from("Ariz")));
/// ```
pub struct TabletStore {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    read_count: AtomicU64,
    write_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for TabletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabletStore")
            .field("shards", &self.shards.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for TabletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TabletStore {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Executes a read request.
    pub fn read(&self, request: &ReadRequest) -> RedisResponse {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        match request {
            ReadRequest::Get { key } => self.with_live(key, |entry| match entry {
                None => RedisResponse::Nil,
                Some(Value::String(v)) => RedisResponse::Bulk(v.clone()),
                Some(Value::Hash(_)) => RedisResponse::WrongType,
            }),
            ReadRequest::HGet { key, field } => self.with_live(key, |entry| match entry {
                None => RedisResponse::Nil,
                Some(Value::Hash(fields)) => fields
                    .get(field)
                    .cloned()
                    .map_or(RedisResponse::Nil, RedisResponse::Bulk),
                Some(Value::String(_)) => RedisResponse::WrongType,
            }),
            ReadRequest::StrLen { key } => self.with_live(key, |entry| match entry {
                None => RedisResponse::Integer(0),
                Some(Value::String(v)) => RedisResponse::Integer(v.len() as i64),
                Some(Value::Hash(_)) => RedisResponse::WrongType,
            }),
            ReadRequest::Exists { key } => {
                self.with_live(key, |entry| RedisResponse::Integer(entry.is_some() as i64))
            }
            ReadRequest::GetRange { key, start, end } => {
                self.with_live(key, |entry| match entry {
                    None => RedisResponse::Bulk(Bytes::new()),
                    Some(Value::String(v)) => RedisResponse::Bulk(substring(v, *start, *end)),
                    Some(Value::Hash(_)) => RedisResponse::WrongType,
                })
            }
        }
    }

    /// Executes a write request.
    pub fn write(&self, request: &WriteRequest) -> RedisResponse {
        self.write_count.fetch_add(1, Ordering::Relaxed);

        match request {
            WriteRequest::Set {
                key,
                value,
                ttl,
                mode,
            } => self.set(key, value, *ttl, *mode),
            WriteRequest::HSet { key, field, value } => self.hset(key, field, value),
            WriteRequest::GetSet { key, value } => self.getset(key, value),
            WriteRequest::Append { key, value } => self.append(key, value),
            WriteRequest::Del { key } => self.del(key),
            WriteRequest::SetRange { key, offset, value } => self.setrange(key, *offset, value),
            WriteRequest::Incr { key, delta } => self.incr_by(key, *delta),
        }
    }

    /// Runs `f` against the live value under the shard's read lock.
    ///
    /// An expired entry is passed as `None` and then removed.
    fn with_live<T>(&self, key: &Bytes, f: impl FnOnce(Option<&Value>) -> T) -> T {
        let shard = self.shard(key);

        let expired = {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return f(Some(&entry.value)),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.remove_if_expired(&mut shard.write(), key);
        }
        f(None)
    }

    /// Drops an expired entry so write paths see the key as absent.
    fn remove_if_expired(&self, data: &mut HashMap<Bytes, Entry>, key: &Bytes) {
        if data.get(key).is_some_and(Entry::is_expired) {
            data.remove(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn insert(&self, data: &mut HashMap<Bytes, Entry>, key: &Bytes, entry: Entry) {
        if data.insert(key.clone(), entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn set(&self, key: &Bytes, value: &Bytes, ttl: Option<Duration>, mode: SetMode) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        let exists = data.contains_key(key);
        match mode {
            SetMode::IfAbsent if exists => return RedisResponse::Nil,
            SetMode::IfPresent if !exists => return RedisResponse::Nil,
            _ => {}
        }

        self.insert(
            &mut data,
            key,
            Entry::with_ttl(Value::String(value.clone()), ttl),
        );
        RedisResponse::Ok
    }

    fn hset(&self, key: &Bytes, field: &Bytes, value: &Bytes) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        match data.get_mut(key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                let added = fields.insert(field.clone(), value.clone()).is_none();
                RedisResponse::Integer(added as i64)
            }
            Some(_) => RedisResponse::WrongType,
            None => {
                let fields = HashMap::from([(field.clone(), value.clone())]);
                self.insert(&mut data, key, Entry::new(Value::Hash(fields)));
                RedisResponse::Integer(1)
            }
        }
    }

    fn getset(&self, key: &Bytes, value: &Bytes) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        let previous = match data.get(key) {
            Some(Entry {
                value: Value::Hash(_),
                ..
            }) => return RedisResponse::WrongType,
            Some(Entry {
                value: Value::String(old),
                ..
            }) => RedisResponse::Bulk(old.clone()),
            None => RedisResponse::Nil,
        };

        self.insert(&mut data, key, Entry::new(Value::String(value.clone())));
        previous
    }

    fn append(&self, key: &Bytes, value: &Bytes) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        match data.get_mut(key) {
            Some(Entry {
                value: Value::String(current),
                ..
            }) => {
                let mut joined = BytesMut::with_capacity(current.len() + value.len());
                joined.extend_from_slice(current);
                joined.extend_from_slice(value);
                *current = joined.freeze();
                RedisResponse::Integer(current.len() as i64)
            }
            Some(_) => RedisResponse::WrongType,
            None => {
                self.insert(&mut data, key, Entry::new(Value::String(value.clone())));
                RedisResponse::Integer(value.len() as i64)
            }
        }
    }

    fn del(&self, key: &Bytes) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        if data.remove(key).is_some() {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            RedisResponse::Integer(1)
        } else {
            RedisResponse::Integer(0)
        }
    }

    fn setrange(&self, key: &Bytes, offset: usize, value: &Bytes) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        let current = match data.get(key) {
            Some(Entry {
                value: Value::Hash(_),
                ..
            }) => return RedisResponse::WrongType,
            Some(Entry {
                value: Value::String(current),
                ..
            }) => current.clone(),
            None if value.is_empty() => return RedisResponse::Integer(0),
            None => Bytes::new(),
        };

        if value.is_empty() {
            return RedisResponse::Integer(current.len() as i64);
        }

        let mut updated = BytesMut::from(&current[..]);
        let end = offset + value.len();
        if updated.len() < end {
            updated.resize(end, 0);
        }
        updated[offset..end].copy_from_slice(value);
        let len = updated.len();

        match data.get_mut(key) {
            Some(entry) => entry.value = Value::String(updated.freeze()),
            None => self.insert(&mut data, key, Entry::new(Value::String(updated.freeze()))),
        }
        RedisResponse::Integer(len as i64)
    }

    fn incr_by(&self, key: &Bytes, delta: i64) -> RedisResponse {
        let mut data = self.shard(key).write();
        self.remove_if_expired(&mut data, key);

        let current = match data.get(key) {
            Some(Entry {
                value: Value::Hash(_),
                ..
            }) => return RedisResponse::WrongType,
            Some(Entry {
                value: Value::String(raw),
                ..
            }) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse::<i64>().ok()) {
                Some(n) => n,
                None => return RedisResponse::Error(NOT_AN_INTEGER.to_string()),
            },
            None => 0,
        };

        let Some(next) = current.checked_add(delta) else {
            return RedisResponse::Error(INCR_OVERFLOW.to_string());
        };

        let encoded = Value::String(Bytes::from(next.to_string()));
        match data.get_mut(key) {
            Some(entry) => entry.value = encoded,
            None => self.insert(&mut data, key, Entry::new(encoded)),
        }
        RedisResponse::Integer(next)
    }

    /// Returns the approximate number of keys.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TabletStats {
        TabletStats {
            keys: self.key_count.load(Ordering::Relaxed),
            reads: self.read_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// GETRANGE index arithmetic: negative offsets count from the end and the
/// range is inclusive on both sides.
fn substring(value: &Bytes, start: i64, end: i64) -> Bytes {
    let len = value.len() as i64;
    if len == 0 {
        return Bytes::new();
    }

    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { (len + end).max(0) } else { end.min(len - 1) };
    if start > end || start >= len {
        return Bytes::new();
    }

    value.slice(start as usize..=end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn set(store: &TabletStore, key: &str, value: &str) -> RedisResponse {
        store.write(&WriteRequest::Set {
            key: b(key),
            value: b(value),
            ttl: None,
            mode: SetMode::Always,
        })
    }

    fn get(store: &TabletStore, key: &str) -> RedisResponse {
        store.read(&ReadRequest::Get { key: b(key) })
    }

    #[test]
    fn test_set_and_get() {
        let store = TabletStore::new();
        assert_eq!(set(&store, "key", "value"), RedisResponse::Ok);
        assert_eq!(get(&store, "key"), RedisResponse::Bulk(b("value")));
        assert_eq!(get(&store, "missing"), RedisResponse::Nil);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_modes() {
        let store = TabletStore::new();
        let nx = |v: &str| WriteRequest::Set {
            key: b("k"),
            value: b(v),
            ttl: None,
            mode: SetMode::IfAbsent,
        };
        let xx = |v: &str| WriteRequest::Set {
            key: b("k"),
            value: b(v),
            ttl: None,
            mode: SetMode::IfPresent,
        };

        assert_eq!(store.write(&xx("a")), RedisResponse::Nil);
        assert_eq!(store.write(&nx("b")), RedisResponse::Ok);
        assert_eq!(store.write(&nx("c")), RedisResponse::Nil);
        assert_eq!(store.write(&xx("d")), RedisResponse::Ok);
        assert_eq!(get(&store, "k"), RedisResponse::Bulk(b("d")));
    }

    #[test]
    fn test_expiry() {
        let store = TabletStore::new();
        store.write(&WriteRequest::Set {
            key: b("key"),
            value: b("value"),
            ttl: Some(Duration::from_millis(50)),
            mode: SetMode::Always,
        });

        assert_eq!(
            store.read(&ReadRequest::Exists { key: b("key") }),
            RedisResponse::Integer(1)
        );

        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(get(&store, "key"), RedisResponse::Nil);
        assert_eq!(store.stats().expired, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let entry = Entry::with_ttl(Value::String(b("v")), Some(Duration::MAX));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());

        let store = TabletStore::new();
        store.write(&WriteRequest::Set {
            key: b("k"),
            value: b("v"),
            ttl: Some(Duration::MAX),
            mode: SetMode::Always,
        });
        assert_eq!(get(&store, "k"), RedisResponse::Bulk(b("v")));
    }

    #[test]
    fn test_hash_and_wrong_type() {
        let store = TabletStore::new();
        let hset = |f: &str, v: &str| WriteRequest::HSet {
            key: b("h"),
            field: b(f),
            value: b(v),
        };

        assert_eq!(store.write(&hset("f1", "v1")), RedisResponse::Integer(1));
        assert_eq!(store.write(&hset("f1", "v2")), RedisResponse::Integer(0));
        assert_eq!(
            store.read(&ReadRequest::HGet {
                key: b("h"),
                field: b("f1")
            }),
            RedisResponse::Bulk(b("v2"))
        );
        assert_eq!(
            store.read(&ReadRequest::HGet {
                key: b("h"),
                field: b("nope")
            }),
            RedisResponse::Nil
        );

        assert_eq!(get(&store, "h"), RedisResponse::WrongType);
        set(&store, "s", "x");
        assert_eq!(
            store.write(&WriteRequest::HSet {
                key: b("s"),
                field: b("f"),
                value: b("v"),
            }),
            RedisResponse::WrongType
        );
    }

    #[test]
    fn test_getset_and_del() {
        let store = TabletStore::new();
        let getset = |v: &str| WriteRequest::GetSet {
            key: b("k"),
            value: b(v),
        };

        assert_eq!(store.write(&getset("one")), RedisResponse::Nil);
        assert_eq!(store.write(&getset("two")), RedisResponse::Bulk(b("one")));
        assert_eq!(
            store.write(&WriteRequest::Del { key: b("k") }),
            RedisResponse::Integer(1)
        );
        assert_eq!(
            store.write(&WriteRequest::Del { key: b("k") }),
            RedisResponse::Integer(0)
        );
    }

    #[test]
    fn test_append_and_strlen() {
        let store = TabletStore::new();
        let append = |v: &str| WriteRequest::Append {
            key: b("k"),
            value: b(v),
        };

        assert_eq!(store.write(&append("Hello")), RedisResponse::Integer(5));
        assert_eq!(store.write(&append(" World")), RedisResponse::Integer(11));
        assert_eq!(get(&store, "k"), RedisResponse::Bulk(b("Hello World")));
        assert_eq!(
            store.read(&ReadRequest::StrLen { key: b("k") }),
            RedisResponse::Integer(11)
        );
        assert_eq!(
            store.read(&ReadRequest::StrLen { key: b("none") }),
            RedisResponse::Integer(0)
        );
    }

    #[test]
    fn test_getrange() {
        let store = TabletStore::new();
        set(&store, "k", "This is a string");
        let range = |start, end| {
            store.read(&ReadRequest::GetRange {
                key: b("k"),
                start,
                end,
            })
        };

        assert_eq!(range(0, 3), RedisResponse::Bulk(b("This")));
        assert_eq!(range(-3, -1), RedisResponse::Bulk(b("ing")));
        assert_eq!(range(0, -1), RedisResponse::Bulk(b("This is a string")));
        assert_eq!(range(10, 100), RedisResponse::Bulk(b("string")));
        assert_eq!(range(5, 2), RedisResponse::Bulk(Bytes::new()));
        assert_eq!(range(100, 200), RedisResponse::Bulk(Bytes::new()));
    }

    #[test]
    fn test_setrange() {
        let store = TabletStore::new();
        let setrange = |key: &str, offset, v: &str| {
            store.write(&WriteRequest::SetRange {
                key: b(key),
                offset,
                value: b(v),
            })
        };

        set(&store, "k", "Hello World");
        assert_eq!(setrange("k", 6, "Redis"), RedisResponse::Integer(11));
        assert_eq!(get(&store, "k"), RedisResponse::Bulk(b("Hello Redis")));

        assert_eq!(setrange("pad", 3, "x"), RedisResponse::Integer(4));
        assert_eq!(
            get(&store, "pad"),
            RedisResponse::Bulk(Bytes::from_static(b"\0\0\0x"))
        );

        assert_eq!(setrange("empty", 5, ""), RedisResponse::Integer(0));
        assert_eq!(get(&store, "empty"), RedisResponse::Nil);
    }

    #[test]
    fn test_incr() {
        let store = TabletStore::new();
        let incr = |key: &str, delta| {
            store.write(&WriteRequest::Incr {
                key: b(key),
                delta,
            })
        };

        assert_eq!(incr("counter", 1), RedisResponse::Integer(1));
        assert_eq!(incr("counter", 1), RedisResponse::Integer(2));

        set(&store, "num", "10");
        assert_eq!(incr("num", 1), RedisResponse::Integer(11));

        set(&store, "text", "abc");
        assert_eq!(
            incr("text", 1),
            RedisResponse::Error(NOT_AN_INTEGER.to_string())
        );

        set(&store, "max", &i64::MAX.to_string());
        assert_eq!(
            incr("max", 1),
            RedisResponse::Error(INCR_OVERFLOW.to_string())
        );
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TabletStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    set(&store, &key, "value");
                    get(&store, &key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
        assert_eq!(store.stats().writes, 1000);
        assert_eq!(store.stats().reads, 1000);
    }
}
