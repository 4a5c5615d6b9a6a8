use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

/// Local depth past which a full bucket is allowed to overflow instead of
/// splitting (only reachable when hashes collide on every directory bit).
const MAX_DEPTH: u32 = 32;

#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: u32, capacity: usize) -> Self {
        Self {
            local_depth,
            items: Vec::with_capacity(capacity),
        }
    }
}

/// Extendible hash table used as the buffer pool's page directory.
///
/// The directory has `2^global_depth` slots; each slot points at a bucket
/// (several slots may share one). A full bucket splits on its next hash bit,
/// doubling the directory first when its local depth already equals the
/// global depth. Buckets never merge back.
///
/// Not internally synchronized: the owner provides the lock.
#[derive(Debug)]
pub struct ExtendibleHashTable<K, V, S = BuildHasherDefault<DefaultHasher>> {
    global_depth: u32,
    bucket_size: usize,
    /// Slot -> index into `buckets`
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    len: usize,
    hasher: S,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    /// Creates an empty table whose buckets hold up to `bucket_size` entries.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, BuildHasherDefault::default())
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            global_depth: 0,
            bucket_size,
            directory: vec![0],
            buckets: vec![Bucket::new(0, bucket_size)],
            len: 0,
            hasher,
        }
    }

    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn slot_of(&self, hash: u64) -> usize {
        (hash & ((1u64 << self.global_depth) - 1)) as usize
    }

    /// Returns the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = &self.buckets[self.directory[self.slot_of(self.hash(key))]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts or overwrites `key`.
    pub fn insert(&mut self, key: K, value: V) {
        let hash = self.hash(&key);

        loop {
            let bucket_idx = self.directory[self.slot_of(hash)];
            let bucket = &mut self.buckets[bucket_idx];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }

            if bucket.items.len() < self.bucket_size || bucket.local_depth >= MAX_DEPTH {
                bucket.items.push((key, value));
                self.len += 1;
                return;
            }

            self.split_bucket(bucket_idx);
        }
    }

    fn split_bucket(&mut self, bucket_idx: usize) {
        let local_depth = self.buckets[bucket_idx].local_depth;

        if local_depth == self.global_depth {
            self.directory.extend_from_within(..);
            self.global_depth += 1;
        }

        let mask = 1u64 << local_depth;
        let items = std::mem::take(&mut self.buckets[bucket_idx].items);
        let (high, low): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|(k, _)| self.hasher.hash_one(k) & mask != 0);

        self.buckets[bucket_idx] = Bucket {
            local_depth: local_depth + 1,
            items: low,
        };
        let new_idx = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: local_depth + 1,
            items: high,
        });

        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == bucket_idx && (slot as u64) & mask != 0 {
                *target = new_idx;
            }
        }
    }

    /// Removes `key`. Returns false if it was absent.
    pub fn remove(&mut self, key: &K) -> bool {
        let slot = self.slot_of(self.hash(key));
        let bucket = &mut self.buckets[self.directory[slot]];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.swap_remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Local depth of the bucket that directory slot `slot` points at.
    pub fn local_depth(&self, slot: usize) -> u32 {
        self.buckets[self.directory[slot]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Visits every entry in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flat_map(|b| b.items.iter().map(|(k, v)| (k, v)))
    }
}
