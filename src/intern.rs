//! Interning of callstacks, strings and tracepoint descriptors.
//!
//! Two flavours live here. [`InterningTable`] is the key→payload table shared
//! between threads: once a key is inserted its payload never changes. [`InternPool`]
//! goes the other way and hands out sequential keys for distinct contents; the
//! producer event processor uses it to promote producer-local keys to keys that
//! are unique for the whole capture.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use crate::error::InterningError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Append-only map from a 64-bit key to a payload.
///
/// Lookups take the shared lock, inserts the exclusive one.
#[derive(Debug)]
pub struct InterningTable<V> {
    entries: RwLock<HashMap<u64, V>>,
}

impl<V> Default for InterningTable<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone + PartialEq> InterningTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `payload` under `key` unless the key is taken.
    ///
    /// Re-inserting an identical payload reports `AlreadyPresent`; a different
    /// payload for a known key is rejected and the original is kept.
    pub fn try_insert(&self, key: u64, payload: V) -> Result<InsertOutcome, InterningError> {
        let mut entries = self
            .entries
            .write()
            .expect("Failed to acquire write lock on interning table");
        match entries.get(&key) {
            Some(existing) if *existing == payload => Ok(InsertOutcome::AlreadyPresent),
            Some(_) => Err(InterningError::ConflictingPayload { key }),
            None => {
                entries.insert(key, payload);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    pub fn get(&self, key: u64) -> Option<V> {
        self.entries
            .read()
            .expect("Failed to acquire read lock on interning table")
            .get(&key)
            .cloned()
    }

    /// Runs `f` on the payload without cloning it.
    pub fn with_payload<R>(&self, key: u64, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.entries
            .read()
            .expect("Failed to acquire read lock on interning table")
            .get(&key)
            .map(f)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries
            .read()
            .expect("Failed to acquire read lock on interning table")
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("Failed to acquire read lock on interning table")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content→key assignment. Keys start at 1; 0 is never handed out.
#[derive(Debug)]
pub struct InternPool<T> {
    ids: HashMap<T, u64>,
    next_id: u64,
}

impl<T: Hash + Eq> Default for InternPool<T> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Hash + Eq> InternPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `content` and whether it was assigned by this call.
    pub fn get_or_assign_id(&mut self, content: T) -> (u64, bool) {
        if let Some(&id) = self.ids.get(&content) {
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(content, id);
        (id, true)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable 64-bit FNV-1a hash, used as the key of strings that never went
/// through a producer (timer labels).
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
