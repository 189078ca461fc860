use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;

use crate::entry::Entry;

/// Sentinel indices in the `nodes` arena.
const HEAD: usize = 0; // will-expire-soonest end
const TAIL: usize = 1; // will-expire-latest end
const NULL: usize = usize::MAX;

struct Node<K, V> {
    /// `None` only for the HEAD and TAIL sentinels.
    key: Option<K>,
    /// `None` only for the HEAD and TAIL sentinels.
    entry: Option<Arc<Entry<V>>>,
    /// Index toward HEAD (expires sooner).
    prev: usize,
    /// Index toward TAIL (expires later).
    next: usize,
}

/// What the sweep closure decided for one visited entry.
pub(crate) enum SweepAction {
    /// Expired: unlink the node and drop the key from the index.
    Remove,
    /// Could not be inspected (lock held elsewhere): leave it for the next
    /// sweep and keep walking.
    Keep,
    /// Not expired.  The list is expiration-sorted, so nothing further along
    /// can be expired either; end the walk.
    Stop,
}

/// The cache's index and expiration-ordered sequence, as one structure under
/// the engine's top-level lock.
///
/// Entries live in an index-arena doubly linked list (no raw pointers; nodes
/// are linked by `Vec` index and freed slots are reused).  Every write and
/// every successful refresh moves its node to the tail; because all entries
/// share one TTL, that keeps the list sorted by expiration from head to tail,
/// which is what lets the sweep stop at the first live entry it sees.
pub(crate) struct ExpiryOrder<K, V> {
    /// Index 0 = HEAD sentinel, 1 = TAIL sentinel, 2+ = real entries.
    nodes: Vec<Node<K, V>>,
    /// Maps a key to its node index.  Exactly one node per key.
    index: AHashMap<K, usize>,
    /// Indices of freed (reusable) slots.
    free_list: Vec<usize>,
}

impl<K: Hash + Eq + Clone, V> ExpiryOrder<K, V> {
    pub(crate) fn new() -> Self {
        let mut nodes: Vec<Node<K, V>> = Vec::with_capacity(16);
        nodes.push(Node {
            key: None,
            entry: None,
            prev: NULL,
            next: TAIL,
        });
        nodes.push(Node {
            key: None,
            entry: None,
            prev: HEAD,
            next: NULL,
        });

        ExpiryOrder {
            nodes,
            index: AHashMap::new(),
            free_list: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn entry(&self, key: &K) -> Option<&Arc<Entry<V>>> {
        let idx = *self.index.get(key)?;
        self.nodes[idx].entry.as_ref()
    }

    /// Links `idx` immediately before the TAIL sentinel (latest expiry).
    fn link_before_tail(&mut self, idx: usize) {
        let old_last = self.nodes[TAIL].prev;
        self.nodes[idx].prev = old_last;
        self.nodes[idx].next = TAIL;
        self.nodes[old_last].next = idx;
        self.nodes[TAIL].prev = idx;
    }

    /// Detaches `idx` from its current position in the list.
    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = NULL;
        self.nodes[idx].next = NULL;
    }

    /// Allocates a new node (reusing from the free list when available).
    fn alloc_node(&mut self, key: K, entry: Arc<Entry<V>>) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx].key = Some(key);
            self.nodes[idx].entry = Some(entry);
            self.nodes[idx].prev = NULL;
            self.nodes[idx].next = NULL;
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: Some(key),
                entry: Some(entry),
                prev: NULL,
                next: NULL,
            });
            idx
        }
    }

    /// Unlinks `idx`, clears the node, returns its slot to the free list and
    /// removes its key from the index.
    fn release(&mut self, idx: usize) {
        self.unlink(idx);
        if let Some(key) = self.nodes[idx].key.take() {
            self.index.remove(&key);
        }
        self.nodes[idx].entry = None;
        self.free_list.push(idx);
    }

    /// Inserts a new entry for `key` at the tail.  The key must not already
    /// be present.
    pub(crate) fn insert_tail(&mut self, key: K, entry: Arc<Entry<V>>) {
        debug_assert!(!self.index.contains_key(&key));
        let idx = self.alloc_node(key.clone(), entry);
        self.index.insert(key, idx);
        self.link_before_tail(idx);
    }

    /// Puts `entry` back at the tail after a write or a successful refresh.
    ///
    /// Three cases, depending on what happened to the key while the caller
    /// held only the entry lock:
    /// - still mapped to this entry: plain move-to-tail;
    /// - deleted: re-insert it (a delete racing an in-flight refresh does not
    ///   suppress the refresh's re-insertion);
    /// - re-claimed by a different entry: a newer flight owns the key now,
    ///   leave it alone.
    pub(crate) fn restore_tail(&mut self, key: K, entry: &Arc<Entry<V>>) {
        match self.index.get(&key) {
            Some(&idx) => {
                let current = self.nodes[idx]
                    .entry
                    .as_ref()
                    .map(|e| Arc::ptr_eq(e, entry))
                    .unwrap_or(false);
                if current {
                    self.unlink(idx);
                    self.link_before_tail(idx);
                }
            }
            None => self.insert_tail(key, Arc::clone(entry)),
        }
    }

    /// Removes the entry for `key`.  Returns `true` if it was present.
    pub(crate) fn remove(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&idx) => {
                self.release(idx);
                true
            }
            None => false,
        }
    }

    /// Removes `key` only if the index still maps it to this exact entry.
    ///
    /// Used by the refresh failure path: the caller cleans up the placeholder
    /// it created, never an entry a concurrent flight installed after it.
    pub(crate) fn remove_if(&mut self, key: &K, entry: &Arc<Entry<V>>) -> bool {
        if let Some(&idx) = self.index.get(key) {
            let same = self.nodes[idx]
                .entry
                .as_ref()
                .map(|e| Arc::ptr_eq(e, entry))
                .unwrap_or(false);
            if same {
                self.release(idx);
                return true;
            }
        }
        false
    }

    /// Walks the list from the head, letting `decide` classify each entry.
    ///
    /// `Remove` unlinks the node, `Keep` skips it, `Stop` ends the walk.
    /// Returns the number of removed entries.
    pub(crate) fn sweep(&mut self, mut decide: impl FnMut(&Arc<Entry<V>>) -> SweepAction) -> usize {
        let mut removed = 0;
        let mut idx = self.nodes[HEAD].next;
        while idx != TAIL {
            let next = self.nodes[idx].next;
            let Some(entry) = self.nodes[idx].entry.as_ref() else {
                break;
            };
            match decide(entry) {
                SweepAction::Remove => {
                    self.release(idx);
                    removed += 1;
                }
                SweepAction::Keep => {}
                SweepAction::Stop => break,
            }
            idx = next;
        }
        removed
    }

    /// Keys from head to tail.  Test-only introspection of the write order.
    #[cfg(test)]
    pub(crate) fn keys_in_order(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut idx = self.nodes[HEAD].next;
        while idx != TAIL {
            if let Some(key) = &self.nodes[idx].key {
                keys.push(key.clone());
            }
            idx = self.nodes[idx].next;
        }
        keys
    }

    /// Expiration deadlines from head to tail.  Test-only.
    #[cfg(test)]
    pub(crate) fn expirations_in_order(&self) -> Vec<std::time::Instant> {
        let mut deadlines = Vec::with_capacity(self.index.len());
        let mut idx = self.nodes[HEAD].next;
        while idx != TAIL {
            if let Some(entry) = &self.nodes[idx].entry {
                deadlines.push(entry.slot.read().expires_at);
            }
            idx = self.nodes[idx].next;
        }
        deadlines
    }
}
