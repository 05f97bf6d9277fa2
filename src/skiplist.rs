/*!
An ordered multi-version map backed by a probabilistic skip list.

```text
Level 3:       3 ----------- 9 ----------- 21 --------- 26
Level 2:       3 ----- 6 ---- 9 ------ 19 -- 21 ---- 25 -- 26
Level 1:       3 -- 6 -- 7 -- 9 -- 12 -- 19 -- 21 -- 25 -- 26
```

Keys are versioned keys ordered by [`crate::key::compare_keys`], so distinct
versions of the same user key coexist as distinct entries with the newest
version first. Nodes live in an indexed arena (`Vec<Node>` addressed by `u32`)
rather than behind owned pointers; forward links are arena indices. Slot 0 is
the head sentinel and is never the target of a link, which lets 0 double as
the nil index.
*/

use std::cmp::Ordering;
use std::mem;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::key;
use crate::types::Entry;

/// The nil arena index. Slot 0 holds the head sentinel, which nothing links to.
const NIL: u32 = 0;

/// Fixed per-entry cost of the tombstone flag and version stamp in the size
/// estimate.
const ENTRY_OVERHEAD: usize = 1 + mem::size_of::<u64>();

struct Node {
    entry: Entry,
    /// Forward links, one arena index per level this node participates in.
    forwards: Vec<u32>,
}

/// A probabilistic ordered map from versioned keys to entries.
pub(crate) struct SkipList {
    max_level: usize,
    p: f64,
    /// The highest level currently in use.
    level: usize,
    rng: StdRng,
    /// Estimated byte footprint, maintained on every mutation.
    size: usize,
    arena: Vec<Node>,
}

/// Crate-only methods
impl SkipList {
    pub(crate) fn new(max_level: usize, p: f64) -> Self {
        let head = Node {
            entry: Entry::default(),
            forwards: vec![NIL; max_level],
        };

        Self {
            max_level,
            p,
            level: 1,
            rng: StdRng::from_entropy(),
            size: 0,
            arena: vec![head],
        }
    }

    /// Create an empty list with the same parameters as this one.
    pub(crate) fn reset(&self) -> Self {
        SkipList::new(self.max_level, self.p)
    }

    /// The estimated byte footprint of the list.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /**
    Upsert an entry.

    If an entry with an equal versioned key exists, its value and tombstone
    are overwritten in place. Otherwise a new node is linked at a randomized
    level.
    */
    pub(crate) fn set(&mut self, entry: Entry) {
        let mut update = vec![0_u32; self.max_level];
        let mut current = 0_u32;

        for level in (0..self.max_level).rev() {
            loop {
                let next = self.arena[current as usize].forwards[level];
                if next != NIL
                    && key::compare_keys(&self.arena[next as usize].entry.key, &entry.key)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }

        let candidate = self.arena[update[0] as usize].forwards[0];
        if candidate != NIL
            && key::compare_keys(&self.arena[candidate as usize].entry.key, &entry.key)
                == Ordering::Equal
        {
            let node = &mut self.arena[candidate as usize];
            self.size = self.size + entry.value.len() - node.entry.value.len();
            node.entry.value = entry.value;
            node.entry.tombstone = entry.tombstone;
            node.entry.version = entry.version;
            return;
        }

        let node_level = self.random_level();
        if node_level > self.level {
            for slot in update.iter_mut().take(node_level).skip(self.level) {
                *slot = 0;
            }
            self.level = node_level;
        }

        let new_index = self.arena.len() as u32;
        let mut forwards = vec![NIL; node_level];
        for (level, forward) in forwards.iter_mut().enumerate() {
            *forward = self.arena[update[level] as usize].forwards[level];
        }

        self.size += entry.key.len()
            + entry.value.len()
            + ENTRY_OVERHEAD
            + node_level * mem::size_of::<u32>();
        self.arena.push(Node { entry, forwards });

        for level in 0..node_level {
            self.arena[update[level] as usize].forwards[level] = new_index;
        }
    }

    /// Get the entry whose versioned key equals `target`.
    pub(crate) fn get(&self, target: &[u8]) -> Option<Entry> {
        let index = self.find_greater_or_equal(target);
        if index == NIL {
            return None;
        }

        let node = &self.arena[index as usize];
        if key::compare_keys(&node.entry.key, target) == Ordering::Equal {
            return Some(node.entry.clone());
        }
        None
    }

    /// Get the smallest entry whose versioned key is `>= target`.
    pub(crate) fn lower_bound(&self, target: &[u8]) -> Option<Entry> {
        let index = self.find_greater_or_equal(target);
        if index == NIL {
            return None;
        }
        Some(self.arena[index as usize].entry.clone())
    }

    /// Collect the entries with keys in `[start, end)`.
    pub(crate) fn scan(&self, start: &[u8], end: &[u8]) -> Vec<Entry> {
        let mut result = vec![];
        let mut index = self.find_greater_or_equal(start);
        while index != NIL {
            let node = &self.arena[index as usize];
            if key::compare_keys(&node.entry.key, end) != Ordering::Less {
                break;
            }
            result.push(node.entry.clone());
            index = node.forwards[0];
        }
        result
    }

    /// Collect every entry in key order.
    pub(crate) fn all(&self) -> Vec<Entry> {
        let mut result = vec![];
        let mut index = self.arena[0].forwards[0];
        while index != NIL {
            let node = &self.arena[index as usize];
            result.push(node.entry.clone());
            index = node.forwards[0];
        }
        result
    }

    /**
    Unlink the entry whose versioned key equals `target`.

    Deletion is modeled with tombstones on the normal write path; this exists
    for completeness and for callers managing the list directly. The arena
    slot is retired in place and reclaimed when the list is reset.
    */
    pub(crate) fn delete(&mut self, target: &[u8]) -> bool {
        let mut update = vec![0_u32; self.max_level];
        let mut current = 0_u32;

        for level in (0..self.max_level).rev() {
            loop {
                let next = self.arena[current as usize].forwards[level];
                if next != NIL
                    && key::compare_keys(&self.arena[next as usize].entry.key, target)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
            update[level] = current;
        }

        let victim = self.arena[update[0] as usize].forwards[0];
        if victim == NIL
            || key::compare_keys(&self.arena[victim as usize].entry.key, target) != Ordering::Equal
        {
            return false;
        }

        for level in 0..self.level {
            if self.arena[update[level] as usize].forwards[level] != victim {
                break;
            }
            let successor = self.arena[victim as usize].forwards[level];
            self.arena[update[level] as usize].forwards[level] = successor;
        }

        let node = &self.arena[victim as usize];
        self.size -= node.entry.key.len()
            + node.entry.value.len()
            + ENTRY_OVERHEAD
            + node.forwards.len() * mem::size_of::<u32>();

        while self.level > 1 && self.arena[0].forwards[self.level - 1] == NIL {
            self.level -= 1;
        }
        true
    }
}

/// Private methods
impl SkipList {
    /// Return the arena index of the first node with key `>= target`, or
    /// [`NIL`].
    fn find_greater_or_equal(&self, target: &[u8]) -> u32 {
        let mut current = 0_u32;
        for level in (0..self.max_level).rev() {
            loop {
                let next = self.arena[current as usize].forwards[level];
                if next != NIL
                    && key::compare_keys(&self.arena[next as usize].entry.key, target)
                        == Ordering::Less
                {
                    current = next;
                } else {
                    break;
                }
            }
        }
        self.arena[current as usize].forwards[0]
    }

    /// A new node gets level `n` with probability `p^(n-1)`, capped at
    /// `max_level`.
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while self.rng.gen::<f64>() < self.p && level < self.max_level {
            level += 1;
        }
        level
    }
}
