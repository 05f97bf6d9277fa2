/*!
k-way merge of sorted entry streams.

Inputs are ordered oldest-first: index 0 is the oldest source and higher
indices are newer. A min-heap is seeded with the head of every non-empty
stream; the heap orders primarily by versioned key ascending and breaks ties
by stream index so that every occurrence of a key is visited in
oldest-to-newest order. A "latest" map then keeps only the last occurrence
visited per versioned key, which collapses redundant copies across
overlapping sources while letting newer sources win.

Tombstones flow through the merge like any other entry: with multi-version
keys, a deletion and the value it shadows live under *different* versioned
keys, so dropping tombstones here would resurrect the older version. The
consumers decide — the scan projection hides deleted keys, and compaction's
stale-version discard removes a tombstone only together with everything it
shadows.
*/

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::key;
use crate::types::Entry;

/// An entry tagged with the index of the stream it came from.
struct HeapItem {
    entry: Entry,
    stream: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        key::compare_keys(&self.entry.key, &other.entry.key)
            .then(self.stream.cmp(&other.stream))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

/// Merge pre-sorted entry streams, oldest stream first.
pub(crate) fn merge(streams: Vec<Vec<Entry>>) -> Vec<Entry> {
    let mut heap = BinaryHeap::new();
    let mut cursors = vec![0_usize; streams.len()];

    // Seed the heap with the head of every non-empty stream.
    for (index, stream) in streams.iter().enumerate() {
        if let Some(head) = stream.first() {
            heap.push(Reverse(HeapItem {
                entry: head.clone(),
                stream: index,
            }));
            cursors[index] = 1;
        }
    }

    let mut latest: HashMap<Vec<u8>, Entry> = HashMap::new();
    while let Some(Reverse(item)) = heap.pop() {
        let stream = item.stream;
        latest.insert(item.entry.key.clone(), item.entry);

        if let Some(next) = streams[stream].get(cursors[stream]) {
            heap.push(Reverse(HeapItem {
                entry: next.clone(),
                stream,
            }));
            cursors[stream] += 1;
        }
    }

    let mut merged: Vec<Entry> = latest.into_values().collect();
    merged.sort_by(|a, b| key::compare_keys(&a.key, &b.key));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(key: &[u8], value: &[u8]) -> Entry {
        Entry::new(key.to_vec(), value.to_vec(), false, key::parse_ts(key))
    }

    fn tombstone(key: &[u8]) -> Entry {
        Entry::new(key.to_vec(), vec![], true, key::parse_ts(key))
    }

    #[test]
    fn disjoint_streams_merge_to_the_total_sort() {
        let merged = merge(vec![
            vec![entry(b"a@1", b"1"), entry(b"d@1", b"4")],
            vec![entry(b"b@1", b"2"), entry(b"e@1", b"5")],
            vec![entry(b"c@1", b"3")],
        ]);

        let keys: Vec<&[u8]> = merged.iter().map(|e| e.key.as_slice()).collect();
        assert_eq!(keys, vec![b"a@1".as_slice(), b"b@1", b"c@1", b"d@1", b"e@1"]);
    }

    #[test]
    fn newer_stream_wins_on_duplicate_keys() {
        let merged = merge(vec![
            vec![entry(b"k@5", b"old")],
            vec![entry(b"k@5", b"new")],
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, b"new");
    }

    #[test]
    fn distinct_versions_both_survive() {
        let merged = merge(vec![
            vec![entry(b"k@1", b"v1")],
            vec![entry(b"k@2", b"v2")],
        ]);

        let keys: Vec<&[u8]> = merged.iter().map(|e| e.key.as_slice()).collect();
        // Newer version orders first under the versioned-key comparator.
        assert_eq!(keys, vec![b"k@2".as_slice(), b"k@1"]);
    }

    #[test]
    fn tombstones_pass_through_and_win_ties() {
        let merged = merge(vec![
            vec![entry(b"a@1", b"1"), entry(b"b@1", b"2")],
            vec![tombstone(b"b@1")],
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].key, b"a@1");
        assert_eq!(merged[1].key, b"b@1");
        assert!(merged[1].tombstone);
    }

    #[test]
    fn empty_inputs_are_tolerated() {
        assert_eq!(merge(vec![]), vec![]);
        assert_eq!(merge(vec![vec![], vec![]]), vec![]);

        let merged = merge(vec![vec![], vec![entry(b"a@1", b"1")], vec![]]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn many_overlapping_streams() {
        // Each stream rewrites the same key at the same version; the last
        // stream must win every time.
        let streams: Vec<Vec<Entry>> = (0..8)
            .map(|source| {
                (0..50)
                    .map(|i| {
                        entry(
                            format!("key-{i:02}@7").as_bytes(),
                            format!("from-{source}").as_bytes(),
                        )
                    })
                    .collect()
            })
            .collect();

        let merged = merge(streams);
        assert_eq!(merged.len(), 50);
        assert!(merged.iter().all(|e| e.value == b"from-7"));
    }
}
