//! Nearest-neighbor index over perceptual codes.
//!
//! A BK-tree keyed by Hamming distance. Lookups prune subtrees with the
//! triangle inequality, so typical queries touch a fraction of the tree
//! while returning exactly the result a brute-force scan would. The
//! equivalence is pinned by tests, not assumed.
//!
//! Entries are never removed: the ledger is append-only and record identity
//! fields are immutable, so the index only ever grows.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::fingerprint::PerceptualCode;
use crate::ledger::RecordId;

/// One indexed record. The derived ordering is the match tie-break:
/// earliest `registered_at`, then lowest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub registered_at: DateTime<Utc>,
    pub id: RecordId,
}

/// Result of a nearest-neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestMatch {
    pub entry: IndexEntry,
    pub distance: u32,
}

#[derive(Debug)]
struct Node {
    code: PerceptualCode,
    /// Records sharing this exact code, kept in tie-break order.
    entries: Vec<IndexEntry>,
    /// Children keyed by their Hamming distance to this node's code.
    children: HashMap<u32, Box<Node>>,
}

impl Node {
    fn leaf(code: PerceptualCode, entry: IndexEntry) -> Box<Self> {
        Box::new(Self {
            code,
            entries: vec![entry],
            children: HashMap::new(),
        })
    }
}

/// BK-tree over 64-bit perceptual codes.
#[derive(Debug, Default)]
pub struct PerceptualIndex {
    root: Option<Box<Node>>,
    len: usize,
}

impl PerceptualIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, code: PerceptualCode, registered_at: DateTime<Utc>, id: RecordId) {
        let entry = IndexEntry { registered_at, id };
        self.len += 1;

        let mut node = match self.root {
            Some(ref mut root) => root.as_mut(),
            None => {
                self.root = Some(Node::leaf(code, entry));
                return;
            }
        };

        loop {
            let distance = code.hamming_distance(node.code);
            if distance == 0 {
                let position = node.entries.binary_search(&entry).unwrap_or_else(|p| p);
                node.entries.insert(position, entry);
                return;
            }
            match node.children.entry(distance) {
                Entry::Vacant(slot) => {
                    slot.insert(Node::leaf(code, entry));
                    return;
                }
                Entry::Occupied(slot) => {
                    node = slot.into_mut().as_mut();
                }
            }
        }
    }

    /// The closest indexed record to `query`. Distance ties resolve to the
    /// smallest entry in tie-break order, matching a brute-force scan.
    pub fn nearest(&self, query: PerceptualCode) -> Option<NearestMatch> {
        let root = self.root.as_deref()?;
        let mut best: Option<NearestMatch> = None;
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let distance = query.hamming_distance(node.code);
            if let Some(&entry) = node.entries.first() {
                let candidate = NearestMatch { entry, distance };
                let better = match best {
                    None => true,
                    Some(b) => {
                        distance < b.distance || (distance == b.distance && entry < b.entry)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }

            let radius = best.map(|b| b.distance).unwrap_or(PerceptualCode::BITS);
            for (&edge, child) in &node.children {
                // Triangle inequality: a subtree at edge distance `edge` can
                // only hold codes within |distance - edge| of the query.
                // `<=` keeps equal-distance candidates reachable for the
                // tie-break.
                if edge.abs_diff(distance) <= radius {
                    stack.push(child.as_ref());
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
    }

    /// Deterministic pseudo-random codes (splitmix64).
    fn mix(mut x: u64) -> u64 {
        x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
        x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^ (x >> 31)
    }

    fn brute_force(entries: &[(PerceptualCode, IndexEntry)], query: PerceptualCode) -> NearestMatch {
        entries
            .iter()
            .map(|&(code, entry)| NearestMatch {
                entry,
                distance: query.hamming_distance(code),
            })
            .min_by(|a, b| {
                a.distance
                    .cmp(&b.distance)
                    .then_with(|| a.entry.cmp(&b.entry))
            })
            .expect("empty entry set")
    }

    #[test]
    fn test_empty_index() {
        let index = PerceptualIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.nearest(PerceptualCode(42)), None);
    }

    #[test]
    fn test_exact_and_near_lookup() {
        let mut index = PerceptualIndex::new();
        let id = RecordId::generate();
        index.insert(PerceptualCode(0b1111_0000), ts(0), id);
        index.insert(PerceptualCode(u64::MAX), ts(1), RecordId::generate());

        let hit = index.nearest(PerceptualCode(0b1111_0001)).unwrap();
        assert_eq!(hit.entry.id, id);
        assert_eq!(hit.distance, 1);
    }

    #[test]
    fn test_tie_breaks_to_earliest() {
        let mut index = PerceptualIndex::new();
        let late = RecordId::generate();
        let early = RecordId::generate();
        // Same code, inserted newest-first: the earliest timestamp must win.
        index.insert(PerceptualCode(7), ts(10), late);
        index.insert(PerceptualCode(7), ts(1), early);

        let hit = index.nearest(PerceptualCode(7)).unwrap();
        assert_eq!(hit.distance, 0);
        assert_eq!(hit.entry.id, early);
    }

    #[test]
    fn test_equidistant_codes_tie_break() {
        let mut index = PerceptualIndex::new();
        let early = RecordId::generate();
        // 0b01 and 0b10 are both at distance 1 from 0b00.
        index.insert(PerceptualCode(0b10), ts(5), RecordId::generate());
        index.insert(PerceptualCode(0b01), ts(2), early);

        let hit = index.nearest(PerceptualCode(0)).unwrap();
        assert_eq!(hit.distance, 1);
        assert_eq!(hit.entry.id, early);
    }

    #[test]
    fn test_matches_brute_force_oracle() {
        let mut index = PerceptualIndex::new();
        let mut entries = Vec::new();

        for i in 0..300u64 {
            let code = PerceptualCode(mix(i));
            let entry = IndexEntry {
                registered_at: ts(i as i64),
                id: RecordId::generate(),
            };
            index.insert(code, entry.registered_at, entry.id);
            entries.push((code, entry));
        }
        assert_eq!(index.len(), 300);

        for q in 0..100u64 {
            // Mix of arbitrary queries and mutated stored codes, so both the
            // far-match and near-match paths are exercised.
            let query = if q % 3 == 0 {
                PerceptualCode(mix(1_000 + q))
            } else {
                PerceptualCode(entries[(q as usize * 7) % entries.len()].0 .0 ^ (1 << (q % 64)))
            };

            let expected = brute_force(&entries, query);
            let actual = index.nearest(query).expect("index returned no match");
            assert_eq!(actual, expected, "query {q} diverged from brute force");
        }
    }
}
