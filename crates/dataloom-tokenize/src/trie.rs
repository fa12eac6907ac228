//! `CharTrie` — a byte-labeled trie mapping byte sequences to token ids.

use std::collections::HashMap;

#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, usize>,
    token_id: Option<u32>,
}

/// A byte-indexed trie. Each node carries an optional terminal token id and a byte-keyed
/// child map for O(1) amortized descent. Insertion with no explicit id assigns the next
/// monotonically increasing id, starting from 0.
#[derive(Default)]
pub struct CharTrie {
    nodes: Vec<TrieNode>,
    num_keys: usize,
    next_auto_id: u32,
}

impl CharTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            num_keys: 0,
            next_auto_id: 0,
        }
    }

    /// Insert `key`, assigning it `id` if given or the next auto-incrementing id otherwise.
    /// Re-inserting an existing key overwrites its id without incrementing `num_keys`.
    pub fn insert(&mut self, key: &[u8], id: Option<u32>) -> u32 {
        let mut node = 0usize;
        for &b in key {
            node = *self.nodes[node].children.entry(b).or_insert_with(|| {
                self.nodes.push(TrieNode::default());
                self.nodes.len() - 1
            });
        }
        let assigned = match id {
            Some(explicit) => {
                // Keep the auto-id counter past any explicit id a caller hands in, so a
                // later auto-assigned insert never collides with it.
                self.next_auto_id = self.next_auto_id.max(explicit + 1);
                explicit
            }
            None => {
                let next = self.next_auto_id;
                self.next_auto_id += 1;
                next
            }
        };
        if self.nodes[node].token_id.is_none() {
            self.num_keys += 1;
        }
        self.nodes[node].token_id = Some(assigned);
        assigned
    }

    /// Returns the terminal token id for an exact match of `key`, or `None`.
    pub fn search(&self, key: &[u8]) -> Option<u32> {
        let mut node = 0usize;
        for &b in key {
            node = *self.nodes[node].children.get(&b)?;
        }
        self.nodes[node].token_id
    }

    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    /// Walk `bytes` starting at `offset`, remembering the deepest terminal node encountered.
    /// Returns `(id, length)` of the longest matching prefix, or `None` if no prefix of
    /// `bytes[offset..]` terminates in the trie.
    pub fn longest_prefix(&self, bytes: &[u8], offset: usize) -> Option<(u32, usize)> {
        let mut node = 0usize;
        let mut best = None;
        for (i, &b) in bytes[offset..].iter().enumerate() {
            match self.nodes[node].children.get(&b) {
                Some(&next) => {
                    node = next;
                    if let Some(id) = self.nodes[node].token_id {
                        best = Some((id, i + 1));
                    }
                }
                None => break,
            }
        }
        best
    }

    /// Every terminal match of `bytes[offset..]`, as `(end_offset, id)` pairs in increasing
    /// length order. Used by the maximum-likelihood tokenizer's dynamic program, which needs
    /// every token that could terminate at a position, not just the longest one.
    pub fn terminal_matches(&self, bytes: &[u8], offset: usize) -> Vec<(usize, u32)> {
        let mut node = 0usize;
        let mut out = Vec::new();
        for (i, &b) in bytes[offset..].iter().enumerate() {
            match self.nodes[node].children.get(&b) {
                Some(&next) => {
                    node = next;
                    if let Some(id) = self.nodes[node].token_id {
                        out.push((offset + i + 1, id));
                    }
                }
                None => break,
            }
        }
        out
    }

    /// Every `(key, id)` pair stored in the trie, via a depth-first walk. Order is
    /// unspecified beyond being deterministic for a given trie.
    pub fn key_iterator(&self) -> Vec<(Vec<u8>, u32)> {
        let mut out = Vec::new();
        self.collect(0, &mut Vec::new(), &mut out);
        out
    }

    fn collect(&self, node: usize, prefix: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, u32)>) {
        if let Some(id) = self.nodes[node].token_id {
            out.push((prefix.clone(), id));
        }
        let mut children: Vec<(&u8, &usize)> = self.nodes[node].children.iter().collect();
        children.sort_by_key(|(b, _)| **b);
        for (&b, &child) in children {
            prefix.push(b);
            self.collect(child, prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_auto_id_is_monotonic() {
        let mut t = CharTrie::new();
        let a = t.insert(b"a", None);
        let b = t.insert(b"b", None);
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn test_search_matches_insert() {
        let mut t = CharTrie::new();
        t.insert(b"hello", Some(7));
        assert_eq!(t.search(b"hello"), Some(7));
        assert_eq!(t.search(b"hell"), None);
        assert_eq!(t.search(b"helloo"), None);
    }

    #[test]
    fn test_num_keys_counts_distinct_terminals() {
        let mut t = CharTrie::new();
        t.insert(b"a", Some(1));
        t.insert(b"ab", Some(2));
        t.insert(b"a", Some(3)); // overwrite, not a new key
        assert_eq!(t.num_keys(), 2);
        assert_eq!(t.search(b"a"), Some(3));
    }

    #[test]
    fn test_longest_prefix_picks_deepest_terminal() {
        let mut t = CharTrie::new();
        t.insert(b"a", Some(1));
        t.insert(b"ab", Some(2));
        t.insert(b"abc", Some(3));
        let (id, len) = t.longest_prefix(b"abcd", 0).unwrap();
        assert_eq!((id, len), (3, 3));
    }

    #[test]
    fn test_longest_prefix_at_offset() {
        let mut t = CharTrie::new();
        t.insert(b"bc", Some(9));
        let (id, len) = t.longest_prefix(b"abcd", 1).unwrap();
        assert_eq!((id, len), (9, 2));
    }

    #[test]
    fn test_longest_prefix_no_match() {
        let mut t = CharTrie::new();
        t.insert(b"x", Some(1));
        assert!(t.longest_prefix(b"abc", 0).is_none());
    }

    #[test]
    fn test_terminal_matches_collects_every_terminating_prefix() {
        let mut t = CharTrie::new();
        t.insert(b"a", Some(1));
        t.insert(b"ab", Some(2));
        t.insert(b"abc", Some(3));
        let matches = t.terminal_matches(b"abcd", 0);
        assert_eq!(matches, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_key_iterator_roundtrips_all_inserted_keys() {
        let mut t = CharTrie::new();
        t.insert(b"a", Some(1));
        t.insert(b"ab", Some(2));
        t.insert(b"z", Some(3));
        let mut keys: Vec<(Vec<u8>, u32)> = t.key_iterator();
        keys.sort();
        assert_eq!(
            keys,
            vec![(b"a".to_vec(), 1), (b"ab".to_vec(), 2), (b"z".to_vec(), 3)]
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every key inserted with an explicit id is found by an exact `search` for that
        /// id afterward, regardless of insertion order or how many other keys share a prefix.
        #[test]
        fn search_finds_every_inserted_key(
            keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..12), 1..30),
        ) {
            let mut t = CharTrie::new();
            // Dedup while keeping the last id assigned to any repeated key, matching
            // `insert`'s overwrite semantics.
            let mut expected: std::collections::HashMap<Vec<u8>, u32> = std::collections::HashMap::new();
            for (i, key) in keys.iter().enumerate() {
                t.insert(key, Some(i as u32));
                expected.insert(key.clone(), i as u32);
            }
            for (key, id) in &expected {
                prop_assert_eq!(t.search(key), Some(*id));
            }
            prop_assert_eq!(t.num_keys(), expected.len());
        }

        /// `longest_prefix` never returns a match longer than the haystack remaining from
        /// `offset`, and whatever it returns is itself a key present in the trie.
        #[test]
        fn longest_prefix_is_bounded_and_present(
            inserted in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 1..15),
            haystack in prop::collection::vec(any::<u8>(), 0..30),
            offset in 0usize..30,
        ) {
            let mut t = CharTrie::new();
            for (i, key) in inserted.iter().enumerate() {
                t.insert(key, Some(i as u32));
            }
            let offset = offset.min(haystack.len());
            if let Some((id, len)) = t.longest_prefix(&haystack, offset) {
                prop_assert!(len <= haystack.len() - offset);
                prop_assert_eq!(t.search(&haystack[offset..offset + len]), Some(id));
            }
        }
    }
}
