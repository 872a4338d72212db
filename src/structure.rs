//! Ordered offset array and reverse-suffix trie.
//!
//! The offset array collects link target positions during KF7 link
//! rewriting; the trie indexes dictionary headwords by reversed suffix so
//! inflected forms can be matched against their base entries.

/// Growable ordered array of `u32` offsets.
#[derive(Debug, Default)]
pub struct OffsetArray {
    data: Vec<u32>,
}

impl OffsetArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    pub fn insert(&mut self, value: u32) {
        self.data.push(value);
    }

    /// Sort ascending, optionally discarding duplicates in place.
    pub fn sort_unique(&mut self, unique: bool) {
        self.data.sort_unstable();
        if unique {
            self.data.dedup();
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }
}

/// Node in a [`ReverseTrie`]. Siblings form one level, `children` descends.
#[derive(Debug, Default)]
pub struct TrieNode {
    c: u8,
    next: Option<Box<TrieNode>>,
    children: Option<Box<TrieNode>>,
    values: Vec<String>,
}

/// Per-character trie keyed on reversed strings, so lookups walk a word
/// from its last character toward the first and match suffixes.
#[derive(Debug, Default)]
pub struct ReverseTrie {
    root: Option<Box<TrieNode>>,
}

impl ReverseTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` reversed, attaching `value` at the terminal node.
    pub fn insert(&mut self, key: &str, value: String) {
        let bytes = key.as_bytes();
        if bytes.is_empty() {
            return;
        }
        let mut node = self.root.get_or_insert_with(Box::default);
        for (i, &c) in bytes.iter().rev().enumerate() {
            let terminal = i == bytes.len() - 1;
            // find or append the sibling carrying `c` on this level
            loop {
                if node.c == c || node.c == 0 {
                    break;
                }
                if node.next.is_none() {
                    node.next = Some(Box::default());
                }
                node = node.next.as_mut().unwrap();
            }
            if node.c == 0 {
                node.c = c;
            }
            if terminal {
                node.values.push(value);
                return;
            }
            node = node.children.get_or_insert_with(Box::default);
        }
    }

    pub fn root(&self) -> Option<&TrieNode> {
        self.root.as_deref()
    }

    /// Collect values attached along the reversed walk of `word`, i.e. the
    /// values of every inserted key that is a suffix of `word` (including
    /// the whole word).
    pub fn suffix_values<'a>(&'a self, word: &str) -> Vec<&'a str> {
        let mut found = Vec::new();
        let mut level = self.root();
        for &c in word.as_bytes().iter().rev() {
            let Some((children, values)) = trie_get_next(level, c) else {
                break;
            };
            found.extend(values.iter().map(String::as_str));
            level = children;
        }
        found
    }
}

/// Match `c` on the sibling level starting at `node`; returns the child
/// level below the match plus the values attached to the matched node.
pub fn trie_get_next<'a>(
    node: Option<&'a TrieNode>,
    c: u8,
) -> Option<(Option<&'a TrieNode>, &'a [String])> {
    let mut curr = node;
    while let Some(n) = curr {
        if n.c == c {
            return Some((n.children.as_deref(), &n.values));
        }
        curr = n.next.as_deref();
    }
    None
}
