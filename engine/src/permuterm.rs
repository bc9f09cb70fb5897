use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::error::QueryError;

/// Sentinel appended to every term before rotation. Sorts before all
/// alphanumerics, so `$term` is the canonical rotation.
const SENTINEL: char = '$';

/// Upper fence for half-open range scans; sorts one past 'z'.
const FENCE: char = '{';

/// Rotate a string one character to the left, respecting char boundaries
/// so non-ASCII dictionary terms from a foreign index never panic.
fn rotate_left(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(head) => format!("{}{head}", chars.as_str()),
        None => String::new(),
    }
}

/// Sorted index over every cyclic rotation of `term + '$'`. Each rotation
/// maps to the byte offset of the term's postings line, which makes the
/// structure double as the exact-match dictionary (`$term` keys).
#[derive(Debug, Default)]
pub struct Permuterm {
    tree: BTreeMap<String, u64>,
}

impl Permuterm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every rotation of `term + '$'`, all pointing at `offset`.
    pub fn insert_term(&mut self, term: &str, offset: u64) {
        let mut key = format!("{term}{SENTINEL}");
        for _ in 0..key.chars().count() {
            self.tree.insert(key.clone(), offset);
            key = rotate_left(&key);
        }
    }

    /// Exact postings offset for a plain dictionary term.
    pub fn offset_of(&self, term: &str) -> Option<u64> {
        self.tree.get(&format!("{SENTINEL}{term}")).copied()
    }

    /// Number of distinct indexed terms (not rotations).
    pub fn num_terms(&self) -> usize {
        self.tree.keys().filter(|k| k.starts_with(SENTINEL)).count()
    }

    /// All keys in `[low, high)`, lexicographic order.
    fn range_scan<'a>(&'a self, low: &str, high: &str) -> impl Iterator<Item = &'a str> {
        self.tree
            .range::<str, _>((Bound::Included(low), Bound::Excluded(high)))
            .map(|(k, _)| k.as_str())
    }

    /// Resolve a pattern holding exactly one `*` plus the `$` sentinel:
    /// rotate the wildcard to the front, drop it, scan the prefix range,
    /// and rotate each match back until `$` leads to recover the term.
    pub fn single_wildcard(&self, pattern: &str) -> BTreeSet<String> {
        debug_assert!(pattern.contains('*'));
        let mut p = pattern.to_string();
        while !p.starts_with('*') {
            p = rotate_left(&p);
        }
        let prefix = p[1..].to_string();
        let high = format!("{prefix}{FENCE}");

        let mut out = BTreeSet::new();
        for key in self.range_scan(&prefix, &high) {
            let mut k = key.to_string();
            while !k.starts_with(SENTINEL) {
                k = rotate_left(&k);
            }
            out.insert(k[1..].to_string());
        }
        out
    }

    /// Resolve a pattern with any number of `*`s (no sentinel) to the set
    /// of matching dictionary terms: a leading fragment becomes a prefix
    /// query, a trailing fragment a suffix query, interior fragments
    /// contains-queries, and all partial results are intersected. Empty
    /// fragments contribute no constraint.
    pub fn multi_wildcard(&self, pattern: &str) -> BTreeSet<String> {
        // contains fast path: "*frag*" collapses to one rotated scan
        if pattern.starts_with('*') && pattern.ends_with('*') && pattern.len() > 1 {
            return self.single_wildcard(&pattern[..pattern.len() - 1]);
        }

        let mut fragments: Vec<&str> = pattern.split('*').collect();
        let first = fragments.remove(0);
        let last = fragments.pop().unwrap_or("");

        let mut result: Option<BTreeSet<String>> = None;
        if !first.is_empty() {
            result = intersect(result, self.single_wildcard(&format!("{SENTINEL}{first}*")));
        }
        if !last.is_empty() {
            result = intersect(result, self.single_wildcard(&format!("*{last}{SENTINEL}")));
        }
        for frag in fragments {
            if frag.is_empty() {
                continue;
            }
            result = intersect(result, self.multi_wildcard(&format!("*{frag}*")));
        }
        result.unwrap_or_default()
    }

    /// Dictionary terms matching a wildcard token. A bare `*` is rejected
    /// rather than matching every term.
    pub fn expand(&self, token: &str) -> Result<BTreeSet<String>, QueryError> {
        if token == "*" {
            return Err(QueryError::BareWildcard);
        }
        let stars = token.matches('*').count();
        if stars == 1 {
            Ok(self.single_wildcard(&format!("{token}{SENTINEL}")))
        } else {
            Ok(self.multi_wildcard(token))
        }
    }
}

fn intersect(acc: Option<BTreeSet<String>>, set: BTreeSet<String>) -> Option<BTreeSet<String>> {
    Some(match acc {
        Some(a) => a.intersection(&set).cloned().collect(),
        None => set,
    })
}
