//! Fuzzy text-overlap matching between annotation quotes.
//!
//! Similarity follows the Ratcliff/Obershelp "gestalt" scheme: find the
//! longest common block, recurse on both sides of it, and score
//! `2 * matched / (len(a) + len(b))`. Every character takes part in
//! matching, including spaces and common letters; quotes are short enough
//! that no popularity pruning is needed.

use std::collections::HashMap;

/// Ratio above which two quotes count as the same passage.
const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Shared contiguous run, in characters, that marks two quotes as overlapping.
const MIN_SHARED_RUN: usize = 30;

/// Whether two quotes refer to the same or an overlapping passage.
///
/// Both inputs are trimmed first; an empty side never overlaps.
pub fn overlaps(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() || b.is_empty() {
        return false;
    }

    if a.contains(b) || b.contains(a) {
        return true;
    }

    let matcher = SequenceMatcher::new(a, b);
    if matcher.ratio() > SIMILARITY_THRESHOLD {
        return true;
    }

    matcher.longest_match().size >= MIN_SHARED_RUN
}

/// Similarity of two strings in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    SequenceMatcher::new(a, b).ratio()
}

/// Length in characters of the longest common contiguous run.
pub fn longest_common_run(a: &str, b: &str) -> usize {
    SequenceMatcher::new(a, b).longest_match().size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    a: usize,
    b: usize,
    size: usize,
}

struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    /// Positions of each character in `b`, ascending
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    fn new(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();

        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }

        Self { a, b, b2j }
    }

    fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matched as f64 / total as f64
    }

    fn longest_match(&self) -> Block {
        self.find_longest_match(0, self.a.len(), 0, self.b.len())
    }

    /// Longest block with `a[alo..ahi]` and `b[blo..bhi]`. Ties go to the
    /// block starting earliest in `a`, then earliest in `b`.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let mut best = Block {
            a: alo,
            b: blo,
            size: 0,
        };
        // Run length of matches ending at each j for the previous row.
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = if j > 0 {
                        j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                    } else {
                        1
                    };
                    next.insert(j, k);
                    if k > best.size {
                        best = Block {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = next;
        }

        best
    }

    fn matching_blocks(&self) -> Vec<Block> {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            if alo < m.a && blo < m.b {
                pending.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                pending.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
            blocks.push(m);
        }

        blocks.sort_by_key(|m| (m.a, m.b));
        blocks
    }
}
