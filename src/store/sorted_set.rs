//! Sorted set value type

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use siphasher::sip::SipHasher13;

/// Member to score map
type ScoreMap = HashMap<String, f64, BuildHasherDefault<SipHasher13>>;

/// A set of unique members, each carrying a score
///
/// Members are kept unordered; ordering is computed when a range is read.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    members: ScoreMap,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member or update its score
    ///
    /// Returns true if the member was not present before.
    pub fn insert(&mut self, member: String, score: f64) -> bool {
        self.members.insert(member, score).is_none()
    }

    /// Remove a member, returns true if it was present
    pub fn remove(&mut self, member: &str) -> bool {
        self.members.remove(member).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Inclusive slice of members ordered by score
    ///
    /// Ties are broken by member, so the order matches Redis. `reverse`
    /// flips the whole order before slicing. Indexes follow ZRANGE rules:
    /// negative values count from the end and `stop` is clamped.
    pub fn range(&self, start: i64, stop: i64, reverse: bool) -> Vec<String> {
        let mut ordered: Vec<(&String, f64)> =
            self.members.iter().map(|(m, s)| (m, *s)).collect();
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        if reverse {
            ordered.reverse();
        }

        match normalize_range(start, stop, ordered.len()) {
            Some((from, to)) => ordered[from..=to]
                .iter()
                .map(|(member, _)| (*member).clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Turn ZRANGE style indexes into a valid inclusive window, if any
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if start >= len || start > stop {
        return None;
    }
    if stop >= len {
        stop = len - 1;
    }
    Some((start as usize, stop as usize))
}
