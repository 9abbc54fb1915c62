use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered set of 1-based TCF ids (purposes, special features, vendors).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet(BTreeSet<u16>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: u16) {
        self.0.insert(id);
    }

    pub fn unset(&mut self, id: u16) {
        self.0.remove(&id);
    }

    pub fn has(&self, id: u16) -> bool {
        self.0.contains(&id)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Highest id present, 0 when empty.
    pub fn max_id(&self) -> u16 {
        self.0.last().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Splits the set into inclusive runs of consecutive ids.
    pub fn ranges(&self) -> Vec<(u16, u16)> {
        let mut out: Vec<(u16, u16)> = Vec::new();
        for id in self.iter() {
            match out.last_mut() {
                Some((_, end)) if end.checked_add(1) == Some(id) => *end = id,
                _ => out.push((id, id)),
            }
        }
        out
    }
}

impl FromIterator<u16> for IdSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<u16> for IdSet {
    fn extend<I: IntoIterator<Item = u16>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
