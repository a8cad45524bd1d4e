//! Entry and compaction (§4.2).

use crate::tag::Tag;
use std::collections::{HashMap, HashSet};

/// A `(tag, payload)` pair as it lives in a parsed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub tag: Tag,
    pub payload: Vec<u8>,
}

impl Entry {
    pub fn new(tag: Tag, payload: Vec<u8>) -> Self {
        debug_assert_eq!(tag.length as usize, payload.len());
        Entry { tag, payload }
    }

    /// On-disk size in bytes: the 4-byte tag plus the payload.
    pub fn size(&self) -> usize {
        4 + self.payload.len()
    }
}

/// Sum of the on-disk sizes of `entries`.
pub fn length_of(entries: &[Entry]) -> usize {
    entries.iter().map(Entry::size).sum()
}

/// Reduce `entries` to the minimal set equivalent to replaying them in
/// order: for each id, drop everything up to and including its most recent
/// SPLICE delete, then keep only the last entry for each surviving
/// `(id, type3)` slot. Distinct ids keep the relative order of their
/// surviving entries' original positions.
pub fn compact(entries: &[Entry]) -> Vec<Entry> {
    let mut last_delete: HashMap<u16, usize> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        if e.tag.is_delete() {
            last_delete.insert(e.tag.id, i);
        }
    }

    let mut slot_winner: HashMap<(u16, u8), usize> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        if e.tag.is_delete() {
            continue;
        }
        if let Some(&del_idx) = last_delete.get(&e.tag.id) {
            if i <= del_idx {
                continue;
            }
        }
        slot_winner.insert((e.tag.id, e.tag.type3), i);
    }

    let winners: HashSet<usize> = slot_winner.values().copied().collect();
    entries
        .iter()
        .enumerate()
        .filter(|(i, _)| winners.contains(i))
        .map(|(_, e)| e.clone())
        .collect()
}

/// Ids with at least one surviving (non-tombstoned) entry after compaction.
pub fn live_ids(entries: &[Entry]) -> Vec<u16> {
    let compacted = compact(entries);
    let mut ids: Vec<u16> = compacted
        .iter()
        .filter(|e| !e.tag.is_hardtail())
        .map(|e| e.tag.id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
