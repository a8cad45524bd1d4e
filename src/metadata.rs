//! Metadata block I/O (§4.4): `{revision_count, commits[]}`, its on-disk
//! (de)serialization, and the queries directory/file/allocator code need
//! over a block's surviving entries.

use crate::commit::{read_commit, write_commit};
use crate::entry::{self, Entry};
use crate::error::Error;
use crate::tag::{CHUNK_STRUCT_CTZ, CHUNK_STRUCT_DIR, CHUNK_TAIL_HARD, TYPE3_STRUCT, TYPE3_TAIL};

/// One in-memory metadata block: a revision counter and the ordered list of
/// commits that produced it. Kept as separate commits (rather than a single
/// flattened entry list) so `add_commit` and split/compaction can reason
/// about which commit an id's winning entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub revision_count: u32,
    pub commits: Vec<Vec<Entry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CstructStatus {
    Ok,
    Split,
    SplitEmergency,
}

/// A reference to another block or chain discovered in a block's surviving
/// entries, as used by the allocator's live-set scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Pair(u64, u64),
    Ctz { head: u64, length: u32 },
}

impl Block {
    pub fn of_entries(revision_count: u32, entries: Vec<Entry>) -> Self {
        Block {
            revision_count,
            commits: vec![entries],
        }
    }

    /// All entries across all commits, in commit order (later commits'
    /// entries for a given id/type3 win, matching `compact`'s semantics).
    pub fn flatten(&self) -> Vec<Entry> {
        self.commits.iter().flatten().cloned().collect()
    }

    /// Append a new commit, bumping `revision_count`.
    pub fn add_commit(&mut self, entries: Vec<Entry>) {
        self.revision_count = self.revision_count.wrapping_add(1);
        self.commits.push(entries);
    }

    /// Collapse to a single commit holding the compacted union of every
    /// commit's entries.
    pub fn compacted(&self) -> Block {
        let compacted = entry::compact(&self.flatten());
        Block {
            revision_count: self.revision_count,
            commits: vec![compacted],
        }
    }

    pub fn hardtail(&self) -> Option<(u64, u64)> {
        let compacted = entry::compact(&self.flatten());
        compacted.iter().find(|e| e.tag.is_hardtail()).map(|e| {
            let a = u64::from_le_bytes(e.payload[0..8].try_into().unwrap());
            let b = u64::from_le_bytes(e.payload[8..16].try_into().unwrap());
            (a, b)
        })
    }

    pub fn linked_blocks(&self) -> Vec<Link> {
        let compacted = entry::compact(&self.flatten());
        let mut links = Vec::new();
        for e in &compacted {
            if e.tag.is_hardtail() {
                let a = u64::from_le_bytes(e.payload[0..8].try_into().unwrap());
                let b = u64::from_le_bytes(e.payload[8..16].try_into().unwrap());
                links.push(Link::Pair(a, b));
            } else if e.tag.type3 == TYPE3_STRUCT && e.tag.chunk == CHUNK_STRUCT_DIR {
                let a = u64::from_le_bytes(e.payload[0..8].try_into().unwrap());
                let b = u64::from_le_bytes(e.payload[8..16].try_into().unwrap());
                links.push(Link::Pair(a, b));
            } else if e.tag.type3 == TYPE3_STRUCT && e.tag.chunk == CHUNK_STRUCT_CTZ {
                let head = u32::from_le_bytes(e.payload[0..4].try_into().unwrap()) as u64;
                let length = u32::from_le_bytes(e.payload[4..8].try_into().unwrap());
                links.push(Link::Ctz { head, length });
            }
        }
        links
    }

    pub fn ids(&self) -> Vec<u16> {
        entry::live_ids(&self.flatten())
    }
}

/// Parse a block from its on-disk bytes.
///
/// Has no block number of its own to report, so every `Corrupt` raised here
/// carries a placeholder `0`; callers that know which block they read (e.g.
/// `read::block_of_block_number`) substitute the real number before
/// propagating the error further.
pub fn of_cstruct<E>(data: &[u8], program_block_size: u32) -> Result<Block, Error<E>> {
    if data.len() < 4 {
        return Err(Error::Corrupt(0));
    }
    let revision_count = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let mut commits = Vec::new();
    let mut pos = 4usize;
    let mut xor_tag = u32::MAX;
    let mut seed = data[0..4].to_vec();

    loop {
        if pos >= data.len() {
            break;
        }
        match read_commit(&data[pos..], xor_tag, &seed, program_block_size) {
            Some(parsed) => {
                commits.push(parsed.entries);
                pos += parsed.len;
                xor_tag = parsed.last_tag_raw;
                seed = Vec::new();
            }
            None => break,
        }
    }

    if commits.is_empty() {
        return Err(Error::Corrupt(0));
    }
    Ok(Block {
        revision_count,
        commits,
    })
}

/// Serialize a block. Returns the bytes (which may exceed `block_size`,
/// the caller decides what to do based on `status`) and whether it fits.
///
/// `Split` vs `SplitEmergency` is a magnitude heuristic, not an exact
/// lookahead at what compaction would save: overflow within one extra
/// block's worth is plausibly recoverable by dropping shadowed entries,
/// while anything beyond that means the live data alone cannot fit even in
/// the best case, so there is no point trying before splitting.
pub fn into_cstruct(block: &Block, block_size: u32, program_block_size: u32) -> (Vec<u8>, CstructStatus) {
    let buf = serialize_raw(block, program_block_size);
    let status = if buf.len() <= block_size as usize {
        CstructStatus::Ok
    } else if buf.len() <= 2 * block_size as usize {
        CstructStatus::Split
    } else {
        CstructStatus::SplitEmergency
    };
    (buf, status)
}

fn serialize_raw(block: &Block, program_block_size: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&block.revision_count.to_le_bytes());
    let mut xor_tag = u32::MAX;
    let mut seed = block.revision_count.to_le_bytes().to_vec();
    for commit_entries in &block.commits {
        let written = write_commit(&mut buf, commit_entries, xor_tag, &seed, program_block_size);
        xor_tag = written.last_tag_raw;
        seed = Vec::new();
    }
    buf
}

pub fn hardtail_entry(pair: (u64, u64)) -> Entry {
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&pair.0.to_le_bytes());
    payload.extend_from_slice(&pair.1.to_le_bytes());
    Entry::new(
        crate::tag::Tag::new(TYPE3_TAIL, CHUNK_TAIL_HARD, crate::tag::MAX_ID, 16),
        payload,
    )
}

pub fn dir_struct_entry(id: u16, pair: (u64, u64)) -> Entry {
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&pair.0.to_le_bytes());
    payload.extend_from_slice(&pair.1.to_le_bytes());
    Entry::new(
        crate::tag::Tag::new(TYPE3_STRUCT, CHUNK_STRUCT_DIR, id, 16),
        payload,
    )
}

/// `(head_pointer, file_length)`, both 32-bit on disk per the CTZ on-disk
/// format (§6).
pub fn ctz_struct_entry(id: u16, head: u64, length: u32) -> Entry {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&(head as u32).to_le_bytes());
    payload.extend_from_slice(&length.to_le_bytes());
    Entry::new(
        crate::tag::Tag::new(TYPE3_STRUCT, CHUNK_STRUCT_CTZ, id, 8),
        payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::tag::*;

    fn name(id: u16, s: &str) -> Entry {
        Entry::new(
            Tag::new(TYPE3_NAME, CHUNK_NAME_CTIME, id, s.len() as u16),
            s.as_bytes().to_vec(),
        )
    }

    #[test]
    fn block_round_trip() {
        let block = Block::of_entries(1, vec![name(1, "a.txt")]);
        let (bytes, status) = into_cstruct(&block, 512, 16);
        assert_eq!(status, CstructStatus::Ok);
        let mut padded = bytes.clone();
        padded.resize(512, 0);
        let parsed: Block = of_cstruct(&padded, 16).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn add_commit_round_trips_both_commits() {
        let mut block = Block::of_entries(1, vec![name(1, "a")]);
        block.add_commit(vec![name(2, "b")]);
        assert_eq!(block.revision_count, 2);
        let (bytes, status) = into_cstruct(&block, 512, 16);
        assert_eq!(status, CstructStatus::Ok);
        let mut padded = bytes.clone();
        padded.resize(512, 0);
        let parsed: Block = of_cstruct(&padded, 16).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.ids(), vec![1, 2]);
    }

    #[test]
    fn hardtail_round_trips() {
        let block = Block::of_entries(1, vec![hardtail_entry((4, 5))]);
        assert_eq!(block.hardtail(), Some((4, 5)));
        assert_eq!(block.linked_blocks(), vec![Link::Pair(4, 5)]);
    }

    #[test]
    fn overflowing_block_reports_split() {
        let entries: Vec<Entry> = (0..40)
            .map(|i| name(i, "0123456789012345678901234567890"))
            .collect();
        let block = Block::of_entries(1, entries);
        let (_, status) = into_cstruct(&block, 512, 16);
        assert_ne!(status, CstructStatus::Ok);
    }
}
