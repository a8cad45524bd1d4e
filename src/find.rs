//! Find (§4.9): enumerate a directory's entries, resolve a name to the
//! entries that belong to it, and walk a path down to its basename's
//! containing blockpair.

use crate::device::BlockDevice;
use crate::entry::{self, Entry};
use crate::error::Error;
use crate::read::block_of_block_pair;
use crate::tag::CHUNK_STRUCT_DIR;

/// Every `(blockpair, entries)` along a directory's hardtail chain, entries
/// left uncompacted so the caller can still locate the specific block that
/// holds a given id (e.g. for in-place delete).
pub fn all_entries_in_dir<D: BlockDevice>(
    device: &mut D,
    head: (u64, u64),
    program_block_size: u32,
) -> Result<Vec<((u64, u64), Vec<Entry>)>, Error<D::Error>> {
    let mut out = Vec::new();
    let mut pair = head;
    loop {
        let block = block_of_block_pair(device, pair, program_block_size)?;
        let next = block.hardtail();
        out.push((pair, block.flatten()));
        match next {
            Some(n) => pair = n,
            None => break,
        }
    }
    Ok(out)
}

/// For each block in the hardtail chain rooted at `head`, find the id whose
/// NAME entry matches `name` and return that block's compacted entries for
/// that id. Blocks with no match are omitted.
pub fn entries_of_name<D: BlockDevice>(
    device: &mut D,
    head: (u64, u64),
    name: &[u8],
    program_block_size: u32,
) -> Result<Vec<((u64, u64), Vec<Entry>)>, Error<D::Error>> {
    let mut out = Vec::new();
    for (pair, entries) in all_entries_in_dir(device, head, program_block_size)? {
        let compacted = entry::compact(&entries);
        let id = compacted
            .iter()
            .find(|e| e.tag.is_name() && e.payload == name)
            .map(|e| e.tag.id);

        let Some(id) = id else { continue };
        let for_id: Vec<Entry> = entries.iter().filter(|e| e.tag.id == id).cloned().collect();
        let compacted_for_id = entry::compact(&for_id);
        if !compacted_for_id.is_empty() {
            out.push((pair, compacted_for_id));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    BasenameOn((u64, u64)),
    NoId(Vec<u8>),
    NoStructs,
    NoEntry,
}

/// Recursive descent through `path_segments` starting at `head`, following
/// subdirectory STRUCT entries. "Last block wins" when a name appears in
/// more than one block of a hardtail chain (reference behavior).
pub fn find_first_blockpair_of_directory<D: BlockDevice>(
    device: &mut D,
    head: (u64, u64),
    path_segments: &[Vec<u8>],
    program_block_size: u32,
) -> Result<FindResult, Error<D::Error>> {
    let mut current = head;
    for seg in path_segments {
        if seg.is_empty() {
            return Ok(FindResult::NoEntry);
        }
        let matches = entries_of_name(device, current, seg, program_block_size)?;
        let Some((_, compacted_for_id)) = matches.last() else {
            return Ok(FindResult::NoId(seg.clone()));
        };
        let dir_entry = compacted_for_id.iter().find(|e| e.tag.is_struct(CHUNK_STRUCT_DIR));
        let Some(dir_entry) = dir_entry else {
            return Ok(FindResult::NoStructs);
        };
        let a = u64::from_le_bytes(dir_entry.payload[0..8].try_into().unwrap());
        let b = u64::from_le_bytes(dir_entry.payload[8..16].try_into().unwrap());
        current = (a, b);
    }
    Ok(FindResult::BasenameOn(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::metadata::{self, Block};
    use crate::tag::*;

    fn write_block(device: &mut MemoryDevice, loc: u64, block: &Block, program_block_size: u32) {
        let (bytes, status) = metadata::into_cstruct(block, device.block_size(), program_block_size);
        assert_eq!(status, metadata::CstructStatus::Ok);
        let mut padded = bytes;
        padded.resize(device.block_size() as usize, 0);
        device.write(loc, &padded).unwrap();
    }

    fn name_entry(id: u16, name: &str) -> crate::entry::Entry {
        crate::entry::Entry::new(
            Tag::new(TYPE3_NAME, CHUNK_NAME_CTIME, id, name.len() as u16),
            name.as_bytes().to_vec(),
        )
    }

    #[test]
    fn find_resolves_nested_directory() {
        let mut device = MemoryDevice::new(512, 8);
        let sub = Block::of_entries(1, vec![name_entry(1, "file")]);
        write_block(&mut device, 4, &sub, 16);
        write_block(&mut device, 5, &sub, 16);

        let root = Block::of_entries(
            1,
            vec![name_entry(1, "sub"), metadata::dir_struct_entry(1, (4, 5))],
        );
        write_block(&mut device, 0, &root, 16);
        write_block(&mut device, 1, &root, 16);

        let result =
            find_first_blockpair_of_directory(&mut device, (0, 1), &[b"sub".to_vec()], 16).unwrap();
        assert_eq!(result, FindResult::BasenameOn((4, 5)));
    }

    #[test]
    fn find_reports_no_id_for_missing_segment() {
        let mut device = MemoryDevice::new(512, 8);
        let root = Block::of_entries(1, vec![]);
        write_block(&mut device, 0, &root, 16);
        write_block(&mut device, 1, &root, 16);

        let result =
            find_first_blockpair_of_directory(&mut device, (0, 1), &[b"missing".to_vec()], 16)
                .unwrap();
        assert_eq!(result, FindResult::NoId(b"missing".to_vec()));
    }
}
