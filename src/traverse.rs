//! Traversal (§4.6): enumerate every block reachable from the root metadata
//! pair, walk a directory's hardtail chain, and follow a CTZ skip-list.

use crate::device::BlockDevice;
use crate::error::Error;
use crate::metadata::Link;
use crate::read::block_of_block_pair;
use crate::util::last_block_index;
use std::collections::{HashSet, VecDeque};

fn normalize(pair: (u64, u64)) -> (u64, u64) {
    if pair.0 <= pair.1 {
        pair
    } else {
        (pair.1, pair.0)
    }
}

fn to_disconnected<E>(err: Error<E>) -> Error<E> {
    match err {
        Error::Corrupt(b) => Error::Disconnected(b),
        other => other,
    }
}

/// Walk hardtails from `pair`, returning the terminal pair of the chain.
pub fn last_block<D: BlockDevice>(
    device: &mut D,
    mut pair: (u64, u64),
    program_block_size: u32,
) -> Result<(u64, u64), Error<D::Error>> {
    let mut visited = HashSet::new();
    loop {
        if !visited.insert(normalize(pair)) {
            return Err(Error::Disconnected(pair.0));
        }
        let block = block_of_block_pair(device, pair, program_block_size)?;
        match block.hardtail() {
            Some(next) => pair = next,
            None => return Ok(pair),
        }
    }
}

/// Recursively enumerate every block number reachable from `root` via
/// directory hardtails, subdirectory pointers, and CTZ chains. This is the
/// *used* set the allocator scans against.
pub fn follow_links<D: BlockDevice>(
    device: &mut D,
    root: (u64, u64),
    program_block_size: u32,
) -> Result<HashSet<u64>, Error<D::Error>> {
    let mut used = HashSet::new();
    let mut visited_pairs = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root);

    while let Some(pair) = queue.pop_front() {
        if !visited_pairs.insert(normalize(pair)) {
            continue;
        }
        used.insert(pair.0);
        used.insert(pair.1);

        let block = block_of_block_pair(device, pair, program_block_size).map_err(to_disconnected)?;

        for link in block.linked_blocks() {
            match link {
                Link::Pair(a, b) => queue.push_back((a, b)),
                Link::Ctz { head, length } => {
                    let blocks = get_ctz_pointers(device, head, length)?;
                    used.extend(blocks);
                }
            }
        }
    }

    Ok(used)
}

/// Walk a CTZ skip-list's slot-0 back-pointers starting at `head` (the
/// *last* block written), returning every data block number from last to
/// first.
pub fn get_ctz_pointers<D: BlockDevice>(
    device: &mut D,
    head: u64,
    file_size: u64,
) -> Result<Vec<u64>, Error<D::Error>> {
    let index = last_block_index(file_size, device.block_size());
    let mut blocks = vec![head];
    let mut current = head;
    let mut buf = vec![0u8; device.block_size() as usize];

    for _ in 0..index {
        device.read(current, &mut buf).map_err(Error::Io)?;
        let pointer = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as u64;
        blocks.push(pointer);
        current = pointer;
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::metadata::{self, Block};

    fn write_block(device: &mut MemoryDevice, loc: u64, block: &Block, program_block_size: u32) {
        let (bytes, status) = metadata::into_cstruct(block, device.block_size(), program_block_size);
        assert_eq!(status, metadata::CstructStatus::Ok);
        let mut padded = bytes;
        padded.resize(device.block_size() as usize, 0);
        device.write(loc, &padded).unwrap();
    }

    #[test]
    fn last_block_follows_hardtail_chain() {
        let mut device = MemoryDevice::new(512, 6);
        let head = Block::of_entries(1, vec![metadata::hardtail_entry((2, 3))]);
        let tail = Block::of_entries(1, vec![]);
        write_block(&mut device, 0, &head, 16);
        write_block(&mut device, 1, &head, 16);
        write_block(&mut device, 2, &tail, 16);
        write_block(&mut device, 3, &tail, 16);

        let last = last_block(&mut device, (0, 1), 16).unwrap();
        assert_eq!(last, (2, 3));
    }

    #[test]
    fn follow_links_includes_hardtail_and_subdir_pairs() {
        let mut device = MemoryDevice::new(512, 8);
        let sub = Block::of_entries(1, vec![]);
        write_block(&mut device, 4, &sub, 16);
        write_block(&mut device, 5, &sub, 16);

        let root = Block::of_entries(
            1,
            vec![metadata::dir_struct_entry(1, (4, 5))],
        );
        write_block(&mut device, 0, &root, 16);
        write_block(&mut device, 1, &root, 16);

        let used = follow_links(&mut device, (0, 1), 16).unwrap();
        assert!(used.contains(&0));
        assert!(used.contains(&1));
        assert!(used.contains(&4));
        assert!(used.contains(&5));
    }

    #[test]
    fn ctz_pointers_single_block_file() {
        let mut device = MemoryDevice::new(512, 2);
        let blocks = get_ctz_pointers(&mut device, 0, 10).unwrap();
        assert_eq!(blocks, vec![0]);
    }
}
