//! Write path (§4.8): write a block to both legs of a pair; on overflow,
//! compact, and if that is not enough, split into a freshly allocated pair
//! linked by hardtail.

use crate::alloc::Allocator;
use crate::device::BlockDevice;
use crate::entry;
use crate::error::Error;
use crate::metadata::{self, Block, CstructStatus};

/// Write one raw, already-serialized block to a single location.
pub fn block_to_block_number<D: BlockDevice>(
    device: &mut D,
    buf: &[u8],
    loc: u64,
) -> Result<(), Error<D::Error>> {
    device.write(loc, buf).map_err(Error::Io)
}

fn write_both<D: BlockDevice>(
    device: &mut D,
    bytes: &[u8],
    pair: (u64, u64),
    block_size: u32,
) -> Result<(), Error<D::Error>> {
    let mut padded = bytes.to_vec();
    padded.resize(block_size as usize, 0);
    block_to_block_number(device, &padded, pair.0)?;
    block_to_block_number(device, &padded, pair.1)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn block_to_block_pair<D: BlockDevice>(
    device: &mut D,
    block: &Block,
    pair: (u64, u64),
    block_size: u32,
    program_block_size: u32,
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
) -> Result<(), Error<D::Error>> {
    let (bytes, status) = metadata::into_cstruct(block, block_size, program_block_size);
    if status == CstructStatus::Ok {
        return write_both(device, &bytes, pair, block_size);
    }

    log::debug!(
        "block at {pair:?} overflowed ({status:?}), {} live entry bytes across {} commits, attempting compaction",
        entry::length_of(&block.flatten()),
        block.commits.len()
    );
    let compacted_block = block.compacted();
    let (cbytes, cstatus) = metadata::into_cstruct(&compacted_block, block_size, program_block_size);

    match cstatus {
        CstructStatus::Ok => write_both(device, &cbytes, pair, block_size),
        CstructStatus::Split if compacted_block.hardtail().is_none() => {
            log::debug!("splitting block at {pair:?}");
            split(
                device,
                &compacted_block,
                pair,
                block_size,
                program_block_size,
                allocator,
                root,
                block_count,
            )
        }
        CstructStatus::Split => {
            log::warn!(
                "block at {pair:?} still overflows after compaction but already has a hardtail; writing compacted form as-is"
            );
            write_both(device, &cbytes, pair, block_size)
        }
        CstructStatus::SplitEmergency => {
            log::error!("block at {pair:?} cannot be made to fit even after compaction");
            Err(Error::NoSpace)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn split<D: BlockDevice>(
    device: &mut D,
    compacted_block: &Block,
    pair: (u64, u64),
    block_size: u32,
    program_block_size: u32,
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
) -> Result<(), Error<D::Error>> {
    let entries = compacted_block.flatten();
    let mut ids: Vec<u16> = entries.iter().map(|e| e.tag.id).collect();
    ids.sort_unstable();
    ids.dedup();

    if ids.len() < 2 {
        log::error!("block at {pair:?} cannot be split: fewer than two distinct ids");
        return Err(Error::NoSpace);
    }
    let threshold = ids[ids.len() / 2];

    let new_entries: Vec<_> = entries.iter().filter(|e| e.tag.id >= threshold).cloned().collect();
    let mut old_entries: Vec<_> = entries.iter().filter(|e| e.tag.id < threshold).cloned().collect();

    let new_pair = allocator.get_block_pair(device, root, block_count, program_block_size)?;

    let new_block = Block::of_entries(1, new_entries);
    let (new_bytes, new_status) = metadata::into_cstruct(&new_block, block_size, program_block_size);
    if new_status != CstructStatus::Ok {
        log::error!("split's new half at {new_pair:?} still does not fit");
        return Err(Error::NoSpace);
    }
    write_both(device, &new_bytes, new_pair, block_size)?;

    old_entries.push(metadata::hardtail_entry(new_pair));
    let old_block = Block::of_entries(compacted_block.revision_count.wrapping_add(1), old_entries);
    let (old_bytes, old_status) = metadata::into_cstruct(&old_block, block_size, program_block_size);
    if old_status != CstructStatus::Ok {
        log::error!("split's old half at {pair:?} still does not fit after moving entries out");
        return Err(Error::NoSpace);
    }
    write_both(device, &old_bytes, pair, block_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Bias;
    use crate::device::MemoryDevice;
    use crate::entry::Entry;
    use crate::read::block_of_block_pair;
    use crate::tag::*;

    fn name(id: u16, s: &str) -> Entry {
        Entry::new(
            Tag::new(TYPE3_NAME, CHUNK_NAME_CTIME, id, s.len() as u16),
            s.as_bytes().to_vec(),
        )
    }

    #[test]
    fn fitting_block_writes_both_legs() {
        let mut device = MemoryDevice::new(512, 8);
        let mut allocator = Allocator::new(Bias::Before);
        let block = Block::of_entries(1, vec![name(1, "a")]);
        block_to_block_pair(&mut device, &block, (0, 1), 512, 16, &mut allocator, (0, 1), 8).unwrap();

        let got = block_of_block_pair(&mut device, (0, 1), 16).unwrap();
        assert_eq!(got, block);
    }

    #[test]
    fn overflowing_block_splits_and_links_hardtail() {
        let mut device = MemoryDevice::new(256, 8);
        let mut allocator = Allocator::new(Bias::Before);

        let long = "x".repeat(40);
        let entries: Vec<Entry> = (0..10u16).map(|i| name(i, &long)).collect();
        let block = Block::of_entries(1, entries);

        block_to_block_pair(&mut device, &block, (0, 1), 256, 16, &mut allocator, (0, 1), 8).unwrap();

        let got = block_of_block_pair(&mut device, (0, 1), 16).unwrap();
        let tail = got.hardtail().expect("block should have split off a hardtail");
        assert_ne!(tail.0, 0);
        assert_ne!(tail.1, 1);

        let new_block = block_of_block_pair(&mut device, tail, 16).unwrap();
        let mut all_ids = got.ids();
        all_ids.extend(new_block.ids());
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 10);
    }
}
