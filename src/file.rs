//! File read and write (§4.10, §4.11): inline and CTZ value reconstruction,
//! the inline-vs-CTZ representation choice, and overwrite-in-place via a
//! delete+replace in a single commit.

use crate::alloc::Allocator;
use crate::clock::Clock;
use crate::device::BlockDevice;
use crate::entry::Entry;
use crate::error::Error;
use crate::find::entries_of_name;
use crate::metadata::{self, Block};
use crate::read::block_of_block_pair;
use crate::tag::{
    Tag, CHUNK_NAME_CTIME, CHUNK_SPLICE_DELETE, CHUNK_STRUCT_CTZ, CHUNK_STRUCT_DIR,
    CHUNK_STRUCT_INLINE, TYPE3_NAME, TYPE3_SPLICE, TYPE3_STRUCT, TYPE3_USERATTR,
};
use crate::traverse::{get_ctz_pointers, last_block};
use crate::util::skip_list_pointers;
use crate::write::block_to_block_pair;

fn ctime_payload((days, picoseconds): (u32, u64)) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(&days.to_le_bytes());
    payload.extend_from_slice(&picoseconds.to_le_bytes());
    payload
}

pub(crate) fn name_entry(id: u16, name: &[u8]) -> Entry {
    Entry::new(Tag::new(TYPE3_NAME, CHUNK_NAME_CTIME, id, name.len() as u16), name.to_vec())
}

pub(crate) fn ctime_entry(id: u16, now: (u32, u64)) -> Entry {
    Entry::new(Tag::new(TYPE3_USERATTR, CHUNK_NAME_CTIME, id, 12), ctime_payload(now))
}

/// Resolve `name` within the directory rooted at `pair` and return its
/// value bytes, resolving CTZ files as needed.
pub fn get_value<D: BlockDevice>(
    device: &mut D,
    pair: (u64, u64),
    name: &[u8],
    program_block_size: u32,
) -> Result<Vec<u8>, Error<D::Error>> {
    let matches = entries_of_name(device, pair, name, program_block_size)?;
    let Some((_, compacted_for_id)) = matches.last() else {
        return Err(Error::NotFound(String::from_utf8_lossy(name).into_owned()));
    };

    if let Some(inline) = compacted_for_id.iter().find(|e| e.tag.is_struct(CHUNK_STRUCT_INLINE)) {
        return Ok(inline.payload.clone());
    }
    if let Some(ctz_entry) = compacted_for_id.iter().find(|e| e.tag.is_struct(CHUNK_STRUCT_CTZ)) {
        let head = u32::from_le_bytes(ctz_entry.payload[0..4].try_into().unwrap()) as u64;
        let length = u32::from_le_bytes(ctz_entry.payload[4..8].try_into().unwrap());
        return get_ctz(device, head, length as u64);
    }
    if compacted_for_id.iter().any(|e| e.tag.is_struct(CHUNK_STRUCT_DIR)) {
        return Err(Error::ValueExpected(String::from_utf8_lossy(name).into_owned()));
    }
    Err(Error::NotFound(String::from_utf8_lossy(name).into_owned()))
}

/// Reconstruct a CTZ file's bytes given its head pointer and length.
pub fn get_ctz<D: BlockDevice>(
    device: &mut D,
    head: u64,
    length: u64,
) -> Result<Vec<u8>, Error<D::Error>> {
    let blocks = get_ctz_pointers(device, head, length)?;
    let block_size = device.block_size();
    let last_index = (blocks.len() - 1) as u32;

    let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(blocks.len());
    for (pos, &block_number) in blocks.iter().enumerate() {
        let block_index = last_index - pos as u32;
        let mut buf = vec![0u8; block_size as usize];
        device.read(block_number, &mut buf).map_err(Error::Io)?;
        let skip = skip_list_pointers(block_index) as usize * 4;
        chunks.push(buf[skip..].to_vec());
    }
    chunks.reverse();

    let mut data: Vec<u8> = chunks.into_iter().flatten().collect();
    data.truncate(length as usize);
    Ok(data)
}

/// Allocate and write the data blocks of a CTZ skip-list holding `data`.
/// Returns `(head_block_number, length)`.
pub fn write_ctz_block<D: BlockDevice>(
    device: &mut D,
    data: &[u8],
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
    program_block_size: u32,
) -> Result<(u64, u32), Error<D::Error>> {
    let block_size = device.block_size();
    let mut written: Vec<u64> = Vec::new();
    let mut offset = 0usize;
    let mut i: u32 = 0;

    loop {
        let pointers = skip_list_pointers(i) as usize;
        let skip_bytes = pointers * 4;
        let data_cap = block_size as usize - skip_bytes;
        let remaining = data.len() - offset;
        let take = remaining.min(data_cap);

        let block_number = allocator.get_block(device, root, block_count, program_block_size)?;
        let mut buf = vec![0u8; block_size as usize];

        if i > 0 {
            let prev = written[(i - 1) as usize];
            buf[0..4].copy_from_slice(&(prev as u32).to_le_bytes());
            for k in 1..pointers {
                let back_index = i - (1u32 << k);
                let ptr_block = written[back_index as usize];
                buf[4 * k..4 * k + 4].copy_from_slice(&(ptr_block as u32).to_le_bytes());
            }
        }
        buf[skip_bytes..skip_bytes + take].copy_from_slice(&data[offset..offset + take]);
        device.write(block_number, &buf).map_err(Error::Io)?;
        log::trace!("wrote ctz block {i} -> {block_number} ({take} data bytes)");

        written.push(block_number);
        offset += take;
        if offset >= data.len() {
            return Ok((block_number, data.len() as u32));
        }
        i += 1;
    }
}

/// Build the NAME + CTIME + inline-STRUCT entries for a fresh inline value.
pub fn write_inline(id: u16, name: &[u8], data: &[u8], now: (u32, u64)) -> Vec<Entry> {
    vec![
        name_entry(id, name),
        ctime_entry(id, now),
        Entry::new(
            Tag::new(TYPE3_STRUCT, CHUNK_STRUCT_INLINE, id, data.len() as u16),
            data.to_vec(),
        ),
    ]
}

/// Write `data` as a CTZ file and build its NAME + CTIME + CTZ-STRUCT
/// entries.
#[allow(clippy::too_many_arguments)]
pub fn write_ctz<D: BlockDevice>(
    device: &mut D,
    id: u16,
    name: &[u8],
    data: &[u8],
    now: (u32, u64),
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
    program_block_size: u32,
) -> Result<Vec<Entry>, Error<D::Error>> {
    let (head, length) = write_ctz_block(device, data, allocator, root, block_count, program_block_size)?;
    Ok(vec![
        name_entry(id, name),
        ctime_entry(id, now),
        metadata::ctz_struct_entry(id, head, length),
    ])
}

/// Create or overwrite `name` inside the directory rooted at `pair`.
/// Overwriting tombstones the old id in the same commit as the new entries.
#[allow(clippy::too_many_arguments)]
pub fn set_in_directory<D: BlockDevice, C: Clock>(
    device: &mut D,
    pair: (u64, u64),
    name: &[u8],
    data: &[u8],
    clock: &C,
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
    program_block_size: u32,
) -> Result<(), Error<D::Error>> {
    if name.is_empty() {
        return Err(Error::ValueExpected(String::new()));
    }

    let matches = entries_of_name(device, pair, name, program_block_size)?;
    let (target_pair, delete_id) = match matches.last() {
        Some((p, compacted_for_id)) => (*p, compacted_for_id.first().map(|e| e.tag.id)),
        None => (last_block(device, pair, program_block_size)?, None),
    };

    let mut block = block_of_block_pair(device, target_pair, program_block_size)?;
    let existing_ids = block.ids();
    let id = existing_ids.iter().max().map(|m| m + 1).unwrap_or(1);
    let block_size = device.block_size();
    let now = clock.now();

    let mut entries = if data.len() as u32 > block_size / 4 {
        write_ctz(
            device, id, name, data, now, allocator, root, block_count, program_block_size,
        )?
    } else {
        write_inline(id, name, data, now)
    };

    if let Some(old_id) = delete_id {
        entries.push(Entry::new(
            Tag::new(TYPE3_SPLICE, CHUNK_SPLICE_DELETE, old_id, 0),
            vec![],
        ));
        log::debug!("overwriting id {old_id} with fresh id {id} for name in same commit");
    }

    block.add_commit(entries);
    block_to_block_pair(
        device,
        &block,
        target_pair,
        block_size,
        program_block_size,
        allocator,
        root,
        block_count,
    )
}

/// Remove `name` from the directory rooted at `pair`. Succeeds silently if
/// `name` does not exist.
pub fn delete_in_directory<D: BlockDevice>(
    device: &mut D,
    pair: (u64, u64),
    name: &[u8],
    allocator: &mut Allocator,
    root: (u64, u64),
    block_count: u64,
    program_block_size: u32,
) -> Result<(), Error<D::Error>> {
    let matches = entries_of_name(device, pair, name, program_block_size)?;
    let Some((target_pair, compacted_for_id)) = matches.last() else {
        return Ok(());
    };
    let Some(id) = compacted_for_id.first().map(|e| e.tag.id) else {
        return Ok(());
    };

    let mut block = block_of_block_pair(device, *target_pair, program_block_size)?;
    block.add_commit(vec![Entry::new(
        Tag::new(TYPE3_SPLICE, CHUNK_SPLICE_DELETE, id, 0),
        vec![],
    )]);
    let block_size = device.block_size();
    block_to_block_pair(
        device,
        &block,
        *target_pair,
        block_size,
        program_block_size,
        allocator,
        root,
        block_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{Allocator, Bias};
    use crate::clock::TickingClock;
    use crate::device::MemoryDevice;

    fn format_root(device: &mut MemoryDevice, program_block_size: u32) {
        let block = Block::of_entries(1, vec![]);
        let (bytes, _) = metadata::into_cstruct(&block, device.block_size(), program_block_size);
        let mut padded = bytes;
        padded.resize(device.block_size() as usize, 0);
        device.write(0, &padded).unwrap();
        device.write(1, &padded).unwrap();
    }

    #[test]
    fn set_then_get_inline_value() {
        let mut device = MemoryDevice::new(512, 16);
        format_root(&mut device, 16);
        let clock = TickingClock::default();
        let mut allocator = Allocator::new(Bias::Before);

        set_in_directory(&mut device, (0, 1), b"a", b"hello", &clock, &mut allocator, (0, 1), 16, 16)
            .unwrap();
        let got = get_value(&mut device, (0, 1), b"a", 16).unwrap();
        assert_eq!(got, b"hello");
    }

    #[test]
    fn set_then_get_ctz_value() {
        let mut device = MemoryDevice::new(512, 32);
        format_root(&mut device, 16);
        let clock = TickingClock::default();
        let mut allocator = Allocator::new(Bias::Before);

        let data = vec![b'x'; 2000];
        set_in_directory(&mut device, (0, 1), b"big", &data, &clock, &mut allocator, (0, 1), 32, 16)
            .unwrap();
        let got = get_value(&mut device, (0, 1), b"big", 16).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn overwrite_replaces_value_and_tombstones_old_id() {
        let mut device = MemoryDevice::new(512, 32);
        format_root(&mut device, 16);
        let clock = TickingClock::default();
        let mut allocator = Allocator::new(Bias::Before);

        set_in_directory(&mut device, (0, 1), b"a", b"v1", &clock, &mut allocator, (0, 1), 32, 16)
            .unwrap();
        set_in_directory(
            &mut device,
            (0, 1),
            b"a",
            &vec![b'y'; 2000],
            &clock,
            &mut allocator,
            (0, 1),
            32,
            16,
        )
        .unwrap();

        let got = get_value(&mut device, (0, 1), b"a", 16).unwrap();
        assert_eq!(got, vec![b'y'; 2000]);

        let block = block_of_block_pair(&mut device, (0, 1), 16).unwrap();
        let matches = entries_of_name(&mut device, (0, 1), b"a", 16).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(block.ids().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut device = MemoryDevice::new(512, 16);
        format_root(&mut device, 16);
        let clock = TickingClock::default();
        let mut allocator = Allocator::new(Bias::Before);

        set_in_directory(&mut device, (0, 1), b"a", b"v", &clock, &mut allocator, (0, 1), 16, 16)
            .unwrap();
        delete_in_directory(&mut device, (0, 1), b"a", &mut allocator, (0, 1), 16, 16).unwrap();
        delete_in_directory(&mut device, (0, 1), b"a", &mut allocator, (0, 1), 16, 16).unwrap();

        let err = get_value(&mut device, (0, 1), b"a", 16).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(20))]
        #[test]
        fn prop_ctz_round_trips_any_large_value(len in 65usize..3000) {
            let mut device = MemoryDevice::new(256, 64);
            format_root(&mut device, 16);
            let clock = TickingClock::default();
            let mut allocator = Allocator::new(Bias::Before);
            let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

            set_in_directory(&mut device, (0, 1), b"f", &data, &clock, &mut allocator, (0, 1), 64, 16)
                .unwrap();
            let got = get_value(&mut device, (0, 1), b"f", 16).unwrap();
            proptest::prop_assert_eq!(got, data);
        }
    }
}
