//! Commit serialization (§4.3): an ordered run of entries terminated by a
//! CRC tag, XOR-chained tag-to-tag, padded with zeroes to a multiple of
//! `program_block_size`.
//!
//! The running CRC covers every tag and payload byte of the commit,
//! including the CRC tag itself and the zero padding that follows the CRC
//! value — only the 4-byte CRC value slot is excluded, so corrupting a
//! padding byte is just as detectable as corrupting a payload byte (§8
//! property 4).

use crate::entry::Entry;
use crate::tag::{Tag, TYPE3_CRC};

pub struct WrittenCommit {
    pub last_tag_raw: u32,
    pub len: usize,
}

/// Serialize one commit into `buf`, appending at the current length.
///
/// `starting_xor_tag` is the mask for the first tag of this commit: the
/// all-ones pattern for the very first commit in a block, otherwise the
/// previous commit's last (CRC) tag raw bytes. `seed_bytes` primes the
/// running CRC; it is the little-endian `revision_count` for the first
/// commit in a block and empty for every later one.
pub fn write_commit(
    buf: &mut Vec<u8>,
    entries: &[Entry],
    starting_xor_tag: u32,
    seed_bytes: &[u8],
    program_block_size: u32,
) -> WrittenCommit {
    let start = buf.len();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(seed_bytes);

    let mut prev_raw = starting_xor_tag;
    for entry in entries {
        let raw = entry.tag.emit(prev_raw);
        let raw_bytes = raw.to_le_bytes();
        buf.extend_from_slice(&raw_bytes);
        hasher.update(&raw_bytes);
        buf.extend_from_slice(&entry.payload);
        hasher.update(&entry.payload);
        prev_raw = raw;
    }

    let crc_tag = Tag::new(TYPE3_CRC, 0, 0, 4);
    let crc_tag_raw = crc_tag.emit(prev_raw);
    let crc_tag_bytes = crc_tag_raw.to_le_bytes();
    buf.extend_from_slice(&crc_tag_bytes);
    hasher.update(&crc_tag_bytes);

    let value_offset = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    let unpadded_len = buf.len() - start;
    let padded_len =
        unpadded_len.div_ceil(program_block_size as usize) * program_block_size as usize;
    let pad_len = padded_len - unpadded_len;
    let padding = vec![0u8; pad_len];
    hasher.update(&padding);
    buf.extend_from_slice(&padding);

    let crc_value = hasher.finalize();
    buf[value_offset..value_offset + 4].copy_from_slice(&crc_value.to_le_bytes());

    WrittenCommit {
        last_tag_raw: crc_tag_raw,
        len: buf.len() - start,
    }
}

pub struct ParsedCommit {
    pub entries: Vec<Entry>,
    pub last_tag_raw: u32,
    pub len: usize,
}

/// Parse one commit out of `data` (which starts exactly at the commit's
/// first tag). Returns `None` if the bytes don't form a commit whose CRC
/// validates — the caller then knows no further commits follow in this
/// block.
pub fn read_commit(
    data: &[u8],
    starting_xor_tag: u32,
    seed_bytes: &[u8],
    program_block_size: u32,
) -> Option<ParsedCommit> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(seed_bytes);
    let mut prev_raw = starting_xor_tag;
    let mut pos = 0usize;
    let mut entries = Vec::new();

    loop {
        if pos + 4 > data.len() {
            return None;
        }
        let raw_bytes: [u8; 4] = data[pos..pos + 4].try_into().unwrap();
        let masked = u32::from_le_bytes(raw_bytes);
        let actual = masked ^ prev_raw;
        let tag = Tag::parse::<()>(actual).ok()?;
        hasher.update(&raw_bytes);
        pos += 4;

        if tag.is_crc() {
            if pos + 4 > data.len() {
                return None;
            }
            let stored = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
            pos += 4;

            let unpadded_len = pos;
            let padded_len =
                unpadded_len.div_ceil(program_block_size as usize) * program_block_size as usize;
            let pad_len = padded_len - unpadded_len;
            if pos + pad_len > data.len() {
                return None;
            }
            let padding = &data[pos..pos + pad_len];
            hasher.update(padding);
            pos += pad_len;

            if hasher.finalize() != stored {
                return None;
            }
            return Some(ParsedCommit {
                entries,
                last_tag_raw: masked,
                len: pos,
            });
        }

        let plen = tag.length as usize;
        if pos + plen > data.len() {
            return None;
        }
        let payload = data[pos..pos + plen].to_vec();
        hasher.update(&payload);
        pos += plen;
        entries.push(Entry::new(tag, payload));
        prev_raw = masked;
    }
}
