//! Read path (§4.5): fetch one block, or fetch a metadata pair and return
//! the newer revision.

use crate::device::BlockDevice;
use crate::error::Error;
use crate::metadata::{self, Block};

/// Read and parse the metadata block at `block_number`.
pub fn block_of_block_number<D: BlockDevice>(
    device: &mut D,
    block_number: u64,
    program_block_size: u32,
) -> Result<Block, Error<D::Error>> {
    let mut buf = vec![0u8; device.block_size() as usize];
    device.read(block_number, &mut buf).map_err(Error::Io)?;
    log::trace!("read block {block_number}");
    metadata::of_cstruct(&buf, program_block_size).map_err(|e| match e {
        // `of_cstruct` has no block number of its own to report; substitute
        // the one actually being read here so `Corrupt`/`Disconnected`
        // (derived from it in `traverse::to_disconnected`) point somewhere
        // useful.
        Error::Corrupt(_) => Error::Corrupt(block_number),
        other => other,
    })
}

/// Read both legs of a metadata pair and return the one with the greater
/// `revision_count`. If exactly one leg fails to parse, return the other
/// (logging a warning); if both fail, surface `Corrupt`.
pub fn block_of_block_pair<D: BlockDevice>(
    device: &mut D,
    pair: (u64, u64),
    program_block_size: u32,
) -> Result<Block, Error<D::Error>> {
    let a = block_of_block_number(device, pair.0, program_block_size);
    let b = block_of_block_number(device, pair.1, program_block_size);

    match (a, b) {
        (Ok(a), Ok(b)) => {
            if newer(&a, &b) {
                Ok(a)
            } else {
                Ok(b)
            }
        }
        (Ok(a), Err(_)) => {
            log::warn!("leg {} of pair {:?} is corrupt, using the other leg", pair.1, pair);
            Ok(a)
        }
        (Err(_), Ok(b)) => {
            log::warn!("leg {} of pair {:?} is corrupt, using the other leg", pair.0, pair);
            Ok(b)
        }
        (Err(_), Err(_)) => {
            log::error!("both legs of pair {pair:?} are corrupt");
            Err(Error::Corrupt(pair.0))
        }
    }
}

/// Signed revision-count compare: wrapping means a newer revision can have a
/// numerically smaller count than a very old one, but within any realistic
/// lifetime the plain numeric compare used here holds.
fn newer(a: &Block, b: &Block) -> bool {
    (a.revision_count.wrapping_sub(b.revision_count) as i32) > 0
}
