//! A log-structured, copy-on-write filesystem engine for block devices,
//! in the spirit of littlefs: directories and files addressed by
//! hierarchical keys, power-loss resilience from the commit/CRC discipline
//! described in [`commit`], and space reclaimed by the lookahead allocator
//! in [`alloc`].

mod alloc;
mod clock;
mod commit;
mod config;
mod device;
mod entry;
mod error;
mod file;
mod find;
mod metadata;
mod read;
mod tag;
mod traverse;
mod util;
mod write;

pub use alloc::Bias;
pub use clock::{Clock, TickingClock};
pub use config::FilesystemConfig;
pub use device::{BlockDevice, MemoryDevice};
pub use error::{Error, Result};
pub use find::FindResult;

use alloc::Allocator;
use entry::Entry;
use metadata::{Block, CstructStatus};
use tag::{Tag, CHUNK_NAME_SUPERBLOCK, CHUNK_STRUCT_DIR, CHUNK_STRUCT_INLINE, TYPE3_NAME, TYPE3_STRUCT};

const SUPERBLOCK_MAGIC: &[u8; 8] = b"littlefs";
const SUPERBLOCK_VERSION_MAJOR: u16 = 2;
const SUPERBLOCK_VERSION_MINOR: u16 = 0;

fn superblock_payload(config: &FilesystemConfig) -> Vec<u8> {
    let mut payload = Vec::with_capacity(24);
    // major/minor are emitted big-endian for historical reasons; every
    // other field in this payload (and everywhere else on disk) is little-endian.
    payload.extend_from_slice(&SUPERBLOCK_VERSION_MINOR.to_be_bytes());
    payload.extend_from_slice(&SUPERBLOCK_VERSION_MAJOR.to_be_bytes());
    payload.extend_from_slice(&config.block_size.to_le_bytes());
    payload.extend_from_slice(&(config.block_count as u32).to_le_bytes());
    payload.extend_from_slice(&config.name_length_max.to_le_bytes());
    payload.extend_from_slice(&FilesystemConfig::DEFAULT_FILE_SIZE_MAX.to_le_bytes());
    payload.extend_from_slice(&FilesystemConfig::DEFAULT_FILE_ATTRIBUTE_SIZE_MAX.to_le_bytes());
    payload
}

fn superblock_entries(config: &FilesystemConfig) -> Vec<Entry> {
    vec![
        Entry::new(Tag::new(TYPE3_NAME, CHUNK_NAME_SUPERBLOCK, 0, 8), SUPERBLOCK_MAGIC.to_vec()),
        Entry::new(
            Tag::new(TYPE3_STRUCT, CHUNK_STRUCT_INLINE, 0, 24),
            superblock_payload(config),
        ),
    ]
}

/// Write a fresh superblock to `(0, 1)`: revision 1 on the first leg,
/// revision 2 on the second, so the second leg is authoritative on mount.
pub fn format<D: BlockDevice>(device: &mut D, config: &FilesystemConfig) -> Result<(), D::Error> {
    config.validate()?;
    let block_size = device.block_size();
    let entries = superblock_entries(config);

    let block1 = Block::of_entries(1, entries.clone());
    let block2 = Block::of_entries(2, entries);
    let (bytes1, status1) = metadata::into_cstruct(&block1, block_size, config.program_block_size);
    let (bytes2, status2) = metadata::into_cstruct(&block2, block_size, config.program_block_size);
    if status1 != CstructStatus::Ok || status2 != CstructStatus::Ok {
        return Err(Error::NoSpace);
    }

    let mut padded1 = bytes1;
    padded1.resize(block_size as usize, 0);
    let mut padded2 = bytes2;
    padded2.resize(block_size as usize, 0);
    device.write(0, &padded1).map_err(Error::Io)?;
    device.write(1, &padded2).map_err(Error::Io)?;
    log::info!(
        "formatted filesystem: block_size={} block_count={}",
        config.block_size,
        config.block_count
    );
    Ok(())
}

/// A mounted filesystem: owns the device and clock, and tracks the free-block
/// lookahead. All operations take `&mut self`, so Rust's borrow checker
/// alone serializes access to one handle (see SPEC_FULL.md §5).
pub struct Handle<D: BlockDevice, C: Clock> {
    device: D,
    clock: C,
    config: FilesystemConfig,
    root: (u64, u64),
    allocator: Allocator,
}

fn split_path(path: &str) -> Vec<Vec<u8>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.as_bytes().to_vec())
        .collect()
}

impl<D: BlockDevice, C: Clock> Handle<D, C> {
    /// Mount a formatted device: validate `config`, sanity-check block 0,
    /// and run the initial free-block scan.
    pub fn connect(mut device: D, clock: C, config: FilesystemConfig) -> Result<Self, D::Error> {
        config.validate()?;
        read::block_of_block_number(&mut device, 0, config.program_block_size)?;

        let root = (0u64, 1u64);
        let allocator = Allocator::connect(&mut device, root, config.block_count, config.program_block_size)?;
        log::info!("mounted filesystem: block_count={}", config.block_count);

        Ok(Handle { device, clock, config, root, allocator })
    }

    /// Read the value stored at `path` (e.g. `"/d/f"`).
    pub fn get(&mut self, path: &str) -> Result<Vec<u8>, D::Error> {
        let segments = split_path(path);
        let Some((basename, parents)) = segments.split_last() else {
            return Err(Error::ValueExpected(path.to_string()));
        };

        let pair = if parents.is_empty() {
            self.root
        } else {
            match find::find_first_blockpair_of_directory(
                &mut self.device,
                self.root,
                parents,
                self.config.program_block_size,
            )? {
                FindResult::BasenameOn(pair) => pair,
                FindResult::NoId(seg) => {
                    return Err(Error::NotFound(String::from_utf8_lossy(&seg).into_owned()))
                }
                FindResult::NoStructs => return Err(Error::DictionaryExpected(path.to_string())),
                FindResult::NoEntry => return Err(Error::NotFound(path.to_string())),
            }
        };

        file::get_value(&mut self.device, pair, basename, self.config.program_block_size)
    }

    /// Create or overwrite the value stored at `parent_pair`'s directory
    /// under `name`.
    pub fn set_in_directory(
        &mut self,
        parent_pair: (u64, u64),
        name: &[u8],
        data: &[u8],
    ) -> Result<(), D::Error> {
        file::set_in_directory(
            &mut self.device,
            parent_pair,
            name,
            data,
            &self.clock,
            &mut self.allocator,
            self.root,
            self.config.block_count,
            self.config.program_block_size,
        )
    }

    /// Remove `name` from the directory at `parent_pair`. Idempotent.
    pub fn delete_in_directory(&mut self, parent_pair: (u64, u64), name: &[u8]) -> Result<(), D::Error> {
        file::delete_in_directory(
            &mut self.device,
            parent_pair,
            name,
            &mut self.allocator,
            self.root,
            self.config.block_count,
            self.config.program_block_size,
        )
    }

    /// Resolve (or create) each path segment as a directory, returning the
    /// blockpair of the final directory.
    pub fn mkdir(&mut self, path: &str) -> Result<(u64, u64), D::Error> {
        let segments = split_path(path);
        let mut current = self.root;
        for seg in &segments {
            current = self.find_or_mkdir(current, seg)?;
        }
        Ok(current)
    }

    fn find_or_mkdir(&mut self, parent: (u64, u64), seg: &[u8]) -> Result<(u64, u64), D::Error> {
        let matches = find::entries_of_name(&mut self.device, parent, seg, self.config.program_block_size)?;
        if let Some((_, compacted_for_id)) = matches.last() {
            if let Some(dir_entry) = compacted_for_id.iter().find(|e| e.tag.is_struct(CHUNK_STRUCT_DIR)) {
                let a = u64::from_le_bytes(dir_entry.payload[0..8].try_into().unwrap());
                let b = u64::from_le_bytes(dir_entry.payload[8..16].try_into().unwrap());
                return Ok((a, b));
            }
            return Err(Error::DictionaryExpected(String::from_utf8_lossy(seg).into_owned()));
        }

        let new_pair = self.allocator.get_block_pair(
            &mut self.device,
            self.root,
            self.config.block_count,
            self.config.program_block_size,
        )?;
        let empty = Block::of_entries(1, vec![]);
        let block_size = self.device.block_size();
        write::block_to_block_pair(
            &mut self.device,
            &empty,
            new_pair,
            block_size,
            self.config.program_block_size,
            &mut self.allocator,
            self.root,
            self.config.block_count,
        )?;
        log::debug!("mkdir allocated new directory pair {new_pair:?}");

        let target = traverse::last_block(&mut self.device, parent, self.config.program_block_size)?;
        let mut block = read::block_of_block_pair(&mut self.device, target, self.config.program_block_size)?;
        let id = block.ids().iter().max().map(|m| m + 1).unwrap_or(1);
        block.add_commit(vec![file::name_entry(id, seg), metadata::dir_struct_entry(id, new_pair)]);
        write::block_to_block_pair(
            &mut self.device,
            &block,
            target,
            block_size,
            self.config.program_block_size,
            &mut self.allocator,
            self.root,
            self.config.block_count,
        )?;

        Ok(new_pair)
    }

    /// Locate the blockpair that would hold `path_segments`'s basename,
    /// without resolving the basename itself.
    pub fn find_first_blockpair_of_directory(&mut self, path_segments: &[Vec<u8>]) -> Result<FindResult, D::Error> {
        find::find_first_blockpair_of_directory(
            &mut self.device,
            self.root,
            path_segments,
            self.config.program_block_size,
        )
    }

    /// The root directory's blockpair, conventionally `(0, 1)`.
    pub fn root(&self) -> (u64, u64) {
        self.root
    }
}
