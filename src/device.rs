//! The block-device contract (§6), plus an in-memory reference device used
//! by this crate's own tests and by consumers prototyping against it.
//!
//! Real hardware backends (SPI flash, a file-backed image, …) are a
//! consumer's concern; this crate only depends on the trait below, the way
//! the teacher crate's `BlockWriteDeviece` only depended on `io::Write +
//! io::Seek`.

/// A byte-addressable, block-aligned storage surface.
///
/// Implementations are free to aggregate multiple physical sectors into one
/// logical block as long as `block_size()` reflects the aggregate size; the
/// engine only ever issues whole-block reads and writes.
pub trait BlockDevice {
    type Error: std::fmt::Debug;

    /// Total number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Size in bytes of one logical block.
    fn block_size(&self) -> u32;

    /// Read exactly one block into `buf`. `buf.len()` is always
    /// `block_size()`.
    fn read(&mut self, block: u64, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write exactly one block from `buf`. `buf.len()` is always
    /// `block_size()`.
    fn write(&mut self, block: u64, buf: &[u8]) -> Result<(), Self::Error>;
}

/// An in-memory block device, useful for tests and for prototyping before a
/// real flash backend exists.
pub struct MemoryDevice {
    block_size: u32,
    blocks: Vec<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new(block_size: u32, block_count: u64) -> Self {
        MemoryDevice {
            block_size,
            blocks: vec![vec![0u8; block_size as usize]; block_count as usize],
        }
    }
}

impl BlockDevice for MemoryDevice {
    type Error = std::convert::Infallible;

    fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn read(&mut self, block: u64, buf: &mut [u8]) -> Result<(), Self::Error> {
        let data = &self.blocks[block as usize];
        buf.copy_from_slice(data);
        Ok(())
    }

    fn write(&mut self, block: u64, buf: &[u8]) -> Result<(), Self::Error> {
        self.blocks[block as usize].copy_from_slice(buf);
        Ok(())
    }
}
