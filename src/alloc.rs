//! Lookahead free-block allocator (§4.7). `Handle` holds the only instance
//! and reaches it through `&mut self`, so this module itself stays free of
//! any locking concern.

use crate::device::BlockDevice;
use crate::error::Error;
use crate::traverse::follow_links;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Before,
    After,
}

impl Bias {
    fn flip(self) -> Bias {
        match self {
            Bias::Before => Bias::After,
            Bias::After => Bias::Before,
        }
    }
}

pub struct Allocator {
    bias: Bias,
    free: VecDeque<u64>,
}

impl Allocator {
    pub fn new(initial_bias: Bias) -> Self {
        Allocator {
            bias: initial_bias,
            free: VecDeque::new(),
        }
    }

    /// Build an allocator the way `connect` does: seed the lookahead with
    /// an initial `Before`-biased scan, then flip so the *next* refill (the
    /// first one triggered by actual allocation) favors the other half.
    pub fn connect<D: BlockDevice>(
        device: &mut D,
        root: (u64, u64),
        block_count: u64,
        program_block_size: u32,
    ) -> Result<Self, Error<D::Error>> {
        let mut allocator = Allocator::new(Bias::Before);
        allocator.populate(device, root, block_count, program_block_size)?;
        allocator.bias = Bias::After;
        Ok(allocator)
    }

    /// Run a full live-set scan and refill the lookahead list with the half
    /// of the device the current bias favors.
    pub fn populate<D: BlockDevice>(
        &mut self,
        device: &mut D,
        root: (u64, u64),
        block_count: u64,
        program_block_size: u32,
    ) -> Result<(), Error<D::Error>> {
        let used = follow_links(device, root, program_block_size)?;
        let mid = block_count / 2;
        let mut candidates: Vec<u64> = (0..block_count)
            .filter(|b| !used.contains(b))
            .filter(|&b| match self.bias {
                Bias::After => b >= mid,
                Bias::Before => b < mid,
            })
            .collect();
        candidates.sort_unstable();
        log::debug!(
            "lookahead repopulated with {} free blocks (bias {:?})",
            candidates.len(),
            self.bias
        );
        self.free = candidates.into();
        Ok(())
    }

    pub fn get_block<D: BlockDevice>(
        &mut self,
        device: &mut D,
        root: (u64, u64),
        block_count: u64,
        program_block_size: u32,
    ) -> Result<u64, Error<D::Error>> {
        if let Some(b) = self.free.pop_front() {
            return Ok(b);
        }
        self.populate(device, root, block_count, program_block_size)?;
        self.bias = self.bias.flip();
        self.free.pop_front().ok_or(Error::NoSpace)
    }

    pub fn get_block_pair<D: BlockDevice>(
        &mut self,
        device: &mut D,
        root: (u64, u64),
        block_count: u64,
        program_block_size: u32,
    ) -> Result<(u64, u64), Error<D::Error>> {
        if self.free.len() < 2 {
            self.populate(device, root, block_count, program_block_size)?;
            self.bias = self.bias.flip();
        }
        let a = self.free.pop_front().ok_or(Error::NoSpace)?;
        let b = self.free.pop_front().ok_or(Error::NoSpace)?;
        Ok((a, b))
    }
}
