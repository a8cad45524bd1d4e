//! Tag codec (§4.1): the 32-bit, XOR-chained descriptor that precedes every
//! entry's payload in a commit.
//!
//! Layout, high bit first:
//! `[1-bit valid][3-bit type3][8-bit chunk][10-bit id][10-bit length]`.
//!
//! `type3 == 1` is reserved and always rejected by `parse`; every other
//! value is a legal abstract type even if this crate never emits it.

use crate::error::Error;

pub const TYPE3_NAME: u8 = 0x0;
pub const TYPE3_INVALID: u8 = 0x1;
pub const TYPE3_STRUCT: u8 = 0x2;
pub const TYPE3_USERATTR: u8 = 0x3;
pub const TYPE3_SPLICE: u8 = 0x4;
pub const TYPE3_CRC: u8 = 0x5;
pub const TYPE3_TAIL: u8 = 0x6;
pub const TYPE3_GSTATE: u8 = 0x7;

pub const CHUNK_STRUCT_DIR: u8 = 0x00;
pub const CHUNK_STRUCT_INLINE: u8 = 0x01;
pub const CHUNK_STRUCT_CTZ: u8 = 0x02;
pub const CHUNK_SPLICE_CREATE: u8 = 0x00;
pub const CHUNK_SPLICE_DELETE: u8 = 0xff;
pub const CHUNK_TAIL_HARD: u8 = 0x01;
pub const CHUNK_NAME_CTIME: u8 = 0x00;
pub const CHUNK_NAME_SUPERBLOCK: u8 = 0xff;

pub const MAX_ID: u16 = 0x3ff;
pub const MAX_LENGTH: u16 = 0x3ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub valid: bool,
    pub type3: u8,
    pub chunk: u8,
    pub id: u16,
    pub length: u16,
}

impl Tag {
    pub fn new(type3: u8, chunk: u8, id: u16, length: u16) -> Self {
        Tag {
            valid: true,
            type3,
            chunk,
            id,
            length,
        }
    }

    /// Unpack a 32-bit on-disk value (already XOR-unmasked) into a `Tag`.
    pub fn parse<E>(raw: u32) -> Result<Tag, Error<E>> {
        let valid = (raw >> 31) & 1 == 1;
        let type3 = ((raw >> 28) & 0x7) as u8;
        let chunk = ((raw >> 20) & 0xff) as u8;
        let id = ((raw >> 10) & 0x3ff) as u16;
        let length = (raw & 0x3ff) as u16;
        if type3 == TYPE3_INVALID {
            return Err(Error::Corrupt(0));
        }
        Ok(Tag {
            valid,
            type3,
            chunk,
            id,
            length,
        })
    }

    /// Pack into a 32-bit value and XOR it against `xor_mask` (the previous
    /// tag's raw on-disk bytes, or all-ones for the first tag in a block).
    pub fn emit(&self, xor_mask: u32) -> u32 {
        let raw = ((self.valid as u32) << 31)
            | ((self.type3 as u32 & 0x7) << 28)
            | ((self.chunk as u32) << 20)
            | ((self.id as u32 & 0x3ff) << 10)
            | (self.length as u32 & 0x3ff);
        raw ^ xor_mask
    }

    pub fn is_name(&self) -> bool {
        self.type3 == TYPE3_NAME
    }

    pub fn is_struct(&self, chunk: u8) -> bool {
        self.type3 == TYPE3_STRUCT && self.chunk == chunk
    }

    pub fn is_any_struct(&self) -> bool {
        self.type3 == TYPE3_STRUCT
    }

    pub fn is_crc(&self) -> bool {
        self.type3 == TYPE3_CRC
    }

    pub fn is_hardtail(&self) -> bool {
        self.type3 == TYPE3_TAIL && self.chunk == CHUNK_TAIL_HARD
    }

    pub fn is_delete(&self) -> bool {
        self.type3 == TYPE3_SPLICE && self.chunk == CHUNK_SPLICE_DELETE
    }

    pub fn is_ctime(&self) -> bool {
        self.type3 == TYPE3_USERATTR && self.chunk == CHUNK_NAME_CTIME
    }
}
