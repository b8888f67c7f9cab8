use crate::ufs::codec;
use crate::ufs::constants::*;
use crate::ufs::disk::Disk;
use crate::ufs::error::{FsError, Result};

/// A 32-byte inode: file length, reference count, access flag, eleven
/// direct pointers and one single-indirect pointer. Sixteen inodes pack
/// into each block of the inode table, which starts at block 1.
///
/// Slot layout (big-endian, fixed for on-disk compatibility):
///   offset + 0  (4 B)  length
///   offset + 4  (2 B)  count
///   offset + 6  (2 B)  flag
///   offset + 8  (22 B) direct[0..11]
///   offset + 30 (2 B)  indirect
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Inode {
    pub length: i32,
    pub count: i16,
    pub flag: i16,
    pub direct: [i16; DIRECT_SIZE],
    pub indirect: i16,
}

impl Inode {
    /// The freshly-formatted state: empty, unreferenced, all pointers
    /// unassigned. `format` stamps every slot of the inode table with this.
    pub fn new() -> Self {
        Inode {
            length: 0,
            count: 0,
            flag: FLAG_USED,
            direct: [UNASSIGNED; DIRECT_SIZE],
            indirect: UNASSIGNED,
        }
    }

    // containing block and byte offset of an inumber's slot
    fn locate(inumber: i16) -> (usize, usize) {
        let block = 1 + inumber as usize / INODES_PER_BLOCK;
        let offset = (inumber as usize % INODES_PER_BLOCK) * INODE_SIZE;
        (block, offset)
    }

    pub fn load(disk: &Disk, inumber: i16) -> Result<Inode> {
        let (block, offset) = Self::locate(inumber);
        let mut data = [0u8; BLOCK_SIZE];
        disk.raw_read(block, &mut data)?;
        Ok(Self::decode(&data, offset))
    }

    /// Write this inode back to its slot. The containing block is read
    /// first so the other fifteen slots are not clobbered.
    pub fn store(&self, disk: &Disk, inumber: i16) -> Result<()> {
        let (block, offset) = Self::locate(inumber);
        let mut data = [0u8; BLOCK_SIZE];
        disk.raw_read(block, &mut data)?;
        self.encode(&mut data, offset);
        disk.raw_write(block, &data)
    }

    pub fn decode(data: &[u8], offset: usize) -> Inode {
        let mut direct = [UNASSIGNED; DIRECT_SIZE];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = codec::bytes2short(data, offset + 8 + i * 2);
        }
        Inode {
            length: codec::bytes2int(data, offset),
            count: codec::bytes2short(data, offset + 4),
            flag: codec::bytes2short(data, offset + 6),
            direct,
            indirect: codec::bytes2short(data, offset + 30),
        }
    }

    pub fn encode(&self, data: &mut [u8], offset: usize) {
        codec::int2bytes(self.length, data, offset);
        codec::short2bytes(self.count, data, offset + 4);
        codec::short2bytes(self.flag, data, offset + 6);
        for (i, &slot) in self.direct.iter().enumerate() {
            codec::short2bytes(slot, data, offset + 8 + i * 2);
        }
        codec::short2bytes(self.indirect, data, offset + 30);
    }

    /// Map a byte offset to the block holding it, or UNASSIGNED when the
    /// offset falls past the populated pointers.
    pub fn block_for_offset(&self, disk: &Disk, offset: usize) -> Result<i16> {
        debug_assert!(offset < MAX_FILE_SIZE);
        if offset < DIRECT_SIZE * BLOCK_SIZE {
            Ok(self.direct[offset / BLOCK_SIZE])
        } else if self.indirect == UNASSIGNED {
            Ok(UNASSIGNED)
        } else {
            let mut index = [0u8; BLOCK_SIZE];
            disk.raw_read(self.indirect as usize, &mut index)?;
            let slot = (offset - DIRECT_SIZE * BLOCK_SIZE) / BLOCK_SIZE;
            Ok(codec::bytes2short(&index, slot * 2))
        }
    }

    /// Point the slot covering `offset` at `block`. Indirect-range offsets
    /// require the indirect block to be registered already; the caller owns
    /// allocating one and retrying on `IndirectNull`.
    pub fn assign_block_for_offset(&mut self, disk: &Disk, offset: usize, block: i16) -> Result<()> {
        debug_assert!(offset < MAX_FILE_SIZE);
        if offset < DIRECT_SIZE * BLOCK_SIZE {
            self.direct[offset / BLOCK_SIZE] = block;
            Ok(())
        } else if self.indirect == UNASSIGNED {
            Err(FsError::IndirectNull)
        } else {
            let mut index = [0u8; BLOCK_SIZE];
            disk.raw_read(self.indirect as usize, &mut index)?;
            let slot = (offset - DIRECT_SIZE * BLOCK_SIZE) / BLOCK_SIZE;
            codec::short2bytes(block, &mut index, slot * 2);
            disk.raw_write(self.indirect as usize, &index)
        }
    }

    /// Register `block` as the indirect block. Succeeds only once every
    /// direct slot is populated and no indirect block is set yet. The
    /// block's contents are left untouched.
    pub fn register_indirect(&mut self, block: i16) -> bool {
        if self.indirect != UNASSIGNED {
            return false;
        }
        if self.direct.iter().any(|&d| d == UNASSIGNED) {
            return false;
        }
        self.indirect = block;
        true
    }

    /// Detach the indirect block, zeroing it on disk. Returns its former
    /// contents so the caller can walk the pointers it held.
    pub fn unregister_indirect(&mut self, disk: &Disk) -> Result<Option<[u8; BLOCK_SIZE]>> {
        if self.indirect == UNASSIGNED {
            return Ok(None);
        }
        let mut old = [0u8; BLOCK_SIZE];
        disk.raw_read(self.indirect as usize, &mut old)?;
        disk.raw_write(self.indirect as usize, &[0u8; BLOCK_SIZE])?;
        self.indirect = UNASSIGNED;
        Ok(Some(old))
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}
