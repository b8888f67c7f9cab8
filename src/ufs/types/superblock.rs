use log::{debug, trace};

use crate::ufs::codec;
use crate::ufs::constants::*;
use crate::ufs::disk::Disk;
use crate::ufs::error::Result;

use super::inode::Inode;

/// Block 0 metadata: the total block count, the number of inodes reserved
/// in the table starting at block 1, and the head of the free list. The
/// free list is threaded through the data blocks themselves — the first
/// four bytes of each free block name its successor, −1 terminates.
pub struct SuperBlock {
    disk: Disk,
    pub total_blocks: i32,
    pub inode_blocks: i32,
    pub free_list: i32,
}

// first data block for a table of `inodes` inodes (16 packed per block)
fn data_region_start(inodes: i32) -> i32 {
    1 + (inodes * INODE_SIZE as i32 + BLOCK_SIZE as i32 - 1) / BLOCK_SIZE as i32
}

impl SuperBlock {
    /// Read block 0 and adopt its fields when they describe this disk;
    /// otherwise the device is formatted with the default inode count.
    /// A valid persisted free-list head survives the remount as-is.
    pub fn new(disk: Disk, disk_blocks: usize) -> Result<SuperBlock> {
        let mut data = [0u8; BLOCK_SIZE];
        disk.raw_read(0, &mut data)?;

        let mut superblock = SuperBlock {
            disk,
            total_blocks: codec::bytes2int(&data, 0),
            inode_blocks: codec::bytes2int(&data, 4),
            free_list: codec::bytes2int(&data, 8),
        };

        let valid = superblock.total_blocks == disk_blocks as i32
            && superblock.inode_blocks > 0
            && superblock.free_list >= data_region_start(superblock.inode_blocks);
        if !valid {
            debug!(
                "superblock invalid (totalBlocks {}, inodeBlocks {}, freeList {}), formatting",
                superblock.total_blocks, superblock.inode_blocks, superblock.free_list
            );
            superblock.format(DEFAULT_INODE_COUNT)?;
        }
        Ok(superblock)
    }

    /// Persist the three fields to block 0.
    pub fn sync(&self) -> Result<()> {
        let mut data = [0u8; BLOCK_SIZE];
        codec::int2bytes(self.total_blocks, &mut data, 0);
        codec::int2bytes(self.inode_blocks, &mut data, 4);
        codec::int2bytes(self.free_list, &mut data, 8);
        self.disk.raw_write(0, &data)
    }

    /// Rebuild the on-disk structures: a fresh inode table of `inodes`
    /// slots, then the free list linked through every data block.
    pub fn format(&mut self, inodes: i32) -> Result<()> {
        self.total_blocks = self.disk.size() as i32;
        self.inode_blocks = inodes;
        self.free_list = data_region_start(inodes);
        debug!(
            "format: {} blocks, {} inodes, free list from {}",
            self.total_blocks, self.inode_blocks, self.free_list
        );

        let blank = Inode::new();
        for inumber in 0..self.inode_blocks {
            blank.store(&self.disk, inumber as i16)?;
        }

        for block in self.free_list..self.total_blocks {
            let mut data = [0u8; BLOCK_SIZE];
            let next = if block < self.total_blocks - 1 { block + 1 } else { -1 };
            codec::int2bytes(next, &mut data, 0);
            self.disk.raw_write(block as usize, &data)?;
        }

        self.sync()
    }

    /// Detach and return the head of the free list, or −1 when exhausted.
    pub fn get_free_block(&mut self) -> Result<i32> {
        if self.free_list < 0 || self.free_list >= self.total_blocks {
            return Ok(-1);
        }
        let head = self.free_list;
        let mut data = [0u8; BLOCK_SIZE];
        self.disk.raw_read(head as usize, &mut data)?;
        self.free_list = codec::bytes2int(&data, 0);
        trace!("get_free_block -> {}, head now {}", head, self.free_list);
        Ok(head)
    }

    /// Push `block` back as the new head of the free list.
    pub fn return_block(&mut self, block: i32) -> Result<bool> {
        if block < 0 || block >= self.total_blocks {
            return Ok(false);
        }
        let mut data = [0u8; BLOCK_SIZE];
        codec::int2bytes(self.free_list, &mut data, 0);
        self.disk.raw_write(block as usize, &data)?;
        self.free_list = block;
        trace!("return_block {}", block);
        Ok(true)
    }
}
