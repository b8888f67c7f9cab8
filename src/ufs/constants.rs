use super::disk::Disk;

pub const BLOCK_SIZE: usize = Disk::BLOCK_SIZE;
pub const INODE_SIZE: usize = 32; // the inode size in bytes
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const DIRECT_SIZE: usize = 11; // direct pointers per inode
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 2; // 2-byte entries in an indirect block

pub const MAX_FILENAME_LENGTH: usize = 30; // code units; 2 bytes each on disk
pub const MAX_FILE_SIZE: usize = (DIRECT_SIZE + POINTERS_PER_BLOCK) * BLOCK_SIZE;

pub const UNASSIGNED: i16 = -1;

pub const DEFAULT_INODE_COUNT: i32 = 64;

// inode flag values; 2 and 3 mark in-flight access
pub const FLAG_UNUSED: i16 = 0;
pub const FLAG_USED: i16 = 1;
pub const FLAG_READ: i16 = 2;
pub const FLAG_WRITE: i16 = 3;
