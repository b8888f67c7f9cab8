//! A Unix-like block-structured file system on a simulated 512-byte-block
//! disk: superblock, packed inode table, flat root directory, shared file
//! table, and a singly-linked free list threaded through the data blocks.

pub mod ufs;

pub use ufs::disk::Disk;
pub use ufs::error::FsError;
pub use ufs::prelude;
pub use ufs::types::{FileHandle, Mode};
pub use ufs::{FileSystem, SEEK_CUR, SEEK_END, SEEK_SET};
