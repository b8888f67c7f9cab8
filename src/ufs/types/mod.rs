mod directory;
mod file_table;
mod inode;
mod superblock;

pub use directory::*;
pub use file_table::*;
pub use inode::*;
pub use superblock::*;
