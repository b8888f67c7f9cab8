use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("disk I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("block number {0} is out of range")]
    BlockOutOfRange(i32),

    /// An indirect-range block was assigned before the indirect block was
    /// registered. The write path registers one first and retries.
    #[error("the inode's indirect block is unassigned")]
    IndirectNull,
}

pub type Result<T> = std::result::Result<T, FsError>;
