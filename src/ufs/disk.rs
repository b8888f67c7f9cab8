use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::error::{FsError, Result};

struct DiskInner {
    file: File,
    blocks: usize, // number of blocks in the disk image
    reads: usize,  // number of reads performed
    writes: usize, // number of writes performed
}

/// The simulated block device: a fixed-size array of 512-byte blocks backed
/// by a disk image file. Handles are cheap clones sharing one device; the
/// inner mutex serializes raw reads and writes one at a time.
#[derive(Clone)]
pub struct Disk {
    inner: Arc<Mutex<DiskInner>>,
}

impl Disk {
    pub const BLOCK_SIZE: usize = 512; // number of bytes per block

    /// Open a disk image, creating it when absent. The image is sized to
    /// exactly `nblocks` blocks; a fresh image reads back as all zeroes.
    pub fn open<P: AsRef<Path>>(path: P, nblocks: usize) -> Result<Disk> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len((nblocks as u64) * (Self::BLOCK_SIZE as u64))?;

        Ok(Disk {
            inner: Arc::new(Mutex::new(DiskInner {
                file,
                blocks: nblocks,
                reads: 0,
                writes: 0,
            })),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().blocks
    }

    pub fn reads(&self) -> usize {
        self.inner.lock().unwrap().reads
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn raw_read(&self, blocknum: usize, data: &mut [u8; Self::BLOCK_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if blocknum >= inner.blocks {
            return Err(FsError::BlockOutOfRange(blocknum as i32));
        }
        inner
            .file
            .seek(SeekFrom::Start(blocknum as u64 * Self::BLOCK_SIZE as u64))?;
        inner.file.read_exact(data)?;
        inner.reads += 1;
        Ok(())
    }

    pub fn raw_write(&self, blocknum: usize, data: &[u8; Self::BLOCK_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if blocknum >= inner.blocks {
            return Err(FsError::BlockOutOfRange(blocknum as i32));
        }
        inner
            .file
            .seek(SeekFrom::Start(blocknum as u64 * Self::BLOCK_SIZE as u64))?;
        inner.file.write_all(data)?;
        inner.writes += 1;
        Ok(())
    }

    /// Flush the image file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().unwrap().file.sync_all()?;
        Ok(())
    }
}
