use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use log::trace;

use crate::ufs::constants::*;
use crate::ufs::disk::Disk;
use crate::ufs::error::Result;

use super::directory::Directory;
use super::inode::Inode;

/// Access mode of an open file, parsed from the "r"/"w"/"w+"/"a" strings
/// of the public API.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    ReadWrite,
    Append,
}

impl Mode {
    pub fn parse(mode: &str) -> Option<Mode> {
        match mode {
            "r" => Some(Mode::Read),
            "w" => Some(Mode::Write),
            "w+" => Some(Mode::ReadWrite),
            "a" => Some(Mode::Append),
            _ => None,
        }
    }

    pub fn readable(self) -> bool {
        matches!(self, Mode::Read | Mode::ReadWrite)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Mode::Read)
    }
}

/// One open of a file: the inumber, the pinned inode shared with every
/// other open of the same file, the seek pointer, and the granted mode.
/// The seek-pointer mutex doubles as the per-entry lock — read, write,
/// seek and close all take it first, so one thread at a time drives an
/// entry.
pub struct FileTableEntry {
    pub inumber: i16,
    pub mode: Mode,
    pub inode: Arc<Mutex<Inode>>,
    pub seek_ptr: Mutex<i32>,
}

pub type FileHandle = Arc<FileTableEntry>;

struct TableState {
    entries: Vec<FileHandle>,
    // pinned inodes, one shared copy per inumber with live opens
    inodes: HashMap<i16, Arc<Mutex<Inode>>>,
}

/// Registry of open files. Grants entries under the mode policy — readers
/// share, a writer is exclusive — parking contenders on the condvar until
/// a release makes room. `format` uses the same condvar to wait for
/// quiescence.
pub struct FileTable {
    disk: Disk,
    directory: Arc<Mutex<Directory>>,
    state: Mutex<TableState>,
    released: Condvar,
}

impl FileTable {
    pub fn new(disk: Disk, directory: Arc<Mutex<Directory>>) -> FileTable {
        FileTable {
            disk,
            directory,
            state: Mutex::new(TableState {
                entries: Vec::new(),
                inodes: HashMap::new(),
            }),
            released: Condvar::new(),
        }
    }

    /// Allocate an entry for `filename` under `mode`. A missing file is
    /// created for the writable modes and is a miss for reads. Blocks
    /// while the mode policy denies access.
    pub fn falloc(&self, filename: &str, mode: Mode) -> Result<Option<FileHandle>> {
        let inumber = {
            let mut directory = self.directory.lock().unwrap();
            let mut inumber = directory.namei(filename);
            if inumber < 0 && mode.writable() {
                inumber = directory.ialloc(filename);
            }
            inumber
        };
        if inumber < 0 {
            return Ok(None);
        }

        let mut state = self.state.lock().unwrap();
        let inode = if let Some(pinned) = state.inodes.get(&inumber) {
            pinned.clone()
        } else {
            let pinned = Arc::new(Mutex::new(Inode::load(&self.disk, inumber)?));
            state.inodes.insert(inumber, pinned.clone());
            pinned
        };

        loop {
            let mut guard = inode.lock().unwrap();
            let admitted = if mode.writable() {
                guard.flag != FLAG_READ && guard.flag != FLAG_WRITE
            } else {
                guard.flag != FLAG_WRITE
            };
            if admitted {
                guard.flag = if mode.writable() { FLAG_WRITE } else { FLAG_READ };
                guard.count += 1;
                let seek_ptr = if mode == Mode::Append { guard.length } else { 0 };
                drop(guard);

                let entry = Arc::new(FileTableEntry {
                    inumber,
                    mode,
                    inode: inode.clone(),
                    seek_ptr: Mutex::new(seek_ptr),
                });
                state.entries.push(entry.clone());
                return Ok(Some(entry));
            }
            trace!(
                "falloc: inumber {} held (flag {}), waiting for release",
                inumber,
                guard.flag
            );
            drop(guard);
            state = self.released.wait(state).unwrap();
        }
    }

    /// Release an entry. The last open of a file persists its inode with
    /// the flag back at the idle state, then wakes any waiters.
    pub fn ffree(&self, entry: &FileHandle) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let position = state.entries.iter().position(|e| Arc::ptr_eq(e, entry));
        let Some(position) = position else {
            return Ok(false);
        };
        state.entries.remove(position);

        let mut inode = entry.inode.lock().unwrap();
        inode.count -= 1;
        if inode.count == 0 {
            inode.flag = FLAG_USED;
            inode.store(&self.disk, entry.inumber)?;
            drop(inode);
            state.inodes.remove(&entry.inumber);
        }

        self.released.notify_all();
        Ok(true)
    }

    /// True when no entries are live.
    pub fn fempty(&self) -> bool {
        self.state.lock().unwrap().entries.is_empty()
    }

    /// Block until the table drains; `format` calls this before touching
    /// the on-disk structures.
    pub fn wait_until_empty(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.entries.is_empty() {
            state = self.released.wait(state).unwrap();
        }
    }
}
