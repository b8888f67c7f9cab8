pub mod codec;
pub mod constants;
pub mod disk;
pub mod error;
pub mod types;

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use self::constants::*;
use self::disk::Disk;
use self::error::{FsError, Result};
use self::types::*;

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// The public face of the file system. Wires the superblock, the root
/// directory and the file table over one shared disk and exposes the
/// stream-oriented API: open/read/write/seek/close plus format, delete
/// and sync.
///
/// Invalid arguments surface as the sentinel values of the original API
/// (−1 byte counts, false, None); disk failures propagate as errors.
pub struct FileSystem {
    disk: Disk,
    superblock: Mutex<SuperBlock>,
    directory: Arc<Mutex<Directory>>,
    filetable: FileTable,
}

impl FileSystem {
    /// Mount the file system on `disk`. An unrecognizable superblock
    /// formats the device with the default inode count; a recognizable
    /// one brings the persisted directory back from inode 0.
    pub fn new(disk: Disk) -> Result<FileSystem> {
        let disk_blocks = disk.size();
        let superblock = SuperBlock::new(disk.clone(), disk_blocks)?;
        let directory = Arc::new(Mutex::new(Directory::new(superblock.inode_blocks as usize)));
        let filetable = FileTable::new(disk.clone(), directory.clone());

        let fs = FileSystem {
            disk,
            superblock: Mutex::new(superblock),
            directory,
            filetable,
        };
        fs.load_directory()?;
        Ok(fs)
    }

    // read the persisted directory out of inode 0
    fn load_directory(&self) -> Result<()> {
        let Some(root) = self.filetable.falloc("/", Mode::Read)? else {
            return Ok(());
        };
        let length = { root.inode.lock().unwrap().length } as usize;
        let expected = Directory::encoded_len(self.directory.lock().unwrap().capacity());
        if length == expected {
            let mut data = vec![0u8; length];
            let got = self.read(&root, &mut data)?;
            if got as usize == length {
                self.directory.lock().unwrap().from_bytes(&data);
            }
        } else if length != 0 {
            warn!(
                "persisted directory is {} bytes, expected {}; starting empty",
                length, expected
            );
        }
        self.filetable.ffree(&root)?;
        Ok(())
    }

    /// Rebuild the device for `files` inodes. Waits for every open file
    /// to close, then lays out the superblock, a fresh directory and the
    /// free list, and persists the empty directory through inode 0.
    pub fn format(&self, files: i32) -> Result<bool> {
        if files <= 0 {
            return Ok(false);
        }
        self.filetable.wait_until_empty();
        debug!("format: rebuilding for {} inodes", files);
        self.superblock.lock().unwrap().format(files)?;
        *self.directory.lock().unwrap() = Directory::new(files as usize);

        let Some(root) = self.open("/", "w")? else {
            return Ok(false);
        };
        let data = self.directory.lock().unwrap().to_bytes();
        let written = self.write(&root, &data)?;
        self.close(&root)?;
        Ok(written as usize == data.len())
    }

    /// Open `filename` under mode "r", "w", "w+" or "a". Write mode
    /// truncates: every data block goes back to the free list and the
    /// length resets to zero. Returns None for an unknown mode, an empty
    /// name, or a read of a file that does not exist.
    pub fn open(&self, filename: &str, mode: &str) -> Result<Option<FileHandle>> {
        let Some(mode) = Mode::parse(mode) else {
            return Ok(None);
        };
        if filename.is_empty() {
            return Ok(None);
        }
        let Some(entry) = self.filetable.falloc(filename, mode)? else {
            return Ok(None);
        };
        if mode == Mode::Write {
            self.dealloc_all_blocks(&entry)?;
        }
        Ok(Some(entry))
    }

    /// Persist the entry's inode and release it from the file table.
    pub fn close(&self, entry: &FileHandle) -> Result<bool> {
        let _entry_lock = entry.seek_ptr.lock().unwrap();
        {
            let inode = entry.inode.lock().unwrap();
            inode.store(&self.disk, entry.inumber)?;
        }
        self.filetable.ffree(entry)
    }

    /// Current length of the open file in bytes.
    pub fn fsize(&self, entry: &FileHandle) -> i32 {
        let _entry_lock = entry.seek_ptr.lock().unwrap();
        let length = entry.inode.lock().unwrap().length;
        length
    }

    /// Read from the seek pointer into `buffer`, stopping at the buffer's
    /// end, the file's end, or the first unassigned block (short read).
    /// −1 when the entry is not readable.
    pub fn read(&self, entry: &FileHandle, buffer: &mut [u8]) -> Result<i32> {
        if !entry.mode.readable() {
            return Ok(-1);
        }
        let mut seek_ptr = entry.seek_ptr.lock().unwrap();
        let inode = entry.inode.lock().unwrap();
        let length = inode.length as usize;

        let mut offset = *seek_ptr as usize;
        let mut total = 0usize;
        while total < buffer.len() && offset < length {
            let block = inode.block_for_offset(&self.disk, offset)?;
            if block == UNASSIGNED {
                break;
            }
            let mut data = [0u8; BLOCK_SIZE];
            self.disk.raw_read(block as usize, &mut data)?;

            let start = offset % BLOCK_SIZE;
            let count = (BLOCK_SIZE - start)
                .min(buffer.len() - total)
                .min(length - offset);
            buffer[total..total + count].copy_from_slice(&data[start..start + count]);
            total += count;
            offset += count;
        }
        *seek_ptr = offset as i32;
        Ok(total as i32)
    }

    /// Write `buffer` at the seek pointer (the file length in append
    /// mode), allocating blocks as the file grows and looping until the
    /// buffer drains or the free list runs dry. Partial blocks are
    /// read-modify-written. Returns the bytes written; −1 for a read-only
    /// entry or when nothing could be written at all. The inode is
    /// persisted before returning.
    pub fn write(&self, entry: &FileHandle, buffer: &[u8]) -> Result<i32> {
        if !entry.mode.writable() {
            return Ok(-1);
        }
        let mut seek_ptr = entry.seek_ptr.lock().unwrap();
        let mut inode = entry.inode.lock().unwrap();

        let mut offset = if entry.mode == Mode::Append {
            inode.length as usize
        } else {
            *seek_ptr as usize
        };
        let mut written = 0usize;
        while written < buffer.len() && offset < MAX_FILE_SIZE {
            let mut block = inode.block_for_offset(&self.disk, offset)?;
            if block == UNASSIGNED {
                match self.allocate_block_at(&mut inode, offset)? {
                    Some(fresh) => block = fresh,
                    None => break, // free list exhausted
                }
            }

            let mut data = [0u8; BLOCK_SIZE];
            self.disk.raw_read(block as usize, &mut data)?;
            let start = offset % BLOCK_SIZE;
            let count = (BLOCK_SIZE - start).min(buffer.len() - written);
            data[start..start + count].copy_from_slice(&buffer[written..written + count]);
            self.disk.raw_write(block as usize, &data)?;

            written += count;
            offset += count;
        }

        if offset > inode.length as usize {
            inode.length = offset as i32;
        }
        *seek_ptr = offset as i32;
        inode.store(&self.disk, entry.inumber)?;

        if written == 0 && !buffer.is_empty() {
            return Ok(-1);
        }
        Ok(written as i32)
    }

    // Grab a free block for `offset` and hook it into the inode. In the
    // indirect range the index block is registered first and its slots
    // initialized to UNASSIGNED — fresh off the free list they still
    // carry the next-free link.
    fn allocate_block_at(&self, inode: &mut Inode, offset: usize) -> Result<Option<i16>> {
        let mut superblock = self.superblock.lock().unwrap();

        if offset >= DIRECT_SIZE * BLOCK_SIZE && inode.indirect == UNASSIGNED {
            let index = superblock.get_free_block()?;
            if index < 0 {
                return Ok(None);
            }
            if !inode.register_indirect(index as i16) {
                superblock.return_block(index)?;
                return Err(FsError::IndirectNull);
            }
            let mut data = [0u8; BLOCK_SIZE];
            for slot in 0..POINTERS_PER_BLOCK {
                codec::short2bytes(UNASSIGNED, &mut data, slot * 2);
            }
            self.disk.raw_write(index as usize, &data)?;
        }

        let block = superblock.get_free_block()?;
        if block < 0 {
            return Ok(None);
        }
        match inode.assign_block_for_offset(&self.disk, offset, block as i16) {
            Ok(()) => Ok(Some(block as i16)),
            Err(FsError::IndirectNull) => {
                superblock.return_block(block)?;
                Err(FsError::IndirectNull)
            }
            Err(e) => Err(e),
        }
    }

    // Return every data block to the free list and reset the length;
    // write-mode truncation.
    fn dealloc_all_blocks(&self, entry: &FileHandle) -> Result<()> {
        let mut inode = entry.inode.lock().unwrap();
        let mut superblock = self.superblock.lock().unwrap();

        for slot in 0..DIRECT_SIZE {
            if inode.direct[slot] != UNASSIGNED {
                superblock.return_block(inode.direct[slot] as i32)?;
                inode.direct[slot] = UNASSIGNED;
            }
        }

        let indirect = inode.indirect;
        if let Some(index) = inode.unregister_indirect(&self.disk)? {
            for slot in 0..POINTERS_PER_BLOCK {
                let block = codec::bytes2short(&index, slot * 2);
                if block != UNASSIGNED {
                    superblock.return_block(block as i32)?;
                }
            }
            superblock.return_block(indirect as i32)?;
        }

        inode.length = 0;
        inode.store(&self.disk, entry.inumber)
    }

    /// Move the seek pointer: SEEK_SET from the start, SEEK_CUR from the
    /// current position, SEEK_END from the file's end. The result is
    /// clamped to [0, length] — seeking cannot grow a file. Returns the
    /// new position, or −1 for an unknown `whence`.
    pub fn seek(&self, entry: &FileHandle, offset: i32, whence: i32) -> i32 {
        let mut seek_ptr = entry.seek_ptr.lock().unwrap();
        let length = entry.inode.lock().unwrap().length;

        let new_ptr = match whence {
            SEEK_SET => offset,
            SEEK_CUR => *seek_ptr + offset,
            SEEK_END => length + offset,
            _ => return -1,
        };
        let new_ptr = new_ptr.clamp(0, length);
        *seek_ptr = new_ptr;
        new_ptr
    }

    /// Drop `filename` from the directory. The inode keeps its data
    /// blocks — only the name slot is reclaimed.
    pub fn delete(&self, filename: &str) -> bool {
        if filename.is_empty() {
            return false;
        }
        let mut directory = self.directory.lock().unwrap();
        let inumber = directory.namei(filename);
        if inumber < 0 {
            return false;
        }
        directory.ifree(inumber)
    }

    /// Persist the directory through inode 0, then the superblock, then
    /// flush the disk image.
    pub fn sync(&self) -> Result<()> {
        if let Some(root) = self.open("/", "w")? {
            let data = self.directory.lock().unwrap().to_bytes();
            self.write(&root, &data)?;
            self.close(&root)?;
        }
        self.superblock.lock().unwrap().sync()?;
        self.disk.sync()
    }
}

pub mod prelude {
    pub use super::disk::*;
    pub use super::error::*;
    pub use super::types::*;
    pub use super::{FileSystem, SEEK_CUR, SEEK_END, SEEK_SET};
}

// tests
#[cfg(test)]
mod tests {
    use super::*;

    fn test_fs(name: &str, nblocks: usize) -> FileSystem {
        let mut path = std::env::temp_dir();
        path.push(format!("ufs-fs-{}-{}.img", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        let disk = Disk::open(&path, nblocks).unwrap();
        FileSystem::new(disk).unwrap()
    }

    #[test]
    fn write_then_read_one_block() {
        let fs = test_fs("one-block", 200);
        fs.format(32).unwrap();

        let writer = fs.open("a.txt", "w").unwrap().unwrap();
        let payload = [0x41u8; 512];
        assert_eq!(fs.write(&writer, &payload).unwrap(), 512);
        assert!(fs.close(&writer).unwrap());

        let reader = fs.open("a.txt", "r").unwrap().unwrap();
        let mut data = [0u8; 512];
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 512);
        assert_eq!(data[..], payload[..]);
        assert!(fs.close(&reader).unwrap());
    }

    #[test]
    fn write_spills_into_the_indirect_block() {
        let fs = test_fs("indirect", 500);
        fs.format(32).unwrap();

        let writer = fs.open("big", "w").unwrap().unwrap();
        let payload = vec![7u8; DIRECT_SIZE * BLOCK_SIZE + 1];
        assert_eq!(fs.write(&writer, &payload).unwrap(), 5633);
        assert_eq!(fs.fsize(&writer), 5633);
        fs.close(&writer).unwrap();

        let inumber = fs.directory.lock().unwrap().namei("big");
        let inode = Inode::load(&fs.disk, inumber).unwrap();
        assert_eq!(inode.length, 5633);
        assert!(inode.direct.iter().all(|&d| d != UNASSIGNED));
        assert_ne!(inode.indirect, UNASSIGNED);
        let first_indirect = inode
            .block_for_offset(&fs.disk, DIRECT_SIZE * BLOCK_SIZE)
            .unwrap();
        assert_ne!(first_indirect, UNASSIGNED);

        let reader = fs.open("big", "r").unwrap().unwrap();
        let mut data = vec![0u8; payload.len()];
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 5633);
        assert_eq!(data, payload);
        fs.close(&reader).unwrap();
    }

    #[test]
    fn reopening_for_write_truncates() {
        let fs = test_fs("truncate", 200);
        fs.format(32).unwrap();

        let writer = fs.open("x", "w").unwrap().unwrap();
        fs.write(&writer, &[9u8; 100]).unwrap();
        let data_block = writer.inode.lock().unwrap().direct[0];
        assert_ne!(data_block, UNASSIGNED);
        fs.close(&writer).unwrap();

        let writer = fs.open("x", "w").unwrap().unwrap();
        assert_eq!(fs.fsize(&writer), 0);
        assert_eq!(writer.inode.lock().unwrap().direct[0], UNASSIGNED);
        // the freed block heads the free list again
        assert_eq!(
            fs.superblock.lock().unwrap().free_list,
            data_block as i32
        );
        fs.close(&writer).unwrap();
    }

    #[test]
    fn delete_of_missing_file_is_false() {
        let fs = test_fs("ghost", 200);
        fs.format(16).unwrap();

        assert!(!fs.delete("ghost"));
        assert!(!fs.delete(""));
        assert_eq!(fs.directory.lock().unwrap().namei("/"), 0);
    }

    #[test]
    fn delete_frees_the_name_but_not_the_blocks() {
        let fs = test_fs("delete", 200);
        fs.format(16).unwrap();

        let writer = fs.open("doomed", "w").unwrap().unwrap();
        fs.write(&writer, &[1u8; 700]).unwrap();
        fs.close(&writer).unwrap();

        let head_before = fs.superblock.lock().unwrap().free_list;
        assert!(fs.delete("doomed"));
        assert!(fs.open("doomed", "r").unwrap().is_none());
        // the data blocks did not come back to the free list
        assert_eq!(fs.superblock.lock().unwrap().free_list, head_before);
    }

    #[test]
    fn seek_set_then_relative() {
        let fs = test_fs("seek", 200);
        fs.format(16).unwrap();

        let writer = fs.open("f", "w").unwrap().unwrap();
        fs.write(&writer, &[5u8; 100]).unwrap();
        fs.close(&writer).unwrap();

        let reader = fs.open("f", "r").unwrap().unwrap();
        assert_eq!(fs.seek(&reader, 10, SEEK_SET), 10);
        assert_eq!(fs.seek(&reader, -5, SEEK_CUR), 5);
        assert_eq!(fs.seek(&reader, -20, SEEK_END), 80);
        // clamped to the file's bounds
        assert_eq!(fs.seek(&reader, -500, SEEK_SET), 0);
        assert_eq!(fs.seek(&reader, 500, SEEK_SET), 100);
        assert_eq!(fs.seek(&reader, 0, 9), -1);
        fs.close(&reader).unwrap();
    }

    #[test]
    fn seek_positions_reads() {
        let fs = test_fs("seek-read", 200);
        fs.format(16).unwrap();

        let writer = fs.open("f", "w").unwrap().unwrap();
        let payload: Vec<u8> = (0u8..100).collect();
        fs.write(&writer, &payload).unwrap();
        fs.close(&writer).unwrap();

        let reader = fs.open("f", "r").unwrap().unwrap();
        fs.seek(&reader, 40, SEEK_SET);
        let mut data = [0u8; 10];
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 10);
        assert_eq!(data[..], payload[40..50]);
        fs.close(&reader).unwrap();
    }

    #[test]
    fn overwrite_in_place_keeps_surrounding_bytes() {
        let fs = test_fs("overwrite", 200);
        fs.format(16).unwrap();

        let writer = fs.open("f", "w").unwrap().unwrap();
        fs.write(&writer, &[b'A'; 20]).unwrap();
        fs.close(&writer).unwrap();

        let editor = fs.open("f", "w+").unwrap().unwrap();
        fs.seek(&editor, 5, SEEK_SET);
        assert_eq!(fs.write(&editor, b"BB").unwrap(), 2);
        fs.seek(&editor, 0, SEEK_SET);
        let mut data = [0u8; 20];
        assert_eq!(fs.read(&editor, &mut data).unwrap(), 20);
        assert_eq!(&data[..5], b"AAAAA");
        assert_eq!(&data[5..7], b"BB");
        assert_eq!(&data[7..], &[b'A'; 13][..]);
        fs.close(&editor).unwrap();
    }

    #[test]
    fn append_extends_the_file() {
        let fs = test_fs("append", 200);
        fs.format(16).unwrap();

        let writer = fs.open("log", "w").unwrap().unwrap();
        fs.write(&writer, b"hello").unwrap();
        fs.close(&writer).unwrap();

        let appender = fs.open("log", "a").unwrap().unwrap();
        assert_eq!(fs.write(&appender, b" world").unwrap(), 6);
        fs.close(&appender).unwrap();

        let reader = fs.open("log", "r").unwrap().unwrap();
        assert_eq!(fs.fsize(&reader), 11);
        let mut data = [0u8; 11];
        fs.read(&reader, &mut data).unwrap();
        assert_eq!(&data[..], b"hello world");
        fs.close(&reader).unwrap();
    }

    #[test]
    fn mode_mismatches_return_minus_one() {
        let fs = test_fs("modes", 200);
        fs.format(16).unwrap();

        let writer = fs.open("f", "w").unwrap().unwrap();
        fs.write(&writer, &[1u8; 10]).unwrap();
        let mut data = [0u8; 4];
        assert_eq!(fs.read(&writer, &mut data).unwrap(), -1);
        fs.close(&writer).unwrap();

        let reader = fs.open("f", "r").unwrap().unwrap();
        assert_eq!(fs.write(&reader, &[2u8; 4]).unwrap(), -1);
        fs.close(&reader).unwrap();

        assert!(fs.open("f", "rw").unwrap().is_none());
        assert!(fs.open("", "r").unwrap().is_none());
    }

    #[test]
    fn read_stops_at_end_of_file() {
        let fs = test_fs("eof", 200);
        fs.format(16).unwrap();

        let writer = fs.open("f", "w").unwrap().unwrap();
        fs.write(&writer, &[3u8; 100]).unwrap();
        fs.close(&writer).unwrap();

        let reader = fs.open("f", "r").unwrap().unwrap();
        let mut data = [0u8; 512];
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 100);
        // a second read sits at EOF
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 0);
        fs.close(&reader).unwrap();
    }

    #[test]
    fn write_returns_partial_count_when_blocks_run_out() {
        let fs = test_fs("exhaust", 20);
        fs.format(16).unwrap();
        // 1 inode block, free list threads blocks 2..20: 18 free, and the
        // indirect index block consumes one of them
        let data_blocks = 17;

        let writer = fs.open("hog", "w").unwrap().unwrap();
        let payload = vec![0xAAu8; (data_blocks + 2) * BLOCK_SIZE];
        assert_eq!(
            fs.write(&writer, &payload).unwrap() as usize,
            data_blocks * BLOCK_SIZE
        );
        // the free list is dry now, nothing at all fits
        assert_eq!(fs.write(&writer, &[1u8; 10]).unwrap(), -1);
        fs.close(&writer).unwrap();
    }

    #[test]
    fn file_size_is_capped() {
        let fs = test_fs("cap", 500);
        fs.format(16).unwrap();

        let writer = fs.open("huge", "w").unwrap().unwrap();
        let payload = vec![1u8; MAX_FILE_SIZE + BLOCK_SIZE];
        let written = fs.write(&writer, &payload).unwrap();
        assert_eq!(written as usize, MAX_FILE_SIZE);
        assert_eq!(fs.fsize(&writer), MAX_FILE_SIZE as i32);
        fs.close(&writer).unwrap();
    }

    #[test]
    fn state_survives_a_remount() {
        let mut path = std::env::temp_dir();
        path.push(format!("ufs-fs-remount-{}.img", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let disk = Disk::open(&path, 300).unwrap();
            let fs = FileSystem::new(disk).unwrap();
            fs.format(32).unwrap();
            let writer = fs.open("keep.txt", "w").unwrap().unwrap();
            fs.write(&writer, b"persistent data").unwrap();
            fs.close(&writer).unwrap();
            fs.sync().unwrap();
        }

        let disk = Disk::open(&path, 300).unwrap();
        let fs = FileSystem::new(disk).unwrap();
        let reader = fs.open("keep.txt", "r").unwrap().unwrap();
        assert_eq!(fs.fsize(&reader), 15);
        let mut data = [0u8; 15];
        assert_eq!(fs.read(&reader, &mut data).unwrap(), 15);
        assert_eq!(&data[..], b"persistent data");
        fs.close(&reader).unwrap();
    }

    #[test]
    fn format_waits_until_quiescent() {
        use std::time::Duration;

        let fs = Arc::new(test_fs("quiesce", 200));
        fs.format(16).unwrap();
        let holder = fs.open("f", "w").unwrap().unwrap();

        let worker = {
            let fs = fs.clone();
            std::thread::spawn(move || fs.format(16).unwrap())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());

        fs.close(&holder).unwrap();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn reader_blocks_while_a_writer_holds_the_file() {
        use std::time::Duration;

        let fs = Arc::new(test_fs("contention", 200));
        fs.format(16).unwrap();

        let writer = fs.open("shared", "w").unwrap().unwrap();
        fs.write(&writer, b"payload").unwrap();

        let worker = {
            let fs = fs.clone();
            std::thread::spawn(move || {
                let reader = fs.open("shared", "r").unwrap().unwrap();
                let mut data = [0u8; 7];
                let got = fs.read(&reader, &mut data).unwrap();
                fs.close(&reader).unwrap();
                (got, data)
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());
        fs.close(&writer).unwrap();

        let (got, data) = worker.join().unwrap();
        assert_eq!(got, 7);
        assert_eq!(&data[..], b"payload");
    }
}
