use crate::ufs::codec;
use crate::ufs::constants::*;

/// The flat root directory: one slot per inumber mapping a file name to
/// its inode. Slot 0 is reserved for "/". Persisted as the contents of
/// inode 0 — `N * 4` bytes of name lengths followed by `N * 60` bytes of
/// fixed-width names, two bytes per code unit.
pub struct Directory {
    used: Vec<bool>,
    sizes: Vec<i32>,
    names: Vec<String>,
}

impl Directory {
    pub fn new(max_inumber: usize) -> Self {
        let mut directory = Directory {
            used: vec![false; max_inumber],
            sizes: vec![0; max_inumber],
            names: vec![String::new(); max_inumber],
        };
        if max_inumber > 0 {
            directory.used[0] = true;
            directory.sizes[0] = 1;
            directory.names[0] = String::from("/");
        }
        directory
    }

    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    /// Encoded size of a directory with `capacity` slots.
    pub fn encoded_len(capacity: usize) -> usize {
        capacity * 4 + capacity * 2 * MAX_FILENAME_LENGTH
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::encoded_len(self.capacity())];
        let mut offset = 0;
        for &size in &self.sizes {
            codec::int2bytes(size, &mut data, offset);
            offset += 4;
        }
        for name in &self.names {
            for (i, unit) in name.encode_utf16().take(MAX_FILENAME_LENGTH).enumerate() {
                codec::short2bytes(unit as i16, &mut data, offset + i * 2);
            }
            offset += 2 * MAX_FILENAME_LENGTH;
        }
        data
    }

    /// Rebuild the table from its on-disk encoding. The buffer must hold a
    /// directory of this capacity.
    pub fn from_bytes(&mut self, data: &[u8]) {
        let mut offset = 0;
        for size in self.sizes.iter_mut() {
            *size = codec::bytes2int(data, offset);
            offset += 4;
        }
        for (i, name) in self.names.iter_mut().enumerate() {
            let units = (self.sizes[i].max(0) as usize).min(MAX_FILENAME_LENGTH);
            let mut decoded = Vec::with_capacity(units);
            for u in 0..units {
                decoded.push(codec::bytes2short(data, offset + u * 2) as u16);
            }
            *name = String::from_utf16_lossy(&decoded);
            self.used[i] = self.sizes[i] > 0;
            offset += 2 * MAX_FILENAME_LENGTH;
        }
    }

    /// Claim the lowest free inumber (slot 0 is never handed out) for
    /// `filename`, truncated to the maximum name length. −1 when full.
    pub fn ialloc(&mut self, filename: &str) -> i16 {
        let units: Vec<u16> = filename.encode_utf16().take(MAX_FILENAME_LENGTH).collect();
        let filename = String::from_utf16_lossy(&units);
        for i in 1..self.capacity() {
            if !self.used[i] {
                self.used[i] = true;
                self.sizes[i] = units.len() as i32;
                self.names[i] = filename;
                return i as i16;
            }
        }
        -1
    }

    /// Release a slot. False when the inumber is out of range or unused.
    pub fn ifree(&mut self, inumber: i16) -> bool {
        let i = inumber as usize;
        if inumber >= 0 && i < self.capacity() && self.used[i] {
            self.used[i] = false;
            self.sizes[i] = 0;
            self.names[i].clear();
            true
        } else {
            false
        }
    }

    /// Resolve a name to its inumber by exact match, or −1.
    pub fn namei(&self, filename: &str) -> i16 {
        for i in 0..self.capacity() {
            if self.used[i] && self.names[i] == filename {
                return i as i16;
            }
        }
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_occupies_slot_zero() {
        let directory = Directory::new(8);
        assert_eq!(directory.namei("/"), 0);
        assert_eq!(directory.capacity(), 8);
    }

    #[test]
    fn ialloc_takes_lowest_free_slot() {
        let mut directory = Directory::new(8);
        assert_eq!(directory.ialloc("a.txt"), 1);
        assert_eq!(directory.ialloc("b.txt"), 2);
        assert!(directory.ifree(1));
        assert_eq!(directory.ialloc("c.txt"), 1);
    }

    #[test]
    fn ialloc_exhaustion_returns_minus_one() {
        let mut directory = Directory::new(3);
        assert_eq!(directory.ialloc("a"), 1);
        assert_eq!(directory.ialloc("b"), 2);
        assert_eq!(directory.ialloc("c"), -1);
    }

    #[test]
    fn names_truncate_to_thirty_code_units() {
        let mut directory = Directory::new(4);
        let long = "x".repeat(45);
        let inumber = directory.ialloc(&long);
        assert_eq!(inumber, 1);
        assert_eq!(directory.namei(&"x".repeat(30)), 1);
        assert_eq!(directory.namei(&long), -1);
    }

    #[test]
    fn ifree_rejects_bad_slots() {
        let mut directory = Directory::new(4);
        assert!(!directory.ifree(-1));
        assert!(!directory.ifree(4));
        assert!(!directory.ifree(2)); // never allocated
    }

    #[test]
    fn namei_misses_return_minus_one() {
        let mut directory = Directory::new(4);
        directory.ialloc("a.txt");
        assert_eq!(directory.namei("ghost"), -1);
        directory.ifree(1);
        assert_eq!(directory.namei("a.txt"), -1);
    }

    #[test]
    fn byte_encoding_round_trips() {
        let mut directory = Directory::new(16);
        directory.ialloc("a.txt");
        directory.ialloc("some-longer-name.bin");
        directory.ialloc("c");
        directory.ifree(2);

        let data = directory.to_bytes();
        assert_eq!(data.len(), Directory::encoded_len(16));

        let mut rebuilt = Directory::new(16);
        rebuilt.from_bytes(&data);
        assert_eq!(rebuilt.to_bytes(), data);
        assert_eq!(rebuilt.namei("a.txt"), 1);
        assert_eq!(rebuilt.namei("c"), 3);
        assert_eq!(rebuilt.namei("some-longer-name.bin"), -1);
    }

    #[test]
    fn encoding_is_sizes_then_fixed_width_names() {
        let mut directory = Directory::new(2);
        directory.ialloc("ab");
        let data = directory.to_bytes();

        // sizes: slot 0 holds "/" (1), slot 1 holds "ab" (2)
        assert_eq!(codec::bytes2int(&data, 0), 1);
        assert_eq!(codec::bytes2int(&data, 4), 2);
        // names: "/" then "ab", two big-endian bytes per code unit
        assert_eq!(codec::bytes2short(&data, 8), '/' as i16);
        let name1 = 8 + 2 * MAX_FILENAME_LENGTH;
        assert_eq!(codec::bytes2short(&data, name1), 'a' as i16);
        assert_eq!(codec::bytes2short(&data, name1 + 2), 'b' as i16);
        assert_eq!(codec::bytes2short(&data, name1 + 4), 0);
    }
}
