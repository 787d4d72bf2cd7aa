use bytemuck::Zeroable;

use super::*;
use crate::Error;

impl EntryKind {
    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            Self::Directory
        } else {
            Self::File
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
        }
    }
}

impl FileEntry {
    pub fn new(
        name: &str,
        kind: EntryKind,
        size: u64,
        permissions: u32,
        owner: &str,
        inode: u32,
        parent_index: u32,
    ) -> Self {
        let mut entry = Self::zeroed();
        pack_str(&mut entry.name, name);
        pack_str(&mut entry.owner, owner);
        entry.size = size;
        entry.permissions = permissions;
        entry.inode = inode;
        entry.parent_index = parent_index;
        entry.kind = kind.as_raw();
        entry
    }

    pub fn is_valid(&self) -> bool {
        self.valid == 1
    }

    pub fn mark_valid(&mut self) {
        self.valid = 1;
    }

    pub fn mark_invalid(&mut self) {
        self.valid = 0;
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from_raw(self.kind)
    }

    pub fn name(&self) -> Result<String, Error> {
        unpack_str(&self.name)
    }

    pub fn owner(&self) -> Result<String, Error> {
        unpack_str(&self.owner)
    }

    /// Replace the name, truncated to the filename limit
    pub fn set_name(&mut self, name: &str, max_len: usize) {
        let mut end = name.len().min(max_len).min(self.name.len() - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        pack_str(&mut self.name, &name[..end]);
    }
}

impl Persistent for FileEntry {
    fn position(layout: &Layout, index: u32) -> Result<u64, Error> {
        if index >= layout.max_files {
            return Err(Error::InvalidOperation);
        }
        Ok(layout.entry_table_offset + index as u64 * std::mem::size_of::<Self>() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{EntryKind, FileEntry, Persistent};
    use crate::config::Config;
    use crate::structs::Header;

    #[test]
    fn name_truncation() {
        let mut entry = FileEntry::new("x", EntryKind::File, 0, 0o644, "admin", 5, 1);
        let long = "n".repeat(300);
        entry.set_name(&long, 255);
        assert_eq!(entry.name().unwrap(), "n".repeat(255));
        entry.set_name("short", 255);
        assert_eq!(entry.name().unwrap(), "short");
    }

    #[test]
    fn load_and_flush() {
        let layout = Header::new(&Config::default()).layout();
        let mut dev = Cursor::new(vec![0u8; layout.content_offset as usize]);
        let mut entry = FileEntry::new("notes.txt", EntryKind::File, 120, 0o644, "alice", 9, 1);
        entry.mark_valid();
        entry.flush(&mut dev, &layout, 2).unwrap();
        let loaded = FileEntry::load(&mut dev, &layout, 2).unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.name().unwrap(), "notes.txt");
        assert_eq!(loaded.owner().unwrap(), "alice");
        assert_eq!(loaded.kind(), EntryKind::File);
        assert_eq!(loaded.inode, 9);
        assert_eq!(loaded.parent_index, 1);
        let untouched = FileEntry::load(&mut dev, &layout, 3).unwrap();
        assert!(!untouched.is_valid());
        assert!(FileEntry::load(&mut dev, &layout, 1000).is_err());
    }
}
