use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom, Write};

use bytemuck::Zeroable;
use log::{debug, info, warn};

use crate::config::Config;
use crate::structs::*;
use crate::Error;

pub mod free_space;
pub mod tree;

use free_space::FreeSpaceManager;
use tree::Tree;

pub trait BlockDevice: Read + Write + Seek + Debug {}

impl BlockDevice for std::fs::File {}

/// An open container with its in-memory shadow: header geometry, the
/// directory tree, the free-space manager and the user index
#[derive(Debug)]
pub struct Filesystem {
    pub(crate) device: Box<dyn BlockDevice>,
    pub(crate) header: Header,
    pub(crate) layout: Layout,
    pub(crate) free_space: FreeSpaceManager,
    pub(crate) tree: Tree,
    pub(crate) users: BTreeMap<String, UserRecord>,
    pub(crate) total_files: u32,
    pub(crate) total_directories: u32,
}

impl Filesystem {
    /// Write a fresh container end to end: header, admin user, reserved
    /// and root entries, zeroed block area, free-space snapshot
    pub fn format<D: Write + Seek>(device: &mut D, config: &Config) -> Result<(), Error> {
        let header = Header::new(config);
        let layout = header.layout();
        device.seek(SeekFrom::Start(0))?;
        device.write_all(bytemuck::bytes_of(&header))?;

        let now = timestamp_now();
        let admin = UserRecord::new(
            &config.admin_username,
            &UserRecord::hash_password(&config.admin_password),
            UserRole::Admin,
            now,
        );
        device.write_all(bytemuck::bytes_of(&admin))?;
        let empty_user = UserRecord::zeroed();
        for _ in 1..layout.max_users {
            device.write_all(bytemuck::bytes_of(&empty_user))?;
        }

        let reserved = FileEntry::zeroed();
        device.write_all(bytemuck::bytes_of(&reserved))?;
        let mut root = FileEntry::new(
            "/",
            EntryKind::Directory,
            0,
            0o755,
            &config.admin_username,
            ROOT_ENTRY,
            0,
        );
        root.created_time = now;
        root.modified_time = now;
        root.mark_valid();
        device.write_all(bytemuck::bytes_of(&root))?;
        let empty_entry = FileEntry::zeroed();
        for _ in 2..layout.max_files {
            device.write_all(bytemuck::bytes_of(&empty_entry))?;
        }

        let zero_block = vec![0u8; layout.block_size as usize];
        for _ in 0..layout.total_blocks {
            device.write_all(&zero_block)?;
        }

        let free_space = FreeSpaceManager::new(layout.total_blocks);
        device.write_all(&free_space.serialize())?;
        device.flush()?;
        info!(
            "Formatted container: {} blocks of {} bytes",
            layout.total_blocks, layout.block_size
        );
        Ok(())
    }

    /// Mount an existing container: verify the header, index the users,
    /// rebuild the directory tree from the flat entry table, restore the
    /// free-space snapshot
    pub fn load(mut device: Box<dyn BlockDevice>) -> Result<Self, Error> {
        let header = Header::load(&mut device)?;
        let layout = header.layout();

        let mut users = BTreeMap::new();
        for i in 0..layout.max_users {
            let user = UserRecord::load(&mut device, &layout, i)?;
            if user.occupied() {
                let name = user.username()?;
                debug!("User: {name} ({:?})", user.role());
                users.insert(name, user);
            }
        }

        let mut fs = Self {
            device,
            header,
            layout,
            free_space: FreeSpaceManager::new(layout.total_blocks),
            tree: Tree::new(""),
            users,
            total_files: 0,
            total_directories: 1,
        };
        fs.rebuild_tree()?;
        fs.restore_free_space()?;
        Ok(fs)
    }

    /// Multi-pass reconstruction: the entry table is unordered, so a slot
    /// can only be attached once its parent has been. Entries whose
    /// parent chain never reaches the root are skipped.
    fn rebuild_tree(&mut self) -> Result<(), Error> {
        let max_files = self.layout.max_files as usize;
        let mut entries = Vec::with_capacity(max_files);
        for i in 0..self.layout.max_files {
            entries.push(FileEntry::load(&mut self.device, &self.layout, i)?);
        }
        let valid: Vec<bool> = entries
            .iter()
            .map(|e| e.is_valid() && e.name[0] != 0)
            .collect();
        let valid_count = valid.iter().skip(2).filter(|&&v| v).count();

        let root = &entries[ROOT_ENTRY as usize];
        let root_owner = if valid[ROOT_ENTRY as usize] {
            root.owner()?
        } else {
            String::new()
        };
        self.tree = Tree::new(&root_owner);
        if valid[ROOT_ENTRY as usize] {
            let root_id = self.tree.root();
            if let Some(node) = self.tree.node_mut(root_id) {
                node.permissions = root.permissions;
                node.created_time = root.created_time;
                node.modified_time = root.modified_time;
            }
        }

        let mut processed = vec![false; max_files];
        processed[RESERVED_ENTRY as usize] = true;
        processed[ROOT_ENTRY as usize] = true;
        let mut attached = 0;
        let mut progress = true;
        while progress && attached < valid_count {
            progress = false;
            for index in 2..max_files {
                if !valid[index] || processed[index] {
                    continue;
                }
                let parent = entries[index].parent_index as usize;
                if parent != ROOT_ENTRY as usize && (parent >= max_files || !processed[parent]) {
                    continue;
                }
                let Some(path) = Self::reconstruct_path(&entries, &valid, index) else {
                    continue;
                };
                let entry = &entries[index];
                let is_file = entry.kind() == EntryKind::File;
                let Ok(id) = self.tree.create(&path, is_file, &entry.owner()?) else {
                    continue;
                };
                if let Some(node) = self.tree.node_mut(id) {
                    node.entry_index = index as u32;
                    node.size = entry.size;
                    node.permissions = entry.permissions;
                    node.created_time = entry.created_time;
                    node.modified_time = entry.modified_time;
                    node.start_block = if is_file { entry.inode } else { 0 };
                }
                if is_file {
                    self.total_files += 1;
                } else {
                    self.total_directories += 1;
                }
                processed[index] = true;
                attached += 1;
                progress = true;
            }
        }
        if attached < valid_count {
            warn!(
                "Skipping {} entries unreachable from the root",
                valid_count - attached
            );
        }
        Ok(())
    }

    /// Rebuild an absolute path by walking parent links up to the root
    fn reconstruct_path(entries: &[FileEntry], valid: &[bool], index: usize) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = index;
        while current != ROOT_ENTRY as usize {
            if current == 0 || current >= entries.len() || !valid[current] {
                return None;
            }
            if parts.len() >= MAX_TREE_DEPTH {
                return None;
            }
            parts.push(entries[current].name().ok()?);
            current = entries[current].parent_index as usize;
        }
        let mut path = String::new();
        for part in parts.iter().rev() {
            path.push('/');
            path.push_str(part);
        }
        Some(path)
    }

    /// Restore the trailing snapshot, falling back to a fresh manager
    /// when it is missing or does not match the container geometry
    fn restore_free_space(&mut self) -> Result<(), Error> {
        let offset = self.layout.free_space_offset();
        let restored = (|| {
            self.device.seek(SeekFrom::Start(offset)).ok()?;
            let mut head = [0u8; 12];
            self.device.read_exact(&mut head).ok()?;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&head[8..12]);
            let segment_count = u32::from_be_bytes(raw) as usize;
            let mut data = head.to_vec();
            data.resize(12 + segment_count * 8, 0);
            self.device.read_exact(&mut data[12..]).ok()?;
            FreeSpaceManager::deserialize(&data)
        })();
        match restored {
            Some(manager) if manager.total_blocks() == self.layout.total_blocks => {
                self.free_space = manager;
            }
            _ => {
                warn!("Free-space snapshot missing or malformed, rebuilding");
                self.free_space = FreeSpaceManager::new(self.layout.total_blocks);
            }
        }
        Ok(())
    }

    /// Persist the free-space snapshot at its fixed offset
    pub fn store_free_space(&mut self) -> Result<(), Error> {
        let offset = self.layout.free_space_offset();
        self.device.seek(SeekFrom::Start(offset))?;
        let data = self.free_space.serialize();
        self.device.write_all(&data)?;
        self.device.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.device.flush()?;
        Ok(())
    }

    pub fn read_user(&mut self, index: u32) -> Result<UserRecord, Error> {
        UserRecord::load(&mut self.device, &self.layout, index)
    }

    pub fn write_user(&mut self, index: u32, user: &UserRecord) -> Result<(), Error> {
        user.flush(&mut self.device, &self.layout, index)
    }

    pub fn read_entry(&mut self, index: u32) -> Result<FileEntry, Error> {
        FileEntry::load(&mut self.device, &self.layout, index)
    }

    pub fn write_entry(&mut self, index: u32, entry: &FileEntry) -> Result<(), Error> {
        entry.flush(&mut self.device, &self.layout, index)
    }

    pub fn read_block(&mut self, index: u32) -> Result<Block, Error> {
        Block::load(&mut self.device, &self.layout, index)
    }

    pub fn write_block(&mut self, block: &Block) -> Result<(), Error> {
        block.flush(&mut self.device, &self.layout)
    }

    /// Smallest free entry slot at index 2 or above, 0 when the table is
    /// full. The bound comes from the container, not the runtime config.
    pub fn find_free_entry_slot(&mut self) -> Result<u32, Error> {
        for i in 2..self.layout.max_files {
            let entry = self.read_entry(i)?;
            if entry.name[0] == 0 || !entry.is_valid() {
                return Ok(i);
            }
        }
        Ok(0)
    }

    /// Collect a file's block chain by following next pointers
    pub fn block_chain(&mut self, start: u32) -> Result<Vec<u32>, Error> {
        let mut chain = Vec::new();
        let mut current = start;
        while current != 0 {
            if chain.len() > self.layout.total_blocks as usize {
                warn!("Block chain from {start} exceeds container size, truncating walk");
                break;
            }
            chain.push(current);
            current = self.read_block(current)?.next();
        }
        Ok(chain)
    }

    /// Thread `data` through `blocks`: each block gets its next pointer
    /// and content slice, the remainder zero-padded
    pub fn write_chain(&mut self, blocks: &[u32], data: &[u8]) -> Result<(), Error> {
        let usable = self.layout.usable_block_size() as usize;
        let mut written = 0;
        for (i, &index) in blocks.iter().enumerate() {
            let mut block = Block::new(index, self.layout.block_size);
            let next = if i + 1 < blocks.len() { blocks[i + 1] } else { 0 };
            block.set_next(next);
            let to_write = usable.min(data.len() - written);
            block.content_mut()[..to_write].copy_from_slice(&data[written..written + to_write]);
            written += to_write;
            self.write_block(&block)?;
        }
        Ok(())
    }
}
