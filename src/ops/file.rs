use log::debug;

use super::OmniFs;
use crate::filesystem::Filesystem;
use crate::structs::{timestamp_now, Block, EntryKind, FileEntry};
use crate::Error;

/// Truncate overwrites content with this pattern, cycling from the
/// start of the file
const TRUNCATE_PATTERN: &[u8] = b"siruamr";

/// Copied-out attributes of a file node, so the tree borrow ends before
/// the device is touched
struct FileRef {
    entry_index: u32,
    start_block: u32,
    size: u64,
    permissions: u32,
    owner: String,
}

fn file_node(fs: &Filesystem, path: &str) -> Result<FileRef, Error> {
    let id = fs.tree.find(path).ok_or(Error::NotFound)?;
    let node = fs.tree.node(id).ok_or(Error::NotFound)?;
    if !node.is_file {
        return Err(Error::NotFound);
    }
    Ok(FileRef {
        entry_index: node.entry_index,
        start_block: node.start_block,
        size: node.size,
        permissions: node.permissions,
        owner: node.owner.clone(),
    })
}

impl OmniFs {
    /// Create a file with its content in one operation. Partial failures
    /// release whatever was already taken.
    pub fn file_create(&mut self, session_id: &str, path: &str, data: &[u8]) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        Self::check_path(path)?;
        let require_auth = self.config.require_auth;
        let name = self.filename_of(path).to_owned();
        let fs = self.mount()?;
        if fs.tree.exists(path) {
            return Err(Error::FileExists);
        }
        let parent_index = Self::parent_entry_index(fs, path);
        if parent_index == 0 && path != "/" {
            return Err(Error::InvalidPath);
        }

        let blocks_needed = fs.layout.blocks_needed(data.len() as u64);
        let blocks = fs.free_space.allocate_scattered(blocks_needed);
        if blocks.is_empty() {
            return Err(Error::NoSpace);
        }
        if let Err(e) = fs.tree.create(path, true, &user.username) {
            fs.free_space.free_segments(&blocks);
            return Err(e);
        }
        let slot = fs.find_free_entry_slot()?;
        if slot == 0 {
            let _ = fs.tree.delete(path);
            fs.free_space.free_segments(&blocks);
            return Err(Error::NoSpace);
        }

        let permissions = if require_auth { 0o644 } else { 0o666 };
        let now = timestamp_now();
        if let Some(node) = fs.tree.find(path).and_then(|id| fs.tree.node_mut(id)) {
            node.entry_index = slot;
            node.start_block = blocks[0];
            node.size = data.len() as u64;
            node.permissions = permissions;
            node.created_time = now;
            node.modified_time = now;
        }
        fs.write_chain(&blocks, data)?;

        let mut entry = FileEntry::new(
            &name,
            EntryKind::File,
            data.len() as u64,
            permissions,
            &user.username,
            blocks[0],
            parent_index,
        );
        entry.created_time = now;
        entry.modified_time = now;
        entry.mark_valid();
        fs.write_entry(slot, &entry)?;
        fs.flush()?;
        fs.total_files += 1;
        debug!("Created file {path} in {} blocks", blocks.len());
        Ok(())
    }

    /// Read a file's full content by walking its block chain
    pub fn file_read(&mut self, session_id: &str, path: &str) -> Result<Vec<u8>, Error> {
        let user = self.authenticate(session_id)?;
        let require_auth = self.config.require_auth;
        let fs = self.mount()?;
        let file = file_node(fs, path)?;
        if require_auth && file.permissions & 0o444 == 0 {
            Self::authorize(&user, &file.owner)?;
        }
        let size = file.size as usize;
        let mut data = Vec::with_capacity(size);
        let usable = fs.layout.usable_block_size() as usize;
        let mut current = file.start_block;
        while current != 0 && data.len() < size {
            let block = fs.read_block(current)?;
            let to_read = usable.min(size - data.len());
            data.extend_from_slice(&block.content()[..to_read]);
            current = block.next();
        }
        Ok(data)
    }

    /// Delete a file, returning its whole chain to the free list
    pub fn file_delete(&mut self, session_id: &str, path: &str) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        let fs = self.mount()?;
        let file = file_node(fs, path)?;
        Self::authorize(&user, &file.owner)?;
        let chain = fs.block_chain(file.start_block)?;
        if !chain.is_empty() {
            fs.free_space.free_segments(&chain);
        }
        let mut entry = fs.read_entry(file.entry_index)?;
        entry.mark_invalid();
        fs.write_entry(file.entry_index, &entry)?;
        fs.flush()?;
        fs.tree.delete(path)?;
        fs.total_files -= 1;
        debug!("Deleted file {path}, freed {} blocks", chain.len());
        Ok(())
    }

    pub fn file_exists(&mut self, session_id: &str, path: &str) -> Result<bool, Error> {
        self.authenticate(session_id)?;
        let fs = self.mount()?;
        Ok(fs.tree.is_file(path))
    }

    /// Rename or move a file; the entry keeps its slot and chain
    pub fn file_rename(
        &mut self,
        session_id: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        Self::check_path(old_path)?;
        Self::check_path(new_path)?;
        let new_name = self.filename_of(new_path).to_owned();
        let max_name = self.config.max_filename_length as usize;
        let fs = self.mount()?;
        let file = file_node(fs, old_path)?;
        Self::authorize(&user, &file.owner)?;
        if fs.tree.exists(new_path) {
            return Err(Error::FileExists);
        }
        let new_parent = Self::parent_entry_index(fs, new_path);
        if new_parent == 0 && new_path != "/" {
            return Err(Error::InvalidPath);
        }
        let mut entry = fs.read_entry(file.entry_index)?;
        entry.set_name(&new_name, max_name);
        entry.parent_index = new_parent;
        entry.modified_time = timestamp_now();
        fs.write_entry(file.entry_index, &entry)?;
        fs.flush()?;
        fs.tree.rename(old_path, new_path)?;
        Ok(())
    }

    /// Overwrite bytes starting at `index`, growing the chain when the
    /// write runs past the current end. The entry record is rewritten
    /// only when the file grew.
    pub fn file_edit(
        &mut self,
        session_id: &str,
        path: &str,
        data: &[u8],
        index: u64,
    ) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        let fs = self.mount()?;
        let file = file_node(fs, path)?;
        Self::authorize(&user, &file.owner)?;
        if index > file.size {
            return Err(Error::InvalidOperation);
        }
        let usable = fs.layout.usable_block_size();
        let new_size = index + data.len() as u64;
        let grew = new_size > file.size;
        if grew {
            let current_blocks = fs.layout.blocks_needed(file.size);
            let needed_blocks = fs.layout.blocks_needed(new_size);
            if needed_blocks > current_blocks {
                let chain = fs.block_chain(file.start_block)?;
                let mut fresh = Vec::with_capacity((needed_blocks - current_blocks) as usize);
                for _ in current_blocks..needed_blocks {
                    match fs.free_space.allocate(1).first() {
                        Some(&block) => fresh.push(block),
                        None => {
                            if !fresh.is_empty() {
                                fs.free_space.free_segments(&fresh);
                            }
                            return Err(Error::NoSpace);
                        }
                    }
                }
                if let Some(&last) = chain.last() {
                    let mut block = fs.read_block(last)?;
                    block.set_next(fresh[0]);
                    fs.write_block(&block)?;
                }
                for (i, &block_id) in fresh.iter().enumerate() {
                    let mut block = Block::new(block_id, fs.layout.block_size);
                    let next = if i + 1 < fresh.len() { fresh[i + 1] } else { 0 };
                    block.set_next(next);
                    fs.write_block(&block)?;
                }
                debug!("Extended {path} by {} blocks", fresh.len());
            }
            if let Some(node) = fs.tree.find(path).and_then(|id| fs.tree.node_mut(id)) {
                node.size = new_size;
            }
        }

        if !data.is_empty() {
            let mut current = file.start_block;
            for _ in 0..index / usable {
                if current == 0 {
                    break;
                }
                current = fs.read_block(current)?.next();
            }
            if current == 0 {
                return Err(Error::InvalidOperation);
            }
            let mut offset = (index % usable) as usize;
            let mut written = 0;
            while written < data.len() && current != 0 {
                let mut block = fs.read_block(current)?;
                let to_write = (usable as usize - offset).min(data.len() - written);
                block.content_mut()[offset..offset + to_write]
                    .copy_from_slice(&data[written..written + to_write]);
                fs.write_block(&block)?;
                written += to_write;
                offset = 0;
                current = block.next();
            }
        }

        if grew {
            let mut entry = fs.read_entry(file.entry_index)?;
            entry.size = new_size;
            entry.modified_time = timestamp_now();
            fs.write_entry(file.entry_index, &entry)?;
            fs.flush()?;
        }
        Ok(())
    }

    /// Overwrite every content byte of the chain with the cycling
    /// pattern. Size and blocks are left alone; only content changes.
    pub fn file_truncate(&mut self, session_id: &str, path: &str) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        let fs = self.mount()?;
        let file = file_node(fs, path)?;
        Self::authorize(&user, &file.owner)?;
        let usable = fs.layout.usable_block_size() as usize;
        let total = file.size as usize;
        let mut current = file.start_block;
        let mut written = 0;
        while current != 0 && written < total {
            let mut block = fs.read_block(current)?;
            let to_write = usable.min(total - written);
            for i in 0..to_write {
                block.content_mut()[i] = TRUNCATE_PATTERN[(written + i) % TRUNCATE_PATTERN.len()];
            }
            fs.write_block(&block)?;
            written += to_write;
            current = block.next();
        }
        fs.flush()?;
        Ok(())
    }
}
