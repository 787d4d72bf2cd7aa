use log::debug;

use super::OmniFs;
use crate::structs::{EntryKind, FileEntry};
use crate::Error;

impl OmniFs {
    /// Create an empty directory; no blocks are allocated for it
    pub fn dir_create(&mut self, session_id: &str, path: &str) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        Self::check_path(path)?;
        let name = self.filename_of(path).to_owned();
        let fs = self.mount()?;
        if fs.tree.exists(path) {
            return Err(Error::FileExists);
        }
        let parent_index = Self::parent_entry_index(fs, path);
        if parent_index == 0 && path != "/" {
            return Err(Error::InvalidPath);
        }
        fs.tree.create(path, false, &user.username)?;
        let slot = fs.find_free_entry_slot()?;
        if slot == 0 {
            let _ = fs.tree.delete(path);
            return Err(Error::NoSpace);
        }
        let (created, modified) = match fs.tree.find(path).and_then(|id| fs.tree.node_mut(id)) {
            Some(node) => {
                node.entry_index = slot;
                (node.created_time, node.modified_time)
            }
            None => return Err(Error::NotFound),
        };

        let mut entry = FileEntry::new(
            &name,
            EntryKind::Directory,
            0,
            0o755,
            &user.username,
            slot,
            parent_index,
        );
        entry.created_time = created;
        entry.modified_time = modified;
        entry.mark_valid();
        fs.write_entry(slot, &entry)?;
        fs.flush()?;
        fs.total_directories += 1;
        debug!("Created directory {path} in slot {slot}");
        Ok(())
    }

    /// Snapshot of a directory's children as entry records, in
    /// insertion order
    pub fn dir_list(&mut self, session_id: &str, path: &str) -> Result<Vec<FileEntry>, Error> {
        self.authenticate(session_id)?;
        let fs = self.mount()?;
        if !fs.tree.is_directory(path) {
            return Err(Error::NotFound);
        }
        let entries = fs
            .tree
            .list(path)?
            .into_iter()
            .map(|node| {
                let kind = if node.is_file {
                    EntryKind::File
                } else {
                    EntryKind::Directory
                };
                let mut entry = FileEntry::new(
                    &node.name,
                    kind,
                    node.size,
                    node.permissions,
                    &node.owner,
                    node.entry_index,
                    0,
                );
                entry.created_time = node.created_time;
                entry.modified_time = node.modified_time;
                entry
            })
            .collect();
        Ok(entries)
    }

    /// Delete an empty directory owned by the caller (or any, as admin)
    pub fn dir_delete(&mut self, session_id: &str, path: &str) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        if path == "/" {
            return Err(Error::InvalidOperation);
        }
        let fs = self.mount()?;
        let id = fs.tree.find(path).ok_or(Error::NotFound)?;
        let node = fs.tree.node(id).ok_or(Error::NotFound)?;
        if node.is_file {
            return Err(Error::InvalidOperation);
        }
        if !node.children.is_empty() {
            return Err(Error::DirectoryNotEmpty);
        }
        let owner = node.owner.clone();
        let entry_index = node.entry_index;
        Self::authorize(&user, &owner)?;
        let mut entry = fs.read_entry(entry_index)?;
        entry.mark_invalid();
        fs.write_entry(entry_index, &entry)?;
        fs.flush()?;
        fs.tree.delete(path)?;
        fs.total_directories -= 1;
        debug!("Deleted directory {path}");
        Ok(())
    }

    pub fn dir_exists(&mut self, session_id: &str, path: &str) -> Result<bool, Error> {
        self.authenticate(session_id)?;
        let fs = self.mount()?;
        Ok(fs.tree.is_directory(path))
    }
}

#[cfg(test)]
mod tests {
    use crate::ops::tests::mounted;
    use crate::structs::EntryKind;
    use crate::Error;

    #[test]
    fn create_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let session = ofs.login("admin", "admin123").unwrap();
        ofs.dir_create(&session, "/projects").unwrap();
        ofs.dir_create(&session, "/projects/rust").unwrap();
        ofs.file_create(&session, "/projects/notes", b"n").unwrap();
        assert!(ofs.dir_exists(&session, "/projects").unwrap());
        let listing = ofs.dir_list(&session, "/projects").unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].name().unwrap(), "rust");
        assert_eq!(listing[0].kind(), EntryKind::Directory);
        assert_eq!(listing[1].name().unwrap(), "notes");
        assert_eq!(listing[1].kind(), EntryKind::File);
        assert!(matches!(
            ofs.dir_delete(&session, "/projects"),
            Err(Error::DirectoryNotEmpty)
        ));
        ofs.file_delete(&session, "/projects/notes").unwrap();
        ofs.dir_delete(&session, "/projects/rust").unwrap();
        ofs.dir_delete(&session, "/projects").unwrap();
        assert!(!ofs.dir_exists(&session, "/projects").unwrap());
    }

    #[test]
    fn root_is_undeletable_and_files_are_not_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let session = ofs.login("admin", "admin123").unwrap();
        assert!(matches!(
            ofs.dir_delete(&session, "/"),
            Err(Error::InvalidOperation)
        ));
        ofs.file_create(&session, "/f", b"").unwrap();
        assert!(matches!(
            ofs.dir_delete(&session, "/f"),
            Err(Error::InvalidOperation)
        ));
        assert!(matches!(ofs.dir_list(&session, "/f"), Err(Error::NotFound)));
        assert!(!ofs.dir_exists(&session, "/f").unwrap());
    }

    #[test]
    fn nested_directories_survive_remount() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, path) = mounted(&dir);
        let session = ofs.login("admin", "admin123").unwrap();
        ofs.dir_create(&session, "/a").unwrap();
        ofs.dir_create(&session, "/a/b").unwrap();
        ofs.dir_create(&session, "/a/b/c").unwrap();
        ofs.file_create(&session, "/a/b/c/deep.txt", b"deep").unwrap();
        ofs.shutdown().unwrap();
        ofs.init(&path).unwrap();
        let session = ofs.login("admin", "admin123").unwrap();
        assert_eq!(ofs.file_read(&session, "/a/b/c/deep.txt").unwrap(), b"deep");
        let stats = ofs.get_stats(&session).unwrap();
        assert_eq!(stats.total_directories, 4);
        assert_eq!(stats.total_files, 1);
    }
}
