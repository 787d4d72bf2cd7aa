use super::OmniFs;
use crate::structs::{timestamp_now, EntryKind, FileEntry};
use crate::Error;

/// Attributes of one object plus its block accounting
#[derive(Debug, Clone)]
pub struct Metadata {
    pub path: String,
    pub entry: FileEntry,
    pub blocks_used: u32,
    pub actual_size: u64,
}

/// Aggregate mount statistics
#[derive(Debug, Clone)]
pub struct Stats {
    pub total_size: u64,
    pub used_space: u64,
    pub free_space: u64,
    pub total_files: u32,
    pub total_directories: u32,
    pub total_users: u32,
    pub active_sessions: u32,
    pub fragmentation: f64,
}

impl OmniFs {
    pub fn get_metadata(&mut self, session_id: &str, path: &str) -> Result<Metadata, Error> {
        self.authenticate(session_id)?;
        let fs = self.mount()?;
        let id = fs.tree.find(path).ok_or(Error::NotFound)?;
        let node = fs.tree.node(id).ok_or(Error::NotFound)?;
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
        let blocks_used = if node.is_file && node.size > 0 {
            fs.layout.blocks_needed(node.size)
        } else {
            0
        };
        Ok(Metadata {
            path: path.to_owned(),
            entry,
            blocks_used,
            actual_size: blocks_used as u64 * fs.layout.block_size,
        })
    }

    /// Change an object's permission bits; owner or admin only
    pub fn set_permissions(
        &mut self,
        session_id: &str,
        path: &str,
        permissions: u32,
    ) -> Result<(), Error> {
        let user = self.authenticate(session_id)?;
        let fs = self.mount()?;
        let id = fs.tree.find(path).ok_or(Error::NotFound)?;
        let node = fs.tree.node(id).ok_or(Error::NotFound)?;
        let owner = node.owner.clone();
        let entry_index = node.entry_index;
        Self::authorize(&user, &owner)?;
        if let Some(node) = fs.tree.node_mut(id) {
            node.permissions = permissions;
        }
        let mut entry = fs.read_entry(entry_index)?;
        entry.permissions = permissions;
        entry.modified_time = timestamp_now();
        fs.write_entry(entry_index, &entry)?;
        fs.flush()?;
        Ok(())
    }

    pub fn get_stats(&mut self, session_id: &str) -> Result<Stats, Error> {
        self.authenticate(session_id)?;
        let active_sessions = self.sessions.active_count();
        let fs = self.mount()?;
        Ok(Stats {
            total_size: fs.header.total_size,
            used_space: fs.free_space.used_blocks() as u64 * fs.layout.block_size,
            free_space: fs.free_space.free_blocks() as u64 * fs.layout.block_size,
            total_files: fs.total_files,
            total_directories: fs.total_directories,
            total_users: fs.users.len() as u32,
            active_sessions,
            fragmentation: fs.free_space.fragmentation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ops::tests::mounted;
    use crate::structs::{EntryKind, UserRole};
    use crate::Error;

    #[test]
    fn metadata_for_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let session = ofs.login("admin", "admin123").unwrap();
        ofs.file_create(&session, "/data.bin", &vec![3u8; 1000]).unwrap();
        ofs.dir_create(&session, "/docs").unwrap();

        let meta = ofs.get_metadata(&session, "/data.bin").unwrap();
        assert_eq!(meta.entry.name().unwrap(), "data.bin");
        assert_eq!(meta.entry.kind(), EntryKind::File);
        assert_eq!(meta.entry.size, 1000);
        assert_eq!(meta.entry.permissions, 0o644);
        assert_eq!(meta.entry.owner().unwrap(), "admin");
        // 512-byte blocks leave 508 bytes for content
        assert_eq!(meta.blocks_used, 2);
        assert_eq!(meta.actual_size, 1024);

        let meta = ofs.get_metadata(&session, "/docs").unwrap();
        assert_eq!(meta.entry.kind(), EntryKind::Directory);
        assert_eq!(meta.blocks_used, 0);
        assert_eq!(meta.actual_size, 0);
        assert!(matches!(
            ofs.get_metadata(&session, "/ghost"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn chmod_gates_read_access() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let admin = ofs.login("admin", "admin123").unwrap();
        ofs.user_create(&admin, "alice", "pw", UserRole::Normal).unwrap();
        ofs.user_create(&admin, "bob", "pw", UserRole::Normal).unwrap();
        let alice = ofs.login("alice", "pw").unwrap();
        let bob = ofs.login("bob", "pw").unwrap();

        ofs.file_create(&alice, "/secret", b"classified").unwrap();
        // world-readable by default
        assert_eq!(ofs.file_read(&bob, "/secret").unwrap(), b"classified");
        ofs.set_permissions(&alice, "/secret", 0o000).unwrap();
        assert!(matches!(
            ofs.file_read(&bob, "/secret"),
            Err(Error::PermissionDenied)
        ));
        // owner and admin still read through the closed bits
        assert_eq!(ofs.file_read(&alice, "/secret").unwrap(), b"classified");
        assert_eq!(ofs.file_read(&admin, "/secret").unwrap(), b"classified");
        // only the owner or an admin may chmod
        assert!(matches!(
            ofs.set_permissions(&bob, "/secret", 0o777),
            Err(Error::PermissionDenied)
        ));
        let meta = ofs.get_metadata(&alice, "/secret").unwrap();
        assert_eq!(meta.entry.permissions, 0o000);
    }

    #[test]
    fn ownership_gates_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let admin = ofs.login("admin", "admin123").unwrap();
        ofs.user_create(&admin, "alice", "pw", UserRole::Normal).unwrap();
        ofs.user_create(&admin, "bob", "pw", UserRole::Normal).unwrap();
        let alice = ofs.login("alice", "pw").unwrap();
        let bob = ofs.login("bob", "pw").unwrap();
        ofs.file_create(&alice, "/a.txt", b"mine").unwrap();
        assert!(matches!(
            ofs.file_delete(&bob, "/a.txt"),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            ofs.file_edit(&bob, "/a.txt", b"!", 0),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            ofs.file_rename(&bob, "/a.txt", "/b.txt"),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            ofs.file_truncate(&bob, "/a.txt"),
            Err(Error::PermissionDenied)
        ));
        // the file is untouched, and the admin may delete it
        assert_eq!(ofs.file_read(&alice, "/a.txt").unwrap(), b"mine");
        ofs.file_delete(&admin, "/a.txt").unwrap();
    }

    #[test]
    fn stats_track_sessions_and_fragmentation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ofs, _) = mounted(&dir);
        let admin = ofs.login("admin", "admin123").unwrap();
        ofs.user_create(&admin, "alice", "pw", UserRole::Normal).unwrap();
        let stats = ofs.get_stats(&admin).unwrap();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.fragmentation, 0.0);
        let _alice = ofs.login("alice", "pw").unwrap();
        let stats = ofs.get_stats(&admin).unwrap();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_size, ofs.config().total_size);
        // block 0 always counts as used
        assert!(stats.used_space >= ofs.config().block_size);
        assert_eq!(stats.used_space % ofs.config().block_size, 0);
    }
}
