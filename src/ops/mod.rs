mod dir;
mod file;
mod info;
mod session;
mod user;

use std::path::Path;

use log::{debug, info};

use crate::config::Config;
use crate::filesystem::Filesystem;
use crate::structs::{UserRole, ROOT_ENTRY};
use crate::Error;

pub use info::{Metadata, Stats};
pub use session::{SessionInfo, SessionTable, SessionUser};
pub use user::UserSummary;

/// The operation façade: owns the single live mount and the session
/// registry, and gates every operation on an issued session id
#[derive(Debug)]
pub struct OmniFs {
    config: Config,
    fs: Option<Filesystem>,
    sessions: SessionTable,
}

impl OmniFs {
    pub fn new(config: Config) -> Self {
        let sessions = SessionTable::new(config.max_connections);
        Self {
            config,
            fs: None,
            sessions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.fs.is_some()
    }

    fn check_extension(path: &Path) -> Result<(), Error> {
        match path.extension() {
            Some(ext) if ext == "omni" => Ok(()),
            _ => Err(Error::InvalidPath),
        }
    }

    /// Format an existing `.omni` file in place
    pub fn format(&self, path: &Path) -> Result<(), Error> {
        if !path.exists() {
            return Err(Error::NotFound);
        }
        Self::check_extension(path)?;
        let mut file = std::fs::File::options()
            .write(true)
            .truncate(true)
            .open(path)?;
        Filesystem::format(&mut file, &self.config)
    }

    /// Mount a container, creating and formatting it first when the path
    /// does not exist yet
    pub fn init(&mut self, path: &Path) -> Result<(), Error> {
        if self.fs.is_some() {
            return Err(Error::InvalidOperation);
        }
        Self::check_extension(path)?;
        if !path.exists() {
            info!("Container {} missing, creating", path.display());
            let mut file = std::fs::File::create(path)?;
            Filesystem::format(&mut file, &self.config)?;
        }
        let file = std::fs::File::options().read(true).write(true).open(path)?;
        let fs = Filesystem::load(Box::new(file))?;
        self.sessions = SessionTable::new(self.config.max_connections);
        self.fs = Some(fs);
        info!("Mounted {}", path.display());
        Ok(())
    }

    /// Persist the free-space snapshot, tear down sessions and release
    /// the container handle. Records are already on disk; nothing else
    /// is rewritten here.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        let mut fs = self.fs.take().ok_or(Error::InvalidOperation)?;
        fs.store_free_space()?;
        fs.flush()?;
        self.sessions.clear();
        info!("Container unmounted");
        Ok(())
    }

    pub(crate) fn mount(&mut self) -> Result<&mut Filesystem, Error> {
        self.fs.as_mut().ok_or(Error::InvalidOperation)
    }

    /// Resolve a session id, stamping its activity
    pub(crate) fn authenticate(&mut self, session_id: &str) -> Result<SessionUser, Error> {
        if self.fs.is_none() {
            return Err(Error::InvalidSession);
        }
        self.sessions.touch(session_id)
    }

    /// Ownership rule shared by the mutating operations: the owner or
    /// any admin may proceed
    pub(crate) fn authorize(user: &SessionUser, owner: &str) -> Result<(), Error> {
        if user.role == UserRole::Admin || user.username == owner {
            Ok(())
        } else {
            debug!("Denying {} access to object owned by {owner}", user.username);
            Err(Error::PermissionDenied)
        }
    }

    /// Paths handed to the façade are absolute
    pub(crate) fn check_path(path: &str) -> Result<(), Error> {
        if path.starts_with('/') {
            Ok(())
        } else {
            Err(Error::InvalidPath)
        }
    }

    /// Entry-table index of a path's parent directory: 0 for the root
    /// itself or a missing parent, 1 when the parent is the root
    pub(crate) fn parent_entry_index(fs: &Filesystem, path: &str) -> u32 {
        if path == "/" || path.is_empty() {
            return 0;
        }
        let Some(slash) = path.rfind('/') else {
            return 0;
        };
        if slash == 0 {
            return ROOT_ENTRY;
        }
        fs.tree
            .find(&path[..slash])
            .and_then(|id| fs.tree.node(id))
            .map(|node| node.entry_index)
            .unwrap_or(0)
    }

    /// Final path component, truncated to the filename limit
    pub(crate) fn filename_of<'a>(&self, path: &'a str) -> &'a str {
        let name = match path.rfind('/') {
            Some(slash) => &path[slash + 1..],
            None => path,
        };
        let limit = self.config.max_filename_length as usize;
        let mut end = name.len().min(limit);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        &name[..end]
    }
}
