use log::debug;

use crate::structs::{timestamp_now, UserRecord, UserRole};
use crate::Error;

/// Snapshot of a live session handed out by `session_info`
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub username: String,
    pub role: UserRole,
    pub login_time: u64,
    pub last_activity: u64,
    pub operations_count: u32,
}

/// Identity attached to an authenticated operation
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug)]
struct Session {
    id: String,
    username: String,
    role: UserRole,
    login_time: u64,
    last_activity: u64,
    operations_count: u32,
}

/// Fixed-size registry of live sessions, sized by `max_connections`.
/// Sessions exist only for the lifetime of a mount.
#[derive(Debug)]
pub struct SessionTable {
    slots: Vec<Option<Session>>,
}

impl SessionTable {
    pub fn new(max_connections: u32) -> Self {
        Self {
            slots: (0..max_connections).map(|_| None).collect(),
        }
    }

    /// Issue a session id for a user, reusing the existing session when
    /// one is already live for that username
    pub fn create(&mut self, user: &UserRecord) -> Result<String, Error> {
        let username = user.username()?;
        for slot in self.slots.iter().flatten() {
            if slot.username == username {
                debug!("Reusing live session for {username}");
                return Ok(slot.id.clone());
            }
        }
        let now = timestamp_now();
        let id = format!("{username}_{now}");
        let free = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Error::NoSpace)?;
        *free = Some(Session {
            id: id.clone(),
            username,
            role: user.role(),
            login_time: now,
            last_activity: now,
            operations_count: 0,
        });
        Ok(id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|session| session.id == id)
    }

    /// Look up a session, stamping activity and the operation counter
    pub fn touch(&mut self, id: &str) -> Result<SessionUser, Error> {
        let session = self.find_mut(id).ok_or(Error::InvalidSession)?;
        session.last_activity = timestamp_now();
        session.operations_count += 1;
        Ok(SessionUser {
            username: session.username.clone(),
            role: session.role,
        })
    }

    pub fn info(&mut self, id: &str) -> Result<SessionInfo, Error> {
        let session = self.find_mut(id).ok_or(Error::InvalidSession)?;
        Ok(SessionInfo {
            session_id: session.id.clone(),
            username: session.username.clone(),
            role: session.role,
            login_time: session.login_time,
            last_activity: session.last_activity,
            operations_count: session.operations_count,
        })
    }

    /// Close a session; the id never resolves again
    pub fn remove(&mut self, id: &str) -> Result<(), Error> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().map(|s| s.id == id).unwrap_or(false))
            .ok_or(Error::InvalidSession)?;
        *slot = None;
        Ok(())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn active_count(&self) -> u32 {
        self.slots.iter().flatten().count() as u32
    }
}
