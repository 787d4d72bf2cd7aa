use log::{debug, info};

use super::{OmniFs, SessionInfo};
use crate::structs::{timestamp_now, UserRecord, UserRole};
use crate::Error;

/// Public view of one user-table slot
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub username: String,
    pub role: UserRole,
    pub created_time: u64,
    pub last_login: u64,
}

impl OmniFs {
    /// Authenticate a user and issue (or re-issue) a session id
    pub fn login(&mut self, username: &str, password: &str) -> Result<String, Error> {
        if self.fs.is_none() {
            return Err(Error::InvalidOperation);
        }
        let hashed = UserRecord::hash_password(password);
        let fs = self.mount()?;
        let user = fs.users.get_mut(username).ok_or(Error::NotFound)?;
        if user.password_hash()? != hashed {
            return Err(Error::PermissionDenied);
        }
        user.last_login = timestamp_now();
        let user = *user;
        let id = self.sessions.create(&user)?;
        info!("User {username} logged in");
        Ok(id)
    }

    pub fn logout(&mut self, session_id: &str) -> Result<(), Error> {
        self.sessions.remove(session_id)?;
        debug!("Session {session_id} closed");
        Ok(())
    }

    pub fn session_info(&mut self, session_id: &str) -> Result<SessionInfo, Error> {
        self.sessions.info(session_id)
    }

    /// Admin-only: create a user in the first free table slot
    pub fn user_create(
        &mut self,
        session_id: &str,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<(), Error> {
        let caller = self.authenticate(session_id)?;
        if caller.role != UserRole::Admin {
            return Err(Error::PermissionDenied);
        }
        let fs = self.mount()?;
        if fs.users.contains_key(username) {
            return Err(Error::FileExists);
        }
        let user = UserRecord::new(
            username,
            &UserRecord::hash_password(password),
            role,
            timestamp_now(),
        );
        for i in 0..fs.layout.max_users {
            let existing = fs.read_user(i)?;
            if !existing.occupied() {
                fs.write_user(i, &user)?;
                fs.flush()?;
                fs.users.insert(username.to_owned(), user);
                info!("User created: {username}");
                return Ok(());
            }
        }
        Err(Error::NoSpace)
    }

    /// Admin-only: tombstone a user's slot; the account disappears from
    /// the index but its slot is reusable
    pub fn user_delete(&mut self, session_id: &str, username: &str) -> Result<(), Error> {
        let caller = self.authenticate(session_id)?;
        if caller.role != UserRole::Admin {
            return Err(Error::PermissionDenied);
        }
        if caller.username == username {
            return Err(Error::InvalidOperation);
        }
        let fs = self.mount()?;
        if fs.users.remove(username).is_none() {
            return Err(Error::NotFound);
        }
        for i in 0..fs.layout.max_users {
            let mut existing = fs.read_user(i)?;
            if existing.occupied() && existing.username()? == username {
                existing.active = 0;
                fs.write_user(i, &existing)?;
                fs.flush()?;
                break;
            }
        }
        info!("User deleted: {username}");
        Ok(())
    }

    /// Admin-only: all active users in lexicographic order
    pub fn user_list(&mut self, session_id: &str) -> Result<Vec<UserSummary>, Error> {
        let caller = self.authenticate(session_id)?;
        if caller.role != UserRole::Admin {
            return Err(Error::PermissionDenied);
        }
        let fs = self.mount()?;
        let mut users = Vec::with_capacity(fs.users.len());
        for (name, user) in &fs.users {
            users.push(UserSummary {
                username: name.clone(),
                role: user.role(),
                created_time: user.created_time,
                last_login: user.last_login,
            });
        }
        Ok(users)
    }
}
