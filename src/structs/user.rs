use bytemuck::Zeroable;

use super::*;
use crate::Error;

impl UserRole {
    pub fn from_raw(raw: u8) -> Self {
        if raw == 1 {
            Self::Admin
        } else {
            Self::Normal
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Admin => 1,
        }
    }
}

impl UserRecord {
    pub fn new(username: &str, password_hash: &str, role: UserRole, created: u64) -> Self {
        let mut user = Self::zeroed();
        pack_str(&mut user.username, username);
        pack_str(&mut user.password_hash, password_hash);
        user.created_time = created;
        user.role = role.as_raw();
        user.active = 1;
        user
    }

    /// Legacy credential digest, kept bit-for-bit for container
    /// compatibility. Not a security primitive.
    pub fn hash_password(password: &str) -> String {
        let shifted: Vec<u8> = password.bytes().map(|b| b.wrapping_add(1)).collect();
        let mut hash = String::from_utf8_lossy(&shifted).into_owned();
        hash.push_str("_hash");
        hash
    }

    pub fn occupied(&self) -> bool {
        self.active == 1 && self.username[0] != 0
    }

    pub fn username(&self) -> Result<String, Error> {
        unpack_str(&self.username)
    }

    pub fn password_hash(&self) -> Result<String, Error> {
        unpack_str(&self.password_hash)
    }

    pub fn role(&self) -> UserRole {
        UserRole::from_raw(self.role)
    }
}

impl Persistent for UserRecord {
    fn position(layout: &Layout, index: u32) -> Result<u64, Error> {
        if index >= layout.max_users {
            return Err(Error::InvalidOperation);
        }
        Ok(layout.user_table_offset + index as u64 * std::mem::size_of::<Self>() as u64)
    }
}
