use std::io::{Read, Seek, SeekFrom, Write};

use bytemuck::Zeroable;
use chrono::Local;

use super::*;
use crate::config::Config;
use crate::Error;

impl Header {
    pub fn new(config: &Config) -> Self {
        let mut header = Self::zeroed();
        header.magic = MAGIC;
        header.format_version = FORMAT_VERSION;
        header.total_size = config.total_size;
        header.header_size = HEADER_SIZE;
        header.block_size = config.block_size;
        header.user_table_offset = HEADER_SIZE;
        header.max_users = config.max_users;
        header.max_files = config.max_files;
        pack_str(&mut header.student_id, std::str::from_utf8(STUDENT_ID).unwrap_or(""));
        let date = Local::now().format("%Y-%m-%d").to_string();
        pack_str(&mut header.submission_date, &date);
        header
    }

    /// Read the header from offset 0 and verify the magic signature
    pub fn load<D: Read + Seek>(device: &mut D) -> Result<Self, Error> {
        device.seek(SeekFrom::Start(0))?;
        let mut header = Self::zeroed();
        device.read_exact(bytemuck::bytes_of_mut(&mut header))?;
        if header.magic != MAGIC {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad magic signature",
            )));
        }
        Ok(header)
    }

    pub fn flush<D: Write + Seek>(&self, device: &mut D) -> Result<(), Error> {
        device.seek(SeekFrom::Start(0))?;
        device.write_all(bytemuck::bytes_of(self))?;
        Ok(())
    }

    /// Region offsets derived from the header's own geometry
    pub fn layout(&self) -> Layout {
        let entry_table_offset = self.user_table_offset
            + self.max_users as u64 * std::mem::size_of::<UserRecord>() as u64;
        let content_offset =
            entry_table_offset + self.max_files as u64 * std::mem::size_of::<FileEntry>() as u64;
        let total_blocks = ((self.total_size - content_offset) / self.block_size) as u32;
        Layout {
            user_table_offset: self.user_table_offset,
            entry_table_offset,
            content_offset,
            block_size: self.block_size,
            total_blocks,
            max_users: self.max_users,
            max_files: self.max_files,
        }
    }
}

impl Layout {
    /// Bytes per block available to file content
    pub fn usable_block_size(&self) -> u64 {
        self.block_size - NEXT_POINTER_BYTES as u64
    }

    /// Offset of the trailing free-space snapshot
    pub fn free_space_offset(&self) -> u64 {
        self.content_offset + self.total_blocks as u64 * self.block_size
    }

    pub fn blocks_needed(&self, size: u64) -> u32 {
        if size == 0 {
            return 1;
        }
        let usable = self.usable_block_size();
        ((size + usable - 1) / usable) as u32
    }
}
