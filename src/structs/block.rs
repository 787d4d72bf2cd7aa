use std::io::{Read, Seek, SeekFrom, Write};

use super::{Block, Layout};
use crate::Error;

/// Width of the in-band next-block pointer at the start of every block
pub const NEXT_POINTER_BYTES: usize = 4;

impl Block {
    pub fn new(index: u32, block_size: u64) -> Self {
        Self {
            index,
            data: vec![0; block_size as usize],
        }
    }

    fn position(layout: &Layout, index: u32) -> Result<u64, Error> {
        if index >= layout.total_blocks {
            return Err(Error::InvalidOperation);
        }
        Ok(layout.content_offset + index as u64 * layout.block_size)
    }

    pub fn load<D: Read + Seek>(device: &mut D, layout: &Layout, index: u32) -> Result<Self, Error> {
        device.seek(SeekFrom::Start(Self::position(layout, index)?))?;
        let mut data = vec![0u8; layout.block_size as usize];
        device.read_exact(&mut data)?;
        Ok(Self { index, data })
    }

    pub fn flush<D: Write + Seek>(&self, device: &mut D, layout: &Layout) -> Result<(), Error> {
        device.seek(SeekFrom::Start(Self::position(layout, self.index)?))?;
        device.write_all(&self.data)?;
        Ok(())
    }

    pub fn next(&self) -> u32 {
        let mut raw = [0u8; NEXT_POINTER_BYTES];
        raw.copy_from_slice(&self.data[..NEXT_POINTER_BYTES]);
        u32::from_le_bytes(raw)
    }

    pub fn set_next(&mut self, next: u32) {
        self.data[..NEXT_POINTER_BYTES].copy_from_slice(&next.to_le_bytes());
    }

    pub fn content(&self) -> &[u8] {
        &self.data[NEXT_POINTER_BYTES..]
    }

    pub fn content_mut(&mut self) -> &mut [u8] {
        &mut self.data[NEXT_POINTER_BYTES..]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::Block;
    use crate::config::Config;
    use crate::structs::Header;

    #[test]
    fn next_pointer_roundtrip() {
        let mut block = Block::new(4, 512);
        assert_eq!(block.next(), 0);
        block.set_next(77);
        assert_eq!(block.next(), 77);
        assert_eq!(block.content().len(), 508);
    }

    #[test]
    fn load_and_flush() {
        let mut config = Config::default();
        config.total_size = 2 * 1024 * 1024;
        config.block_size = 512;
        let layout = Header::new(&config).layout();
        let mut dev = Cursor::new(vec![0u8; config.total_size as usize]);
        let mut block = Block::new(2, layout.block_size);
        block.set_next(3);
        block.content_mut()[..5].copy_from_slice(b"hello");
        block.flush(&mut dev, &layout).unwrap();
        let loaded = Block::load(&mut dev, &layout, 2).unwrap();
        assert_eq!(loaded.next(), 3);
        assert_eq!(&loaded.content()[..5], b"hello");
        assert!(Block::load(&mut dev, &layout, layout.total_blocks).is_err());
    }
}
