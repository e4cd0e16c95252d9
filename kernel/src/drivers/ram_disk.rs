use crate::block::block_core::{BlockOp, BlockSector, BLOCK_SECTOR_SIZE};
use crate::block::block_error::BlockError;
use alloc::{vec, vec::Vec};

/// A block device driver backed by kernel memory. Its contents are lost when it is dropped.
pub struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    pub fn new(sectors: BlockSector) -> Self {
        Self {
            data: vec![0; sectors as usize * BLOCK_SECTOR_SIZE],
        }
    }

    fn sector_range(&self, sector: BlockSector) -> Result<core::ops::Range<usize>, BlockError> {
        let start = sector as usize * BLOCK_SECTOR_SIZE;
        let end = start + BLOCK_SECTOR_SIZE;
        if end > self.data.len() {
            return Err(BlockError::SectorOutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockOp for RamDisk {
    fn read(&mut self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        let range = self.sector_range(sector)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        let range = self.sector_range(sector)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_are_independent() {
        let mut disk = RamDisk::new(2);
        disk.write(0, &[1; BLOCK_SECTOR_SIZE]).unwrap();
        disk.write(1, &[2; BLOCK_SECTOR_SIZE]).unwrap();

        let mut buf = [0; BLOCK_SECTOR_SIZE];
        disk.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1; BLOCK_SECTOR_SIZE]);
        disk.read(1, &mut buf).unwrap();
        assert_eq!(buf, [2; BLOCK_SECTOR_SIZE]);
        assert_eq!(disk.read(2, &mut buf), Err(BlockError::SectorOutOfBounds));
    }
}
