use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Byte-addressed backing store of an image.
pub trait BlockDevice: Send + Sync {
    /// Whether the store already holds an image that could be mounted.
    fn exists(&self) -> bool;

    /// Current length of the store in bytes.
    fn len(&self) -> Result<u64>;

    /// Drops any previous content and recreates the store as `len` zero bytes.
    fn reset(&self, len: u64) -> Result<()>;

    /// Reads `buf.len()` bytes at `offset`.
    /// Bytes past the end of the store read as zero.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf` at `offset`, growing the store if needed.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// A host file used as the image.
/// The file is reopened for every access and closed when the access ends.
#[derive(Debug, Clone)]
pub struct FileDevice {
    path: PathBuf,
}

impl FileDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }
}

impl BlockDevice for FileDevice {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn reset(&self, len: u64) -> Result<()> {
        let file = File::create(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.open()?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.open()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.open()?.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_file_device() {
        let dir = tempfile::tempdir().unwrap();
        let dev = FileDevice::new(dir.path().join("disk.img"));
        assert!(!dev.exists());
        dev.reset(64).unwrap();
        assert!(dev.exists());
        assert_eq!(dev.len().unwrap(), 64);

        dev.write_at(8, b"fat1").unwrap();
        let mut buf = [0xffu8; 6];
        dev.read_at(7, &mut buf).unwrap();
        assert_eq!(&buf, b"\0fat1\0");

        // reads past the end come back zeroed
        let mut tail = [0xffu8; 8];
        dev.read_at(60, &mut tail).unwrap();
        assert_eq!(tail, [0; 8]);

        // writes past the end grow the file
        dev.write_at(100, b"x").unwrap();
        assert_eq!(dev.len().unwrap(), 101);

        dev.reset(16).unwrap();
        assert_eq!(dev.len().unwrap(), 16);
        let mut buf = [0xffu8; 16];
        dev.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
    }
}
