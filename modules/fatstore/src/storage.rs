use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Linear byte medium the volume lives in.
///
/// Every access names its position; implementations keep no cursor visible to the
/// engine. Reads of bytes never written return zeros.
pub trait ByteStorage {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T: ByteStorage + ?Sized> ByteStorage for &mut T {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(pos, buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        (**self).write_at(pos, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: ByteStorage + ?Sized> ByteStorage for Box<T> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_at(pos, buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        (**self).write_at(pos, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Growable in-memory image.
#[derive(Clone, Debug, Default)]
pub struct MemStorage {
    data: Vec<u8>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn span(pos: u64, len: usize) -> io::Result<(usize, usize)> {
    let start = usize::try_from(pos)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "position out of range"))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "position out of range"))?;
    Ok((start, end))
}

impl ByteStorage for MemStorage {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        let (start, end) = span(pos, buf.len())?;
        let available = self.data.len().min(end).saturating_sub(start);
        if available > 0 {
            buf[..available].copy_from_slice(&self.data[start..start + available]);
        }
        buf[available..].fill(0);
        Ok(())
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let (start, end) = span(pos, buf.len())?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Image kept in a host file.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    /// Opens `path` read/write, creating an empty file when it does not exist.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl ByteStorage for FileStorage {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_passthrough() {
        let mut mem = MemStorage::new();
        mem.write_at(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mem.len(), 8);
        let mut read = [0xffu8; 4];
        mem.read_at(4, &mut read).unwrap();
        assert_eq!(read, [1, 2, 3, 4]);
        mem.read_at(0, &mut read).unwrap();
        assert_eq!(read, [0; 4]);
    }

    #[test]
    fn mem_storage_reads_past_end_as_zero() {
        let mut mem = MemStorage::from_bytes(vec![9, 9]);
        let mut read = [0xffu8; 4];
        mem.read_at(1, &mut read).unwrap();
        assert_eq!(read, [9, 0, 0, 0]);
        mem.read_at(100, &mut read).unwrap();
        assert_eq!(read, [0; 4]);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn file_storage_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.img");
        {
            let mut storage = FileStorage::open(&path).unwrap();
            storage.write_at(10, b"cluster").unwrap();
            storage.close().unwrap();
        }
        let mut storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.len().unwrap(), 17);
        let mut read = [0xffu8; 9];
        storage.read_at(10, &mut read).unwrap();
        assert_eq!(&read, b"cluster\0\0");
    }

    #[test]
    fn borrowed_storage_forwards() {
        fn fill<S: ByteStorage>(mut storage: S) {
            storage.write_at(0, b"ab").unwrap();
        }
        let mut mem = MemStorage::new();
        fill(&mut mem);
        assert_eq!(mem.as_bytes(), b"ab");
    }
}
