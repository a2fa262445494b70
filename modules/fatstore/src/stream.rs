//! Cursor-carrying file handles over any [`VfsOps`] volume.

use std::io;

use fatvfs::{FileOps, Metadata, SeekWhence, VPath, VfsError, VfsOps, VfsResult};

/// A file path plus a private cursor. Every read and write is delegated to the
/// volume's offset-based calls at the cursor, which then advances.
pub struct FileHandle<'a, V: VfsOps + ?Sized> {
    fs: &'a mut V,
    path: VPath,
    pos: u64,
}

impl<'a, V: VfsOps + ?Sized> FileHandle<'a, V> {
    /// Opens an existing file with the cursor at its start.
    pub fn open(fs: &'a mut V, path: VPath) -> VfsResult<Self> {
        if fs.metadata(&path)?.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        Ok(Self { fs, path, pos: 0 })
    }

    /// Opens an existing file with the cursor at its end.
    pub fn append(fs: &'a mut V, path: VPath) -> VfsResult<Self> {
        let mut handle = Self::open(fs, path)?;
        handle.pos = handle.fs.metadata(&handle.path)?.size;
        Ok(handle)
    }

    pub fn path(&self) -> &VPath {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<V: VfsOps + ?Sized> FileOps for FileHandle<'_, V> {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let data = self.fs.read_at(&self.path, self.pos, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let written = self.fs.write_at(&self.path, self.pos, buf)?;
        self.pos += written as u64;
        Ok(written)
    }

    fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => self.pos,
            SeekWhence::End => self.fs.metadata(&self.path)?.size,
        };
        let target = if offset >= 0 {
            base.checked_add(offset as u64)
        } else {
            base.checked_sub(offset.unsigned_abs())
        };
        self.pos = target.ok_or_else(|| {
            VfsError::Invalid(format!("seek by {offset} from {base} leaves the file"))
        })?;
        Ok(self.pos)
    }

    fn metadata(&mut self) -> VfsResult<Metadata> {
        self.fs.metadata(&self.path)
    }
}

impl<V: VfsOps + ?Sized> io::Read for FileHandle<'_, V> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(FileOps::read(self, buf)?)
    }
}

impl<V: VfsOps + ?Sized> io::Write for FileHandle<'_, V> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileOps::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<V: VfsOps + ?Sized> io::Seek for FileHandle<'_, V> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let pos = match pos {
            io::SeekFrom::Start(pos) => {
                self.pos = pos;
                return Ok(pos);
            }
            io::SeekFrom::Current(offset) => FileOps::seek(self, offset, SeekWhence::Cur)?,
            io::SeekFrom::End(offset) => FileOps::seek(self, offset, SeekWhence::End)?,
        };
        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatOptions;
    use crate::fs::FatFs;
    use crate::storage::MemStorage;

    fn volume() -> FatFs<MemStorage> {
        let options = FormatOptions::new().cluster_count(32).cluster_size(64);
        FatFs::format(MemStorage::new(), options).unwrap()
    }

    #[test]
    fn cursor_advances_through_writes_and_reads() {
        let mut fs = volume();
        let path = fs.create_file(&VPath::root(), "log").unwrap();
        let mut handle = FileHandle::open(&mut fs, path.clone()).unwrap();
        assert_eq!(FileOps::write(&mut handle, b"hello ").unwrap(), 6);
        FileOps::write(&mut handle, b"world").unwrap();
        assert_eq!(handle.position(), 11);

        handle.seek(0, SeekWhence::Set).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(FileOps::read(&mut handle, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        handle.seek(1, SeekWhence::Cur).unwrap();
        let mut rest = [0u8; 16];
        assert_eq!(FileOps::read(&mut handle, &mut rest).unwrap(), 5);
        assert_eq!(&rest[..5], b"world");
        assert_eq!(FileOps::read(&mut handle, &mut rest).unwrap(), 0);
        drop(handle);

        assert_eq!(fs.read_as_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn seek_from_end_and_before_start() {
        let mut fs = volume();
        let path = fs.create_file(&VPath::root(), "f").unwrap();
        fs.write_str(&path, "0123456789").unwrap();
        let mut handle = FileHandle::open(&mut fs, path).unwrap();
        assert_eq!(handle.seek(-3, SeekWhence::End).unwrap(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(FileOps::read(&mut handle, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");
        assert!(matches!(
            handle.seek(-11, SeekWhence::End),
            Err(VfsError::Invalid(_))
        ));
        assert_eq!(handle.position(), 10);
        assert_eq!(FileOps::metadata(&mut handle).unwrap().size, 10);
    }

    #[test]
    fn std_io_adapters() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let mut fs = volume();
        let path = fs.create_file(&VPath::root(), "blob").unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut handle = FileHandle::open(&mut fs, path).unwrap();
        handle.write_all(&data).unwrap();
        handle.flush().unwrap();
        assert_eq!(Seek::seek(&mut handle, SeekFrom::Start(0)).unwrap(), 0);
        let mut back = Vec::new();
        handle.read_to_end(&mut back).unwrap();
        assert_eq!(back, data);

        let err = Seek::seek(&mut handle, SeekFrom::Current(-2000)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn append_starts_at_end() {
        let mut fs = volume();
        let path = fs.create_file(&VPath::root(), "f").unwrap();
        fs.write_str(&path, "abc").unwrap();
        {
            let mut handle = FileHandle::append(&mut fs, path.clone()).unwrap();
            assert_eq!(handle.position(), 3);
            FileOps::write(&mut handle, b"def").unwrap();
        }
        assert_eq!(fs.read_as_string(&path).unwrap(), "abcdef");
    }

    #[test]
    fn open_rejects_directories_and_missing_files() {
        let mut fs = volume();
        let dir = fs.create_directory(&VPath::root(), "d").unwrap();
        assert!(matches!(
            FileHandle::open(&mut fs, dir),
            Err(VfsError::IsADirectory(_))
        ));
        assert!(matches!(
            FileHandle::open(&mut fs, VPath::parse("/missing").unwrap()),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn handle_over_trait_object() {
        let mut fs = volume();
        let path = fs.create_file(&VPath::root(), "f").unwrap();
        let ops: &mut dyn VfsOps = &mut fs;
        let mut handle = FileHandle::open(ops, path).unwrap();
        FileOps::write(&mut handle, b"xyz").unwrap();
        assert_eq!(FileOps::metadata(&mut handle).unwrap().size, 3);
    }
}
