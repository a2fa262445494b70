// Shared vocabulary for the single-image FAT volume: errors, paths, metadata and the
// operation traits the engine and the stream handles meet at.

mod path;

pub use path::{validate_name, VPath, MAX_NAME_LEN, PATH_SEPARATOR};

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("incorrect name: {0}")]
    IncorrectName(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("volume format inconsistency: {0}")]
    FormatInconsistency(String),
    #[error("storage exhausted: {0}")]
    StorageExhausted(String),
    #[error("operation not permitted on the root directory")]
    RootDirectory,
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type VfsResult<T> = core::result::Result<T, VfsError>;

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        let kind = match &err {
            VfsError::Io(inner) => inner.kind(),
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::IncorrectName(_) | VfsError::Invalid(_) => io::ErrorKind::InvalidInput,
            VfsError::StorageExhausted(_) => io::ErrorKind::StorageFull,
            VfsError::RootDirectory => io::ErrorKind::PermissionDenied,
            VfsError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            VfsError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            VfsError::FormatInconsistency(_) => io::ErrorKind::InvalidData,
        };
        match err {
            VfsError::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    pub size: u64,
    /// Head cluster of the entry's chain.
    pub cluster: u32,
}

impl Metadata {
    pub const fn new(file_type: FileType, size: u64, cluster: u32) -> Self {
        Self {
            file_type,
            size,
            cluster,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

/// Path-addressed operations of a mounted volume.
///
/// Every call takes `&mut self`: the backing medium has a single owner and no operation
/// may interleave with another. Callers sharing a volume wrap it in their own lock.
pub trait VfsOps {
    fn root(&self) -> VPath {
        VPath::root()
    }
    fn create_file(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath>;
    fn create_directory(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath>;
    fn remove(&mut self, path: &VPath) -> VfsResult<()>;
    fn metadata(&mut self, path: &VPath) -> VfsResult<Metadata>;
    /// Reads at most `count` bytes starting at `offset`; the result is shorter when the
    /// content ends first.
    fn read_at(&mut self, path: &VPath, offset: u64, count: usize) -> VfsResult<Vec<u8>>;
    fn write_at(&mut self, path: &VPath, offset: u64, buf: &[u8]) -> VfsResult<usize>;
    fn list(&mut self, path: &VPath) -> VfsResult<Vec<String>>;
    fn truncate(&mut self, path: &VPath, size: u64) -> VfsResult<()>;
}

pub trait FileOps {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;
    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;
    fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u64>;
    fn metadata(&mut self) -> VfsResult<Metadata>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion_keeps_backend_errors() {
        let err = VfsError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn io_conversion_maps_taxonomy() {
        let back: io::Error = VfsError::NotFound("/a".into()).into();
        assert_eq!(back.kind(), io::ErrorKind::NotFound);
        let back: io::Error = VfsError::Invalid("seek".into()).into();
        assert_eq!(back.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn error_messages_carry_context() {
        let err = VfsError::IsADirectory("/docs".into());
        assert_eq!(err.to_string(), "is a directory: /docs");
    }
}
