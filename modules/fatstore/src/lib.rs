//! A hierarchical filesystem kept entirely inside one linear byte medium, laid out as a
//! superblock, a file allocation table and a region of fixed-size clusters.

mod check;
pub mod config;
mod dir;
pub mod entry;
pub mod fat;
mod fs;
pub mod layout;
pub mod storage;
mod stream;
pub mod superblock;

pub use check::CheckReport;
pub use config::{FormatOptions, DEFAULT_CLUSTER_COUNT, DEFAULT_CLUSTER_SIZE};
pub use fs::FatFs;
pub use storage::{ByteStorage, FileStorage, MemStorage};
pub use stream::FileHandle;

pub use fatvfs::{
    FileOps, FileType, Metadata, SeekWhence, VPath, VfsError, VfsOps, VfsResult,
};
