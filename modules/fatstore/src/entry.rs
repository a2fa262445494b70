use bitflags::bitflags;
use fatvfs::{validate_name, FileType, VfsError, VfsResult};

use crate::layout::{
    read_u32, write_u32, HEADER_ATTR_OFFSET, HEADER_CLUSTER_OFFSET, HEADER_LEN, HEADER_NAME_LEN,
    HEADER_SIZE_OFFSET,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const DIRECTORY = 0b0000_0001;
        const REMOVED = 0b0000_0010;
    }
}

/// Lifecycle of an entry. `Removed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Active,
    Removed,
}

/// The 32-byte header at the head of every chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub file_type: FileType,
    pub state: EntryState,
    /// Head cluster of the chain this header lives in.
    pub cluster: u32,
    /// Content bytes following the header.
    pub size: u32,
}

impl EntryHeader {
    pub fn new(name: &str, file_type: FileType, cluster: u32) -> VfsResult<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_owned(),
            file_type,
            state: EntryState::Active,
            cluster,
            size: 0,
        })
    }

    /// Header of the root directory: blank name at cluster 0.
    pub fn root() -> Self {
        Self {
            name: String::new(),
            file_type: FileType::Dir,
            state: EntryState::Active,
            cluster: crate::layout::ROOT_CLUSTER,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    pub fn is_removed(&self) -> bool {
        self.state == EntryState::Removed
    }

    pub fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::empty();
        attrs.set(Attributes::DIRECTORY, self.is_dir());
        attrs.set(Attributes::REMOVED, self.is_removed());
        attrs
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..HEADER_NAME_LEN].fill(b' ');
        let name = self.name.as_bytes();
        let len = name.len().min(HEADER_NAME_LEN);
        buf[..len].copy_from_slice(&name[..len]);
        buf[HEADER_ATTR_OFFSET] = self.attributes().bits();
        write_u32(&mut buf, HEADER_CLUSTER_OFFSET, self.cluster);
        write_u32(&mut buf, HEADER_SIZE_OFFSET, self.size);
        buf
    }

    pub fn decode(buf: &[u8]) -> VfsResult<Self> {
        if buf.len() < HEADER_LEN {
            return Err(VfsError::FormatInconsistency(format!(
                "entry header needs {HEADER_LEN} bytes, got {}",
                buf.len()
            )));
        }
        let name = core::str::from_utf8(&buf[..HEADER_NAME_LEN])
            .map_err(|_| VfsError::FormatInconsistency("entry name is not UTF-8".into()))?
            .trim_end_matches(' ')
            .to_owned();
        let attrs = Attributes::from_bits_truncate(buf[HEADER_ATTR_OFFSET]);
        let file_type = if attrs.contains(Attributes::DIRECTORY) {
            FileType::Dir
        } else {
            FileType::File
        };
        let state = if attrs.contains(Attributes::REMOVED) {
            EntryState::Removed
        } else {
            EntryState::Active
        };
        let size = read_u32(buf, HEADER_SIZE_OFFSET);
        if size > i32::MAX as u32 {
            return Err(VfsError::FormatInconsistency(format!(
                "entry {name:?} has negative size"
            )));
        }
        Ok(Self {
            name,
            file_type,
            state,
            cluster: read_u32(buf, HEADER_CLUSTER_OFFSET),
            size,
        })
    }
}
