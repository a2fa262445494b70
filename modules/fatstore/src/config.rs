//! Format-time configuration of a volume.

use fatvfs::{VfsError, VfsResult};

use crate::layout::HEADER_LEN;

/// Cluster count used when a blank medium is formatted without explicit options.
pub const DEFAULT_CLUSTER_COUNT: u32 = 1024;
/// Cluster size in bytes used when a blank medium is formatted without explicit options.
pub const DEFAULT_CLUSTER_SIZE: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    pub cluster_count: u32,
    pub cluster_size: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            cluster_count: DEFAULT_CLUSTER_COUNT,
            cluster_size: DEFAULT_CLUSTER_SIZE,
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster_count(mut self, count: u32) -> Self {
        self.cluster_count = count;
        self
    }

    pub fn cluster_size(mut self, size: u32) -> Self {
        self.cluster_size = size;
        self
    }

    pub fn validate(&self) -> VfsResult<()> {
        let max = i32::MAX as u32;
        if self.cluster_count == 0 || self.cluster_count > max {
            return Err(VfsError::Invalid(format!(
                "cluster count {} outside 1..={max}",
                self.cluster_count
            )));
        }
        if self.cluster_size as usize <= HEADER_LEN || self.cluster_size > max {
            return Err(VfsError::Invalid(format!(
                "cluster size {} must exceed the {HEADER_LEN}-byte header and fit in i32",
                self.cluster_size
            )));
        }
        Ok(())
    }
}
