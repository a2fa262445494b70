use fatvfs::{VfsError, VfsResult};

use crate::config::FormatOptions;
use crate::layout::{
    read_u32, write_u32, CLUSTER_COUNT_OFFSET, CLUSTER_SIZE_OFFSET, FAT_ENTRY_SIZE, FAT_OFFSET,
    LAST_USED_CLUSTER_OFFSET, SUPERBLOCK_LEN,
};

/// Geometry read once at mount time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub cluster_count: u32,
    pub cluster_size: u32,
    /// Allocation hint; only steers where the free-cluster scan starts.
    pub last_used_cluster: u32,
}

impl Superblock {
    pub fn new(options: &FormatOptions) -> Self {
        Self {
            cluster_count: options.cluster_count,
            cluster_size: options.cluster_size,
            last_used_cluster: 0,
        }
    }

    /// True when the whole superblock is zero, i.e. the medium was never formatted.
    /// A single zeroed field is damage, not blankness, and is left to [`Self::parse`].
    pub fn is_blank(buf: &[u8]) -> bool {
        buf.len() >= SUPERBLOCK_LEN && buf[..SUPERBLOCK_LEN].iter().all(|&byte| byte == 0)
    }

    pub fn parse(buf: &[u8]) -> VfsResult<Self> {
        if buf.len() < SUPERBLOCK_LEN {
            return Err(VfsError::FormatInconsistency(format!(
                "superblock needs {SUPERBLOCK_LEN} bytes, got {}",
                buf.len()
            )));
        }
        let cluster_count = read_u32(buf, CLUSTER_COUNT_OFFSET);
        let cluster_size = read_u32(buf, CLUSTER_SIZE_OFFSET);
        let last_used_cluster = read_u32(buf, LAST_USED_CLUSTER_OFFSET);
        let options = FormatOptions::new()
            .cluster_count(cluster_count)
            .cluster_size(cluster_size);
        options.validate().map_err(|err| {
            VfsError::FormatInconsistency(format!("bad superblock geometry: {err}"))
        })?;
        let last_used_cluster = if last_used_cluster < cluster_count {
            last_used_cluster
        } else {
            0
        };
        Ok(Self {
            cluster_count,
            cluster_size,
            last_used_cluster,
        })
    }

    pub fn encode(&self) -> [u8; SUPERBLOCK_LEN] {
        let mut buf = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut buf, CLUSTER_COUNT_OFFSET, self.cluster_count);
        write_u32(&mut buf, LAST_USED_CLUSTER_OFFSET, self.last_used_cluster);
        write_u32(&mut buf, CLUSTER_SIZE_OFFSET, self.cluster_size);
        buf
    }

    pub fn fat_entry_offset(&self, cluster: u32) -> u64 {
        FAT_OFFSET + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    pub fn fat_len(&self) -> usize {
        self.cluster_count as usize * FAT_ENTRY_SIZE
    }

    pub fn data_start(&self) -> u64 {
        FAT_OFFSET + self.fat_len() as u64
    }

    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_start() + cluster as u64 * self.cluster_size as u64
    }

    pub fn contains(&self, cluster: u32) -> bool {
        cluster < self.cluster_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_superblock() {
        let mut data = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut data, CLUSTER_COUNT_OFFSET, 1024);
        write_u32(&mut data, LAST_USED_CLUSTER_OFFSET, 7);
        write_u32(&mut data, CLUSTER_SIZE_OFFSET, 4096);
        let sb = Superblock::parse(&data).unwrap();
        assert_eq!(sb.cluster_count, 1024);
        assert_eq!(sb.cluster_size, 4096);
        assert_eq!(sb.last_used_cluster, 7);
        assert_eq!(sb.fat_entry_offset(0), 64);
        assert_eq!(sb.data_start(), 64 + 4 * 1024);
        assert_eq!(sb.cluster_offset(2), 64 + 4 * 1024 + 2 * 4096);
        assert_eq!(sb.encode(), data);
    }

    #[test]
    fn blank_and_corrupt() {
        let data = [0u8; SUPERBLOCK_LEN];
        assert!(Superblock::is_blank(&data));
        assert!(matches!(
            Superblock::parse(&data),
            Err(VfsError::FormatInconsistency(_))
        ));
        let mut data = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut data, CLUSTER_COUNT_OFFSET, 4);
        write_u32(&mut data, CLUSTER_SIZE_OFFSET, 16);
        assert!(!Superblock::is_blank(&data));
        assert!(Superblock::parse(&data).is_err());
    }

    #[test]
    fn one_zeroed_field_is_not_blank() {
        let mut data = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut data, CLUSTER_COUNT_OFFSET, 16);
        write_u32(&mut data, LAST_USED_CLUSTER_OFFSET, 3);
        assert!(!Superblock::is_blank(&data));
        assert!(matches!(
            Superblock::parse(&data),
            Err(VfsError::FormatInconsistency(_))
        ));
        let mut data = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut data, CLUSTER_SIZE_OFFSET, 64);
        assert!(!Superblock::is_blank(&data));
        assert!(!Superblock::is_blank(&[0u8; 16]));
    }

    #[test]
    fn stale_hint_is_reset() {
        let mut data = [0u8; SUPERBLOCK_LEN];
        write_u32(&mut data, CLUSTER_COUNT_OFFSET, 8);
        write_u32(&mut data, LAST_USED_CLUSTER_OFFSET, 99);
        write_u32(&mut data, CLUSTER_SIZE_OFFSET, 64);
        assert_eq!(Superblock::parse(&data).unwrap().last_used_cluster, 0);
    }
}
