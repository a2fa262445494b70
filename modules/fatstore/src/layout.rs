//! On-disk layout of a volume image. All multi-byte integers are 4-byte big-endian.
//!
//! ```text
//! [0, 64)                         superblock (count at 20, hint at 24, size at 28)
//! [64, 64 + 4 * count)            FAT table, one i32 per cluster
//! [64 + 4 * count, ...)           `count` clusters of `size` bytes
//! ```

pub const SUPERBLOCK_LEN: usize = 64;
pub const CLUSTER_COUNT_OFFSET: usize = 20;
pub const LAST_USED_CLUSTER_OFFSET: usize = 24;
pub const CLUSTER_SIZE_OFFSET: usize = 28;
pub const FAT_OFFSET: u64 = SUPERBLOCK_LEN as u64;
pub const FAT_ENTRY_SIZE: usize = 4;

pub const FAT_FREE: u32 = 0;
pub const END_OF_CHAIN: u32 = 0xffff_ffff;

pub const HEADER_LEN: usize = 32;
pub const HEADER_NAME_LEN: usize = 20;
pub const HEADER_ATTR_OFFSET: usize = 20;
pub const HEADER_CLUSTER_OFFSET: usize = 24;
pub const HEADER_SIZE_OFFSET: usize = 28;

/// Width of one child pointer in a directory blob.
pub const DIR_POINTER_SIZE: usize = 4;

pub const ROOT_CLUSTER: u32 = 0;

/// Largest content size an int32 size field can describe.
pub const MAX_CONTENT_SIZE: u64 = i32::MAX as u64;

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Clusters a chain needs to hold `size` content bytes behind the header.
pub fn clusters_for(size: u64, cluster_size: u32) -> u64 {
    let total = size + HEADER_LEN as u64;
    total.div_ceil(cluster_size as u64).max(1)
}
