//! Directory content: a flat run of 4-byte child cluster pointers.

use fatvfs::{VfsError, VfsResult};

use crate::layout::{read_u32, DIR_POINTER_SIZE};

pub fn decode_pointers(blob: &[u8]) -> VfsResult<Vec<u32>> {
    if blob.len() % DIR_POINTER_SIZE != 0 {
        return Err(VfsError::FormatInconsistency(format!(
            "directory content of {} bytes is not a pointer list",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(DIR_POINTER_SIZE)
        .map(|chunk| read_u32(chunk, 0))
        .collect())
}

pub fn encode_pointer(cluster: u32) -> [u8; DIR_POINTER_SIZE] {
    cluster.to_be_bytes()
}

/// Drops the pointer to `cluster`, closing the gap.
pub fn without_pointer(blob: &[u8], cluster: u32) -> VfsResult<Vec<u8>> {
    let pointers = decode_pointers(blob)?;
    let idx = pointers
        .iter()
        .position(|&child| child == cluster)
        .ok_or_else(|| {
            VfsError::FormatInconsistency(format!(
                "cluster {cluster} is not linked from its parent directory"
            ))
        })?;
    let start = idx * DIR_POINTER_SIZE;
    let mut out = Vec::with_capacity(blob.len() - DIR_POINTER_SIZE);
    out.extend_from_slice(&blob[..start]);
    out.extend_from_slice(&blob[start + DIR_POINTER_SIZE..]);
    Ok(out)
}
