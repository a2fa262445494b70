//! Offline consistency walk over a mounted volume.

use fatvfs::{VfsError, VfsResult};
use log::{debug, warn};

use crate::dir;
use crate::fat::FatEntry;
use crate::fs::FatFs;
use crate::layout::{clusters_for, ROOT_CLUSTER};
use crate::storage::ByteStorage;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Live entries reachable from the root, the root included.
    pub entries: usize,
    pub used_clusters: u32,
    pub free_clusters: u32,
    /// Allocated clusters that no live entry's chain reaches.
    pub leaked: Vec<u32>,
    /// Removed entries still linked from a directory blob.
    pub stale_links: Vec<u32>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && self.stale_links.is_empty()
    }
}

impl<S: ByteStorage> FatFs<S> {
    /// Walks every chain reachable from the root and cross-checks it against the FAT.
    ///
    /// Structural damage (a chain shared by two entries, a chain whose length disagrees
    /// with its header size, a header at the wrong cluster) fails with
    /// `FormatInconsistency`. Leaks and stale links are reported.
    pub fn check(&mut self) -> VfsResult<CheckReport> {
        let cluster_count = self.superblock().cluster_count;
        let cluster_size = self.superblock().cluster_size;
        let mut claimed = vec![false; cluster_count as usize];
        let mut report = CheckReport::default();
        let mut stack = vec![ROOT_CLUSTER];

        while let Some(head) = stack.pop() {
            let header = self.header(head)?;
            if header.cluster != head {
                return Err(VfsError::FormatInconsistency(format!(
                    "header at cluster {head} claims cluster {}",
                    header.cluster
                )));
            }
            let chain = self.fat().chain(head)?;
            for &cluster in &chain {
                let slot = &mut claimed[cluster as usize];
                if *slot {
                    return Err(VfsError::FormatInconsistency(format!(
                        "cluster {cluster} belongs to more than one chain"
                    )));
                }
                *slot = true;
            }
            let expected = clusters_for(header.size as u64, cluster_size);
            if chain.len() as u64 != expected {
                return Err(VfsError::FormatInconsistency(format!(
                    "entry {:?} holds {} bytes in {} clusters, expected {expected}",
                    header.name,
                    header.size,
                    chain.len()
                )));
            }
            report.entries += 1;

            if header.is_dir() {
                let blob = self.read_content(&header, 0, header.size as usize)?;
                for child in dir::decode_pointers(&blob)? {
                    if self.header(child)?.is_removed() {
                        warn!("cluster {child} is removed but still linked from {head}");
                        report.stale_links.push(child);
                        continue;
                    }
                    stack.push(child);
                }
            }
        }

        for cluster in 0..cluster_count {
            if self.fat().entry(cluster)? == FatEntry::Free {
                report.free_clusters += 1;
                continue;
            }
            report.used_clusters += 1;
            if !claimed[cluster as usize] {
                report.leaked.push(cluster);
            }
        }
        debug!("check: {report:?}");
        Ok(report)
    }
}
