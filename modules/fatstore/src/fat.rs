use fatvfs::{VfsError, VfsResult};
use log::trace;

use crate::layout::{
    read_u32, END_OF_CHAIN, FAT_ENTRY_SIZE, FAT_FREE, LAST_USED_CLUSTER_OFFSET,
};
use crate::storage::ByteStorage;
use crate::superblock::Superblock;

/// Entries fetched per storage read while scanning the table.
const SCAN_CHUNK: u32 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Next(u32),
    EndOfChain,
}

impl FatEntry {
    pub fn decode(raw: u32, cluster_count: u32) -> VfsResult<Self> {
        match raw {
            FAT_FREE => Ok(Self::Free),
            END_OF_CHAIN => Ok(Self::EndOfChain),
            next if next < cluster_count => Ok(Self::Next(next)),
            other => Err(VfsError::FormatInconsistency(format!(
                "FAT entry {other:#x} points outside {cluster_count} clusters"
            ))),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Free => FAT_FREE,
            Self::Next(next) => next,
            Self::EndOfChain => END_OF_CHAIN,
        }
    }
}

/// View of the FAT region plus the allocation hint.
///
/// Borrowed from the volume for the duration of one operation.
pub struct FatTable<'a, S: ByteStorage> {
    storage: &'a mut S,
    sb: &'a mut Superblock,
}

impl<'a, S: ByteStorage> FatTable<'a, S> {
    pub fn new(storage: &'a mut S, sb: &'a mut Superblock) -> Self {
        Self { storage, sb }
    }

    fn check_cluster(&self, cluster: u32) -> VfsResult<()> {
        if !self.sb.contains(cluster) {
            return Err(VfsError::FormatInconsistency(format!(
                "cluster {cluster} outside {} clusters",
                self.sb.cluster_count
            )));
        }
        Ok(())
    }

    pub fn entry(&mut self, cluster: u32) -> VfsResult<FatEntry> {
        self.check_cluster(cluster)?;
        let mut raw = [0u8; FAT_ENTRY_SIZE];
        self.storage
            .read_at(self.sb.fat_entry_offset(cluster), &mut raw)?;
        FatEntry::decode(u32::from_be_bytes(raw), self.sb.cluster_count)
    }

    pub fn set_entry(&mut self, cluster: u32, entry: FatEntry) -> VfsResult<()> {
        self.check_cluster(cluster)?;
        trace!("fat[{cluster}] <- {entry:?}");
        self.storage.write_at(
            self.sb.fat_entry_offset(cluster),
            &entry.raw().to_be_bytes(),
        )?;
        Ok(())
    }

    /// First free cluster at or after `start_from`, wrapping to 0 once.
    pub fn find_free(&mut self, start_from: u32) -> VfsResult<u32> {
        let count = self.sb.cluster_count;
        let start = if start_from < count { start_from } else { 0 };
        if let Some(found) = self.scan_free(start, count)? {
            return Ok(found);
        }
        if let Some(found) = self.scan_free(0, start)? {
            return Ok(found);
        }
        Err(VfsError::StorageExhausted(format!(
            "all {count} clusters are in use"
        )))
    }

    fn scan_free(&mut self, from: u32, to: u32) -> VfsResult<Option<u32>> {
        let mut buf = vec![0u8; SCAN_CHUNK as usize * FAT_ENTRY_SIZE];
        let mut base = from;
        while base < to {
            let len = (to - base).min(SCAN_CHUNK);
            let bytes = &mut buf[..len as usize * FAT_ENTRY_SIZE];
            self.storage.read_at(self.sb.fat_entry_offset(base), bytes)?;
            for idx in 0..len {
                if read_u32(bytes, idx as usize * FAT_ENTRY_SIZE) == FAT_FREE {
                    return Ok(Some(base + idx));
                }
            }
            base += len;
        }
        Ok(None)
    }

    /// Reserves one free cluster as a single-cluster chain and records it in the hint.
    pub fn allocate(&mut self) -> VfsResult<u32> {
        let start = self.sb.last_used_cluster.wrapping_add(1);
        let cluster = self.find_free(start)?;
        self.set_entry(cluster, FatEntry::EndOfChain)?;
        self.sb.last_used_cluster = cluster;
        self.storage.write_at(
            LAST_USED_CLUSTER_OFFSET as u64,
            &cluster.to_be_bytes(),
        )?;
        trace!("allocated cluster {cluster}");
        Ok(cluster)
    }

    /// Links `clusters` in order and terminates the last one.
    pub fn build_chain(&mut self, clusters: &[u32]) -> VfsResult<()> {
        for (idx, &cluster) in clusters.iter().enumerate() {
            let entry = match clusters.get(idx + 1) {
                Some(&next) => FatEntry::Next(next),
                None => FatEntry::EndOfChain,
            };
            self.set_entry(cluster, entry)?;
        }
        Ok(())
    }

    /// Returns every cluster of the chain starting at `first`, in order.
    pub fn chain(&mut self, first: u32) -> VfsResult<Vec<u32>> {
        let mut clusters = vec![first];
        let mut current = first;
        loop {
            match self.entry(current)? {
                FatEntry::EndOfChain => return Ok(clusters),
                FatEntry::Next(next) => {
                    if clusters.len() >= self.sb.cluster_count as usize {
                        return Err(VfsError::FormatInconsistency(format!(
                            "chain from cluster {first} does not terminate"
                        )));
                    }
                    clusters.push(next);
                    current = next;
                }
                FatEntry::Free => {
                    return Err(VfsError::FormatInconsistency(format!(
                        "chain from cluster {first} runs into free cluster {current}"
                    )))
                }
            }
        }
    }

    /// Returns the chain from `first` to the pool, stopping at the end-of-chain mark.
    pub fn clear_chain(&mut self, first: u32) -> VfsResult<usize> {
        let mut current = first;
        let mut released = 0usize;
        loop {
            let entry = self.entry(current)?;
            if entry == FatEntry::Free {
                return Err(VfsError::FormatInconsistency(format!(
                    "cluster {current} released twice"
                )));
            }
            self.set_entry(current, FatEntry::Free)?;
            released += 1;
            match entry {
                FatEntry::Next(next) if released < self.sb.cluster_count as usize => {
                    current = next
                }
                FatEntry::Next(_) => {
                    return Err(VfsError::FormatInconsistency(format!(
                        "chain from cluster {first} does not terminate"
                    )))
                }
                _ => return Ok(released),
            }
        }
    }

    pub fn free_count(&mut self) -> VfsResult<u32> {
        let count = self.sb.cluster_count;
        let mut buf = vec![0u8; SCAN_CHUNK as usize * FAT_ENTRY_SIZE];
        let mut free = 0u32;
        let mut base = 0u32;
        while base < count {
            let len = (count - base).min(SCAN_CHUNK);
            let bytes = &mut buf[..len as usize * FAT_ENTRY_SIZE];
            self.storage.read_at(self.sb.fat_entry_offset(base), bytes)?;
            free += (0..len)
                .filter(|idx| read_u32(bytes, *idx as usize * FAT_ENTRY_SIZE) == FAT_FREE)
                .count() as u32;
            base += len;
        }
        Ok(free)
    }
}
