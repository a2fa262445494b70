//! The volume engine: lifecycle, path resolution, chain-backed content I/O and the
//! path-addressed facade over them.
//!
//! A mutation is a series of independent medium writes (FAT entries, data, header,
//! parent directory blob) with no journal. A fault between two of them can leave a chain
//! allocated but unlinked, or a directory pointing at a removed entry; [`FatFs::check`]
//! reports that damage, nothing repairs it. Writes are ordered so that a recorded size
//! never exceeds the chain backing it.

use fatvfs::{validate_name, FileType, Metadata, VPath, VfsError, VfsOps, VfsResult};
use log::{debug, info, warn};

use crate::config::FormatOptions;
use crate::dir;
use crate::entry::{EntryHeader, EntryState};
use crate::fat::{FatEntry, FatTable};
use crate::layout::{
    clusters_for, FAT_OFFSET, HEADER_LEN, MAX_CONTENT_SIZE, ROOT_CLUSTER, SUPERBLOCK_LEN,
};
use crate::storage::ByteStorage;
use crate::superblock::Superblock;

/// Zero bytes handed to the medium per call when clearing a region.
const ZERO_CHUNK: usize = 64 * 1024;

/// A mounted volume. Owns its medium; every operation takes `&mut self`.
pub struct FatFs<S: ByteStorage> {
    storage: S,
    sb: Superblock,
}

impl<S: ByteStorage> FatFs<S> {
    /// Lays down an empty volume: superblock, a cleared FAT and the root directory.
    pub fn format(mut storage: S, options: FormatOptions) -> VfsResult<Self> {
        options.validate()?;
        let sb = Superblock::new(&options);
        storage.write_at(0, &sb.encode())?;
        let fat_len = sb.fat_len();
        let zeros = vec![0u8; fat_len.min(ZERO_CHUNK)];
        let mut done = 0usize;
        while done < fat_len {
            let len = (fat_len - done).min(ZERO_CHUNK);
            storage.write_at(FAT_OFFSET + done as u64, &zeros[..len])?;
            done += len;
        }
        let mut fs = Self { storage, sb };
        fs.fat().set_entry(ROOT_CLUSTER, FatEntry::EndOfChain)?;
        fs.write_header(&EntryHeader::root())?;
        fs.storage.flush()?;
        info!(
            "formatted volume: {} clusters of {} bytes",
            options.cluster_count, options.cluster_size
        );
        Ok(fs)
    }

    pub fn mount(mut storage: S) -> VfsResult<Self> {
        let mut buf = [0u8; SUPERBLOCK_LEN];
        storage.read_at(0, &mut buf)?;
        let sb = Superblock::parse(&buf)?;
        let mut fs = Self { storage, sb };
        if fs.fat().entry(ROOT_CLUSTER)? == FatEntry::Free {
            return Err(VfsError::FormatInconsistency(
                "root cluster is marked free".into(),
            ));
        }
        let root = fs.header(ROOT_CLUSTER)?;
        if !root.is_dir() || root.is_removed() {
            return Err(VfsError::FormatInconsistency(
                "cluster 0 does not hold the root directory".into(),
            ));
        }
        info!(
            "mounted volume: {} clusters of {} bytes",
            fs.sb.cluster_count, fs.sb.cluster_size
        );
        Ok(fs)
    }

    /// Mounts the medium, formatting it with `options` first when its superblock is
    /// entirely zero. A partly damaged superblock fails to mount instead.
    pub fn open_or_format(mut storage: S, options: FormatOptions) -> VfsResult<Self> {
        let mut buf = [0u8; SUPERBLOCK_LEN];
        storage.read_at(0, &mut buf)?;
        if Superblock::is_blank(&buf) {
            info!("blank medium, formatting");
            Self::format(storage, options)
        } else {
            Self::mount(storage)
        }
    }

    pub fn close(mut self) -> VfsResult<()> {
        self.storage.close()?;
        Ok(())
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub(crate) fn fat(&mut self) -> FatTable<'_, S> {
        FatTable::new(&mut self.storage, &mut self.sb)
    }

    pub(crate) fn header(&mut self, cluster: u32) -> VfsResult<EntryHeader> {
        if !self.sb.contains(cluster) {
            return Err(VfsError::FormatInconsistency(format!(
                "entry pointer {cluster} outside {} clusters",
                self.sb.cluster_count
            )));
        }
        let mut buf = [0u8; HEADER_LEN];
        self.storage
            .read_at(self.sb.cluster_offset(cluster), &mut buf)?;
        EntryHeader::decode(&buf)
    }

    pub(crate) fn write_header(&mut self, header: &EntryHeader) -> VfsResult<()> {
        self.storage
            .write_at(self.sb.cluster_offset(header.cluster), &header.encode())?;
        Ok(())
    }

    /// Walks `path` from the root, one directory blob per component.
    pub fn resolve(&mut self, path: &VPath) -> VfsResult<u32> {
        let mut current = ROOT_CLUSTER;
        for name in path.components() {
            let header = self.header(current)?;
            current = self
                .find_child(&header, name)?
                .ok_or_else(|| VfsError::NotFound(path.to_string()))?
                .cluster;
        }
        Ok(current)
    }

    fn find_child(&mut self, dir: &EntryHeader, name: &str) -> VfsResult<Option<EntryHeader>> {
        if !dir.is_dir() {
            return Ok(None);
        }
        Ok(self
            .children(dir)?
            .into_iter()
            .find(|child| child.name == name))
    }

    /// Active children of `dir`, in link order.
    pub(crate) fn children(&mut self, dir: &EntryHeader) -> VfsResult<Vec<EntryHeader>> {
        let blob = self.read_content(dir, 0, dir.size as usize)?;
        let mut children = Vec::new();
        for cluster in dir::decode_pointers(&blob)? {
            let child = self.header(cluster)?;
            if child.cluster != cluster {
                return Err(VfsError::FormatInconsistency(format!(
                    "header at cluster {cluster} claims cluster {}",
                    child.cluster
                )));
            }
            if child.is_removed() {
                warn!(
                    "removed entry {:?} at cluster {cluster} still linked from cluster {}",
                    child.name, dir.cluster
                );
                continue;
            }
            children.push(child);
        }
        Ok(children)
    }

    fn next_in_chain(&mut self, cluster: u32, head: u32) -> VfsResult<u32> {
        match self.fat().entry(cluster)? {
            FatEntry::Next(next) => Ok(next),
            _ => Err(VfsError::FormatInconsistency(format!(
                "chain of entry {head} ends at cluster {cluster} before its recorded size"
            ))),
        }
    }

    /// Reads up to `count` content bytes from `from`, clamped to the entry's size.
    pub(crate) fn read_content(
        &mut self,
        header: &EntryHeader,
        from: u64,
        count: usize,
    ) -> VfsResult<Vec<u8>> {
        let size = header.size as u64;
        if from >= size || count == 0 {
            return Ok(Vec::new());
        }
        let len = (size - from).min(count as u64) as usize;
        let cluster_size = self.sb.cluster_size as u64;
        let start = from + HEADER_LEN as u64;
        let mut cluster = header.cluster;
        for _ in 0..start / cluster_size {
            cluster = self.next_in_chain(cluster, header.cluster)?;
        }
        let mut in_cluster = start % cluster_size;
        let mut out = vec![0u8; len];
        let mut done = 0usize;
        loop {
            let chunk = (len - done).min((cluster_size - in_cluster) as usize);
            self.storage.read_at(
                self.sb.cluster_offset(cluster) + in_cluster,
                &mut out[done..done + chunk],
            )?;
            done += chunk;
            if done == len {
                return Ok(out);
            }
            in_cluster = 0;
            cluster = self.next_in_chain(cluster, header.cluster)?;
        }
    }

    /// Copies `data` into the chain at content offset `offset`. The chain must already
    /// be long enough.
    fn write_span(&mut self, chain: &[u32], offset: u64, data: &[u8]) -> VfsResult<()> {
        let cluster_size = self.sb.cluster_size as u64;
        let mut pos = offset + HEADER_LEN as u64;
        let mut done = 0usize;
        while done < data.len() {
            let idx = (pos / cluster_size) as usize;
            let in_cluster = pos % cluster_size;
            let cluster = *chain.get(idx).ok_or_else(|| {
                VfsError::FormatInconsistency(format!(
                    "write at content offset {offset} runs past a {}-cluster chain",
                    chain.len()
                ))
            })?;
            let chunk = (data.len() - done).min((cluster_size - in_cluster) as usize);
            self.storage.write_at(
                self.sb.cluster_offset(cluster) + in_cluster,
                &data[done..done + chunk],
            )?;
            done += chunk;
            pos += chunk as u64;
        }
        Ok(())
    }

    fn zero_span(&mut self, chain: &[u32], offset: u64, len: u64) -> VfsResult<()> {
        let zeros = vec![0u8; len.min(ZERO_CHUNK as u64) as usize];
        let mut done = 0u64;
        while done < len {
            let chunk = (len - done).min(ZERO_CHUNK as u64) as usize;
            self.write_span(chain, offset + done, &zeros[..chunk])?;
            done += chunk as u64;
        }
        Ok(())
    }

    /// Extends `chain` to `needed` clusters. Nothing is linked unless every cluster
    /// could be allocated.
    fn grow_chain(&mut self, chain: &mut Vec<u32>, needed: usize) -> VfsResult<()> {
        let tail = chain[chain.len() - 1];
        let mut fresh = Vec::with_capacity(needed - chain.len());
        let mut fat = self.fat();
        while chain.len() + fresh.len() < needed {
            match fat.allocate() {
                Ok(cluster) => fresh.push(cluster),
                Err(err) => {
                    for &cluster in &fresh {
                        fat.set_entry(cluster, FatEntry::Free)?;
                    }
                    return Err(err);
                }
            }
        }
        let mut link = Vec::with_capacity(fresh.len() + 1);
        link.push(tail);
        link.extend_from_slice(&fresh);
        fat.build_chain(&link)?;
        debug!(
            "chain {} grew from {} to {needed} clusters",
            chain[0],
            chain.len()
        );
        chain.extend(fresh);
        Ok(())
    }

    /// Writes `data` at `offset` and leaves the entry at exactly `new_size` bytes,
    /// holding exactly the clusters that size needs.
    ///
    /// Order: grow the chain, fill any gap, write data, write the header, release the
    /// excess tail.
    fn store(&mut self, cluster: u32, offset: u64, data: &[u8], new_size: u64) -> VfsResult<()> {
        if new_size > MAX_CONTENT_SIZE {
            return Err(VfsError::StorageExhausted(format!(
                "entry {cluster} would grow to {new_size} bytes"
            )));
        }
        let mut header = self.header(cluster)?;
        let old_size = header.size as u64;
        let needed = clusters_for(new_size, self.sb.cluster_size) as usize;
        let mut chain = self.fat().chain(cluster)?;
        if chain.len() < needed {
            self.grow_chain(&mut chain, needed)?;
        }
        if offset > old_size {
            self.zero_span(&chain, old_size, offset - old_size)?;
        }
        self.write_span(&chain, offset, data)?;
        header.size = new_size as u32;
        self.write_header(&header)?;
        if chain.len() > needed {
            let mut fat = self.fat();
            fat.set_entry(chain[needed - 1], FatEntry::EndOfChain)?;
            let released = fat.clear_chain(chain[needed])?;
            debug!("chain {cluster} shrank to {needed} clusters, released {released}");
        }
        Ok(())
    }

    fn file_header(&mut self, path: &VPath) -> VfsResult<EntryHeader> {
        let cluster = self.resolve(path)?;
        let header = self.header(cluster)?;
        if header.is_dir() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        Ok(header)
    }

    fn create_entry(&mut self, parent: &VPath, name: &str, kind: FileType) -> VfsResult<VPath> {
        validate_name(name)?;
        let parent_cluster = self.resolve(parent)?;
        let parent_header = self.header(parent_cluster)?;
        if !parent_header.is_dir() {
            return Err(VfsError::NotADirectory(parent.to_string()));
        }
        if self.find_child(&parent_header, name)?.is_some() {
            return Err(VfsError::IncorrectName(format!(
                "{name} already exists in {parent}"
            )));
        }
        let path = parent.child(name)?;
        let cluster = self.fat().allocate()?;
        let header = EntryHeader::new(name, kind, cluster)?;
        let pointer = dir::encode_pointer(cluster);
        let end = parent_header.size as u64;
        let linked = self.write_header(&header).and_then(|()| {
            self.store(parent_cluster, end, &pointer, end + pointer.len() as u64)
        });
        if let Err(err) = linked {
            self.fat().set_entry(cluster, FatEntry::Free)?;
            return Err(err);
        }
        debug!("created {kind:?} {path} at cluster {cluster}");
        Ok(path)
    }

    pub fn create_file(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath> {
        self.create_entry(parent, name, FileType::File)
    }

    pub fn create_directory(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath> {
        self.create_entry(parent, name, FileType::Dir)
    }

    /// Removes a file or a whole directory subtree and returns every chain to the pool.
    pub fn remove_file(&mut self, path: &VPath) -> VfsResult<()> {
        let name = path.name().ok_or(VfsError::RootDirectory)?;
        let parent_cluster = self.resolve(&path.parent())?;
        let parent_header = self.header(parent_cluster)?;
        let mut target = self
            .find_child(&parent_header, name)?
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;

        target.state = EntryState::Removed;
        self.write_header(&target)?;

        let blob = self.read_content(&parent_header, 0, parent_header.size as usize)?;
        let blob = dir::without_pointer(&blob, target.cluster)?;
        self.store(parent_cluster, 0, &blob, blob.len() as u64)?;

        let released = self.reclaim(target)?;
        debug!("removed {path}, released {released} clusters");
        Ok(())
    }

    /// Frees the chains of `entry` and everything below it.
    fn reclaim(&mut self, entry: EntryHeader) -> VfsResult<usize> {
        let mut stack = vec![entry];
        let mut released = 0usize;
        while let Some(entry) = stack.pop() {
            if entry.is_dir() {
                let blob = self.read_content(&entry, 0, entry.size as usize)?;
                for cluster in dir::decode_pointers(&blob)? {
                    let mut child = self.header(cluster)?;
                    if child.is_removed() {
                        warn!("skipping removed entry at cluster {cluster} during reclaim");
                        continue;
                    }
                    child.state = EntryState::Removed;
                    self.write_header(&child)?;
                    stack.push(child);
                }
            }
            released += self.fat().clear_chain(entry.cluster)?;
        }
        Ok(released)
    }

    /// Names of the active children of `path`; empty for a file.
    pub fn list_children(&mut self, path: &VPath) -> VfsResult<Vec<String>> {
        let cluster = self.resolve(path)?;
        let header = self.header(cluster)?;
        if !header.is_dir() {
            return Ok(Vec::new());
        }
        Ok(self
            .children(&header)?
            .into_iter()
            .map(|child| child.name)
            .collect())
    }

    pub fn read(&mut self, path: &VPath) -> VfsResult<Vec<u8>> {
        let header = self.file_header(path)?;
        self.read_content(&header, 0, header.size as usize)
    }

    pub fn read_at(&mut self, path: &VPath, from: u64, count: usize) -> VfsResult<Vec<u8>> {
        let header = self.file_header(path)?;
        self.read_content(&header, from, count)
    }

    pub fn read_as_string(&mut self, path: &VPath) -> VfsResult<String> {
        let bytes = self.read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replaces the whole content of the file.
    pub fn write(&mut self, path: &VPath, data: &[u8]) -> VfsResult<()> {
        let header = self.file_header(path)?;
        self.store(header.cluster, 0, data, data.len() as u64)
    }

    pub fn write_str(&mut self, path: &VPath, text: &str) -> VfsResult<()> {
        self.write(path, text.as_bytes())
    }

    /// Overlays `data` at `offset`. The size becomes `max(size, offset + len)`; a gap
    /// past the old end reads back as zeros.
    pub fn write_at(&mut self, path: &VPath, offset: u64, data: &[u8]) -> VfsResult<usize> {
        let header = self.file_header(path)?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset.saturating_add(data.len() as u64);
        let new_size = end.max(header.size as u64);
        self.store(header.cluster, offset, data, new_size)?;
        Ok(data.len())
    }

    pub fn truncate(&mut self, path: &VPath, size: u64) -> VfsResult<()> {
        let header = self.file_header(path)?;
        self.store(header.cluster, size, &[], size)
    }

    pub fn exists(&mut self, path: &VPath) -> VfsResult<bool> {
        match self.resolve(path) {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn is_directory(&mut self, path: &VPath) -> VfsResult<bool> {
        match self.resolve(path) {
            Ok(cluster) => Ok(self.header(cluster)?.is_dir()),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn metadata(&mut self, path: &VPath) -> VfsResult<Metadata> {
        let cluster = self.resolve(path)?;
        let header = self.header(cluster)?;
        Ok(Metadata::new(header.file_type, header.size as u64, header.cluster))
    }

    pub fn free_clusters(&mut self) -> VfsResult<u32> {
        self.fat().free_count()
    }
}

impl<S: ByteStorage> VfsOps for FatFs<S> {
    fn create_file(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath> {
        FatFs::create_file(self, parent, name)
    }

    fn create_directory(&mut self, parent: &VPath, name: &str) -> VfsResult<VPath> {
        FatFs::create_directory(self, parent, name)
    }

    fn remove(&mut self, path: &VPath) -> VfsResult<()> {
        self.remove_file(path)
    }

    fn metadata(&mut self, path: &VPath) -> VfsResult<Metadata> {
        FatFs::metadata(self, path)
    }

    fn read_at(&mut self, path: &VPath, offset: u64, count: usize) -> VfsResult<Vec<u8>> {
        FatFs::read_at(self, path, offset, count)
    }

    fn write_at(&mut self, path: &VPath, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        FatFs::write_at(self, path, offset, buf)
    }

    fn list(&mut self, path: &VPath) -> VfsResult<Vec<String>> {
        self.list_children(path)
    }

    fn truncate(&mut self, path: &VPath, size: u64) -> VfsResult<()> {
        FatFs::truncate(self, path, size)
    }
}
