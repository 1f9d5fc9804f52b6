//! The allocation table.
//! Every cluster has one entry: the index of the next cluster of its chain,
//! or one of the UNUSED / FILE_END / BAD_CLUSTER sentinels.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::*;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTable {
    entries: Vec<i32>,
}

impl AllocationTable {
    /// A table of `count` entries, all of them unused.
    pub fn new(count: usize) -> Self {
        Self {
            entries: vec![FAT_UNUSED; count],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    pub fn get(&self, cluster: i32) -> Option<i32> {
        self.index(cluster).map(|i| self.entries[i])
    }

    pub fn set(&mut self, cluster: i32, value: i32) -> Result<()> {
        let i = self
            .index(cluster)
            .ok_or_else(|| Error::CorruptedImage(format!("cluster {} out of range", cluster)))?;
        self.entries[i] = value;
        Ok(())
    }

    fn index(&self, cluster: i32) -> Option<usize> {
        usize::try_from(cluster).ok().filter(|&i| i < self.entries.len())
    }

    /// Whether `cluster` is an index a chain may continue with.
    fn is_link(&self, cluster: i32) -> bool {
        self.index(cluster).is_some()
    }

    /// Finds the first unused cluster, starting at index 1,
    /// and marks it as the end of a chain.
    pub fn allocate_cluster(&mut self) -> Result<i32> {
        let found = self
            .entries
            .iter()
            .skip(FIRST_DATA_CLUSTER)
            .position(|&e| e == FAT_UNUSED)
            .map(|p| p + FIRST_DATA_CLUSTER)
            .ok_or(Error::OutOfSpace)?;
        self.entries[found] = FAT_FILE_END;
        Ok(found as i32)
    }

    /// Allocates `count` clusters and links them into one chain.
    /// Either all of them are allocated or none:
    /// on failure the clusters taken so far are handed back.
    pub fn allocate_chain(&mut self, count: usize) -> Result<Vec<i32>> {
        let mut clusters = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate_cluster() {
                Ok(cluster) => clusters.push(cluster),
                Err(e) => {
                    for &cluster in &clusters {
                        self.entries[cluster as usize] = FAT_UNUSED;
                    }
                    log::debug!("allocate_chain: rolled back {} clusters", clusters.len());
                    return Err(e);
                }
            }
        }
        for pair in clusters.windows(2) {
            self.entries[pair[0] as usize] = pair[1];
        }
        Ok(clusters)
    }

    /// Returns the clusters of the chain starting at `start`, in order.
    /// A chain that starts at UNUSED or out of range is empty.
    /// The walk stops at FILE_END or any other sentinel, and gives up with
    /// `CyclicChain` after visiting more clusters than the table holds.
    pub fn chain(&self, start: i32) -> Result<Vec<i32>> {
        let mut clusters = Vec::new();
        if self.get(start).is_none_or(|e| e == FAT_UNUSED) {
            return Ok(clusters);
        }
        let mut current = start;
        while self.is_link(current) {
            if clusters.len() >= self.entries.len() {
                return Err(Error::CyclicChain(start));
            }
            clusters.push(current);
            current = self.entries[current as usize];
        }
        Ok(clusters)
    }

    /// Marks every cluster of the chain as unused.
    /// Returns how many clusters were released.
    pub fn release_chain(&mut self, start: i32) -> usize {
        let mut released = 0;
        let mut current = start;
        while self.is_link(current) && released < self.entries.len() {
            let next = self.entries[current as usize];
            if next == FAT_UNUSED {
                break;
            }
            self.entries[current as usize] = FAT_UNUSED;
            released += 1;
            current = next;
        }
        released
    }

    /// Simulates a single point of corruption: only the first entry of the chain
    /// is overwritten, the rest of the links stay as they were.
    pub fn mark_bad(&mut self, start: i32) -> Result<()> {
        match self.get(start) {
            Some(e) if e != FAT_UNUSED => {
                self.entries[start as usize] = FAT_BAD_CLUSTER;
                Ok(())
            }
            _ => Err(Error::CorruptedImage(format!("cluster {} is not allocated", start))),
        }
    }

    /// Whether the chain starting at `start` passes through a bad cluster.
    pub fn chain_has_bad(&self, start: i32) -> Result<bool> {
        let mut visited = 0;
        let mut current = start;
        while self.is_link(current) {
            if visited >= self.entries.len() {
                return Err(Error::CyclicChain(start));
            }
            let next = self.entries[current as usize];
            if next == FAT_BAD_CLUSTER {
                return Ok(true);
            }
            visited += 1;
            current = next;
        }
        Ok(false)
    }

    /// Clusters still available to `allocate_cluster`.
    pub fn free_count(&self) -> usize {
        self.entries
            .iter()
            .skip(FIRST_DATA_CLUSTER)
            .filter(|&&e| e == FAT_UNUSED)
            .count()
    }

    pub fn encode(&self, out: &mut impl Write) -> Result<()> {
        for &entry in &self.entries {
            out.write_i32::<LittleEndian>(entry)?;
        }
        Ok(())
    }

    pub fn decode(input: &mut impl Read, count: usize) -> Result<Self> {
        let mut entries = vec![0; count];
        input.read_i32_into::<LittleEndian>(&mut entries)?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_allocate_skips_cluster_zero() {
        let mut fat = AllocationTable::new(4);
        assert_eq!(fat.allocate_cluster().unwrap(), 1);
        assert_eq!(fat.allocate_cluster().unwrap(), 2);
        assert_eq!(fat.allocate_cluster().unwrap(), 3);
        assert!(matches!(fat.allocate_cluster(), Err(Error::OutOfSpace)));
        assert_eq!(fat.get(0), Some(FAT_UNUSED));
        assert_eq!(fat.get(3), Some(FAT_FILE_END));
    }

    #[test]
    fn test_chain_links() {
        let mut fat = AllocationTable::new(8);
        let chain = fat.allocate_chain(3).unwrap();
        assert_eq!(chain, vec![1, 2, 3]);
        assert_eq!(fat.get(1), Some(2));
        assert_eq!(fat.get(2), Some(3));
        assert_eq!(fat.get(3), Some(FAT_FILE_END));
        assert_eq!(fat.chain(1).unwrap(), chain);
        assert_eq!(fat.free_count(), 4);

        assert_eq!(fat.release_chain(1), 3);
        assert_eq!(fat.free_count(), 7);
        assert!(fat.chain(1).unwrap().is_empty());
    }

    #[test]
    fn test_allocate_chain_rolls_back() {
        let mut fat = AllocationTable::new(4);
        fat.allocate_cluster().unwrap();
        assert!(matches!(fat.allocate_chain(3), Err(Error::OutOfSpace)));
        assert_eq!(fat.free_count(), 2);
        assert_eq!(fat.allocate_chain(2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_empty_chains() {
        let fat = AllocationTable::new(4);
        assert!(fat.chain(NO_CLUSTER).unwrap().is_empty());
        assert!(fat.chain(2).unwrap().is_empty());
        assert!(fat.chain(100).unwrap().is_empty());
    }

    #[test]
    fn test_mark_bad() {
        let mut fat = AllocationTable::new(8);
        fat.allocate_chain(3).unwrap();
        assert!(!fat.chain_has_bad(1).unwrap());
        fat.mark_bad(1).unwrap();
        assert_eq!(fat.get(1), Some(FAT_BAD_CLUSTER));
        assert_eq!(fat.get(2), Some(3));
        assert!(fat.chain_has_bad(1).unwrap());
        // The link to the rest of the chain is lost.
        assert_eq!(fat.chain(1).unwrap(), vec![1]);
        assert!(fat.mark_bad(5).is_err());
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut fat = AllocationTable::new(4);
        fat.allocate_chain(2).unwrap();
        fat.set(2, 1).unwrap();
        assert!(matches!(fat.chain(1), Err(Error::CyclicChain(1))));
        assert!(matches!(fat.chain_has_bad(1), Err(Error::CyclicChain(1))));
        // release terminates as well
        assert_eq!(fat.release_chain(1), 2);
    }

    #[test]
    fn test_codec() {
        let mut fat = AllocationTable::new(16);
        fat.allocate_chain(5).unwrap();
        fat.mark_bad(1).unwrap();
        let mut buf = Vec::new();
        fat.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 16 * FAT_ENTRY_SIZE);
        let decoded = AllocationTable::decode(&mut Cursor::new(buf), 16).unwrap();
        assert_eq!(decoded, fat);
    }
}
