//! The directory tree: lookups by id and name, naming policy and the
//! recursive on-disk encoding.
//!
//! Nodes own their children and carry no parent pointer, going up the tree
//! means looking the parent id up from the root again.

use std::collections::HashSet;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::*;
use crate::structs::trim_zero;
use crate::{DirItem, Error, Result};

impl DirItem {
    /// Depth-first search for the node with the given id.
    pub fn find_by_id(&self, id: i32) -> Option<&DirItem> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: i32) -> Option<&mut DirItem> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_id_mut(id))
    }

    pub fn child(&self, name: &str) -> Option<&DirItem> {
        self.children.iter().find(|c| c.name_eq(name))
    }

    pub fn child_dir(&self, name: &str) -> Option<&DirItem> {
        self.children.iter().find(|c| !c.is_file && c.name_eq(name))
    }

    /// Detaches the child with the given id.
    pub fn take_child(&mut self, id: i32) -> Option<DirItem> {
        let pos = self.children.iter().position(|c| c.id == id)?;
        Some(self.children.remove(pos))
    }

    /// Largest id anywhere below and including this node.
    pub fn max_id(&self) -> i32 {
        self.children
            .iter()
            .map(DirItem::max_id)
            .fold(self.id, i32::max)
    }

    /// Number of nodes below and including this node.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DirItem::count).sum::<usize>()
    }

    /// Whether the node `id` is this node or lies somewhere below it.
    pub fn contains(&self, id: i32) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Visits every file of the subtree, together with its path relative to this node.
    pub fn walk_files<'a>(&'a self, prefix: &str, visit: &mut impl FnMut(&str, &'a DirItem)) {
        for child in &self.children {
            let path = format!("{}/{}", prefix, child.name());
            if child.is_file {
                visit(&path, child);
            } else {
                child.walk_files(&path, visit);
            }
        }
    }

    /// Picks a name for a new child based on `name`.
    /// While a sibling already uses the candidate, a counter is inserted
    /// in front of the last extension: `a.txt`, `a1.txt`, `a2.txt`...
    /// The entry `ignore` does not count as a sibling.
    pub fn unique_name(&self, name: &str, ignore: Option<i32>) -> String {
        let taken = |candidate: &str| {
            self.children
                .iter()
                .any(|c| Some(c.id) != ignore && c.name_eq(candidate))
        };
        if !taken(name) {
            return name.to_string();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) => name.split_at(dot),
            None => (name, ""),
        };
        (1..)
            .map(|counter| format!("{}{}{}", stem, counter, ext))
            .find(|candidate| !taken(candidate))
            .unwrap_or_default()
    }

    /// Writes the subtree in pre-order, each node followed by its children.
    pub fn encode(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&self.name)?;
        out.write_u8(self.is_file as u8)?;
        out.write_i32::<LittleEndian>(self.size)?;
        out.write_i32::<LittleEndian>(self.start_cluster)?;
        out.write_i32::<LittleEndian>(self.parent_id)?;
        out.write_i32::<LittleEndian>(self.id)?;
        out.write_u64::<LittleEndian>(self.children.len() as u64)?;
        for child in &self.children {
            child.encode(out)?;
        }
        Ok(())
    }

    /// Reads back a tree written by `encode`, starting with its root.
    pub fn decode(input: &mut impl Read) -> Result<Self> {
        let mut remaining = MAX_DIR_ITEMS;
        let mut seen = HashSet::new();
        let root = decode_item(input, &mut remaining, &mut seen)?;
        if root.is_file || root.parent_id != NO_PARENT || root.id != ROOT_ID {
            return Err(Error::CorruptedImage("invalid root directory".to_string()));
        }
        Ok(root)
    }
}

fn corrupted(what: &str) -> Error {
    Error::CorruptedImage(format!("directory table: {}", what))
}

fn decode_item(
    input: &mut impl Read,
    remaining: &mut usize,
    seen: &mut HashSet<i32>,
) -> Result<DirItem> {
    if *remaining == 0 {
        return Err(corrupted("too many entries"));
    }
    *remaining -= 1;

    let eof = |_: std::io::Error| corrupted("truncated record");
    let mut name = [0; NAME_FIELD_LEN];
    input.read_exact(&mut name).map_err(eof)?;
    let is_file = match input.read_u8().map_err(eof)? {
        0 => false,
        1 => true,
        _ => return Err(corrupted("bad entry kind")),
    };
    let size = input.read_i32::<LittleEndian>().map_err(eof)?;
    let start_cluster = input.read_i32::<LittleEndian>().map_err(eof)?;
    let parent_id = input.read_i32::<LittleEndian>().map_err(eof)?;
    let id = input.read_i32::<LittleEndian>().map_err(eof)?;
    let child_count = input.read_u64::<LittleEndian>().map_err(eof)?;

    if trim_zero(&name).is_empty() || name[NAME_FIELD_LEN - 1] != 0 {
        return Err(corrupted("bad entry name"));
    }
    if id < 0 || parent_id < NO_PARENT || size < 0 {
        return Err(corrupted("bad entry header"));
    }
    if child_count > *remaining as u64 || (is_file && child_count > 0) {
        return Err(corrupted("bad child count"));
    }
    if !seen.insert(id) {
        return Err(corrupted("duplicate entry id"));
    }

    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let child = decode_item(input, remaining, seen)?;
        if child.parent_id != id {
            return Err(corrupted("child does not point back to its parent"));
        }
        children.push(child);
    }

    Ok(DirItem {
        name,
        is_file,
        size,
        start_cluster,
        parent_id,
        id,
        children,
    })
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn sample_tree() -> DirItem {
        let mut root = DirItem::root();
        let mut docs = DirItem::new_dir("docs", 1, ROOT_ID).unwrap();
        docs.children
            .push(DirItem::new_file("a.txt", 3, 1, 5000, 1).unwrap());
        root.children.push(docs);
        root.children
            .push(DirItem::new_file("b", 2, ROOT_ID, 0, NO_CLUSTER).unwrap());
        root
    }

    #[test]
    fn test_find_by_id() {
        let mut root = sample_tree();
        assert_eq!(root.find_by_id(3).unwrap().name(), "a.txt");
        assert_eq!(root.find_by_id(0).unwrap().name(), "/");
        assert!(root.find_by_id(9).is_none());
        root.find_by_id_mut(3).unwrap().size = 7;
        assert_eq!(root.find_by_id(3).unwrap().size, 7);
        assert_eq!(root.max_id(), 3);
        assert_eq!(root.count(), 4);
        assert!(root.find_by_id(1).unwrap().contains(3));
        assert!(!root.find_by_id(1).unwrap().contains(2));
    }

    #[test]
    fn test_unique_name() {
        let mut dir = DirItem::root();
        assert_eq!(dir.unique_name("a.txt", None), "a.txt");
        dir.children.push(DirItem::new_file("a.txt", 1, 0, 0, -1).unwrap());
        assert_eq!(dir.unique_name("a.txt", None), "a1.txt");
        dir.children.push(DirItem::new_file("a1.txt", 2, 0, 0, -1).unwrap());
        assert_eq!(dir.unique_name("a.txt", None), "a2.txt");
        assert_eq!(dir.unique_name("a.txt", Some(1)), "a.txt");
        dir.children.push(DirItem::new_dir("notes", 3, 0).unwrap());
        assert_eq!(dir.unique_name("notes", None), "notes1");
        assert_eq!(dir.unique_name("b.tar.gz", None), "b.tar.gz");
    }

    #[test]
    fn test_walk_files() {
        let root = sample_tree();
        let mut seen = Vec::new();
        root.walk_files("", &mut |path, item| seen.push((path.to_string(), item.id)));
        assert_eq!(seen, vec![("/docs/a.txt".to_string(), 3), ("/b".to_string(), 2)]);
    }

    #[test]
    fn test_codec() {
        let root = sample_tree();
        let mut buf = Vec::new();
        root.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), root.count() * DIR_RECORD_SIZE);
        let decoded = DirItem::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, root);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let zeros = vec![0u8; CLUSTER_SIZE];
        assert!(matches!(
            DirItem::decode(&mut Cursor::new(&zeros)),
            Err(Error::CorruptedImage(_))
        ));

        let root = sample_tree();
        let mut buf = Vec::new();
        root.encode(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(matches!(
            DirItem::decode(&mut Cursor::new(&buf)),
            Err(Error::CorruptedImage(_))
        ));
    }

    #[test]
    fn test_decode_rejects_duplicate_ids() {
        let mut root = sample_tree();
        root.children
            .push(DirItem::new_file("c", 3, ROOT_ID, 0, NO_CLUSTER).unwrap());
        let mut buf = Vec::new();
        root.encode(&mut buf).unwrap();
        assert!(matches!(
            DirItem::decode(&mut Cursor::new(&buf)),
            Err(Error::CorruptedImage(_))
        ));
    }
}
