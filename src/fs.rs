use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::*;
use crate::descriptor::{parse_size, read_descriptor};
use crate::file::{clusters_for, fcopy, fread, fwrite};
use crate::path::{absolute_path, parent_and_leaf, resolve, split};
use crate::structs::encode_name;
use crate::{AllocationTable, BlockDevice, Descriptor, DirItem, Error, Result};

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub is_file: bool,
    pub size: i32,
}

impl fmt::Display for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_file {
            write!(f, "F {} ({} bytes)", self.name, self.size)
        } else {
            write!(f, "D {}", self.name)
        }
    }
}

/// An entry together with the clusters holding its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub name: String,
    pub is_file: bool,
    pub size: i32,
    pub clusters: Vec<i32>,
}

impl fmt::Display for ItemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for cluster in &self.clusters {
            write!(f, " {}", cluster)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub disk_size: i32,
    pub cluster_size: i32,
    pub cluster_count: i32,
    pub free_clusters: usize,
    pub entries: usize,
}

/// A mounted image.
///
/// The whole metadata (descriptor, both allocation tables and the directory
/// tree) lives in memory. Every mutating operation rewrites it in full,
/// read-only operations never touch it on disk.
/// Operations directly work on the instance, wrap a lock around it if it has
/// to be shared.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    pub(crate) device: Arc<D>,
    pub(crate) desc: Descriptor,
    pub(crate) fat1: AllocationTable,
    pub(crate) fat2: AllocationTable,
    pub(crate) root: DirItem,
    pub(crate) next_id: i32,
    pub(crate) cwd: i32,
    pub(crate) corrupted: bool,
}

fn creation_error(e: Error) -> Error {
    match e {
        Error::Io(io) => Error::CannotCreateImage(io),
        other => other,
    }
}

fn host_error(path: &Path) -> impl Fn(std::io::Error) -> Error + '_ {
    move |source| Error::HostIo {
        path: path.display().to_string(),
        source,
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Wipes the device and lays out a fresh image of the given size,
    /// e.g. `10MB`. Whatever the device held before is gone.
    /// Only an `InvalidSize` failure leaves the device untouched.
    pub fn format(device: Arc<D>, size: &str) -> Result<Self> {
        let disk_size = parse_size(size)?;
        let desc = Descriptor::new(disk_size)?;
        device.reset(disk_size as u64).map_err(creation_error)?;

        let mut fs = Self {
            device,
            desc,
            fat1: AllocationTable::new(desc.fat_count as usize),
            fat2: AllocationTable::new(desc.fat_count as usize),
            root: DirItem::root(),
            next_id: ROOT_ID + 1,
            cwd: ROOT_ID,
            corrupted: false,
        };
        fs.save().map_err(creation_error)?;
        log::info!(
            "formatted {} bytes, {} clusters of {} bytes",
            desc.disk_size,
            desc.cluster_count,
            desc.cluster_size
        );
        Ok(fs)
    }

    /// Loads an existing image and runs the consistency check on it.
    pub fn mount(device: Arc<D>) -> Result<Self> {
        let desc = read_descriptor(&*device)?;
        let count = desc.fat_count as usize;

        let mut buf = vec![0u8; count * FAT_ENTRY_SIZE];
        device.read_at(desc.fat1_start as u64, &mut buf)?;
        let fat1 = AllocationTable::decode(&mut Cursor::new(&buf), count)?;
        device.read_at(desc.fat2_start as u64, &mut buf)?;
        let fat2 = AllocationTable::decode(&mut Cursor::new(&buf), count)?;

        let mut dir_buf = vec![0u8; CLUSTER_SIZE];
        device.read_at(desc.dir_start as u64, &mut dir_buf)?;
        let root = DirItem::decode(&mut Cursor::new(&dir_buf))?;

        let mut fs = Self {
            device,
            desc,
            fat1,
            fat2,
            next_id: root.max_id() + 1,
            root,
            cwd: ROOT_ID,
            corrupted: false,
        };
        log::info!(
            "mounted {} bytes, {} clusters, {} entries",
            desc.disk_size,
            desc.cluster_count,
            fs.root.count()
        );
        fs.check();
        Ok(fs)
    }

    /// Writes the descriptor, both tables and the tree back to the device.
    /// The mirror table is refreshed from the primary one first.
    pub fn save(&mut self) -> Result<()> {
        self.fat2 = self.fat1.clone();

        let mut buf = Vec::with_capacity(self.desc.dir_start as usize + CLUSTER_SIZE);
        self.desc.encode(&mut buf)?;
        self.fat1.encode(&mut buf)?;
        self.fat2.encode(&mut buf)?;
        debug_assert_eq!(buf.len(), self.desc.dir_start as usize);
        self.root.encode(&mut buf)?;
        if buf.len() - self.desc.dir_start as usize > CLUSTER_SIZE {
            return Err(Error::DirectoryFull);
        }

        self.device.write_at(0, &buf)?;
        self.device.flush()?;
        Ok(())
    }

    fn alloc_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Absolute paths are walked from the root, everything else from the
    /// current directory.
    fn context(&self, path: &str) -> i32 {
        if path.starts_with('/') { ROOT_ID } else { self.cwd }
    }

    fn node(&self, id: i32) -> Result<&DirItem> {
        self.root
            .find_by_id(id)
            .ok_or_else(|| Error::CorruptedImage(format!("dangling entry id {}", id)))
    }

    fn node_mut(&mut self, id: i32) -> Result<&mut DirItem> {
        self.root
            .find_by_id_mut(id)
            .ok_or_else(|| Error::CorruptedImage(format!("dangling entry id {}", id)))
    }

    /// The tree has to stay small enough for the metadata cluster.
    fn ensure_room(&self, extra: usize) -> Result<()> {
        if self.root.count() + extra > MAX_DIR_ITEMS {
            return Err(Error::DirectoryFull);
        }
        Ok(())
    }

    /// Finds the id of an existing entry, file or directory.
    fn locate(&self, path: &str) -> Result<i32> {
        let ctx = self.context(path);
        let (parent, leaf) = parent_and_leaf(&self.root, ctx, path)
            .ok_or_else(|| Error::NoSuchPath(path.to_string()))?;
        if leaf.is_empty() || leaf == DOT_NAME || leaf == DOTDOT_NAME {
            return resolve(&self.root, ctx, path)
                .ok_or_else(|| Error::NoSuchPath(path.to_string()));
        }
        self.node(parent)?
            .child(leaf)
            .map(|c| c.id)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))
    }

    pub(crate) fn locate_file(&self, path: &str) -> Result<&DirItem> {
        let node = self.node(self.locate(path)?)?;
        if !node.is_file {
            return Err(Error::NotAFile(path.to_string()));
        }
        Ok(node)
    }

    /// Works out where an entry copied or moved to `dest` ends up.
    /// A path naming an existing directory, ending in `/` or empty puts the
    /// entry inside that directory under `default_name`, otherwise the last
    /// segment is the new name.
    fn destination(&self, dest: &str, default_name: &str) -> Result<(i32, String)> {
        let ctx = self.context(dest);
        let parts = split(dest);
        let Some(&last) = parts.last() else {
            return Ok((ctx, default_name.to_string()));
        };
        if let Some(dir) = resolve(&self.root, ctx, dest) {
            return Ok((dir, default_name.to_string()));
        }
        if dest.ends_with('/') || last == DOT_NAME || last == DOTDOT_NAME {
            return Err(Error::NoSuchPath(dest.to_string()));
        }
        let (parent, leaf) = parent_and_leaf(&self.root, ctx, dest)
            .ok_or_else(|| Error::NoSuchPath(dest.to_string()))?;
        Ok((parent, leaf.to_string()))
    }

    pub fn mkdir(&mut self, path: &str) -> Result<i32> {
        let ctx = self.context(path);
        let (parent, name) = parent_and_leaf(&self.root, ctx, path)
            .ok_or_else(|| Error::NoSuchPath(path.to_string()))?;
        encode_name(name)?;
        if self.node(parent)?.child(name).is_some() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        self.ensure_room(1)?;

        let id = self.alloc_id();
        let dir = DirItem::new_dir(name, id, parent)?;
        self.node_mut(parent)?.children.push(dir);
        self.save()?;
        log::debug!("mkdir {} -> id {}", path, id);
        Ok(id)
    }

    /// Removes an empty directory.
    /// Removing the current directory moves the current directory to its parent.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let id = self.locate(path)?;
        let node = self.node(id)?;
        if node.is_root() {
            return Err(Error::InvalidName(path.to_string()));
        }
        if node.is_file {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if !node.children.is_empty() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        let parent = node.parent_id;
        self.node_mut(parent)?.take_child(id);
        if self.cwd == id {
            self.cwd = parent;
        }
        self.save()?;
        log::debug!("rmdir {} (id {})", path, id);
        Ok(())
    }

    /// Removes a file and hands its clusters back to the allocation table.
    pub fn rm(&mut self, path: &str) -> Result<()> {
        let node = self.locate_file(path)?;
        let (id, parent, start) = (node.id, node.parent_id, node.start_cluster);
        let released = self.fat1.release_chain(start);
        self.node_mut(parent)?.take_child(id);
        self.save()?;
        log::debug!("rm {} (id {}), released {} clusters", path, id, released);
        Ok(())
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.cwd = resolve(&self.root, self.context(path), path)
            .ok_or_else(|| Error::DirectoryNotFound(path.to_string()))?;
        Ok(())
    }

    pub fn pwd(&self) -> String {
        absolute_path(&self.root, self.cwd).unwrap_or_else(|| ROOT_NAME.to_string())
    }

    /// Lists a directory, the current one without a path.
    pub fn ls(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        let id = match path {
            None => self.cwd,
            Some(path) => resolve(&self.root, self.context(path), path)
                .ok_or_else(|| Error::DirectoryNotFound(path.to_string()))?,
        };
        Ok(self
            .node(id)?
            .children
            .iter()
            .map(|c| ListEntry {
                name: c.name(),
                is_file: c.is_file,
                size: c.size,
            })
            .collect())
    }

    /// Copies a host file into the image.
    pub fn copy_in(&mut self, host_path: impl AsRef<Path>, dest: &str) -> Result<i32> {
        let host_path = host_path.as_ref();
        let host = File::open(host_path).map_err(host_error(host_path))?;
        let meta = host.metadata().map_err(host_error(host_path))?;
        if !meta.is_file() {
            let source = std::io::Error::new(ErrorKind::InvalidInput, "not a regular file");
            return Err(host_error(host_path)(source));
        }
        let size = meta.len();
        if size > i32::MAX as u64 {
            return Err(Error::FileTooLarge(size));
        }
        let host_name = host_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (parent, name) = self.destination(dest, &host_name)?;
        let name = self.node(parent)?.unique_name(&name, None);
        encode_name(&name)?;
        self.ensure_room(1)?;

        let clusters = self.fat1.allocate_chain(clusters_for(size))?;
        let mut reader = BufReader::new(host);
        if let Err(e) = fwrite(
            &*self.device,
            &self.desc,
            &clusters,
            &mut reader,
            host_error(host_path),
        ) {
            if let Some(&first) = clusters.first() {
                self.fat1.release_chain(first);
            }
            return Err(e);
        }

        let id = self.alloc_id();
        let start = clusters.first().copied().unwrap_or(NO_CLUSTER);
        let file = DirItem::new_file(&name, id, parent, size as i32, start)?;
        self.node_mut(parent)?.children.push(file);
        self.save()?;
        log::debug!(
            "incp {} -> {} (id {}), {} bytes in {} clusters",
            host_path.display(),
            name,
            id,
            size,
            clusters.len()
        );
        Ok(id)
    }

    /// Copies a file of the image out to the host.
    /// The host file is only created once the whole content has been read.
    pub fn copy_out(&self, src: &str, host_path: impl AsRef<Path>) -> Result<()> {
        let host_path = host_path.as_ref();
        let data = self.cat(src)?;
        let host = File::create(host_path).map_err(host_error(host_path))?;
        let mut writer = BufWriter::new(host);
        writer.write_all(&data).map_err(host_error(host_path))?;
        writer.flush().map_err(host_error(host_path))?;
        log::debug!("outcp {} -> {}, {} bytes", src, host_path.display(), data.len());
        Ok(())
    }

    /// Reads the whole content of a file.
    pub fn cat(&self, path: &str) -> Result<Vec<u8>> {
        let node = self.locate_file(path)?;
        let clusters = self.fat1.chain(node.start_cluster)?;
        let mut data = Vec::with_capacity(node.size as usize);
        fread(&*self.device, &self.desc, &clusters, node.size as usize, &mut data)?;
        Ok(data)
    }

    /// Duplicates a file inside the image, content included.
    pub fn copy(&mut self, src: &str, dest: &str) -> Result<i32> {
        let node = self.locate_file(src)?;
        let (size, start, src_name) = (node.size, node.start_cluster, node.name());
        let (parent, name) = self.destination(dest, &src_name)?;
        let name = self.node(parent)?.unique_name(&name, None);
        encode_name(&name)?;
        self.ensure_room(1)?;

        let needed = clusters_for(size as u64);
        let from = self.fat1.chain(start)?;
        if from.len() < needed {
            return Err(Error::CorruptedImage(format!("{}: cluster chain too short", src)));
        }
        let to = self.fat1.allocate_chain(needed)?;
        if let Err(e) = fcopy(&*self.device, &self.desc, &from[..needed], &to) {
            if let Some(&first) = to.first() {
                self.fat1.release_chain(first);
            }
            return Err(e);
        }

        let id = self.alloc_id();
        let start = to.first().copied().unwrap_or(NO_CLUSTER);
        let file = DirItem::new_file(&name, id, parent, size, start)?;
        self.node_mut(parent)?.children.push(file);
        self.save()?;
        log::debug!("cp {} -> {} (id {})", src, name, id);
        Ok(id)
    }

    /// Relinks an entry under a new parent and/or name.
    /// Its id and its clusters stay the same.
    pub fn mv(&mut self, src: &str, dest: &str) -> Result<()> {
        let id = self.locate(src)?;
        let node = self.node(id)?;
        if node.is_root() {
            return Err(Error::InvalidMove(src.to_string()));
        }
        let (old_parent, src_name) = (node.parent_id, node.name());
        let (parent, name) = self.destination(dest, &src_name)?;
        if node.contains(parent) {
            return Err(Error::InvalidMove(src.to_string()));
        }
        let name = self.node(parent)?.unique_name(&name, Some(id));
        encode_name(&name)?;

        let mut item = self
            .node_mut(old_parent)?
            .take_child(id)
            .ok_or_else(|| Error::FileNotFound(src.to_string()))?;
        item.parent_id = parent;
        item.set_name(&name)?;
        self.node_mut(parent)?.children.push(item);
        self.save()?;
        log::debug!("mv {} -> {} (id {})", src, name, id);
        Ok(())
    }

    /// Name of an entry and the clusters of its chain in order.
    /// Directories and empty files have no clusters.
    pub fn info(&self, path: &str) -> Result<ItemInfo> {
        let node = self.node(self.locate(path)?)?;
        let clusters = if node.is_file {
            self.fat1.chain(node.start_cluster)?
        } else {
            Vec::new()
        };
        Ok(ItemInfo {
            name: node.name(),
            is_file: node.is_file,
            size: node.size,
            clusters,
        })
    }

    pub fn stats(&self) -> Stats {
        Stats {
            disk_size: self.desc.disk_size,
            cluster_size: self.desc.cluster_size,
            cluster_count: self.desc.cluster_count,
            free_clusters: self.fat1.free_count(),
            entries: self.root.count(),
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    /// The primary allocation table, the only one operations consult.
    pub fn fat(&self) -> &AllocationTable {
        &self.fat1
    }

    /// The mirror table as last saved or loaded.
    pub fn mirror_fat(&self) -> &AllocationTable {
        &self.fat2
    }

    pub fn root(&self) -> &DirItem {
        &self.root
    }

    pub fn cwd(&self) -> i32 {
        self.cwd
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    pub fn device(&self) -> Arc<D> {
        Arc::clone(&self.device)
    }
}
