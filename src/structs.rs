use crate::config::*;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub signature: [u8; SIGNATURE_LEN], // Identifies the image format
    pub disk_size: i32,                 // Total capacity in bytes
    pub cluster_size: i32,              // Fixed to CLUSTER_SIZE
    pub cluster_count: i32,             // disk_size / cluster_size
    pub fat_count: i32,                 // Entries per allocation table, equals cluster_count

    pub fat1_start: i32, // Byte offset of the primary allocation table
    pub fat2_start: i32, // Byte offset of the mirror allocation table
    pub data_start: i32, // Byte offset of cluster 0
    pub dir_start: i32,  // Byte offset of the directory tree, equals data_start
}

/// One entry of the directory tree.
/// Directories own their children, files never have any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: [u8; NAME_FIELD_LEN],
    pub is_file: bool,
    pub size: i32,
    pub start_cluster: i32,
    pub parent_id: i32,
    pub id: i32,
    pub children: Vec<DirItem>,
}

pub fn trim_zero(name: &[u8]) -> &[u8] {
    let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    &name[..end]
}

/// Checks a user supplied entry name and packs it into the fixed name field.
pub fn encode_name(name: &str) -> Result<[u8; NAME_FIELD_LEN]> {
    if name.is_empty() || name == DOT_NAME || name == DOTDOT_NAME {
        return Err(Error::InvalidName(name.to_string()));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong(name.to_string()));
    }
    let mut field = [0; NAME_FIELD_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

impl DirItem {
    pub fn root() -> Self {
        let mut name = [0; NAME_FIELD_LEN];
        name[..ROOT_NAME.len()].copy_from_slice(ROOT_NAME.as_bytes());
        Self {
            name,
            is_file: false,
            size: 0,
            start_cluster: NO_CLUSTER,
            parent_id: NO_PARENT,
            id: ROOT_ID,
            children: Vec::new(),
        }
    }

    pub fn new_dir(name: &str, id: i32, parent_id: i32) -> Result<Self> {
        Ok(Self {
            name: encode_name(name)?,
            is_file: false,
            size: 0,
            start_cluster: NO_CLUSTER,
            parent_id,
            id,
            children: Vec::new(),
        })
    }

    pub fn new_file(name: &str, id: i32, parent_id: i32, size: i32, start_cluster: i32) -> Result<Self> {
        Ok(Self {
            name: encode_name(name)?,
            is_file: true,
            size,
            start_cluster,
            parent_id,
            id,
            children: Vec::new(),
        })
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(trim_zero(&self.name)).into_owned()
    }

    pub fn name_eq(&self, name: &str) -> bool {
        trim_zero(&self.name) == name.as_bytes()
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.name = encode_name(name)?;
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == NO_PARENT
    }
}
