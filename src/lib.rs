//! fatimg is a FAT style file system emulated inside one host file.
//! For simplicity, no support for permissions, timestamps, or other advanced features.
//!
//! fatimg's linear layout:
//! - Descriptor
//! - Allocation Table (primary)
//! - Allocation Table (mirror)
//! - Data Clusters (cluster 0 holds the directory tree)
//!
//! fatimg's 6 layers (from bottom to top):
//! 1. Block Device: Byte addressed backing store.                   | User implemented (`FileDevice` for host files)
//! 2. Descriptor/Allocation Table: Layout and cluster chains.       | Fs implemented
//! 3. Directory Tree: Named entries with stable ids.                | Fs implemented
//! 4. Path: Resolution of `/` separated paths against the tree.     | Fs implemented
//! 5. File: Moving content in and out of cluster chains.            | Fs implemented
//! 6. FileSystem: The engine, plus the command shell driving it.    | Fs implemented

mod config;
mod block_dev;
mod structs;
mod descriptor;
mod fat;
mod directory;
mod path;
mod file;
mod fs;
mod check;
mod error;
pub mod shell;

pub use block_dev::{BlockDevice, FileDevice};
pub use config::*;
pub use structs::*;
pub use descriptor::*;
pub use fat::AllocationTable;
pub use path::*;
pub use fs::*;
pub use check::CheckReport;
pub use error::FsError as Error;
pub use error::Result;
