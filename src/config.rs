pub const SIGNATURE: &[u8; SIGNATURE_LEN] = b"fatimg\0\0\0";
pub const SIGNATURE_LEN: usize = 9;

pub const CLUSTER_SIZE: usize = 4096;
pub const FAT_ENTRY_SIZE: usize = 4; // i32 per cluster
pub const DESCRIPTOR_SIZE: usize = 44; // signature + 3 bytes padding + 8 * i32

// Allocation table sentinels, kept far away from any valid cluster index.
pub const FAT_UNUSED: i32 = i32::MAX - 1;
pub const FAT_FILE_END: i32 = i32::MAX - 2;
pub const FAT_BAD_CLUSTER: i32 = i32::MAX - 3;

/// Cluster 0 is never handed out, its byte range holds the directory tree.
pub const FIRST_DATA_CLUSTER: usize = 1;

pub const ROOT_ID: i32 = 0;
pub const ROOT_NAME: &str = "/";
pub const NO_PARENT: i32 = -1;
pub const NO_CLUSTER: i32 = -1;

pub const NAME_FIELD_LEN: usize = 12; // 11 visible bytes + NUL
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;
/// name + is_file + size + start_cluster + parent_id + id + child_count
pub const DIR_RECORD_SIZE: usize = NAME_FIELD_LEN + 1 + 4 * 4 + 8;
/// The serialized tree has to fit in the metadata cluster.
pub const MAX_DIR_ITEMS: usize = CLUSTER_SIZE / DIR_RECORD_SIZE;

pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";
