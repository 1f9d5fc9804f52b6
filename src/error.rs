use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Invalid size: {0}")]
    InvalidSize(String),
    #[error("Cannot create file system: {0}")]
    CannotCreateImage(std::io::Error),
    #[error("Not enough space")]
    OutOfSpace,
    #[error("Path not found: {0}")]
    NoSuchPath(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("Directory is not empty: {0}")]
    NotEmpty(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Name too long (max 11 characters): {0}")]
    NameTooLong(String),
    #[error("Invalid name: {0:?}")]
    InvalidName(String),
    #[error("File system is corrupted: {0}")]
    CorruptedImage(String),
    #[error("Invalid file system signature")]
    InvalidSignature,
    #[error("Directory table is full")]
    DirectoryFull,
    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),
    #[error("Unable to corrupt the file: {0} has no clusters")]
    NothingToCorrupt(String),
    #[error("Cluster chain starting at {0} does not terminate")]
    CyclicChain(i32),
    #[error("Cannot move {0} into itself")]
    InvalidMove(String),
    #[error("File system is not formatted, use 'format <size>'")]
    Unformatted,
    #[error("{path}: {source}")]
    HostIo {
        path: String,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FsError>;
