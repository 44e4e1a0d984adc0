mod acl;
mod authn;
mod extensible;
mod inode;
mod pool;
mod registry;
mod security;
mod types;
mod urls;

pub use acl::*;
pub use authn::*;
pub use extensible::*;
pub use inode::*;
pub use pool::*;
pub use registry::*;
pub use security::*;
pub use types::*;
pub use urls::*;

use thiserror::Error;

#[macro_use]
extern crate log;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("is the current working directory: {0}")]
    IsCwd(String),
    #[error("too many symbolic links: {0}")]
    TooManySymlinks(String),
    #[error("bad operation: {0}")]
    BadOperation(String),
    #[error("no replicas: {0}")]
    NoReplicas(String),
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("no factory registered: {0}")]
    NoFactory(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("db error: {0}")]
    DbError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fieldless mirror of [`NsError`], handy for matching without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidValue,
    AlreadyExists,
    IsDirectory,
    NotDirectory,
    IsCwd,
    TooManySymlinks,
    BadOperation,
    NoReplicas,
    ResourceUnavailable,
    InvalidState,
    NoFactory,
    NotImplemented,
    UnknownOption,
    DbError,
    IoError,
    Internal,
}

impl NsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NsError::NotFound(_) => ErrorKind::NotFound,
            NsError::Forbidden(_) => ErrorKind::Forbidden,
            NsError::InvalidValue(_) => ErrorKind::InvalidValue,
            NsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            NsError::IsDirectory(_) => ErrorKind::IsDirectory,
            NsError::NotDirectory(_) => ErrorKind::NotDirectory,
            NsError::IsCwd(_) => ErrorKind::IsCwd,
            NsError::TooManySymlinks(_) => ErrorKind::TooManySymlinks,
            NsError::BadOperation(_) => ErrorKind::BadOperation,
            NsError::NoReplicas(_) => ErrorKind::NoReplicas,
            NsError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            NsError::InvalidState(_) => ErrorKind::InvalidState,
            NsError::NoFactory(_) => ErrorKind::NoFactory,
            NsError::NotImplemented(_) => ErrorKind::NotImplemented,
            NsError::UnknownOption(_) => ErrorKind::UnknownOption,
            NsError::DbError(_) => ErrorKind::DbError,
            NsError::IoError(_) => ErrorKind::IoError,
            NsError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NsError::NotFound(_))
    }

    pub fn is_unknown_option(&self) -> bool {
        matches!(self, NsError::UnknownOption(_))
    }
}

pub type NsResult<T> = std::result::Result<T, NsError>;

impl From<std::io::Error> for NsError {
    fn from(err: std::io::Error) -> Self {
        NsError::IoError(err.to_string())
    }
}

// Mode bits, kept independent of the host libc so the catalog behaves the
// same on every platform.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;
pub const S_IREAD: u32 = 0o400;
pub const S_IWRITE: u32 = 0o200;
pub const S_IEXEC: u32 = 0o100;

pub fn s_isdir(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn s_isreg(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

pub fn s_islnk(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

pub fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
