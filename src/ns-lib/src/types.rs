use crate::{s_isdir, s_islnk, s_isreg, Acl, Extensible, NsError, NsResult, S_IFDIR};
use serde::{Deserialize, Serialize};

pub type InodeId = u64;

/// Parent inode of the root entry.
pub const ROOT_PARENT: InodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileStatus {
    #[default]
    Online,
    Migrated,
}

impl FileStatus {
    pub fn as_char(&self) -> char {
        match self {
            FileStatus::Online => '-',
            FileStatus::Migrated => 'm',
        }
    }

    pub fn from_char(c: char) -> NsResult<Self> {
        match c {
            '-' => Ok(FileStatus::Online),
            'm' => Ok(FileStatus::Migrated),
            _ => Err(NsError::InvalidValue(format!("invalid file status {}", c))),
        }
    }
}

/// POSIX part of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub ino: InodeId,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedStat {
    pub parent: InodeId,
    pub name: String,
    pub stat: Stat,
    pub status: FileStatus,
    pub guid: String,
    pub csumtype: String,
    pub csumvalue: String,
    pub acl: Acl,
    pub xattr: Extensible,
}

impl ExtendedStat {
    /// The world-traversable directory that sits above `/` while a path is
    /// being resolved.
    pub fn synthetic_root() -> Self {
        let mut meta = ExtendedStat::default();
        meta.stat.mode = S_IFDIR | 0o555;
        meta
    }

    pub fn inode(&self) -> InodeId {
        self.stat.ino
    }

    pub fn is_dir(&self) -> bool {
        s_isdir(self.stat.mode)
    }

    pub fn is_reg(&self) -> bool {
        s_isreg(self.stat.mode)
    }

    pub fn is_link(&self) -> bool {
        s_islnk(self.stat.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymLink {
    pub inode: InodeId,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryKind {
    Regular,
    Directory,
    SymLink,
    Unknown,
}

/// Light directory entry returned by `read_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: InodeId,
    pub name: String,
    pub kind: DirEntryKind,
}

impl From<&ExtendedStat> for DirEntry {
    fn from(meta: &ExtendedStat) -> Self {
        let kind = if meta.is_dir() {
            DirEntryKind::Directory
        } else if meta.is_link() {
            DirEntryKind::SymLink
        } else if meta.is_reg() {
            DirEntryKind::Regular
        } else {
            DirEntryKind::Unknown
        };
        DirEntry {
            ino: meta.stat.ino,
            name: meta.name.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utimbuf {
    pub actime: i64,
    pub modtime: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplicaStatus {
    #[default]
    Available,
    BeingPopulated,
    ToBeDeleted,
}

impl ReplicaStatus {
    pub fn as_char(&self) -> char {
        match self {
            ReplicaStatus::Available => '-',
            ReplicaStatus::BeingPopulated => 'P',
            ReplicaStatus::ToBeDeleted => 'D',
        }
    }

    pub fn from_char(c: char) -> NsResult<Self> {
        match c {
            '-' => Ok(ReplicaStatus::Available),
            'P' => Ok(ReplicaStatus::BeingPopulated),
            'D' => Ok(ReplicaStatus::ToBeDeleted),
            _ => Err(NsError::InvalidValue(format!("invalid replica status {}", c))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplicaType {
    Volatile,
    #[default]
    Permanent,
}

impl ReplicaType {
    pub fn as_char(&self) -> char {
        match self {
            ReplicaType::Volatile => 'V',
            ReplicaType::Permanent => 'P',
        }
    }

    pub fn from_char(c: char) -> NsResult<Self> {
        match c {
            'V' => Ok(ReplicaType::Volatile),
            'P' => Ok(ReplicaType::Permanent),
            _ => Err(NsError::InvalidValue(format!("invalid replica type {}", c))),
        }
    }
}

/// Metadata key naming the pool that holds a replica.
pub const REPLICA_POOL_KEY: &str = "pool";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replica {
    pub replica_id: i64,
    pub file_id: InodeId,
    pub nbaccesses: u64,
    pub atime: i64,
    pub ptime: i64,
    pub ltime: i64,
    pub status: ReplicaStatus,
    pub rtype: ReplicaType,
    pub server: String,
    pub rfn: String,
    pub meta: Extensible,
}

impl Replica {
    pub fn new(file_id: InodeId, server: &str, rfn: &str) -> Self {
        Self {
            file_id,
            server: server.to_string(),
            rfn: rfn.to_string(),
            ..Default::default()
        }
    }

    pub fn pool_name(&self) -> NsResult<String> {
        self.meta.get_string(REPLICA_POOL_KEY)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    #[serde(rename = "type")]
    pub pool_type: String,
    #[serde(default)]
    pub meta: Extensible,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub host: String,
    pub path: String,
    pub offset: u64,
    pub size: u64,
    #[serde(default)]
    pub meta: Extensible,
}

/// Physical addressing of one replica; chunks are ordered and may repeat.
pub type Location = Vec<Chunk>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityCredentials {
    pub mech: String,
    pub client_name: String,
    pub remote_address: String,
    pub session_id: String,
    #[serde(default)]
    pub fqans: Vec<String>,
    #[serde(default)]
    pub meta: Extensible,
}

impl SecurityCredentials {
    pub fn new(client_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub uid: u32,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub meta: Extensible,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub gid: u32,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub meta: Extensible,
}

/// Resolved caller identity. The first group is the primary one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityContext {
    pub credentials: SecurityCredentials,
    pub user: UserInfo,
    pub groups: Vec<GroupInfo>,
}

impl SecurityContext {
    pub fn new(credentials: SecurityCredentials, user: UserInfo, groups: Vec<GroupInfo>) -> Self {
        Self {
            credentials,
            user,
            groups,
        }
    }

    /// Builds a context straight from numeric ids.
    pub fn from_ids(uid: u32, gids: &[u32]) -> Self {
        let user = UserInfo {
            name: format!("uid{}", uid),
            uid,
            ..Default::default()
        };
        let groups = gids
            .iter()
            .map(|gid| GroupInfo {
                name: format!("gid{}", gid),
                gid: *gid,
                ..Default::default()
            })
            .collect();
        Self {
            credentials: SecurityCredentials::new(&user.name),
            user,
            groups,
        }
    }

    pub fn uid(&self) -> u32 {
        self.user.uid
    }

    /// Primary gid; a context without groups falls back to the uid, the
    /// way user-private groups work.
    pub fn primary_gid(&self) -> u32 {
        self.groups.first().map(|g| g.gid).unwrap_or(self.user.uid)
    }

    pub fn gids(&self) -> Vec<u32> {
        self.groups.iter().map(|g| g.gid).collect()
    }

    pub fn has_group(&self, gid: u32) -> bool {
        self.groups.iter().any(|g| g.gid == gid)
    }

    pub fn is_root(&self) -> bool {
        self.user.uid == 0
    }
}
