use crate::{
    Acl, BaseFactory, DirEntry, ExtendedStat, Extensible, InodeId, NsResult, Replica, SymLink,
    Utimbuf,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Open directory on an INode backend. Holds a snapshot of the children
/// taken when the directory was opened.
#[derive(Debug, Clone)]
pub struct INodeDir {
    pub dir_inode: InodeId,
    pending: VecDeque<ExtendedStat>,
}

impl INodeDir {
    pub fn new(dir_inode: InodeId, children: Vec<ExtendedStat>) -> Self {
        Self {
            dir_inode,
            pending: children.into(),
        }
    }

    pub fn next_entry(&mut self) -> Option<ExtendedStat> {
        self.pending.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

/// Durable store of entries and replicas. Implementations perform no
/// permission checks; that is the catalog's job.
pub trait INode: Send + Sync {
    fn begin(&self) -> NsResult<()>;
    fn commit(&self) -> NsResult<()>;
    fn rollback(&self) -> NsResult<()>;

    /// Stores a new entry. Only parent, name, mode, uid, gid, size, status,
    /// checksum, acl and xattr of `meta` are honored; the stored entry is
    /// returned with its assigned inode.
    fn create(&self, meta: &ExtendedStat) -> NsResult<ExtendedStat>;
    fn symlink(&self, inode: InodeId, link: &str) -> NsResult<()>;
    fn unlink(&self, inode: InodeId) -> NsResult<()>;
    fn move_entry(&self, inode: InodeId, dest: InodeId) -> NsResult<()>;
    fn rename(&self, inode: InodeId, name: &str) -> NsResult<()>;

    fn extended_stat(&self, inode: InodeId) -> NsResult<ExtendedStat>;
    /// Fails `NotFound` if `parent` has no child called `name`.
    fn extended_stat_by_name(&self, parent: InodeId, name: &str) -> NsResult<ExtendedStat>;
    fn read_link(&self, inode: InodeId) -> NsResult<SymLink>;

    fn add_replica(&self, replica: &Replica) -> NsResult<()>;
    fn delete_replica(&self, replica: &Replica) -> NsResult<()>;
    fn get_replicas(&self, inode: InodeId) -> NsResult<Vec<Replica>>;
    fn get_replica_by_id(&self, replica_id: i64) -> NsResult<Replica>;
    fn get_replica_by_rfn(&self, rfn: &str) -> NsResult<Replica>;
    fn update_replica(&self, replica: &Replica) -> NsResult<()>;

    /// `None` sets both times to now.
    fn utime(&self, inode: InodeId, buf: Option<&Utimbuf>) -> NsResult<()>;
    /// Only the access time changes; mtime and ctime are kept.
    fn touch_access_time(&self, inode: InodeId, atime: i64) -> NsResult<()>;
    fn set_mode(&self, inode: InodeId, uid: u32, gid: u32, mode: u32, acl: &Acl) -> NsResult<()>;
    fn set_size(&self, inode: InodeId, size: u64) -> NsResult<()>;
    fn set_checksum(&self, inode: InodeId, csumtype: &str, csumvalue: &str) -> NsResult<()>;

    fn get_comment(&self, inode: InodeId) -> NsResult<String>;
    fn set_comment(&self, inode: InodeId, comment: &str) -> NsResult<()>;
    fn delete_comment(&self, inode: InodeId) -> NsResult<()>;

    fn set_guid(&self, inode: InodeId, guid: &str) -> NsResult<()>;
    fn update_extended_attributes(&self, inode: InodeId, attr: &Extensible) -> NsResult<()>;

    fn open_dir(&self, inode: InodeId) -> NsResult<INodeDir>;

    fn read_dirx(&self, dir: &mut INodeDir) -> NsResult<Option<ExtendedStat>> {
        Ok(dir.next_entry())
    }

    fn read_dir(&self, dir: &mut INodeDir) -> NsResult<Option<DirEntry>> {
        Ok(self.read_dirx(dir)?.as_ref().map(DirEntry::from))
    }

    fn close_dir(&self, dir: INodeDir) -> NsResult<()> {
        drop(dir);
        Ok(())
    }
}

pub trait INodeFactory: BaseFactory {
    fn create_inode(&self) -> NsResult<Arc<dyn INode>>;
}
