use crate::{CatalogConfig, PoolDrivers, TransactionGuard};
use ns_lib::{
    check_permissions, join_path, normalize_path, split_path, unix_timestamp, Acl, AclKind,
    DirEntry, ExtendedStat, Extensible, FileStatus, INode, INodeDir, InodeId, Location, NsError,
    NsResult, PoolHandler, PoolManager, Replica, ReplicaStatus, SecurityContext, Utimbuf,
    ROOT_PARENT, S_IEXEC, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, S_IREAD, S_ISGID, S_ISVTX, S_IWRITE,
};
use std::sync::Arc;

/// Checksum types accepted by [`BuiltInCatalog::set_checksum`].
pub const CHECKSUM_TYPES: [&str; 3] = ["MD", "AD", "CS"];

/// Open directory returned by [`BuiltInCatalog::open_dir`].
#[derive(Debug)]
pub struct CatalogDir {
    dir: ExtendedStat,
    idir: INodeDir,
}

impl CatalogDir {
    pub fn stat(&self) -> &ExtendedStat {
        &self.dir
    }
}

/// Namespace catalog built on top of an INode backend.
///
/// One instance serves one session: it holds the caller's security context,
/// the working directory and the umask, and is not meant to be shared
/// between concurrent callers.
pub struct BuiltInCatalog {
    inode: Arc<dyn INode>,
    pool_manager: Option<Arc<dyn PoolManager>>,
    pool_drivers: Arc<PoolDrivers>,
    sec_ctx: Option<SecurityContext>,
    cwd: InodeId,
    cwd_path: String,
    umask: u32,
    update_atime: bool,
    sym_link_limit: u32,
}

impl BuiltInCatalog {
    pub fn new(inode: Arc<dyn INode>, config: &CatalogConfig) -> Self {
        Self {
            inode,
            pool_manager: None,
            pool_drivers: Arc::new(PoolDrivers::empty()),
            sec_ctx: None,
            cwd: 0,
            cwd_path: String::new(),
            umask: config.umask & 0o777,
            update_atime: config.update_access_time,
            sym_link_limit: config.sym_link_limit,
        }
    }

    pub fn with_pool_manager(
        mut self,
        pool_manager: Arc<dyn PoolManager>,
        pool_drivers: Arc<PoolDrivers>,
    ) -> Self {
        self.pool_manager = Some(pool_manager);
        self.pool_drivers = pool_drivers;
        self
    }

    pub fn with_security_context(mut self, ctx: SecurityContext) -> Self {
        self.sec_ctx = Some(ctx);
        self
    }

    pub fn set_security_context(&mut self, ctx: SecurityContext) {
        self.sec_ctx = Some(ctx);
    }

    pub fn security_context(&self) -> Option<&SecurityContext> {
        self.sec_ctx.as_ref()
    }

    pub fn is_there_pool_manager(&self) -> bool {
        self.pool_manager.is_some()
    }

    fn ctx(&self) -> NsResult<&SecurityContext> {
        self.sec_ctx
            .as_ref()
            .ok_or_else(|| NsError::InvalidState("no security context set".to_string()))
    }

    fn can(&self, meta: &ExtendedStat, mode: u32) -> NsResult<bool> {
        Ok(check_permissions(self.ctx()?, &meta.acl, &meta.stat, mode))
    }

    fn is_owner(&self, meta: &ExtendedStat) -> NsResult<bool> {
        Ok(self.ctx()?.uid() == meta.stat.uid)
    }

    pub fn change_dir(&mut self, path: &str) -> NsResult<()> {
        if path.is_empty() {
            self.cwd = 0;
            self.cwd_path.clear();
            return Ok(());
        }

        let meta = self.extended_stat(path, true)?;
        if !meta.is_dir() {
            return Err(NsError::NotDirectory(format!("{} is not a directory", path)));
        }
        self.cwd = meta.inode();
        self.cwd_path = if path.starts_with('/') {
            normalize_path(path)
        } else {
            normalize_path(&format!("{}/{}", self.cwd_path, path))
        };
        debug!("BuiltInCatalog: cwd is now {} ({})", self.cwd_path, self.cwd);
        Ok(())
    }

    pub fn get_working_dir(&self) -> String {
        self.cwd_path.clone()
    }

    /// Sets the umask and returns the previous one.
    pub fn umask(&mut self, mask: u32) -> u32 {
        std::mem::replace(&mut self.umask, mask & 0o777)
    }

    /// Resolves `path` into its entry. Intermediate symbolic links are always
    /// followed; the final one only if `follow_sym` is set.
    pub fn extended_stat(&self, path: &str, follow_sym: bool) -> NsResult<ExtendedStat> {
        if path.is_empty() {
            return Err(NsError::InvalidValue("empty path".to_string()));
        }

        let mut components = split_path(path);
        let mut parent: InodeId = ROOT_PARENT;
        let mut sym_link_level = 0u32;

        let mut meta = if path.starts_with('/') {
            ExtendedStat::synthetic_root()
        } else if self.cwd_path.is_empty() {
            // relative paths without a working directory start at the root
            let root = self.inode.extended_stat_by_name(ROOT_PARENT, "/")?;
            parent = root.inode();
            root
        } else {
            parent = self.cwd;
            self.inode.extended_stat(self.cwd)?
        };

        let mut i = 0;
        while i < components.len() {
            if !meta.is_dir() && !meta.is_link() {
                return Err(NsError::NotDirectory(format!(
                    "{} is not a directory",
                    meta.name
                )));
            }
            if !self.can(&meta, S_IEXEC)? {
                return Err(NsError::Forbidden(format!(
                    "not enough permissions to list {}",
                    meta.name
                )));
            }

            let component = components[i].clone();
            match component.as_str() {
                "." => {}
                ".." => {
                    // `..` on the root stays on the root
                    if meta.parent != ROOT_PARENT {
                        parent = meta.parent;
                        meta = self.inode.extended_stat(parent)?;
                    }
                }
                name => {
                    meta = self.inode.extended_stat_by_name(parent, name)?;
                    let is_last = i + 1 == components.len();

                    if meta.is_link() && (follow_sym || !is_last) {
                        let link = self.inode.read_link(meta.inode())?;

                        sym_link_level += 1;
                        if sym_link_level > self.sym_link_limit {
                            return Err(NsError::TooManySymlinks(format!(
                                "symbolic link limit exceeded: > {}",
                                self.sym_link_limit
                            )));
                        }

                        let mut sym_path = split_path(&link.link);
                        sym_path.extend(components.drain(i + 1..));
                        components = sym_path;
                        i = 0;

                        // continue from the directory the target is relative to
                        meta = if link.link.starts_with('/') {
                            parent = ROOT_PARENT;
                            ExtendedStat::synthetic_root()
                        } else {
                            self.inode.extended_stat(parent)?
                        };
                        continue;
                    }
                    parent = meta.inode();
                }
            }
            i += 1;
        }

        Ok(meta)
    }

    /// Resolves the directory that holds the last component of `path`.
    /// Returns the directory entry, its path and the last component.
    pub fn get_parent(&self, path: &str) -> NsResult<(ExtendedStat, String, String)> {
        let mut components = split_path(path);
        let name = match components.pop() {
            Some(name) if name != "/" => name,
            _ => {
                return Err(NsError::InvalidValue(format!(
                    "'{}' has no parent directory",
                    path
                )))
            }
        };

        let parent_path = join_path(&components);
        if !parent_path.is_empty() {
            let parent = self.extended_stat(&parent_path, true)?;
            Ok((parent, parent_path, name))
        } else if !self.cwd_path.is_empty() {
            let parent = self.inode.extended_stat(self.cwd)?;
            Ok((parent, self.cwd_path.clone(), name))
        } else {
            let parent = self.extended_stat("/", true)?;
            Ok((parent, "/".to_string(), name))
        }
    }

    fn effective_gid(&self, parent: &ExtendedStat, mode: u32) -> NsResult<(u32, u32)> {
        if parent.stat.mode & S_ISGID != 0 {
            Ok((parent.stat.gid, mode | S_ISGID))
        } else {
            Ok((self.ctx()?.primary_gid(), mode))
        }
    }

    /// Removal rule shared by unlink and remove_dir.
    fn check_removable(
        &self,
        parent: &ExtendedStat,
        entry: &ExtendedStat,
        path: &str,
    ) -> NsResult<()> {
        let uid = self.ctx()?.uid();
        if parent.stat.mode & S_ISVTX == S_ISVTX {
            if uid != entry.stat.uid && uid != parent.stat.uid && !self.can(entry, S_IWRITE)? {
                return Err(NsError::Forbidden(format!(
                    "not enough permissions to remove {} (sticky bit set)",
                    path
                )));
            }
        } else if !self.can(parent, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to remove {}",
                path
            )));
        }
        Ok(())
    }

    fn update_access_time(&self, meta: &ExtendedStat) -> NsResult<()> {
        if !self.update_atime {
            return Ok(());
        }
        self.inode.touch_access_time(meta.inode(), unix_timestamp())
    }

    /// Requires search permission on every ancestor of `meta`.
    fn traverse_backwards(&self, meta: &ExtendedStat) -> NsResult<()> {
        let mut current = meta.clone();
        while current.parent != ROOT_PARENT {
            current = self.inode.extended_stat(current.parent)?;
            if !self.can(&current, S_IEXEC)? {
                return Err(NsError::Forbidden(format!(
                    "can not access #{}",
                    current.inode()
                )));
            }
        }
        Ok(())
    }

    fn pool_handler(&self, pool_name: &str) -> NsResult<Box<dyn PoolHandler>> {
        let pool_manager = self
            .pool_manager
            .as_ref()
            .ok_or_else(|| NsError::NotImplemented("no pool manager configured".to_string()))?;
        let pool = pool_manager.get_pool(pool_name)?;
        self.pool_drivers
            .get_pool_driver(&pool.pool_type)?
            .create_pool_handler(&pool.name)
    }

    pub fn add_replica(&self, replica: &Replica) -> NsResult<()> {
        let meta = self.inode.extended_stat(replica.file_id)?;
        self.traverse_backwards(&meta)?;
        if !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "can not modify the file #{}",
                replica.file_id
            )));
        }
        debug!("BuiltInCatalog: add replica {} to #{}", replica.rfn, replica.file_id);
        self.inode.add_replica(replica)
    }

    pub fn delete_replica(&self, replica: &Replica) -> NsResult<()> {
        let meta = self.inode.extended_stat(replica.file_id)?;
        self.traverse_backwards(&meta)?;
        if !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "can not modify the file #{}",
                replica.file_id
            )));
        }
        debug!(
            "BuiltInCatalog: delete replica {} of #{}",
            replica.rfn, replica.file_id
        );
        self.inode.delete_replica(replica)
    }

    pub fn get_replicas(&self, path: &str) -> NsResult<Vec<Replica>> {
        let meta = self.extended_stat(path, true)?;
        if !self.can(&meta, S_IREAD)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to read {}",
                path
            )));
        }
        self.update_access_time(&meta)?;
        self.inode.get_replicas(meta.inode())
    }

    pub fn get_replica(&self, rfn: &str) -> NsResult<Replica> {
        let replica = self.inode.get_replica_by_rfn(rfn)?;
        let meta = self.inode.extended_stat(replica.file_id)?;
        self.traverse_backwards(&meta)?;
        Ok(replica)
    }

    pub fn update_replica(&self, replica: &Replica) -> NsResult<()> {
        // the file id carried by the caller is not trusted
        let stored = self.inode.get_replica_by_id(replica.replica_id)?;
        let meta = self.inode.extended_stat(stored.file_id)?;
        self.traverse_backwards(&meta)?;
        if !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden("can not modify the replica".to_string()));
        }
        debug!("BuiltInCatalog: update replica {}", replica.replica_id);
        self.inode.update_replica(replica)
    }

    /// Physical location to read `path` from: the first available replica
    /// whose pool can serve it.
    pub fn where_to_read(&self, path: &str) -> NsResult<Location> {
        let meta = self.extended_stat(path, true)?;
        if !self.can(&meta, S_IREAD)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to read {}",
                path
            )));
        }

        let replicas = self.inode.get_replicas(meta.inode())?;
        for replica in replicas
            .iter()
            .filter(|r| r.status == ReplicaStatus::Available)
        {
            let handler = self.pool_handler(&replica.pool_name()?)?;
            if handler.replica_is_available(replica)? {
                return handler.where_to_read(replica);
            }
        }
        Err(NsError::NoReplicas(format!(
            "no available replicas for {}",
            path
        )))
    }

    pub fn symlink(&self, old_path: &str, new_path: &str) -> NsResult<()> {
        let (parent, parent_path, name) = self.get_parent(new_path)?;
        if !self.can(&parent, S_IWRITE | S_IEXEC)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions on {}",
                parent_path
            )));
        }

        let (egid, mode) = self.effective_gid(&parent, 0o777)?;
        let mut link = ExtendedStat::default();
        link.parent = parent.inode();
        link.name = name;
        link.stat.mode = mode | S_IFLNK;
        link.stat.size = 0;
        link.stat.uid = self.ctx()?.uid();
        link.stat.gid = egid;
        link.status = FileStatus::Online;

        debug!("BuiltInCatalog: symlink {} -> {}", new_path, old_path);
        let txn = TransactionGuard::begin(self.inode.as_ref())?;
        let created = self.inode.create(&link)?;
        self.inode.symlink(created.inode(), old_path)?;
        txn.commit()
    }

    pub fn read_link(&self, path: &str) -> NsResult<String> {
        let meta = self.extended_stat(path, false)?;
        if !meta.is_link() {
            return Err(NsError::InvalidValue(format!(
                "{} is not a symbolic link",
                path
            )));
        }
        Ok(self.inode.read_link(meta.inode())?.link)
    }

    pub fn unlink(&self, path: &str) -> NsResult<()> {
        let (parent, parent_path, name) = self.get_parent(path)?;
        if !self.can(&parent, S_IEXEC)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to list {}",
                parent_path
            )));
        }

        let file = self.inode.extended_stat_by_name(parent.inode(), &name)?;
        if file.is_dir() {
            return Err(NsError::IsDirectory(format!(
                "{} is a directory, can not unlink",
                path
            )));
        }
        self.check_removable(&parent, &file, path)?;

        if !file.is_link() {
            let replicas = self.inode.get_replicas(file.inode())?;
            if self.pool_manager.is_none() && !replicas.is_empty() {
                return Err(NsError::AlreadyExists(format!(
                    "{} has replicas, can not remove",
                    path
                )));
            }
            for replica in replicas.iter() {
                let handler = self.pool_handler(&replica.pool_name()?)?;
                handler.remove_replica(replica)?;
            }
        }

        debug!("BuiltInCatalog: unlink {}", path);
        match self.inode.unlink(file.inode()) {
            Err(e) if e.is_not_found() => {
                info!("{} was already removed by its pool driver", path);
                Ok(())
            }
            other => other,
        }
    }

    pub fn create(&self, path: &str, mode: u32) -> NsResult<()> {
        let (parent, parent_path, name) = self.get_parent(path)?;
        if !self.can(&parent, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "need write access on {}",
                parent_path
            )));
        }

        let existing = match self.inode.extended_stat_by_name(parent.inode(), &name) {
            Ok(file) => Some(file),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if let Some(file) = existing {
            if file.is_dir() {
                return Err(NsError::IsDirectory(format!("{} is a directory", path)));
            }
            if !self.inode.get_replicas(file.inode())?.is_empty() {
                return Err(NsError::AlreadyExists(format!(
                    "{} exists and has replicas, can not truncate",
                    path
                )));
            }
            if !self.is_owner(&file)? && !self.can(&file, S_IWRITE)? {
                return Err(NsError::Forbidden(format!(
                    "not enough permissions to truncate {}",
                    path
                )));
            }
            debug!("BuiltInCatalog: truncate {}", path);
            return self.inode.set_size(file.inode(), 0);
        }

        let (egid, mode) = self.effective_gid(&parent, mode)?;
        let uid = self.ctx()?.uid();
        let mut file = ExtendedStat::default();
        file.parent = parent.inode();
        file.name = name;
        file.stat.mode = ((mode & !S_IFMT) & !self.umask) | S_IFREG;
        file.stat.size = 0;
        file.stat.uid = uid;
        file.stat.gid = egid;
        file.status = FileStatus::Online;

        if parent.acl.has(AclKind::UserObj, true).is_some() {
            file.acl = Acl::inherit(&parent.acl, uid, egid, mode, &mut file.stat.mode);
        }

        debug!("BuiltInCatalog: create {} mode {:o}", path, file.stat.mode);
        self.inode.create(&file)?;
        Ok(())
    }

    pub fn make_dir(&self, path: &str, mode: u32) -> NsResult<()> {
        let (parent, parent_path, name) = self.get_parent(path)?;
        if !self.can(&parent, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "need write access for {}",
                parent_path
            )));
        }

        let uid = self.ctx()?.uid();
        let mut dir = ExtendedStat::default();
        dir.parent = parent.inode();
        dir.name = name;
        dir.stat.uid = uid;
        dir.status = FileStatus::Online;
        dir.stat.mode = ((mode & !S_IFMT) & !self.umask) | S_IFDIR;

        let (egid, _) = self.effective_gid(&parent, mode)?;
        if parent.stat.mode & S_ISGID != 0 {
            dir.stat.mode |= S_ISGID;
        }
        dir.stat.gid = egid;

        if parent.acl.has(AclKind::UserObj, true).is_some() {
            dir.acl = Acl::inherit(&parent.acl, uid, egid, mode, &mut dir.stat.mode);
        }

        debug!("BuiltInCatalog: mkdir {} mode {:o}", path, dir.stat.mode);
        self.inode.create(&dir)?;
        Ok(())
    }

    pub fn remove_dir(&self, path: &str) -> NsResult<()> {
        if path == "/" {
            return Err(NsError::InvalidValue("can not remove '/'".to_string()));
        }

        let (parent, _, name) = self.get_parent(path)?;
        let entry = self.inode.extended_stat_by_name(parent.inode(), &name)?;

        if !entry.is_dir() {
            return Err(NsError::NotDirectory(format!(
                "{} is not a directory, can not remove",
                path
            )));
        }
        if entry.inode() == self.cwd {
            return Err(NsError::IsCwd(
                "can not remove the current working directory".to_string(),
            ));
        }
        if entry.stat.nlink > 0 {
            return Err(NsError::AlreadyExists(format!(
                "{} is not empty, can not remove",
                path
            )));
        }
        self.check_removable(&parent, &entry, path)?;

        debug!("BuiltInCatalog: rmdir {}", path);
        let txn = TransactionGuard::begin(self.inode.as_ref())?;
        self.inode.delete_comment(entry.inode())?;
        self.inode.unlink(entry.inode())?;
        txn.commit()
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> NsResult<()> {
        if old_path == "/" || new_path == "/" {
            return Err(NsError::InvalidValue(
                "neither the source nor the destination can be '/'".to_string(),
            ));
        }

        let (old_parent, old_parent_path, old_name) = self.get_parent(old_path)?;
        let (new_parent, new_parent_path, new_name) = self.get_parent(new_path)?;

        let old = self
            .inode
            .extended_stat_by_name(old_parent.inode(), &old_name)?;
        if old.inode() == self.cwd {
            return Err(NsError::IsCwd(
                "can not rename the current working directory".to_string(),
            ));
        }

        if !self.can(&old_parent, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions on origin {}",
                old_parent_path
            )));
        }
        if !self.can(&new_parent, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions on destination {}",
                new_parent_path
            )));
        }

        if old.is_dir() {
            if !self.can(&old, S_IWRITE)? {
                return Err(NsError::Forbidden(format!(
                    "not enough permissions on {}",
                    old_path
                )));
            }
            // the destination can not live under the source
            let mut aux = new_parent.clone();
            while aux.parent != ROOT_PARENT {
                if aux.inode() == old.inode() {
                    return Err(NsError::InvalidValue(
                        "destination is a descendant of the source".to_string(),
                    ));
                }
                aux = self.inode.extended_stat(aux.parent)?;
            }
        }

        let uid = self.ctx()?.uid();
        if old_parent.stat.mode & S_ISVTX != 0
            && uid != old_parent.stat.uid
            && uid != old.stat.uid
            && !self.can(&old, S_IWRITE)?
        {
            return Err(NsError::Forbidden(
                "sticky bit set on the parent, and not enough permissions".to_string(),
            ));
        }

        match self
            .inode
            .extended_stat_by_name(new_parent.inode(), &new_name)
        {
            Ok(dest) => {
                if dest.inode() == old.inode() {
                    return Ok(());
                }
                if dest.stat.mode & S_IFMT != old.stat.mode & S_IFMT {
                    return Err(if old.is_dir() {
                        NsError::NotDirectory(
                            "source is a directory and destination is not".to_string(),
                        )
                    } else {
                        NsError::IsDirectory(
                            "source is not a directory and destination is".to_string(),
                        )
                    });
                }
                if dest.is_dir() {
                    self.remove_dir(new_path)?;
                } else {
                    self.unlink(new_path)?;
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        debug!("BuiltInCatalog: rename {} -> {}", old_path, new_path);
        let txn = TransactionGuard::begin(self.inode.as_ref())?;
        if new_name != old_name {
            self.inode.rename(old.inode(), &new_name)?;
        }
        if new_parent.inode() != old_parent.inode() {
            self.inode.move_entry(old.inode(), new_parent.inode())?;
        } else {
            let now = unix_timestamp();
            let buf = Utimbuf {
                actime: now,
                modtime: now,
            };
            self.inode.utime(old_parent.inode(), Some(&buf))?;
        }
        txn.commit()
    }

    pub fn set_mode(&self, path: &str, mode: u32) -> NsResult<()> {
        let meta = self.extended_stat(path, true)?;
        let ctx = self.ctx()?;
        if ctx.uid() != meta.stat.uid && !ctx.is_root() {
            return Err(NsError::Forbidden(format!(
                "only the owner can set the mode of {}",
                path
            )));
        }

        let mut mode = mode & !S_IFMT;
        if !meta.is_dir() && !ctx.is_root() {
            mode &= !S_ISVTX;
        }
        if !ctx.is_root() && !ctx.has_group(meta.stat.gid) {
            mode &= !S_ISGID;
        }
        mode |= meta.stat.mode & S_IFMT;

        let mut acl = meta.acl.clone();
        for entry in acl.iter_mut().filter(|e| !e.is_default) {
            match entry.kind {
                AclKind::UserObj => entry.perm = ((mode >> 6) & 0o7) as u8,
                AclKind::GroupObj | AclKind::Mask => entry.perm = ((mode >> 3) & 0o7) as u8,
                AclKind::Other => entry.perm = (mode & 0o7) as u8,
                AclKind::User | AclKind::Group => {}
            }
        }

        debug!("BuiltInCatalog: chmod {} {:o}", path, mode);
        self.inode
            .set_mode(meta.inode(), meta.stat.uid, meta.stat.gid, mode, &acl)
    }

    /// Changes owner and group. `None` leaves the field unchanged.
    pub fn set_owner(
        &self,
        path: &str,
        new_uid: Option<u32>,
        new_gid: Option<u32>,
        follow_sym: bool,
    ) -> NsResult<()> {
        let meta = self.extended_stat(path, follow_sym)?;
        let new_uid = new_uid.unwrap_or(meta.stat.uid);
        let new_gid = new_gid.unwrap_or(meta.stat.gid);

        if new_uid == meta.stat.uid && new_gid == meta.stat.gid {
            return Ok(());
        }

        let ctx = self.ctx()?;
        if !ctx.is_root() {
            if meta.stat.uid != new_uid {
                return Err(NsError::BadOperation(
                    "only root can set the owner".to_string(),
                ));
            }
            if meta.stat.gid != new_gid {
                if meta.stat.uid != ctx.uid() {
                    return Err(NsError::BadOperation(
                        "only root or the owner can set the group".to_string(),
                    ));
                }
                if !ctx.has_group(new_gid) {
                    return Err(NsError::BadOperation(format!(
                        "the user does not belong to the group {}",
                        new_gid
                    )));
                }
            }
        }

        let mut acl = meta.acl.clone();
        for entry in acl.iter_mut().filter(|e| !e.is_default) {
            match entry.kind {
                AclKind::UserObj => entry.id = new_uid,
                AclKind::GroupObj => entry.id = new_gid,
                _ => {}
            }
        }

        debug!("BuiltInCatalog: chown {} {}:{}", path, new_uid, new_gid);
        self.inode
            .set_mode(meta.inode(), new_uid, new_gid, meta.stat.mode, &acl)
    }

    pub fn set_size(&self, path: &str, size: u64) -> NsResult<()> {
        let meta = self.extended_stat(path, false)?;
        if !self.is_owner(&meta)? && !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "can not set the size of {}",
                path
            )));
        }
        self.inode.set_size(meta.inode(), size)
    }

    pub fn set_checksum(&self, path: &str, csumtype: &str, csumvalue: &str) -> NsResult<()> {
        let meta = self.extended_stat(path, false)?;
        if !self.is_owner(&meta)? && !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "can not set the checksum of {}",
                path
            )));
        }
        if !CHECKSUM_TYPES.contains(&csumtype) {
            return Err(NsError::InvalidValue(format!(
                "{} is an invalid checksum type",
                csumtype
            )));
        }
        self.inode.set_checksum(meta.inode(), csumtype, csumvalue)
    }

    pub fn set_acl(&self, path: &str, acl: &Acl) -> NsResult<()> {
        let meta = self.extended_stat(path, true)?;
        let ctx = self.ctx()?;
        if ctx.uid() != meta.stat.uid && !ctx.is_root() {
            return Err(NsError::Forbidden(format!(
                "only the owner can set the ACL of {}",
                path
            )));
        }

        let mut acl = acl.clone();
        for entry in acl.iter_mut() {
            if entry.is_default {
                if !meta.is_dir() {
                    return Err(NsError::InvalidValue(
                        "default ACL entries can only be applied to directories".to_string(),
                    ));
                }
                continue;
            }
            match entry.kind {
                AclKind::UserObj => entry.id = meta.stat.uid,
                AclKind::GroupObj => entry.id = meta.stat.gid,
                _ => {}
            }
        }
        acl.sort();
        acl.validate()?;

        let mut mode = meta.stat.mode;
        for entry in acl.iter().filter(|e| !e.is_default) {
            let perm = entry.perm as u32;
            match entry.kind {
                AclKind::UserObj => mode = (mode & 0o177077) | (perm << 6),
                AclKind::GroupObj => mode = (mode & 0o177707) | (perm << 3),
                AclKind::Mask => mode = (mode & !0o070) | (mode & (perm << 3)),
                AclKind::Other => mode = (mode & 0o177770) | perm,
                AclKind::User | AclKind::Group => {}
            }
        }

        debug!("BuiltInCatalog: setacl {} {}", path, acl);
        self.inode
            .set_mode(meta.inode(), meta.stat.uid, meta.stat.gid, mode, &acl)
    }

    /// `None` sets both times to now.
    pub fn utime(&self, path: &str, buf: Option<&Utimbuf>) -> NsResult<()> {
        let meta = self.extended_stat(path, true)?;
        if !self.is_owner(&meta)? && !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to modify the time of {}",
                path
            )));
        }
        self.inode.utime(meta.inode(), buf)
    }

    pub fn get_comment(&self, path: &str) -> NsResult<String> {
        let meta = self.extended_stat(path, true)?;
        if !self.can(&meta, S_IREAD)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to read {}",
                path
            )));
        }
        self.inode.get_comment(meta.inode())
    }

    fn writable(&self, path: &str) -> NsResult<ExtendedStat> {
        let meta = self.extended_stat(path, true)?;
        if !self.can(&meta, S_IWRITE)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to write {}",
                path
            )));
        }
        Ok(meta)
    }

    pub fn set_comment(&self, path: &str, comment: &str) -> NsResult<()> {
        let meta = self.writable(path)?;
        self.inode.set_comment(meta.inode(), comment)
    }

    pub fn set_guid(&self, path: &str, guid: &str) -> NsResult<()> {
        let meta = self.writable(path)?;
        self.inode.set_guid(meta.inode(), guid)
    }

    pub fn update_extended_attributes(&self, path: &str, attr: &Extensible) -> NsResult<()> {
        let meta = self.writable(path)?;
        self.inode.update_extended_attributes(meta.inode(), attr)
    }

    pub fn open_dir(&self, path: &str) -> NsResult<CatalogDir> {
        let dir = self.extended_stat(path, true)?;
        if !self.can(&dir, S_IREAD)? {
            return Err(NsError::Forbidden(format!(
                "not enough permissions to read {}",
                path
            )));
        }
        let idir = self.inode.open_dir(dir.inode())?;
        self.update_access_time(&dir)?;
        Ok(CatalogDir { dir, idir })
    }

    pub fn read_dir(&self, dir: &mut CatalogDir) -> NsResult<Option<DirEntry>> {
        let entry = self.inode.read_dir(&mut dir.idir)?;
        self.update_access_time(&dir.dir)?;
        Ok(entry)
    }

    pub fn read_dirx(&self, dir: &mut CatalogDir) -> NsResult<Option<ExtendedStat>> {
        let entry = self.inode.read_dirx(&mut dir.idir)?;
        self.update_access_time(&dir.dir)?;
        Ok(entry)
    }

    pub fn close_dir(&self, dir: CatalogDir) -> NsResult<()> {
        self.inode.close_dir(dir.idir)
    }
}
