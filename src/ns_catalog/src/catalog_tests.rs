#[cfg(test)]
mod tests {
    use crate::*;
    use inode_db::{SqliteINode, SqliteINodeFactory, SqlitePoolManager, SqlitePoolManagerFactory};
    use ns_lib::{
        Acl, AclKind, BaseFactory, Chunk, DirEntryKind, ErrorKind, Extensible, FactoryRegistry,
        INode, Location, NsError, NsResult, Pool, PoolDriver, PoolDriverFactory, PoolHandler, Replica,
        ReplicaStatus, SecurityContext, SecurityCredentials, Utimbuf, REPLICA_POOL_KEY, S_IFDIR,
        S_IFLNK, S_IFMT, S_IFREG,
    };
    use std::sync::{Arc, Mutex, Once};
    use tempfile::TempDir;

    static INIT_LOGGER: Once = Once::new();

    fn init_logging() {
        INIT_LOGGER.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    const USER: u32 = 100;
    const OTHER_USER: u32 = 200;

    fn create_test_inode() -> (TempDir, Arc<dyn INode>) {
        init_logging();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        let inode = SqliteINode::new(path.to_string_lossy().to_string()).unwrap();
        (dir, Arc::new(inode))
    }

    fn catalog_as(inode: &Arc<dyn INode>, uid: u32, gids: &[u32]) -> BuiltInCatalog {
        BuiltInCatalog::new(inode.clone(), &CatalogConfig::default())
            .with_security_context(SecurityContext::from_ids(uid, gids))
    }

    fn root_catalog(inode: &Arc<dyn INode>) -> BuiltInCatalog {
        catalog_as(inode, 0, &[0])
    }

    fn user_catalog(inode: &Arc<dyn INode>) -> BuiltInCatalog {
        catalog_as(inode, USER, &[100, 101])
    }

    /// `/home/user` owned by USER:100, mode 0755.
    fn create_home(inode: &Arc<dyn INode>) {
        let root = root_catalog(inode);
        root.make_dir("/home", 0o755).unwrap();
        root.make_dir("/home/user", 0o755).unwrap();
        root.set_owner("/home/user", Some(USER), Some(100), true)
            .unwrap();
    }

    /// World-writable sticky `/tmp`.
    fn create_tmp(inode: &Arc<dyn INode>) {
        let root = root_catalog(inode);
        root.make_dir("/tmp", 0o777).unwrap();
        root.set_mode("/tmp", 0o1777).unwrap();
    }

    fn kind_of<T>(result: NsResult<T>) -> ErrorKind {
        match result {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.kind(),
        }
    }

    // ==================== Mock pool ====================

    #[derive(Default)]
    struct MockPoolState {
        removed: Mutex<Vec<String>>,
        // when set, removing a replica also drops the whole entry
        unlink_on_remove: Mutex<Option<Arc<dyn INode>>>,
    }

    struct MockHandler {
        pool_name: String,
        state: Arc<MockPoolState>,
    }

    impl PoolHandler for MockHandler {
        fn pool_type(&self) -> String {
            "mock".to_string()
        }

        fn pool_name(&self) -> String {
            self.pool_name.clone()
        }

        fn pool_is_available(&self, _write: bool) -> NsResult<bool> {
            Ok(true)
        }

        fn replica_is_available(&self, replica: &Replica) -> NsResult<bool> {
            Ok(replica.server != "down.example.org")
        }

        fn where_to_read(&self, replica: &Replica) -> NsResult<Location> {
            Ok(vec![Chunk {
                host: replica.server.clone(),
                path: replica.rfn.clone(),
                offset: 0,
                size: 0,
                meta: Extensible::new(),
            }])
        }

        fn remove_replica(&self, replica: &Replica) -> NsResult<()> {
            self.state.removed.lock().unwrap().push(replica.rfn.clone());
            if let Some(inode) = self.state.unlink_on_remove.lock().unwrap().as_ref() {
                inode.unlink(replica.file_id)?;
            }
            Ok(())
        }
    }

    struct MockDriver {
        state: Arc<MockPoolState>,
    }

    impl PoolDriver for MockDriver {
        fn create_pool_handler(&self, pool_name: &str) -> NsResult<Box<dyn PoolHandler>> {
            Ok(Box::new(MockHandler {
                pool_name: pool_name.to_string(),
                state: self.state.clone(),
            }))
        }
    }

    struct MockDriverFactory {
        state: Arc<MockPoolState>,
    }

    impl BaseFactory for MockDriverFactory {}

    impl PoolDriverFactory for MockDriverFactory {
        fn implemented_pool(&self) -> String {
            "mock".to_string()
        }

        fn create_pool_driver(&self) -> NsResult<Arc<dyn PoolDriver>> {
            Ok(Arc::new(MockDriver {
                state: self.state.clone(),
            }))
        }
    }

    fn test_pool() -> Pool {
        Pool {
            name: "pool01".to_string(),
            pool_type: "mock".to_string(),
            meta: Extensible::new(),
        }
    }

    fn create_pool_catalog(
        dir: &TempDir,
        inode: &Arc<dyn INode>,
        state: Arc<MockPoolState>,
    ) -> BuiltInCatalog {
        let pools =
            SqlitePoolManager::new(dir.path().join("pools.db").to_string_lossy().to_string())
                .unwrap();
        pools.add_pool(&test_pool()).unwrap();

        let mut registry: FactoryRegistry<dyn PoolDriverFactory> = FactoryRegistry::new();
        registry.register("mock", Arc::new(MockDriverFactory { state }));

        BuiltInCatalog::new(inode.clone(), &CatalogConfig::default())
            .with_pool_manager(Arc::new(pools), Arc::new(PoolDrivers::new(registry)))
            .with_security_context(SecurityContext::from_ids(USER, &[100]))
    }

    fn pool_replica(file_id: u64, server: &str, rfn: &str) -> Replica {
        let mut replica = Replica::new(file_id, server, rfn);
        replica.meta.set(REPLICA_POOL_KEY, "pool01");
        replica
    }

    // ==================== Resolution ====================

    #[test]
    fn test_root_and_dot_dot() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);

        let root = cat.extended_stat("/", true).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.name, "/");
        assert_eq!(root.parent, 0);

        assert_eq!(cat.extended_stat("/..", true).unwrap().inode(), root.inode());
        assert_eq!(
            cat.extended_stat("/home/user/..", true).unwrap().inode(),
            cat.extended_stat("/home", true).unwrap().inode()
        );
        assert_eq!(
            cat.extended_stat("//home/./user//", true).unwrap().inode(),
            cat.extended_stat("/home/user", true).unwrap().inode()
        );
        assert_eq!(kind_of(cat.extended_stat("", true)), ErrorKind::InvalidValue);
        assert_eq!(kind_of(cat.extended_stat("/nope", true)), ErrorKind::NotFound);
    }

    #[test]
    fn test_resolution_through_a_file_fails() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        assert_eq!(
            kind_of(cat.extended_stat("/home/user/f/x", true)),
            ErrorKind::NotDirectory
        );
    }

    #[test]
    fn test_search_permission_required() {
        let (_dir, inode) = create_test_inode();
        let root = root_catalog(&inode);
        root.make_dir("/private", 0o700).unwrap();
        root.create("/private/f", 0o644).unwrap();

        let cat = user_catalog(&inode);
        assert_eq!(kind_of(cat.extended_stat("/private/f", true)), ErrorKind::Forbidden);
        // the directory itself can still be stat'ed
        assert!(cat.extended_stat("/private", true).is_ok());
    }

    #[test]
    fn test_missing_security_context() {
        let (_dir, inode) = create_test_inode();
        let cat = BuiltInCatalog::new(inode.clone(), &CatalogConfig::default());
        assert_eq!(kind_of(cat.extended_stat("/", true)), ErrorKind::InvalidState);
    }

    #[test]
    fn test_working_directory() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let mut cat = user_catalog(&inode);
        assert_eq!(cat.get_working_dir(), "");

        cat.change_dir("/home/user").unwrap();
        assert_eq!(cat.get_working_dir(), "/home/user");
        assert_eq!(
            cat.extended_stat(".", true).unwrap().inode(),
            cat.extended_stat("/home/user", true).unwrap().inode()
        );

        cat.create("f", 0o644).unwrap();
        cat.make_dir("sub", 0o755).unwrap();
        assert!(cat.extended_stat("/home/user/f", true).unwrap().is_reg());

        cat.change_dir("sub").unwrap();
        assert_eq!(cat.get_working_dir(), "/home/user/sub");
        assert!(cat.extended_stat("../f", true).unwrap().is_reg());

        assert_eq!(kind_of(cat.change_dir("/home/user/f")), ErrorKind::NotDirectory);

        cat.change_dir("").unwrap();
        assert_eq!(cat.get_working_dir(), "");
        assert_eq!(kind_of(cat.extended_stat("f", true)), ErrorKind::NotFound);
    }

    #[test]
    fn test_relative_paths_without_working_dir() {
        let (_dir, inode) = create_test_inode();
        let cat = root_catalog(&inode);
        assert_eq!(cat.get_working_dir(), "");

        cat.create("f", 0o644).unwrap();
        let f = cat.extended_stat("/f", true).unwrap();
        assert_eq!(cat.extended_stat("f", true).unwrap().inode(), f.inode());
        assert_eq!(cat.extended_stat("/f", true).unwrap().inode(), f.inode());
        cat.set_mode("f", 0o600).unwrap();
        assert_eq!(cat.extended_stat("/f", true).unwrap().stat.mode & 0o7777, 0o600);

        cat.make_dir("d", 0o755).unwrap();
        let dir = cat.open_dir("d").unwrap();
        cat.close_dir(dir).unwrap();
        assert_eq!(
            cat.extended_stat("d/../f", true).unwrap().inode(),
            f.inode()
        );
        cat.unlink("f").unwrap();
        assert!(cat.extended_stat("/f", true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_parent() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let mut cat = user_catalog(&inode);

        let (parent, parent_path, name) = cat.get_parent("/home/user/f").unwrap();
        assert_eq!(parent.name, "user");
        assert_eq!(parent_path, "/home/user");
        assert_eq!(name, "f");

        let (parent, parent_path, name) = cat.get_parent("f").unwrap();
        assert_eq!(parent.name, "/");
        assert_eq!(parent_path, "/");
        assert_eq!(name, "f");

        cat.change_dir("/home").unwrap();
        let (parent, parent_path, _) = cat.get_parent("f").unwrap();
        assert_eq!(parent.name, "home");
        assert_eq!(parent_path, "/home");

        assert_eq!(kind_of(cat.get_parent("/")), ErrorKind::InvalidValue);
    }

    // ==================== Symbolic links ====================

    #[test]
    fn test_symlink_chain_limit() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/target", 0o644).unwrap();
        cat.symlink("/home/user/target", "/home/user/l1").unwrap();
        cat.symlink("/home/user/l1", "/home/user/l2").unwrap();
        cat.symlink("/home/user/l2", "/home/user/l3").unwrap();
        cat.symlink("/home/user/l3", "/home/user/l4").unwrap();

        let target = cat.extended_stat("/home/user/target", true).unwrap();
        assert_eq!(cat.extended_stat("/home/user/l3", true).unwrap().inode(), target.inode());
        assert_eq!(
            kind_of(cat.extended_stat("/home/user/l4", true)),
            ErrorKind::TooManySymlinks
        );

        // not following the final link never counts a hop
        let link = cat.extended_stat("/home/user/l4", false).unwrap();
        assert!(link.is_link());
    }

    #[test]
    fn test_symlink_limit_from_config() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let config = CatalogConfig {
            sym_link_limit: 1,
            ..Default::default()
        };
        let cat = BuiltInCatalog::new(inode.clone(), &config)
            .with_security_context(SecurityContext::from_ids(USER, &[100]));
        cat.create("/home/user/target", 0o644).unwrap();
        cat.symlink("/home/user/target", "/home/user/l1").unwrap();
        cat.symlink("/home/user/l1", "/home/user/l2").unwrap();

        assert!(cat.extended_stat("/home/user/l1", true).is_ok());
        assert_eq!(
            kind_of(cat.extended_stat("/home/user/l2", true)),
            ErrorKind::TooManySymlinks
        );
    }

    #[test]
    fn test_symlink_relative_and_intermediate() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/data", 0o755).unwrap();
        cat.create("/home/user/data/file", 0o644).unwrap();
        cat.create("/home/user/top", 0o644).unwrap();

        cat.symlink("data", "/home/user/rel").unwrap();
        cat.symlink("../top", "/home/user/data/up").unwrap();

        let file = cat.extended_stat("/home/user/data/file", true).unwrap();
        assert_eq!(
            cat.extended_stat("/home/user/rel/file", true).unwrap().inode(),
            file.inode()
        );
        // intermediate links are followed even without follow_sym
        assert_eq!(
            cat.extended_stat("/home/user/rel/file", false).unwrap().inode(),
            file.inode()
        );
        assert_eq!(
            cat.extended_stat("/home/user/data/up", true).unwrap().inode(),
            cat.extended_stat("/home/user/top", true).unwrap().inode()
        );
    }

    #[test]
    fn test_symlink_and_read_link() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.symlink("/home/user/f", "/home/user/link").unwrap();

        let link = cat.extended_stat("/home/user/link", false).unwrap();
        assert_eq!(link.stat.mode, S_IFLNK | 0o777);
        assert_eq!(link.stat.uid, USER);
        assert_eq!(link.stat.size, 0);
        assert_eq!(cat.read_link("/home/user/link").unwrap(), "/home/user/f");
        assert_eq!(kind_of(cat.read_link("/home/user/f")), ErrorKind::InvalidValue);

        assert_eq!(
            kind_of(cat.symlink("/home/user/f", "/home/user/link")),
            ErrorKind::AlreadyExists
        );
        // a failed symlink leaves no transaction behind
        cat.symlink("/home/user/f", "/home/user/link2").unwrap();

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(
            kind_of(other.symlink("/home/user/f", "/home/user/evil")),
            ErrorKind::Forbidden
        );
    }

    // ==================== Create / mkdir ====================

    #[test]
    fn test_create_file() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o666).unwrap();

        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.stat.mode, S_IFREG | 0o644);
        assert_eq!(meta.stat.uid, USER);
        assert_eq!(meta.stat.gid, 100);
        assert_eq!(meta.stat.size, 0);
        assert!(meta.acl.is_empty());
    }

    #[test]
    fn test_create_honors_umask() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let mut cat = user_catalog(&inode);
        assert_eq!(cat.umask(0o077), 0o022);
        cat.create("/home/user/f", 0o666).unwrap();
        cat.make_dir("/home/user/d", 0o777).unwrap();
        assert_eq!(
            cat.extended_stat("/home/user/f", true).unwrap().stat.mode,
            S_IFREG | 0o600
        );
        assert_eq!(
            cat.extended_stat("/home/user/d", true).unwrap().stat.mode,
            S_IFDIR | 0o700
        );
        assert_eq!(cat.umask(0o022), 0o077);
    }

    #[test]
    fn test_create_missing_parent() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        assert_eq!(kind_of(cat.create("/home/user/a/b", 0o644)), ErrorKind::NotFound);
        assert_eq!(kind_of(cat.make_dir("/home/user/a/b", 0o755)), ErrorKind::NotFound);
    }

    #[test]
    fn test_create_needs_write_on_parent() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.create("/home/user/f", 0o644)), ErrorKind::Forbidden);
        assert_eq!(kind_of(other.make_dir("/home/user/d", 0o755)), ErrorKind::Forbidden);
    }

    #[test]
    fn test_create_existing_truncates() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.set_size("/home/user/f", 1024).unwrap();
        let before = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(before.stat.size, 1024);

        cat.create("/home/user/f", 0o600).unwrap();
        let after = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(after.inode(), before.inode());
        assert_eq!(after.stat.size, 0);
        assert_eq!(after.stat.mode, before.stat.mode);

        cat.make_dir("/home/user/d", 0o755).unwrap();
        assert_eq!(kind_of(cat.create("/home/user/d", 0o644)), ErrorKind::IsDirectory);
    }

    #[test]
    fn test_create_existing_with_replicas() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&Replica::new(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();
        assert_eq!(kind_of(cat.create("/home/user/f", 0o644)), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_make_dir_existing() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        assert_eq!(kind_of(cat.make_dir("/home/user/d", 0o755)), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_setgid_directory_propagates_group() {
        let (_dir, inode) = create_test_inode();
        let root = root_catalog(&inode);
        root.make_dir("/shared", 0o777).unwrap();
        root.set_owner("/shared", None, Some(500), true).unwrap();
        root.set_mode("/shared", 0o2777).unwrap();

        let cat = user_catalog(&inode);
        cat.create("/shared/f", 0o644).unwrap();
        cat.make_dir("/shared/d", 0o755).unwrap();
        cat.symlink("/shared/f", "/shared/l").unwrap();

        let file = cat.extended_stat("/shared/f", true).unwrap();
        assert_eq!(file.stat.gid, 500);
        let dir = cat.extended_stat("/shared/d", true).unwrap();
        assert_eq!(dir.stat.gid, 500);
        assert_ne!(dir.stat.mode & ns_lib::S_ISGID, 0);
        assert_eq!(cat.extended_stat("/shared/l", false).unwrap().stat.gid, 500);
    }

    // ==================== ACL inheritance ====================

    fn create_acl_dir(inode: &Arc<dyn INode>) {
        let root = root_catalog(inode);
        root.make_dir("/acl", 0o755).unwrap();
        let acl: Acl = "A70,C50,F50,a70,c50,d7300,e50,f00".parse().unwrap();
        root.set_acl("/acl", &acl).unwrap();
    }

    #[test]
    fn test_make_dir_inherits_default_acl() {
        let (_dir, inode) = create_test_inode();
        create_acl_dir(&inode);
        let root = root_catalog(&inode);
        root.make_dir("/acl/child", 0o775).unwrap();

        let child = root.extended_stat("/acl/child", true).unwrap();
        assert_eq!(child.stat.mode & S_IFMT, S_IFDIR);
        assert_eq!(child.stat.mode & 0o777, 0o750);

        let named = child.acl.get(AclKind::Group, false).unwrap();
        assert_eq!(named.id, 300);
        assert_eq!(named.perm, 7);
        assert_eq!(child.acl.get(AclKind::Mask, false).unwrap().perm, 5);
        assert_eq!(child.acl.get(AclKind::UserObj, false).unwrap().id, 0);
        // directories pass the defaults on
        assert!(child.acl.has_defaults());
        assert!(child.acl.validate().is_ok());
    }

    #[test]
    fn test_create_file_inherits_default_acl() {
        let (_dir, inode) = create_test_inode();
        create_acl_dir(&inode);
        let root = root_catalog(&inode);
        root.create("/acl/f", 0o644).unwrap();
        root.set_comment("/acl/f", "shared").unwrap();

        let file = root.extended_stat("/acl/f", true).unwrap();
        assert_eq!(file.stat.mode, S_IFREG | 0o640);
        assert!(!file.acl.has_defaults());
        assert_eq!(file.acl.get(AclKind::Mask, false).unwrap().perm, 4);

        // member of the named group reads through the mask but can not write
        let member = catalog_as(&inode, 500, &[300]);
        assert_eq!(member.get_comment("/acl/f").unwrap(), "shared");
        assert_eq!(
            kind_of(member.set_comment("/acl/f", "mine")),
            ErrorKind::Forbidden
        );

        let outsider = catalog_as(&inode, 600, &[600]);
        assert_eq!(kind_of(outsider.get_comment("/acl/f")), ErrorKind::Forbidden);
    }

    // ==================== Unlink / rmdir ====================

    #[test]
    fn test_unlink_file_and_link() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.symlink("/home/user/f", "/home/user/l").unwrap();

        cat.unlink("/home/user/l").unwrap();
        assert!(cat.extended_stat("/home/user/f", true).is_ok());
        cat.unlink("/home/user/f").unwrap();
        assert_eq!(kind_of(cat.extended_stat("/home/user/f", true)), ErrorKind::NotFound);
        assert_eq!(kind_of(cat.unlink("/home/user/f")), ErrorKind::NotFound);
    }

    #[test]
    fn test_unlink_directory_fails() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        assert_eq!(kind_of(cat.unlink("/home/user/d")), ErrorKind::IsDirectory);
    }

    #[test]
    fn test_unlink_needs_write_on_parent() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        user_catalog(&inode).create("/home/user/f", 0o666).unwrap();
        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.unlink("/home/user/f")), ErrorKind::Forbidden);
    }

    #[test]
    fn test_unlink_with_replicas_without_pools() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&Replica::new(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();

        assert_eq!(kind_of(cat.unlink("/home/user/f")), ErrorKind::AlreadyExists);
        assert!(cat.extended_stat("/home/user/f", true).is_ok());
    }

    #[test]
    fn test_unlink_removes_replicas_through_pool() {
        let (dir, inode) = create_test_inode();
        create_home(&inode);
        let state = Arc::new(MockPoolState::default());
        let cat = create_pool_catalog(&dir, &inode, state.clone());
        assert!(cat.is_there_pool_manager());

        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&pool_replica(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();
        cat.add_replica(&pool_replica(file.inode(), "disk02", "/srv/f.2"))
            .unwrap();

        cat.unlink("/home/user/f").unwrap();
        let mut removed = state.removed.lock().unwrap().clone();
        removed.sort();
        assert_eq!(removed, vec!["/srv/f.1".to_string(), "/srv/f.2".to_string()]);
        assert_eq!(kind_of(cat.extended_stat("/home/user/f", true)), ErrorKind::NotFound);
        assert_eq!(kind_of(cat.get_replica("/srv/f.1")), ErrorKind::NotFound);
    }

    #[test]
    fn test_unlink_tolerates_entry_removed_by_pool() {
        let (dir, inode) = create_test_inode();
        create_home(&inode);
        let state = Arc::new(MockPoolState::default());
        *state.unlink_on_remove.lock().unwrap() = Some(inode.clone());
        let cat = create_pool_catalog(&dir, &inode, state.clone());

        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&pool_replica(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();

        cat.unlink("/home/user/f").unwrap();
        assert_eq!(state.removed.lock().unwrap().len(), 1);
        assert_eq!(kind_of(cat.extended_stat("/home/user/f", true)), ErrorKind::NotFound);
    }

    #[test]
    fn test_sticky_directory() {
        let (_dir, inode) = create_test_inode();
        create_tmp(&inode);
        let owner = user_catalog(&inode);
        let other = catalog_as(&inode, OTHER_USER, &[200]);
        owner.create("/tmp/a", 0o644).unwrap();
        owner.create("/tmp/b", 0o644).unwrap();
        owner.make_dir("/tmp/d", 0o755).unwrap();

        assert_eq!(kind_of(other.unlink("/tmp/a")), ErrorKind::Forbidden);
        assert_eq!(kind_of(other.remove_dir("/tmp/d")), ErrorKind::Forbidden);
        assert_eq!(kind_of(other.rename("/tmp/a", "/tmp/c")), ErrorKind::Forbidden);

        owner.unlink("/tmp/a").unwrap();
        owner.remove_dir("/tmp/d").unwrap();
        // the directory owner may remove anything
        root_catalog(&inode).unlink("/tmp/b").unwrap();
    }

    #[test]
    fn test_remove_dir() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        cat.create("/home/user/d/f", 0o644).unwrap();
        cat.create("/home/user/f", 0o644).unwrap();

        assert_eq!(kind_of(cat.remove_dir("/home/user/d")), ErrorKind::AlreadyExists);
        assert_eq!(kind_of(cat.remove_dir("/home/user/f")), ErrorKind::NotDirectory);
        assert_eq!(kind_of(cat.remove_dir("/")), ErrorKind::InvalidValue);

        cat.unlink("/home/user/d/f").unwrap();
        cat.set_comment("/home/user/d", "scratch").unwrap();
        let d = cat.extended_stat("/home/user/d", true).unwrap();
        cat.remove_dir("/home/user/d").unwrap();
        assert_eq!(kind_of(cat.extended_stat("/home/user/d", true)), ErrorKind::NotFound);
        assert!(inode.get_comment(d.inode()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_cwd() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let mut cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        cat.change_dir("/home/user/d").unwrap();
        assert_eq!(kind_of(cat.remove_dir("/home/user/d")), ErrorKind::IsCwd);
    }

    // ==================== Rename ====================

    #[test]
    fn test_rename_in_place_and_across() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/a", 0o644).unwrap();
        cat.make_dir("/home/user/d", 0o755).unwrap();
        let a = cat.extended_stat("/home/user/a", true).unwrap();

        cat.rename("/home/user/a", "/home/user/b").unwrap();
        assert_eq!(kind_of(cat.extended_stat("/home/user/a", true)), ErrorKind::NotFound);
        assert_eq!(cat.extended_stat("/home/user/b", true).unwrap().inode(), a.inode());

        cat.rename("/home/user/b", "/home/user/d/c").unwrap();
        let moved = cat.extended_stat("/home/user/d/c", true).unwrap();
        assert_eq!(moved.inode(), a.inode());
        assert_eq!(cat.extended_stat("/home/user/d", true).unwrap().stat.nlink, 1);
    }

    #[test]
    fn test_rename_same_parent_touches_mtime() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/a", 0o644).unwrap();
        let old = Utimbuf {
            actime: 1,
            modtime: 1,
        };
        cat.utime("/home/user", Some(&old)).unwrap();

        // renaming onto itself is a no-op and leaves the parent alone
        cat.rename("/home/user/a", "/home/user/a").unwrap();
        assert_eq!(cat.extended_stat("/home/user", true).unwrap().stat.mtime, 1);

        cat.rename("/home/user/a", "/home/user/b").unwrap();
        assert!(cat.extended_stat("/home/user", true).unwrap().stat.mtime > 1);
    }

    #[test]
    fn test_rename_replaces_destination() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/a", 0o644).unwrap();
        cat.create("/home/user/b", 0o644).unwrap();
        let a = cat.extended_stat("/home/user/a", true).unwrap();

        cat.rename("/home/user/a", "/home/user/b").unwrap();
        assert_eq!(cat.extended_stat("/home/user/b", true).unwrap().inode(), a.inode());
        assert_eq!(cat.extended_stat("/home/user", true).unwrap().stat.nlink, 1);
    }

    #[test]
    fn test_rename_type_mismatch_and_non_empty() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.make_dir("/home/user/d1", 0o755).unwrap();
        cat.make_dir("/home/user/d2", 0o755).unwrap();
        cat.create("/home/user/d2/x", 0o644).unwrap();

        assert_eq!(kind_of(cat.rename("/home/user/f", "/home/user/d1")), ErrorKind::IsDirectory);
        assert_eq!(kind_of(cat.rename("/home/user/d1", "/home/user/f")), ErrorKind::NotDirectory);
        assert_eq!(
            kind_of(cat.rename("/home/user/d1", "/home/user/d2")),
            ErrorKind::AlreadyExists
        );
        assert!(cat.extended_stat("/home/user/d1", true).is_ok());
    }

    #[test]
    fn test_rename_propagates_destination_removal_error() {
        let (_dir, inode) = create_test_inode();
        create_tmp(&inode);
        catalog_as(&inode, OTHER_USER, &[200])
            .create("/tmp/theirs", 0o644)
            .unwrap();
        let cat = user_catalog(&inode);
        cat.create("/tmp/mine", 0o644).unwrap();

        assert_eq!(
            kind_of(cat.rename("/tmp/mine", "/tmp/theirs")),
            ErrorKind::Forbidden
        );
        assert!(cat.extended_stat("/tmp/mine", true).is_ok());
        assert_eq!(cat.extended_stat("/tmp/theirs", true).unwrap().stat.uid, OTHER_USER);
    }

    #[test]
    fn test_rename_failure_rolls_back() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/a", 0o755).unwrap();
        cat.make_dir("/home/user/b", 0o755).unwrap();
        cat.create("/home/user/a/x", 0o644).unwrap();
        let x = cat.extended_stat("/home/user/a/x", true).unwrap();
        cat.create("/home/user/a/y", 0o644).unwrap();

        // the leaf rename collides with /home/user/a/y inside the transaction
        assert_eq!(
            kind_of(cat.rename("/home/user/a/x", "/home/user/b/y")),
            ErrorKind::AlreadyExists
        );
        let still = cat.extended_stat("/home/user/a/x", true).unwrap();
        assert_eq!(still.inode(), x.inode());
        assert_eq!(still.parent, cat.extended_stat("/home/user/a", true).unwrap().inode());
        assert!(cat
            .extended_stat("/home/user/b/y", true)
            .unwrap_err()
            .is_not_found());

        // no transaction is left open
        let txn = TransactionGuard::begin(inode.as_ref()).unwrap();
        txn.commit().unwrap();
        cat.rename("/home/user/a/x", "/home/user/b/x").unwrap();
        assert_eq!(
            cat.extended_stat("/home/user/b/x", true).unwrap().inode(),
            x.inode()
        );
    }

    #[test]
    fn test_rename_into_descendant() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        cat.make_dir("/home/user/d/child", 0o755).unwrap();

        assert_eq!(
            kind_of(cat.rename("/home/user/d", "/home/user/d/child/x")),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            kind_of(cat.rename("/home/user/d", "/home/user/d/child/../x")),
            ErrorKind::InvalidValue
        );
        assert!(cat.extended_stat("/home/user/d/child", true).is_ok());
    }

    #[test]
    fn test_rename_root_and_cwd() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let mut cat = user_catalog(&inode);
        cat.make_dir("/home/user/d", 0o755).unwrap();
        assert_eq!(kind_of(cat.rename("/", "/home/user/x")), ErrorKind::InvalidValue);
        assert_eq!(kind_of(cat.rename("/home/user/d", "/")), ErrorKind::InvalidValue);

        cat.change_dir("/home/user/d").unwrap();
        assert_eq!(kind_of(cat.rename("/home/user/d", "/home/user/e")), ErrorKind::IsCwd);
    }

    #[test]
    fn test_rename_needs_write_on_both_parents() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let root = root_catalog(&inode);
        root.make_dir("/ro", 0o755).unwrap();
        let cat = user_catalog(&inode);
        cat.create("/home/user/a", 0o644).unwrap();
        assert_eq!(kind_of(cat.rename("/home/user/a", "/ro/a")), ErrorKind::Forbidden);
    }

    // ==================== Mode / owner / ACL ====================

    #[test]
    fn test_set_mode() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();

        cat.set_mode("/home/user/f", 0o600).unwrap();
        assert_eq!(cat.extended_stat("/home/user/f", true).unwrap().stat.mode, S_IFREG | 0o600);

        // type bits in the request are ignored; sticky is stripped on files
        cat.set_mode("/home/user/f", S_IFDIR | 0o1640).unwrap();
        assert_eq!(cat.extended_stat("/home/user/f", true).unwrap().stat.mode, S_IFREG | 0o640);

        cat.set_mode("/home/user/f", 0o2640).unwrap();
        assert_eq!(
            cat.extended_stat("/home/user/f", true).unwrap().stat.mode,
            S_IFREG | 0o2640
        );

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.set_mode("/home/user/f", 0o777)), ErrorKind::Forbidden);
    }

    #[test]
    fn test_set_mode_strips_setgid_for_foreign_group() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        root_catalog(&inode)
            .set_owner("/home/user/f", None, Some(999), true)
            .unwrap();

        cat.set_mode("/home/user/f", 0o2644).unwrap();
        assert_eq!(cat.extended_stat("/home/user/f", true).unwrap().stat.mode, S_IFREG | 0o644);
    }

    #[test]
    fn test_set_mode_syncs_acl() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.set_acl("/home/user/f", &"A60,C40,F40".parse().unwrap())
            .unwrap();

        cat.set_mode("/home/user/f", 0o751).unwrap();
        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.acl.get(AclKind::UserObj, false).unwrap().perm, 7);
        assert_eq!(meta.acl.get(AclKind::GroupObj, false).unwrap().perm, 5);
        assert_eq!(meta.acl.get(AclKind::Other, false).unwrap().perm, 1);
    }

    #[test]
    fn test_set_owner() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let before = cat.extended_stat("/home/user/f", true).unwrap();

        cat.set_owner("/home/user/f", None, None, true).unwrap();
        cat.set_owner("/home/user/f", Some(USER), Some(100), true)
            .unwrap();
        let same = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!((same.stat.uid, same.stat.gid), (before.stat.uid, before.stat.gid));

        assert_eq!(
            kind_of(cat.set_owner("/home/user/f", Some(OTHER_USER), None, true)),
            ErrorKind::BadOperation
        );
        assert_eq!(
            kind_of(cat.set_owner("/home/user/f", None, Some(999), true)),
            ErrorKind::BadOperation
        );

        cat.set_owner("/home/user/f", None, Some(101), true).unwrap();
        assert_eq!(cat.extended_stat("/home/user/f", true).unwrap().stat.gid, 101);

        // only the owner may move the file to one of its groups
        let other = catalog_as(&inode, OTHER_USER, &[100]);
        assert_eq!(
            kind_of(other.set_owner("/home/user/f", None, Some(100), true)),
            ErrorKind::BadOperation
        );
    }

    #[test]
    fn test_set_owner_as_root_updates_acl() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.set_acl("/home/user/f", &"A60,C40,F40".parse().unwrap())
            .unwrap();

        root_catalog(&inode)
            .set_owner("/home/user/f", Some(OTHER_USER), Some(200), true)
            .unwrap();
        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.stat.uid, OTHER_USER);
        assert_eq!(meta.stat.gid, 200);
        assert_eq!(meta.acl.get(AclKind::UserObj, false).unwrap().id, OTHER_USER);
        assert_eq!(meta.acl.get(AclKind::GroupObj, false).unwrap().id, 200);
    }

    #[test]
    fn test_set_owner_on_link_itself() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.symlink("/home/user/f", "/home/user/l").unwrap();

        cat.set_owner("/home/user/l", None, Some(101), false).unwrap();
        assert_eq!(cat.extended_stat("/home/user/l", false).unwrap().stat.gid, 101);
        assert_eq!(cat.extended_stat("/home/user/f", true).unwrap().stat.gid, 100);
    }

    #[test]
    fn test_set_acl() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();

        // owner ids are forced to the entry's uid/gid
        cat.set_acl("/home/user/f", &"A70,B5400,C70,E50,F00".parse().unwrap())
            .unwrap();
        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.stat.mode, S_IFREG | 0o750);
        assert_eq!(meta.acl.get(AclKind::UserObj, false).unwrap().id, USER);
        assert_eq!(meta.acl.get(AclKind::GroupObj, false).unwrap().id, 100);
        assert_eq!(meta.acl.len(), 5);

        // named user 400 gets r-x through the mask
        let named = catalog_as(&inode, 400, &[400]);
        assert!(named.get_comment("/home/user/f").unwrap_err().is_not_found());

        assert_eq!(
            kind_of(cat.set_acl("/home/user/f", &"A70,C50,F50,a70,c50,f50".parse().unwrap())),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            kind_of(cat.set_acl("/home/user/f", &"A70,C50".parse().unwrap())),
            ErrorKind::InvalidValue
        );

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(
            kind_of(other.set_acl("/home/user/f", &"A70,C50,F50".parse().unwrap())),
            ErrorKind::Forbidden
        );
    }

    // ==================== Setters ====================

    #[test]
    fn test_set_size_and_checksum() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        cat.set_mode("/home/user/f", 0o444).unwrap();

        // the owner does not need write permission
        cat.set_size("/home/user/f", 42).unwrap();
        cat.set_checksum("/home/user/f", "AD", "1a2b3c4d").unwrap();
        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.stat.size, 42);
        assert_eq!(meta.csumtype, "AD");
        assert_eq!(meta.csumvalue, "1a2b3c4d");

        assert_eq!(
            kind_of(cat.set_checksum("/home/user/f", "SHA1", "abc")),
            ErrorKind::InvalidValue
        );

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.set_size("/home/user/f", 1)), ErrorKind::Forbidden);
        assert_eq!(
            kind_of(other.set_checksum("/home/user/f", "MD", "x")),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_comment_guid_and_xattr() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();

        assert!(cat.get_comment("/home/user/f").unwrap_err().is_not_found());
        cat.set_comment("/home/user/f", "calibration run").unwrap();
        assert_eq!(cat.get_comment("/home/user/f").unwrap(), "calibration run");

        cat.set_guid("/home/user/f", "5f8c6c1e-guid").unwrap();
        let mut attrs = Extensible::new();
        attrs.set("experiment", "atlas");
        attrs.set("run", 42i64);
        cat.update_extended_attributes("/home/user/f", &attrs)
            .unwrap();

        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(meta.guid, "5f8c6c1e-guid");
        assert_eq!(meta.xattr.get_string("experiment").unwrap(), "atlas");
        assert_eq!(meta.xattr.get_long("run").unwrap(), 42);

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(other.get_comment("/home/user/f").unwrap(), "calibration run");
        assert_eq!(kind_of(other.set_comment("/home/user/f", "x")), ErrorKind::Forbidden);
        assert_eq!(kind_of(other.set_guid("/home/user/f", "x")), ErrorKind::Forbidden);
        assert_eq!(
            kind_of(other.update_extended_attributes("/home/user/f", &attrs)),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_utime() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();

        let buf = Utimbuf {
            actime: 1000,
            modtime: 2000,
        };
        cat.utime("/home/user/f", Some(&buf)).unwrap();
        let meta = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!((meta.stat.atime, meta.stat.mtime), (1000, 2000));

        cat.utime("/home/user/f", None).unwrap();
        assert!(cat.extended_stat("/home/user/f", true).unwrap().stat.mtime > 2000);

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.utime("/home/user/f", None)), ErrorKind::Forbidden);
    }

    // ==================== Directories ====================

    #[test]
    fn test_read_dir() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/b", 0o644).unwrap();
        cat.make_dir("/home/user/a", 0o755).unwrap();
        cat.symlink("/home/user/b", "/home/user/c").unwrap();

        let mut dir = cat.open_dir("/home/user").unwrap();
        assert_eq!(dir.stat().name, "user");
        let first = cat.read_dir(&mut dir).unwrap().unwrap();
        assert_eq!((first.name.as_str(), first.kind), ("a", DirEntryKind::Directory));
        let second = cat.read_dirx(&mut dir).unwrap().unwrap();
        assert_eq!(second.name, "b");
        assert!(second.is_reg());
        let third = cat.read_dir(&mut dir).unwrap().unwrap();
        assert_eq!(third.kind, DirEntryKind::SymLink);
        assert!(cat.read_dir(&mut dir).unwrap().is_none());
        cat.close_dir(dir).unwrap();

        assert_eq!(kind_of(cat.open_dir("/home/user/b")), ErrorKind::NotDirectory);
    }

    #[test]
    fn test_open_dir_needs_read() {
        let (_dir, inode) = create_test_inode();
        let root = root_catalog(&inode);
        root.make_dir("/dropbox", 0o711).unwrap();
        root.create("/dropbox/f", 0o644).unwrap();

        let cat = user_catalog(&inode);
        assert_eq!(kind_of(cat.open_dir("/dropbox")), ErrorKind::Forbidden);
        // search is still allowed
        assert!(cat.extended_stat("/dropbox/f", true).is_ok());
    }

    #[test]
    fn test_dir_iteration_touches_atime() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let old = Utimbuf {
            actime: 1,
            modtime: 2,
        };
        cat.utime("/home/user", Some(&old)).unwrap();

        let mut dir = cat.open_dir("/home/user").unwrap();
        let meta = cat.extended_stat("/home/user", true).unwrap();
        assert!(meta.stat.atime > 1);
        assert_eq!(meta.stat.mtime, 2);

        cat.utime("/home/user", Some(&old)).unwrap();
        cat.read_dir(&mut dir).unwrap();
        assert!(cat.extended_stat("/home/user", true).unwrap().stat.atime > 1);
        cat.close_dir(dir).unwrap();

        // plain stat never touches it
        cat.utime("/home/user", Some(&old)).unwrap();
        cat.extended_stat("/home/user", true).unwrap();
        assert_eq!(cat.extended_stat("/home/user", true).unwrap().stat.atime, 1);
    }

    #[test]
    fn test_dir_iteration_keeps_newer_mtime() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.utime(
            "/home/user",
            Some(&Utimbuf {
                actime: 1,
                modtime: 2,
            }),
        )
        .unwrap();

        let mut dir = cat.open_dir("/home/user").unwrap();
        cat.create("/home/user/f", 0o644).unwrap();
        let created = cat.extended_stat("/home/user", true).unwrap();
        assert!(created.stat.mtime > 2);

        cat.read_dir(&mut dir).unwrap();
        cat.read_dirx(&mut dir).unwrap();
        let after = cat.extended_stat("/home/user", true).unwrap();
        assert_eq!(after.stat.mtime, created.stat.mtime);
        assert_eq!(after.stat.ctime, created.stat.ctime);
        cat.close_dir(dir).unwrap();
    }

    #[test]
    fn test_atime_updates_can_be_disabled() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let config = CatalogConfig {
            update_access_time: false,
            ..Default::default()
        };
        let cat = BuiltInCatalog::new(inode.clone(), &config)
            .with_security_context(SecurityContext::from_ids(USER, &[100]));
        let old = Utimbuf {
            actime: 1,
            modtime: 2,
        };
        cat.utime("/home/user", Some(&old)).unwrap();

        let mut dir = cat.open_dir("/home/user").unwrap();
        cat.read_dir(&mut dir).unwrap();
        cat.close_dir(dir).unwrap();
        assert_eq!(cat.extended_stat("/home/user", true).unwrap().stat.atime, 1);
    }

    // ==================== Replicas ====================

    #[test]
    fn test_replica_lifecycle() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();

        let mut replica = Replica::new(file.inode(), "disk01", "/srv/f.1");
        replica.status = ReplicaStatus::BeingPopulated;
        cat.add_replica(&replica).unwrap();

        let replicas = cat.get_replicas("/home/user/f").unwrap();
        assert_eq!(replicas.len(), 1);
        let mut stored = cat.get_replica("/srv/f.1").unwrap();
        assert_eq!(stored.file_id, file.inode());
        assert_eq!(stored.status, ReplicaStatus::BeingPopulated);

        stored.status = ReplicaStatus::Available;
        cat.update_replica(&stored).unwrap();
        assert_eq!(cat.get_replica("/srv/f.1").unwrap().status, ReplicaStatus::Available);

        cat.delete_replica(&stored).unwrap();
        assert!(cat.get_replicas("/home/user/f").unwrap().is_empty());
        assert_eq!(kind_of(cat.get_replica("/srv/f.1")), ErrorKind::NotFound);
    }

    #[test]
    fn test_replica_needs_write_on_file() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&Replica::new(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();

        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(
            kind_of(other.add_replica(&Replica::new(file.inode(), "disk02", "/srv/f.2"))),
            ErrorKind::Forbidden
        );
        let stored = other.get_replica("/srv/f.1").unwrap();
        assert_eq!(kind_of(other.update_replica(&stored)), ErrorKind::Forbidden);
        assert_eq!(kind_of(other.delete_replica(&stored)), ErrorKind::Forbidden);
    }

    #[test]
    fn test_replica_needs_search_on_ancestors() {
        let (_dir, inode) = create_test_inode();
        let root = root_catalog(&inode);
        root.make_dir("/private", 0o700).unwrap();
        root.create("/private/f", 0o666).unwrap();
        root.set_owner("/private/f", Some(USER), Some(100), true)
            .unwrap();
        let file = root.extended_stat("/private/f", true).unwrap();
        root.add_replica(&Replica::new(file.inode(), "disk01", "/srv/p.1"))
            .unwrap();

        let cat = user_catalog(&inode);
        assert_eq!(
            kind_of(cat.add_replica(&Replica::new(file.inode(), "disk02", "/srv/p.2"))),
            ErrorKind::Forbidden
        );
        assert_eq!(kind_of(cat.get_replica("/srv/p.1")), ErrorKind::Forbidden);
    }

    #[test]
    fn test_get_replicas_needs_read() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o600).unwrap();
        let other = catalog_as(&inode, OTHER_USER, &[200]);
        assert_eq!(kind_of(other.get_replicas("/home/user/f")), ErrorKind::Forbidden);
    }

    #[test]
    fn test_where_to_read() {
        let (dir, inode) = create_test_inode();
        create_home(&inode);
        let state = Arc::new(MockPoolState::default());
        let cat = create_pool_catalog(&dir, &inode, state);

        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        assert_eq!(kind_of(cat.where_to_read("/home/user/f")), ErrorKind::NoReplicas);

        let mut deleted = pool_replica(file.inode(), "disk01", "/srv/f.1");
        deleted.status = ReplicaStatus::ToBeDeleted;
        cat.add_replica(&deleted).unwrap();
        cat.add_replica(&pool_replica(file.inode(), "down.example.org", "/srv/f.2"))
            .unwrap();
        assert_eq!(kind_of(cat.where_to_read("/home/user/f")), ErrorKind::NoReplicas);

        cat.add_replica(&pool_replica(file.inode(), "disk03", "/srv/f.3"))
            .unwrap();
        let location = cat.where_to_read("/home/user/f").unwrap();
        assert_eq!(location.len(), 1);
        assert_eq!(location[0].host, "disk03");
        assert_eq!(location[0].path, "/srv/f.3");
    }

    #[test]
    fn test_where_to_read_without_pools() {
        let (_dir, inode) = create_test_inode();
        create_home(&inode);
        let cat = user_catalog(&inode);
        cat.create("/home/user/f", 0o644).unwrap();
        let file = cat.extended_stat("/home/user/f", true).unwrap();
        cat.add_replica(&pool_replica(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();
        assert_eq!(kind_of(cat.where_to_read("/home/user/f")), ErrorKind::NotImplemented);
    }

    // ==================== Stack ====================

    fn create_plugin_manager(dir: &TempDir) -> PluginManager {
        init_logging();
        let db_path = dir.path().join("stack.db");
        let mut manager = PluginManager::new();
        manager.register_inode_factory(Arc::new(SqliteINodeFactory::default()));
        manager
            .configure("DatabasePath", db_path.to_str().unwrap())
            .unwrap();
        manager
    }

    #[test]
    fn test_plugin_manager_configure() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);

        manager.configure("SymLinkLimit", "8").unwrap();
        assert_eq!(manager.catalog_config().sym_link_limit, 8);
        manager.configure("UpdateAccessTime", "no").unwrap();
        assert!(!manager.catalog_config().update_access_time);

        assert!(manager
            .configure("NoSuchOption", "1")
            .unwrap_err()
            .is_unknown_option());
        assert_eq!(
            kind_of(manager.configure("SymLinkLimit", "-1")),
            ErrorKind::InvalidValue
        );
    }

    /// Accepts nothing and fails hard on `SymLinkLimit`.
    struct StrictDriverFactory;

    impl BaseFactory for StrictDriverFactory {
        fn configure(&self, key: &str, value: &str) -> NsResult<()> {
            match key {
                "SymLinkLimit" => Err(NsError::InvalidValue(format!(
                    "strict driver refuses {} = {}",
                    key, value
                ))),
                _ => Err(NsError::UnknownOption(key.to_string())),
            }
        }
    }

    impl PoolDriverFactory for StrictDriverFactory {
        fn implemented_pool(&self) -> String {
            "strict".to_string()
        }

        fn create_pool_driver(&self) -> NsResult<Arc<dyn PoolDriver>> {
            Err(NsError::NotImplemented("strict driver".to_string()))
        }
    }

    #[test]
    fn test_plugin_manager_configure_is_not_partial() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);
        manager.register_pool_driver_factory(Arc::new(StrictDriverFactory));

        assert_eq!(
            kind_of(manager.configure("SymLinkLimit", "9")),
            ErrorKind::InvalidValue
        );
        assert_eq!(manager.catalog_config().sym_link_limit, 3);

        manager.configure("UpdateAccessTime", "no").unwrap();
        assert!(!manager.catalog_config().update_access_time);
    }

    #[test]
    fn test_plugin_manager_registrations() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);
        assert!(manager.get_pool_manager_factory().is_err());

        let handle = manager.register_pool_manager_factory(Arc::new(
            SqlitePoolManagerFactory::new(dir.path().join("pools.db").to_str().unwrap()),
        ));
        assert!(manager.get_pool_manager_factory().is_ok());
        assert!(manager.unregister(handle));
        assert!(!manager.unregister(handle));
        assert_eq!(
            manager.get_pool_manager_factory().err().map(|e| e.kind()),
            Some(ErrorKind::NoFactory)
        );

        let state = Arc::new(MockPoolState::default());
        manager.register_pool_driver_factory(Arc::new(MockDriverFactory { state }));
        assert_eq!(manager.pool_driver_factories().capabilities(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_load_configuration_file() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);
        let conf = dir.path().join("catalog.conf");
        std::fs::write(
            &conf,
            "# catalog settings\n\nLoadPlugin plugin_mysql /usr/lib/plugin_mysql.so\nSymLinkLimit 5\nUpdateAccessTime   yes\n",
        )
        .unwrap();
        manager.load_configuration(&conf).unwrap();
        assert_eq!(manager.catalog_config().sym_link_limit, 5);
        assert!(manager.catalog_config().update_access_time);

        std::fs::write(&conf, "SymLinkLimit 2\nBogusKey 1\n").unwrap();
        assert!(manager.load_configuration(&conf).unwrap_err().is_unknown_option());
        assert_eq!(manager.catalog_config().sym_link_limit, 2);

        assert_eq!(
            kind_of(manager.load_configuration(&dir.path().join("missing.conf"))),
            ErrorKind::IoError
        );
    }

    #[test]
    fn test_stack_instance() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);
        manager.configure("SymLinkLimit", "1").unwrap();

        let authn_path = dir.path().join("authn.json");
        std::fs::write(
            &authn_path,
            r#"{
                "users": [{"name": "alice", "uid": 500, "groups": ["users"]}],
                "groups": [{"name": "users", "gid": 100}]
            }"#,
        )
        .unwrap();
        manager
            .configure("AuthnMapFile", authn_path.to_str().unwrap())
            .unwrap();

        let mut stack = StackInstance::new(&manager).unwrap();
        assert!(!stack.is_there_pool_manager());
        assert!(stack.security_context().is_none());
        assert_eq!(kind_of(stack.get_pool_driver("mock")), ErrorKind::NoFactory);

        stack.set_security_context(SecurityContext::from_ids(0, &[0]));
        stack.catalog().make_dir("/home", 0o755).unwrap();
        stack.catalog().make_dir("/home/alice", 0o755).unwrap();
        stack
            .catalog()
            .set_owner("/home/alice", Some(500), Some(100), true)
            .unwrap();

        stack
            .set_security_credentials(&SecurityCredentials::new("alice"))
            .unwrap();
        assert_eq!(stack.security_context().unwrap().uid(), 500);
        stack.catalog_mut().change_dir("/home/alice").unwrap();
        stack.catalog().create("f", 0o644).unwrap();
        stack.catalog().symlink("f", "l1").unwrap();
        stack.catalog().symlink("l1", "l2").unwrap();

        let file = stack.catalog().extended_stat("/home/alice/f", true).unwrap();
        assert_eq!((file.stat.uid, file.stat.gid), (500, 100));
        // the configured limit reached the catalog
        assert_eq!(
            kind_of(stack.catalog().extended_stat("l2", true)),
            ErrorKind::TooManySymlinks
        );
        // and so did the backend
        assert_eq!(stack.inode().extended_stat(file.inode()).unwrap().name, "f");

        assert!(stack
            .set_security_credentials(&SecurityCredentials::new("mallory"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_stack_instance_with_pools() {
        let dir = TempDir::new().unwrap();
        let mut manager = create_plugin_manager(&dir);
        manager.register_pool_manager_factory(Arc::new(SqlitePoolManagerFactory::default()));
        manager
            .configure("DatabasePath", dir.path().join("stack.db").to_str().unwrap())
            .unwrap();
        let state = Arc::new(MockPoolState::default());
        manager.register_pool_driver_factory(Arc::new(MockDriverFactory {
            state: state.clone(),
        }));

        let mut stack = StackInstance::new(&manager).unwrap();
        assert!(stack.is_there_pool_manager());
        assert!(stack.get_pool_driver("mock").is_ok());

        let pools = SqlitePoolManager::new(dir.path().join("stack.db").to_string_lossy().to_string())
            .unwrap();
        pools.add_pool(&test_pool()).unwrap();
        assert_eq!(stack.pool_manager().unwrap().get_pool("pool01").unwrap(), test_pool());

        stack.set_security_context(SecurityContext::from_ids(0, &[0]));
        stack.catalog().create("/f", 0o644).unwrap();
        let file = stack.catalog().extended_stat("/f", true).unwrap();
        stack
            .catalog()
            .add_replica(&pool_replica(file.inode(), "disk01", "/srv/f.1"))
            .unwrap();
        stack.catalog().unlink("/f").unwrap();
        assert_eq!(*state.removed.lock().unwrap(), vec!["/srv/f.1".to_string()]);
    }
}
