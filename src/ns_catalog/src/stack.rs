use crate::{BuiltInCatalog, PluginManager, PoolDrivers};
use ns_lib::{
    Authn, INode, NsResult, PoolDriver, PoolManager, SecurityContext, SecurityCredentials,
};
use std::sync::Arc;

/// One wired set of collaborators: backend, pools, authentication and the
/// catalog that sits on top of them.
pub struct StackInstance {
    inode: Arc<dyn INode>,
    pool_manager: Option<Arc<dyn PoolManager>>,
    pool_drivers: Arc<PoolDrivers>,
    authn: Arc<dyn Authn>,
    catalog: BuiltInCatalog,
}

impl StackInstance {
    pub fn new(manager: &PluginManager) -> NsResult<Self> {
        let inode = manager.get_inode_factory()?.create_inode()?;

        // a stack without pools is valid, the catalog just can not reach data
        let pool_manager = match manager.get_pool_manager_factory() {
            Ok(factory) => Some(factory.create_pool_manager()?),
            Err(_) => {
                debug!("no pool manager registered");
                None
            }
        };

        let pool_drivers = Arc::new(PoolDrivers::new(manager.pool_driver_factories().clone()));
        let authn = manager.get_authn_factory()?.create_authn()?;

        let mut catalog = BuiltInCatalog::new(inode.clone(), manager.catalog_config());
        if let Some(pm) = pool_manager.as_ref() {
            catalog = catalog.with_pool_manager(pm.clone(), pool_drivers.clone());
        }

        info!(
            "stack instance ready, pool manager: {}, pool types: {:?}",
            pool_manager.is_some(),
            pool_drivers.pool_types()
        );

        Ok(Self {
            inode,
            pool_manager,
            pool_drivers,
            authn,
            catalog,
        })
    }

    /// Resolves the credentials through the authentication and installs
    /// the resulting context on the catalog.
    pub fn set_security_credentials(&mut self, creds: &SecurityCredentials) -> NsResult<()> {
        let ctx = self.authn.create_security_context(creds)?;
        self.set_security_context(ctx);
        Ok(())
    }

    pub fn set_security_context(&mut self, ctx: SecurityContext) {
        debug!("security context set for uid {}", ctx.uid());
        self.catalog.set_security_context(ctx);
    }

    pub fn security_context(&self) -> Option<&SecurityContext> {
        self.catalog.security_context()
    }

    pub fn catalog(&self) -> &BuiltInCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut BuiltInCatalog {
        &mut self.catalog
    }

    pub fn inode(&self) -> Arc<dyn INode> {
        self.inode.clone()
    }

    pub fn authn(&self) -> Arc<dyn Authn> {
        self.authn.clone()
    }

    pub fn is_there_pool_manager(&self) -> bool {
        self.pool_manager.is_some()
    }

    pub fn pool_manager(&self) -> Option<Arc<dyn PoolManager>> {
        self.pool_manager.clone()
    }

    pub fn get_pool_driver(&self, pool_type: &str) -> NsResult<Arc<dyn PoolDriver>> {
        self.pool_drivers.get_pool_driver(pool_type)
    }
}
