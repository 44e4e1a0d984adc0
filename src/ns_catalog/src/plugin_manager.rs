use crate::CatalogConfig;
use ns_lib::{
    AuthnFactory, FactoryRegistry, INodeFactory, NsError, NsResult, PoolDriverFactory,
    PoolManagerFactory, RegistrationHandle, StaticAuthnFactory,
};
use std::path::Path;
use std::sync::Arc;

pub const INODE_CAPABILITY: &str = "inode";
pub const POOL_MANAGER_CAPABILITY: &str = "pool_manager";
pub const AUTHN_CAPABILITY: &str = "authn";

/// Holds the factories a [`crate::StackInstance`] is built from, along
/// with the catalog configuration.
pub struct PluginManager {
    inode_factories: FactoryRegistry<dyn INodeFactory>,
    pool_manager_factories: FactoryRegistry<dyn PoolManagerFactory>,
    pool_driver_factories: FactoryRegistry<dyn PoolDriverFactory>,
    authn_factories: FactoryRegistry<dyn AuthnFactory>,
    catalog_config: CatalogConfig,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    /// A manager with the static authentication registered; every other
    /// capability starts empty.
    pub fn new() -> Self {
        let mut manager = Self::with_config(CatalogConfig::default());
        manager.register_authn_factory(Arc::new(StaticAuthnFactory::default()));
        manager
    }

    pub fn with_config(catalog_config: CatalogConfig) -> Self {
        Self {
            inode_factories: FactoryRegistry::new(),
            pool_manager_factories: FactoryRegistry::new(),
            pool_driver_factories: FactoryRegistry::new(),
            authn_factories: FactoryRegistry::new(),
            catalog_config,
        }
    }

    pub fn register_inode_factory(&mut self, factory: Arc<dyn INodeFactory>) -> RegistrationHandle {
        self.inode_factories.register(INODE_CAPABILITY, factory)
    }

    pub fn register_pool_manager_factory(
        &mut self,
        factory: Arc<dyn PoolManagerFactory>,
    ) -> RegistrationHandle {
        self.pool_manager_factories
            .register(POOL_MANAGER_CAPABILITY, factory)
    }

    pub fn register_pool_driver_factory(
        &mut self,
        factory: Arc<dyn PoolDriverFactory>,
    ) -> RegistrationHandle {
        let pool_type = factory.implemented_pool();
        debug!("registering pool driver for type {}", pool_type);
        self.pool_driver_factories.register(&pool_type, factory)
    }

    pub fn register_authn_factory(&mut self, factory: Arc<dyn AuthnFactory>) -> RegistrationHandle {
        self.authn_factories.register(AUTHN_CAPABILITY, factory)
    }

    /// Removes a registration from whichever registry holds it.
    pub fn unregister(&mut self, handle: RegistrationHandle) -> bool {
        self.inode_factories.unregister(handle)
            || self.pool_manager_factories.unregister(handle)
            || self.pool_driver_factories.unregister(handle)
            || self.authn_factories.unregister(handle)
    }

    /// Hands `key value` to the catalog configuration and to every
    /// registered factory. Succeeds if at least one of them recognized
    /// the key. The catalog configuration only changes once every factory
    /// accepted the pair; factories that ran before a failing one keep
    /// what they applied.
    pub fn configure(&mut self, key: &str, value: &str) -> NsResult<()> {
        let mut recognized = false;

        let mut catalog_config = self.catalog_config.clone();
        match catalog_config.configure(key, value) {
            Ok(()) => recognized = true,
            Err(e) if e.is_unknown_option() => {}
            Err(e) => return Err(e),
        }

        let results: Vec<NsResult<()>> = self
            .inode_factories
            .iter()
            .map(|f| f.configure(key, value))
            .chain(self.pool_manager_factories.iter().map(|f| f.configure(key, value)))
            .chain(self.pool_driver_factories.iter().map(|f| f.configure(key, value)))
            .chain(self.authn_factories.iter().map(|f| f.configure(key, value)))
            .collect();

        for result in results {
            match result {
                Ok(()) => recognized = true,
                Err(e) if e.is_unknown_option() => {}
                Err(e) => return Err(e),
            }
        }

        if !recognized {
            return Err(NsError::UnknownOption(format!(
                "'{}' not recognized by any plugin",
                key
            )));
        }
        self.catalog_config = catalog_config;
        Ok(())
    }

    /// Reads a configuration file of `Key Value` lines and applies each one
    /// through [`PluginManager::configure`]. Blank lines and `#` comments
    /// are skipped.
    pub fn load_configuration(&mut self, path: &Path) -> NsResult<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NsError::IoError(format!("read config {} failed: {}", path.display(), e))
        })?;

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };

            if key == "LoadPlugin" {
                warn!(
                    "{}:{}: plugins are registered in code, ignoring LoadPlugin {}",
                    path.display(),
                    lineno + 1,
                    value
                );
                continue;
            }

            self.configure(key, value).map_err(|e| {
                warn!("{}:{}: {}", path.display(), lineno + 1, e);
                e
            })?;
        }

        info!("loaded configuration from {}", path.display());
        Ok(())
    }

    pub fn catalog_config(&self) -> &CatalogConfig {
        &self.catalog_config
    }

    pub fn get_inode_factory(&self) -> NsResult<Arc<dyn INodeFactory>> {
        self.inode_factories.lookup(INODE_CAPABILITY)
    }

    pub fn get_pool_manager_factory(&self) -> NsResult<Arc<dyn PoolManagerFactory>> {
        self.pool_manager_factories.lookup(POOL_MANAGER_CAPABILITY)
    }

    pub fn get_authn_factory(&self) -> NsResult<Arc<dyn AuthnFactory>> {
        self.authn_factories.lookup(AUTHN_CAPABILITY)
    }

    pub fn pool_driver_factories(&self) -> &FactoryRegistry<dyn PoolDriverFactory> {
        &self.pool_driver_factories
    }
}
