use crate::{SqliteINode, SqlitePoolManager};
use ns_lib::{
    BaseFactory, INode, INodeFactory, NsError, NsResult, PoolManager, PoolManagerFactory,
};
use std::sync::{Arc, Mutex};

pub const DATABASE_PATH_KEY: &str = "DatabasePath";

#[derive(Default)]
struct DbPathConfig {
    db_path: Mutex<Option<String>>,
}

impl DbPathConfig {
    fn configure(&self, key: &str, value: &str) -> NsResult<()> {
        match key {
            DATABASE_PATH_KEY => {
                *self.db_path.lock().unwrap() = Some(value.to_string());
                Ok(())
            }
            _ => Err(NsError::UnknownOption(key.to_string())),
        }
    }

    fn db_path(&self) -> NsResult<String> {
        self.db_path
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| NsError::InvalidState(format!("{} is not configured", DATABASE_PATH_KEY)))
    }
}

/// Produces [`SqliteINode`] instances on the configured database.
#[derive(Default)]
pub struct SqliteINodeFactory {
    config: DbPathConfig,
}

impl SqliteINodeFactory {
    pub fn new(db_path: &str) -> Self {
        let factory = Self::default();
        *factory.config.db_path.lock().unwrap() = Some(db_path.to_string());
        factory
    }
}

impl BaseFactory for SqliteINodeFactory {
    fn configure(&self, key: &str, value: &str) -> NsResult<()> {
        self.config.configure(key, value)
    }
}

impl INodeFactory for SqliteINodeFactory {
    fn create_inode(&self) -> NsResult<Arc<dyn INode>> {
        Ok(Arc::new(SqliteINode::new(self.config.db_path()?)?))
    }
}

/// Produces [`SqlitePoolManager`] instances on the configured database.
#[derive(Default)]
pub struct SqlitePoolManagerFactory {
    config: DbPathConfig,
}

impl SqlitePoolManagerFactory {
    pub fn new(db_path: &str) -> Self {
        let factory = Self::default();
        *factory.config.db_path.lock().unwrap() = Some(db_path.to_string());
        factory
    }
}

impl BaseFactory for SqlitePoolManagerFactory {
    fn configure(&self, key: &str, value: &str) -> NsResult<()> {
        self.config.configure(key, value)
    }
}

impl PoolManagerFactory for SqlitePoolManagerFactory {
    fn create_pool_manager(&self) -> NsResult<Arc<dyn PoolManager>> {
        Ok(Arc::new(SqlitePoolManager::new(self.config.db_path()?)?))
    }
}
