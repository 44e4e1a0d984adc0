use crate::{BaseFactory, Location, NsError, NsResult, Pool, Replica};
use std::sync::Arc;

/// Catalog of storage pools.
pub trait PoolManager: Send + Sync {
    fn get_pools(&self) -> NsResult<Vec<Pool>>;
    fn get_pool(&self, pool_name: &str) -> NsResult<Pool>;
}

/// Handle on one pool, produced by the driver implementing its type.
pub trait PoolHandler: Send + Sync {
    fn pool_type(&self) -> String;
    fn pool_name(&self) -> String;

    fn total_space(&self) -> NsResult<u64> {
        Err(NsError::NotImplemented(format!("total_space on {}", self.pool_name())))
    }

    fn free_space(&self) -> NsResult<u64> {
        Err(NsError::NotImplemented(format!("free_space on {}", self.pool_name())))
    }

    fn pool_is_available(&self, write: bool) -> NsResult<bool>;
    fn replica_is_available(&self, replica: &Replica) -> NsResult<bool>;
    fn where_to_read(&self, replica: &Replica) -> NsResult<Location>;

    fn where_to_write(&self, path: &str) -> NsResult<Location> {
        Err(NsError::NotImplemented(format!(
            "where_to_write({}) on {}",
            path,
            self.pool_name()
        )))
    }

    fn remove_replica(&self, replica: &Replica) -> NsResult<()>;
}

pub trait PoolDriver: Send + Sync {
    fn create_pool_handler(&self, pool_name: &str) -> NsResult<Box<dyn PoolHandler>>;
}

pub trait PoolManagerFactory: BaseFactory {
    fn create_pool_manager(&self) -> NsResult<Arc<dyn PoolManager>>;
}

pub trait PoolDriverFactory: BaseFactory {
    /// Pool type this driver understands.
    fn implemented_pool(&self) -> String;
    fn create_pool_driver(&self) -> NsResult<Arc<dyn PoolDriver>>;
}
