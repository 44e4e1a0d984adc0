use ns_lib::{FactoryRegistry, NsResult, PoolDriver, PoolDriverFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Pool drivers keyed by pool type, instantiated on first use.
pub struct PoolDrivers {
    factories: FactoryRegistry<dyn PoolDriverFactory>,
    drivers: Mutex<HashMap<String, Arc<dyn PoolDriver>>>,
}

impl PoolDrivers {
    pub fn new(factories: FactoryRegistry<dyn PoolDriverFactory>) -> Self {
        Self {
            factories,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(FactoryRegistry::new())
    }

    pub fn get_pool_driver(&self, pool_type: &str) -> NsResult<Arc<dyn PoolDriver>> {
        let mut drivers = self.drivers.lock().unwrap();
        if let Some(driver) = drivers.get(pool_type) {
            return Ok(driver.clone());
        }
        let driver = self.factories.lookup(pool_type)?.create_pool_driver()?;
        debug!("instantiated pool driver for type {}", pool_type);
        drivers.insert(pool_type.to_string(), driver.clone());
        Ok(driver)
    }

    pub fn pool_types(&self) -> Vec<String> {
        self.factories.capabilities()
    }
}
