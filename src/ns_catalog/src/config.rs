use ns_lib::{NsError, NsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SYM_LINK_LIMIT_KEY: &str = "SymLinkLimit";
pub const UPDATE_ACCESS_TIME_KEY: &str = "UpdateAccessTime";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Maximum number of symbolic links followed while resolving one path.
    #[serde(alias = "SymLinkLimit", alias = "symlink_limit")]
    pub sym_link_limit: u32,
    /// Touch the access time on directory reads and replica listings.
    #[serde(alias = "UpdateAccessTime", alias = "update_atime")]
    pub update_access_time: bool,
    /// Initial umask of every catalog built from this configuration.
    #[serde(alias = "Umask")]
    pub umask: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sym_link_limit: 3,
            update_access_time: true,
            umask: 0o022,
        }
    }
}

impl CatalogConfig {
    pub fn load(path: &Path) -> NsResult<Self> {
        let mut config: Self = read_json_config(path)?;
        if config.sym_link_limit == 0 {
            return Err(NsError::InvalidValue(format!(
                "{} in {} must be a positive integer",
                SYM_LINK_LIMIT_KEY,
                path.display()
            )));
        }
        config.umask &= 0o777;
        Ok(config)
    }

    /// Applies one `key value` pair. Keys this config does not own are
    /// rejected with `UnknownOption`.
    pub fn configure(&mut self, key: &str, value: &str) -> NsResult<()> {
        match key {
            SYM_LINK_LIMIT_KEY => {
                let limit = value.trim().parse::<u32>().map_err(|_| {
                    NsError::InvalidValue(format!("{} must be a positive integer, got '{}'", key, value))
                })?;
                if limit == 0 {
                    return Err(NsError::InvalidValue(format!(
                        "{} must be a positive integer",
                        key
                    )));
                }
                self.sym_link_limit = limit;
            }
            UPDATE_ACCESS_TIME_KEY => {
                self.update_access_time = value.trim().eq_ignore_ascii_case("yes");
            }
            _ => return Err(NsError::UnknownOption(key.to_string())),
        }
        debug!("catalog config {} = {}", key, value);
        Ok(())
    }
}

pub(crate) fn read_json_config<T: DeserializeOwned>(path: &Path) -> NsResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| NsError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| NsError::InvalidValue(format!("parse {} failed: {}", path.display(), e)))
}
