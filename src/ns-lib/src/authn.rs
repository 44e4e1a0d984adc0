use crate::{
    BaseFactory, GroupInfo, NsError, NsResult, SecurityContext, SecurityCredentials, UserInfo,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Resolves raw credentials into a security context.
pub trait Authn: Send + Sync {
    fn create_security_context(&self, creds: &SecurityCredentials) -> NsResult<SecurityContext>;
    fn get_user(&self, user_name: &str) -> NsResult<UserInfo>;
    fn get_group(&self, group_name: &str) -> NsResult<GroupInfo>;
}

pub trait AuthnFactory: BaseFactory {
    fn create_authn(&self) -> NsResult<Arc<dyn Authn>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticUser {
    pub name: String,
    pub uid: u32,
    /// Group names; the first one is the primary group.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub banned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticGroup {
    pub name: String,
    pub gid: u32,
    #[serde(default)]
    pub banned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticAuthnConfig {
    pub users: Vec<StaticUser>,
    pub groups: Vec<StaticGroup>,
}

impl StaticAuthnConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> NsResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NsError::IoError(format!(
                "read authn map {} failed: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| NsError::InvalidValue(format!("parse authn map failed: {}", e)))
    }
}

/// Authn backed by a fixed table of users and groups.
pub struct StaticAuthn {
    config: StaticAuthnConfig,
}

impl StaticAuthn {
    pub fn new(config: StaticAuthnConfig) -> Self {
        Self { config }
    }

    fn find_user(&self, name: &str) -> NsResult<&StaticUser> {
        self.config
            .users
            .iter()
            .find(|u| u.name == name)
            .ok_or_else(|| NsError::NotFound(format!("user {} not found", name)))
    }
}

impl Authn for StaticAuthn {
    fn create_security_context(&self, creds: &SecurityCredentials) -> NsResult<SecurityContext> {
        let user = self.get_user(&creds.client_name)?;
        // fqans, when present, replace the configured membership
        let group_names: Vec<String> = if creds.fqans.is_empty() {
            self.find_user(&creds.client_name)?.groups.clone()
        } else {
            creds.fqans.clone()
        };
        let groups = group_names
            .iter()
            .map(|g| self.get_group(g))
            .collect::<NsResult<Vec<_>>>()?;
        debug!(
            "security context for {}: uid={} groups={:?}",
            user.name,
            user.uid,
            groups.iter().map(|g| g.gid).collect::<Vec<_>>()
        );
        Ok(SecurityContext::new(creds.clone(), user, groups))
    }

    fn get_user(&self, user_name: &str) -> NsResult<UserInfo> {
        let user = self.find_user(user_name)?;
        Ok(UserInfo {
            name: user.name.clone(),
            uid: user.uid,
            banned: user.banned,
            ..Default::default()
        })
    }

    fn get_group(&self, group_name: &str) -> NsResult<GroupInfo> {
        self.config
            .groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| GroupInfo {
                name: g.name.clone(),
                gid: g.gid,
                banned: g.banned,
                ..Default::default()
            })
            .ok_or_else(|| NsError::NotFound(format!("group {} not found", group_name)))
    }
}

/// Factory for [`StaticAuthn`]. Recognizes `AuthnMapFile`, a JSON file
/// holding a [`StaticAuthnConfig`].
#[derive(Default)]
pub struct StaticAuthnFactory {
    config: Mutex<StaticAuthnConfig>,
}

impl StaticAuthnFactory {
    pub fn new(config: StaticAuthnConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl BaseFactory for StaticAuthnFactory {
    fn configure(&self, key: &str, value: &str) -> NsResult<()> {
        match key {
            "AuthnMapFile" => {
                let loaded = StaticAuthnConfig::load(value)?;
                info!(
                    "loaded {} users and {} groups from {}",
                    loaded.users.len(),
                    loaded.groups.len(),
                    value
                );
                *self
                    .config
                    .lock()
                    .map_err(|e| NsError::Internal(format!("authn config lock poisoned: {}", e)))? = loaded;
                Ok(())
            }
            _ => Err(NsError::UnknownOption(key.to_string())),
        }
    }
}

impl AuthnFactory for StaticAuthnFactory {
    fn create_authn(&self) -> NsResult<Arc<dyn Authn>> {
        let config = self
            .config
            .lock()
            .map_err(|e| NsError::Internal(format!("authn config lock poisoned: {}", e)))?
            .clone();
        Ok(Arc::new(StaticAuthn::new(config)))
    }
}
