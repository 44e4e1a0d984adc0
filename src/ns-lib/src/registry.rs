use crate::{NsError, NsResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Common surface of every factory: configuration by key/value pairs.
pub trait BaseFactory: Send + Sync {
    /// Applies one configuration pair. Factories reject keys they do not
    /// understand with `UnknownOption`.
    fn configure(&self, key: &str, value: &str) -> NsResult<()> {
        Err(NsError::UnknownOption(format!("{} = {}", key, value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl RegistrationHandle {
    fn next() -> Self {
        RegistrationHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Prioritized factory registry keyed by capability. The most recent
/// registration for a capability wins.
pub struct FactoryRegistry<F: ?Sized> {
    stacks: BTreeMap<String, VecDeque<(RegistrationHandle, Arc<F>)>>,
}

impl<F: ?Sized> Clone for FactoryRegistry<F> {
    fn clone(&self) -> Self {
        Self {
            stacks: self.stacks.clone(),
        }
    }
}

impl<F: ?Sized> Default for FactoryRegistry<F> {
    fn default() -> Self {
        Self {
            stacks: BTreeMap::new(),
        }
    }
}

impl<F: ?Sized> FactoryRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: &str, factory: Arc<F>) -> RegistrationHandle {
        let handle = RegistrationHandle::next();
        self.stacks
            .entry(capability.to_string())
            .or_default()
            .push_front((handle, factory));
        handle
    }

    pub fn lookup(&self, capability: &str) -> NsResult<Arc<F>> {
        self.stacks
            .get(capability)
            .and_then(|stack| stack.front())
            .map(|(_, f)| f.clone())
            .ok_or_else(|| NsError::NoFactory(format!("no factory for '{}'", capability)))
    }

    pub fn unregister(&mut self, handle: RegistrationHandle) -> bool {
        let mut removed = false;
        for stack in self.stacks.values_mut() {
            let before = stack.len();
            stack.retain(|(h, _)| *h != handle);
            removed |= stack.len() != before;
        }
        self.stacks.retain(|_, stack| !stack.is_empty());
        removed
    }

    pub fn contains(&self, handle: RegistrationHandle) -> bool {
        self.stacks
            .values()
            .any(|stack| stack.iter().any(|(h, _)| *h == handle))
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.stacks.keys().cloned().collect()
    }

    /// Every registered factory, front of each stack first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<F>> {
        self.stacks
            .values()
            .flat_map(|stack| stack.iter().map(|(_, f)| f))
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
