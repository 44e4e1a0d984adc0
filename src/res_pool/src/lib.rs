//! Bounded pool of reusable resources.
//!
//! A [`PoolContainer`] keeps at most `capacity` instances alive at once
//! (idle plus in use). Instances come from a [`PoolElementFactory`]; idle
//! ones are recycled after a validity check, and in-use ones are reference
//! counted so the same handle can be shared.

#[macro_use]
extern crate log;

use ns_lib::{NsError, NsResult};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};

pub trait PoolElementFactory<E>: Send + Sync {
    fn create(&self) -> NsResult<E>;
    fn destroy(&self, element: E);
    fn is_valid(&self, element: &E) -> bool;
}

struct PoolState<E> {
    max: usize,
    // free permits
    available: usize,
    free: VecDeque<E>,
    used: HashMap<E, u32>,
}

pub struct PoolContainer<E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    factory: F,
    state: Mutex<PoolState<E>>,
    cond: Condvar,
}

impl<E, F> PoolContainer<E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    pub fn new(factory: F, capacity: usize) -> Self {
        Self {
            factory,
            state: Mutex::new(PoolState {
                max: capacity,
                available: capacity,
                free: VecDeque::new(),
                used: HashMap::new(),
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> NsResult<MutexGuard<'_, PoolState<E>>> {
        self.state
            .lock()
            .map_err(|e| NsError::Internal(format!("pool lock poisoned: {}", e)))
    }

    /// Takes an instance out of the pool. With `block == false` this fails
    /// `ResourceUnavailable` instead of waiting for a free slot.
    pub fn acquire(&self, block: bool) -> NsResult<E> {
        let mut state = self.lock()?;
        if state.available == 0 {
            if !block {
                return Err(NsError::ResourceUnavailable(format!(
                    "all {} pool slots are in use",
                    state.max
                )));
            }
            while state.available == 0 {
                state = self
                    .cond
                    .wait(state)
                    .map_err(|e| NsError::Internal(format!("pool lock poisoned: {}", e)))?;
            }
        }
        state.available -= 1;

        let element = match state.free.pop_front() {
            Some(idle) if self.factory.is_valid(&idle) => Ok(idle),
            Some(stale) => {
                self.factory.destroy(stale);
                self.factory.create()
            }
            None => self.factory.create(),
        };

        match element {
            Ok(element) => {
                state.used.insert(element.clone(), 1);
                Ok(element)
            }
            Err(e) => {
                state.available += 1;
                self.cond.notify_one();
                Err(e)
            }
        }
    }

    /// Shares an instance that is already in use.
    pub fn acquire_existing(&self, element: &E) -> NsResult<E> {
        let mut state = self.lock()?;
        match state.used.get_mut(element) {
            Some(count) => {
                *count += 1;
                Ok(element.clone())
            }
            None => Err(NsError::InvalidValue(
                "element was not acquired from this pool".to_string(),
            )),
        }
    }

    /// Drops one reference and returns how many remain. At zero the
    /// instance goes back to the idle queue, or is destroyed if that queue
    /// is already full.
    pub fn release(&self, element: &E) -> NsResult<u32> {
        let mut state = self.lock()?;
        let remaining = match state.used.get_mut(element) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                return Err(NsError::InvalidValue(
                    "element was not acquired from this pool".to_string(),
                ))
            }
        };

        if remaining == 0 {
            if let Some((element, _)) = state.used.remove_entry(element) {
                if state.free.len() < state.max {
                    state.free.push_back(element);
                } else {
                    self.factory.destroy(element);
                }
                // after a shrink the slot is only given back once under capacity
                if state.available + state.used.len() < state.max {
                    state.available += 1;
                    self.cond.notify_one();
                }
            }
        }
        Ok(remaining)
    }

    pub fn ref_count(&self, element: &E) -> u32 {
        match self.lock() {
            Ok(state) => state.used.get(element).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Changes the capacity. In-use instances are never evicted; when
    /// shrinking below the number in use the excess drains as they are
    /// released.
    pub fn resize(&self, capacity: usize) -> NsResult<()> {
        let mut state = self.lock()?;
        debug!(
            "resize pool from {} to {} (available {}, in use {})",
            state.max,
            capacity,
            state.available,
            state.used.len()
        );
        state.max = capacity;
        while state.available > 0 && state.available + state.used.len() > state.max {
            state.available -= 1;
        }
        while state.available + state.used.len() < state.max {
            state.available += 1;
        }
        self.cond.notify_all();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|s| s.max).unwrap_or(0)
    }

    pub fn available(&self) -> usize {
        self.lock().map(|s| s.available).unwrap_or(0)
    }

    pub fn idle(&self) -> usize {
        self.lock().map(|s| s.free.len()).unwrap_or(0)
    }

    pub fn in_use(&self) -> usize {
        self.lock().map(|s| s.used.len()).unwrap_or(0)
    }

    /// Acquires an instance that is released when the returned guard drops.
    pub fn grab(&self, block: bool) -> NsResult<PoolGrabber<'_, E, F>> {
        let element = self.acquire(block)?;
        Ok(PoolGrabber {
            pool: self,
            element,
        })
    }
}

impl<E, F> Drop for PoolContainer<E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        while let Some(element) = state.free.pop_front() {
            self.factory.destroy(element);
        }
        if !state.used.is_empty() {
            warn!(
                "pool dropped with {} elements still in use, they are leaked",
                state.used.len()
            );
        }
    }
}

/// Scoped reference to a pooled instance.
pub struct PoolGrabber<'a, E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    pool: &'a PoolContainer<E, F>,
    element: E,
}

impl<'a, E, F> Deref for PoolGrabber<'a, E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    type Target = E;

    fn deref(&self) -> &E {
        &self.element
    }
}

impl<'a, E, F> Drop for PoolGrabber<'a, E, F>
where
    E: Clone + Eq + Hash,
    F: PoolElementFactory<E>,
{
    fn drop(&mut self) {
        if let Err(e) = self.pool.release(&self.element) {
            warn!("release pooled element failed: {}", e);
        }
    }
}
