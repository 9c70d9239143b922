//! Per-item locks for serializing bonds that share an item.
//!
//! A guard holds a whole set of ids at once: acquisition waits until none
//! of the requested ids is held, then takes all of them. Bonds over
//! disjoint items never wait on each other.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::debug;

use crate::error::{GraphError, Result};

#[derive(Debug, Default)]
pub struct ItemLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its ids on drop.
#[derive(Debug)]
pub struct ItemGuard<'a> {
    locks: &'a ItemLocks,
    ids: Vec<String>,
}

impl ItemGuard<'_> {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize<I, S>(ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Blocks until every id is free, then holds them all.
    pub fn acquire<I, S>(&self, ids: I) -> Result<ItemGuard<'_>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = Self::normalize(ids);
        let mut held = self
            .held
            .lock()
            .map_err(|_| GraphError::LockPoisoned("item locks"))?;
        while ids.iter().any(|id| held.contains(id)) {
            debug!(ids = ?ids, "waiting for item locks");
            held = self
                .released
                .wait(held)
                .map_err(|_| GraphError::LockPoisoned("item locks"))?;
        }
        held.extend(ids.iter().cloned());
        Ok(ItemGuard { locks: self, ids })
    }

    /// Like [`acquire`](Self::acquire) but returns `None` instead of waiting.
    pub fn try_acquire<I, S>(&self, ids: I) -> Result<Option<ItemGuard<'_>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = Self::normalize(ids);
        let mut held = self
            .held
            .lock()
            .map_err(|_| GraphError::LockPoisoned("item locks"))?;
        if ids.iter().any(|id| held.contains(id)) {
            return Ok(None);
        }
        held.extend(ids.iter().cloned());
        Ok(Some(ItemGuard { locks: self, ids }))
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
