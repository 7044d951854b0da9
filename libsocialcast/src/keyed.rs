//! Per-(platform, account) state cells
//!
//! Each key owns its own mutex so different accounts never contend. The outer
//! map lock is only held long enough to look up or insert a cell.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of one connected account on one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub platform: String,
    pub account_id: String,
}

impl AccountKey {
    pub fn new(platform: &str, account_id: &str) -> Self {
        Self {
            platform: platform.to_string(),
            account_id: account_id.to_string(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.account_id)
    }
}

pub(crate) type Cell<T> = Arc<Mutex<T>>;

pub(crate) struct KeyedCells<T> {
    cells: Mutex<HashMap<AccountKey, Cell<T>>>,
}

impl<T> Default for KeyedCells<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KeyedCells<T> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<AccountKey, Cell<T>>> {
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch the cell for `key`, creating it on first reference
    pub fn get_or_insert_with(&self, key: &AccountKey, init: impl FnOnce() -> T) -> Cell<T> {
        let mut map = self.map();
        if let Some(cell) = map.get(key) {
            return Arc::clone(cell);
        }
        let cell = Arc::new(Mutex::new(init()));
        map.insert(key.clone(), Arc::clone(&cell));
        cell
    }

    /// Fetch the cell for `key` without creating it
    pub fn get(&self, key: &AccountKey) -> Option<Cell<T>> {
        self.map().get(key).cloned()
    }

    pub fn remove(&self, key: &AccountKey) -> bool {
        self.map().remove(key).is_some()
    }

    /// All tracked cells, sorted by key for stable output
    pub fn entries(&self) -> Vec<(AccountKey, Cell<T>)> {
        let mut entries: Vec<_> = self
            .map()
            .iter()
            .map(|(key, cell)| (key.clone(), Arc::clone(cell)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Lock a cell, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(|e| e.into_inner())
}
