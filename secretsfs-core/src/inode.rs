//! Stable inode numbers for virtual paths.
//!
//! Inodes are handed out lazily the first time a path is seen and are never
//! reused or freed while the mount lives.  `0` and [`ROOT_INODE`] are
//! reserved, so the first registered path gets `2`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

/// Inode the kernel uses for the mount root.
pub const ROOT_INODE: u64 = 1;

#[derive(Debug, Default)]
struct Table {
    by_path: HashMap<String, u64>,
    by_inode: HashMap<u64, String>,
}

/// Append-only, bidirectional path ↔ inode map shared by every request.
#[derive(Debug, Default)]
pub struct InodeRegistry {
    table: RwLock<Table>,
}

/// Strip one trailing separator so `a/b` and `a/b/` share an inode.
pub fn normalize(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

impl InodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the inode for `path`, assigning the next free number on a miss.
    pub fn get_or_create(&self, path: &str) -> u64 {
        let path = normalize(path);
        if let Some(ino) = self.get_if_present(path) {
            return ino;
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have inserted it between the two locks.
        if let Some(&ino) = table.by_path.get(path) {
            return ino;
        }
        let ino = table.by_path.len() as u64 + 2;
        table.by_path.insert(path.to_string(), ino);
        table.by_inode.insert(ino, path.to_string());
        ino
    }

    pub fn get_if_present(&self, path: &str) -> Option<u64> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_path.get(normalize(path)).copied()
    }

    /// Reverse lookup used by the transport, which addresses nodes by inode.
    pub fn path_of(&self, ino: u64) -> Option<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_inode.get(&ino).cloned()
    }

    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered copy of every registered path and its inode.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_path
            .iter()
            .map(|(p, &ino)| (p.clone(), ino))
            .collect()
    }
}
