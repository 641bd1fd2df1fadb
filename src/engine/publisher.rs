use crate::models::records::DirectorySnapshot;

use std::sync::{Arc, PoisonError, RwLock};

/// Holds the one current [`DirectorySnapshot`]. Readers clone an `Arc` so a swap never
/// changes a snapshot a reader already holds.
#[derive(Default)]
pub struct Publisher {
    current: RwLock<Arc<DirectorySnapshot>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the current snapshot, returning the one it superseded
    pub fn publish(&self, snapshot: DirectorySnapshot) -> Arc<DirectorySnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, snapshot)
    }
}
