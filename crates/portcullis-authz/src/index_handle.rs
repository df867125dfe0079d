//! Shared, atomically replaceable route index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use portcullis_router::PathIndex;

#[derive(Debug)]
struct Shared {
    index: RwLock<Arc<PathIndex>>,
    generation: AtomicU64,
}

/// Handle to the live [`PathIndex`].
///
/// Readers take a snapshot with [`IndexHandle::load`] and keep using it for
/// the rest of the request, so a concurrent [`IndexHandle::store`] never
/// changes the index mid-decision.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    shared: Arc<Shared>,
}

impl IndexHandle {
    /// Wraps a loaded index. Generation starts at 1.
    pub fn new(index: PathIndex) -> Self {
        Self {
            shared: Arc::new(Shared {
                index: RwLock::new(Arc::new(index)),
                generation: AtomicU64::new(1),
            }),
        }
    }

    /// A handle with no routes and generation 0.
    pub fn empty() -> Self {
        Self {
            shared: Arc::new(Shared {
                index: RwLock::new(Arc::new(PathIndex::new())),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<PathIndex> {
        Arc::clone(&self.shared.index.read())
    }

    /// Replaces the index and returns the new generation.
    pub fn store(&self, index: PathIndex) -> u64 {
        let mut guard = self.shared.index.write();
        *guard = Arc::new(index);
        self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of successful stores, counting construction via [`IndexHandle::new`].
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Returns true once an index has been installed.
    pub fn is_loaded(&self) -> bool {
        self.generation() > 0
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::empty()
    }
}
