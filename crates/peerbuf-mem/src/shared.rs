//! Reference-counted views over one pooled buffer.
//!
//! The region goes back to the pool when the last view drops.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::handle::DirectBuffer;

#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<DirectBuffer>>,
}

impl SharedBuffer {
    pub(crate) fn new(buffer: DirectBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    /// Another reference to the same region.
    pub fn shared_view(&self) -> SharedBuffer {
        self.clone()
    }

    /// Number of live views, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Exclusive access to the buffer and its cursors.
    pub fn lock(&self) -> MutexGuard<'_, DirectBuffer> {
        self.inner.lock()
    }

    /// Recover the exclusive handle when this is the last view.
    pub fn try_into_exclusive(self) -> Result<DirectBuffer, SharedBuffer> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| SharedBuffer { inner })
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("refs", &self.ref_count())
            .field("buffer", &*self.inner.lock())
            .finish()
    }
}
