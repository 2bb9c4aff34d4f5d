use std::{fmt, sync::Arc};

use log::debug;

use crate::tensor::{
    backend::{BackendStorage, Kernels, StorageOf},
    Element, TensorError,
};

/// Reference-counted device buffer of `mem_size()` elements.
///
/// Clones share the allocation until one of them is written through
/// [`Storage::buffer_mut`], which detaches the writer with a device copy.
pub struct Storage<D: Kernels<T>, T: Element> {
    buffer: Arc<StorageOf<D, T>>,
}

impl<D: Kernels<T>, T: Element> Storage<D, T> {
    pub fn new(mem_size: usize) -> Result<Self, TensorError> {
        debug!(
            "Allocating {mem_size} x {:?} ({} bytes) on {:?}",
            T::DTYPE,
            mem_size.saturating_mul(T::DTYPE.size_in_bytes()),
            D::KIND
        );
        Ok(Self {
            buffer: Arc::new(D::alloc(mem_size)?),
        })
    }

    /// Capacity in elements.
    pub fn mem_size(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer(&self) -> &StorageOf<D, T> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut StorageOf<D, T> {
        if self.is_shared() {
            debug!(
                "Detaching shared {:?} storage of {} elements",
                D::KIND,
                self.mem_size()
            );
        }
        Arc::make_mut(&mut self.buffer)
    }

    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.buffer) > 1
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

impl<D: Kernels<T>, T: Element> Clone for Storage<D, T> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<D: Kernels<T>, T: Element> fmt::Debug for Storage<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("device", &D::KIND)
            .field("dtype", &T::DTYPE)
            .field("mem_size", &self.mem_size())
            .finish()
    }
}
