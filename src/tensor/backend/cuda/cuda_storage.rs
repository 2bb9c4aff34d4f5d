use std::fmt;

use cudarc::driver::{CudaSlice, DeviceRepr, DeviceSlice};

use crate::tensor::{backend::backend_storage::BackendStorage, DeviceKind, Element};

/// Device-resident buffer. Cloning allocates a new device buffer and copies
/// the contents.
#[derive(Clone)]
pub struct CudaStorage<T: DeviceRepr> {
    slice: CudaSlice<T>,
}

impl<T: DeviceRepr> CudaStorage<T> {
    pub fn new(slice: CudaSlice<T>) -> Self {
        Self { slice }
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.len() == 0
    }

    pub fn as_slice(&self) -> &CudaSlice<T> {
        &self.slice
    }

    pub fn as_slice_mut(&mut self) -> &mut CudaSlice<T> {
        &mut self.slice
    }
}

impl<T: DeviceRepr> fmt::Debug for CudaStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaStorage")
            .field("len", &self.slice.len())
            .finish()
    }
}

impl<T: Element + DeviceRepr> BackendStorage for CudaStorage<T> {
    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Gpu
    }

    fn capacity(&self) -> usize {
        self.slice.len()
    }
}
