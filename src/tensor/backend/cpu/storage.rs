use crate::tensor::{backend::backend_storage::BackendStorage, DeviceKind, Element, TensorError};

#[derive(PartialEq, Debug, Clone, Default)]
pub struct CpuStorage<T>(pub Vec<T>);

impl<T: Element> CpuStorage<T> {
    /// Allocates `capacity` default-initialized elements, reporting
    /// exhaustion as an error instead of aborting.
    pub fn new(capacity: usize) -> Result<Self, TensorError> {
        let mut data: Vec<T> = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|err| TensorError::AllocationFailed(err.to_string()))?;
        data.resize(capacity, T::default());
        Ok(Self(data))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Element> BackendStorage for CpuStorage<T> {
    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn capacity(&self) -> usize {
        self.0.len()
    }
}
