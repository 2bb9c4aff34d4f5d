pub mod backend_device;
pub mod backend_storage;
pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use backend_device::{BackendDevice, FloatKernels, Kernels, StorageOf};
pub use backend_storage::BackendStorage;
pub use cpu::{CpuDevice, CpuStorage};

#[cfg(feature = "cuda")]
pub use cuda::{CudaStorage, GpuContext, GpuDevice, GpuHandle};
