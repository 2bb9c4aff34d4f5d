//! Dense tensors with interchangeable CPU and CUDA backends.
//!
//! The element type and the device are type parameters of [`DTensor`]; the
//! GPU backend is built with the `cuda` feature and must be bound with
//! `GpuHandle::init` before use. [`Tensor`] erases both parameters behind a
//! checked downcast.

pub mod config;
pub mod tensor;

pub use config::GpuConfig;
#[cfg(feature = "cuda")]
pub use tensor::backend::{GpuDevice, GpuHandle};
pub use tensor::{
    backend::CpuDevice, DTensor, DType, Dense, DeviceKind, Shape, Tensor, TensorError, Trans,
};
