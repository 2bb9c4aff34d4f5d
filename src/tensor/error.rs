use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use thiserror::Error;

use crate::tensor::{DType, DeviceKind, Format};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("Empty shape is not allowed")]
    EmptyShape,

    #[error("Shape {dims:?} has a zero-sized dimension")]
    InvalidShape { dims: Vec<usize> },

    #[error("Shape {dims:?} has more elements than fit in usize")]
    ShapeOverflow { dims: Vec<usize> },

    #[error("{op} called on a tensor that was never reshaped")]
    NotShaped { op: &'static str },

    #[error("{op}: shape {lhs:?} is incompatible with shape {rhs:?}")]
    IncompatibleShape {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("Data length ({got}) does not match shape element count ({expected})")]
    DataLength { got: usize, expected: usize },

    #[error("Invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    #[error("{op}: {len} does not fit in {target}")]
    TooLarge {
        op: &'static str,
        len: usize,
        target: &'static str,
    },

    #[error("as_scalar needs exactly one element, tensor has {count}")]
    NotScalar { count: usize },

    #[error(
        "Tensor handle holds {actual_device:?}/{actual_format:?}/{actual_dtype:?}, \
         requested {device:?}/{format:?}/{dtype:?}"
    )]
    DowncastMismatch {
        device: DeviceKind,
        format: Format,
        dtype: DType,
        actual_device: DeviceKind,
        actual_format: Format,
        actual_dtype: DType,
    },

    #[error("Tensor handle has not been reshaped yet")]
    HandleNotInstantiated,

    #[error("argmax is undefined: {0}")]
    UndefinedOrder(#[from] MinMaxError),

    #[error("Error building matrix view: {0}")]
    MatrixView(#[from] ShapeError),

    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("GPU handle is not initialized")]
    GpuNotInitialized,

    #[error("GPU handle is already initialized")]
    GpuAlreadyInitialized,

    #[error("GPU handle needs at least one worker stream")]
    NoWorkers,

    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Lock error")]
    LockError,

    #[cfg(feature = "cuda")]
    #[error("CUDA driver error: {0}")]
    Driver(#[from] cudarc::driver::DriverError),

    #[cfg(feature = "cuda")]
    #[error("cuBLAS error: {0:?}")]
    Blas(cudarc::cublas::result::CublasError),

    #[cfg(feature = "cuda")]
    #[error("cuRAND error: {0:?}")]
    Rand(cudarc::curand::result::CurandError),

    #[cfg(feature = "cuda")]
    #[error("NVRTC compilation failed: {0}")]
    Compile(#[from] cudarc::nvrtc::CompileError),

    #[cfg(feature = "cuda")]
    #[error("CUDA kernel not found: {0}")]
    KernelNotFound(&'static str),
}

#[cfg(feature = "cuda")]
impl From<cudarc::cublas::result::CublasError> for TensorError {
    fn from(error: cudarc::cublas::result::CublasError) -> Self {
        TensorError::Blas(error)
    }
}

#[cfg(feature = "cuda")]
impl From<cudarc::curand::result::CurandError> for TensorError {
    fn from(error: cudarc::curand::result::CurandError) -> Self {
        TensorError::Rand(error)
    }
}

impl<T> From<std::sync::PoisonError<T>> for TensorError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        TensorError::LockError
    }
}
