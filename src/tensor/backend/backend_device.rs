use std::fmt::Debug;

use crate::tensor::{
    backend::backend_storage::BackendStorage,
    ops::{Broadcast, GemmDims, MeanAxis, UnaryOp},
    DeviceKind, Element, Float, TensorError,
};

/// Compile-time device tag. Each tag binds the kernel set of one backend.
pub trait BackendDevice: Debug + Default + Send + Sync + Sized + 'static {
    const KIND: DeviceKind;

    /// Blocks until every queued operation on the device has finished.
    fn synchronize() -> Result<(), TensorError>;
}

/// Storage management for element type `T`. All lengths are element counts
/// and never exceed the buffer capacity.
pub trait Kernels<T: Element>: BackendDevice {
    type Storage: BackendStorage;

    fn alloc(capacity: usize) -> Result<Self::Storage, TensorError>;

    /// Writes `src` into the first `src.len()` elements of `dst`.
    fn upload(dst: &mut Self::Storage, src: &[T]) -> Result<(), TensorError>;

    fn download(src: &Self::Storage, len: usize) -> Result<Vec<T>, TensorError>;

    fn copy(dst: &mut Self::Storage, src: &Self::Storage, len: usize) -> Result<(), TensorError>;

    fn fill(dst: &mut Self::Storage, len: usize, value: T) -> Result<(), TensorError>;
}

pub type StorageOf<D, T> = <D as Kernels<T>>::Storage;

/// Arithmetic, reductions and GEMM for floating point element types.
/// Row/column parameters describe the matrix view of a dense buffer.
pub trait FloatKernels<T: Float>: Kernels<T> + Kernels<i32> {
    /// Uniform samples over `[lo, hi)`.
    fn rand_uniform(
        dst: &mut StorageOf<Self, T>,
        len: usize,
        lo: T,
        hi: T,
    ) -> Result<(), TensorError>;

    fn rand_normal(
        dst: &mut StorageOf<Self, T>,
        len: usize,
        mean: T,
        std: T,
    ) -> Result<(), TensorError>;

    fn asum(src: &StorageOf<Self, T>, len: usize) -> Result<T, TensorError>;

    fn norm2(src: &StorageOf<Self, T>, len: usize) -> Result<T, TensorError>;

    fn sum(src: &StorageOf<Self, T>, len: usize) -> Result<T, TensorError>;

    fn unary(dst: &mut StorageOf<Self, T>, len: usize, op: UnaryOp) -> Result<(), TensorError>;

    /// `dst += alpha * src` with `src` broadcast against a `len / cols x cols` view.
    fn axpy(
        dst: &mut StorageOf<Self, T>,
        len: usize,
        cols: usize,
        alpha: T,
        src: &StorageOf<Self, T>,
        broadcast: Broadcast,
    ) -> Result<(), TensorError>;

    fn elewise_mul(
        dst: &mut StorageOf<Self, T>,
        len: usize,
        cols: usize,
        src: &StorageOf<Self, T>,
        broadcast: Broadcast,
    ) -> Result<(), TensorError>;

    /// Writes row or column means of a `rows x cols` source into `dst`.
    /// `MeanAxis::All` writes the overall mean into `dst[0]`.
    fn mean_axis(
        src: &StorageOf<Self, T>,
        rows: usize,
        cols: usize,
        axis: MeanAxis,
        dst: &mut StorageOf<Self, T>,
    ) -> Result<(), TensorError>;

    fn softmax(dst: &mut StorageOf<Self, T>, rows: usize, cols: usize) -> Result<(), TensorError>;

    fn argmax(
        src: &StorageOf<Self, T>,
        rows: usize,
        cols: usize,
        dst: &mut StorageOf<Self, i32>,
    ) -> Result<(), TensorError>;

    fn gemm(
        dims: GemmDims<T>,
        a: &StorageOf<Self, T>,
        b: &StorageOf<Self, T>,
        c: &mut StorageOf<Self, T>,
    ) -> Result<(), TensorError>;
}
