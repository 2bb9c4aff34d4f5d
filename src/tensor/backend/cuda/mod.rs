pub mod cuda_storage;
pub mod gpu_handle;
pub mod kernels;

pub use cuda_storage::CudaStorage;
pub use gpu_handle::{GpuContext, GpuHandle};

use std::sync::Arc;

use cudarc::{
    cublas::{sys::cublasOperation_t, Gemm, GemmConfig},
    driver::{CudaSlice, DeviceRepr, LaunchAsync, LaunchConfig, ValidAsZeroBits},
};
use log::warn;
use ndarray_stats::errors::MinMaxError;

use crate::tensor::{
    backend::backend_device::{BackendDevice, FloatKernels, Kernels},
    ops::{narrow, Broadcast, GemmDims, MeanAxis, Trans, UnaryOp},
    DeviceKind, TensorError,
};
use kernels::BLOCK;

const MAX_GRID: u32 = 1024;
const MAX_ROW_GRID: u32 = 65535;

const REDUCE_SUM: u32 = 0;
const REDUCE_ABS: u32 = 1;
const REDUCE_SQUARES: u32 = 2;

/// CUDA backend. Every operation goes through the context bound by
/// [`GpuHandle::init`] and fails with `GpuNotInitialized` without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpuDevice;

impl BackendDevice for GpuDevice {
    const KIND: DeviceKind = DeviceKind::Gpu;

    fn synchronize() -> Result<(), TensorError> {
        GpuHandle::synchronize()
    }
}

/// Grid-stride launch over `n` elements.
fn launch_cfg(n: u32) -> LaunchConfig {
    let grid: u32 = n.div_ceil(BLOCK).clamp(1, MAX_GRID);
    LaunchConfig {
        block_dim: (BLOCK, 1, 1),
        grid_dim: (grid, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// One block per row.
fn row_cfg(rows: u32) -> LaunchConfig {
    LaunchConfig {
        block_dim: (BLOCK, 1, 1),
        grid_dim: (rows.clamp(1, MAX_ROW_GRID), 1, 1),
        shared_mem_bytes: 0,
    }
}

fn cublas_op(trans: Trans) -> cublasOperation_t {
    match trans {
        Trans::N => cublasOperation_t::CUBLAS_OP_N,
        Trans::T => cublasOperation_t::CUBLAS_OP_T,
    }
}

/// Per-block partial reductions of the first `len` elements, read back to
/// the host.
fn reduce_partials<T>(
    context: &GpuContext,
    name: &'static str,
    src: &CudaSlice<T>,
    len: usize,
    mode: u32,
) -> Result<Vec<T>, TensorError>
where
    T: DeviceRepr + ValidAsZeroBits + Unpin,
{
    let n: u32 = narrow(name, len)?;
    let cfg: LaunchConfig = launch_cfg(n);
    let mut partial: CudaSlice<T> = context.device().alloc_zeros(cfg.grid_dim.0 as usize)?;
    let func = context.func(name)?;
    unsafe { func.launch(cfg, (src, n, mode, &mut partial)) }?;
    Ok(context.device().dtoh_sync_copy(&partial)?)
}

macro_rules! impl_kernels {
    ($ty:ty, $suffix:literal) => {
        impl Kernels<$ty> for GpuDevice {
            type Storage = CudaStorage<$ty>;

            fn alloc(capacity: usize) -> Result<CudaStorage<$ty>, TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let slice: CudaSlice<$ty> = context.device().alloc_zeros(capacity)?;
                Ok(CudaStorage::new(slice))
            }

            fn upload(dst: &mut CudaStorage<$ty>, src: &[$ty]) -> Result<(), TensorError> {
                if src.len() > dst.len() {
                    return Err(TensorError::DataLength {
                        got: src.len(),
                        expected: dst.len(),
                    });
                }
                let context: Arc<GpuContext> = GpuHandle::context()?;
                context
                    .device()
                    .htod_sync_copy_into(src, &mut dst.as_slice_mut().slice_mut(0..src.len()))?;
                Ok(())
            }

            fn download(src: &CudaStorage<$ty>, len: usize) -> Result<Vec<$ty>, TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                Ok(context
                    .device()
                    .dtoh_sync_copy(&src.as_slice().slice(0..len))?)
            }

            fn copy(
                dst: &mut CudaStorage<$ty>,
                src: &CudaStorage<$ty>,
                len: usize,
            ) -> Result<(), TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                context.device().dtod_copy(
                    &src.as_slice().slice(0..len),
                    &mut dst.as_slice_mut().slice_mut(0..len),
                )?;
                Ok(())
            }

            fn fill(dst: &mut CudaStorage<$ty>, len: usize, value: $ty) -> Result<(), TensorError> {
                let n: u32 = narrow("fill", len)?;
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let func = context.func(concat!("fill_", $suffix))?;
                unsafe { func.launch(launch_cfg(n), (dst.as_slice_mut(), n, value)) }?;
                Ok(())
            }
        }
    };
}

macro_rules! impl_float_kernels {
    ($ty:ty, $suffix:literal) => {
        impl FloatKernels<$ty> for GpuDevice {
            fn rand_uniform(
                dst: &mut CudaStorage<$ty>,
                len: usize,
                lo: $ty,
                hi: $ty,
            ) -> Result<(), TensorError> {
                let n: u32 = narrow("set_rand_u", len)?;
                let context: Arc<GpuContext> = GpuHandle::context()?;
                context
                    .rng()?
                    .fill_with_uniform(&mut dst.as_slice_mut().slice_mut(0..len))?;
                let func = context.func(concat!("uniform_map_", $suffix))?;
                unsafe { func.launch(launch_cfg(n), (dst.as_slice_mut(), n, lo, hi)) }?;
                Ok(())
            }

            fn rand_normal(
                dst: &mut CudaStorage<$ty>,
                len: usize,
                mean: $ty,
                std: $ty,
            ) -> Result<(), TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let rng = context.rng()?;
                // cuRAND only generates normals in pairs
                if len % 2 == 0 {
                    rng.fill_with_normal(&mut dst.as_slice_mut().slice_mut(0..len), mean, std)?;
                } else {
                    let mut scratch: CudaSlice<$ty> = context.device().alloc_zeros(len + 1)?;
                    rng.fill_with_normal(&mut scratch, mean, std)?;
                    context.device().dtod_copy(
                        &scratch.slice(0..len),
                        &mut dst.as_slice_mut().slice_mut(0..len),
                    )?;
                }
                Ok(())
            }

            fn asum(src: &CudaStorage<$ty>, len: usize) -> Result<$ty, TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let partials: Vec<$ty> = reduce_partials(
                    &context,
                    concat!("reduce_partial_", $suffix),
                    src.as_slice(),
                    len,
                    REDUCE_ABS,
                )?;
                Ok(partials.iter().sum())
            }

            fn norm2(src: &CudaStorage<$ty>, len: usize) -> Result<$ty, TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let partials: Vec<$ty> = reduce_partials(
                    &context,
                    concat!("reduce_partial_", $suffix),
                    src.as_slice(),
                    len,
                    REDUCE_SQUARES,
                )?;
                Ok(partials.iter().sum::<$ty>().sqrt())
            }

            fn sum(src: &CudaStorage<$ty>, len: usize) -> Result<$ty, TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let partials: Vec<$ty> = reduce_partials(
                    &context,
                    concat!("reduce_partial_", $suffix),
                    src.as_slice(),
                    len,
                    REDUCE_SUM,
                )?;
                Ok(partials.iter().sum())
            }

            fn unary(dst: &mut CudaStorage<$ty>, len: usize, op: UnaryOp) -> Result<(), TensorError> {
                let n: u32 = narrow("unary", len)?;
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let code: u32 = match op {
                    UnaryOp::Square => 0,
                    UnaryOp::Sqrt => 1,
                    UnaryOp::Inv => 2,
                };
                let func = context.func(concat!("unary_", $suffix))?;
                unsafe { func.launch(launch_cfg(n), (dst.as_slice_mut(), n, code)) }?;
                Ok(())
            }

            fn axpy(
                dst: &mut CudaStorage<$ty>,
                len: usize,
                cols: usize,
                alpha: $ty,
                src: &CudaStorage<$ty>,
                broadcast: Broadcast,
            ) -> Result<(), TensorError> {
                let (n, cols): (u32, u32) = (narrow("axpy", len)?, narrow("axpy", cols)?);
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let func = context.func(concat!("axpy_", $suffix))?;
                let params = (
                    dst.as_slice_mut(),
                    n,
                    cols,
                    alpha,
                    src.as_slice(),
                    broadcast.code(),
                );
                unsafe { func.launch(launch_cfg(n), params) }?;
                Ok(())
            }

            fn elewise_mul(
                dst: &mut CudaStorage<$ty>,
                len: usize,
                cols: usize,
                src: &CudaStorage<$ty>,
                broadcast: Broadcast,
            ) -> Result<(), TensorError> {
                let (n, cols): (u32, u32) = (narrow("elewise_mul", len)?, narrow("elewise_mul", cols)?);
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let func = context.func(concat!("elewise_mul_", $suffix))?;
                let params = (
                    dst.as_slice_mut(),
                    n,
                    cols,
                    src.as_slice(),
                    broadcast.code(),
                );
                unsafe { func.launch(launch_cfg(n), params) }?;
                Ok(())
            }

            fn mean_axis(
                src: &CudaStorage<$ty>,
                rows: usize,
                cols: usize,
                axis: MeanAxis,
                dst: &mut CudaStorage<$ty>,
            ) -> Result<(), TensorError> {
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let (name, threads): (&'static str, usize) = match axis {
                    MeanAxis::All => {
                        let total: $ty = <Self as FloatKernels<$ty>>::sum(src, rows * cols)?;
                        let mean: $ty = total / (rows * cols) as $ty;
                        context
                            .device()
                            .htod_sync_copy_into(&[mean], &mut dst.as_slice_mut().slice_mut(0..1))?;
                        return Ok(());
                    }
                    MeanAxis::Columns => (concat!("mean_cols_", $suffix), cols),
                    MeanAxis::Rows => (concat!("mean_rows_", $suffix), rows),
                };
                let (n_rows, n_cols): (u32, u32) = (narrow("mean", rows)?, narrow("mean", cols)?);
                let threads: u32 = narrow("mean", threads)?;
                let func = context.func(name)?;
                let params = (src.as_slice(), n_rows, n_cols, dst.as_slice_mut());
                unsafe { func.launch(launch_cfg(threads), params) }?;
                Ok(())
            }

            fn softmax(dst: &mut CudaStorage<$ty>, rows: usize, cols: usize) -> Result<(), TensorError> {
                let (rows, cols): (u32, u32) = (narrow("softmax", rows)?, narrow("softmax", cols)?);
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let func = context.func(concat!("softmax_rows_", $suffix))?;
                unsafe { func.launch(row_cfg(rows), (dst.as_slice_mut(), rows, cols)) }?;
                Ok(())
            }

            fn argmax(
                src: &CudaStorage<$ty>,
                rows: usize,
                cols: usize,
                dst: &mut CudaStorage<i32>,
            ) -> Result<(), TensorError> {
                let rows: u32 = narrow("argmax", rows)?;
                // column indices are written as i32
                narrow::<i32>("argmax", cols)?;
                let cols: u32 = narrow("argmax", cols)?;
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let mut nan_flag: CudaSlice<i32> = context.device().alloc_zeros(1)?;
                let func = context.func(concat!("argmax_rows_", $suffix))?;
                let params = (src.as_slice(), rows, cols, dst.as_slice_mut(), &mut nan_flag);
                unsafe { func.launch(row_cfg(rows), params) }?;

                let flag: Vec<i32> = context.device().dtoh_sync_copy(&nan_flag)?;
                if flag.iter().any(|&raised: &i32| raised != 0) {
                    warn!("argmax: input contains NaN");
                    return Err(TensorError::UndefinedOrder(MinMaxError::UndefinedOrder));
                }
                Ok(())
            }

            /// Row-major GEMM through column-major cuBLAS: `C^T = op(B)^T * op(A)^T`,
            /// so the operands and their flags swap places.
            fn gemm(
                dims: GemmDims<$ty>,
                a: &CudaStorage<$ty>,
                b: &CudaStorage<$ty>,
                c: &mut CudaStorage<$ty>,
            ) -> Result<(), TensorError> {
                let cfg: GemmConfig<$ty> = GemmConfig {
                    transa: cublas_op(dims.trans_b),
                    transb: cublas_op(dims.trans_a),
                    m: narrow("mm", dims.n)?,
                    n: narrow("mm", dims.m)?,
                    k: narrow("mm", dims.k)?,
                    alpha: dims.alpha,
                    lda: narrow("mm", dims.ldb)?,
                    ldb: narrow("mm", dims.lda)?,
                    beta: dims.beta,
                    ldc: narrow("mm", dims.n)?,
                };
                let context: Arc<GpuContext> = GpuHandle::context()?;
                let blas = context.blas()?;
                unsafe { blas.gemm(cfg, b.as_slice(), a.as_slice(), c.as_slice_mut()) }?;
                Ok(())
            }
        }
    };
}

impl_kernels!(f32, "f32");
impl_kernels!(f64, "f64");
impl_kernels!(i32, "i32");
impl_float_kernels!(f32, "f32");
impl_float_kernels!(f64, "f64");
