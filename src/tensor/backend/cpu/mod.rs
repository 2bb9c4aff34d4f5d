pub mod storage;
pub use storage::CpuStorage;

use log::warn;
use ndarray::{linalg::general_mat_mul, Array1, ArrayView2, ArrayViewMut2, Axis};
use ndarray_rand::rand_distr::{Distribution, Normal, Uniform};
use ndarray_stats::QuantileExt;
use rand::thread_rng;

use crate::tensor::{
    backend::backend_device::{BackendDevice, FloatKernels, Kernels},
    ops::{narrow, Broadcast, GemmDims, MeanAxis, Trans, UnaryOp},
    DeviceKind, Element, Float, TensorError,
};

/// Host backend. Buffers are plain vectors and every kernel runs eagerly on
/// the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    const KIND: DeviceKind = DeviceKind::Cpu;

    fn synchronize() -> Result<(), TensorError> {
        Ok(())
    }
}

impl<T: Element> Kernels<T> for CpuDevice {
    type Storage = CpuStorage<T>;

    fn alloc(capacity: usize) -> Result<CpuStorage<T>, TensorError> {
        CpuStorage::new(capacity)
    }

    fn upload(dst: &mut CpuStorage<T>, src: &[T]) -> Result<(), TensorError> {
        if src.len() > dst.len() {
            return Err(TensorError::DataLength {
                got: src.len(),
                expected: dst.len(),
            });
        }
        dst.0[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn download(src: &CpuStorage<T>, len: usize) -> Result<Vec<T>, TensorError> {
        Ok(src.0[..len].to_vec())
    }

    fn copy(dst: &mut CpuStorage<T>, src: &CpuStorage<T>, len: usize) -> Result<(), TensorError> {
        dst.0[..len].copy_from_slice(&src.0[..len]);
        Ok(())
    }

    fn fill(dst: &mut CpuStorage<T>, len: usize, value: T) -> Result<(), TensorError> {
        dst.0[..len].fill(value);
        Ok(())
    }
}

impl<T: Float> FloatKernels<T> for CpuDevice {
    fn rand_uniform(
        dst: &mut CpuStorage<T>,
        len: usize,
        lo: T,
        hi: T,
    ) -> Result<(), TensorError> {
        let mut rng = thread_rng();
        let uniform: Uniform<T> = Uniform::new(lo, hi);
        dst.0[..len]
            .iter_mut()
            .for_each(|x: &mut T| *x = uniform.sample(&mut rng));
        Ok(())
    }

    fn rand_normal(
        dst: &mut CpuStorage<T>,
        len: usize,
        mean: T,
        std: T,
    ) -> Result<(), TensorError> {
        let mut rng = thread_rng();
        let normal: Normal<f64> = Normal::new(mean.as_f64(), std.as_f64())
            .map_err(|err| TensorError::InvalidDistribution(err.to_string()))?;
        dst.0[..len]
            .iter_mut()
            .for_each(|x: &mut T| *x = T::from_f64_lossy(normal.sample(&mut rng)));
        Ok(())
    }

    fn asum(src: &CpuStorage<T>, len: usize) -> Result<T, TensorError> {
        Ok(src.0[..len]
            .iter()
            .fold(T::zero(), |acc: T, &x: &T| acc + x.abs()))
    }

    fn norm2(src: &CpuStorage<T>, len: usize) -> Result<T, TensorError> {
        let squares: T = src.0[..len]
            .iter()
            .fold(T::zero(), |acc: T, &x: &T| acc + x * x);
        Ok(squares.sqrt())
    }

    fn sum(src: &CpuStorage<T>, len: usize) -> Result<T, TensorError> {
        Ok(src.0[..len].iter().fold(T::zero(), |acc: T, &x: &T| acc + x))
    }

    fn unary(dst: &mut CpuStorage<T>, len: usize, op: UnaryOp) -> Result<(), TensorError> {
        let data: &mut [T] = &mut dst.0[..len];
        match op {
            UnaryOp::Square => data.iter_mut().for_each(|x: &mut T| *x = *x * *x),
            UnaryOp::Sqrt => data.iter_mut().for_each(|x: &mut T| *x = x.sqrt()),
            UnaryOp::Inv => data.iter_mut().for_each(|x: &mut T| *x = x.recip()),
        }
        Ok(())
    }

    fn axpy(
        dst: &mut CpuStorage<T>,
        len: usize,
        cols: usize,
        alpha: T,
        src: &CpuStorage<T>,
        broadcast: Broadcast,
    ) -> Result<(), TensorError> {
        dst.0[..len]
            .iter_mut()
            .enumerate()
            .for_each(|(i, x): (usize, &mut T)| {
                *x += alpha * src.0[broadcast.source_index(i, cols)];
            });
        Ok(())
    }

    fn elewise_mul(
        dst: &mut CpuStorage<T>,
        len: usize,
        cols: usize,
        src: &CpuStorage<T>,
        broadcast: Broadcast,
    ) -> Result<(), TensorError> {
        dst.0[..len]
            .iter_mut()
            .enumerate()
            .for_each(|(i, x): (usize, &mut T)| {
                *x *= src.0[broadcast.source_index(i, cols)];
            });
        Ok(())
    }

    fn mean_axis(
        src: &CpuStorage<T>,
        rows: usize,
        cols: usize,
        axis: MeanAxis,
        dst: &mut CpuStorage<T>,
    ) -> Result<(), TensorError> {
        let view: ArrayView2<T> = ArrayView2::from_shape((rows, cols), &src.0[..rows * cols])?;
        let (sums, divisor): (Array1<T>, usize) = match axis {
            MeanAxis::All => (Array1::from_elem(1, view.sum()), rows * cols),
            MeanAxis::Columns => (view.sum_axis(Axis(0)), rows),
            MeanAxis::Rows => (view.sum_axis(Axis(1)), cols),
        };
        let divisor: T = T::from_f64_lossy(divisor as f64);
        dst.0[..sums.len()]
            .iter_mut()
            .zip(sums.iter())
            .for_each(|(x, &sum): (&mut T, &T)| *x = sum / divisor);
        Ok(())
    }

    fn softmax(dst: &mut CpuStorage<T>, rows: usize, cols: usize) -> Result<(), TensorError> {
        for (r, row) in dst.0[..rows * cols].chunks_mut(cols).enumerate() {
            if row.iter().any(|x: &T| x.is_nan()) {
                warn!("softmax: row {r} contains NaN");
            }
            let max_val: T = row
                .iter()
                .fold(T::neg_infinity(), |max: T, &val: &T| max.max(val));
            row.iter_mut()
                .for_each(|x: &mut T| *x = (*x - max_val).exp());
            let sum_exps: T = row.iter().fold(T::zero(), |acc: T, &x: &T| acc + x);
            row.iter_mut().for_each(|x: &mut T| *x /= sum_exps);
        }
        Ok(())
    }

    fn argmax(
        src: &CpuStorage<T>,
        rows: usize,
        cols: usize,
        dst: &mut CpuStorage<i32>,
    ) -> Result<(), TensorError> {
        let view: ArrayView2<T> = ArrayView2::from_shape((rows, cols), &src.0[..rows * cols])?;
        for (r, row) in view.rows().into_iter().enumerate() {
            let index: usize = row.argmax().map_err(|err| {
                warn!("argmax: row {r} has no total order");
                TensorError::from(err)
            })?;
            dst.0[r] = narrow("argmax", index)?;
        }
        Ok(())
    }

    fn gemm(
        dims: GemmDims<T>,
        a: &CpuStorage<T>,
        b: &CpuStorage<T>,
        c: &mut CpuStorage<T>,
    ) -> Result<(), TensorError> {
        let (m, n, k): (usize, usize, usize) = (dims.m, dims.n, dims.k);
        let a_op: ArrayView2<T> = stored_operand(&a.0, dims.trans_a, m, k)?;
        let b_op: ArrayView2<T> = stored_operand(&b.0, dims.trans_b, k, n)?;
        let mut c_view: ArrayViewMut2<T> = ArrayViewMut2::from_shape((m, n), &mut c.0[..m * n])?;
        general_mat_mul(dims.alpha, &a_op, &b_op, dims.beta, &mut c_view);
        Ok(())
    }
}

/// Views a stored matrix as `op(x)` with dimensions `rows x cols`.
fn stored_operand<T: Float>(
    data: &[T],
    trans: Trans,
    rows: usize,
    cols: usize,
) -> Result<ArrayView2<'_, T>, TensorError> {
    let (stored_rows, stored_cols): (usize, usize) = trans.apply(rows, cols);
    let view: ArrayView2<T> =
        ArrayView2::from_shape((stored_rows, stored_cols), &data[..rows * cols])?;
    Ok(match trans {
        Trans::N => view,
        Trans::T => view.reversed_axes(),
    })
}
