use std::{any::Any, fmt};

use log::debug;

use crate::tensor::{
    backend::{CpuDevice, FloatKernels, Kernels, StorageOf},
    ops::{Broadcast, GemmDims, MeanAxis, Trans, UnaryOp},
    storage::Storage,
    DType, DeviceKind, Element, Float, Shape, TensorError,
};

/// Dense row-major tensor of `T` on device `D`.
///
/// A fresh tensor is unshaped and owns no storage. `reshape`, `copy_from`,
/// `from_vec` and `zeros` give it a shape; every other operation on an
/// unshaped tensor fails with [`TensorError::NotShaped`].
///
/// Storage follows a grow-or-reuse policy: a reshape whose element count
/// fits in `mem_size()` keeps the allocation, a larger one reallocates
/// without preserving contents.
pub struct DTensor<D: Kernels<T>, T: Element> {
    shape: Option<Shape>,
    storage: Option<Storage<D, T>>,
}

impl<D: Kernels<T>, T: Element> DTensor<D, T> {
    pub fn new() -> Self {
        Self {
            shape: None,
            storage: None,
        }
    }

    pub fn from_vec(dims: &[usize], data: &[T]) -> Result<Self, TensorError> {
        let shape: Shape = Shape::new(dims)?;
        if data.len() != shape.count() {
            return Err(TensorError::DataLength {
                got: data.len(),
                expected: shape.count(),
            });
        }
        let mut tensor: Self = Self::new();
        tensor.set_shape(shape)?;
        let (_, buffer) = tensor.parts_mut("from_vec")?;
        <D as Kernels<T>>::upload(buffer, data)?;
        Ok(tensor)
    }

    pub fn zeros(dims: &[usize]) -> Result<Self, TensorError> {
        let mut tensor: Self = Self::new();
        tensor.reshape(dims)?;
        tensor.fill(T::default())?;
        Ok(tensor)
    }

    /// Replaces the shape and makes sure the storage can hold it.
    pub fn reshape(&mut self, dims: &[usize]) -> Result<(), TensorError> {
        self.set_shape(Shape::new(dims)?)
    }

    fn set_shape(&mut self, shape: Shape) -> Result<(), TensorError> {
        let count: usize = shape.count();
        let fits: bool = self
            .storage
            .as_ref()
            .is_some_and(|storage: &Storage<D, T>| storage.mem_size() >= count);
        if !fits {
            debug!(
                "Reshape to {shape} needs {count} elements, had {}",
                self.mem_size()
            );
            self.storage = Some(Storage::new(count)?);
        }
        self.shape = Some(shape);
        Ok(())
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn dims(&self) -> &[usize] {
        match &self.shape {
            Some(shape) => shape.dims(),
            None => &[],
        }
    }

    /// Logical element count, `0` while unshaped.
    pub fn count(&self) -> usize {
        self.shape.as_ref().map_or(0, Shape::count)
    }

    pub fn rows(&self) -> usize {
        self.shape.as_ref().map_or(0, Shape::rows)
    }

    pub fn cols(&self) -> usize {
        self.shape.as_ref().map_or(0, Shape::cols)
    }

    /// Allocated capacity in elements, `0` while unshaped.
    pub fn mem_size(&self) -> usize {
        self.storage.as_ref().map_or(0, Storage::mem_size)
    }

    pub fn is_shaped(&self) -> bool {
        self.shape.is_some()
    }

    pub fn device(&self) -> DeviceKind {
        D::KIND
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn storage(&self) -> Option<&Storage<D, T>> {
        self.storage.as_ref()
    }

    fn parts(&self, op: &'static str) -> Result<(&Shape, &StorageOf<D, T>), TensorError> {
        match (&self.shape, &self.storage) {
            (Some(shape), Some(storage)) => Ok((shape, storage.buffer())),
            _ => Err(TensorError::NotShaped { op }),
        }
    }

    fn parts_mut(
        &mut self,
        op: &'static str,
    ) -> Result<(&Shape, &mut StorageOf<D, T>), TensorError> {
        match (&self.shape, &mut self.storage) {
            (Some(shape), Some(storage)) => Ok((shape, storage.buffer_mut())),
            _ => Err(TensorError::NotShaped { op }),
        }
    }

    /// Copies the logical elements to the host.
    pub fn to_vec(&self) -> Result<Vec<T>, TensorError> {
        let (shape, buffer) = self.parts("to_vec")?;
        <D as Kernels<T>>::download(buffer, shape.count())
    }

    pub fn fill(&mut self, value: T) -> Result<(), TensorError> {
        let (shape, buffer) = self.parts_mut("fill")?;
        let count: usize = shape.count();
        <D as Kernels<T>>::fill(buffer, count, value)
    }

    /// Deep copy of shape and contents from a tensor on any device. The
    /// copy stays on the device when both tensors share it and goes
    /// through host memory otherwise.
    ///
    /// The shape is only replaced once the transfer succeeded. A copy that
    /// needs a larger buffer fills a new one and leaves `self` untouched on
    /// failure.
    pub fn copy_from<D2: Kernels<T>>(&mut self, other: &DTensor<D2, T>) -> Result<(), TensorError> {
        let (other_shape, other_buffer) = other.parts("copy_from")?;
        let count: usize = other_shape.count();

        let mut staged: Option<Storage<D, T>> = None;
        let storage: &mut Storage<D, T> = match &mut self.storage {
            Some(storage) if storage.mem_size() >= count => storage,
            _ => staged.insert(Storage::new(count)?),
        };
        let buffer: &mut StorageOf<D, T> = storage.buffer_mut();

        if let Some(same) = (other as &dyn Any).downcast_ref::<DTensor<D, T>>() {
            let (_, src) = same.parts("copy_from")?;
            <D as Kernels<T>>::copy(buffer, src, count)?;
        } else {
            debug!(
                "copy_from: {count} x {:?} from {:?} to {:?}",
                T::DTYPE,
                D2::KIND,
                D::KIND
            );
            let host: Vec<T> = <D2 as Kernels<T>>::download(other_buffer, count)?;
            <D as Kernels<T>>::upload(buffer, &host)?;
        }

        if let Some(storage) = staged {
            self.storage = Some(storage);
        }
        self.shape = Some(other_shape.clone());
        Ok(())
    }

    pub fn as_scalar(&self) -> Result<T, TensorError> {
        let (shape, buffer) = self.parts("as_scalar")?;
        if shape.count() != 1 {
            return Err(TensorError::NotScalar {
                count: shape.count(),
            });
        }
        let values: Vec<T> = <D as Kernels<T>>::download(buffer, 1)?;
        Ok(values[0])
    }
}

impl<T: Element> DTensor<CpuDevice, T> {
    /// Direct access to the logical elements of a host tensor.
    pub fn as_slice(&self) -> Result<&[T], TensorError> {
        let (shape, buffer) = self.parts("as_slice")?;
        Ok(&buffer.0[..shape.count()])
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [T], TensorError> {
        let (shape, buffer) = self.parts_mut("as_mut_slice")?;
        let count: usize = shape.count();
        Ok(&mut buffer.0[..count])
    }
}

impl<D: FloatKernels<T>, T: Float> DTensor<D, T> {
    /// I.i.d. samples from `U[lo, hi)`.
    pub fn set_rand_u(&mut self, lo: T, hi: T) -> Result<(), TensorError> {
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(TensorError::InvalidDistribution(format!(
                "uniform bounds [{lo}, {hi})"
            )));
        }
        let (shape, buffer) = self.parts_mut("set_rand_u")?;
        let count: usize = shape.count();
        D::rand_uniform(buffer, count, lo, hi)
    }

    /// I.i.d. samples from `N(mean, std^2)`.
    pub fn set_rand_n(&mut self, mean: T, std: T) -> Result<(), TensorError> {
        if !(mean.is_finite() && std.is_finite() && std >= T::zero()) {
            return Err(TensorError::InvalidDistribution(format!(
                "normal mean {mean}, std {std}"
            )));
        }
        let (shape, buffer) = self.parts_mut("set_rand_n")?;
        let count: usize = shape.count();
        D::rand_normal(buffer, count, mean, std)
    }

    /// Sum of absolute values.
    pub fn asum(&self) -> Result<T, TensorError> {
        let (shape, buffer) = self.parts("asum")?;
        D::asum(buffer, shape.count())
    }

    /// Euclidean norm.
    pub fn norm2(&self) -> Result<T, TensorError> {
        let (shape, buffer) = self.parts("norm2")?;
        D::norm2(buffer, shape.count())
    }

    pub fn sum(&self) -> Result<T, TensorError> {
        let (shape, buffer) = self.parts("sum")?;
        D::sum(buffer, shape.count())
    }

    fn unary(&mut self, op: UnaryOp, name: &'static str) -> Result<(), TensorError> {
        let (shape, buffer) = self.parts_mut(name)?;
        let count: usize = shape.count();
        D::unary(buffer, count, op)
    }

    pub fn square(&mut self) -> Result<(), TensorError> {
        self.unary(UnaryOp::Square, "square")
    }

    pub fn sqrt(&mut self) -> Result<(), TensorError> {
        self.unary(UnaryOp::Sqrt, "sqrt")
    }

    /// Elementwise reciprocal. Zero maps to infinity.
    pub fn inv(&mut self) -> Result<(), TensorError> {
        self.unary(UnaryOp::Inv, "inv")
    }

    /// `self += alpha * x`, where `x` has the same element count or is a
    /// `{rows, 1}` column / `{1, cols}` row of `self`'s matrix view.
    pub fn axpy(&mut self, alpha: T, x: &Self) -> Result<(), TensorError> {
        let (x_shape, x_buffer) = x.parts("axpy")?;
        let (shape, buffer) = self.parts_mut("axpy")?;
        let broadcast: Broadcast = Broadcast::resolve("axpy", shape, x_shape, true)?;
        let (count, cols): (usize, usize) = (shape.count(), shape.cols());
        D::axpy(buffer, count, cols, alpha, x_buffer, broadcast)
    }

    /// In-place elementwise product with an operand of identical dims, or a
    /// column/row vector broadcast over the matrix view.
    pub fn elewise_mul(&mut self, other: &Self) -> Result<(), TensorError> {
        let (other_shape, other_buffer) = other.parts("elewise_mul")?;
        let (shape, buffer) = self.parts_mut("elewise_mul")?;
        let broadcast: Broadcast = Broadcast::resolve("elewise_mul", shape, other_shape, false)?;
        let (count, cols): (usize, usize) = (shape.count(), shape.cols());
        D::elewise_mul(buffer, count, cols, other_buffer, broadcast)
    }

    /// Writes the mean of `source` into `self`. The reduction follows the
    /// current shape of `self`:
    ///
    /// * unshaped or a single element: mean of everything, shape `{1}`
    /// * `{1, cols}`: one mean per column
    /// * `{rows, 1}`: one mean per row
    pub fn mean(&mut self, source: &Self) -> Result<(), TensorError> {
        let (source_shape, source_buffer) = source.parts("mean")?;
        let (rows, cols): (usize, usize) = (source_shape.rows(), source_shape.cols());

        let axis: MeanAxis = match &self.shape {
            None => MeanAxis::All,
            Some(shape) if shape.count() == 1 => MeanAxis::All,
            Some(shape) if shape.dims() == [1, cols] => MeanAxis::Columns,
            Some(shape) if shape.dims() == [rows, 1] => MeanAxis::Rows,
            Some(shape) => {
                return Err(TensorError::IncompatibleShape {
                    op: "mean",
                    lhs: shape.dims().to_vec(),
                    rhs: source_shape.dims().to_vec(),
                })
            }
        };
        if axis == MeanAxis::All {
            self.reshape(&[1])?;
        }

        let (_, buffer) = self.parts_mut("mean")?;
        D::mean_axis(source_buffer, rows, cols, axis, buffer)
    }

    /// Row-wise softmax over the matrix view, in place.
    pub fn softmax(&mut self) -> Result<(), TensorError> {
        let (shape, buffer) = self.parts_mut("softmax")?;
        let (rows, cols): (usize, usize) = (shape.rows(), shape.cols());
        D::softmax(buffer, rows, cols)
    }

    /// Index of the first maximum of every row, written to `dst` reshaped to
    /// `{rows, 1}`.
    pub fn argmax(&self, dst: &mut DTensor<D, i32>) -> Result<(), TensorError> {
        let (shape, buffer) = self.parts("argmax")?;
        let (rows, cols): (usize, usize) = (shape.rows(), shape.cols());
        dst.reshape(&[rows, 1])?;
        let (_, indices) = dst.parts_mut("argmax")?;
        D::argmax(buffer, rows, cols, indices)
    }

    /// `self = alpha * op(a) * op(b) + beta * self`.
    ///
    /// `self` is resized to the outer dimensions. When that changes its
    /// shape, the previous contents count as zero.
    pub fn mm(
        &mut self,
        a: &Self,
        b: &Self,
        trans_a: Trans,
        trans_b: Trans,
        alpha: T,
        beta: T,
    ) -> Result<(), TensorError> {
        let (a_shape, a_buffer) = a.parts("mm")?;
        let (b_shape, b_buffer) = b.parts("mm")?;
        let (m, k): (usize, usize) = trans_a.apply(a_shape.rows(), a_shape.cols());
        let (b_k, n): (usize, usize) = trans_b.apply(b_shape.rows(), b_shape.cols());
        if k != b_k {
            return Err(TensorError::IncompatibleShape {
                op: "mm",
                lhs: a_shape.dims().to_vec(),
                rhs: b_shape.dims().to_vec(),
            });
        }

        let target: Shape = Shape::new(&[m, n])?;
        let resized: bool = self.shape.as_ref() != Some(&target);
        self.set_shape(target)?;
        if resized {
            self.fill(T::zero())?;
        }

        let dims: GemmDims<T> = GemmDims {
            trans_a,
            trans_b,
            m,
            n,
            k,
            lda: a_shape.cols(),
            ldb: b_shape.cols(),
            alpha,
            beta,
        };
        let (_, buffer) = self.parts_mut("mm")?;
        D::gemm(dims, a_buffer, b_buffer, buffer)
    }
}

impl<D: Kernels<T>, T: Element> Default for DTensor<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Kernels<T>, T: Element> Clone for DTensor<D, T> {
    /// Shares the storage until either tensor writes to it.
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<D: Kernels<T>, T: Element> fmt::Debug for DTensor<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DTensor")
            .field("device", &D::KIND)
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape)
            .field("mem_size", &self.mem_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type CpuTensor<T> = DTensor<CpuDevice, T>;

    fn matrix(dims: &[usize], data: &[f64]) -> CpuTensor<f64> {
        CpuTensor::from_vec(dims, data).unwrap()
    }

    fn assert_close(lhs: &[f64], rhs: &[f64], tolerance: f64) {
        assert_eq!(lhs.len(), rhs.len());
        for (l, r) in lhs.iter().zip(rhs) {
            assert!((l - r).abs() <= tolerance, "{l} != {r}");
        }
    }

    #[test]
    fn test_reshape_size() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        assert!(!x.is_shaped());
        assert_eq!(x.mem_size(), 0);

        x.reshape(&[2, 3, 4]).unwrap();
        assert_eq!(x.count(), 24);
        assert_eq!(x.mem_size(), 24);
        assert_eq!(x.dims(), &[2, 3, 4]);
    }

    #[test]
    fn test_reshape_grow_or_reuse() {
        let mut x: CpuTensor<f32> = CpuTensor::new();
        x.reshape(&[4, 6]).unwrap();

        x.reshape(&[2, 3]).unwrap();
        assert_eq!(x.count(), 6);
        assert_eq!(x.mem_size(), 24);

        x.reshape(&[5, 5]).unwrap();
        assert_eq!(x.count(), 25);
        assert_eq!(x.mem_size(), 25);
    }

    #[test]
    fn test_reshape_rejects_bad_dims() {
        let mut x: CpuTensor<f32> = CpuTensor::new();
        assert!(x.reshape(&[3, 0]).is_err());
        assert!(!x.is_shaped());
    }

    #[test]
    fn test_ops_need_shape() {
        let x: CpuTensor<f32> = CpuTensor::new();
        assert!(matches!(
            x.asum(),
            Err(TensorError::NotShaped { op: "asum" })
        ));
        let mut y: CpuTensor<f32> = CpuTensor::new();
        assert!(matches!(
            y.fill(1.0),
            Err(TensorError::NotShaped { op: "fill" })
        ));
    }

    #[test]
    fn test_from_vec_checks_length() {
        let result = CpuTensor::<f32>::from_vec(&[2, 2], &[1.0, 2.0, 3.0]);
        assert!(matches!(
            result,
            Err(TensorError::DataLength {
                got: 3,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_fill_and_asum() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[100, 100, 10]).unwrap();
        x.fill(2.0).unwrap();
        assert_eq!(x.asum().unwrap(), 2.0 * 100000.0);
    }

    #[test]
    fn test_fill_integer_tensor() {
        let mut x: CpuTensor<i32> = CpuTensor::new();
        x.reshape(&[3]).unwrap();
        x.fill(-4).unwrap();
        assert_eq!(x.to_vec().unwrap(), vec![-4, -4, -4]);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut x: CpuTensor<f64> = matrix(&[2], &[1.0, 2.0]);
        let y: CpuTensor<f64> = x.clone();
        x.fill(0.0).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![1.0, 2.0]);
        assert_eq!(x.to_vec().unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_copy_from_round_trip() {
        let x: CpuTensor<f64> = matrix(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut y: CpuTensor<f64> = CpuTensor::new();
        y.copy_from(&x).unwrap();
        assert_eq!(y.shape(), x.shape());
        assert_eq!(y.to_vec().unwrap(), x.to_vec().unwrap());
        assert!(!y.storage().unwrap().ptr_eq(x.storage().unwrap()));
    }

    #[test]
    fn test_copy_from_reuses_larger_buffer() {
        let mut y: CpuTensor<f32> = CpuTensor::zeros(&[10, 10]).unwrap();
        let x: CpuTensor<f32> = CpuTensor::from_vec(&[2], &[1.0, 2.0]).unwrap();
        y.copy_from(&x).unwrap();
        assert_eq!(y.dims(), &[2]);
        assert_eq!(y.mem_size(), 100);
        assert_eq!(y.as_slice().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_as_scalar() {
        let x: CpuTensor<f64> = matrix(&[1, 1], &[4.5]);
        assert_eq!(x.as_scalar().unwrap(), 4.5);
        let y: CpuTensor<f64> = matrix(&[2], &[4.5, 1.0]);
        assert!(matches!(
            y.as_scalar(),
            Err(TensorError::NotScalar { count: 2 })
        ));
    }

    #[test]
    fn test_inv_sqrt_square_norm2() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[10, 10]).unwrap();
        x.set_rand_u(1.0, 3.0).unwrap();
        let original: Vec<f64> = x.to_vec().unwrap();

        x.inv().unwrap();
        x.sqrt().unwrap();
        x.square().unwrap();
        x.inv().unwrap();
        assert_close(&x.to_vec().unwrap(), &original, 1e-12);

        let expected: f64 = original.iter().map(|v: &f64| v * v).sum::<f64>().sqrt();
        assert!((x.norm2().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_domain_violations_are_ieee() {
        let mut x: CpuTensor<f64> = matrix(&[2], &[0.0, -1.0]);
        x.inv().unwrap();
        assert_eq!(x.to_vec().unwrap()[0], f64::INFINITY);
        let mut y: CpuTensor<f64> = matrix(&[1], &[-1.0]);
        y.sqrt().unwrap();
        assert!(y.as_scalar().unwrap().is_nan());
    }

    #[test]
    fn test_rand_rejects_bad_parameters() {
        let mut x: CpuTensor<f32> = CpuTensor::zeros(&[4]).unwrap();
        assert!(matches!(
            x.set_rand_u(3.0, 1.0),
            Err(TensorError::InvalidDistribution(_))
        ));
        assert!(matches!(
            x.set_rand_n(0.0, -0.5),
            Err(TensorError::InvalidDistribution(_))
        ));
    }

    #[test]
    fn test_rand_uniform_mean() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[400, 250, 200]).unwrap();
        x.set_rand_u(-1.0, 3.0).unwrap();
        let values: Vec<f64> = x.to_vec().unwrap();
        assert!(values.iter().all(|v: &f64| (-1.0..3.0).contains(v)));

        let mut mean: CpuTensor<f64> = CpuTensor::new();
        mean.mean(&x).unwrap();
        // standard error is about 2.6e-4
        assert!((mean.as_scalar().unwrap() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rand_normal_moments() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[200, 500, 200]).unwrap();
        x.set_rand_n(5.0, 0.1).unwrap();

        let mut mean: CpuTensor<f64> = CpuTensor::new();
        mean.mean(&x).unwrap();
        let m: f64 = mean.as_scalar().unwrap();
        assert!((m - 5.0).abs() < 1e-4);

        let values: Vec<f64> = x.to_vec().unwrap();
        let variance: f64 =
            values.iter().map(|v: &f64| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
        assert!((variance.sqrt() - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_axpy_same_count() {
        let mut y: CpuTensor<f64> = matrix(&[2, 3], &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let x: CpuTensor<f64> = matrix(&[3, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        y.axpy(-1.0, &x).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![0.0, -1.0, -2.0, -3.0, -4.0, -5.0]);
    }

    #[test]
    fn test_axpy_broadcast_column() {
        let mut y: CpuTensor<f64> = CpuTensor::zeros(&[2, 3]).unwrap();
        let x: CpuTensor<f64> = matrix(&[2, 1], &[1.0, 2.0]);
        y.axpy(3.0, &x).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![3.0, 3.0, 3.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn test_axpy_rejects_mismatch() {
        let mut y: CpuTensor<f64> = CpuTensor::zeros(&[2, 3]).unwrap();
        let x: CpuTensor<f64> = CpuTensor::zeros(&[4]).unwrap();
        assert!(matches!(
            y.axpy(1.0, &x),
            Err(TensorError::IncompatibleShape { op: "axpy", .. })
        ));
    }

    #[test]
    fn test_broadcast_mul_col() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[5, 3]).unwrap();
        x.as_mut_slice()
            .unwrap()
            .iter_mut()
            .enumerate()
            .for_each(|(i, v): (usize, &mut f64)| *v = (i % 3 + 1) as f64);

        let y: CpuTensor<f64> = matrix(&[5, 1], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        x.elewise_mul(&y).unwrap();

        let values: &[f64] = x.as_slice().unwrap();
        for i in 0..5 {
            for j in 0..3 {
                assert_eq!(values[i * 3 + j], ((i + 1) * (j + 1)) as f64);
            }
        }
    }

    #[test]
    fn test_broadcast_mul_row() {
        let mut x: CpuTensor<f64> = CpuTensor::zeros(&[3, 4]).unwrap();
        x.fill(2.0).unwrap();
        let y: CpuTensor<f64> = matrix(&[1, 4], &[1.0, 2.0, 3.0, 4.0]);
        x.elewise_mul(&y).unwrap();
        assert_eq!(&x.to_vec().unwrap()[4..8], &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_elewise_mul_needs_exact_dims() {
        let mut x: CpuTensor<f64> = CpuTensor::zeros(&[2, 3]).unwrap();
        let y: CpuTensor<f64> = CpuTensor::zeros(&[3, 2]).unwrap();
        assert!(x.elewise_mul(&y).is_err());
    }

    #[test]
    fn test_mean_by_destination_shape() {
        let x: CpuTensor<f64> = matrix(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut all: CpuTensor<f64> = CpuTensor::new();
        all.mean(&x).unwrap();
        assert_eq!(all.dims(), &[1]);
        assert_eq!(all.as_scalar().unwrap(), 3.5);

        let mut columns: CpuTensor<f64> = CpuTensor::zeros(&[1, 3]).unwrap();
        columns.mean(&x).unwrap();
        assert_eq!(columns.to_vec().unwrap(), vec![2.5, 3.5, 4.5]);

        let mut rows: CpuTensor<f64> = CpuTensor::zeros(&[2, 1]).unwrap();
        rows.mean(&x).unwrap();
        assert_eq!(rows.to_vec().unwrap(), vec![2.0, 5.0]);

        let mut single: CpuTensor<f64> = CpuTensor::zeros(&[1, 1]).unwrap();
        single.mean(&x).unwrap();
        assert_eq!(single.dims(), &[1]);
        assert_eq!(single.as_scalar().unwrap(), 3.5);
    }

    #[test]
    fn test_mean_rejects_other_shapes() {
        let x: CpuTensor<f64> = CpuTensor::zeros(&[2, 3]).unwrap();
        let mut dst: CpuTensor<f64> = CpuTensor::zeros(&[2, 2]).unwrap();
        assert!(matches!(
            dst.mean(&x),
            Err(TensorError::IncompatibleShape { op: "mean", .. })
        ));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut x: CpuTensor<f64> = CpuTensor::new();
        x.reshape(&[20, 200]).unwrap();
        x.set_rand_u(-5.0, 5.0).unwrap();
        x.softmax().unwrap();

        let mut row_sums: CpuTensor<f64> = CpuTensor::zeros(&[20, 1]).unwrap();
        row_sums.mean(&x).unwrap();
        for mean in row_sums.to_vec().unwrap() {
            assert!((mean * 200.0 - 1.0).abs() < 1e-4);
        }
        assert!(x.as_slice().unwrap().iter().all(|v: &f64| *v >= 0.0));
    }

    #[test]
    fn test_argmax_reshapes_destination() {
        let x: CpuTensor<f32> =
            CpuTensor::from_vec(&[3, 3], &[0.0, 5.0, 1.0, 2.0, 2.0, 1.0, -3.0, -2.0, -1.0])
                .unwrap();
        let mut idx: DTensor<CpuDevice, i32> = DTensor::new();
        x.argmax(&mut idx).unwrap();
        assert_eq!(idx.dims(), &[3, 1]);
        assert_eq!(idx.to_vec().unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn test_argmax_nan_row_has_no_order() {
        let x: CpuTensor<f32> =
            CpuTensor::from_vec(&[2, 3], &[0.0, 1.0, 2.0, 1.0, f32::NAN, 5.0]).unwrap();
        let mut idx: DTensor<CpuDevice, i32> = DTensor::new();
        assert!(matches!(
            x.argmax(&mut idx),
            Err(TensorError::UndefinedOrder(_))
        ));
    }

    #[test]
    fn test_mm_transposed() {
        let a: CpuTensor<f64> = matrix(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b: CpuTensor<f64> = matrix(&[2, 3], &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let mut c: CpuTensor<f64> = CpuTensor::new();
        c.mm(&a, &b, Trans::N, Trans::T, 1.0, 0.0).unwrap();
        assert_eq!(c.dims(), &[2, 2]);
        assert_eq!(c.to_vec().unwrap(), vec![4.0, 2.0, 10.0, 5.0]);

        let mut d: CpuTensor<f64> = CpuTensor::new();
        d.mm(&a, &b, Trans::T, Trans::N, 1.0, 0.0).unwrap();
        assert_eq!(d.dims(), &[3, 3]);
        assert_eq!(
            d.to_vec().unwrap(),
            vec![1.0, 4.0, 1.0, 2.0, 5.0, 2.0, 3.0, 6.0, 3.0]
        );
    }

    #[test]
    fn test_mm_beta_accumulates_when_shape_kept() {
        let a: CpuTensor<f64> = matrix(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let mut c: CpuTensor<f64> = matrix(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        c.mm(&a, &a, Trans::N, Trans::N, 2.0, 1.0).unwrap();
        assert_eq!(c.to_vec().unwrap(), vec![3.0, 2.0, 3.0, 6.0]);
    }

    #[test]
    fn test_mm_resized_output_starts_at_zero() {
        let a: CpuTensor<f64> = matrix(&[1, 2], &[1.0, 1.0]);
        let b: CpuTensor<f64> = matrix(&[2, 1], &[2.0, 3.0]);
        let mut c: CpuTensor<f64> = CpuTensor::zeros(&[4, 4]).unwrap();
        c.fill(100.0).unwrap();
        c.mm(&a, &b, Trans::N, Trans::N, 1.0, 1.0).unwrap();
        assert_eq!(c.dims(), &[1, 1]);
        assert_eq!(c.as_scalar().unwrap(), 5.0);
    }

    #[test]
    fn test_mm_inner_dimension_mismatch() {
        let a: CpuTensor<f64> = CpuTensor::zeros(&[2, 3]).unwrap();
        let mut c: CpuTensor<f64> = CpuTensor::new();
        assert!(matches!(
            c.mm(&a, &a, Trans::N, Trans::N, 1.0, 0.0),
            Err(TensorError::IncompatibleShape { op: "mm", .. })
        ));
    }
}
