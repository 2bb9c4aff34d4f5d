use std::{any::Any, fmt};

use crate::tensor::{
    backend::Kernels, DTensor, DType, DeviceKind, Element, Format, Shape, TensorError,
    TensorFormat,
};

/// Object-safe view of a concrete tensor instantiation.
pub trait AnyTensor: Any + Send + Sync + fmt::Debug {
    fn device(&self) -> DeviceKind;
    fn format(&self) -> Format;
    fn dtype(&self) -> DType;
    fn shape(&self) -> Option<&Shape>;
    fn reshape(&mut self, dims: &[usize]) -> Result<(), TensorError>;
    fn clone_box(&self) -> Box<dyn AnyTensor>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<D: Kernels<T>, T: Element> AnyTensor for DTensor<D, T> {
    fn device(&self) -> DeviceKind {
        D::KIND
    }

    fn format(&self) -> Format {
        Format::Dense
    }

    fn dtype(&self) -> DType {
        T::DTYPE
    }

    fn shape(&self) -> Option<&Shape> {
        DTensor::shape(self)
    }

    fn reshape(&mut self, dims: &[usize]) -> Result<(), TensorError> {
        DTensor::reshape(self, dims)
    }

    fn clone_box(&self) -> Box<dyn AnyTensor> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn instantiate<D: Kernels<T>, T: Element>() -> Box<dyn AnyTensor> {
    Box::new(DTensor::<D, T>::new())
}

/// Device, format and dtype erased tensor handle.
///
/// The handle records the parameters it was built with and creates the
/// concrete tensor on first reshape or mutable access. Getting it back
/// requires naming the same parameters.
///
/// ```
/// use dtensor::tensor::{backend::CpuDevice, Dense, Tensor};
///
/// let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, f32>();
/// handle.reshape(&[2, 3]).unwrap();
/// handle.derived_mut::<CpuDevice, Dense, f32>().fill(1.0).unwrap();
/// assert_eq!(handle.derived::<CpuDevice, Dense, f32>().asum().unwrap(), 6.0);
/// ```
pub struct Tensor {
    device: DeviceKind,
    format: Format,
    dtype: DType,
    factory: fn() -> Box<dyn AnyTensor>,
    inner: Option<Box<dyn AnyTensor>>,
}

impl Tensor {
    pub fn new<D, F, T>() -> Self
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        Self {
            device: D::KIND,
            format: F::KIND,
            dtype: T::DTYPE,
            factory: instantiate::<D, T>,
            inner: None,
        }
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn is_instantiated(&self) -> bool {
        self.inner.is_some()
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.inner.as_ref().and_then(|inner| inner.shape())
    }

    /// Element count, `0` before the first reshape.
    pub fn count(&self) -> usize {
        self.shape().map_or(0, Shape::count)
    }

    pub fn reshape(&mut self, dims: &[usize]) -> Result<(), TensorError> {
        self.instance_mut().reshape(dims)
    }

    fn instance_mut(&mut self) -> &mut Box<dyn AnyTensor> {
        let factory: fn() -> Box<dyn AnyTensor> = self.factory;
        self.inner.get_or_insert_with(factory)
    }

    fn mismatch<D, F, T>(&self) -> TensorError
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        TensorError::DowncastMismatch {
            device: D::KIND,
            format: F::KIND,
            dtype: T::DTYPE,
            actual_device: self.device,
            actual_format: self.format,
            actual_dtype: self.dtype,
        }
    }

    pub fn try_derived<D, F, T>(&self) -> Result<&DTensor<D, T>, TensorError>
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        let inner: &dyn AnyTensor = self
            .inner
            .as_deref()
            .ok_or(TensorError::HandleNotInstantiated)?;
        if F::KIND != self.format {
            return Err(self.mismatch::<D, F, T>());
        }
        inner
            .as_any()
            .downcast_ref::<DTensor<D, T>>()
            .ok_or_else(|| self.mismatch::<D, F, T>())
    }

    /// Instantiates the concrete tensor if needed.
    pub fn try_derived_mut<D, F, T>(&mut self) -> Result<&mut DTensor<D, T>, TensorError>
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        if F::KIND != self.format || D::KIND != self.device || T::DTYPE != self.dtype {
            return Err(self.mismatch::<D, F, T>());
        }
        let error: TensorError = self.mismatch::<D, F, T>();
        self.instance_mut()
            .as_any_mut()
            .downcast_mut::<DTensor<D, T>>()
            .ok_or(error)
    }

    /// # Panics
    ///
    /// When the handle was built with other parameters or never reshaped.
    pub fn derived<D, F, T>(&self) -> &DTensor<D, T>
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        match self.try_derived::<D, F, T>() {
            Ok(tensor) => tensor,
            Err(err) => panic!("Invalid tensor cast: {err}"),
        }
    }

    /// # Panics
    ///
    /// When the handle was built with other parameters.
    pub fn derived_mut<D, F, T>(&mut self) -> &mut DTensor<D, T>
    where
        D: Kernels<T>,
        F: TensorFormat,
        T: Element,
    {
        match self.try_derived_mut::<D, F, T>() {
            Ok(tensor) => tensor,
            Err(err) => panic!("Invalid tensor cast: {err}"),
        }
    }
}

impl Clone for Tensor {
    fn clone(&self) -> Self {
        Self {
            device: self.device,
            format: self.format,
            dtype: self.dtype,
            factory: self.factory,
            inner: self.inner.as_ref().map(|inner| inner.clone_box()),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("device", &self.device)
            .field("format", &self.format)
            .field("dtype", &self.dtype)
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{backend::CpuDevice, Dense};

    #[test]
    fn test_new_records_tags_without_allocating() {
        let handle: Tensor = Tensor::new::<CpuDevice, Dense, f64>();
        assert_eq!(handle.device(), DeviceKind::Cpu);
        assert_eq!(handle.format(), Format::Dense);
        assert_eq!(handle.dtype(), DType::F64);
        assert!(!handle.is_instantiated());
        assert!(handle.shape().is_none());
        assert_eq!(handle.count(), 0);
    }

    #[test]
    fn test_reshape_instantiates() {
        let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, f32>();
        handle.reshape(&[4, 5]).unwrap();
        assert!(handle.is_instantiated());
        assert_eq!(handle.count(), 20);

        let tensor: &DTensor<CpuDevice, f32> = handle.derived::<CpuDevice, Dense, f32>();
        assert_eq!(tensor.mem_size(), 20);
    }

    #[test]
    fn test_derived_mut_instantiates() {
        let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, i32>();
        let tensor: &mut DTensor<CpuDevice, i32> = handle.derived_mut::<CpuDevice, Dense, i32>();
        assert!(!tensor.is_shaped());
        assert!(handle.is_instantiated());
    }

    #[test]
    fn test_try_derived_wrong_dtype() {
        let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, f32>();
        handle.reshape(&[2]).unwrap();
        let result = handle.try_derived::<CpuDevice, Dense, f64>();
        assert!(matches!(
            result,
            Err(TensorError::DowncastMismatch {
                dtype: DType::F64,
                actual_dtype: DType::F32,
                ..
            })
        ));
        assert!(handle.try_derived_mut::<CpuDevice, Dense, i32>().is_err());
    }

    #[test]
    fn test_try_derived_before_instantiation() {
        let handle: Tensor = Tensor::new::<CpuDevice, Dense, f32>();
        assert!(matches!(
            handle.try_derived::<CpuDevice, Dense, f32>(),
            Err(TensorError::HandleNotInstantiated)
        ));
    }

    #[test]
    #[should_panic(expected = "Invalid tensor cast")]
    fn test_derived_panics_on_mismatch() {
        let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, f32>();
        handle.reshape(&[2]).unwrap();
        let _ = handle.derived::<CpuDevice, Dense, i32>();
    }

    #[test]
    fn test_clone_copies_contents() {
        let mut handle: Tensor = Tensor::new::<CpuDevice, Dense, f64>();
        handle.reshape(&[3]).unwrap();
        handle
            .derived_mut::<CpuDevice, Dense, f64>()
            .fill(2.0)
            .unwrap();

        let mut copy: Tensor = handle.clone();
        copy.derived_mut::<CpuDevice, Dense, f64>()
            .fill(5.0)
            .unwrap();

        let original: Vec<f64> = handle
            .derived::<CpuDevice, Dense, f64>()
            .to_vec()
            .unwrap();
        assert_eq!(original, vec![2.0, 2.0, 2.0]);
    }
}
