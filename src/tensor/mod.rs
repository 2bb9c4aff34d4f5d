pub mod backend;
pub mod dense;
pub mod device;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod shape;
pub mod storage;
pub mod tensor;

pub use dense::DTensor;
pub use device::{Dense, DeviceKind, Format, TensorFormat};
pub use dtype::{DType, Element, Float};
pub use error::TensorError;
pub use ops::Trans;
pub use shape::Shape;
pub use storage::Storage;
pub use tensor::{AnyTensor, Tensor};
