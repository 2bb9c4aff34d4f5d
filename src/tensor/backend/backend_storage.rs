use std::fmt::Debug;

use crate::tensor::DeviceKind;

/// A raw, device-resident element buffer.
///
/// `Clone` is a deep copy on the owning device; the tensor layer relies on
/// it for copy-on-write.
pub trait BackendStorage: Clone + Debug + Send + Sync + 'static {
    fn device_kind(&self) -> DeviceKind;

    /// Number of elements allocated.
    fn capacity(&self) -> usize;
}
