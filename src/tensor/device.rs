use serde::{Deserialize, Serialize};

/// Runtime tag of the device a tensor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl DeviceKind {
    pub fn same_device(&self, rhs: &Self) -> bool {
        self == rhs
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Self::Gpu)
    }
}

/// Storage layout of a tensor. Only dense storage exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Dense,
}

/// Compile-time format marker used by the handle downcast.
pub trait TensorFormat: 'static {
    const KIND: Format;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dense;

impl TensorFormat for Dense {
    const KIND: Format = Format::Dense;
}
