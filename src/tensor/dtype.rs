use std::fmt;

use ndarray::NdFloat;
use rand::distributions::uniform::SampleUniform;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Scalar types a tensor can hold.
pub trait Element:
    Copy + Default + PartialEq + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const DTYPE: DType;

    fn from_f64_lossy(value: f64) -> Self;
    fn as_f64(self) -> f64;
}

/// Element types with floating point arithmetic, reductions and GEMM.
pub trait Float: Element + NdFloat + SampleUniform {}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn from_f64_lossy(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;

    fn from_f64_lossy(value: f64) -> Self {
        value as i32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Float for f32 {}
impl Float for f64 {}
