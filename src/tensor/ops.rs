use serde::{Deserialize, Serialize};

use crate::tensor::{Shape, TensorError};

/// Per-operand transpose flag of a matrix multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trans {
    N,
    T,
}

impl Trans {
    /// Dimensions of `op(x)` for an `rows x cols` matrix `x`.
    pub fn apply(&self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Trans::N => (rows, cols),
            Trans::T => (cols, rows),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Square,
    Sqrt,
    Inv,
}

/// How the right operand of an elementwise op lines up with the left one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    /// Same element count, element `i` pairs with element `i`.
    Elementwise,
    /// `{rows, 1}` operand, element `i` pairs with `other[i / cols]`.
    Column,
    /// `{1, cols}` operand, element `i` pairs with `other[i % cols]`.
    Row,
}

impl Broadcast {
    /// Picks the broadcast mode for `lhs op= rhs`. With `flat` set, any two
    /// shapes of equal element count pair up elementwise; otherwise the dims
    /// must match exactly.
    pub fn resolve(
        op: &'static str,
        lhs: &Shape,
        rhs: &Shape,
        flat: bool,
    ) -> Result<Self, TensorError> {
        if lhs == rhs || (flat && lhs.count() == rhs.count()) {
            return Ok(Broadcast::Elementwise);
        }
        if rhs.rows() == lhs.rows() && rhs.cols() == 1 {
            return Ok(Broadcast::Column);
        }
        if rhs.rows() == 1 && rhs.cols() == lhs.cols() {
            return Ok(Broadcast::Row);
        }
        Err(TensorError::IncompatibleShape {
            op,
            lhs: lhs.dims().to_vec(),
            rhs: rhs.dims().to_vec(),
        })
    }

    /// Index into the right operand paired with element `i` of the left one.
    pub fn source_index(&self, i: usize, cols: usize) -> usize {
        match self {
            Broadcast::Elementwise => i,
            Broadcast::Column => i / cols,
            Broadcast::Row => i % cols,
        }
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn code(&self) -> u32 {
        match self {
            Broadcast::Elementwise => 0,
            Broadcast::Column => 1,
            Broadcast::Row => 2,
        }
    }
}

/// Converts a length or index for a kernel or library argument of a narrower
/// integer type.
pub(crate) fn narrow<N: TryFrom<usize>>(op: &'static str, len: usize) -> Result<N, TensorError> {
    N::try_from(len).map_err(|_| TensorError::TooLarge {
        op,
        len,
        target: std::any::type_name::<N>(),
    })
}

/// Reduction picked by `DTensor::mean` from the destination shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeanAxis {
    All,
    /// One mean per column, destination `{1, cols}`.
    Columns,
    /// One mean per row, destination `{rows, 1}`.
    Rows,
}

/// Dimensions of a row-major `C = alpha * op(A) * op(B) + beta * C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmDims<T> {
    pub trans_a: Trans,
    pub trans_b: Trans,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// Stored column count of `A` (its leading dimension).
    pub lda: usize,
    /// Stored column count of `B`.
    pub ldb: usize,
    pub alpha: T,
    pub beta: T,
}
