use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::TensorError;

/// Dimensions of a dense, row-major tensor.
///
/// A shape always has at least one dimension and every dimension is
/// positive. The element count is checked for overflow on construction, so
/// `count()` never wraps.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape {
    dims: Vec<usize>,
    count: usize,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Result<Self, TensorError> {
        if dims.is_empty() {
            return Err(TensorError::EmptyShape);
        }
        if dims.iter().any(|&dim: &usize| dim == 0) {
            return Err(TensorError::InvalidShape {
                dims: dims.to_vec(),
            });
        }
        let count: usize = dims
            .iter()
            .try_fold(1usize, |acc: usize, &dim: &usize| acc.checked_mul(dim))
            .ok_or_else(|| TensorError::ShapeOverflow {
                dims: dims.to_vec(),
            })?;
        Ok(Self {
            dims: dims.to_vec(),
            count,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dimensions.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Leading dimension of the matrix view.
    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    /// Product of the trailing dimensions. A rank-1 shape `{n}` is viewed
    /// as an `n x 1` column.
    pub fn cols(&self) -> usize {
        self.count / self.dims[0]
    }
}

impl TryFrom<Vec<usize>> for Shape {
    type Error = TensorError;

    fn try_from(dims: Vec<usize>) -> Result<Self, Self::Error> {
        Shape::new(&dims)
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.dims
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_is_product() {
        let shape: Shape = Shape::new(&[2, 3, 4]).unwrap();
        assert_eq!(shape.count(), 24);
        assert_eq!(shape.rank(), 3);
    }

    #[test]
    fn test_matrix_view() {
        let shape: Shape = Shape::new(&[10, 4, 5]).unwrap();
        assert_eq!(shape.rows(), 10);
        assert_eq!(shape.cols(), 20);

        let vector: Shape = Shape::new(&[7]).unwrap();
        assert_eq!(vector.rows(), 7);
        assert_eq!(vector.cols(), 1);
    }

    #[test]
    fn test_rejects_empty_and_zero() {
        assert!(matches!(Shape::new(&[]), Err(TensorError::EmptyShape)));
        assert!(matches!(
            Shape::new(&[3, 0]),
            Err(TensorError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_rejects_overflow() {
        let result = Shape::new(&[usize::MAX, 2]);
        assert!(matches!(result, Err(TensorError::ShapeOverflow { .. })));
    }

    #[test]
    fn test_equality() {
        assert_eq!(Shape::new(&[2, 3]).unwrap(), Shape::new(&[2, 3]).unwrap());
        assert_ne!(Shape::new(&[2, 3]).unwrap(), Shape::new(&[3, 2]).unwrap());
        assert_ne!(Shape::new(&[6]).unwrap(), Shape::new(&[6, 1]).unwrap());
    }

    #[test]
    fn test_serde_validates_dims() {
        let shape: Shape = serde_json::from_str("[4, 5]").unwrap();
        assert_eq!(shape.count(), 20);
        assert_eq!(serde_json::to_string(&shape).unwrap(), "[4,5]");
        assert!(serde_json::from_str::<Shape>("[4, 0]").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(&[5, 3]).unwrap().to_string(), "{5, 3}");
    }
}
