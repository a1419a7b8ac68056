use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;

/// Batch-first N-D array stored flat in row-major order.
///
/// Dense-style layers see rank 2 (`[batch, features]`), convolutions see
/// rank 4 (`[batch, channels, height, width]`). The first dimension is
/// always the sample index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(NnError::shape("tensor", &shape, &[data.len()]));
        }
        Ok(Tensor { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Tensor {
        let len = shape.iter().product();
        Tensor { shape, data: vec![0.0; len] }
    }

    /// Stacks equally sized rows into a `[rows, cols]` tensor.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Tensor> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(NnError::shape("from_rows", &[rows.len(), cols], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Ok(Tensor { shape: vec![rows.len(), cols], data })
    }

    pub fn from_matrix(m: &Matrix) -> Tensor {
        Tensor { shape: vec![m.rows, m.cols], data: m.to_flat() }
    }

    /// Views a rank-2 tensor as a matrix; every other rank is an error.
    pub fn to_matrix(&self) -> Result<Matrix> {
        match self.shape.as_slice() {
            [rows, cols] => Matrix::from_flat(*rows, *cols, &self.data),
            _ => Err(NnError::shape("to_matrix", &self.shape, &[0, 0])),
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        let per = self.sample_len();
        if per == 0 {
            return vec![Vec::new(); self.batch_size()];
        }
        self.data.chunks(per).map(|c| c.to_vec()).collect()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of scalars per sample (product of every non-batch dimension).
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn sample_shape(&self) -> &[usize] {
        self.shape.get(1..).unwrap_or(&[])
    }

    pub fn reshape(&self, shape: Vec<usize>) -> Result<Tensor> {
        let len: usize = shape.iter().product();
        if len != self.data.len() {
            return Err(NnError::shape("reshape", &self.shape, &shape));
        }
        Ok(Tensor { shape, data: self.data.clone() })
    }

    /// Gathers the samples at `indices` (along the batch dimension).
    pub fn select_rows(&self, indices: &[usize]) -> Result<Tensor> {
        let per = self.sample_len();
        let batch = self.batch_size();
        let mut data = Vec::with_capacity(indices.len() * per);
        for &i in indices {
            if i >= batch {
                return Err(NnError::shape("select_rows", &self.shape, &[i]));
            }
            data.extend_from_slice(&self.data[i * per..(i + 1) * per]);
        }
        let mut shape = self.shape.clone();
        if let Some(first) = shape.first_mut() {
            *first = indices.len();
        }
        Ok(Tensor { shape, data })
    }

    /// Sample `i` as a batch of one.
    pub fn sample(&self, i: usize) -> Result<Tensor> {
        self.select_rows(&[i])
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn zip_with<F>(&self, other: &Tensor, op: &'static str, functor: F) -> Result<Tensor>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.shape != other.shape {
            return Err(NnError::shape(op, &self.shape, &other.shape));
        }
        Ok(Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| functor(a, b)).collect(),
        })
    }

    /// Largest absolute element-wise difference; `None` when shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor) -> Option<f64> {
        if self.shape != other.shape {
            return None;
        }
        Some(self.data.iter().zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_rows_gathers_whole_samples() {
        let t = Tensor::new(vec![3, 2, 2], (0..12).map(|v| v as f64).collect()).unwrap();
        let picked = t.select_rows(&[2, 0]).unwrap();
        assert_eq!(picked.shape, vec![2, 2, 2]);
        assert_eq!(picked.data, vec![8.0, 9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn to_matrix_requires_rank_two() {
        let t = Tensor::zeros(vec![1, 2, 3]);
        assert!(t.to_matrix().is_err());
        let m = Tensor::from_rows(&[vec![1.0, 2.0]]).unwrap().to_matrix().unwrap();
        assert_eq!(m.shape(), [1, 2]);
    }
}
