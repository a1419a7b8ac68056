//! Pluggable matrix arithmetic.
//!
//! A backend only has to override the operations it accelerates; every other
//! operation falls back to the generic row-by-row implementation provided by
//! the trait. Selection walks a priority chain (parallel, blocked, reference)
//! once, when the `Backend` handle is built, and the handle is then passed
//! explicitly to whatever needs it. All backends accumulate dot products in
//! the same order, so switching backend changes latency, never results.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;

/// The matrix operations layers, losses and optimizers rely on.
pub trait NumericBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Matrix product `a × b`.
    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        if a.cols != b.rows {
            return Err(NnError::shape("multiply", &a.shape(), &b.shape()));
        }
        let mut res = Matrix::zeros(a.rows, b.cols);
        for i in 0..a.rows {
            for j in 0..b.cols {
                let mut sum = 0.0;
                for k in 0..a.cols {
                    sum += a.data[i][k] * b.data[k][j];
                }
                res.data[i][j] = sum;
            }
        }
        Ok(res)
    }

    fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        a.zip_with(b, "add", |x, y| x + y)
    }

    fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        a.zip_with(b, "subtract", |x, y| x - y)
    }

    /// Element-wise product.
    fn hadamard(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        a.zip_with(b, "hadamard", |x, y| x * y)
    }

    fn transpose(&self, m: &Matrix) -> Matrix {
        m.transpose()
    }

    fn scalar_multiply(&self, m: &Matrix, scalar: f64) -> Matrix {
        m.map(|x| x * scalar)
    }

    fn clip(&self, m: &Matrix, min: f64, max: f64) -> Matrix {
        m.map(|x| x.max(min).min(max))
    }
}

/// Naive implementation of every operation. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceBackend;

impl NumericBackend for ReferenceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Reference
    }
}

/// Single-threaded, cache-friendlier CPU backend.
///
/// Only `multiply` and `transpose` are specialised; element-wise operations
/// use the trait defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockedBackend;

impl NumericBackend for BlockedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blocked
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        if a.cols != b.rows {
            return Err(NnError::shape("multiply", &a.shape(), &b.shape()));
        }
        // Walk b column-wise through its transpose so both operands are read
        // contiguously.
        let b_t = self.transpose(b);
        let data = a.data.iter()
            .map(|row_a| b_t.data.iter().map(|col_b| dot(row_a, col_b)).collect())
            .collect();
        Ok(Matrix { rows: a.rows, cols: b.cols, data })
    }

    fn transpose(&self, m: &Matrix) -> Matrix {
        let mut data = vec![Vec::with_capacity(m.rows); m.cols];
        for row in &m.data {
            for (j, &v) in row.iter().enumerate() {
                data[j].push(v);
            }
        }
        Matrix { rows: m.cols, cols: m.rows, data }
    }
}

/// Sequential dot product; the summation order is shared by every backend.
fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

/// Multi-threaded CPU backend built on rayon.
#[cfg(feature = "parallel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelBackend;

#[cfg(feature = "parallel")]
impl ParallelBackend {
    fn zip_par<F>(a: &Matrix, b: &Matrix, op: &'static str, f: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        use rayon::prelude::*;

        a.check_same_shape(b, op)?;
        let data = a.data.par_iter().zip(b.data.par_iter())
            .map(|(row_a, row_b)| row_a.iter().zip(row_b.iter()).map(|(&x, &y)| f(x, y)).collect())
            .collect();
        Ok(Matrix { rows: a.rows, cols: a.cols, data })
    }
}

#[cfg(feature = "parallel")]
impl NumericBackend for ParallelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Parallel
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        use rayon::prelude::*;

        if a.cols != b.rows {
            return Err(NnError::shape("multiply", &a.shape(), &b.shape()));
        }
        let b_t = BlockedBackend.transpose(b);
        // One output row per task.
        let data = a.data.par_iter()
            .map(|row_a| b_t.data.iter().map(|col_b| dot(row_a, col_b)).collect())
            .collect();
        Ok(Matrix { rows: a.rows, cols: b.cols, data })
    }

    fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        Self::zip_par(a, b, "add", |x, y| x + y)
    }

    fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        Self::zip_par(a, b, "subtract", |x, y| x - y)
    }

    fn hadamard(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        Self::zip_par(a, b, "hadamard", |x, y| x * y)
    }

    fn scalar_multiply(&self, m: &Matrix, scalar: f64) -> Matrix {
        use rayon::prelude::*;

        let data = m.data.par_iter()
            .map(|row| row.iter().map(|&x| x * scalar).collect())
            .collect();
        Matrix { rows: m.rows, cols: m.cols, data }
    }
}

/// Backend identifiers accepted in configuration.
///
/// `Auto` resolves to the first available backend in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Auto,
    Parallel,
    Blocked,
    Reference,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Parallel => "parallel",
            BackendKind::Blocked => "blocked",
            BackendKind::Reference => "reference",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BackendKind::Auto => "Resolve the fastest available backend",
            BackendKind::Parallel => "Multi-threaded CPU backend (rayon)",
            BackendKind::Blocked => "Single-threaded CPU backend with contiguous products",
            BackendKind::Reference => "Naive reference implementation",
        }
    }
}

impl FromStr for BackendKind {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "parallel" => Ok(BackendKind::Parallel),
            "blocked" => Ok(BackendKind::Blocked),
            "reference" => Ok(BackendKind::Reference),
            other => Err(NnError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of the resolved backend, printed by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub backend: BackendKind,
    pub description: String,
    pub parallel_available: bool,
}

/// Shared handle to the backend chosen for a network.
#[derive(Clone)]
pub struct Backend {
    ops: Arc<dyn NumericBackend>,
}

impl Backend {
    /// Picks the fastest backend that can run on this build and machine.
    pub fn detect() -> Backend {
        if Backend::parallel_available() {
            #[cfg(feature = "parallel")]
            return Backend::from_ops(ParallelBackend);
        }
        Backend::from_ops(BlockedBackend)
    }

    /// Resolves an explicit request; asking for a backend that is not
    /// usable here is a configuration error.
    pub fn select(kind: BackendKind) -> Result<Backend> {
        match kind {
            BackendKind::Auto => Ok(Backend::detect()),
            BackendKind::Reference => Ok(Backend::from_ops(ReferenceBackend)),
            BackendKind::Blocked => Ok(Backend::from_ops(BlockedBackend)),
            BackendKind::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    Ok(Backend::from_ops(ParallelBackend))
                }
                #[cfg(not(feature = "parallel"))]
                {
                    Err(NnError::BackendUnavailable(
                        "parallel backend requires the `parallel` feature".to_string(),
                    ))
                }
            }
        }
    }

    pub fn reference() -> Backend {
        Backend::from_ops(ReferenceBackend)
    }

    pub fn from_ops<B: NumericBackend + 'static>(ops: B) -> Backend {
        Backend { ops: Arc::new(ops) }
    }

    pub fn parallel_available() -> bool {
        #[cfg(feature = "parallel")]
        {
            rayon::current_num_threads() > 1
        }
        #[cfg(not(feature = "parallel"))]
        {
            false
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.ops.kind()
    }

    pub fn info(&self) -> BackendInfo {
        BackendInfo {
            backend: self.kind(),
            description: self.kind().description().to_string(),
            parallel_available: Backend::parallel_available(),
        }
    }

    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.ops.multiply(a, b)
    }

    pub fn add(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.ops.add(a, b)
    }

    pub fn subtract(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.ops.subtract(a, b)
    }

    pub fn hadamard(&self, a: &Matrix, b: &Matrix) -> Result<Matrix> {
        self.ops.hadamard(a, b)
    }

    pub fn transpose(&self, m: &Matrix) -> Matrix {
        self.ops.transpose(m)
    }

    pub fn scalar_multiply(&self, m: &Matrix, scalar: f64) -> Matrix {
        self.ops.scalar_multiply(m, scalar)
    }

    pub fn clip(&self, m: &Matrix, min: f64, max: f64) -> Matrix {
        self.ops.clip(m, min, max)
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::detect()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("kind", &self.kind()).finish()
    }
}
