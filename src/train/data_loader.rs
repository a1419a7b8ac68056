use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{NnError, Result};
use crate::math::tensor::Tensor;

/// Splits a dataset into `(inputs, targets)` mini-batches.
///
/// [`DataLoader::batches`] hands out a finite iterator that is consumed
/// once; a new epoch asks for a new iterator, optionally after calling
/// [`DataLoader::shuffle`]. The last batch may be shorter than
/// `batch_size`.
#[derive(Debug, Clone)]
pub struct DataLoader {
    inputs: Tensor,
    targets: Tensor,
    batch_size: usize,
    shuffle: bool,
    indices: Vec<usize>,
}

impl DataLoader {
    pub fn new(inputs: Tensor, targets: Tensor, batch_size: usize, shuffle: bool) -> Result<DataLoader> {
        if batch_size == 0 {
            return Err(NnError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if inputs.batch_size() != targets.batch_size() {
            return Err(NnError::InvalidConfig(format!(
                "{} input samples but {} targets",
                inputs.batch_size(),
                targets.batch_size()
            )));
        }
        let indices = (0..inputs.batch_size()).collect();
        Ok(DataLoader { inputs, targets, batch_size, shuffle, indices })
    }

    /// Convenience constructor for row-per-sample data.
    pub fn from_rows(inputs: &[Vec<f64>], targets: &[Vec<f64>], batch_size: usize, shuffle: bool) -> Result<DataLoader> {
        DataLoader::new(Tensor::from_rows(inputs)?, Tensor::from_rows(targets)?, batch_size, shuffle)
    }

    /// Reorders the samples for the next `batches()` call. No-op when the
    /// loader was built with `shuffle = false`.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.shuffle {
            self.indices.shuffle(rng);
        }
    }

    pub fn batches(&self) -> Batches<'_> {
        Batches { loader: self, cursor: 0 }
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.indices.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// One pass over a [`DataLoader`].
pub struct Batches<'a> {
    loader: &'a DataLoader,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = &self.loader.indices;
        if self.cursor >= indices.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(indices.len());
        let picked = &indices[self.cursor..end];
        self.cursor = end;

        let batch = self.loader.inputs.select_rows(picked)
            .and_then(|x| Ok((x, self.loader.targets.select_rows(picked)?)));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.loader.indices.len().saturating_sub(self.cursor).div_ceil(self.loader.batch_size);
        (left, Some(left))
    }
}
