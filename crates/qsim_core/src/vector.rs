//! Vector math shared by matching and clustering.

use crate::error::{QsimError, Result};

/// Dot product accumulated in `f64`.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// L2 magnitude.
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt() as f32
}

/// Scales `v` to unit length in place. Zero and non-finite vectors are left
/// untouched.
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 && n.is_finite() {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

/// Cosine similarity in [-1, 1]; 0 when either side has zero magnitude or
/// the lengths differ. Sums run in `f64` so large components cannot overflow.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (f64::from(*x), f64::from(*y)))
        .fold((0.0f64, 0.0f64, 0.0f64), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    cosine_from_parts(dot, na.sqrt(), nb.sqrt())
}

/// Non-finite inputs (infinite or NaN components) score 0.
fn cosine_from_parts(dot: f64, na: f64, nb: f64) -> f32 {
    let score = dot / (na * nb);
    if na == 0.0 || nb == 0.0 || !score.is_finite() {
        0.0
    } else {
        score.clamp(-1.0, 1.0) as f32
    }
}

/// Returns the shared dimension, or `DimensionMismatch` for the first vector
/// whose length differs from the first one.
pub fn ensure_uniform_dimension<V: AsRef<[f32]>>(vectors: &[V]) -> Result<usize> {
    let Some(first) = vectors.first() else {
        return Ok(0);
    };
    let expected = first.as_ref().len();

    match vectors
        .iter()
        .map(|v| v.as_ref().len())
        .find(|len| *len != expected)
    {
        Some(found) => Err(QsimError::DimensionMismatch { expected, found }),
        None => Ok(expected),
    }
}

/// Dense symmetric matrix of pairwise cosine similarities.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    scores: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self> {
        ensure_uniform_dimension(vectors)?;

        let size = vectors.len();
        let norms: Vec<f64> = vectors
            .iter()
            .map(|v| dot(v.as_ref(), v.as_ref()).sqrt())
            .collect();
        let mut scores = vec![0.0f32; size * size];

        for i in 0..size {
            scores[i * size + i] = if norms[i] > 0.0 { 1.0 } else { 0.0 };
            for j in (i + 1)..size {
                let score = cosine_from_parts(
                    dot(vectors[i].as_ref(), vectors[j].as_ref()),
                    norms[i],
                    norms[j],
                );
                scores[i * size + j] = score;
                scores[j * size + i] = score;
            }
        }

        Ok(Self { size, scores })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.scores[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.scores[i * self.size..(i + 1) * self.size]
    }

    /// Pairs `(i, j)` with `i < j` whose similarity is at least `threshold`.
    pub fn edges_at_least(&self, threshold: f32) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.size).flat_map(move |i| {
            ((i + 1)..self.size)
                .filter(move |&j| self.get(i, j) >= threshold)
                .map(move |j| (i, j))
        })
    }
}
