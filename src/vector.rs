//! Fixed-dimension real-vector arithmetic (C1).
//!
//! Used by the HNSW index, the inference engine's similarity augmentation,
//! and the attractor model's influence field. All operations fail with
//! [`VectorError::DimensionMismatch`] when operand lengths differ; `cosine`
//! returns `0.0` rather than `NaN` when either operand has zero norm.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VectorError {
    #[error("dimension mismatch: {a} vs {b}")]
    DimensionMismatch { a: usize, b: usize },
    #[error("cannot compute centroid of an empty set of vectors")]
    EmptyInput,
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            a: a.len(),
            b: b.len(),
        });
    }
    Ok(())
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// L2 norm of a vector.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0`, not `NaN`, when either
/// vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dims(a, b)?;
    let na = norm(a);
    let nb = norm(b);
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    let d: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok(d / (na * nb))
}

/// Euclidean (L2) distance between two equal-length vectors.
pub fn euclidean(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_dims(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt())
}

/// Cosine distance, `1 - cosine(a, b)`, as used by the HNSW index's metric.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    Ok(1.0 - cosine(a, b)?)
}

/// Return a unit-norm copy of `v`. Zero vectors are returned unchanged
/// (there is no meaningful direction to normalize to).
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / n).collect()
}

/// Element-wise mean of a non-empty set of equal-length vectors.
pub fn centroid(vs: &[Vec<f32>]) -> Result<Vec<f32>, VectorError> {
    let first = vs.first().ok_or(VectorError::EmptyInput)?;
    let dim = first.len();
    let mut acc = vec![0f32; dim];
    for v in vs {
        check_dims(v, first)?;
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += x;
        }
    }
    let n = vs.len() as f32;
    for a in acc.iter_mut() {
        *a /= n;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_is_one() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine(&a, &a).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_is_zero_not_nan() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        let c = cosine(&a, &b).unwrap();
        assert_eq!(c, 0.0);
        assert!(!c.is_nan());
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(
            cosine(&a, &b),
            Err(VectorError::DimensionMismatch { a: 2, b: 3 })
        );
    }

    #[test]
    fn normalize_unit_norm() {
        let v = vec![3.0, 4.0];
        let n = normalize(&v);
        assert!((norm(&n) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn centroid_of_two_vectors() {
        let vs = vec![vec![0.0, 0.0], vec![2.0, 4.0]];
        let c = centroid(&vs).unwrap();
        assert_eq!(c, vec![1.0, 2.0]);
    }
}
