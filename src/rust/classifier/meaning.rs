use log::warn;
use ndarray::Array1;

use super::utils::{average_vectors, vector_norm};
use crate::embedding::TokenVector;

/// The averaged embedding of a collection of tokens together with its norm.
///
/// A meaning built from an empty collection is *undefined*: it has no vector
/// and a norm of zero. That is an expected state (an exemplar file whose terms
/// are all outside the vocabulary, a text that tokenizes to nothing) and it
/// is never an error.
///
/// # Example
/// ```
/// use ndarray::array;
/// use topicsieve::MeaningVector;
///
/// let a = MeaningVector::from_vectors(&[array![1.0, 0.0], array![1.0, 2.0]]);
/// assert_eq!(a.vector(), Some(&array![1.0, 1.0]));
///
/// let undefined = MeaningVector::from_vectors(&[]);
/// assert_eq!(a.similarity(&undefined), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MeaningVector {
    vector: Option<Array1<f32>>,
    norm: f32,
}

impl MeaningVector {
    /// The meaning of nothing: no vector, zero norm.
    pub fn undefined() -> Self {
        Self {
            vector: None,
            norm: 0.0,
        }
    }

    /// Averages the vectors of the given tokens.
    pub fn build<'a, I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = &'a TokenVector>,
    {
        let vectors: Vec<&Array1<f32>> = tokens.into_iter().map(|t| t.vector()).collect();
        Self::from_refs(vectors)
    }

    /// Averages raw vectors.
    pub fn from_vectors(vectors: &[Array1<f32>]) -> Self {
        Self::from_refs(vectors.iter().collect())
    }

    fn from_refs(mut vectors: Vec<&Array1<f32>>) -> Self {
        let Some(first) = vectors.first() else {
            return Self::undefined();
        };

        let dimensions = first.len();
        let before = vectors.len();
        vectors.retain(|v| v.len() == dimensions);
        if vectors.len() != before {
            warn!(
                "Ignoring {} vectors whose dimension differs from {}",
                before - vectors.len(),
                dimensions
            );
        }

        let mean = average_vectors(&vectors);
        let norm = vector_norm(&mean);
        Self {
            vector: Some(mean),
            norm,
        }
    }

    pub fn vector(&self) -> Option<&Array1<f32>> {
        self.vector.as_ref()
    }

    pub fn norm(&self) -> f32 {
        self.norm
    }

    /// `true` when this meaning can take part in a similarity comparison.
    pub fn is_comparable(&self) -> bool {
        self.vector.is_some() && self.norm > 0.0
    }

    /// Cosine similarity with another meaning.
    ///
    /// Returns `None` ("not comparable") when either side is undefined, has a
    /// zero norm, or the two vectors differ in dimension. A `Some` value is
    /// always a genuine cosine in `[-1, 1]` (up to rounding).
    pub fn similarity(&self, other: &MeaningVector) -> Option<f32> {
        if !self.is_comparable() || !other.is_comparable() {
            return None;
        }
        let (a, b) = (self.vector.as_ref()?, other.vector.as_ref()?);
        if a.len() != b.len() {
            warn!("Cannot compare meanings of dimension {} and {}", a.len(), b.len());
            return None;
        }
        Some(a.dot(b) / (self.norm * other.norm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn token(vector: Array1<f32>) -> TokenVector {
        TokenVector::new("t", vector, -1.0)
    }

    #[test]
    fn test_empty_collection_is_undefined() {
        let meaning = MeaningVector::build(&Vec::<TokenVector>::new());
        assert_eq!(meaning, MeaningVector::undefined());
        assert_eq!(meaning.norm(), 0.0);
        assert!(meaning.vector().is_none());

        let other = MeaningVector::from_vectors(&[array![1.0, 0.0]]);
        assert_eq!(meaning.similarity(&other), None);
        assert_eq!(other.similarity(&meaning), None);
        assert_eq!(meaning.similarity(&meaning), None);
    }

    #[test]
    fn test_mean_and_norm() {
        let tokens = vec![token(array![3.0, 0.0]), token(array![3.0, 8.0])];
        let meaning = MeaningVector::build(&tokens);
        assert_eq!(meaning.vector(), Some(&array![3.0, 4.0]));
        assert!((meaning.norm() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_norm_is_nonnegative() {
        let sets: [Vec<Array1<f32>>; 3] = [
            vec![array![-1.0, -2.0, -3.0]],
            vec![array![0.5, -0.5, 0.0], array![-4.0, 1.0, 2.0]],
            vec![array![0.0, 0.0, 0.0]],
        ];
        for vectors in &sets {
            assert!(MeaningVector::from_vectors(vectors).norm() >= 0.0);
        }
    }

    #[test]
    fn test_zero_mean_is_not_comparable() {
        let zero = MeaningVector::from_vectors(&[array![1.0, -1.0], array![-1.0, 1.0]]);
        assert!(zero.vector().is_some());
        assert_eq!(zero.norm(), 0.0);
        let other = MeaningVector::from_vectors(&[array![1.0, 0.0]]);
        assert_eq!(zero.similarity(&other), None);
    }

    #[test]
    fn test_similarity_is_cosine() {
        let a = MeaningVector::from_vectors(&[array![1.0, 0.0]]);
        let b = MeaningVector::from_vectors(&[array![0.0, 2.0]]);
        let c = MeaningVector::from_vectors(&[array![5.0, 0.0]]);
        let d = MeaningVector::from_vectors(&[array![-1.0, 0.0]]);

        assert!(a.similarity(&b).unwrap().abs() < 1e-6);
        assert!((a.similarity(&c).unwrap() - 1.0).abs() < 1e-6);
        // A genuine -1 is distinguishable from "not comparable".
        assert!((a.similarity(&d).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = MeaningVector::from_vectors(&[array![0.3, -1.2, 2.5], array![1.0, 0.1, -0.4]]);
        let b = MeaningVector::from_vectors(&[array![-0.7, 0.9, 0.2]]);
        let ab = a.similarity(&b).unwrap();
        let ba = b.similarity(&a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_is_not_comparable() {
        let a = MeaningVector::from_vectors(&[array![1.0, 0.0]]);
        let b = MeaningVector::from_vectors(&[array![1.0, 0.0, 0.0]]);
        assert_eq!(a.similarity(&b), None);
    }

    #[test]
    fn test_mismatched_vectors_are_ignored_when_averaging() {
        let meaning = MeaningVector::from_vectors(&[array![2.0, 0.0], array![1.0, 1.0, 1.0]]);
        assert_eq!(meaning.vector(), Some(&array![2.0, 0.0]));
    }
}
