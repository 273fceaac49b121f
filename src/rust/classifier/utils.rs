use ndarray::Array1;

pub(crate) fn vector_norm(vec: &Array1<f32>) -> f32 {
    vec.iter().map(|&x| x * x).sum::<f32>().sqrt()
}

/// Component-wise mean. Callers guarantee `vectors` is non-empty and uniform in length.
pub(crate) fn average_vectors(vectors: &[&Array1<f32>]) -> Array1<f32> {
    let sum = vectors
        .iter()
        .fold(Array1::<f32>::zeros(vectors[0].len()), |acc, v| acc + *v);
    sum / vectors.len() as f32
}
