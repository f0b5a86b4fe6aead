//! Cosine-similarity ranking of candidate notes against a query vector.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Vector dimension mismatch: expected {expected}, got {actual}.")]
pub struct DimensionMismatch {
	pub expected: usize,
	pub actual: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
	pub item: T,
	pub score: f32,
}

/// Cosine similarity of two equal-length vectors.
///
/// A zero-magnitude side has no direction, so the similarity resolves to `0.0` instead of NaN.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Result<f32, DimensionMismatch> {
	if lhs.len() != rhs.len() {
		return Err(DimensionMismatch { expected: lhs.len(), actual: rhs.len() });
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm == 0.0 || rhs_norm == 0.0 {
		return Ok(0.0);
	}

	let similarity = dot / (lhs_norm.sqrt() * rhs_norm.sqrt());

	if !similarity.is_finite() {
		return Ok(0.0);
	}

	Ok(similarity.clamp(-1.0, 1.0))
}

/// Score of one candidate. Missing vectors and mismatched dimensions score `0.0`.
pub fn score(query: &[f32], candidate: Option<&[f32]>) -> f32 {
	let Some(candidate) = candidate else { return 0.0 };

	cosine_similarity(query, candidate).unwrap_or(0.0)
}

/// Returns at most `k` candidates whose score is strictly above `threshold`, best first.
///
/// Equal scores keep the order in which the candidates were supplied.
pub fn rank<T>(
	query: &[f32],
	candidates: Vec<(T, Option<Vec<f32>>)>,
	k: usize,
	threshold: f32,
) -> Vec<Ranked<T>> {
	if k == 0 {
		return Vec::new();
	}

	let mut scored: Vec<Ranked<T>> = candidates
		.into_iter()
		.map(|(item, vector)| {
			let score = score(query, vector.as_deref());

			Ranked { item, score }
		})
		.filter(|ranked| ranked.score > threshold)
		.collect();

	// `sort_by` is stable.
	scored.sort_by(|a, b| b.score.total_cmp(&a.score));
	scored.truncate(k);

	scored
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_vector_scores_zero() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Ok(0.0));
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), Ok(0.0));
	}

	#[test]
	fn empty_vectors_score_zero() {
		assert_eq!(cosine_similarity(&[], &[]), Ok(0.0));
	}

	#[test]
	fn mismatched_lengths_fail() {
		assert_eq!(
			cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
			Err(DimensionMismatch { expected: 2, actual: 3 })
		);
	}

	#[test]
	fn orthogonal_and_opposite_vectors() {
		let orthogonal = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("same length");
		let opposite = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).expect("same length");

		assert!(orthogonal.abs() <= 1e-6);
		assert!((opposite + 1.0).abs() <= 1e-6);
	}

	#[test]
	fn non_finite_components_score_zero() {
		assert_eq!(score(&[f32::NAN, 1.0], Some(&[1.0, 1.0])), 0.0);
	}
}
