use crate::search::SearchHit;

/// Keeps hits whose raw similarity is at or above the cutoff. Higher score
/// means more relevant (cosine on normalized vectors); input order is
/// preserved. The threshold is a per-call value, resolved from the request
/// override or the configured default, so concurrent requests cannot race
/// on shared state.
pub fn filter(hits: Vec<SearchHit>, threshold: f32) -> Vec<SearchHit> {
	hits.into_iter().filter(|hit| hit.score >= threshold).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(score: f32) -> SearchHit {
		SearchHit {
			id: uuid::Uuid::new_v4(),
			score,
			metadata: Default::default(),
			ranking: None,
		}
	}

	#[test]
	fn keeps_scores_at_or_above_threshold() {
		let hits = vec![hit(0.9), hit(0.5), hit(0.49), hit(0.7)];
		let kept = filter(hits, 0.5);

		assert_eq!(kept.len(), 3);
		assert!(kept.iter().all(|hit| hit.score >= 0.5));
	}

	#[test]
	fn preserves_input_order() {
		let hits = vec![hit(0.3), hit(0.9), hit(0.6)];
		let kept = filter(hits, 0.2);
		let scores: Vec<f32> = kept.iter().map(|hit| hit.score).collect();

		assert_eq!(scores, vec![0.3, 0.9, 0.6]);
	}

	#[test]
	fn empty_input_yields_empty_output() {
		assert!(filter(Vec::new(), 0.0).is_empty());
	}
}
