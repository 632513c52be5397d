use std::cmp::Ordering;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::search::{RankingBreakdown, SearchHit};
use recall_storage::models::DocMeta;

const HIGH_PRIORITY_TABLES: [&str; 3] = ["schedule", "habit", "chat_history"];
const MEDIUM_PRIORITY_TABLES: [&str; 3] = ["user", "transaction", "diet"];

const SCHEDULE_KEYWORDS: [&str; 4] = ["일정", "스케줄", "schedule", "약속"];
const HABIT_KEYWORDS: [&str; 4] = ["습관", "루틴", "habit", "매일"];

const RECENCY_HORIZON_DAYS: f32 = 30.0;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct RankingCriteria {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recency: Option<RecencyCriterion>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_priority: Option<SourcePriorityCriterion>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_relevance: Option<UserRelevanceCriterion>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RecencyCriterion {
	pub weight: f32,
	#[serde(default)]
	pub date_field: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SourcePriorityCriterion {
	pub weight: f32,
	pub ordered_sources: Vec<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct UserRelevanceCriterion {
	pub weight: f32,
	pub user_id: i64,
}

impl RankingCriteria {
	pub fn is_empty(&self) -> bool {
		self.recency.is_none() && self.source_priority.is_none() && self.user_relevance.is_none()
	}
}

/// Multi-signal re-scoring over raw similarity hits. The raw `score` set by
/// the vector index is never overwritten; fusion attaches a breakdown and
/// orders by it.
pub struct RankFusion {
	relevance_weight: f32,
	metadata_weight: f32,
	keyword_boost: f32,
}

impl RankFusion {
	pub fn new(cfg: &recall_config::Ranking) -> Self {
		Self {
			relevance_weight: cfg.relevance_weight,
			metadata_weight: cfg.metadata_weight,
			keyword_boost: cfg.keyword_boost,
		}
	}

	/// Base fusion: relevance plus two metadata terms. The weights do not
	/// sum to one; metadata contributes at most `2 * metadata_weight`.
	pub fn rank(&self, mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
		if hits.is_empty() {
			return hits;
		}

		for hit in &mut hits {
			let table_score = table_priority_score(&hit.metadata.table);
			let source_score = source_association_score(&hit.metadata);
			let ranking_score = self.relevance_weight * hit.score
				+ self.metadata_weight * table_score
				+ self.metadata_weight * source_score;

			hit.ranking = Some(RankingBreakdown {
				ranking_score,
				original_score: hit.score,
				table_score,
				source_score,
				recency_score: None,
				source_priority_score: None,
				user_score: None,
			});
		}

		sort_by_ranking(&mut hits);

		hits
	}

	/// Base fusion plus keyword-triggered boosts scanned from the raw query
	/// text. Both trigger categories may fire in one pass.
	pub fn rerank(&self, hits: Vec<SearchHit>, query: &str) -> Vec<SearchHit> {
		let mut hits = self.rank(hits);
		let query_lower = query.to_lowercase();
		let boost_schedule =
			SCHEDULE_KEYWORDS.iter().any(|keyword| query_lower.contains(keyword));
		let boost_habit = HABIT_KEYWORDS.iter().any(|keyword| query_lower.contains(keyword));

		if !boost_schedule && !boost_habit {
			return hits;
		}

		for hit in &mut hits {
			let table = hit.metadata.table.to_lowercase();
			let boosted = (boost_schedule && table == "schedule")
				|| (boost_habit && table == "habit");

			if boosted && let Some(ranking) = hit.ranking.as_mut() {
				ranking.ranking_score *= self.keyword_boost;
			}
		}

		sort_by_ranking(&mut hits);

		hits
	}
}

/// Request-scoped criteria re-scoring layered over an already ranked list.
/// Each criterion blends `(1 - w) * prior + w * component` and re-sorts.
pub fn apply_criteria(
	mut hits: Vec<SearchHit>,
	criteria: &RankingCriteria,
	now: OffsetDateTime,
) -> Vec<SearchHit> {
	if hits.is_empty() || criteria.is_empty() {
		return hits;
	}

	if let Some(recency) = &criteria.recency {
		let field = recency.date_field.as_deref().unwrap_or("created_at");

		for hit in &mut hits {
			let component = recency_score(&hit.metadata, field, now);

			blend(hit, recency.weight, component, |breakdown, value| {
				breakdown.recency_score = Some(value);
			});
		}

		sort_by_ranking(&mut hits);
	}
	if let Some(priority) = &criteria.source_priority {
		for hit in &mut hits {
			let component = source_priority_score(&hit.metadata.table, &priority.ordered_sources);

			blend(hit, priority.weight, component, |breakdown, value| {
				breakdown.source_priority_score = Some(value);
			});
		}

		sort_by_ranking(&mut hits);
	}
	if let Some(relevance) = &criteria.user_relevance {
		for hit in &mut hits {
			let component =
				if hit.metadata.user_id == Some(relevance.user_id) { 1.0 } else { 0.2 };

			blend(hit, relevance.weight, component, |breakdown, value| {
				breakdown.user_score = Some(value);
			});
		}

		sort_by_ranking(&mut hits);
	}

	hits
}

fn blend(
	hit: &mut SearchHit,
	weight: f32,
	component: f32,
	record: impl FnOnce(&mut RankingBreakdown, f32),
) {
	let score = hit.score;
	let prior = hit.ranking.as_ref().map(|ranking| ranking.ranking_score).unwrap_or(score);
	let blended = prior * (1.0 - weight) + component * weight;
	let breakdown = hit.ranking.get_or_insert_with(|| RankingBreakdown {
		ranking_score: score,
		original_score: score,
		table_score: 0.0,
		source_score: 0.0,
		recency_score: None,
		source_priority_score: None,
		user_score: None,
	});

	breakdown.ranking_score = blended;

	record(breakdown, component);
}

fn table_priority_score(table: &str) -> f32 {
	let lowered = table.to_lowercase();

	if HIGH_PRIORITY_TABLES.contains(&lowered.as_str()) {
		1.0
	} else if MEDIUM_PRIORITY_TABLES.contains(&lowered.as_str()) {
		0.7
	} else {
		0.5
	}
}

fn source_association_score(meta: &DocMeta) -> f32 {
	if meta.user_id.is_some() || meta.extra.contains_key("user_id") { 0.8 } else { 0.5 }
}

fn recency_score(meta: &DocMeta, field: &str, now: OffsetDateTime) -> f32 {
	let raw = if field == "created_at" {
		meta.created_at.as_deref()
	} else {
		meta.extra.get(field).and_then(|value| value.as_str())
	};
	let Some(raw) = raw else {
		return 0.0;
	};
	let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) else {
		return 0.0;
	};
	let age_days = (now - ts).whole_days() as f32;

	if age_days <= 0.0 {
		1.0
	} else if age_days <= RECENCY_HORIZON_DAYS {
		1.0 - age_days / RECENCY_HORIZON_DAYS
	} else {
		0.0
	}
}

fn source_priority_score(table: &str, ordered_sources: &[String]) -> f32 {
	if ordered_sources.is_empty() {
		return 0.0;
	}

	ordered_sources
		.iter()
		.position(|source| source.eq_ignore_ascii_case(table))
		.map(|idx| 1.0 - idx as f32 / ordered_sources.len() as f32)
		.unwrap_or(0.0)
}

fn sort_by_ranking(hits: &mut [SearchHit]) {
	// A stable sort keeps ties in input order, which makes re-ranking
	// deterministic.
	hits.sort_by(|left, right| {
		cmp_f32_desc(
			left.ranking.as_ref().map(|r| r.ranking_score).unwrap_or(left.score),
			right.ranking.as_ref().map(|r| r.ranking_score).unwrap_or(right.score),
		)
	});
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
