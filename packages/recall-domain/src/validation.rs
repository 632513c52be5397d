use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

#[derive(Clone, Copy, Debug)]
pub struct ValidationConfig {
	pub min_chars: u32,
	pub max_chars: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
	TooShort,
	TooLong,
	Incomplete,
	UngroundedNumber { token: String },
	Contradiction { pattern: String },
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ValidationReport {
	pub is_valid: bool,
	pub issues: Vec<ValidationIssue>,
}

fn number_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	PATTERN.get_or_init(|| Regex::new(r"\d+").expect("static pattern"))
}

fn terminal_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	PATTERN.get_or_init(|| Regex::new(r"[.!?]\s*$").expect("static pattern"))
}

fn contradiction_patterns() -> &'static [(Regex, &'static str)] {
	static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

	PATTERNS.get_or_init(|| {
		[
			(r"맞습니다[\s\S]*아닙니다", "affirmation followed by denial"),
			(r"아닙니다[\s\S]*맞습니다", "denial followed by affirmation"),
			(r"없습니다[\s\S]*있습니다", "absence followed by presence"),
			(r"있습니다[\s\S]*없습니다", "presence followed by absence"),
		]
		.into_iter()
		.map(|(pattern, label)| (Regex::new(pattern).expect("static pattern"), label))
		.collect()
	})
}

/// Checks a generated answer against the retrieved context. Issues are
/// reported, never raised; an invalid answer is still an answer.
pub fn validate(response: &str, context_texts: &[String], cfg: ValidationConfig) -> ValidationReport {
	let mut issues = Vec::new();
	let char_count = response.chars().count() as u32;

	if char_count < cfg.min_chars {
		issues.push(ValidationIssue::TooShort);
	}
	if char_count > cfg.max_chars {
		issues.push(ValidationIssue::TooLong);
	}
	if !is_complete(response) {
		issues.push(ValidationIssue::Incomplete);
	}

	issues.extend(ungrounded_numbers(response, context_texts));

	for (pattern, label) in contradiction_patterns() {
		if pattern.is_match(response) {
			issues.push(ValidationIssue::Contradiction { pattern: (*label).to_string() });
		}
	}

	ValidationReport { is_valid: issues.is_empty(), issues }
}

/// The single bounded retry fires only for issues beyond truncation: an
/// answer that is merely short or cut off is kept as-is.
pub fn warrants_retry(issues: &[ValidationIssue]) -> bool {
	if issues.is_empty() {
		return false;
	}

	issues.iter().any(|issue| {
		!matches!(issue, ValidationIssue::TooShort | ValidationIssue::Incomplete)
	})
}

fn is_complete(response: &str) -> bool {
	let trimmed = response.trim_end();

	if trimmed.is_empty() {
		return false;
	}
	if trimmed.ends_with("...") || trimmed.ends_with('…') {
		return false;
	}

	terminal_pattern().is_match(trimmed)
}

fn ungrounded_numbers(response: &str, context_texts: &[String]) -> Vec<ValidationIssue> {
	let mut grounded: HashSet<&str> = HashSet::new();

	for text in context_texts {
		for hit in number_pattern().find_iter(text) {
			grounded.insert(hit.as_str());
		}
	}

	let mut seen = HashSet::new();
	let mut issues = Vec::new();

	for hit in number_pattern().find_iter(response) {
		let token = hit.as_str();

		// Short numerals (dates, counts) are too ambiguous to flag.
		if token.len() < 4 {
			continue;
		}
		if grounded.contains(token) || !seen.insert(token) {
			continue;
		}

		issues.push(ValidationIssue::UngroundedNumber { token: token.to_string() });
	}

	issues
}
