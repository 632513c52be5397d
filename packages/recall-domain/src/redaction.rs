pub const MASK: &str = "[filtered]";

#[derive(Clone, Debug)]
pub struct RedactionOutcome {
	pub text: String,
	pub filtered: bool,
}

/// Masks every occurrence of the configured keywords.
pub fn redact(text: &str, keywords: &[String]) -> RedactionOutcome {
	let mut out = text.to_string();
	let mut filtered = false;

	for keyword in keywords {
		if keyword.is_empty() || !out.contains(keyword.as_str()) {
			continue;
		}

		out = out.replace(keyword.as_str(), MASK);
		filtered = true;
	}

	RedactionOutcome { text: out, filtered }
}
