use std::fmt::Write as _;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
	#[default]
	Default,
	Simple,
	Detailed,
	Markdown,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceRef {
	pub table: String,
	pub relevance: f32,
}

impl OutputFormat {
	pub fn parse(value: &str) -> Self {
		match value.trim().to_ascii_lowercase().as_str() {
			"simple" => Self::Simple,
			"detailed" => Self::Detailed,
			"markdown" => Self::Markdown,
			_ => Self::Default,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Default => "default",
			Self::Simple => "simple",
			Self::Detailed => "detailed",
			Self::Markdown => "markdown",
		}
	}
}

pub fn format_answer(text: &str, sources: &[SourceRef], format: OutputFormat) -> String {
	match format {
		OutputFormat::Simple => text.to_string(),
		OutputFormat::Default => format_default(text, sources),
		OutputFormat::Detailed => format_detailed(text, sources),
		OutputFormat::Markdown => format_markdown(text, sources),
	}
}

fn format_default(text: &str, sources: &[SourceRef]) -> String {
	if sources.is_empty() {
		return text.to_string();
	}

	let tables: Vec<&str> = sources.iter().map(|source| source.table.as_str()).collect();

	format!("{text}\n\nSources: {}", tables.join(", "))
}

fn format_detailed(text: &str, sources: &[SourceRef]) -> String {
	if sources.is_empty() {
		return text.to_string();
	}

	let mut out = format!("{text}\n\nSources:\n");

	for (idx, source) in sources.iter().enumerate() {
		let _ = writeln!(out, "{}. {} (relevance: {:.2})", idx + 1, source.table, source.relevance);
	}

	out.trim_end().to_string()
}

fn format_markdown(text: &str, sources: &[SourceRef]) -> String {
	let mut out = match text.split_once('\n') {
		Some((first, rest)) if !first.trim_start().starts_with('#') => {
			format!("## {first}\n{rest}")
		},
		None if !text.trim_start().starts_with('#') && !text.is_empty() => format!("## {text}"),
		_ => text.to_string(),
	};

	if !sources.is_empty() {
		out.push_str("\n\n**Sources:**\n");

		for source in sources {
			let _ = writeln!(out, "- {}", source.table);
		}

		out = out.trim_end().to_string();
	}

	out
}
