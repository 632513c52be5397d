use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub chunk_size: u32,
	pub chunk_overlap: u32,
}

#[derive(Clone, Debug)]
pub struct Chunk {
	pub table: String,
	pub row_id: i64,
	pub chunk_index: i32,
	pub chunk_count: i32,
	pub text: String,
}

/// Renders a source row as `"key: value | key: value"` over its non-null
/// fields, in field order.
pub fn flatten_row(fields: &[(String, Value)]) -> String {
	let mut parts = Vec::with_capacity(fields.len());

	for (name, value) in fields {
		let rendered = match value {
			Value::Null => continue,
			Value::String(text) => text.clone(),
			other => other.to_string(),
		};

		parts.push(format!("{name}: {rendered}"));
	}

	parts.join(" | ")
}

/// Splits text into fixed-size windows with overlap, cut on grapheme
/// boundaries. Text at or under `chunk_size` graphemes stays whole.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
	let graphemes: Vec<&str> = text.graphemes(true).collect();
	let size = cfg.chunk_size.max(1) as usize;

	if graphemes.len() <= size {
		if text.is_empty() {
			return Vec::new();
		}

		return vec![text.to_string()];
	}

	let overlap = (cfg.chunk_overlap as usize).min(size - 1);
	let stride = size - overlap;
	let mut chunks = Vec::new();
	let mut start = 0_usize;

	while start < graphemes.len() {
		let end = (start + size).min(graphemes.len());
		let chunk: String = graphemes[start..end].concat();

		if !chunk.is_empty() {
			chunks.push(chunk);
		}

		start += stride;
	}

	chunks
}

pub fn chunk_row(table: &str, row_id: i64, text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
	let pieces = split_text(text, cfg);
	let chunk_count = pieces.len() as i32;

	pieces
		.into_iter()
		.enumerate()
		.map(|(idx, piece)| Chunk {
			table: table.to_string(),
			row_id,
			chunk_index: idx as i32,
			chunk_count,
			text: piece,
		})
		.collect()
}
