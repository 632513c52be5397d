use crate::{
	chat::{Role, SessionTurn},
	search::{SearchHit, ranking::cmp_f32_desc},
};

/// Builds the generation prompt. Context items are sorted by relevance
/// descending and labelled with their source table; when the session has
/// history, the last turns are included oldest-first.
pub fn build(
	query: &str,
	context: &[SearchHit],
	history: &[SessionTurn],
	max_history_turns: u32,
) -> String {
	let context_block = render_context(context);

	if history.is_empty() {
		return format!(
			"You are the assistant for a personal management platform. Answer the \
			user's question accurately and helpfully.\n\
			The following information was retrieved from the user's database:\n\n\
			---\n{context_block}\n---\n\n\
			Answer the question below using the information above.\n\
			Question: {query}\n\nAnswer:"
		);
	}

	let history_block = render_history(history, max_history_turns);

	format!(
		"You are the assistant for a personal management platform. Answer the \
		user's question accurately and helpfully.\n\
		The following information was retrieved from the user's database:\n\n\
		---\n{context_block}\n---\n\n\
		Recent conversation:\n{history_block}\n\n\
		Answer the question below using the information and the conversation above.\n\
		Question: {query}\n\nAnswer:"
	)
}

fn render_context(context: &[SearchHit]) -> String {
	let mut items: Vec<&SearchHit> = context.iter().collect();

	items.sort_by(|left, right| {
		cmp_f32_desc(
			left.ranking.as_ref().map(|r| r.ranking_score).unwrap_or(left.score),
			right.ranking.as_ref().map(|r| r.ranking_score).unwrap_or(right.score),
		)
	});

	let mut lines = Vec::with_capacity(items.len());

	for item in items {
		let Some(text) =
			item.metadata.text.as_deref().or(item.metadata.original_text.as_deref())
		else {
			continue;
		};

		if text.is_empty() {
			continue;
		}

		let table =
			if item.metadata.table.is_empty() { "unknown" } else { item.metadata.table.as_str() };

		lines.push(format!("{text} [source: {table}]"));
	}

	lines.join("\n")
}

fn render_history(history: &[SessionTurn], max_history_turns: u32) -> String {
	let window = max_history_turns.max(1) as usize;
	let start = history.len().saturating_sub(window);

	history[start..]
		.iter()
		.map(|turn| {
			let role = match turn.role {
				Role::User => "user",
				Role::Assistant => "assistant",
			};

			format!("{role}: {}", turn.content)
		})
		.collect::<Vec<_>>()
		.join("\n")
}
