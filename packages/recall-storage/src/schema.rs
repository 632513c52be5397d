/// Conversation turns are written for durability and never read back into
/// the in-memory session state.
pub fn render_schema() -> String {
	"\
CREATE TABLE IF NOT EXISTS conversation_turns (
	turn_id UUID PRIMARY KEY,
	chat_id BIGINT,
	session_key TEXT NOT NULL,
	message_type TEXT NOT NULL,
	content TEXT NOT NULL,
	created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversation_turns_session
	ON conversation_turns (session_key, created_at)"
		.to_string()
}
