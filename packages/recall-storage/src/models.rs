use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Metadata carried on every indexed vector. Known fields are typed; payload
/// keys the core does not anticipate round-trip through `extra`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DocMeta {
	pub table: String,
	pub row_id: i64,
	pub chunk_index: i32,
	pub chunk_count: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original_text: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Clone, Debug)]
pub struct NewTurn {
	pub chat_id: Option<i64>,
	pub session_key: String,
	pub message_type: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}

/// One relational row, exposed as an ordered field-name/value mapping.
#[derive(Clone, Debug)]
pub struct SourceRow {
	pub row_id: i64,
	pub fields: Vec<(String, Value)>,
}
