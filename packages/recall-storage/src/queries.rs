use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result, db::Db, models::{NewTurn, SourceRow}};

/// Persists a batch of turns in one transaction. A failure rolls the whole
/// batch back.
pub async fn insert_turns(db: &Db, turns: &[NewTurn]) -> Result<()> {
	if turns.is_empty() {
		return Ok(());
	}

	let mut tx = db.pool.begin().await?;

	for turn in turns {
		sqlx::query(
			"\
INSERT INTO conversation_turns (
	turn_id,
	chat_id,
	session_key,
	message_type,
	content,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6)",
		)
		.bind(Uuid::new_v4())
		.bind(turn.chat_id)
		.bind(turn.session_key.as_str())
		.bind(turn.message_type.as_str())
		.bind(turn.content.as_str())
		.bind(turn.created_at)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

pub async fn list_tables(db: &Db) -> Result<Vec<String>> {
	let tables: Vec<String> = sqlx::query_scalar(
		"\
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
ORDER BY table_name",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(tables)
}

async fn list_columns(db: &Db, table: &str) -> Result<Vec<String>> {
	let columns: Vec<String> = sqlx::query_scalar(
		"\
SELECT column_name::text
FROM information_schema.columns
WHERE table_schema = 'public' AND table_name = $1
ORDER BY ordinal_position",
	)
	.bind(table)
	.fetch_all(&db.pool)
	.await?;

	Ok(columns)
}

/// Fetches rows as ordered field mappings. Field order follows the table's
/// column order, which `to_jsonb` alone does not guarantee once decoded.
pub async fn fetch_source_rows(
	db: &Db,
	table: &str,
	limit: Option<u32>,
) -> Result<Vec<SourceRow>> {
	ensure_quotable(table)?;

	let columns = list_columns(db, table).await?;

	if columns.is_empty() {
		return Err(Error::NotFound(format!("table {table} has no columns")));
	}

	let mut sql = format!("SELECT to_jsonb(t) FROM \"{table}\" AS t");

	if limit.is_some() {
		sql.push_str(" LIMIT $1");
	}

	let mut query = sqlx::query_scalar::<_, Value>(&sql);

	if let Some(limit) = limit {
		query = query.bind(limit as i64);
	}

	let docs: Vec<Value> = query.fetch_all(&db.pool).await?;
	let mut rows = Vec::with_capacity(docs.len());

	for (idx, doc) in docs.into_iter().enumerate() {
		let Value::Object(map) = doc else {
			return Err(Error::InvalidArgument(format!(
				"row {idx} of table {table} did not decode as an object"
			)));
		};
		let row_id = map.get("id").and_then(Value::as_i64).unwrap_or(idx as i64);
		let fields = columns
			.iter()
			.map(|column| (column.clone(), map.get(column).cloned().unwrap_or(Value::Null)))
			.collect();

		rows.push(SourceRow { row_id, fields });
	}

	Ok(rows)
}

pub async fn fetch_source_row(db: &Db, table: &str, row_id: i64) -> Result<Option<SourceRow>> {
	ensure_quotable(table)?;

	let columns = list_columns(db, table).await?;

	if columns.is_empty() {
		return Err(Error::NotFound(format!("table {table} has no columns")));
	}

	let sql = format!("SELECT to_jsonb(t) FROM \"{table}\" AS t WHERE t.id = $1");
	let doc: Option<Value> =
		sqlx::query_scalar(&sql).bind(row_id).fetch_optional(&db.pool).await?;
	let Some(Value::Object(map)) = doc else {
		return Ok(None);
	};
	let fields = columns
		.iter()
		.map(|column| (column.clone(), map.get(column).cloned().unwrap_or(Value::Null)))
		.collect();

	Ok(Some(SourceRow { row_id, fields }))
}

fn ensure_quotable(table: &str) -> Result<()> {
	if table.is_empty() || table.contains('"') || table.contains('\0') {
		return Err(Error::InvalidArgument(format!("table name {table:?} is not quotable")));
	}

	Ok(())
}
