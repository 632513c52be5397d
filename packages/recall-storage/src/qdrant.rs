use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
		Filter, PointId, PointStruct, Query, QueryPointsBuilder, UpsertPointsBuilder, Value,
		VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{Result, models::DocMeta};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug)]
pub struct ScoredDoc {
	pub id: Uuid,
	pub score: f32,
	pub meta: DocMeta,
}

impl QdrantStore {
	pub fn new(cfg: &recall_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(&self.collection).vectors_config(
					VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
				),
			)
			.await?;

		Ok(())
	}

	pub async fn upsert(&self, documents: Vec<(Uuid, Vec<f32>, DocMeta)>) -> Result<u64> {
		if documents.is_empty() {
			return Ok(0);
		}

		let mut points = Vec::with_capacity(documents.len());

		for (id, vector, meta) in documents {
			let payload = Payload::from(meta_to_payload(&meta));

			points.push(PointStruct::new(id.to_string(), vector, payload));
		}

		let inserted = points.len() as u64;
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(inserted)
	}

	pub async fn search(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredDoc>> {
		let query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.with_payload(true)
			.limit(limit);
		let response = self.client.query(query).await?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(id) = point.id.as_ref().and_then(point_id_to_uuid) else {
				tracing::warn!("Search hit is missing a UUID point id.");

				continue;
			};

			out.push(ScoredDoc { id, score: point.score, meta: payload_to_meta(point.payload) });
		}

		Ok(out)
	}

	/// Removes every vector stored under `(table, row_id)`. Missing points
	/// are not an error.
	pub async fn delete_record(&self, table: &str, row_id: i64) -> Result<()> {
		let filter = Filter::must([
			Condition::matches("table", table.to_string()),
			Condition::matches("row_id", row_id),
		]);
		let delete =
			DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		match self.client.delete_points(delete).await {
			Ok(_) => Ok(()),
			Err(err) =>
				if is_not_found_error(&err) {
					tracing::info!(table, row_id, "Qdrant points missing during delete.");

					Ok(())
				} else {
					Err(err.into())
				},
		}
	}

	pub async fn count(&self) -> Result<u64> {
		let response =
			self.client.count(CountPointsBuilder::new(self.collection.clone()).exact(true)).await?;

		Ok(response.result.map(|result| result.count).unwrap_or(0))
	}
}

fn is_not_found_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}

pub fn meta_to_payload(meta: &DocMeta) -> HashMap<String, Value> {
	let mut payload = HashMap::new();

	payload.insert("table".to_string(), Value::from(meta.table.clone()));
	payload.insert("row_id".to_string(), Value::from(meta.row_id));
	payload.insert("chunk_index".to_string(), Value::from(meta.chunk_index as i64));
	payload.insert("chunk_count".to_string(), Value::from(meta.chunk_count as i64));

	if let Some(user_id) = meta.user_id {
		payload.insert("user_id".to_string(), Value::from(user_id));
	}
	if let Some(created_at) = &meta.created_at {
		payload.insert("created_at".to_string(), Value::from(created_at.clone()));
	}
	if let Some(text) = &meta.text {
		payload.insert("text".to_string(), Value::from(text.clone()));
	}
	if let Some(original_text) = &meta.original_text {
		payload.insert("original_text".to_string(), Value::from(original_text.clone()));
	}
	for (key, value) in &meta.extra {
		payload.insert(key.clone(), Value::from(value.clone()));
	}

	payload
}

pub fn payload_to_meta(payload: HashMap<String, Value>) -> DocMeta {
	let mut meta = DocMeta {
		table: payload_string(&payload, "table").unwrap_or_default(),
		row_id: payload_i64(&payload, "row_id").unwrap_or_default(),
		chunk_index: payload_i64(&payload, "chunk_index").unwrap_or_default() as i32,
		chunk_count: payload_i64(&payload, "chunk_count").unwrap_or_default() as i32,
		user_id: payload_i64(&payload, "user_id"),
		created_at: payload_string(&payload, "created_at"),
		text: payload_string(&payload, "text"),
		original_text: payload_string(&payload, "original_text"),
		extra: serde_json::Map::new(),
	};
	let known = [
		"table",
		"row_id",
		"chunk_index",
		"chunk_count",
		"user_id",
		"created_at",
		"text",
		"original_text",
	];

	for (key, value) in payload {
		if known.contains(&key.as_str()) {
			continue;
		}

		meta.extra.insert(key, value_to_json(value));
	}

	meta
}

pub fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				Some(*value as i64)
			} else {
				None
			},
		_ => None,
	}
}

fn value_to_json(value: Value) -> JsonValue {
	match value.kind {
		None | Some(Kind::NullValue(_)) => JsonValue::Null,
		Some(Kind::BoolValue(value)) => JsonValue::Bool(value),
		Some(Kind::IntegerValue(value)) => JsonValue::from(value),
		Some(Kind::DoubleValue(value)) => JsonValue::from(value),
		Some(Kind::StringValue(value)) => JsonValue::String(value),
		Some(Kind::ListValue(list)) =>
			JsonValue::Array(list.values.into_iter().map(value_to_json).collect()),
		Some(Kind::StructValue(fields)) => JsonValue::Object(
			fields.fields.into_iter().map(|(key, value)| (key, value_to_json(value))).collect(),
		),
	}
}
