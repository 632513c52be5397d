use axum::{
	Json, Router,
	extract::{
		Path, Query, State, WebSocketUpgrade,
		ws::{Message, WebSocket},
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::state::{
	AppState, ChatRequest, ChatResponse, RankingCriteria, SearchOutcome, SearchRequest,
	ServiceError,
};
use recall_service::chat::session_key;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat/send", post(chat_send))
		.route("/v1/chat/ws", get(chat_ws))
		.route("/v1/search", post(search))
		.route("/v1/search/criteria", post(search_with_criteria))
		.route("/v1/index/all", post(index_all))
		.route("/v1/index/table/{table}", post(index_table))
		.route("/v1/index/record/{table}/{id}", post(index_record))
		.route("/v1/index/delete/{table}/{id}", post(delete_record))
		.route("/v1/index/count", get(index_count))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn chat_send(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
	let key = session_key(payload.user_id, payload.chat_id);
	let response = state.chat.send(payload).await?;

	broadcast_response(&state, &key, &response);

	Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct WsParams {
	user_id: i64,
	chat_id: Option<i64>,
}

async fn chat_ws(
	State(state): State<AppState>,
	Query(params): Query<WsParams>,
	ws: WebSocketUpgrade,
) -> Response {
	ws.on_upgrade(move |socket| handle_socket(state, params, socket))
}

/// Each device holds its own socket; responses are fanned out through the
/// per-session broadcast channel so every connection sharing the chat sees
/// them.
async fn handle_socket(state: AppState, params: WsParams, socket: WebSocket) {
	let key = session_key(params.user_id, params.chat_id);
	let mut rx = state.subscribe(&key);
	let (mut sink, mut stream) = socket.split();
	let mut forward_task = tokio::spawn(async move {
		while let Ok(payload) = rx.recv().await {
			if sink.send(Message::Text(payload.into())).await.is_err() {
				break;
			}
		}
	});
	let recv_state = state.clone();
	let mut receive_task = tokio::spawn(async move {
		while let Some(Ok(message)) = stream.next().await {
			let Message::Text(text) = message else {
				continue;
			};
			let request: ChatRequest = match serde_json::from_str(text.as_str()) {
				Ok(request) => request,
				Err(err) => {
					recv_state.publish(
						&key,
						error_payload("invalid_request", &format!("Malformed chat frame: {err}")),
					);

					continue;
				},
			};
			let response_key = session_key(request.user_id, request.chat_id);

			match recv_state.chat.send(request).await {
				Ok(response) => broadcast_response(&recv_state, &response_key, &response),
				Err(err) => {
					let error = ApiError::from(err);

					recv_state.publish(&response_key, error_payload(&error.error_code, &error.message));
				},
			}
		}
	});

	tokio::select! {
		_ = &mut forward_task => receive_task.abort(),
		_ = &mut receive_task => forward_task.abort(),
	}
}

fn broadcast_response(state: &AppState, key: &str, response: &ChatResponse) {
	match serde_json::to_string(response) {
		Ok(payload) => state.publish(key, payload),
		Err(err) => tracing::error!(error = %err, "Failed to encode chat response for broadcast."),
	}
}

fn error_payload(code: &str, message: &str) -> String {
	serde_json::json!({ "error_code": code, "message": message }).to_string()
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
	let outcome = state.search.retrieve(payload).await?;

	Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct CriteriaSearchBody {
	#[serde(flatten)]
	request: SearchRequest,
	#[serde(default)]
	criteria: RankingCriteria,
}

async fn search_with_criteria(
	State(state): State<AppState>,
	Json(payload): Json<CriteriaSearchBody>,
) -> Result<Json<SearchOutcome>, ApiError> {
	let outcome =
		state.search.retrieve_with_criteria(payload.request, payload.criteria).await?;

	Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
struct IndexAllBody {
	#[serde(default)]
	exclude: Vec<String>,
}

async fn index_all(
	State(state): State<AppState>,
	payload: Option<Json<IndexAllBody>>,
) -> Result<Json<recall_service::IndexReport>, ApiError> {
	let exclude = payload.map(|Json(body)| body.exclude).unwrap_or_default();
	let report = state.indexing.index_all(&exclude).await?;

	Ok(Json(report))
}

async fn index_table(
	State(state): State<AppState>,
	Path(table): Path<String>,
) -> Result<Json<recall_service::TableReport>, ApiError> {
	let report = state.indexing.index_table(&table).await?;

	Ok(Json(report))
}

async fn index_record(
	State(state): State<AppState>,
	Path((table, id)): Path<(String, i64)>,
) -> Result<Json<recall_service::RecordReport>, ApiError> {
	let report = state.indexing.index_record(&table, id).await?;

	Ok(Json(report))
}

async fn delete_record(
	State(state): State<AppState>,
	Path((table, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
	state.indexing.delete_record(&table, id).await?;

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct IndexCount {
	total_vectors: u64,
}

async fn index_count(State(state): State<AppState>) -> Result<Json<IndexCount>, ApiError> {
	let total_vectors = state.indexing.vector_count().await?;

	Ok(Json(IndexCount { total_vectors }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::Retrieval { .. } => (StatusCode::BAD_GATEWAY, "retrieval_failed"),
			ServiceError::Generation { .. } => (StatusCode::BAD_GATEWAY, "generation_failed"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_failed"),
			ServiceError::Index { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "index_failed"),
			ServiceError::BatchIndexing { .. } => {
				(StatusCode::INTERNAL_SERVER_ERROR, "batch_indexing_failed")
			},
		};

		Self { status, error_code: error_code.to_string(), message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
