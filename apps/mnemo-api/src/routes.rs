use axum::{
	Json, Router,
	extract::{Path, State},
	http::{HeaderMap, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use mnemo_service::{
	ChatRequest, Error, HistoryRequest, LoginRequest, LoginResponse, MessageItem, NoteItem,
	NoteSearchItem, NoteSearchRequest, NotesRequest, SignupRequest, SignupResponse, TurnResponse,
};

use crate::{realtime, state::AppState};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/signup", post(signup))
		.route("/login", post(login))
		.route("/chat", post(chat))
		.route("/history/{conversation_id}", get(history))
		.route("/my-notes", post(my_notes))
		.route("/notes/search", post(search_notes))
		.route("/ws", get(realtime::ws))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn signup(
	State(state): State<AppState>,
	Json(payload): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, ApiError> {
	let response = state.service.signup(payload).await?;

	Ok(Json(response))
}

async fn login(
	State(state): State<AppState>,
	Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
	let response = state.service.login(payload).await?;

	Ok(Json(response))
}

async fn chat(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
	let response = state.service.chat(payload).await?;

	Ok(Json(response))
}

async fn history(
	State(state): State<AppState>,
	Path(conversation_id): Path<Uuid>,
	headers: HeaderMap,
) -> Result<Json<Vec<MessageItem>>, ApiError> {
	let token = bearer_token(&headers).ok_or_else(|| {
		json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing bearer token.")
	})?;
	let response =
		state.service.history(HistoryRequest { token: token.to_string(), conversation_id }).await?;

	Ok(Json(response))
}

async fn my_notes(
	State(state): State<AppState>,
	Json(payload): Json<NotesRequest>,
) -> Result<Json<Vec<NoteItem>>, ApiError> {
	let response = state.service.list_notes(payload).await?;

	Ok(Json(response))
}

async fn search_notes(
	State(state): State<AppState>,
	Json(payload): Json<NoteSearchRequest>,
) -> Result<Json<Vec<NoteSearchItem>>, ApiError> {
	let response = state.service.search_notes(payload).await?;

	Ok(Json(response))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let token = raw.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
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
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::Unauthorized { message } =>
				json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message),
			Error::Forbidden { message } => json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message),
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
			Error::NotFound { message } => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message),
			Error::Conflict { message } => json_error(StatusCode::CONFLICT, "CONFLICT", message),
			Error::Provider { message } => {
				tracing::error!(error = %message, "Provider call failed.");

				json_error(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message)
			},
			Error::Storage { message } => {
				tracing::error!(error = %message, "Storage operation failed.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", "Internal error.")
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}
