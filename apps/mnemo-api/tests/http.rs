use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Map, Value};
use tower::util::ServiceExt;

use mnemo_api::{
	realtime::{self, MessageEvent, Outbound},
	routes,
	state::AppState,
};
use mnemo_config::{
	Agent, Config, EmbeddingProviderConfig, LlmProviderConfig, Memory, Providers as ProviderConfigs,
	Security, Service, Storage, StorageBackend,
};
use mnemo_service::{
	AgentService, BoxFuture, EmbeddingProvider, Error, GenerationProvider, Providers, Result,
	Stores,
};
use mnemo_storage::in_memory::InMemoryStore;

struct AxisEmbedding;
impl EmbeddingProvider for AxisEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let vectors = texts
			.iter()
			.map(|text| if text.contains("mom") { vec![1.0, 0.0, 0.0] } else { vec![0.0, 0.0, 1.0] })
			.collect();

		Box::pin(async move { Ok(vectors) })
	}
}

/// Saves anything after "remember to ", fails on "explode", otherwise echoes.
struct EchoGeneration;
impl GenerationProvider for EchoGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, Result<String>> {
		let user = prompt.rsplit("\nUser: ").next().unwrap_or_default().to_string();

		Box::pin(async move {
			if user.contains("explode") {
				return Err(Error::Provider { message: "upstream unavailable".to_string() });
			}

			match user.strip_prefix("remember to ") {
				Some(rest) => Ok(format!("ACTION_SAVE_NOTE: {rest}")),
				None => Ok(format!("echo: {user}")),
			}
		})
	}
}

fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage { backend: StorageBackend::Memory, postgres: None },
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				dimensions: 3,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			generation: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				temperature: 0.1,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		memory: Memory::default(),
		agent: Agent::default(),
		security: Security {
			bind_localhost_only: true,
			jwt_secret: "test-secret".to_string(),
			token_ttl_days: 30,
			password_iterations: 1_000,
		},
	}
}

fn test_state() -> AppState {
	let service = AgentService::with_providers(
		test_config(),
		Stores::shared(Arc::new(InMemoryStore::new())),
		Providers::new(Arc::new(AxisEmbedding), Arc::new(EchoGeneration)),
	);

	AppState::from_service(service)
}

async fn post_json(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
	let response = app
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(uri)
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call endpoint.");

	read_json(response).await
}

async fn get_json(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
	let mut request = Request::builder().uri(uri);

	if let Some(token) = token {
		request = request.header("authorization", format!("Bearer {token}"));
	}

	let response = app
		.clone()
		.oneshot(request.body(Body::empty()).expect("Failed to build request."))
		.await
		.expect("Failed to call endpoint.");

	read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
	let status = response.status();
	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = if body.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&body).expect("Failed to parse response.")
	};

	(status, json)
}

async fn signup_and_login(app: &Router, email: &str) -> String {
	let credentials = serde_json::json!({ "email": email, "password": "pw" });
	let (status, body) = post_json(app, "/signup", credentials.clone()).await;

	assert_eq!(status, StatusCode::OK, "Signup failed: {body}");
	assert!(body["user_id"].is_i64());

	let (status, body) = post_json(app, "/login", credentials).await;

	assert_eq!(status, StatusCode::OK, "Login failed: {body}");

	body["token"].as_str().expect("Login must return a token.").to_string()
}

#[tokio::test]
async fn health_ok() {
	let app = routes::router(test_state());
	let response = app
		.oneshot(Request::builder().uri("/health").body(Body::empty()).expect("Failed to build request."))
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_saves_note_and_exposes_it_through_history_and_notes() {
	let app = routes::router(test_state());
	let token = signup_and_login(&app, "ada@example.com").await;
	let (status, turn) = post_json(
		&app,
		"/chat",
		serde_json::json!({ "token": token, "message": "remember to call mom" }),
	)
	.await;

	assert_eq!(status, StatusCode::OK, "Chat failed: {turn}");
	assert_eq!(turn["response"], "(System: I have saved the note: \"call mom\" to your database.)");

	let conversation_id = turn["conversation_id"].as_str().expect("Missing conversation_id.");
	let (status, history) =
		get_json(&app, &format!("/history/{conversation_id}"), Some(&token)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(history.as_array().map(Vec::len), Some(2));
	assert_eq!(history[0]["role"], "user");
	assert_eq!(history[0]["content"], "remember to call mom");
	assert_eq!(history[1]["role"], "assistant");
	assert!(history[1]["created_at"].is_string());

	let (status, notes) = post_json(&app, "/my-notes", serde_json::json!({ "token": token })).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(notes[0]["content"], "call mom");
	assert_eq!(notes[0]["has_embedding"], true);

	let (status, results) = post_json(
		&app,
		"/notes/search",
		serde_json::json!({ "token": token, "query": "what about mom" }),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(results[0]["content"], "call mom");
	assert!(results[0]["score"].as_f64().is_some_and(|score| score > 0.99));
}

#[tokio::test]
async fn errors_map_to_statuses_and_codes() {
	let app = routes::router(test_state());
	let token = signup_and_login(&app, "ada@example.com").await;
	let cases = [
		(
			"/chat",
			serde_json::json!({ "token": "bogus", "message": "hi" }),
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
		),
		(
			"/chat",
			serde_json::json!({ "token": token, "message": "  " }),
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
		),
		(
			"/chat",
			serde_json::json!({ "token": token, "message": "please explode" }),
			StatusCode::BAD_GATEWAY,
			"PROVIDER_ERROR",
		),
		(
			"/chat",
			serde_json::json!({
				"token": token,
				"message": "hi",
				"conversation_id": "00000000-0000-0000-0000-000000000000",
			}),
			StatusCode::NOT_FOUND,
			"NOT_FOUND",
		),
		(
			"/signup",
			serde_json::json!({ "email": "ADA@example.com", "password": "pw" }),
			StatusCode::CONFLICT,
			"CONFLICT",
		),
		(
			"/login",
			serde_json::json!({ "email": "ada@example.com", "password": "wrong" }),
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
		),
	];

	for (uri, payload, expected_status, expected_code) in cases {
		let (status, body) = post_json(&app, uri, payload).await;

		assert_eq!(status, expected_status, "Unexpected status for {uri}: {body}");
		assert_eq!(body["error_code"], expected_code);
	}
}

#[tokio::test]
async fn history_requires_bearer_token_and_ownership() {
	let app = routes::router(test_state());
	let owner = signup_and_login(&app, "ada@example.com").await;
	let intruder = signup_and_login(&app, "bob@example.com").await;
	let (_, turn) =
		post_json(&app, "/chat", serde_json::json!({ "token": owner, "message": "hello" })).await;
	let uri = format!("/history/{}", turn["conversation_id"].as_str().expect("Missing id."));
	let (status, body) = get_json(&app, &uri, None).await;

	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["error_code"], "UNAUTHORIZED");

	let (status, body) = get_json(&app, &uri, Some(&intruder)).await;

	assert_eq!(status, StatusCode::FORBIDDEN);
	assert_eq!(body["error_code"], "FORBIDDEN");
}

#[tokio::test]
async fn realtime_reply_reaches_only_the_senders_room() {
	let state = test_state();
	let app = routes::router(state.clone());
	let ada = signup_and_login(&app, "ada@example.com").await;
	let bob = signup_and_login(&app, "bob@example.com").await;
	let (ada_id, mut ada_room) = realtime::join(&state, &ada).expect("Ada must join.");
	let (_, mut bob_room) = realtime::join(&state, &bob).expect("Bob must join.");
	let response = realtime::handle_message(
		&state,
		MessageEvent {
			text: "hello there".to_string(),
			token: ada.clone(),
			user_id: Some(ada_id),
			conversation_id: None,
		},
	)
	.await
	.expect("Turn failed.");

	assert_eq!(
		ada_room.try_recv().expect("Ada must receive the reply."),
		Outbound::Reply {
			text: "echo: hello there".to_string(),
			conversation_id: response.conversation_id,
		}
	);
	assert!(bob_room.try_recv().is_err());
}

#[tokio::test]
async fn realtime_failures_emit_nothing() {
	let state = test_state();
	let app = routes::router(state.clone());
	let ada = signup_and_login(&app, "ada@example.com").await;
	let (ada_id, mut ada_room) = realtime::join(&state, &ada).expect("Ada must join.");
	let mismatched = realtime::handle_message(
		&state,
		MessageEvent {
			text: "hello".to_string(),
			token: ada.clone(),
			user_id: Some(ada_id + 1),
			conversation_id: None,
		},
	)
	.await;

	assert!(matches!(mismatched, Err(Error::Unauthorized { .. })));

	let failed = realtime::handle_message(
		&state,
		MessageEvent {
			text: "explode".to_string(),
			token: ada,
			user_id: None,
			conversation_id: None,
		},
	)
	.await;

	assert!(matches!(failed, Err(Error::Provider { .. })));
	assert!(ada_room.try_recv().is_err());
	assert!(realtime::join(&state, "bogus").is_err());
}
