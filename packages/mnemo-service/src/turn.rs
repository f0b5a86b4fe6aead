//! One conversational turn: retrieve context, generate, act on a directive, persist.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use mnemo_domain::directive::{self, ActionDirective, SAVE_NOTE_MARKER};
use mnemo_storage::models::{NewNote, NewTurn};

use crate::{AgentService, Error, Result};

pub const EMPTY_NOTE_REPLY: &str = "(System: Nothing was saved because the note was empty.)";

#[derive(Clone, Debug)]
pub struct TurnRequest {
	pub user_id: i64,
	pub conversation_id: Option<Uuid>,
	pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnResponse {
	pub response: String,
	pub conversation_id: Uuid,
}

/// A turn addressed by session token instead of a verified user id.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
	pub token: String,
	pub message: String,
	#[serde(default)]
	pub conversation_id: Option<Uuid>,
}

impl AgentService {
	pub async fn chat(&self, req: ChatRequest) -> Result<TurnResponse> {
		let session = self.verify_session(&req.token)?;

		self.run_turn(TurnRequest {
			user_id: session.user_id,
			conversation_id: req.conversation_id,
			text: req.message,
		})
		.await
	}

	/// Runs a turn to completion. Nothing is written to the transcript unless every step
	/// succeeds.
	pub async fn run_turn(&self, req: TurnRequest) -> Result<TurnResponse> {
		if req.text.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "message must be non-empty.".to_string() });
		}

		let conversation_id =
			self.resolve_conversation(req.user_id, req.conversation_id, OffsetDateTime::now_utc()).await?;
		let _turn_guard = if self.cfg.agent.serialize_turns {
			Some(self.turn_locks.acquire(conversation_id).await)
		} else {
			None
		};

		tracing::info!(user_id = req.user_id, %conversation_id, "Turn started.");

		let context = self.retrieve_context(req.user_id, &req.text).await?;
		let prompt = build_prompt(&context, &req.text);
		let generated = self.generate(&prompt).await?;
		let response = match directive::parse(&generated) {
			Some(action) => self.execute(req.user_id, action).await?,
			None => generated,
		};

		self.stores
			.conversations
			.append_turn(NewTurn {
				conversation_id,
				user_text: req.text,
				assistant_text: response.clone(),
				now: OffsetDateTime::now_utc(),
			})
			.await?;

		tracing::info!(user_id = req.user_id, %conversation_id, "Turn finished.");

		Ok(TurnResponse { response, conversation_id })
	}

	async fn resolve_conversation(
		&self,
		user_id: i64,
		conversation_id: Option<Uuid>,
		now: OffsetDateTime,
	) -> Result<Uuid> {
		let Some(conversation_id) = conversation_id else {
			let conversation =
				self.stores.conversations.find_or_create_default(user_id, now).await?;

			return Ok(conversation.conversation_id);
		};
		let Some(conversation) = self.stores.conversations.get_conversation(conversation_id).await?
		else {
			return Err(Error::NotFound { message: "Conversation does not exist.".to_string() });
		};

		if self.cfg.agent.enforce_conversation_ownership && conversation.user_id != user_id {
			return Err(Error::Forbidden {
				message: "Conversation belongs to another user.".to_string(),
			});
		}

		Ok(conversation_id)
	}

	/// Carries out a directive and returns the text shown to the user instead of the raw
	/// generation.
	async fn execute(&self, user_id: i64, action: ActionDirective) -> Result<String> {
		match action {
			ActionDirective::SaveNote { payload } => {
				if payload.is_empty() && !self.cfg.memory.allow_empty_notes {
					tracing::info!(user_id, "Empty note rejected.");

					return Ok(EMPTY_NOTE_REPLY.to_string());
				}

				let embedding =
					if payload.is_empty() { None } else { Some(self.embed_one(&payload).await?) };
				let note = self
					.stores
					.notes
					.insert_note(NewNote {
						user_id,
						content: payload,
						embedding,
						created_at: OffsetDateTime::now_utc(),
					})
					.await?;

				tracing::info!(user_id, note_id = %note.note_id, "Note saved.");

				Ok(saved_note_reply(&note.content))
			},
		}
	}
}

pub fn saved_note_reply(payload: &str) -> String {
	format!("(System: I have saved the note: \"{payload}\" to your database.)")
}

/// System instruction, then the context fragment when there is one, then the user text.
pub fn build_prompt(context: &str, text: &str) -> String {
	let mut prompt = format!(
		"You are a helpful assistant with a long-term memory of the user's notes.\n\
		 IMPORTANT: If the user explicitly asks you to \"save a note\" or \"remember this\", do not \
		 reply with normal text. Instead, start your reply exactly with:\n\
		 {SAVE_NOTE_MARKER} followed by the content to save."
	);

	if !context.is_empty() {
		prompt.push_str("\nRelevant notes: ");
		prompt.push_str(context);
	}

	prompt.push_str("\nUser: ");
	prompt.push_str(text);

	prompt
}
