//! Process-local backend implementing every store trait.
//!
//! Used by tests and by `storage.backend = "memory"`. Integrity rules mirror the Postgres schema:
//! unique emails, one default conversation per user, and messages only in existing conversations.

use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
	BoxFuture, ConversationStore, Error, MemoryStore, Result, UserStore,
	models::{Conversation, Message, NewNote, NewTurn, NewUser, Note, Role, User},
	vector,
};

#[derive(Default)]
struct Tables {
	users: Vec<User>,
	notes: Vec<Note>,
	conversations: Vec<Conversation>,
	messages: Vec<Message>,
}

#[derive(Default)]
pub struct InMemoryStore {
	tables: RwLock<Tables>,
}
impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn note_count(&self) -> usize {
		self.tables.read().await.notes.len()
	}

	pub async fn message_count(&self) -> usize {
		self.tables.read().await.messages.len()
	}
}

impl UserStore for InMemoryStore {
	fn create_user<'a>(&'a self, user: NewUser) -> BoxFuture<'a, Result<User>> {
		Box::pin(async move {
			let mut tables = self.tables.write().await;

			if tables.users.iter().any(|existing| existing.email == user.email) {
				return Err(Error::Conflict("Email is already registered.".to_string()));
			}

			let user = User {
				user_id: tables.users.len() as i64 + 1,
				email: user.email,
				password_hash: user.password_hash,
				is_admin: false,
				created_at: OffsetDateTime::now_utc(),
			};

			tables.users.push(user.clone());

			Ok(user)
		})
	}

	fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;

			Ok(tables.users.iter().find(|user| user.email == email).cloned())
		})
	}
}

impl MemoryStore for InMemoryStore {
	fn insert_note<'a>(&'a self, note: NewNote) -> BoxFuture<'a, Result<Note>> {
		Box::pin(async move {
			let mut tables = self.tables.write().await;
			let note = Note {
				note_id: Uuid::new_v4(),
				user_id: note.user_id,
				content: note.content,
				embedding: note.embedding.as_deref().map(vector::encode),
				created_at: note.created_at,
			};

			tables.notes.push(note.clone());

			Ok(note)
		})
	}

	fn list_notes<'a>(&'a self, user_id: i64) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;

			Ok(tables.notes.iter().filter(|note| note.user_id == user_id).cloned().collect())
		})
	}
}

impl ConversationStore for InMemoryStore {
	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Conversation>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;

			Ok(tables
				.conversations
				.iter()
				.find(|conversation| conversation.conversation_id == conversation_id)
				.cloned())
		})
	}

	fn find_or_create_default<'a>(
		&'a self,
		user_id: i64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Conversation>> {
		Box::pin(async move {
			let mut tables = self.tables.write().await;

			if let Some(existing) = tables
				.conversations
				.iter()
				.find(|conversation| conversation.user_id == user_id && conversation.is_default)
			{
				return Ok(existing.clone());
			}

			let conversation = Conversation {
				conversation_id: Uuid::new_v4(),
				user_id,
				is_default: true,
				created_at: now,
			};

			tables.conversations.push(conversation.clone());

			Ok(conversation)
		})
	}

	fn append_turn<'a>(&'a self, turn: NewTurn) -> BoxFuture<'a, Result<(Message, Message)>> {
		Box::pin(async move {
			let mut tables = self.tables.write().await;

			if !tables
				.conversations
				.iter()
				.any(|conversation| conversation.conversation_id == turn.conversation_id)
			{
				return Err(Error::NotFound("Conversation does not exist.".to_string()));
			}

			let user_message = Message {
				message_id: Uuid::new_v4(),
				conversation_id: turn.conversation_id,
				role: Role::User,
				content: turn.user_text,
				created_at: turn.now,
			};
			let assistant_message = Message {
				message_id: Uuid::new_v4(),
				conversation_id: turn.conversation_id,
				role: Role::Assistant,
				content: turn.assistant_text,
				created_at: turn.now + Duration::microseconds(1),
			};

			tables.messages.push(user_message.clone());
			tables.messages.push(assistant_message.clone());

			Ok((user_message, assistant_message))
		})
	}

	fn list_messages<'a>(&'a self, conversation_id: Uuid) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let tables = self.tables.read().await;
			let mut messages: Vec<Message> = tables
				.messages
				.iter()
				.filter(|message| message.conversation_id == conversation_id)
				.cloned()
				.collect();

			// Stable, so equal timestamps keep insertion order like the `seq` column.
			messages.sort_by_key(|message| message.created_at);

			Ok(messages)
		})
	}
}
