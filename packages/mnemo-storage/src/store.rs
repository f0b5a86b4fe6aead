use std::{future::Future, pin::Pin};

use uuid::Uuid;

use crate::{
	Result,
	models::{Conversation, Message, NewNote, NewTurn, NewUser, Note, User},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait UserStore
where
	Self: Send + Sync,
{
	/// Fails with [`crate::Error::Conflict`] when the email is taken.
	fn create_user<'a>(&'a self, user: NewUser) -> BoxFuture<'a, Result<User>>;

	fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>>;
}

pub trait MemoryStore
where
	Self: Send + Sync,
{
	fn insert_note<'a>(&'a self, note: NewNote) -> BoxFuture<'a, Result<Note>>;

	/// All notes of a user, oldest first, with or without embeddings.
	fn list_notes<'a>(&'a self, user_id: i64) -> BoxFuture<'a, Result<Vec<Note>>>;
}

pub trait ConversationStore
where
	Self: Send + Sync,
{
	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Conversation>>>;

	/// Returns the user's default conversation, creating it on first use.
	fn find_or_create_default<'a>(
		&'a self,
		user_id: i64,
		now: time::OffsetDateTime,
	) -> BoxFuture<'a, Result<Conversation>>;

	/// Appends the user message, then the assistant message, atomically.
	///
	/// Fails with [`crate::Error::NotFound`] when the conversation does not exist.
	fn append_turn<'a>(&'a self, turn: NewTurn) -> BoxFuture<'a, Result<(Message, Message)>>;

	fn list_messages<'a>(&'a self, conversation_id: Uuid) -> BoxFuture<'a, Result<Vec<Message>>>;
}
