use sqlx::{Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	BoxFuture, ConversationStore, Error, MemoryStore, Result, UserStore,
	db::Db,
	models::{Conversation, Message, NewNote, NewTurn, NewUser, Note, Role, User},
	vector,
};

#[derive(sqlx::FromRow)]
struct MessageRow {
	message_id: Uuid,
	conversation_id: Uuid,
	role: String,
	content: String,
	created_at: OffsetDateTime,
}
impl TryFrom<MessageRow> for Message {
	type Error = Error;

	fn try_from(row: MessageRow) -> Result<Self> {
		let role = Role::parse(&row.role)
			.ok_or_else(|| Error::InvalidArgument(format!("Unknown message role {:?}.", row.role)))?;

		Ok(Self {
			message_id: row.message_id,
			conversation_id: row.conversation_id,
			role,
			content: row.content,
			created_at: row.created_at,
		})
	}
}

impl UserStore for Db {
	fn create_user<'a>(&'a self, user: NewUser) -> BoxFuture<'a, Result<User>> {
		Box::pin(async move {
			let result = sqlx::query_as::<_, User>(
				"\
INSERT INTO users (email, password_hash)
VALUES ($1, $2)
RETURNING user_id, email, password_hash, is_admin, created_at",
			)
			.bind(user.email.as_str())
			.bind(user.password_hash.as_str())
			.fetch_one(&self.pool)
			.await;

			match result {
				Ok(user) => Ok(user),
				Err(sqlx::Error::Database(err)) if err.is_unique_violation() =>
					Err(Error::Conflict("Email is already registered.".to_string())),
				Err(err) => Err(err.into()),
			}
		})
	}

	fn find_user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
		Box::pin(async move {
			let user = sqlx::query_as::<_, User>(
				"\
SELECT user_id, email, password_hash, is_admin, created_at
FROM users
WHERE email = $1",
			)
			.bind(email)
			.fetch_optional(&self.pool)
			.await?;

			Ok(user)
		})
	}
}

impl MemoryStore for Db {
	fn insert_note<'a>(&'a self, note: NewNote) -> BoxFuture<'a, Result<Note>> {
		Box::pin(async move {
			let embedding = note.embedding.as_deref().map(vector::encode);
			let note = sqlx::query_as::<_, Note>(
				"\
INSERT INTO notes (note_id, user_id, content, embedding, created_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING note_id, user_id, content, embedding, created_at",
			)
			.bind(Uuid::new_v4())
			.bind(note.user_id)
			.bind(note.content.as_str())
			.bind(embedding.as_deref())
			.bind(note.created_at)
			.fetch_one(&self.pool)
			.await
			.map_err(|err| map_write_error(err, "User does not exist."))?;

			Ok(note)
		})
	}

	fn list_notes<'a>(&'a self, user_id: i64) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let notes = sqlx::query_as::<_, Note>(
				"\
SELECT note_id, user_id, content, embedding, created_at
FROM notes
WHERE user_id = $1
ORDER BY created_at ASC, note_id ASC",
			)
			.bind(user_id)
			.fetch_all(&self.pool)
			.await?;

			Ok(notes)
		})
	}
}

impl ConversationStore for Db {
	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Conversation>>> {
		Box::pin(async move {
			let conversation = sqlx::query_as::<_, Conversation>(
				"\
SELECT conversation_id, user_id, is_default, created_at
FROM conversations
WHERE conversation_id = $1",
			)
			.bind(conversation_id)
			.fetch_optional(&self.pool)
			.await?;

			Ok(conversation)
		})
	}

	fn find_or_create_default<'a>(
		&'a self,
		user_id: i64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Conversation>> {
		Box::pin(async move {
			// Concurrent first turns race on the partial unique index; the loser reads the winner's row.
			sqlx::query(
				"\
INSERT INTO conversations (conversation_id, user_id, is_default, created_at)
VALUES ($1, $2, TRUE, $3)
ON CONFLICT (user_id) WHERE is_default DO NOTHING",
			)
			.bind(Uuid::new_v4())
			.bind(user_id)
			.bind(now)
			.execute(&self.pool)
			.await
			.map_err(|err| map_write_error(err, "User does not exist."))?;

			let conversation = sqlx::query_as::<_, Conversation>(
				"\
SELECT conversation_id, user_id, is_default, created_at
FROM conversations
WHERE user_id = $1 AND is_default",
			)
			.bind(user_id)
			.fetch_one(&self.pool)
			.await?;

			Ok(conversation)
		})
	}

	fn append_turn<'a>(&'a self, turn: NewTurn) -> BoxFuture<'a, Result<(Message, Message)>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;
			let user_message = insert_message(
				&mut tx,
				turn.conversation_id,
				Role::User,
				turn.user_text.as_str(),
				turn.now,
			)
			.await?;
			let assistant_message = insert_message(
				&mut tx,
				turn.conversation_id,
				Role::Assistant,
				turn.assistant_text.as_str(),
				turn.now + Duration::microseconds(1),
			)
			.await?;

			tx.commit().await?;

			Ok((user_message, assistant_message))
		})
	}

	fn list_messages<'a>(&'a self, conversation_id: Uuid) -> BoxFuture<'a, Result<Vec<Message>>> {
		Box::pin(async move {
			let rows = sqlx::query_as::<_, MessageRow>(
				"\
SELECT message_id, conversation_id, role, content, created_at
FROM messages
WHERE conversation_id = $1
ORDER BY created_at ASC, seq ASC",
			)
			.bind(conversation_id)
			.fetch_all(&self.pool)
			.await?;

			rows.into_iter().map(Message::try_from).collect()
		})
	}
}

async fn insert_message(
	tx: &mut Transaction<'_, Postgres>,
	conversation_id: Uuid,
	role: Role,
	content: &str,
	created_at: OffsetDateTime,
) -> Result<Message> {
	let row = sqlx::query_as::<_, MessageRow>(
		"\
INSERT INTO messages (message_id, conversation_id, role, content, created_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING message_id, conversation_id, role, content, created_at",
	)
	.bind(Uuid::new_v4())
	.bind(conversation_id)
	.bind(role.as_str())
	.bind(content)
	.bind(created_at)
	.fetch_one(&mut **tx)
	.await
	.map_err(|err| map_write_error(err, "Conversation does not exist."))?;

	Message::try_from(row)
}

fn map_write_error(err: sqlx::Error, missing_parent: &str) -> Error {
	match err {
		sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() =>
			Error::NotFound(missing_parent.to_string()),
		err => Error::Sqlx(err),
	}
}
