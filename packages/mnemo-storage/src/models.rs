use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
	pub user_id: i64,
	pub email: String,
	pub password_hash: String,
	pub is_admin: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
	pub email: String,
	pub password_hash: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Note {
	pub note_id: Uuid,
	pub user_id: i64,
	pub content: String,
	/// Textual vector, see [`crate::vector`]. `None` means the note was never embedded.
	pub embedding: Option<String>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewNote {
	pub user_id: i64,
	pub content: String,
	pub embedding: Option<Vec<f32>>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
	pub conversation_id: Uuid,
	pub user_id: i64,
	pub is_default: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"user" => Some(Self::User),
			"assistant" => Some(Self::Assistant),
			_ => None,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Message {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	pub role: Role,
	pub content: String,
	pub created_at: OffsetDateTime,
}

/// The user message and the reply of one turn. Stored together or not at all.
#[derive(Debug, Clone)]
pub struct NewTurn {
	pub conversation_id: Uuid,
	pub user_text: String,
	pub assistant_text: String,
	pub now: OffsetDateTime,
}
