use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use mnemo_storage::models::Note;

use crate::{AgentService, Error, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct NotesRequest {
	pub token: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NoteItem {
	pub note_id: Uuid,
	pub content: String,
	pub has_embedding: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<Note> for NoteItem {
	fn from(note: Note) -> Self {
		Self {
			note_id: note.note_id,
			has_embedding: note.embedding.is_some(),
			content: note.content,
			created_at: note.created_at,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct NoteSearchRequest {
	pub token: String,
	pub query: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NoteSearchItem {
	pub note_id: Uuid,
	pub content: String,
	pub score: f32,
}

impl AgentService {
	/// Every note of the token's user, oldest first, including notes saved without an embedding.
	pub async fn list_notes(&self, req: NotesRequest) -> Result<Vec<NoteItem>> {
		let session = self.verify_session(&req.token)?;
		let notes = self.stores.notes.list_notes(session.user_id).await?;

		Ok(notes.into_iter().map(NoteItem::from).collect())
	}

	/// Ranks the token's notes against `query` with the same settings as turn retrieval.
	pub async fn search_notes(&self, req: NoteSearchRequest) -> Result<Vec<NoteSearchItem>> {
		let session = self.verify_session(&req.token)?;

		if req.query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let ranked = self.rank_notes(session.user_id, &req.query).await?;

		Ok(ranked
			.into_iter()
			.map(|ranked| NoteSearchItem {
				note_id: ranked.item.note_id,
				content: ranked.item.content,
				score: ranked.score,
			})
			.collect())
	}
}
