use mnemo_domain::ranking::{self, Ranked};
use mnemo_storage::{models::Note, vector};

use crate::{AgentService, Result};

pub(crate) const CONTEXT_SEPARATOR: &str = " | ";

impl AgentService {
	/// Embeds `query` and ranks the user's notes against it with the configured `top_k` and
	/// threshold.
	pub(crate) async fn rank_notes(&self, user_id: i64, query: &str) -> Result<Vec<Ranked<Note>>> {
		let query_vec = self.embed_one(query).await?;
		let notes = self.stores.notes.list_notes(user_id).await?;
		let candidates = notes
			.into_iter()
			.map(|note| {
				let vec = stored_vector(&note);

				(note, vec)
			})
			.collect();

		Ok(ranking::rank(
			&query_vec,
			candidates,
			self.cfg.memory.top_k as usize,
			self.cfg.memory.similarity_threshold,
		))
	}

	/// The context fragment injected into the prompt. Empty when nothing qualifies.
	pub(crate) async fn retrieve_context(&self, user_id: i64, text: &str) -> Result<String> {
		let ranked = self.rank_notes(user_id, text).await?;

		tracing::debug!(user_id, notes = ranked.len(), "Context retrieved.");

		Ok(join_fragment(&ranked))
	}
}

pub(crate) fn join_fragment(ranked: &[Ranked<Note>]) -> String {
	ranked.iter().map(|ranked| ranked.item.content.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

fn stored_vector(note: &Note) -> Option<Vec<f32>> {
	let raw = note.embedding.as_deref()?;

	match vector::decode(raw) {
		Ok(vec) => Some(vec),
		Err(err) => {
			tracing::warn!(note_id = %note.note_id, error = %err, "Skipping undecodable note embedding.");

			None
		},
	}
}
