use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use mnemo_storage::models::{Message, Role};

use crate::{AgentService, Error, Result};

#[derive(Clone, Debug)]
pub struct HistoryRequest {
	pub token: String,
	pub conversation_id: Uuid,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageItem {
	pub message_id: Uuid,
	pub role: Role,
	pub content: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<Message> for MessageItem {
	fn from(message: Message) -> Self {
		Self {
			message_id: message.message_id,
			role: message.role,
			content: message.content,
			created_at: message.created_at,
		}
	}
}

impl AgentService {
	/// Transcript of a conversation in turn order. Only its owner may read it.
	pub async fn history(&self, req: HistoryRequest) -> Result<Vec<MessageItem>> {
		let session = self.verify_session(&req.token)?;
		let Some(conversation) =
			self.stores.conversations.get_conversation(req.conversation_id).await?
		else {
			return Err(Error::NotFound { message: "Conversation does not exist.".to_string() });
		};

		if conversation.user_id != session.user_id {
			return Err(Error::Forbidden {
				message: "Conversation belongs to another user.".to_string(),
			});
		}

		let messages = self.stores.conversations.list_messages(req.conversation_id).await?;

		Ok(messages.into_iter().map(MessageItem::from).collect())
	}
}
