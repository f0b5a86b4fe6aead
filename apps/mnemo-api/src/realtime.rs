//! Websocket channel delivering turn output to per-user rooms.
//!
//! A client sends `{"type":"join","token":...}` to subscribe to its user's room, then
//! `{"type":"message",...}` events to run turns. Replies go to every connection in the room.
//! Failed turns emit nothing.

use std::{collections::HashMap, sync::Mutex};

use axum::{
	extract::{
		State,
		ws::{Message, WebSocket, WebSocketUpgrade},
	},
	response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
	sync::{broadcast, mpsc},
	task::JoinHandle,
};
use uuid::Uuid;

use mnemo_service::{Error, Result, TurnRequest, TurnResponse};

use crate::state::AppState;

const ROOM_CAPACITY: usize = 64;

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
	Join { token: String },
	Message(MessageEvent),
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageEvent {
	pub text: String,
	pub token: String,
	#[serde(default)]
	pub user_id: Option<i64>,
	#[serde(default)]
	pub conversation_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
	Reply { text: String, conversation_id: Uuid },
}

/// One broadcast channel per user with at least one joined connection.
#[derive(Default)]
pub struct Rooms {
	senders: Mutex<HashMap<i64, broadcast::Sender<Outbound>>>,
}
impl Rooms {
	pub fn subscribe(&self, user_id: i64) -> broadcast::Receiver<Outbound> {
		let mut senders = match self.senders.lock() {
			Ok(senders) => senders,
			Err(poisoned) => poisoned.into_inner(),
		};

		senders.retain(|_, sender| sender.receiver_count() > 0);

		senders.entry(user_id).or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0).subscribe()
	}

	/// Returns how many connections received the event.
	pub fn publish(&self, user_id: i64, event: Outbound) -> usize {
		let mut senders = match self.senders.lock() {
			Ok(senders) => senders,
			Err(poisoned) => poisoned.into_inner(),
		};
		let Some(sender) = senders.get(&user_id) else { return 0 };

		if sender.receiver_count() == 0 {
			senders.remove(&user_id);

			return 0;
		}

		sender.send(event).unwrap_or(0)
	}

	pub fn room_count(&self) -> usize {
		match self.senders.lock() {
			Ok(senders) => senders.len(),
			Err(poisoned) => poisoned.into_inner().len(),
		}
	}
}

pub async fn ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Verifies the join token and subscribes to that user's room.
pub fn join(state: &AppState, token: &str) -> Result<(i64, broadcast::Receiver<Outbound>)> {
	let session = state.service.verify_session(token)?;

	Ok((session.user_id, state.rooms.subscribe(session.user_id)))
}

/// Runs the turn carried by a message event and publishes the reply to the sender's room.
pub async fn handle_message(state: &AppState, event: MessageEvent) -> Result<TurnResponse> {
	let session = state.service.verify_session(&event.token)?;

	if event.user_id.is_some_and(|user_id| user_id != session.user_id) {
		return Err(Error::Unauthorized {
			message: "user_id does not match the token.".to_string(),
		});
	}

	let response = state
		.service
		.run_turn(TurnRequest {
			user_id: session.user_id,
			conversation_id: event.conversation_id,
			text: event.text,
		})
		.await?;
	let delivered = state.rooms.publish(
		session.user_id,
		Outbound::Reply {
			text: response.response.clone(),
			conversation_id: response.conversation_id,
		},
	);

	tracing::debug!(user_id = session.user_id, delivered, "Reply published.");

	Ok(response)
}

async fn handle_socket(socket: WebSocket, state: AppState) {
	let (mut sink, mut stream) = socket.split();
	let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
	let mut send_task = tokio::spawn(async move {
		while let Some(event) = outbound_rx.recv().await {
			let json = match serde_json::to_string(&event) {
				Ok(json) => json,
				Err(err) => {
					tracing::error!(error = %err, "Failed to encode realtime event.");

					continue;
				},
			};

			if sink.send(Message::Text(json.into())).await.is_err() {
				break;
			}
		}
	});
	let mut recv_task = tokio::spawn(async move {
		let mut room: Option<JoinHandle<()>> = None;

		while let Some(Ok(message)) = stream.next().await {
			let text = match message {
				Message::Text(text) => text,
				Message::Close(_) => break,
				_ => continue,
			};

			match serde_json::from_str::<Inbound>(text.as_str()) {
				Ok(Inbound::Join { token }) => match join(&state, &token) {
					Ok((user_id, rx)) => {
						if let Some(previous) = room.take() {
							previous.abort();
						}

						room = Some(tokio::spawn(forward(rx, outbound_tx.clone())));

						tracing::info!(user_id, "Realtime client joined.");
					},
					Err(err) => tracing::warn!(error = %err, "Realtime join rejected."),
				},
				Ok(Inbound::Message(event)) =>
					if let Err(err) = handle_message(&state, event).await {
						tracing::warn!(error = %err, "Realtime turn failed.");
					},
				Err(err) => tracing::debug!(error = %err, "Ignoring malformed realtime event."),
			}
		}

		if let Some(room) = room {
			room.abort();
		}
	});

	tokio::select! {
		_ = &mut recv_task => send_task.abort(),
		_ = &mut send_task => recv_task.abort(),
	}

	tracing::info!("Realtime client left.");
}

async fn forward(mut rx: broadcast::Receiver<Outbound>, outbound: mpsc::UnboundedSender<Outbound>) {
	loop {
		match rx.recv().await {
			Ok(event) =>
				if outbound.send(event).is_err() {
					break;
				},
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Realtime client lagged behind its room.");
			},
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inbound_events_decode_by_type() {
		let join: Inbound =
			serde_json::from_str(r#"{"type":"join","token":"t"}"#).expect("Failed to decode join.");

		assert!(matches!(join, Inbound::Join { token } if token == "t"));

		let message: Inbound =
			serde_json::from_str(r#"{"type":"message","text":"hi","user_id":3,"token":"t"}"#)
				.expect("Failed to decode message.");

		match message {
			Inbound::Message(event) => {
				assert_eq!(event.user_id, Some(3));
				assert_eq!(event.conversation_id, None);
			},
			other => panic!("Unexpected event: {other:?}"),
		}
	}

	#[test]
	fn reply_encodes_with_type_tag() {
		let conversation_id = Uuid::nil();
		let json = serde_json::to_value(Outbound::Reply { text: "ok".to_string(), conversation_id })
			.expect("Failed to encode reply.");

		assert_eq!(json["type"], "reply");
		assert_eq!(json["text"], "ok");
		assert_eq!(json["conversation_id"], conversation_id.to_string());
	}

	#[test]
	fn rooms_are_isolated_per_user() {
		let rooms = Rooms::default();
		let mut ada = rooms.subscribe(1);
		let mut bob = rooms.subscribe(2);
		let event = Outbound::Reply { text: "hi".to_string(), conversation_id: Uuid::nil() };

		assert_eq!(rooms.publish(1, event.clone()), 1);
		assert_eq!(ada.try_recv().expect("Ada must receive the reply."), event);
		assert!(bob.try_recv().is_err());
		assert_eq!(rooms.publish(3, event), 0);
	}

	#[test]
	fn publishing_to_a_deserted_room_drops_it() {
		let rooms = Rooms::default();
		let ada = rooms.subscribe(1);
		let event = Outbound::Reply { text: "hi".to_string(), conversation_id: Uuid::nil() };

		assert_eq!(rooms.room_count(), 1);

		drop(ada);

		assert_eq!(rooms.publish(1, event.clone()), 0);
		assert_eq!(rooms.room_count(), 0);

		let mut ada = rooms.subscribe(1);

		assert_eq!(rooms.publish(1, event.clone()), 1);
		assert_eq!(ada.try_recv().expect("Ada must receive the reply."), event);
	}
}
