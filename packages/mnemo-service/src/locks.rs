use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutexes, one per conversation with a turn in flight.
#[derive(Default)]
pub(crate) struct TurnLocks {
	slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}
impl TurnLocks {
	pub(crate) async fn acquire(&self, conversation_id: Uuid) -> OwnedMutexGuard<()> {
		let slot = {
			let mut slots = match self.slots.lock() {
				Ok(slots) => slots,
				Err(poisoned) => poisoned.into_inner(),
			};

			// Drop idle slots so the map only holds conversations that are busy.
			slots.retain(|_, slot| Arc::strong_count(slot) > 1);

			slots.entry(conversation_id).or_default().clone()
		};

		slot.lock_owned().await
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.slots.lock().map(|slots| slots.len()).unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn idle_slots_are_pruned() {
		let locks = TurnLocks::default();
		let first = Uuid::new_v4();
		let second = Uuid::new_v4();

		drop(locks.acquire(first).await);

		let _guard = locks.acquire(second).await;

		assert_eq!(locks.len(), 1);
	}

	#[tokio::test]
	async fn same_conversation_waits_for_the_holder() {
		let locks = Arc::new(TurnLocks::default());
		let conversation_id = Uuid::new_v4();
		let guard = locks.acquire(conversation_id).await;
		let waiter = {
			let locks = locks.clone();

			tokio::spawn(async move {
				let _guard = locks.acquire(conversation_id).await;
			})
		};

		tokio::task::yield_now().await;

		assert!(!waiter.is_finished());

		drop(guard);
		waiter.await.expect("Waiter task failed.");
	}
}
