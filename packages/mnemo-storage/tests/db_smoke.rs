use time::OffsetDateTime;
use uuid::Uuid;

use mnemo_config::Postgres;
use mnemo_storage::{
	ConversationStore, Error, MemoryStore, UserStore,
	db::Db,
	models::{NewNote, NewTurn, NewUser, Role},
};
use mnemo_testkit::TestDatabase;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MNEMO_PG_DSN to run."]
async fn db_connects_and_bootstraps_twice() {
	let Some(base_dsn) = mnemo_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps_twice; set MNEMO_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	db.ensure_schema().await.expect("Schema bootstrap must be idempotent.");

	for table in ["users", "notes", "conversations", "messages"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "Missing table {table}.");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MNEMO_PG_DSN to run."]
async fn turn_round_trip_preserves_order_and_embeddings() {
	let Some(base_dsn) = mnemo_testkit::env_dsn() else {
		eprintln!("Skipping turn_round_trip_preserves_order_and_embeddings; set MNEMO_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let user = db
		.create_user(NewUser {
			email: "ada@example.com".to_string(),
			password_hash: "pbkdf2:1:00:00".to_string(),
		})
		.await
		.expect("Failed to create user.");
	let duplicate = db
		.create_user(NewUser {
			email: "ada@example.com".to_string(),
			password_hash: "pbkdf2:1:00:00".to_string(),
		})
		.await;

	assert!(matches!(duplicate, Err(Error::Conflict(_))));

	let now = OffsetDateTime::now_utc();
	let first = db.find_or_create_default(user.user_id, now).await.expect("create failed");
	let second = db.find_or_create_default(user.user_id, now).await.expect("lookup failed");

	assert_eq!(first.conversation_id, second.conversation_id);

	db.append_turn(NewTurn {
		conversation_id: first.conversation_id,
		user_text: "remember to call mom".to_string(),
		assistant_text: "saved".to_string(),
		now,
	})
	.await
	.expect("append failed");

	let messages = db.list_messages(first.conversation_id).await.expect("list failed");

	assert_eq!(messages.len(), 2);
	assert_eq!(messages[0].role, Role::User);
	assert_eq!(messages[1].role, Role::Assistant);

	let orphan = db
		.append_turn(NewTurn {
			conversation_id: Uuid::new_v4(),
			user_text: "hi".to_string(),
			assistant_text: "hello".to_string(),
			now,
		})
		.await;

	assert!(matches!(orphan, Err(Error::NotFound(_))));

	db.insert_note(NewNote {
		user_id: user.user_id,
		content: "call mom".to_string(),
		embedding: Some(vec![0.25, 0.5]),
		created_at: now,
	})
	.await
	.expect("insert failed");
	db.insert_note(NewNote {
		user_id: user.user_id,
		content: "unindexed".to_string(),
		embedding: None,
		created_at: now,
	})
	.await
	.expect("insert failed");

	let notes = db.list_notes(user.user_id).await.expect("list failed");

	assert_eq!(notes.len(), 2);
	assert!(notes.iter().any(|note| note.embedding.as_deref() == Some("[0.25,0.5]")));
	assert!(notes.iter().any(|note| note.embedding.is_none()));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
