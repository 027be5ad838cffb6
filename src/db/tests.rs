use chrono::Utc;

use super::Database;
use crate::extraction::ExtractedSignal;
use crate::models::{ChatKind, CopySetupConfig, GeneratedBy, ReplyAction, Side};

#[tokio::test]
async fn upserting_the_same_chat_room_twice_returns_one_row() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let a = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    let b = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    assert_eq!(a.id, b.id);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn message_is_uniquely_keyed_by_chat_and_external_id() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let room = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    tx.insert_message(room.id, "msg-1", "hello there", Utc::now())
        .await
        .unwrap();
    let fetched = tx
        .get_message_by_external_id(room.id, "msg-1")
        .await
        .unwrap()
        .expect("message exists");
    assert_eq!(fetched.text, "hello there");
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn signal_round_trips_through_storage() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let room = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    let message = tx
        .insert_message(room.id, "msg-1", "BUY EURUSD @ 1.10 TP 1.11 SL 1.09", Utc::now())
        .await
        .unwrap();
    let extracted = ExtractedSignal {
        symbol: "EURUSD".to_string(),
        side: Side::Buy,
        entries: vec![1.10],
        tps: vec![1.11],
        sl: 1.09,
    };
    let signal = tx.insert_signal(message.id, &extracted).await.unwrap();
    tx.link_message_to_signal(message.id, signal.id).await.unwrap();

    let fetched = tx.get_signal(signal.id).await.unwrap().expect("signal exists");
    assert_eq!(fetched.symbol, "EURUSD");
    assert_eq!(fetched.entries, vec![1.10]);

    let linked = tx.get_message_by_id(message.id).await.unwrap().unwrap();
    assert_eq!(linked.signal_id, Some(signal.id));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn signal_reply_round_trips_through_storage() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let room = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    let message = tx
        .insert_message(room.id, "msg-1", "BUY EURUSD @ 1.10 TP 1.11 SL 1.09", Utc::now())
        .await
        .unwrap();
    let extracted = ExtractedSignal {
        symbol: "EURUSD".to_string(),
        side: Side::Buy,
        entries: vec![1.10],
        tps: vec![1.11],
        sl: 1.09,
    };
    let signal = tx.insert_signal(message.id, &extracted).await.unwrap();

    let reply = tx
        .insert_signal_reply(ReplyAction::Close, GeneratedBy::Delete, None, signal.id, None)
        .await
        .unwrap();
    let fetched = tx.get_signal_reply(reply.id).await.unwrap().unwrap();
    assert_eq!(fetched.action, ReplyAction::Close);
    assert_eq!(fetched.generated_by, GeneratedBy::Delete);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn copy_setup_membership_and_allowed_symbols_merge() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let room = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();

    let mut config = CopySetupConfig::default();
    config.symbol_synonyms.insert(
        "XAUUSD".to_string(),
        ["GOLD".to_string()].into_iter().collect(),
    );
    tx.create_copy_setup("token-a", &config, &[room.id]).await.unwrap();

    assert!(tx.chat_has_active_copy_setup(room.id).await.unwrap());
    let setups = tx.copy_setups_for_chat_room(room.id).await.unwrap();
    assert_eq!(setups.len(), 1);

    let allowed = tx.allowed_symbols_map_for_chat(room.id).await.unwrap();
    assert_eq!(allowed.get("GOLD"), Some(&"XAUUSD".to_string()));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn chat_with_no_copy_setups_reports_inactive() {
    let db = Database::in_memory().await;
    let mut tx = db.begin().await.unwrap();
    let room = tx.upsert_chat_room("chat-1", ChatKind::Group, None, None).await.unwrap();
    assert!(!tx.chat_has_active_copy_setup(room.id).await.unwrap());
    tx.commit().await.unwrap();
}
