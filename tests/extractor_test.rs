//! Orchestrator scenarios over the in-memory gateway

mod common;

use chatdb_extract::extractor::{CancellationFlag, DatabaseStatus, ExtractionOptions, Extractor};
use chatdb_extract::schema::SchemaRules;
use serde_json::Value;

use common::{chat_table, descriptor, int, text, MemoryDatabase, MemoryGateway, MemoryTable};

fn rules() -> SchemaRules {
    SchemaRules::builtin().unwrap()
}

fn options(batch_size: u64) -> ExtractionOptions {
    ExtractionOptions {
        batch_size,
        progress_interval: 2,
        priority_database_type: "Message".to_string(),
    }
}

#[test]
fn test_chat_table_yields_one_record_per_row() {
    let gateway = MemoryGateway::new().with_database(
        "/data/Message/msg_0.db",
        MemoryDatabase::new()
            .with_table("Friend", MemoryTable::new(&["uid", "name"], vec![vec![int(1), text("a")]]))
            .with_table("Chat_100", chat_table(3)),
    );
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/msg_0.db")]);

    assert!(!outcome.cancelled);
    assert_eq!(outcome.messages.len(), 3);
    for (i, record) in outcome.messages.iter().enumerate() {
        let id = Value::from(i as i64 + 1);
        assert_eq!(record.sender.as_ref(), Some(&id));
        assert_eq!(record.message_id.as_ref(), Some(&id));
        assert_eq!(record.content, Some(Value::from(format!("message {}", i + 1))));
        assert!(record.timestamp.as_deref().is_some_and(|ts| ts.starts_with("2023-11-1")));
        assert_eq!(record.timestamp_raw, Some(Value::from(1_700_000_000 + i as i64 + 1)));
        assert_eq!(record.table_name, "Chat_100");
        assert_eq!(record.database_type, "Message");
        assert!(record.extra.is_empty());
    }

    assert_eq!(outcome.databases.len(), 1);
    assert_eq!(outcome.databases[0].status, DatabaseStatus::Extracted);
    assert_eq!(outcome.databases[0].tables_extracted, 1);
    assert_eq!(
        gateway.events(),
        ["open:/data/Message/msg_0.db", "close:/data/Message/msg_0.db"]
    );
}

#[test]
fn test_database_without_chat_tables_does_not_affect_the_next() {
    let gateway = MemoryGateway::new()
        .with_database(
            "/data/Message/contacts.db",
            MemoryDatabase::new().with_table("Contacts", MemoryTable::new(&["id"], vec![vec![int(1)]])),
        )
        .with_database("/data/Message/msg_1.db", MemoryDatabase::new().with_table("Chat_a", chat_table(2)));
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[
        descriptor("/data/Message/contacts.db"),
        descriptor("/data/Message/msg_1.db"),
    ]);

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.databases[0].status, DatabaseStatus::NoChatTables);
    assert_eq!(outcome.databases[1].status, DatabaseStatus::Extracted);
    assert!(outcome.messages.iter().all(|r| r.database_path == "/data/Message/msg_1.db"));
    assert_eq!(gateway.events().iter().filter(|e| e.starts_with("close:")).count(), 2);
}

#[test]
fn test_connection_failure_skips_only_that_database() {
    let gateway = MemoryGateway::new()
        .with_database("/data/Message/a.db", MemoryDatabase::unreachable())
        .with_database("/data/Message/b.db", MemoryDatabase::new().with_table("Chat_b", chat_table(4)));
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/a.db"), descriptor("/data/Message/b.db")]);

    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(outcome.databases[0].status, DatabaseStatus::Failed);
    assert!(outcome.databases[0].error.as_deref().is_some_and(|e| e.contains("a.db")));
    assert_eq!(outcome.processed_databases(), 1);
    assert_eq!(gateway.events(), ["open:/data/Message/b.db", "close:/data/Message/b.db"]);
}

#[test]
fn test_fetch_failure_keeps_rows_read_so_far() {
    let gateway = MemoryGateway::new().with_database(
        "/data/Message/msg_0.db",
        MemoryDatabase::new()
            .with_table("Chat_broken", chat_table(5).failing_at(4))
            .with_table("Chat_ok", chat_table(1)),
    );
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(2));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/msg_0.db")]);

    let broken = outcome.messages.iter().filter(|r| r.table_name == "Chat_broken").count();
    let ok = outcome.messages.iter().filter(|r| r.table_name == "Chat_ok").count();
    assert_eq!(broken, 4);
    assert_eq!(ok, 1);
    assert_eq!(outcome.databases[0].tables_failed, 1);
    assert_eq!(outcome.databases[0].tables_extracted, 1);
}

#[test]
fn test_pagination_stops_on_empty_batch() {
    let gateway =
        MemoryGateway::new().with_database("/data/Message/m.db", MemoryDatabase::new().with_table("Chat_x", chat_table(5)));
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(2));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/m.db")]);

    assert_eq!(outcome.messages.len(), 5);
    // offsets 0, 2, 4 and the empty read at 5
    assert_eq!(gateway.fetch_count(), 4);
    let ids: Vec<_> = outcome.messages.iter().filter_map(|r| r.message_id.clone()).collect();
    assert_eq!(ids, (1..=5).map(Value::from).collect::<Vec<_>>());
}

#[test]
fn test_unqualified_tables_are_skipped() {
    let gateway = MemoryGateway::new().with_database(
        "/data/Message/m.db",
        MemoryDatabase::new()
            .with_table("Chat_empty", MemoryTable::new(&["MesLocalID", "MsgContent"], vec![]))
            .with_table("Chat_meta", MemoryTable::new(&["a", "b"], vec![vec![int(1), int(2)]]))
            .with_table("Chat_gone", chat_table(2).broken())
            .with_table("Chat_real", chat_table(2)),
    );
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/m.db")]);

    assert_eq!(outcome.messages.len(), 2);
    assert!(outcome.messages.iter().all(|r| r.table_name == "Chat_real"));
    let summary = &outcome.databases[0];
    assert_eq!(summary.tables_skipped, 2);
    assert_eq!(summary.tables_failed, 1);
    assert_eq!(summary.tables_extracted, 1);
}

#[test]
fn test_message_databases_are_processed_first() {
    let gateway = MemoryGateway::new()
        .with_database("/data/Group/g.db", MemoryDatabase::new().with_table("Chat_g", chat_table(1)))
        .with_database("/data/Message/m.db", MemoryDatabase::new().with_table("Chat_m", chat_table(1)));
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[descriptor("/data/Group/g.db"), descriptor("/data/Message/m.db")]);

    let types: Vec<_> = outcome.messages.iter().map(|r| r.database_type.as_str()).collect();
    assert_eq!(types, ["Message", "Group"]);
}

#[test]
fn test_passthrough_columns_are_kept() {
    let gateway = MemoryGateway::new().with_database(
        "/data/Message/m.db",
        MemoryDatabase::new().with_table(
            "Chat_p",
            MemoryTable::new(
                &["MesLocalID", "MsgContent", "MsgStatus", "rowid"],
                vec![vec![int(7), text("hi"), int(2), int(99)]],
            ),
        ),
    );
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let outcome = extractor.extract_all(&[descriptor("/data/Message/m.db")]);

    let record = &outcome.messages[0];
    assert_eq!(record.extra.get("msgstatus"), Some(&Value::from(2)));
    assert!(!record.extra.contains_key("rowid"));
}

#[test]
fn test_cancellation_before_start_visits_nothing() {
    let gateway =
        MemoryGateway::new().with_database("/data/Message/m.db", MemoryDatabase::new().with_table("Chat_m", chat_table(3)));
    let rules = rules();
    let cancel = CancellationFlag::new();
    cancel.raise();
    let extractor = Extractor::new(&gateway, &rules, options(1000)).with_cancellation(cancel);

    let outcome = extractor.extract_all(&[descriptor("/data/Message/m.db")]);

    assert!(outcome.cancelled);
    assert!(outcome.messages.is_empty());
    assert!(gateway.events().is_empty());
}

#[test]
fn test_cancellation_between_batches_keeps_collected_rows() {
    let cancel = CancellationFlag::new();
    let gateway = MemoryGateway::new()
        .with_database("/data/Message/a.db", MemoryDatabase::new().with_table("Chat_a", chat_table(5)))
        .with_database("/data/Message/b.db", MemoryDatabase::new().with_table("Chat_b", chat_table(5)))
        .cancel_after_fetches(cancel.clone(), 2);
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1)).with_cancellation(cancel);

    let outcome = extractor.extract_all(&[descriptor("/data/Message/a.db"), descriptor("/data/Message/b.db")]);

    assert!(outcome.cancelled);
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.databases.len(), 1);
    assert_eq!(outcome.databases[0].status, DatabaseStatus::Cancelled);
    assert_eq!(gateway.events(), ["open:/data/Message/a.db", "close:/data/Message/a.db"]);
}

#[test]
fn test_report_counts_match_outcome() {
    let gateway =
        MemoryGateway::new().with_database("/data/Message/m.db", MemoryDatabase::new().with_table("Chat_m", chat_table(3)));
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let report = extractor
        .extract_all(&[descriptor("/data/Message/m.db")])
        .into_report(1, "keys.txt");

    assert_eq!(report.metadata.total_messages, 3);
    assert_eq!(report.metadata.total_databases, 1);
    assert_eq!(report.metadata.source_key_file, "keys.txt");
}

#[test]
fn test_discover_reports_tables_without_reading_rows() {
    let gateway = MemoryGateway::new()
        .with_database("/data/Message/down.db", MemoryDatabase::unreachable())
        .with_database(
            "/data/Message/m.db",
            MemoryDatabase::new()
                .with_table("chatroom_1", chat_table(1))
                .with_table("Chat_z", chat_table(2))
                .with_table("Friend", MemoryTable::new(&["id"], vec![])),
        );
    let rules = rules();
    let extractor = Extractor::new(&gateway, &rules, options(1000));

    let discoveries = extractor.discover(&[descriptor("/data/Message/down.db"), descriptor("/data/Message/m.db")], true);

    assert!(!discoveries[0].connected);
    assert!(discoveries[0].error.is_some());

    let found = &discoveries[1];
    assert!(found.connected);
    assert_eq!(found.tables.len(), 3);
    let names: Vec<_> = found.chat_tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Chat_z", "chatroom_1"]);
    assert_eq!(found.chat_tables[0].validation.as_ref().map(|v| v.row_count), Some(2));
    assert_eq!(found.table_summaries("2024-01-01T00:00:00").len(), 2);

    assert_eq!(gateway.fetch_count(), 0);
}
