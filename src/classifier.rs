//! Chat table classification
//!
//! Table names are filtered permissively first; the structural check in
//! [`validate`] then weeds out tables that are empty or carry no message-like
//! column.

use tracing::{debug, info};

use crate::error::Result;
use crate::gateway::TableHandle;
use crate::schema::SchemaRules;

const CHAT_PREFIXES: [&str; 3] = ["chat_", "chatroom_", "message_"];

/// Whether `name` looks like a table of chat messages.
#[must_use]
pub fn is_chat_table_name(name: &str) -> bool {
    let lower = name.to_lowercase();

    CHAT_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        || lower == "chat"
        || is_numbered_chat(&lower)
        || (lower.contains("chat") && lower.contains("room"))
}

// chat<digits>, e.g. chat42
fn is_numbered_chat(lower: &str) -> bool {
    lower
        .strip_prefix("chat")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Sort key: `chat_` tables first, then by lowercase name.
#[must_use]
pub fn sort_key(name: &str) -> (bool, String) {
    let lower = name.to_lowercase();
    (!lower.starts_with("chat_"), lower)
}

/// Chat tables among `tables`, in processing order.
#[must_use]
pub fn find_chat_tables(tables: &[String]) -> Vec<String> {
    let mut chat_tables: Vec<String> = tables.iter().filter(|name| is_chat_table_name(name)).cloned().collect();
    chat_tables.sort_by_cached_key(|name| sort_key(name));
    chat_tables
}

/// Outcome of the structural check for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableValidation {
    /// Whether the table should be extracted
    pub valid: bool,
    /// Lowercased column names in declaration order
    pub columns: Vec<String>,
    /// Rows in the table
    pub row_count: u64,
}

/// Check that `table` has rows and at least one message-like column.
///
/// Any single signal qualifies the table; see the rule table for the
/// fragments. Fails with a schema error if the metadata cannot be read.
pub fn validate<H: TableHandle + ?Sized>(handle: &H, table: &str, rules: &SchemaRules) -> Result<TableValidation> {
    let columns: Vec<String> = handle.table_columns(table)?.iter().map(|c| c.to_lowercase()).collect();
    let row_count = handle.row_count(table)?;

    if row_count == 0 {
        debug!("Table {} has no rows", table);
        return Ok(TableValidation {
            valid: false,
            columns,
            row_count,
        });
    }

    let has_any = |fragments: &[String]| {
        columns
            .iter()
            .any(|column| fragments.iter().any(|fragment| column.contains(fragment.as_str())))
    };
    let has_msg_id = has_any(&rules.signals.message_id);
    let has_time = has_any(&rules.signals.time);
    let has_content = has_any(&rules.signals.content);
    let valid = has_msg_id || has_time || has_content;

    if valid {
        info!("Table {} qualifies with {} row(s)", table, row_count);
    } else {
        debug!(
            table,
            has_msg_id,
            has_time,
            has_content,
            columns = ?columns,
            "Table has no message-like column"
        );
    }

    Ok(TableValidation {
        valid,
        columns,
        row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::models::RawRow;
    use mockall::mock;

    mock! {
        Handle {}
        impl TableHandle for Handle {
            fn list_tables(&self) -> Result<Vec<String>>;
            fn table_columns(&self, table: &str) -> Result<Vec<String>>;
            fn row_count(&self, table: &str) -> Result<u64>;
            fn fetch_rows(&self, table: &str, columns: &[String], offset: u64, limit: u64) -> Result<Vec<RawRow>>;
            fn close(&mut self);
        }
    }

    fn rules() -> SchemaRules {
        SchemaRules::builtin().expect("builtin rules")
    }

    fn handle_with(columns: &[&str], rows: u64) -> MockHandle {
        let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
        let mut handle = MockHandle::new();
        handle.expect_table_columns().returning(move |_| Ok(columns.clone()));
        handle.expect_row_count().returning(move |_| Ok(rows));
        handle
    }

    #[test]
    fn test_numbered_chat() {
        assert!(is_numbered_chat("chat42"));
        assert!(!is_numbered_chat("chat"));
        assert!(!is_numbered_chat("chat4x"));
    }

    #[test]
    fn test_validate_lowercases_columns() {
        let handle = handle_with(&["MesLocalID", "MsgCreateTime"], 5);
        let result = validate(&handle, "Chat_1", &rules()).expect("validation");
        assert!(result.valid);
        assert_eq!(result.columns, ["meslocalid", "msgcreatetime"]);
        assert_eq!(result.row_count, 5);
    }

    #[test]
    fn test_validate_empty_table_is_invalid() {
        let handle = handle_with(&["MesLocalID", "MsgCreateTime", "MsgContent"], 0);
        let result = validate(&handle, "Chat_1", &rules()).expect("validation");
        assert!(!result.valid);
    }

    #[test]
    fn test_validate_single_signal_is_enough() {
        let handle = handle_with(&["id", "payload_time"], 1);
        assert!(validate(&handle, "chat", &rules()).expect("validation").valid);

        let handle = handle_with(&["id", "body_msg"], 1);
        assert!(validate(&handle, "chat", &rules()).expect("validation").valid);
    }

    #[test]
    fn test_validate_without_signals_is_invalid() {
        let handle = handle_with(&["usrname", "nickname"], 10);
        assert!(!validate(&handle, "ChatRoom", &rules()).expect("validation").valid);
    }

    #[test]
    fn test_validate_propagates_schema_error() {
        let mut handle = MockHandle::new();
        handle.expect_table_columns().returning(|table| {
            Err(ExtractError::Schema {
                table: table.to_string(),
                reason: "no such table".to_string(),
            })
        });
        let err = validate(&handle, "Chat_9", &rules()).expect_err("schema error");
        assert!(matches!(err, ExtractError::Schema { .. }));
    }
}
