//! JSON output formatting for offline-ledger.

use serde::Serialize;
use serde_json::json;

use crate::error::LedgerError;

/// Format a list with its count under a label.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_list_json<T: Serialize>(label: &str, items: &[T]) -> Result<String, LedgerError> {
    let output = json!({
        "list": label,
        "count": items.len(),
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, LedgerError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::{MutationAction, MutationPayload, QueueItem};

    #[test]
    fn test_format_list_json() {
        let item = QueueItem::new(
            MutationAction::CreateTransaction,
            MutationPayload::new(json!({"amount": 5.0})),
            3,
        );
        let output = format_list_json("queue", &[item]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["list"], "queue");
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["items"][0]["action"], "CREATE_TRANSACTION");
        assert_eq!(parsed["items"][0]["retry_count"], 0);
    }

    #[test]
    fn test_empty_list_json() {
        let output = format_list_json::<QueueItem>("dead_letters", &[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 0);
        assert!(parsed["items"].as_array().unwrap().is_empty());
    }
}
