//! Undo log entries.
//!
//! Every entity mutation inside a block transaction appends one entry
//! describing how to reverse it; the variant names the action replay will
//! perform, not the mutation that produced it. Entries are stored in
//! mutation order and replayed in strict reverse order on revert, which
//! restores storage to the exact pre-block state even when a block touches
//! the same entity several times.

use serde::{Deserialize, Serialize};

/// The recorded inverse of one entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UndoOperation {
    /// Re-insert a deleted entity with its captured payload.
    Insert {
        collection: String,
        id: i64,
        data: serde_json::Value,
    },
    /// Restore an updated entity's previous payload.
    Update {
        collection: String,
        id: i64,
        data: serde_json::Value,
    },
    /// Remove an inserted entity.
    Delete { collection: String, id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_log_json_shape_is_stable() {
        let ops = vec![
            UndoOperation::Delete {
                collection: "transfers".into(),
                id: 1,
            },
            UndoOperation::Update {
                collection: "balances".into(),
                id: 7,
                data: serde_json::json!({"amount": "100"}),
            },
        ];

        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json[0]["op"], "delete");
        assert_eq!(json[1]["op"], "update");
        assert_eq!(json[1]["data"]["amount"], "100");

        let back: Vec<UndoOperation> = serde_json::from_value(json).unwrap();
        assert_eq!(back, ops);
    }
}
