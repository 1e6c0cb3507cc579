//! Serialized member format shared by the pending set and failed list.

use serde::{Deserialize, Serialize};

use crate::QueueError;

/// One queued brand. The serialized JSON form is the sorted-set member /
/// list element; field order is fixed by the struct so the same entry always
/// serializes to the same member string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub brand_id: i64,
    pub page_id: String,
}

impl QueueEntry {
    #[must_use]
    pub fn new(brand_id: i64, page_id: impl Into<String>) -> Self {
        Self {
            brand_id,
            page_id: page_id.into(),
        }
    }

    /// Serialized member string stored in Redis.
    #[must_use]
    pub fn to_member(&self) -> String {
        // A two-field struct of plain types cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a raw member back into an entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Parse`] when the member is not the expected
    /// schema — the signal the corrupted-entry cleanup keys off.
    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::Parse(format!("{raw:?}: {e}")))
    }
}
