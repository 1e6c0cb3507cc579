//! Queue vocabulary: families, roles, job kinds, and job states.

use serde::{Deserialize, Serialize};

/// The two parallel, independently keyed instances of the queue shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueFamily {
    Regular,
    Watchlist,
}

impl QueueFamily {
    pub const ALL: [QueueFamily; 2] = [QueueFamily::Regular, QueueFamily::Watchlist];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueFamily::Regular => "regular",
            QueueFamily::Watchlist => "watchlist",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "regular" => Some(QueueFamily::Regular),
            "watchlist" => Some(QueueFamily::Watchlist),
            _ => None,
        }
    }

    /// The other family. A page id may be pending in at most one family, so
    /// duplicate checks look at both sides.
    #[must_use]
    pub fn sibling(self) -> Self {
        match self {
            QueueFamily::Regular => QueueFamily::Watchlist,
            QueueFamily::Watchlist => QueueFamily::Regular,
        }
    }
}

impl std::fmt::Display for QueueFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue role within a family: the priority set of brands awaiting work, or
/// the list of brands that errored and await operator triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueRole {
    Pending,
    Failed,
}

impl QueueRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QueueRole::Pending => "pending",
            QueueRole::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(QueueRole::Pending),
            "failed" => Some(QueueRole::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two job-queue backends sharing the same sub-collection shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    BrandProcessing,
    AdUpdate,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::BrandProcessing, JobKind::AdUpdate];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::BrandProcessing => "brand-processing",
            JobKind::AdUpdate => "ad-update",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "brand-processing" => Some(JobKind::BrandProcessing),
            "ad-update" | "ad-indexing" => Some(JobKind::AdUpdate),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciled status of a job across the backend's sub-collections.
///
/// A job id should live in exactly one sub-collection; when it shows up in
/// several (a backend anomaly, not a normal state), [`JobState::precedence`]
/// decides deterministically which one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Prioritized,
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    /// Refresh order matters nowhere; precedence does. Fixed rule:
    /// delayed > failed > completed > prioritized > waiting > active.
    pub const ALL: [JobState; 6] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Prioritized,
        JobState::Delayed,
        JobState::Completed,
        JobState::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Prioritized => "prioritized",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Higher wins when a job id appears in more than one sub-collection.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            JobState::Active => 0,
            JobState::Waiting => 1,
            JobState::Prioritized => 2,
            JobState::Completed => 3,
            JobState::Failed => 4,
            JobState::Delayed => 5,
        }
    }

    /// Backend key segments holding this sub-collection. "waiting" exists
    /// under two legacy names that must be unioned on read.
    #[must_use]
    pub fn key_segments(self) -> &'static [&'static str] {
        match self {
            JobState::Waiting => &["wait", "waiting"],
            JobState::Active => &["active"],
            JobState::Prioritized => &["prioritized"],
            JobState::Delayed => &["delayed"],
            JobState::Completed => &["completed"],
            JobState::Failed => &["failed"],
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_outranks_everything() {
        for state in JobState::ALL {
            if state != JobState::Delayed {
                assert!(JobState::Delayed.precedence() > state.precedence());
            }
        }
    }

    #[test]
    fn failed_outranks_waiting_and_active() {
        assert!(JobState::Failed.precedence() > JobState::Waiting.precedence());
        assert!(JobState::Failed.precedence() > JobState::Active.precedence());
        assert!(JobState::Failed.precedence() > JobState::Completed.precedence());
    }

    #[test]
    fn waiting_unions_both_legacy_key_names() {
        assert_eq!(JobState::Waiting.key_segments(), &["wait", "waiting"]);
        assert_eq!(JobState::Failed.key_segments(), &["failed"]);
    }

    #[test]
    fn family_sibling_is_involutive() {
        assert_eq!(QueueFamily::Regular.sibling(), QueueFamily::Watchlist);
        assert_eq!(QueueFamily::Watchlist.sibling(), QueueFamily::Regular);
        for family in QueueFamily::ALL {
            assert_eq!(family.sibling().sibling(), family);
        }
    }

    #[test]
    fn job_kind_parse_accepts_indexing_alias() {
        assert_eq!(JobKind::parse("ad-indexing"), Some(JobKind::AdUpdate));
        assert_eq!(
            JobKind::parse("brand-processing"),
            Some(JobKind::BrandProcessing)
        );
        assert_eq!(JobKind::parse("unknown"), None);
    }
}
