//! Pure per-stage status derivation.
//!
//! All four stages are computed independently from already-fetched rows; a
//! brand can be COMPLETED on scrape and FAILED on search-index at the same
//! time, and no overall roll-up is computed here.

use serde::Serialize;

use adboard_core::JobState;
use adboard_db::{AdIndexCounts, DailyStatusRow, MediaCounts};

/// Status code for one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageStatus {
    #[serde(rename = "NOT_PROCESSED")]
    NotProcessed,
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "ERROR")]
    Error,
}

/// One stage's derived status with its operator-facing label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub status: StageStatus,
    pub label: String,
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Scrape stage
// ---------------------------------------------------------------------------

/// Derives the scrape stage from the day's latest daily-status row.
///
/// CAUTION: the scraper reports `Started` once the scrape itself has
/// finished, so `status == "Started"` is the *completion* signal for this
/// stage. `Completed`/`Blocked` describe later phases of the run, not the
/// scrape. Do not "fix" this mapping; the upstream scraper defines it.
#[must_use]
pub fn derive_scrape(daily: Option<&DailyStatusRow>) -> StageReport {
    let Some(row) = daily else {
        return StageReport {
            status: StageStatus::NotProcessed,
            label: "Unknown".to_string(),
            completed: false,
        };
    };

    let completed = row.status == "Started";
    let label = if completed {
        "Completed".to_string()
    } else {
        row.status.clone()
    };
    let status = if completed {
        StageStatus::Completed
    } else if row.status == "Blocked" {
        StageStatus::Failed
    } else {
        StageStatus::Processing
    };
    StageReport {
        status,
        label,
        completed,
    }
}

// ---------------------------------------------------------------------------
// DB-store stage
// ---------------------------------------------------------------------------

/// Derives the db-store stage from `(status, active_ads)` via the fixed
/// decision table. Each row of the table maps to exactly one label/flag pair.
#[must_use]
pub fn derive_db_store(daily: Option<&DailyStatusRow>) -> StageReport {
    let Some(row) = daily else {
        return StageReport {
            status: StageStatus::NotProcessed,
            label: "Not started".to_string(),
            completed: false,
        };
    };

    let (status, label, completed) = match (row.status.as_str(), row.active_ads) {
        ("Completed", Some(n)) if n > 0 => {
            (StageStatus::Completed, "Stored (has new ads)", true)
        }
        ("Completed", Some(_)) => {
            (StageStatus::Completed, "Stored (no new ads today)", true)
        }
        ("Completed", None) => (StageStatus::Completed, "Stored (processing done)", true),
        ("Started", Some(n)) if n > 0 => {
            (StageStatus::Processing, "In progress (some ads stored)", false)
        }
        ("Started", Some(_)) => {
            (StageStatus::Processing, "In progress (no ads yet)", false)
        }
        ("Started", None) => {
            (StageStatus::Processing, "In progress (not finished)", false)
        }
        ("Blocked", _) => (StageStatus::Failed, "Failed/blocked", false),
        _ => (StageStatus::Error, "Failed/blocked", false),
    };
    StageReport {
        status,
        label: label.to_string(),
        completed,
    }
}

// ---------------------------------------------------------------------------
// Search-index stage
// ---------------------------------------------------------------------------

/// How the window's unindexed ads split once checked against the ad-update
/// job queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnindexedSplit {
    pub in_queue: u64,
    pub failed: u64,
}

/// Classifies each unindexed ad id by its job-queue membership: failed
/// sub-collection counts as failed, waiting/active counts as in-queue, and
/// anything else — including ads the queue has never heard of — defaults to
/// failed rather than being silently ignored.
pub fn classify_unindexed<F>(archive_ids: &[String], state_of: F) -> UnindexedSplit
where
    F: Fn(&str) -> Option<JobState>,
{
    let mut split = UnindexedSplit::default();
    for id in archive_ids {
        match state_of(id) {
            Some(JobState::Waiting | JobState::Active) => split.in_queue += 1,
            _ => split.failed += 1,
        }
    }
    split
}

/// Derives the search-index stage from the window counts and the unindexed
/// split.
#[must_use]
pub fn derive_search_index(counts: AdIndexCounts, split: UnindexedSplit) -> StageReport {
    if counts.total == 0 {
        return StageReport {
            status: StageStatus::NotProcessed,
            label: "No ads to index".to_string(),
            completed: false,
        };
    }
    if counts.indexed == counts.total {
        return StageReport {
            status: StageStatus::Completed,
            label: format!("Indexed {} of {}", counts.indexed, counts.total),
            completed: true,
        };
    }

    let status = if counts.indexed > 0 {
        if split.in_queue > 0 {
            StageStatus::Processing
        } else {
            StageStatus::Failed
        }
    } else if split.in_queue > 0 {
        StageStatus::Waiting
    } else {
        StageStatus::Failed
    };
    StageReport {
        status,
        label: format!(
            "Indexed {} of {} ({} in queue, {} failed)",
            counts.indexed, counts.total, split.in_queue, split.failed
        ),
        completed: false,
    }
}

// ---------------------------------------------------------------------------
// File-upload stage
// ---------------------------------------------------------------------------

/// Derives the file-upload stage from the date-window media counts and
/// whether the brand still has an active brand-processing job. Brand logo
/// upload is surfaced separately by the aggregator, never folded in here.
#[must_use]
pub fn derive_file_upload(counts: MediaCounts, has_active_job: bool) -> StageReport {
    if counts.total > 0 && counts.completed == counts.total {
        return StageReport {
            status: StageStatus::Completed,
            label: format!("Uploaded {} of {}", counts.completed, counts.total),
            completed: true,
        };
    }
    if counts.total == 0 && !has_active_job {
        return StageReport {
            status: StageStatus::NotProcessed,
            label: "No media for this date".to_string(),
            completed: false,
        };
    }
    let status = if has_active_job {
        StageStatus::Processing
    } else {
        StageStatus::Failed
    };
    StageReport {
        status,
        label: format!("Uploaded {} of {}", counts.completed, counts.total),
        completed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn daily(status: &str, active_ads: Option<i32>) -> DailyStatusRow {
        DailyStatusRow {
            id: 1,
            brand_id: 42,
            status: status.to_string(),
            active_ads,
            inactive_ads: None,
            stopped_ads: None,
            started_at: Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
            ended_at: None,
        }
    }

    // -- scrape ------------------------------------------------------------

    #[test]
    fn scrape_started_means_completed() {
        let row = daily("Started", Some(3));
        let report = derive_scrape(Some(&row));
        assert!(report.completed);
        assert_eq!(report.label, "Completed");
        assert_eq!(report.status, StageStatus::Completed);
    }

    #[test]
    fn scrape_completed_raw_value_is_not_the_completion_signal() {
        let row = daily("Completed", Some(3));
        let report = derive_scrape(Some(&row));
        assert!(!report.completed);
        assert_eq!(report.label, "Completed");
    }

    #[test]
    fn scrape_without_a_row_is_unknown() {
        let report = derive_scrape(None);
        assert_eq!(report.label, "Unknown");
        assert!(!report.completed);
        assert_eq!(report.status, StageStatus::NotProcessed);
    }

    // -- db-store decision table, all 8 rows -------------------------------

    #[test]
    fn db_store_decision_table() {
        let cases: [(Option<DailyStatusRow>, &str, bool); 8] = [
            (
                Some(daily("Completed", Some(5))),
                "Stored (has new ads)",
                true,
            ),
            (
                Some(daily("Completed", Some(0))),
                "Stored (no new ads today)",
                true,
            ),
            (
                Some(daily("Completed", None)),
                "Stored (processing done)",
                true,
            ),
            (
                Some(daily("Started", Some(5))),
                "In progress (some ads stored)",
                false,
            ),
            (
                Some(daily("Started", Some(0))),
                "In progress (no ads yet)",
                false,
            ),
            (
                Some(daily("Started", None)),
                "In progress (not finished)",
                false,
            ),
            (Some(daily("Blocked", Some(7))), "Failed/blocked", false),
            (None, "Not started", false),
        ];

        for (row, label, completed) in cases {
            let report = derive_db_store(row.as_ref());
            assert_eq!(report.label, label);
            assert_eq!(report.completed, completed, "label {label}");
        }
    }

    // -- search-index ------------------------------------------------------

    #[test]
    fn search_index_no_ads_is_not_processed() {
        let report = derive_search_index(AdIndexCounts::default(), UnindexedSplit::default());
        assert_eq!(report.status, StageStatus::NotProcessed);
    }

    #[test]
    fn search_index_all_indexed_is_completed() {
        let counts = AdIndexCounts {
            total: 4,
            indexed: 4,
        };
        let report = derive_search_index(counts, UnindexedSplit::default());
        assert_eq!(report.status, StageStatus::Completed);
        assert!(report.completed);
    }

    #[test]
    fn search_index_partial_with_queue_is_processing() {
        let counts = AdIndexCounts {
            total: 5,
            indexed: 3,
        };
        let split = UnindexedSplit {
            in_queue: 2,
            failed: 0,
        };
        assert_eq!(
            derive_search_index(counts, split).status,
            StageStatus::Processing
        );
    }

    #[test]
    fn search_index_partial_without_queue_is_failed() {
        let counts = AdIndexCounts {
            total: 5,
            indexed: 3,
        };
        let split = UnindexedSplit {
            in_queue: 0,
            failed: 2,
        };
        assert_eq!(
            derive_search_index(counts, split).status,
            StageStatus::Failed
        );
    }

    #[test]
    fn search_index_none_indexed_with_queue_is_waiting() {
        let counts = AdIndexCounts {
            total: 5,
            indexed: 0,
        };
        let split = UnindexedSplit {
            in_queue: 5,
            failed: 0,
        };
        assert_eq!(
            derive_search_index(counts, split).status,
            StageStatus::Waiting
        );
    }

    #[test]
    fn unaccounted_for_ads_count_as_failed() {
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let split = classify_unindexed(&ids, |id| match id {
            "a" => Some(JobState::Waiting),
            "b" => Some(JobState::Completed), // not waiting/active: failed
            _ => None,                        // unknown to the queue: failed
        });
        assert_eq!(split.in_queue, 1);
        assert_eq!(split.failed, 2);
    }

    #[test]
    fn failed_sub_collection_counts_as_failed() {
        let ids: Vec<String> = vec!["x".into()];
        let split = classify_unindexed(&ids, |_| Some(JobState::Failed));
        assert_eq!(split.failed, 1);
        assert_eq!(split.in_queue, 0);
    }

    // -- file-upload -------------------------------------------------------

    #[test]
    fn file_upload_all_completed_is_completed() {
        let counts = MediaCounts {
            total: 3,
            completed: 3,
        };
        let report = derive_file_upload(counts, false);
        assert_eq!(report.status, StageStatus::Completed);
        assert!(report.completed);
    }

    #[test]
    fn file_upload_no_media_no_job_is_not_processed() {
        let report = derive_file_upload(MediaCounts::default(), false);
        assert_eq!(report.status, StageStatus::NotProcessed);
    }

    #[test]
    fn file_upload_partial_with_active_job_is_processing() {
        let counts = MediaCounts {
            total: 3,
            completed: 1,
        };
        assert_eq!(
            derive_file_upload(counts, true).status,
            StageStatus::Processing
        );
    }

    #[test]
    fn file_upload_partial_without_job_is_failed() {
        let counts = MediaCounts {
            total: 3,
            completed: 1,
        };
        assert_eq!(
            derive_file_upload(counts, false).status,
            StageStatus::Failed
        );
    }

    // -- stage independence ------------------------------------------------

    #[test]
    fn stages_do_not_leak_into_each_other() {
        // Completed db-store with nothing indexed: db-store COMPLETED,
        // search-index must not be.
        let row = daily("Completed", Some(5));
        let db_store = derive_db_store(Some(&row));
        assert!(db_store.completed);

        let counts = AdIndexCounts {
            total: 5,
            indexed: 0,
        };
        let search = derive_search_index(counts, UnindexedSplit { in_queue: 0, failed: 5 });
        assert_ne!(search.status, StageStatus::Completed);
        assert_eq!(search.status, StageStatus::Failed);
    }

    #[test]
    fn mid_run_brand_derives_all_four_stages_from_one_row() {
        // A brand whose scrape finished this morning (the `Started` row,
        // active_ads = 3) with no indexing or media activity yet: the four
        // stages must come out of that single fixture together, not just in
        // isolation.
        let row = daily("Started", Some(3));

        let scrape = derive_scrape(Some(&row));
        assert_eq!(scrape.status, StageStatus::Completed);
        assert_eq!(scrape.label, "Completed");
        assert!(scrape.completed);

        let db_store = derive_db_store(Some(&row));
        assert_eq!(db_store.status, StageStatus::Processing);
        assert_eq!(db_store.label, "In progress (some ads stored)");
        assert!(!db_store.completed);

        let search = derive_search_index(AdIndexCounts::default(), UnindexedSplit::default());
        assert_eq!(search.status, StageStatus::NotProcessed);
        assert!(!search.completed);

        let upload = derive_file_upload(MediaCounts::default(), false);
        assert_eq!(upload.status, StageStatus::NotProcessed);
        assert!(!upload.completed);
    }

    #[test]
    fn stage_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&StageStatus::NotProcessed).expect("json"),
            "\"NOT_PROCESSED\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Completed).expect("json"),
            "\"COMPLETED\""
        );
    }
}
