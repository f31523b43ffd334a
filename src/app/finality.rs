//! Finality tracker: upgrades submission status from the storage node.

use std::env;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::domain::{AppError, FinalityOracle, FinalityUpdate, IndexerStore};

use super::worker::{Cycle, Tick, WorkerConfig};

#[derive(Debug, Clone)]
pub struct FinalityConfig {
    /// Pending submissions checked per cycle
    pub batch_size: i64,
    pub worker: WorkerConfig,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            worker: WorkerConfig::new(true, 10, 10),
        }
    }
}

impl FinalityConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let secs = |key: &str, default: u64| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        Self {
            batch_size: env::var("FINALITY_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(1000),
            worker: WorkerConfig::new(
                env::var("ENABLE_FINALITY")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                secs("FINALITY_IDLE_SECS", 10),
                secs("FINALITY_RETRY_SECS", 10),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityOutcome {
    /// No pending submission after the resume index
    NothingToDo,
    /// A page was checked; `updated` rows changed
    Applied { checked: usize, updated: u64 },
}

pub struct FinalityTracker {
    store: Arc<dyn IndexerStore>,
    oracle: Arc<dyn FinalityOracle>,
    config: FinalityConfig,
    /// Last submission index of the previous page
    resume: Mutex<Option<u64>>,
}

impl FinalityTracker {
    #[must_use]
    pub fn new(
        store: Arc<dyn IndexerStore>,
        oracle: Arc<dyn FinalityOracle>,
        config: FinalityConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            config,
            resume: Mutex::new(None),
        }
    }

    fn resume_index(&self) -> Option<u64> {
        self.resume.lock().map(|r| *r).unwrap_or(None)
    }

    fn set_resume_index(&self, value: Option<u64>) {
        if let Ok(mut resume) = self.resume.lock() {
            *resume = value;
        }
    }

    /// Check one page of pending submissions against the oracle.
    ///
    /// Any oracle failure aborts the page before anything is written, so the
    /// same page is retried in order after back-off.
    #[instrument(skip(self))]
    pub async fn track_once(&self) -> Result<FinalityOutcome, AppError> {
        let after = self.resume_index();
        let pending = self
            .store
            .pending_submissions(after, self.config.batch_size)
            .await?;

        let Some(last) = pending.last().map(|p| p.submission_index) else {
            self.set_resume_index(None);
            return Ok(FinalityOutcome::NothingToDo);
        };

        let mut updates = Vec::new();
        for item in &pending {
            let Some(info) = self.oracle.file_info(item.submission_index).await? else {
                debug!(submission_index = item.submission_index, "Unknown to storage node");
                continue;
            };
            let status = info.status(item.total_seg_num);
            if status > item.status || info.uploaded_seg_num > item.uploaded_seg_num {
                updates.push(FinalityUpdate {
                    submission_index: item.submission_index,
                    sender: item.sender.clone(),
                    status: status.max(item.status),
                    uploaded_seg_num: info.uploaded_seg_num.max(item.uploaded_seg_num),
                });
            }
        }

        let updated = if updates.is_empty() {
            0
        } else {
            self.store.apply_finality(&updates).await?
        };
        self.set_resume_index(Some(last));

        info!(
            checked = pending.len(),
            updated,
            last_index = last,
            "Finality batch processed"
        );
        Ok(FinalityOutcome::Applied {
            checked: pending.len(),
            updated,
        })
    }
}

#[async_trait]
impl Cycle for FinalityTracker {
    fn name(&self) -> &'static str {
        "finality"
    }

    async fn run_once(&self) -> Result<Tick, AppError> {
        match self.track_once().await? {
            FinalityOutcome::NothingToDo => Ok(Tick::Idle),
            FinalityOutcome::Applied { .. } => Ok(Tick::Progress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, FileInfo, SubmitStatus, Submission};
    use crate::test_utils::{MockFinalityOracle, MockIndexerStore};
    use chrono::Utc;

    fn submission(index: u64, total_seg_num: u64) -> Submission {
        Submission {
            submission_index: index,
            root_hash: format!("0xroot{}", index),
            sender: "0xsender".to_string(),
            length: total_seg_num * 1024,
            block_number: 100 + index,
            block_time: Utc::now(),
            tx_hash: format!("0xtx{}", index),
            total_seg_num,
            uploaded_seg_num: 0,
            status: SubmitStatus::NotUploaded,
            fee: Amount::from(1),
            extra: "{}".to_string(),
        }
    }

    fn tracker(
        store: &Arc<MockIndexerStore>,
        oracle: &Arc<MockFinalityOracle>,
        batch_size: i64,
    ) -> FinalityTracker {
        FinalityTracker::new(
            store.clone(),
            oracle.clone(),
            FinalityConfig {
                batch_size,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_finalized_submission_is_upgraded() {
        let store = Arc::new(MockIndexerStore::new());
        let oracle = Arc::new(MockFinalityOracle::new());
        store.seed_submission(submission(42, 1));
        oracle.finalize(42);

        let outcome = tracker(&store, &oracle, 10).track_once().await.unwrap();

        assert_eq!(
            outcome,
            FinalityOutcome::Applied {
                checked: 1,
                updated: 1
            }
        );
        assert_eq!(store.submission(42).unwrap().status, SubmitStatus::Finalized);
        assert_eq!(
            store.address_submissions()[0].status,
            SubmitStatus::Finalized
        );
    }

    #[tokio::test]
    async fn test_empty_page_resets_resume_index() {
        let store = Arc::new(MockIndexerStore::new());
        let oracle = Arc::new(MockFinalityOracle::new());
        for i in 1..=3 {
            store.seed_submission(submission(i, 1));
        }
        let tracker = tracker(&store, &oracle, 2);

        tracker.track_once().await.unwrap();
        tracker.track_once().await.unwrap();
        assert_eq!(
            tracker.track_once().await.unwrap(),
            FinalityOutcome::NothingToDo
        );
        tracker.track_once().await.unwrap();

        assert_eq!(oracle.queried(), vec![1, 2, 3, 1, 2]);
    }

    #[tokio::test]
    async fn test_oracle_failure_retries_whole_page() {
        let store = Arc::new(MockIndexerStore::new());
        let oracle = Arc::new(MockFinalityOracle::new());
        for i in 1..=3 {
            store.seed_submission(submission(i, 1));
            oracle.finalize(i);
        }
        oracle.fail_at(Some(2));
        let tracker = tracker(&store, &oracle, 10);

        let err = tracker.track_once().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.submission(1).unwrap().status, SubmitStatus::NotUploaded);

        oracle.fail_at(None);
        tracker.track_once().await.unwrap();
        assert_eq!(oracle.queried(), vec![1, 2, 1, 2, 3]);
        assert!(
            store
                .submissions()
                .iter()
                .all(|s| s.status == SubmitStatus::Finalized)
        );
    }

    #[tokio::test]
    async fn test_status_never_moves_backward() {
        let store = Arc::new(MockIndexerStore::new());
        let oracle = Arc::new(MockFinalityOracle::new());
        store.seed_submission(submission(5, 4));
        let tracker = tracker(&store, &oracle, 10);

        oracle.set(
            5,
            FileInfo {
                finalized: false,
                uploaded_seg_num: 4,
            },
        );
        tracker.track_once().await.unwrap();
        assert_eq!(store.submission(5).unwrap().status, SubmitStatus::Uploaded);

        // A lagging storage node reports less progress
        oracle.set(
            5,
            FileInfo {
                finalized: false,
                uploaded_seg_num: 1,
            },
        );
        tracker.track_once().await.unwrap(); // empty page
        tracker.track_once().await.unwrap();
        let row = store.submission(5).unwrap();
        assert_eq!(row.status, SubmitStatus::Uploaded);
        assert_eq!(row.uploaded_seg_num, 4);
    }

    #[tokio::test]
    async fn test_unknown_submission_is_skipped() {
        let store = Arc::new(MockIndexerStore::new());
        let oracle = Arc::new(MockFinalityOracle::new());
        store.seed_submission(submission(1, 1));
        store.seed_submission(submission(2, 1));
        oracle.finalize(2);

        let outcome = tracker(&store, &oracle, 10).track_once().await.unwrap();

        assert_eq!(
            outcome,
            FinalityOutcome::Applied {
                checked: 2,
                updated: 1
            }
        );
        assert_eq!(store.submission(1).unwrap().status, SubmitStatus::NotUploaded);
        assert_eq!(store.submission(2).unwrap().status, SubmitStatus::Finalized);
    }
}
