//! Read-side application service backing the HTTP API.

use std::sync::Arc;

use tracing::{instrument, warn};
use validator::Validate;

use crate::domain::{
    AddressStatItem, AppError, ChainNode, DatabaseError, FeeStatItem, HealthResponse, HealthStatus,
    IndexerStore, IntervalType, MinerStatItem, StatPage, StatQuery, StorageStatItem, SubmitStat,
    Summary, TxStatItem, ValidationError,
};

/// Application service containing the read queries
pub struct AppService {
    store: Arc<dyn IndexerStore>,
    node: Arc<dyn ChainNode>,
}

impl AppService {
    #[must_use]
    pub fn new(store: Arc<dyn IndexerStore>, node: Arc<dyn ChainNode>) -> Self {
        Self { store, node }
    }

    fn validate(query: &StatQuery) -> Result<(), AppError> {
        query.validate().map_err(|e| {
            warn!(error = %e, "Invalid stat query");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        for (field, value, time) in [
            ("min_timestamp", query.min_timestamp, query.min_time()),
            ("max_timestamp", query.max_timestamp, query.max_time()),
        ] {
            if value.is_some() && time.is_none() {
                return Err(AppError::Validation(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("{} is outside the supported time range", field),
                }));
            }
        }
        if let (Some(min), Some(max)) = (query.min_timestamp, query.max_timestamp)
            && min > max
        {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "min_timestamp".to_string(),
                message: "min_timestamp must not exceed max_timestamp".to_string(),
            }));
        }
        Ok(())
    }

    async fn submit_page<T>(
        &self,
        query: &StatQuery,
        project: fn(&SubmitStat) -> T,
    ) -> Result<StatPage<T>, AppError> {
        Self::validate(query)?;
        let (total, rows) = self.store.list_submit_stats(query).await?;
        Ok(StatPage {
            total,
            list: rows.iter().map(project).collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn storage_stats(
        &self,
        query: &StatQuery,
    ) -> Result<StatPage<StorageStatItem>, AppError> {
        self.submit_page(query, |s| StorageStatItem::from(s)).await
    }

    #[instrument(skip(self))]
    pub async fn tx_stats(&self, query: &StatQuery) -> Result<StatPage<TxStatItem>, AppError> {
        self.submit_page(query, |s| TxStatItem::from(s)).await
    }

    #[instrument(skip(self))]
    pub async fn fee_stats(&self, query: &StatQuery) -> Result<StatPage<FeeStatItem>, AppError> {
        self.submit_page(query, |s| FeeStatItem::from(s)).await
    }

    #[instrument(skip(self))]
    pub async fn address_stats(
        &self,
        query: &StatQuery,
    ) -> Result<StatPage<AddressStatItem>, AppError> {
        Self::validate(query)?;
        let (total, rows) = self.store.list_address_stats(query).await?;
        Ok(StatPage {
            total,
            list: rows.iter().map(AddressStatItem::from).collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn miner_stats(
        &self,
        query: &StatQuery,
    ) -> Result<StatPage<MinerStatItem>, AppError> {
        Self::validate(query)?;
        let (total, rows) = self.store.list_miner_stats(query).await?;
        Ok(StatPage {
            total,
            list: rows.iter().map(MinerStatItem::from).collect(),
        })
    }

    /// Sync progress and the storage fee total of the latest daily bucket
    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<Summary, AppError> {
        let sync = self.store.load_cursor().await?.ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound("sync cursor".to_string()))
        })?;
        let storage_fee_total = self
            .store
            .latest_submit_stat(IntervalType::Day)
            .await?
            .map(|s| s.base_fee_total);
        Ok(Summary {
            sync,
            storage_fee_total,
        })
    }

    /// Perform health check on the store and the chain node
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let database = match self.store.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };
        let chain = match self.node.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "Chain node health check failed");
                HealthStatus::Unhealthy
            }
        };
        HealthResponse::new(database, chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressStat, Amount, MinerStat, SortOrder, SyncCursor, WindowStats};
    use crate::test_utils::{MockChainNode, MockIndexerStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
    }

    fn stats(d: u32, files: u64) -> WindowStats {
        WindowStats {
            submit: SubmitStat {
                stat_type: IntervalType::Day,
                stat_time: day(d),
                file_count: files,
                file_total: files * 10,
                data_size: files * 100,
                data_total: files * 1000,
                base_fee: Amount::from(files),
                base_fee_total: Amount::from(files * 7),
                tx_count: files,
                tx_total: files * 2,
                sender_count: 1,
            },
            address: AddressStat {
                stat_type: IntervalType::Day,
                stat_time: day(d),
                addr_new: 1,
                addr_active: 1,
                addr_total: u64::from(d),
            },
            miner: MinerStat {
                stat_type: IntervalType::Day,
                stat_time: day(d),
                miner_new: 0,
                miner_active: 0,
                miner_total: 0,
                reward_amount: Amount::zero(),
            },
        }
    }

    fn service(store: &Arc<MockIndexerStore>) -> AppService {
        AppService::new(store.clone(), Arc::new(MockChainNode::new()))
    }

    #[tokio::test]
    async fn test_storage_stats_sorted_and_paged() {
        let store = Arc::new(MockIndexerStore::new());
        for d in 1..=5 {
            store.seed_stats(stats(d, u64::from(d)));
        }

        let page = service(&store)
            .storage_stats(&StatQuery {
                sort: SortOrder::Desc,
                skip: 1,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.list.len(), 2);
        assert_eq!(page.list[0].stat_time, day(4));
        assert_eq!(page.list[1].file_count, 3);
    }

    #[tokio::test]
    async fn test_fee_stats_respect_time_bounds() {
        let store = Arc::new(MockIndexerStore::new());
        for d in 1..=5 {
            store.seed_stats(stats(d, u64::from(d)));
        }

        let page = service(&store)
            .fee_stats(&StatQuery {
                min_timestamp: Some(day(2).timestamp()),
                max_timestamp: Some(day(3).timestamp()),
                sort: SortOrder::Asc,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.list[0].storage_fee_total, Amount::from(14));
    }

    #[tokio::test]
    async fn test_invalid_query_rejected() {
        let store = Arc::new(MockIndexerStore::new());
        let service = service(&store);

        let err = service
            .tx_stats(&StatQuery {
                limit: 5000,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .address_stats(&StatQuery {
                min_timestamp: Some(10),
                max_timestamp: Some(5),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unrepresentable_timestamps_are_rejected() {
        let store = Arc::new(MockIndexerStore::new());
        let service = service(&store);

        let err = service
            .storage_stats(&StatQuery {
                max_timestamp: Some(i64::MAX),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidField { ref field, .. }) if field == "max_timestamp"
        ));

        let err = service
            .miner_stats(&StatQuery {
                min_timestamp: Some(i64::MIN),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidField { ref field, .. }) if field == "min_timestamp"
        ));
    }

    #[tokio::test]
    async fn test_summary() {
        let store = Arc::new(MockIndexerStore::new());
        let service = service(&store);
        assert!(matches!(
            service.summary().await,
            Err(AppError::Database(DatabaseError::NotFound(_)))
        ));

        store.set_cursor(SyncCursor::genesis(10));
        assert_eq!(service.summary().await.unwrap().storage_fee_total, None);

        store.seed_stats(stats(1, 1));
        store.seed_stats(stats(2, 3));
        let summary = service.summary().await.unwrap();
        assert_eq!(summary.sync.block_number, Some(9));
        assert_eq!(summary.storage_fee_total, Some(Amount::from(21)));
    }

    #[tokio::test]
    async fn test_health_check_degrades_on_chain_failure() {
        let store = Arc::new(MockIndexerStore::new());
        let node = MockChainNode::new();
        node.push_block(vec![]);
        let healthy = AppService::new(store.clone(), Arc::new(node));
        assert_eq!(healthy.health_check().await.status, HealthStatus::Healthy);

        let degraded = AppService::new(store.clone(), Arc::new(MockChainNode::failing("down")));
        assert_eq!(degraded.health_check().await.status, HealthStatus::Degraded);

        store.set_healthy(false);
        assert_eq!(degraded.health_check().await.status, HealthStatus::Unhealthy);
    }
}
