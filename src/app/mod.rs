//! Application layer: the background loops, the read service and shared state.

pub mod aggregator;
pub mod finality;
pub mod ingestion;
pub mod reorg;
pub mod service;
pub mod state;
pub mod worker;

pub use aggregator::{AggregateOutcome, StatAggregator, StatConfig};
pub use finality::{FinalityConfig, FinalityOutcome, FinalityTracker};
pub use ingestion::{SyncConfig, SyncOutcome, Syncer, parse_contract_address};
pub use reorg::{ReorgRoller, Rollback};
pub use service::AppService;
pub use state::AppState;
pub use worker::{Cycle, LoopState, Tick, WorkerConfig, run_loop, spawn_loop, spawn_worker};
