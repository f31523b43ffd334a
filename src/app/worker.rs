//! Background loop runner shared by the ingestion, finality and statistics loops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::AppError;

/// Result of one successful cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Work was done, run the next cycle immediately
    Progress,
    /// Nothing to do, sleep for the idle interval
    Idle,
}

/// One unit of work of a background loop
#[async_trait]
pub trait Cycle: Send + Sync + 'static {
    /// Loop name used in logs
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<Tick, AppError>;
}

/// Background worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Sleep after an idle cycle
    pub idle_interval: Duration,
    /// Sleep after a failed cycle
    pub retry_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_interval: Duration::from_secs(5),
            retry_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn new(enabled: bool, idle_secs: u64, retry_secs: u64) -> Self {
        Self {
            enabled,
            idle_interval: Duration::from_secs(idle_secs),
            retry_interval: Duration::from_secs(retry_secs),
        }
    }
}

/// Where a loop goes after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Sleeping(Duration),
    BackingOff(Duration),
    Stopped,
}

/// Transition taken after a cycle result
#[must_use]
pub fn next_state(result: &Result<Tick, AppError>, config: &WorkerConfig) -> LoopState {
    match result {
        Ok(Tick::Progress) => LoopState::Running,
        Ok(Tick::Idle) => LoopState::Sleeping(config.idle_interval),
        Err(e) if e.is_fatal() => LoopState::Stopped,
        Err(_) => LoopState::BackingOff(config.retry_interval),
    }
}

/// Sleep unless shutdown is signalled first; returns `true` on shutdown
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Drive `cycle` until shutdown or a fatal error.
///
/// Shutdown is observed at the top of every cycle and during sleeps, never
/// in the middle of a cycle. A fatal error is returned to the caller.
pub async fn run_loop<C: Cycle + ?Sized>(
    cycle: Arc<C>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let name = cycle.name();
    info!(worker = name, "Worker started");

    loop {
        if *shutdown.borrow() {
            info!(worker = name, "Worker received shutdown signal");
            return Ok(());
        }

        let result = cycle.run_once().await;
        let state = next_state(&result, &config);

        let pause = match (state, result) {
            (LoopState::Running, _) => continue,
            (LoopState::Sleeping(d), _) => {
                debug!(worker = name, "Nothing to do");
                d
            }
            (LoopState::BackingOff(d), Err(e)) => {
                if e.is_transient() {
                    warn!(worker = name, error = %e, retry_in = ?d, "Cycle failed, backing off");
                } else {
                    error!(worker = name, error = %e, retry_in = ?d, "Cycle failed, backing off");
                }
                d
            }
            (LoopState::Stopped, Err(e)) => {
                error!(worker = name, error = %e, "Fatal error, worker stopped");
                return Err(e);
            }
            (_, _) => config.retry_interval,
        };

        if sleep_or_shutdown(pause, &mut shutdown).await {
            info!(worker = name, "Worker received shutdown signal");
            return Ok(());
        }
    }
}

/// Spawn a loop on an existing shutdown channel
pub fn spawn_loop<C: Cycle + ?Sized>(
    cycle: Arc<C>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<Result<(), AppError>> {
    tokio::spawn(run_loop(cycle, config, shutdown))
}

/// Spawn a loop with its own shutdown channel
pub fn spawn_worker<C: Cycle + ?Sized>(
    cycle: Arc<C>,
    config: WorkerConfig,
) -> (JoinHandle<Result<(), AppError>>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (spawn_loop(cycle, config, shutdown_rx), shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainError, DecodeError};
    use std::sync::Mutex;

    /// Replays scripted results, then idles
    struct Scripted {
        results: Mutex<Vec<Result<Tick, AppError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<Tick, AppError>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Cycle for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run_once(&self) -> Result<Tick, AppError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().pop().unwrap_or(Ok(Tick::Idle))
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            idle_interval: Duration::from_millis(5),
            retry_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_next_state_transitions() {
        let config = fast_config();
        assert_eq!(next_state(&Ok(Tick::Progress), &config), LoopState::Running);
        assert_eq!(
            next_state(&Ok(Tick::Idle), &config),
            LoopState::Sleeping(config.idle_interval)
        );
        assert_eq!(
            next_state(
                &Err(AppError::Chain(ChainError::Timeout("slow".into()))),
                &config
            ),
            LoopState::BackingOff(config.retry_interval)
        );
        assert_eq!(
            next_state(&Err(AppError::Decode(DecodeError::NoTopics)), &config),
            LoopState::BackingOff(config.retry_interval)
        );
        assert_eq!(
            next_state(&Err(AppError::Consistency("diverged".into())), &config),
            LoopState::Stopped
        );
    }

    #[tokio::test]
    async fn test_fatal_error_stops_loop() {
        let cycle = Scripted::new(vec![
            Ok(Tick::Progress),
            Err(AppError::Chain(ChainError::Connection("down".into()))),
            Err(AppError::Consistency("cursor ahead of chain".into())),
        ]);
        let (_tx, rx) = watch::channel(false);

        let result = run_loop(Arc::clone(&cycle), fast_config(), rx).await;

        assert!(matches!(result, Err(AppError::Consistency(_))));
        assert_eq!(cycle.calls(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_idle_sleep() {
        let cycle = Scripted::new(vec![]);
        let config = WorkerConfig {
            idle_interval: Duration::from_secs(3600),
            ..fast_config()
        };
        let (handle, tx) = spawn_worker(Arc::clone(&cycle), config);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(cycle.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_cycle() {
        let cycle = Scripted::new(vec![]);
        let (tx, rx) = watch::channel(true);

        run_loop(Arc::clone(&cycle), fast_config(), rx).await.unwrap();

        assert_eq!(cycle.calls(), 0);
        drop(tx);
    }
}
