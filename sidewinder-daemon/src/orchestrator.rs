//! Daemon orchestrator — wires the controller pipeline and manages its lifecycle.
//!
//! Startup order: runtime connection → watcher → reconciler. Shutdown is
//! the reverse: the watcher stops producing keys, then the reconciler
//! drains the queue, then the event logger tasks flush and exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sidewinder_core::config::SidewinderConfig;
use sidewinder_core::event::{ReconcileEvent, ReconcileOutcome, SignalEvent};
use sidewinder_controller::config::ControllerConfig;
use sidewinder_controller::dispatch::ShutdownDispatcher;
use sidewinder_controller::handler::SidecarShutdownHandler;
use sidewinder_controller::queue::WorkQueue;
use sidewinder_controller::reconciler::Reconciler;
use sidewinder_controller::runtime::{BollardRuntimeClient, RuntimeClient};
use sidewinder_controller::watch::{UnitStore, UnitWatcher};

/// 이벤트 채널 버퍼 크기
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sidewinder daemon — owns the full controller pipeline.
pub struct Daemon {
    config: SidewinderConfig,
}

impl Daemon {
    /// Create a daemon from a validated configuration.
    pub fn new(config: SidewinderConfig) -> Self {
        Self { config }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &SidewinderConfig {
        &self.config
    }

    /// Start all components and block until a shutdown signal is received.
    ///
    /// # Fatal Errors
    ///
    /// * Runtime connection failure at startup
    /// * Initial cache sync timeout
    ///
    /// Both return an error so `main` exits with a non-zero status.
    pub async fn run(&mut self) -> Result<()> {
        let controller_config = ControllerConfig::from_core(&self.config);
        controller_config.validate()?;

        // Runtime connection (fatal on failure)
        let client = if controller_config.docker_socket.is_empty() {
            BollardRuntimeClient::connect_local()?
        } else {
            BollardRuntimeClient::connect_with_socket(&controller_config.docker_socket)?
        };
        client.ping().await?;
        let client = Arc::new(client);
        tracing::info!("container runtime connected");

        // Pipeline wiring
        let queue = WorkQueue::with_backoff(Duration::from_millis(
            controller_config.requeue_backoff_base_ms,
        ));
        let store = UnitStore::new();
        let cancel = CancellationToken::new();

        let watcher = UnitWatcher::new(
            Arc::clone(&client),
            store.clone(),
            queue.clone(),
            Duration::from_secs(controller_config.poll_interval_secs),
        );
        let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

        let (signal_tx, signal_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (reconcile_tx, reconcile_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let signal_logger = spawn_signal_logger(signal_rx);
        let reconcile_logger = spawn_reconcile_logger(reconcile_rx);

        let dispatcher = ShutdownDispatcher::new(
            Arc::clone(&client),
            controller_config.shutdown_attempts,
            Duration::from_secs(controller_config.shutdown_retry_delay_secs),
            signal_tx,
        );
        let handler = Arc::new(SidecarShutdownHandler::new(dispatcher));

        let mut reconciler = Reconciler::builder()
            .with_queue(queue.clone())
            .with_store(Arc::new(store))
            .with_handler(handler)
            .with_event_channel(reconcile_tx)
            .with_workers(controller_config.workers)
            .with_max_retries(controller_config.max_retries)
            .with_sync_timeout(Duration::from_secs(controller_config.sync_timeout_secs))
            .build()?;

        tracing::info!(state = reconciler.state_name(), "starting reconciler");
        if let Err(e) = reconciler.start().await {
            // 동기화 실패는 치명적: 워처를 내리고 에러로 종료
            cancel.cancel();
            let _ = watcher_task.await;
            return Err(e.into());
        }
        tracing::info!(state = reconciler.state_name(), "sidewinder-daemon running");

        // Main event loop
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        // Graceful shutdown: watcher first, then drain the queue
        cancel.cancel();
        if let Err(e) = watcher_task.await {
            tracing::warn!(error = %e, "watcher task aborted");
        }
        reconciler.stop().await;
        tracing::info!(state = reconciler.state_name(), "reconciler drained");

        // 마지막 송신자가 닫히면 로거 태스크들이 종료됨
        drop(reconciler);
        let _ = reconcile_logger.await;
        let _ = signal_logger.await;

        tracing::info!("sidewinder-daemon shut down");
        Ok(())
    }
}

/// Spawn a task that logs reconcile events until the channel closes.
pub fn spawn_reconcile_logger(mut rx: mpsc::Receiver<ReconcileEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event.outcome {
                ReconcileOutcome::RetriesExhausted { reason } => {
                    tracing::warn!(
                        key = %event.key,
                        trace_id = %event.metadata.trace_id,
                        reason = %reason,
                        "reconcile retries exhausted"
                    );
                }
                outcome => {
                    tracing::info!(
                        key = %event.key,
                        trace_id = %event.metadata.trace_id,
                        outcome = %outcome,
                        "reconcile event"
                    );
                }
            }
        }
        tracing::debug!("reconcile event logger stopped");
    })
}

/// Spawn a task that logs signal delivery events until the channel closes.
pub fn spawn_signal_logger(mut rx: mpsc::Receiver<SignalEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if event.success {
                tracing::info!(
                    key = %event.key,
                    container = %event.container,
                    attempts = event.attempts,
                    trace_id = %event.metadata.trace_id,
                    "TERM signal delivered"
                );
            } else {
                tracing::warn!(
                    key = %event.key,
                    container = %event.container,
                    attempts = event.attempts,
                    trace_id = %event.metadata.trace_id,
                    "TERM signal delivery failed"
                );
            }
        }
        tracing::debug!("signal event logger stopped");
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
