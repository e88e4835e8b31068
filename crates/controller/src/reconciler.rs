//! Reconciler — 워크큐를 소비하는 워커 풀과 생명주기 관리
//!
//! [`Reconciler`]는 초기 캐시 동기화를 기다린 뒤 워커들을 띄우고, 각 워커는
//! 큐에서 키를 꺼내 스냅샷 조회 → 핸들러 호출 → 결과 보고의 주기를 돌립니다.
//! 큐의 single-flight 보장 덕분에 같은 키는 항상 순차적으로 처리됩니다.
//!
//! # 재시도 정책
//!
//! 조회나 핸들러가 실패하면 키를 지수 백오프로 재투입하고, 키별 실패 횟수가
//! 한도에 도달하면 키를 포기하고 [`ReconcileOutcome::RetriesExhausted`]
//! 이벤트로 보고합니다. 성공하면 실패 횟수가 초기화됩니다.
//!
//! # 생명주기
//!
//! `idle → syncing → running → stopped`. 동기화 제한 시간 초과는 치명적
//! 에러로, 호출자(데몬)가 프로세스를 종료해야 합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sidewinder_core::event::{ReconcileEvent, ReconcileOutcome};
use sidewinder_core::metrics::{
    LABEL_RESULT, RECONCILE_CYCLES_TOTAL, RECONCILE_RETRIES_EXHAUSTED_TOTAL,
};
use sidewinder_core::types::WorkloadKey;

use crate::error::ControllerError;
use crate::handler::UnitHandler;
use crate::queue::WorkQueue;
use crate::watch::SnapshotStore;

/// 동기화 플래그 확인 주기
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

const STATE_IDLE: u8 = 0;
const STATE_SYNCING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// [`Reconciler`] 생성 빌더
///
/// 큐, 스토어, 핸들러, 이벤트 채널은 필수이며 누락 시 `build`가 실패합니다.
pub struct ReconcilerBuilder<S, H> {
    queue: Option<WorkQueue<WorkloadKey>>,
    store: Option<Arc<S>>,
    handler: Option<Arc<H>>,
    event_tx: Option<mpsc::Sender<ReconcileEvent>>,
    workers: usize,
    max_retries: u32,
    sync_timeout: Duration,
}

impl<S, H> Default for ReconcilerBuilder<S, H>
where
    S: SnapshotStore,
    H: UnitHandler,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, H> ReconcilerBuilder<S, H>
where
    S: SnapshotStore,
    H: UnitHandler,
{
    /// 기본값(워커 1, 재시도 5, 동기화 제한 30초)으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            queue: None,
            store: None,
            handler: None,
            event_tx: None,
            workers: 1,
            max_retries: 5,
            sync_timeout: Duration::from_secs(30),
        }
    }

    /// 워크큐를 설정합니다.
    pub fn with_queue(mut self, queue: WorkQueue<WorkloadKey>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// 스냅샷 스토어를 설정합니다.
    pub fn with_store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 유닛 핸들러를 설정합니다.
    pub fn with_handler(mut self, handler: Arc<H>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// reconcile 이벤트 송신 채널을 설정합니다.
    pub fn with_event_channel(mut self, event_tx: mpsc::Sender<ReconcileEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// 워커 수를 설정합니다.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// 키당 최대 requeue 횟수를 설정합니다.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 초기 동기화 제한 시간을 설정합니다.
    pub fn with_sync_timeout(mut self, sync_timeout: Duration) -> Self {
        self.sync_timeout = sync_timeout;
        self
    }

    /// Reconciler를 생성합니다.
    pub fn build(self) -> Result<Reconciler<S, H>, ControllerError> {
        let missing = |field: &str| ControllerError::Config {
            field: field.to_owned(),
            reason: "required component not set".to_owned(),
        };
        Ok(Reconciler {
            queue: self.queue.ok_or_else(|| missing("queue"))?,
            store: self.store.ok_or_else(|| missing("store"))?,
            handler: self.handler.ok_or_else(|| missing("handler"))?,
            event_tx: self.event_tx.ok_or_else(|| missing("event_tx"))?,
            workers: self.workers,
            max_retries: self.max_retries,
            sync_timeout: self.sync_timeout,
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            worker_handles: Vec::new(),
        })
    }
}

/// 이벤트 주도 reconcile 워커 풀
pub struct Reconciler<S, H> {
    queue: WorkQueue<WorkloadKey>,
    store: Arc<S>,
    handler: Arc<H>,
    event_tx: mpsc::Sender<ReconcileEvent>,
    workers: usize,
    max_retries: u32,
    sync_timeout: Duration,
    state: Arc<AtomicU8>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl<S, H> Reconciler<S, H>
where
    S: SnapshotStore,
    H: UnitHandler,
{
    /// 빌더를 반환합니다.
    pub fn builder() -> ReconcilerBuilder<S, H> {
        ReconcilerBuilder::new()
    }

    /// 현재 생명주기 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &'static str {
        match self.state.load(Ordering::SeqCst) {
            STATE_SYNCING => "syncing",
            STATE_RUNNING => "running",
            STATE_STOPPED => "stopped",
            _ => "idle",
        }
    }

    /// 초기 동기화를 기다린 뒤 워커들을 시작합니다.
    ///
    /// 제한 시간 내에 스토어가 동기화되지 않으면 [`ControllerError::SyncTimeout`]을
    /// 반환합니다. 이 에러는 치명적이며 호출자가 프로세스를 내려야 합니다.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        self.state.store(STATE_SYNCING, Ordering::SeqCst);
        info!(timeout_secs = self.sync_timeout.as_secs(), "waiting for initial cache sync");
        self.wait_for_sync().await?;

        info!(workers = self.workers, max_retries = self.max_retries, "starting reconcile workers");
        for worker_id in 0..self.workers {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                store: Arc::clone(&self.store),
                handler: Arc::clone(&self.handler),
                event_tx: self.event_tx.clone(),
                max_retries: self.max_retries,
            };
            self.worker_handles.push(tokio::spawn(worker.run()));
        }
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        Ok(())
    }

    /// 큐를 닫고 모든 워커가 잔여 키를 소진할 때까지 기다립니다.
    pub async fn stop(&mut self) {
        info!("stopping reconciler");
        self.queue.shut_down();
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "reconcile worker aborted");
            }
        }
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        info!("reconciler stopped");
    }

    async fn wait_for_sync(&self) -> Result<(), ControllerError> {
        let deadline = tokio::time::Instant::now() + self.sync_timeout;
        while !self.store.has_synced() {
            if tokio::time::Instant::now() >= deadline {
                self.state.store(STATE_STOPPED, Ordering::SeqCst);
                return Err(ControllerError::SyncTimeout {
                    timeout_secs: self.sync_timeout.as_secs(),
                });
            }
            tokio::time::sleep(SYNC_POLL_INTERVAL).await;
        }
        Ok(())
    }
}

/// 워커 하나의 실행 컨텍스트
struct Worker<S, H> {
    id: usize,
    queue: WorkQueue<WorkloadKey>,
    store: Arc<S>,
    handler: Arc<H>,
    event_tx: mpsc::Sender<ReconcileEvent>,
    max_retries: u32,
}

impl<S, H> Worker<S, H>
where
    S: SnapshotStore,
    H: UnitHandler,
{
    async fn run(self) {
        debug!(worker = self.id, "reconcile worker started");
        while let Some(key) = self.queue.get().await {
            self.process(key.clone()).await;
            self.queue.done(key);
        }
        debug!(worker = self.id, "reconcile worker stopped");
    }

    /// 키 하나에 대한 reconcile 주기.
    ///
    /// 핸들러 에러도 조회 에러와 동일하게 재시도 정책을 따르며,
    /// 어떤 경로로도 panic 없이 루프가 계속됩니다.
    async fn process(&self, key: WorkloadKey) {
        let trace_id = uuid::Uuid::new_v4().to_string();
        debug!(worker = self.id, %key, trace_id = %trace_id, "reconcile cycle start");

        let outcome = match self.store.lookup(&key) {
            Ok(Some(snapshot)) => match self.handler.unit_applied(&snapshot, &trace_id).await {
                Ok(signalled) => {
                    self.queue.forget(&key);
                    counter!(RECONCILE_CYCLES_TOTAL, LABEL_RESULT => "applied").increment(1);
                    ReconcileOutcome::Applied { signalled }
                }
                Err(e) => self.retry_or_give_up(&key, e),
            },
            Ok(None) => {
                if let Err(e) = self.handler.unit_deleted(&key, &trace_id).await {
                    warn!(%key, error = %e, "delete handler failed");
                }
                self.queue.forget(&key);
                counter!(RECONCILE_CYCLES_TOTAL, LABEL_RESULT => "deleted").increment(1);
                ReconcileOutcome::Deleted
            }
            Err(e) => self.retry_or_give_up(&key, e),
        };

        debug!(worker = self.id, %key, outcome = %outcome, "reconcile cycle complete");
        let event = ReconcileEvent::with_trace(key, outcome, trace_id);
        if let Err(e) = self.event_tx.send(event).await {
            debug!(error = %e, "reconcile event channel closed");
        }
    }

    fn retry_or_give_up(&self, key: &WorkloadKey, err: ControllerError) -> ReconcileOutcome {
        let requeues = self.queue.num_requeues(key);
        if requeues < self.max_retries {
            warn!(%key, requeues, error = %err, "reconcile failed, requeueing");
            self.queue.add_rate_limited(key.clone());
            counter!(RECONCILE_CYCLES_TOTAL, LABEL_RESULT => "requeued").increment(1);
            ReconcileOutcome::Requeued {
                requeues: requeues + 1,
            }
        } else {
            error!(%key, attempts = requeues, error = %err, "retries exhausted, dropping key");
            self.queue.forget(key);
            counter!(RECONCILE_CYCLES_TOTAL, LABEL_RESULT => "exhausted").increment(1);
            counter!(RECONCILE_RETRIES_EXHAUSTED_TOTAL).increment(1);
            ReconcileOutcome::RetriesExhausted {
                reason: err.to_string(),
            }
        }
    }
}
