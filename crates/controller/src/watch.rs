//! 워크로드 워처 — 폴링 기반 이벤트 소스와 스냅샷 캐시
//!
//! [`UnitWatcher`]는 런타임을 주기적으로 폴링하여 유닛 목록을 가져오고,
//! 로컬 캐시([`UnitStore`])와 비교하여 추가/변경/삭제된 유닛의 키를
//! 워크큐에 넣습니다. 워커는 큐에서 꺼낸 키로 캐시를 조회하므로,
//! 처리 시점에는 항상 최신 관측 스냅샷을 보게 됩니다.
//!
//! 첫 폴링이 성공하면 캐시가 동기화된 것으로 표시되며, reconciler는
//! 이 플래그가 설 때까지 워커를 시작하지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sidewinder_core::metrics::{WATCH_POLL_FAILURES_TOTAL, WATCH_TRACKED_UNITS};
use sidewinder_core::types::{
    MAIN_CONTAINERS_LABEL, SIDECAR_CONTAINERS_LABEL, WorkloadKey, WorkloadSnapshot,
};

use crate::error::ControllerError;
use crate::queue::WorkQueue;
use crate::runtime::RuntimeClient;

/// 스냅샷 조회 인터페이스
///
/// reconciler가 캐시 구현에 의존하지 않고 스냅샷을 조회할 수 있게 합니다.
pub trait SnapshotStore: Send + Sync + 'static {
    /// 초기 동기화(첫 폴링 성공)가 끝났는지 여부
    fn has_synced(&self) -> bool;

    /// 키에 해당하는 스냅샷을 조회합니다. 없으면 `Ok(None)` (유닛 삭제됨).
    fn lookup(&self, key: &WorkloadKey) -> Result<Option<WorkloadSnapshot>, ControllerError>;
}

/// 인메모리 유닛 스냅샷 캐시
///
/// `Arc` 기반 핸들이므로 복제하여 워처와 reconciler가 공유합니다.
pub struct UnitStore {
    inner: Arc<StoreInner>,
}

impl Clone for UnitStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner {
    units: std::sync::RwLock<HashMap<WorkloadKey, WorkloadSnapshot>>,
    synced: AtomicBool,
}

impl Default for UnitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitStore {
    /// 빈 캐시를 생성합니다.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                units: std::sync::RwLock::new(HashMap::new()),
                synced: AtomicBool::new(false),
            }),
        }
    }

    /// 캐시에 들어 있는 유닛 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// 캐시가 비어 있으면 `true`를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 동기화 완료를 표시합니다.
    fn mark_synced(&self) {
        self.inner.synced.store(true, Ordering::SeqCst);
    }

    /// 스냅샷을 저장하고, 내용이 실제로 달라졌으면 `true`를 반환합니다.
    fn upsert(&self, snapshot: WorkloadSnapshot) -> bool {
        let mut units = self.write();
        match units.get(&snapshot.key) {
            Some(existing) if *existing == snapshot => false,
            _ => {
                units.insert(snapshot.key.clone(), snapshot);
                true
            }
        }
    }

    /// 키를 캐시에서 제거합니다. 실제로 존재했으면 `true`를 반환합니다.
    fn remove(&self, key: &WorkloadKey) -> bool {
        self.write().remove(key).is_some()
    }

    /// 현재 캐시에 있는 키 목록을 반환합니다.
    fn keys(&self) -> Vec<WorkloadKey> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<WorkloadKey, WorkloadSnapshot>> {
        // panic=abort 빌드에서는 락이 독성화될 수 없음
        self.inner
            .units
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<WorkloadKey, WorkloadSnapshot>> {
        self.inner
            .units
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SnapshotStore for UnitStore {
    fn has_synced(&self) -> bool {
        self.inner.synced.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: &WorkloadKey) -> Result<Option<WorkloadSnapshot>, ControllerError> {
        Ok(self.read().get(key).cloned())
    }
}

/// 폴링 기반 유닛 워처
pub struct UnitWatcher<R: RuntimeClient> {
    client: Arc<R>,
    store: UnitStore,
    queue: WorkQueue<WorkloadKey>,
    poll_interval: Duration,
}

impl<R: RuntimeClient> UnitWatcher<R> {
    /// 워처를 생성합니다.
    pub fn new(
        client: Arc<R>,
        store: UnitStore,
        queue: WorkQueue<WorkloadKey>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            store,
            queue,
            poll_interval,
        }
    }

    /// 취소될 때까지 폴링 루프를 돌립니다.
    ///
    /// 폴링 실패는 기록만 하고 다음 주기에 다시 시도합니다.
    pub async fn run(self, cancel: CancellationToken) {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "unit watcher started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("unit watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        counter!(WATCH_POLL_FAILURES_TOTAL).increment(1);
                        warn!(error = %e, "unit list poll failed");
                    }
                }
            }
        }
    }

    /// 한 번 폴링하여 캐시를 갱신하고 변경된 키를 큐에 넣습니다.
    pub async fn poll_once(&self) -> Result<(), ControllerError> {
        let units = self.client.list_units().await?;

        let mut seen = Vec::with_capacity(units.len());
        for snapshot in units {
            seen.push(snapshot.key.clone());
            let known = self
                .store
                .lookup(&snapshot.key)
                .ok()
                .flatten()
                .is_some();
            if self.store.upsert(snapshot.clone()) {
                if known {
                    debug!(key = %snapshot.key, "unit updated");
                } else {
                    info!(
                        key = %snapshot.key,
                        node = %snapshot.node,
                        main = snapshot.annotation(MAIN_CONTAINERS_LABEL).unwrap_or("-"),
                        sidecars = snapshot.annotation(SIDECAR_CONTAINERS_LABEL).unwrap_or("-"),
                        "tracked unit discovered"
                    );
                }
                self.queue.add(snapshot.key);
            }
        }

        // 폴링 결과에 없는 키는 삭제된 유닛
        for key in self.store.keys() {
            if !seen.contains(&key) && self.store.remove(&key) {
                info!(key = %key, "unit removed");
                self.queue.add(key);
            }
        }

        gauge!(WATCH_TRACKED_UNITS).set(self.store.len() as f64);
        debug!(tracked = self.store.len(), queued = self.queue.len(), "poll cycle complete");

        self.store.mark_synced();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use sidewinder_core::types::ContainerStatus;

    use crate::runtime::MockRuntimeClient;

    fn unit(name: &str, ready: bool) -> WorkloadSnapshot {
        WorkloadSnapshot {
            key: WorkloadKey::new("default", name),
            node: "node-a".to_owned(),
            annotations: BTreeMap::from([(
                MAIN_CONTAINERS_LABEL.to_owned(),
                "app".to_owned(),
            )]),
            containers: vec![ContainerStatus {
                id: "abc123".to_owned(),
                name: "app".to_owned(),
                ready,
                terminated: None,
            }],
        }
    }

    fn watcher(
        client: Arc<MockRuntimeClient>,
    ) -> (UnitWatcher<MockRuntimeClient>, UnitStore, WorkQueue<WorkloadKey>) {
        let store = UnitStore::new();
        let queue = WorkQueue::new();
        let watcher = UnitWatcher::new(
            client,
            store.clone(),
            queue.clone(),
            Duration::from_secs(2),
        );
        (watcher, store, queue)
    }

    #[tokio::test]
    async fn first_poll_marks_synced() {
        let client = Arc::new(MockRuntimeClient::new());
        let (watcher, store, _queue) = watcher(client);

        assert!(!store.has_synced());
        watcher.poll_once().await.unwrap();
        assert!(store.has_synced());
    }

    #[tokio::test]
    async fn failed_poll_does_not_mark_synced() {
        let client = Arc::new(MockRuntimeClient::new().with_failing_list());
        let (watcher, store, _queue) = watcher(client);

        assert!(watcher.poll_once().await.is_err());
        assert!(!store.has_synced());
    }

    #[tokio::test]
    async fn new_unit_is_cached_and_enqueued() {
        let client = Arc::new(MockRuntimeClient::new().with_units(vec![unit("job-1", true)]));
        let (watcher, store, queue) = watcher(client);

        watcher.poll_once().await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(queue.len(), 1);
        let key = WorkloadKey::new("default", "job-1");
        assert!(store.lookup(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn unchanged_unit_is_not_requeued() {
        let client = Arc::new(MockRuntimeClient::new().with_units(vec![unit("job-1", true)]));
        let (watcher, _store, queue) = watcher(Arc::clone(&client));

        watcher.poll_once().await.unwrap();
        let key = queue.get().await.unwrap();
        queue.done(key);

        // 같은 내용으로 다시 폴링해도 큐에 들어가지 않음
        watcher.poll_once().await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn changed_unit_is_requeued() {
        let client = Arc::new(MockRuntimeClient::new().with_units(vec![unit("job-1", true)]));
        let (watcher, store, queue) = watcher(Arc::clone(&client));

        watcher.poll_once().await.unwrap();
        let key = queue.get().await.unwrap();
        queue.done(key.clone());

        // 컨테이너 상태가 바뀌면 재투입
        client.set_units(vec![unit("job-1", false)]);
        watcher.poll_once().await.unwrap();

        assert_eq!(queue.len(), 1);
        let cached = store.lookup(&key).unwrap().unwrap();
        assert!(!cached.containers[0].ready);
    }

    #[tokio::test]
    async fn removed_unit_is_evicted_and_enqueued() {
        let client = Arc::new(MockRuntimeClient::new().with_units(vec![unit("job-1", true)]));
        let (watcher, store, queue) = watcher(Arc::clone(&client));

        watcher.poll_once().await.unwrap();
        let key = queue.get().await.unwrap();
        queue.done(key.clone());

        client.set_units(Vec::new());
        watcher.poll_once().await.unwrap();

        assert_eq!(store.len(), 0);
        assert!(store.lookup(&key).unwrap().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn multiple_units_all_tracked() {
        let client = Arc::new(
            MockRuntimeClient::new().with_units(vec![unit("job-1", true), unit("job-2", true)]),
        );
        let (watcher, store, queue) = watcher(client);

        watcher.poll_once().await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_polls_until_cancelled() {
        let client = Arc::new(MockRuntimeClient::new().with_units(vec![unit("job-1", true)]));
        let (watcher, store, _queue) = watcher(Arc::clone(&client));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        // 첫 tick은 즉시 발화
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.has_synced());
        let first = client.list_count();
        assert!(first >= 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(client.list_count() > first);

        cancel.cancel();
        handle.await.unwrap();
    }
}
