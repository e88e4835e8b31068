//! 중복 제거 워크큐
//!
//! [`WorkQueue`]는 reconcile 대상 키를 모으는 비동기 큐입니다. 같은 키에 대한
//! 이벤트가 몰려도 한 번의 처리로 합쳐지고, 처리 중인 키는 두 워커가 동시에
//! 잡을 수 없습니다 (single-flight).
//!
//! # 상태 전이
//!
//! ```text
//! add(k)            get()             done(k)
//!  ──────> [dirty+queued] ──> [processing] ──────> (없음)
//!                               │  add(k)
//!                               ▼
//!                        [processing+dirty] ── done(k) ──> [dirty+queued]
//! ```
//!
//! 조회 실패 재시도는 `add_rate_limited`로 지수 백오프 지연 후 다시 추가되며,
//! 키별 실패 횟수는 `num_requeues` / `forget`으로 관리합니다.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::Notify;
use tracing::{debug, trace};

use sidewinder_core::metrics::{
    QUEUE_ADDS_TOTAL, QUEUE_DEDUPED_TOTAL, QUEUE_DEPTH, QUEUE_REQUEUES_TOTAL,
};

/// 백오프 지수 상한 (2^10 = 1024배)
const MAX_BACKOFF_EXPONENT: u32 = 10;
/// 백오프 지연 상한
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

/// 중복 제거 워크큐 핸들
///
/// 내부 상태를 `Arc`로 공유하므로 복제 비용이 저렴하며,
/// 모든 메서드는 동시 호출에 안전합니다.
pub struct WorkQueue<K> {
    inner: Arc<QueueInner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct QueueInner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff_base: Duration,
}

struct QueueState<K> {
    /// 처리 대기 중인 키 (FIFO)
    queue: VecDeque<K>,
    /// 처리가 필요하다고 표시된 키 (대기 중이거나 처리 중 재요청된 키)
    dirty: HashSet<K>,
    /// 현재 워커가 잡고 있는 키
    processing: HashSet<K>,
    /// 키별 requeue 횟수
    requeues: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
{
    /// 기본 백오프(500ms)로 빈 큐를 생성합니다.
    pub fn new() -> Self {
        Self::with_backoff(Duration::from_millis(500))
    }

    /// 지정한 백오프 기준 지연으로 빈 큐를 생성합니다.
    pub fn with_backoff(backoff_base: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    requeues: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff_base,
            }),
        }
    }

    /// 키를 큐에 추가합니다.
    ///
    /// 이미 대기 중인 키는 흡수되고, 처리 중인 키는 dirty로 표시되어
    /// `done` 시점에 다시 큐에 들어갑니다. 종료 중에는 무시됩니다.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down {
            trace!(%key, "queue shutting down, dropping add");
            return;
        }
        if state.dirty.contains(&key) {
            counter!(QUEUE_DEDUPED_TOTAL).increment(1);
            trace!(%key, "key already dirty, add absorbed");
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // done() 시점에 재투입됨
            trace!(%key, "key in flight, deferred until done");
            return;
        }
        state.queue.push_back(key);
        counter!(QUEUE_ADDS_TOTAL).increment(1);
        gauge!(QUEUE_DEPTH).set(state.queue.len() as f64);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// 다음 키를 꺼냅니다. 큐가 빌 때까지 대기하며,
    /// 종료 후 잔여 키까지 모두 소진되면 `None`을 반환합니다.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    gauge!(QUEUE_DEPTH).set(state.queue.len() as f64);
                    if !state.queue.is_empty() {
                        // 다른 워커가 기다리고 있을 수 있으므로 연쇄 알림
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    // 다른 대기자도 깨어나 None을 받도록 전파
                    self.inner.notify.notify_one();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// 키 처리 완료를 알립니다.
    ///
    /// 처리 중에 같은 키가 다시 추가되었다면 즉시 큐에 재투입합니다.
    pub fn done(&self, key: K) {
        let mut state = self.lock();
        state.processing.remove(&key);
        if state.dirty.contains(&key) {
            state.queue.push_back(key);
            gauge!(QUEUE_DEPTH).set(state.queue.len() as f64);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// 키의 실패 횟수를 증가시키고 지수 백오프 지연 후 다시 추가합니다.
    ///
    /// 지연: `backoff_base × 2^(n−1)`, [`MAX_BACKOFF_DELAY`]에서 상한.
    pub fn add_rate_limited(&self, key: K) {
        let attempt = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let count = state.requeues.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let delay = self.backoff_delay(attempt);
        counter!(QUEUE_REQUEUES_TOTAL).increment(1);
        debug!(%key, attempt, delay_ms = delay.as_millis() as u64, "rate limited requeue scheduled");

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// 키의 현재 requeue 횟수를 반환합니다.
    pub fn num_requeues(&self, key: &K) -> u32 {
        let state = self.lock();
        state.requeues.get(key).copied().unwrap_or(0)
    }

    /// 키의 requeue 횟수를 초기화합니다.
    pub fn forget(&self, key: &K) {
        let mut state = self.lock();
        state.requeues.remove(key);
    }

    /// 현재 대기 중인 키 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// 대기 중인 키가 없으면 `true`를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 큐를 종료합니다. 새 추가는 무시되고 대기 중인 워커는 잔여 키를
    /// 소진한 뒤 `None`을 받습니다.
    pub fn shut_down(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
        }
        self.inner.notify.notify_waiters();
        // notified() 등록 전의 대기자를 위해 permit도 하나 남겨둠
        self.inner.notify.notify_one();
    }

    /// 종료 여부를 반환합니다.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay = self
            .inner
            .backoff_base
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(MAX_BACKOFF_DELAY)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<K>> {
        // panic=abort 빌드에서는 락이 독성화될 수 없음
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new()
    }

    fn key(s: &str) -> String {
        s.to_owned()
    }

    #[tokio::test]
    async fn add_then_get_returns_key() {
        let q = queue();
        q.add(key("a"));
        assert_eq!(q.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn get_preserves_fifo_order() {
        let q = queue();
        q.add(key("a"));
        q.add(key("b"));
        q.add(key("c"));
        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, Some(key("b")));
        assert_eq!(q.get().await, Some(key("c")));
    }

    #[tokio::test]
    async fn duplicate_adds_are_absorbed() {
        let q = queue();
        q.add(key("a"));
        q.add(key("a"));
        q.add(key("a"));
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn add_during_processing_defers_until_done() {
        let q = queue();
        q.add(key("a"));
        let got = q.get().await.unwrap();

        // 처리 중 재추가: 큐에는 들어가지 않음
        q.add(key("a"));
        assert_eq!(q.len(), 0);

        // done 시점에 재투입
        q.done(got);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn done_without_redelivery_does_not_requeue() {
        let q = queue();
        q.add(key("a"));
        let got = q.get().await.unwrap();
        q.done(got);
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn single_flight_blocks_second_worker() {
        let q = queue();
        q.add(key("a"));
        let got = q.get().await.unwrap();

        // 같은 키가 다시 추가되어도 처리 중에는 두 번째 get이 잡지 못함
        q.add(key("a"));
        let second = timeout(Duration::from_millis(50), q.get()).await;
        assert!(second.is_err(), "second worker must not receive in-flight key");

        q.done(got);
        let redelivered = timeout(Duration::from_millis(200), q.get())
            .await
            .expect("key should be redelivered after done");
        assert_eq!(redelivered, Some(key("a")));
    }

    #[tokio::test]
    async fn get_blocks_until_add() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.add(key("late"));
        let got = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should complete")
            .unwrap();
        assert_eq!(got, Some(key("late")));
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_workers_with_none() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.shut_down();
        let got = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should complete")
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn shutdown_drains_remaining_keys_first() {
        let q = queue();
        q.add(key("a"));
        q.add(key("b"));
        q.shut_down();

        assert_eq!(q.get().await, Some(key("a")));
        assert_eq!(q.get().await, Some(key("b")));
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn add_after_shutdown_is_ignored() {
        let q = queue();
        q.shut_down();
        q.add(key("a"));
        assert_eq!(q.len(), 0);
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn multiple_workers_drain_disjoint_keys() {
        let q = queue();
        for i in 0..10 {
            q.add(format!("key-{i}"));
        }
        q.shut_down();

        let w1 = {
            let q = q.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(k) = q.get().await {
                    seen.push(k.clone());
                    q.done(k);
                }
                seen
            })
        };
        let w2 = {
            let q = q.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(k) = q.get().await {
                    seen.push(k.clone());
                    q.done(k);
                }
                seen
            })
        };

        let mut all = w1.await.unwrap();
        all.extend(w2.await.unwrap());
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10, "every key delivered exactly once");
    }

    #[tokio::test]
    async fn num_requeues_tracks_failures() {
        let q = queue();
        assert_eq!(q.num_requeues(&key("a")), 0);
        q.add_rate_limited(key("a"));
        assert_eq!(q.num_requeues(&key("a")), 1);
        q.add_rate_limited(key("a"));
        assert_eq!(q.num_requeues(&key("a")), 2);
        // 다른 키에는 영향 없음
        assert_eq!(q.num_requeues(&key("b")), 0);
    }

    #[tokio::test]
    async fn forget_resets_requeue_count() {
        let q = queue();
        q.add_rate_limited(key("a"));
        q.add_rate_limited(key("a"));
        assert_eq!(q.num_requeues(&key("a")), 2);
        q.forget(&key("a"));
        assert_eq!(q.num_requeues(&key("a")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_add_is_delayed() {
        let q: WorkQueue<String> = WorkQueue::with_backoff(Duration::from_millis(500));
        q.add_rate_limited(key("a"));
        // 지연 전에는 큐에 없음
        assert_eq!(q.len(), 0);

        // 일시정지된 시계에서 타이머가 자동 진행되어 키가 도착함
        let got = q.get().await;
        assert_eq!(got, Some(key("a")));
    }

    #[tokio::test]
    async fn backoff_delay_grows_exponentially_with_cap() {
        let q: WorkQueue<String> = WorkQueue::with_backoff(Duration::from_millis(500));
        assert_eq!(q.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(q.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(q.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(q.backoff_delay(5), Duration::from_millis(8000));
        // 상한 적용
        assert_eq!(q.backoff_delay(30), MAX_BACKOFF_DELAY);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let q = queue();
        let q2 = q.clone();
        q.add(key("a"));
        assert_eq!(q2.len(), 1);
        assert_eq!(q2.get().await, Some(key("a")));
    }
}
