//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `sidewinder_`
//! - 모듈명: `queue_`, `reconcile_`, `signal_`, `watch_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(sidewinder_core::metrics::RECONCILE_CYCLES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 네임스페이스 레이블 키
pub const LABEL_NAMESPACE: &str = "namespace";

// ─── Work Queue 메트릭 ─────────────────────────────────────────────

/// Queue: 현재 대기 중인 키 수 (gauge)
pub const QUEUE_DEPTH: &str = "sidewinder_queue_depth";

/// Queue: 큐에 추가된 키 수 (counter)
pub const QUEUE_ADDS_TOTAL: &str = "sidewinder_queue_adds_total";

/// Queue: 중복으로 흡수된 추가 수 (counter)
pub const QUEUE_DEDUPED_TOTAL: &str = "sidewinder_queue_deduped_total";

/// Queue: 지연 requeue 수 (counter)
pub const QUEUE_REQUEUES_TOTAL: &str = "sidewinder_queue_requeues_total";

// ─── Reconcile 메트릭 ──────────────────────────────────────────────

/// Reconcile: 완료된 reconcile 주기 수 (counter, label: result)
pub const RECONCILE_CYCLES_TOTAL: &str = "sidewinder_reconcile_cycles_total";

/// Reconcile: 재시도 소진으로 포기한 키 수 (counter)
pub const RECONCILE_RETRIES_EXHAUSTED_TOTAL: &str = "sidewinder_reconcile_retries_exhausted_total";

// ─── Signal 메트릭 ─────────────────────────────────────────────────

/// Signal: 전달된 종료 시그널 수 (counter, label: result)
pub const SIGNALS_SENT_TOTAL: &str = "sidewinder_signals_sent_total";

/// Signal: 시그널 전달 재시도 수 (counter)
pub const SIGNAL_RETRIES_TOTAL: &str = "sidewinder_signal_retries_total";

// ─── Watch 메트릭 ──────────────────────────────────────────────────

/// Watch: 현재 추적 중인 워크로드 유닛 수 (gauge)
pub const WATCH_TRACKED_UNITS: &str = "sidewinder_watch_tracked_units";

/// Watch: 폴링 실패 수 (counter)
pub const WATCH_POLL_FAILURES_TOTAL: &str = "sidewinder_watch_poll_failures_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `sidewinder-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Work Queue
    describe_gauge!(QUEUE_DEPTH, "Number of keys currently waiting in the queue");
    describe_counter!(QUEUE_ADDS_TOTAL, "Total number of keys added to the queue");
    describe_counter!(
        QUEUE_DEDUPED_TOTAL,
        "Total number of adds absorbed by deduplication"
    );
    describe_counter!(
        QUEUE_REQUEUES_TOTAL,
        "Total number of delayed requeues after lookup failures"
    );

    // Reconcile
    describe_counter!(
        RECONCILE_CYCLES_TOTAL,
        "Total number of completed reconcile cycles"
    );
    describe_counter!(
        RECONCILE_RETRIES_EXHAUSTED_TOTAL,
        "Total number of keys dropped after exhausting retries"
    );

    // Signal
    describe_counter!(
        SIGNALS_SENT_TOTAL,
        "Total number of termination signals delivered to containers"
    );
    describe_counter!(
        SIGNAL_RETRIES_TOTAL,
        "Total number of signal delivery retry attempts"
    );

    // Watch
    describe_gauge!(
        WATCH_TRACKED_UNITS,
        "Number of workload units currently tracked by the watcher"
    );
    describe_counter!(
        WATCH_POLL_FAILURES_TOTAL,
        "Total number of failed workload list polls"
    );
}
