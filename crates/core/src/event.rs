//! 이벤트 시스템 — reconcile 결과와 시그널 전달 결과 보고
//!
//! 컨트롤러는 처리 결과를 이벤트로 방출하고, 데몬이 이를 수신하여 기록합니다.
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 메타데이터이며,
//! [`Event`] trait은 모든 이벤트 타입이 구현해야 하는 인터페이스입니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::WorkloadKey;

// --- 모듈명 상수 ---

/// 컨트롤러 모듈명
pub const MODULE_CONTROLLER: &str = "controller";
/// 데몬 모듈명
pub const MODULE_DAEMON: &str = "daemon";

// --- 이벤트 타입 상수 ---

/// reconcile 결과 이벤트 타입
pub const EVENT_TYPE_RECONCILE: &str = "reconcile";
/// 시그널 전달 이벤트 타입
pub const EVENT_TYPE_SIGNAL: &str = "signal";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 분산 추적 ID — 같은 reconcile 주기의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        write!(
            f,
            "[{}] source={} trace={}",
            secs, self.source_module, self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 단일 reconcile 주기의 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// 스냅샷이 존재하여 처리함 (`signalled`는 시그널을 보낸 컨테이너 수)
    Applied {
        /// 시그널이 전달된 컨테이너 수 (0이면 결정 엔진이 대상 없음 판정)
        signalled: usize,
    },
    /// 유닛이 삭제되어 정리함
    Deleted,
    /// 조회 실패로 재시도 큐에 다시 넣음
    Requeued {
        /// 현재까지의 requeue 횟수
        requeues: u32,
    },
    /// 재시도 한도를 소진하고 키를 포기함
    RetriesExhausted {
        /// 마지막 에러 메시지
        reason: String,
    },
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied { signalled } => write!(f, "applied(signalled={signalled})"),
            Self::Deleted => write!(f, "deleted"),
            Self::Requeued { requeues } => write!(f, "requeued(requeues={requeues})"),
            Self::RetriesExhausted { reason } => write!(f, "retries_exhausted({reason})"),
        }
    }
}

/// reconcile 주기 완료 이벤트
///
/// 워커가 키 하나를 처리할 때마다 방출됩니다. 재시도 소진 보고가
/// 프로세스 전역 에러 리포터 역할을 대신합니다.
#[derive(Debug, Clone)]
pub struct ReconcileEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 처리한 유닛 키
    pub key: WorkloadKey,
    /// 처리 결과
    pub outcome: ReconcileOutcome,
}

impl ReconcileEvent {
    /// 기존 trace에 연결된 reconcile 이벤트를 생성합니다.
    pub fn with_trace(
        key: WorkloadKey,
        outcome: ReconcileOutcome,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_CONTROLLER, trace_id),
            key,
            outcome,
        }
    }
}

impl Event for ReconcileEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_RECONCILE
    }
}

impl fmt::Display for ReconcileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReconcileEvent[{}] key={} outcome={}",
            &self.id[..8.min(self.id.len())],
            self.key,
            self.outcome,
        )
    }
}

/// 시그널 전달 이벤트 (컨테이너 단위)
///
/// 디스패처가 대상 컨테이너 하나에 대한 전달 시도를 마칠 때마다 방출됩니다.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 대상 유닛 키
    pub key: WorkloadKey,
    /// 대상 컨테이너 이름
    pub container: String,
    /// 소요된 시도 횟수
    pub attempts: u32,
    /// 전달 성공 여부
    pub success: bool,
}

impl SignalEvent {
    /// 기존 trace에 연결된 시그널 이벤트를 생성합니다.
    pub fn with_trace(
        key: WorkloadKey,
        container: impl Into<String>,
        attempts: u32,
        success: bool,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_CONTROLLER, trace_id),
            key,
            container: container.into(),
            attempts,
            success,
        }
    }
}

impl Event for SignalEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_SIGNAL
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "OK" } else { "FAILED" };
        write!(
            f,
            "SignalEvent[{}] key={} container={} attempts={} status={}",
            &self.id[..8.min(self.id.len())],
            self.key,
            self.container,
            self.attempts,
            status,
        )
    }
}
