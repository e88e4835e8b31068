//! 에러 타입 — 도메인별 에러 정의

/// Sidewinder 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SidewinderError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 런타임 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// reconcile 처리 에러
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 런타임 데몬 연결 실패
    #[error("runtime connection error: {0}")]
    Connection(String),

    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    Api(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 종료 시그널 전달 실패
    #[error("signal delivery failed for container '{container_id}': {reason}")]
    SignalDelivery {
        /// 대상 컨테이너 ID
        container_id: String,
        /// 실패 사유
        reason: String,
    },
}

/// reconcile 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// 초기 동기화가 제한 시간 내에 끝나지 않음
    #[error("event source did not sync within {timeout_secs}s")]
    SyncTimeout {
        /// 대기한 시간 (초)
        timeout_secs: u64,
    },

    /// 스냅샷 조회 실패
    #[error("lookup failed for key '{key}': {reason}")]
    LookupFailed { key: String, reason: String },

    /// 재시도 한도를 소진함
    #[error("retries exhausted for key '{key}' after {attempts} requeues")]
    RetriesExhausted { key: String, attempts: u32 },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}
