//! 컨트롤러 에러 타입
//!
//! [`ControllerError`]는 reconcile 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ControllerError> for SidewinderError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use sidewinder_core::error::{ReconcileError, RuntimeError, SidewinderError};

/// 컨트롤러 도메인 에러
///
/// 런타임 API 호출, 스냅샷 조회, 시그널 전달, 설정 에러 등
/// 컨트롤러 내부의 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// 런타임 데몬 연결 실패
    #[error("runtime connection error: {0}")]
    RuntimeConnection(String),

    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    RuntimeApi(String),

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

    /// 초기 캐시 동기화가 제한 시간 내에 끝나지 않음
    #[error("event source did not sync within {timeout_secs}s")]
    SyncTimeout {
        /// 대기한 시간 (초)
        timeout_secs: u64,
    },

    /// 스냅샷 조회 실패
    #[error("lookup failed for key '{key}': {reason}")]
    Lookup {
        /// 대상 유닛 키
        key: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<ControllerError> for SidewinderError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::RuntimeConnection(msg) => {
                SidewinderError::Runtime(RuntimeError::Connection(msg))
            }
            ControllerError::RuntimeApi(msg) => SidewinderError::Runtime(RuntimeError::Api(msg)),
            ControllerError::ContainerNotFound(id) => {
                SidewinderError::Runtime(RuntimeError::ContainerNotFound(id))
            }
            ControllerError::SignalDelivery {
                container_id,
                reason,
            } => SidewinderError::Runtime(RuntimeError::SignalDelivery {
                container_id,
                reason,
            }),
            ControllerError::SyncTimeout { timeout_secs } => {
                SidewinderError::Reconcile(ReconcileError::SyncTimeout { timeout_secs })
            }
            ControllerError::Lookup { key, reason } => {
                SidewinderError::Reconcile(ReconcileError::LookupFailed { key, reason })
            }
            ControllerError::Config { field, reason } => {
                SidewinderError::Config(sidewinder_core::error::ConfigError::InvalidValue {
                    field,
                    reason,
                })
            }
            ControllerError::Channel(msg) => {
                SidewinderError::Reconcile(ReconcileError::Channel(msg))
            }
        }
    }
}
