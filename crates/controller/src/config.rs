//! 컨트롤러 설정
//!
//! [`ControllerConfig`]는 core의 [`SidewinderConfig`](sidewinder_core::config::SidewinderConfig)에서
//! 컨트롤러가 사용하는 필드만 모아 평탄화한 뷰입니다.
//!
//! # 사용 예시
//! ```ignore
//! use sidewinder_core::config::SidewinderConfig;
//! use sidewinder_controller::config::ControllerConfig;
//!
//! let core_config = SidewinderConfig::default();
//! let config = ControllerConfig::from_core(&core_config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// 컨트롤러 설정
///
/// core의 `[runtime]`, `[controller]`, `[shutdown]` 섹션에서 파생됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Docker 소켓 경로 (빈 문자열이면 플랫폼 기본값)
    pub docker_socket: String,
    /// reconcile 워커 수
    pub workers: usize,
    /// 조회 실패 시 최대 requeue 횟수
    pub max_retries: u32,
    /// 초기 캐시 동기화 대기 시간 (초)
    pub sync_timeout_secs: u64,
    /// 워크로드 목록 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// requeue 지수 백오프 기준 지연 (밀리초)
    pub requeue_backoff_base_ms: u64,
    /// 컨테이너당 최대 시그널 전달 시도 횟수
    pub shutdown_attempts: u32,
    /// 시그널 전달 시도 사이의 고정 지연 (초)
    pub shutdown_retry_delay_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            workers: 1,
            max_retries: 5,
            sync_timeout_secs: 30,
            poll_interval_secs: 2,
            requeue_backoff_base_ms: 500,
            shutdown_attempts: 5,
            shutdown_retry_delay_secs: 3,
        }
    }
}

/// 설정 상한값 상수
const MAX_WORKERS: usize = 64;
const MAX_RETRIES_LIMIT: u32 = 100;
const MAX_SYNC_TIMEOUT_SECS: u64 = 600;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;
const MAX_REQUEUE_BACKOFF_BASE_MS: u64 = 30_000;
const MAX_SHUTDOWN_ATTEMPTS: u32 = 50;

impl ControllerConfig {
    /// core 설정에서 컨트롤러 설정을 생성합니다.
    pub fn from_core(core: &sidewinder_core::config::SidewinderConfig) -> Self {
        Self {
            docker_socket: core.runtime.docker_socket.clone(),
            workers: core.controller.workers,
            max_retries: core.controller.max_retries,
            sync_timeout_secs: core.controller.sync_timeout_secs,
            poll_interval_secs: core.controller.poll_interval_secs,
            requeue_backoff_base_ms: core.controller.requeue_backoff_base_ms,
            shutdown_attempts: core.shutdown.attempts,
            shutdown_retry_delay_secs: core.shutdown.retry_delay_secs,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ControllerError::Config {
                field: "workers".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ControllerError::Config {
                field: "max_retries".to_owned(),
                reason: format!("must be 0-{MAX_RETRIES_LIMIT}"),
            });
        }

        if self.sync_timeout_secs == 0 || self.sync_timeout_secs > MAX_SYNC_TIMEOUT_SECS {
            return Err(ControllerError::Config {
                field: "sync_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_SYNC_TIMEOUT_SECS}"),
            });
        }

        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(ControllerError::Config {
                field: "poll_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_SECS}"),
            });
        }

        if self.requeue_backoff_base_ms == 0
            || self.requeue_backoff_base_ms > MAX_REQUEUE_BACKOFF_BASE_MS
        {
            return Err(ControllerError::Config {
                field: "requeue_backoff_base_ms".to_owned(),
                reason: format!("must be 1-{MAX_REQUEUE_BACKOFF_BASE_MS}"),
            });
        }

        if self.shutdown_attempts == 0 || self.shutdown_attempts > MAX_SHUTDOWN_ATTEMPTS {
            return Err(ControllerError::Config {
                field: "shutdown_attempts".to_owned(),
                reason: format!("must be 1-{MAX_SHUTDOWN_ATTEMPTS}"),
            });
        }

        Ok(())
    }
}
