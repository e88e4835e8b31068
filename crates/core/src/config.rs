//! 설정 관리 — sidewinder.toml 파싱 및 런타임 설정
//!
//! [`SidewinderConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SIDEWINDER_CONTROLLER_WORKERS=4` 형식)
//! 3. 설정 파일 (`sidewinder.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), sidewinder_core::error::SidewinderError> {
//! use sidewinder_core::config::SidewinderConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SidewinderConfig::load("sidewinder.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SidewinderConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SidewinderError};

/// Sidewinder 통합 설정
///
/// `sidewinder.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidewinderConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 컨트롤러 설정
    #[serde(default)]
    pub controller: ControllerConfig,
    /// 종료 시그널 디스패치 설정
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl SidewinderConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SidewinderError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SidewinderError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SidewinderError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SidewinderError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SidewinderError> {
        toml::from_str(toml_str).map_err(|e| {
            SidewinderError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SIDEWINDER_{SECTION}_{FIELD}`
    /// 예: `SIDEWINDER_RUNTIME_DOCKER_SOCKET=/run/docker.sock`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SIDEWINDER_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "SIDEWINDER_GENERAL_LOG_FORMAT",
        );

        // Runtime
        override_string(
            &mut self.runtime.docker_socket,
            "SIDEWINDER_RUNTIME_DOCKER_SOCKET",
        );

        // Controller
        override_usize(&mut self.controller.workers, "SIDEWINDER_CONTROLLER_WORKERS");
        override_u32(
            &mut self.controller.max_retries,
            "SIDEWINDER_CONTROLLER_MAX_RETRIES",
        );
        override_u64(
            &mut self.controller.sync_timeout_secs,
            "SIDEWINDER_CONTROLLER_SYNC_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.controller.poll_interval_secs,
            "SIDEWINDER_CONTROLLER_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.controller.requeue_backoff_base_ms,
            "SIDEWINDER_CONTROLLER_REQUEUE_BACKOFF_BASE_MS",
        );

        // Shutdown
        override_u32(&mut self.shutdown.attempts, "SIDEWINDER_SHUTDOWN_ATTEMPTS");
        override_u64(
            &mut self.shutdown.retry_delay_secs,
            "SIDEWINDER_SHUTDOWN_RETRY_DELAY_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SidewinderError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.controller.workers == 0 || self.controller.workers > 64 {
            return Err(ConfigError::InvalidValue {
                field: "controller.workers".to_owned(),
                reason: "must be between 1 and 64".to_owned(),
            }
            .into());
        }

        if self.controller.sync_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "controller.sync_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.controller.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "controller.poll_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.controller.requeue_backoff_base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "controller.requeue_backoff_base_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.shutdown.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "shutdown.attempts".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Docker 소켓 경로 (빈 문자열이면 플랫폼 기본값 사용)
    pub docker_socket: String,
}

/// 컨트롤러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
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
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: 5,
            sync_timeout_secs: 30,
            poll_interval_secs: 2,
            requeue_backoff_base_ms: 500,
        }
    }
}

/// 종료 시그널 디스패치 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// 컨테이너당 최대 전달 시도 횟수
    pub attempts: u32,
    /// 시도 사이의 고정 지연 (초)
    pub retry_delay_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_delay_secs: 3,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
