//! Sidewinder 공통 크레이트
//!
//! 사이드카 종료 컨트롤러의 모든 모듈이 공유하는 타입, 에러, 이벤트,
//! 설정, 메트릭 정의를 제공합니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, ReconcileError, RuntimeError, SidewinderError};

// 설정
pub use config::SidewinderConfig;

// 이벤트
pub use event::{Event, EventMetadata, ReconcileEvent, ReconcileOutcome, SignalEvent};

// 도메인 타입
pub use types::{ContainerStatus, NameSet, TerminationReason, WorkloadKey, WorkloadSnapshot};
