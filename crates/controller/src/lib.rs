//! sidewinder-controller — 이벤트 주도 사이드카 종료 컨트롤러
//!
//! 워크로드 유닛을 관찰하고, 메인 컨테이너가 끝났는데 사이드카만 살아남은
//! 유닛을 찾아 TERM 시그널로 정리하는 reconcile 파이프라인입니다.
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`ControllerError`)
//! - [`config`]: 컨트롤러 설정 (`ControllerConfig`)
//! - [`runtime`]: 런타임 API 추상화 (`RuntimeClient` trait, `BollardRuntimeClient`)
//! - [`queue`]: 중복 제거 워크큐 (`WorkQueue`)
//! - [`watch`]: 폴링 워처와 스냅샷 캐시 (`UnitWatcher`, `UnitStore`, `SnapshotStore`)
//! - [`decision`]: 순수 결정 엔진 (`decide`, `ShutdownCommand`)
//! - [`dispatch`]: 시그널 디스패처 (`ShutdownDispatcher`)
//! - [`handler`]: 유닛 이벤트 핸들러 (`UnitHandler`, `SidecarShutdownHandler`)
//! - [`reconciler`]: 워커 풀과 생명주기 (`Reconciler`, `ReconcilerBuilder`)
//!
//! # Architecture
//!
//! ```text
//! UnitWatcher --poll--> UnitStore (cache)
//!      |                    ^
//!      v                    | lookup
//! WorkQueue --get--> Reconciler workers
//!                        |
//!                   decide(snapshot)
//!                        |
//!                   ShutdownDispatcher --exec--> container runtime
//!                        |
//!                   SignalEvent / ReconcileEvent --mpsc--> daemon
//! ```

pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod queue;
pub mod reconciler;
pub mod runtime;
pub mod watch;

// --- Public API Re-exports ---

// Reconciler (main orchestrator)
pub use reconciler::{Reconciler, ReconcilerBuilder};

// Configuration
pub use config::ControllerConfig;

// Error
pub use error::ControllerError;

// Runtime API
pub use runtime::{BollardRuntimeClient, RuntimeClient};

// Queue
pub use queue::WorkQueue;

// Watch / cache
pub use watch::{SnapshotStore, UnitStore, UnitWatcher};

// Decision
pub use decision::{ContainerSets, ShutdownCommand, decide};

// Dispatch
pub use dispatch::ShutdownDispatcher;

// Handler
pub use handler::{SidecarShutdownHandler, UnitHandler};
