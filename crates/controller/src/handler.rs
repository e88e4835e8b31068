//! 유닛 이벤트 핸들러
//!
//! [`UnitHandler`] trait은 reconcile 워커가 키를 처리할 때 호출하는
//! 도메인 로직의 경계입니다. [`SidecarShutdownHandler`]가 기본 구현으로,
//! 결정 엔진과 디스패처를 연결합니다.

use std::future::Future;

use tracing::debug;

use sidewinder_core::types::{WorkloadKey, WorkloadSnapshot};

use crate::decision;
use crate::dispatch::ShutdownDispatcher;
use crate::error::ControllerError;
use crate::runtime::RuntimeClient;

/// 유닛 상태 변화에 반응하는 핸들러 trait
///
/// 모든 메서드는 기본 no-op 구현을 가지므로, 필요한 콜백만 재정의하면 됩니다.
/// 반환값은 이번 처리에서 시그널이 전달된 컨테이너 수입니다.
pub trait UnitHandler: Send + Sync + 'static {
    /// 유닛이 존재하는 상태로 관측되었을 때 호출됩니다 (신규 또는 변경).
    fn unit_applied(
        &self,
        snapshot: &WorkloadSnapshot,
        trace_id: &str,
    ) -> impl Future<Output = Result<usize, ControllerError>> + Send {
        let _ = (snapshot, trace_id);
        async { Ok(0) }
    }

    /// 유닛이 캐시에서 사라졌을 때 호출됩니다.
    fn unit_deleted(
        &self,
        key: &WorkloadKey,
        trace_id: &str,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send {
        let _ = (key, trace_id);
        async { Ok(()) }
    }
}

/// 사이드카 종료 핸들러 — 판정 후 시그널 디스패치
pub struct SidecarShutdownHandler<R: RuntimeClient> {
    dispatcher: ShutdownDispatcher<R>,
}

impl<R: RuntimeClient> SidecarShutdownHandler<R> {
    /// 핸들러를 생성합니다.
    pub fn new(dispatcher: ShutdownDispatcher<R>) -> Self {
        Self { dispatcher }
    }
}

impl<R: RuntimeClient> UnitHandler for SidecarShutdownHandler<R> {
    async fn unit_applied(
        &self,
        snapshot: &WorkloadSnapshot,
        trace_id: &str,
    ) -> Result<usize, ControllerError> {
        match decision::decide(snapshot) {
            Some(command) => Ok(self.dispatcher.dispatch(&command, trace_id).await),
            None => {
                debug!(key = %snapshot.key, "no shutdown decision for unit");
                Ok(0)
            }
        }
    }

    async fn unit_deleted(&self, key: &WorkloadKey, _trace_id: &str) -> Result<(), ControllerError> {
        debug!(%key, "unit deleted, nothing to clean up");
        Ok(())
    }
}
