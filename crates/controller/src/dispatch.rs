//! 종료 명령 디스패처 — 결정 엔진의 출력을 런타임 시그널로 변환
//!
//! [`ShutdownDispatcher`]는 [`ShutdownCommand`]의 각 대상 컨테이너에 대해
//! 독립적인 재시도 루프를 돌립니다. 한 컨테이너의 전달 실패가 다른
//! 컨테이너의 전달을 막지 않으며, 최종 실패도 에러로 전파되지 않고
//! 이벤트와 로그로만 보고됩니다. 같은 주기에 다시 판정되면 어차피 같은
//! 명령이 도출되므로, 놓친 컨테이너는 다음 reconcile에서 다시 시도됩니다.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use sidewinder_core::event::SignalEvent;
use sidewinder_core::metrics::{LABEL_RESULT, SIGNAL_RETRIES_TOTAL, SIGNALS_SENT_TOTAL};

use crate::decision::ShutdownCommand;
use crate::runtime::RuntimeClient;

/// 시그널 전달 시도 사이의 기본 고정 지연
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// 컨테이너당 기본 최대 전달 시도 횟수
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// 종료 시그널 디스패처
///
/// 런타임 클라이언트를 공유하고(`Arc`), 전달 결과를 [`SignalEvent`]로 방출합니다.
pub struct ShutdownDispatcher<R: RuntimeClient> {
    client: Arc<R>,
    attempts: u32,
    retry_delay: Duration,
    signal_tx: mpsc::Sender<SignalEvent>,
}

impl<R: RuntimeClient> ShutdownDispatcher<R> {
    /// 디스패처를 생성합니다.
    pub fn new(
        client: Arc<R>,
        attempts: u32,
        retry_delay: Duration,
        signal_tx: mpsc::Sender<SignalEvent>,
    ) -> Self {
        Self {
            client,
            attempts,
            retry_delay,
            signal_tx,
        }
    }

    /// 명령의 모든 대상에 종료 시그널을 전달하고, 성공한 컨테이너 수를 반환합니다.
    ///
    /// 대상별로 독립 재시도하며, 실패는 이벤트와 로그로만 보고됩니다.
    pub async fn dispatch(&self, command: &ShutdownCommand, trace_id: &str) -> usize {
        info!(key = %command.key, command = %command, "dispatching shutdown command");

        let mut signalled = 0;
        for target in &command.targets {
            if self.signal_with_retry(command, target, trace_id).await {
                signalled += 1;
            }
        }
        signalled
    }

    /// 컨테이너 하나에 대한 재시도 루프. 성공 여부를 반환합니다.
    async fn signal_with_retry(
        &self,
        command: &ShutdownCommand,
        target: &sidewinder_core::types::ContainerStatus,
        trace_id: &str,
    ) -> bool {
        for attempt in 1..=self.attempts {
            match self.client.signal_container(&target.id).await {
                Ok(()) => {
                    info!(
                        key = %command.key,
                        container = %target.name,
                        attempt,
                        "TERM signal delivered"
                    );
                    counter!(SIGNALS_SENT_TOTAL, LABEL_RESULT => "success").increment(1);
                    self.emit(command, &target.name, attempt, true, trace_id)
                        .await;
                    return true;
                }
                Err(e) if attempt < self.attempts => {
                    warn!(
                        key = %command.key,
                        container = %target.name,
                        attempt,
                        error = %e,
                        "signal delivery failed, retrying"
                    );
                    counter!(SIGNAL_RETRIES_TOTAL).increment(1);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        key = %command.key,
                        container = %target.name,
                        attempts = self.attempts,
                        error = %e,
                        "signal delivery failed, giving up"
                    );
                    counter!(SIGNALS_SENT_TOTAL, LABEL_RESULT => "failure").increment(1);
                    self.emit(command, &target.name, self.attempts, false, trace_id)
                        .await;
                    return false;
                }
            }
        }
        false
    }

    async fn emit(
        &self,
        command: &ShutdownCommand,
        container: &str,
        attempts: u32,
        success: bool,
        trace_id: &str,
    ) {
        let event = SignalEvent::with_trace(
            command.key.clone(),
            container,
            attempts,
            success,
            trace_id,
        );
        if let Err(e) = self.signal_tx.send(event).await {
            // 수신 측이 이미 종료됨. 전달 자체에는 영향 없음.
            debug!(error = %e, "signal event channel closed");
        }
    }
}
