//! 컨테이너 런타임 API 추상화
//!
//! [`RuntimeClient`] trait은 bollard Docker API를 추상화하여, 프로덕션에서는
//! [`BollardRuntimeClient`]를 쓰고 테스트에서는 `MockRuntimeClient`를 쓸 수
//! 있게 합니다.
//!
//! # 워크로드 유닛 구성
//!
//! `io.sidewinder.unit` 라벨을 가진 컨테이너들을 라벨 값으로 묶어 하나의
//! [`WorkloadSnapshot`]을 만듭니다. 라벨 값은 `namespace/name` 또는 `name`
//! 형식이며, 유닛 단위 어노테이션(`io.sidewinder.main` 등)은 구성 컨테이너의
//! 라벨에서 읽습니다.
//!
//! # 시그널 전달
//!
//! `signal_container`는 한 번의 완결된 전달 시도입니다: exec 인스턴스 생성 →
//! 스트리밍 attach 시작 → 출력 스트림이 정상적으로 닫힐 때까지 소진.
//! 어느 단계에서든 실패하면 에러를 반환하고, 재시도는 디스패처의 몫입니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{trace, warn};

use sidewinder_core::types::{
    ContainerStatus, MAIN_CONTAINERS_LABEL, SIDECAR_CONTAINERS_LABEL, TerminationReason,
    UNIT_LABEL, WorkloadKey, WorkloadSnapshot,
};

use crate::error::ControllerError;

/// PID 1에 TERM 시그널을 보내는 exec 명령
const TERM_SIGNAL_COMMAND: [&str; 3] = ["sh", "-c", "kill -s TERM 1"];

/// 컨테이너 ID를 검증합니다 (1-64자 16진수).
fn validate_container_id(id: &str) -> Result<(), ControllerError> {
    if id.is_empty() || id.len() > 64 {
        return Err(ControllerError::RuntimeApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ControllerError::RuntimeApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// 런타임 API 추상화 trait
///
/// `Send + Sync + 'static` 바운드로 async 태스크 간 안전한 공유를 보장합니다.
pub trait RuntimeClient: Send + Sync + 'static {
    /// 추적 라벨이 붙은 컨테이너들을 유닛 단위로 묶어 반환합니다.
    fn list_units(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkloadSnapshot>, ControllerError>> + Send;

    /// 컨테이너의 PID 1에 TERM 시그널을 전달합니다 (한 번의 완결된 시도).
    fn signal_container(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// 런타임 데몬 연결 상태를 확인합니다.
    fn ping(&self) -> impl Future<Output = Result<(), ControllerError>> + Send;
}

// --- 상태 매핑 헬퍼 (순수 함수, 단위 테스트 대상) ---

/// inspect 결과의 종료 정보에서 종료 사유를 도출합니다.
fn terminal_reason(exit_code: Option<i64>, oom_killed: bool) -> TerminationReason {
    if oom_killed {
        return TerminationReason::OomKilled;
    }
    match exit_code {
        Some(0) => TerminationReason::Completed,
        Some(_) => TerminationReason::Error,
        None => TerminationReason::Unknown,
    }
}

/// inspect 결과에서 [`ContainerStatus`]를 만듭니다.
fn container_status(
    id: String,
    name: String,
    running: bool,
    exit_code: Option<i64>,
    oom_killed: bool,
) -> ContainerStatus {
    if running {
        ContainerStatus {
            id,
            name,
            ready: true,
            terminated: None,
        }
    } else {
        ContainerStatus {
            id,
            name,
            ready: false,
            terminated: Some(terminal_reason(exit_code, oom_killed)),
        }
    }
}

/// 유닛 어노테이션으로 채택할 라벨 키
const UNIT_ANNOTATION_KEYS: [&str; 2] = [MAIN_CONTAINERS_LABEL, SIDECAR_CONTAINERS_LABEL];

/// 컨테이너별 (상태, 라벨) 묶음에서 유닛 스냅샷을 조립합니다.
///
/// 어노테이션은 구성 컨테이너 라벨의 합집합이며, 같은 키가 여러 번 나오면
/// 먼저 본 값이 유지됩니다. 컨테이너는 이름 순으로 정렬됩니다.
fn assemble_snapshot(
    key: WorkloadKey,
    node: String,
    members: Vec<(ContainerStatus, HashMap<String, String>)>,
) -> WorkloadSnapshot {
    let mut annotations = BTreeMap::new();
    let mut containers = Vec::with_capacity(members.len());
    for (status, labels) in members {
        for anno_key in UNIT_ANNOTATION_KEYS {
            if let Some(value) = labels.get(anno_key) {
                annotations
                    .entry(anno_key.to_owned())
                    .or_insert_with(|| value.clone());
            }
        }
        containers.push(status);
    }
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    WorkloadSnapshot {
        key,
        node,
        annotations,
        containers,
    }
}

/// bollard 기반 프로덕션 런타임 클라이언트
///
/// Unix 소켓으로 Docker 데몬과 통신합니다. 내부적으로 `Arc<bollard::Docker>`를
/// 사용하여 async 태스크 간 안전하게 공유됩니다.
pub struct BollardRuntimeClient {
    docker: Arc<bollard::Docker>,
    node: String,
}

impl BollardRuntimeClient {
    /// 플랫폼 기본 소켓으로 연결합니다.
    pub fn connect_local() -> Result<Self, ControllerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ControllerError::RuntimeConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
            node: local_node_name(),
        })
    }

    /// 지정한 소켓 경로로 연결합니다.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ControllerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ControllerError::RuntimeConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
            node: local_node_name(),
        })
    }

    async fn inspect_status(&self, id: &str, name: &str) -> Result<ContainerStatus, ControllerError> {
        let details = self.docker.inspect_container(id, None).await.map_err(|e| {
            if e.to_string().contains("404") {
                ControllerError::ContainerNotFound(id.to_owned())
            } else {
                ControllerError::RuntimeApi(format!("inspect container failed: {e}"))
            }
        })?;

        let state = details.state.unwrap_or_default();
        Ok(container_status(
            id.to_owned(),
            name.to_owned(),
            state.running.unwrap_or(false),
            state.exit_code,
            state.oom_killed.unwrap_or(false),
        ))
    }
}

/// 로그와 스냅샷에 기록할 노드(호스트) 식별자
fn local_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_owned())
}

impl RuntimeClient for BollardRuntimeClient {
    async fn list_units(&self) -> Result<Vec<WorkloadSnapshot>, ControllerError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert("label".to_owned(), vec![UNIT_LABEL.to_owned()]);
        let options = ListContainersOptions::<String> {
            all: true, // 종료된 컨테이너의 완료 상태도 관측해야 함
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ControllerError::RuntimeApi(format!("list containers failed: {e}")))?;

        // 유닛 라벨 값으로 그룹화
        let mut groups: HashMap<WorkloadKey, Vec<(String, String, HashMap<String, String>)>> =
            HashMap::new();
        for container in containers {
            let id = container.id.unwrap_or_default();
            let labels = container.labels.unwrap_or_default();
            let Some(raw_unit) = labels.get(UNIT_LABEL) else {
                continue;
            };
            let Some(key) = WorkloadKey::parse(raw_unit) else {
                warn!(container_id = %id, unit = %raw_unit, "malformed unit label, skipping container");
                continue;
            };
            let name = container
                .names
                .unwrap_or_default()
                .first()
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_else(|| id.clone());
            groups.entry(key).or_default().push((id, name, labels));
        }

        let mut snapshots = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut inspected = Vec::with_capacity(members.len());
            for (id, name, labels) in members {
                let status = self.inspect_status(&id, &name).await?;
                inspected.push((status, labels));
            }
            snapshots.push(assemble_snapshot(key, self.node.clone(), inspected));
        }
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(snapshots)
    }

    async fn signal_container(&self, container_id: &str) -> Result<(), ControllerError> {
        use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};

        validate_container_id(container_id)?;

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions::<String> {
                    cmd: Some(TERM_SIGNAL_COMMAND.iter().map(|s| (*s).to_owned()).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ControllerError::SignalDelivery {
                container_id: container_id.to_owned(),
                reason: format!("create exec failed: {e}"),
            })?;

        let results = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(|e| ControllerError::SignalDelivery {
                container_id: container_id.to_owned(),
                reason: format!("start exec failed: {e}"),
            })?;

        match results {
            StartExecResults::Attached { mut output, .. } => {
                // 스트림이 정상적으로 닫힐 때까지 출력을 소진
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(log) => trace!(container_id, output = %log, "signal exec output"),
                        Err(e) => {
                            return Err(ControllerError::SignalDelivery {
                                container_id: container_id.to_owned(),
                                reason: format!("exec stream closed with error: {e}"),
                            });
                        }
                    }
                }
                Ok(())
            }
            StartExecResults::Detached => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), ControllerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ControllerError::RuntimeConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 런타임 클라이언트
///
/// 설정 가능한 유닛 목록과 실패 스크립트를 제공하여 Docker 없이도
/// 파이프라인 전체를 테스트할 수 있습니다.
#[cfg(test)]
pub struct MockRuntimeClient {
    units: std::sync::Mutex<Vec<WorkloadSnapshot>>,
    /// 컨테이너 ID별 남은 실패 횟수 (소진되면 성공)
    signal_failures: std::sync::Mutex<HashMap<String, u32>>,
    fail_all_signals: bool,
    fail_list: bool,
    signal_calls: std::sync::Mutex<Vec<String>>,
    list_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl Default for MockRuntimeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockRuntimeClient {
    /// 빈 유닛 목록으로 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self {
            units: std::sync::Mutex::new(Vec::new()),
            signal_failures: std::sync::Mutex::new(HashMap::new()),
            fail_all_signals: false,
            fail_list: false,
            signal_calls: std::sync::Mutex::new(Vec::new()),
            list_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// 테스트용 유닛 스냅샷을 설정합니다.
    pub fn with_units(self, units: Vec<WorkloadSnapshot>) -> Self {
        *self.units.lock().unwrap() = units;
        self
    }

    /// 특정 컨테이너의 시그널 전달이 `failures`번 실패한 뒤 성공하도록 설정합니다.
    pub fn with_signal_failures(self, container_id: &str, failures: u32) -> Self {
        self.signal_failures
            .lock()
            .unwrap()
            .insert(container_id.to_owned(), failures);
        self
    }

    /// 모든 시그널 전달이 실패하도록 설정합니다.
    pub fn with_failing_signals(mut self) -> Self {
        self.fail_all_signals = true;
        self
    }

    /// 유닛 목록 조회가 실패하도록 설정합니다.
    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// 유닛 목록을 교체합니다 (워처 diff 테스트용).
    pub fn set_units(&self, units: Vec<WorkloadSnapshot>) {
        *self.units.lock().unwrap() = units;
    }

    /// 지금까지의 시그널 호출 대상 목록을 반환합니다.
    pub fn signal_calls(&self) -> Vec<String> {
        self.signal_calls.lock().unwrap().clone()
    }

    /// 특정 컨테이너에 대한 시그널 호출 횟수를 반환합니다.
    pub fn signal_count(&self, container_id: &str) -> usize {
        self.signal_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == container_id)
            .count()
    }

    /// 유닛 목록 조회 횟수를 반환합니다.
    pub fn list_count(&self) -> usize {
        self.list_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RuntimeClient for MockRuntimeClient {
    async fn list_units(&self) -> Result<Vec<WorkloadSnapshot>, ControllerError> {
        self.list_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_list {
            return Err(ControllerError::RuntimeApi("mock list failure".to_owned()));
        }
        Ok(self.units.lock().unwrap().clone())
    }

    async fn signal_container(&self, container_id: &str) -> Result<(), ControllerError> {
        self.signal_calls
            .lock()
            .unwrap()
            .push(container_id.to_owned());

        if self.fail_all_signals {
            return Err(ControllerError::SignalDelivery {
                container_id: container_id.to_owned(),
                reason: "mock failure".to_owned(),
            });
        }

        let mut failures = self.signal_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(container_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ControllerError::SignalDelivery {
                    container_id: container_id.to_owned(),
                    reason: "mock scripted failure".to_owned(),
                });
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), ControllerError> {
        Ok(())
    }
}
