//! 결정 엔진 — 스냅샷을 읽고 종료 대상을 판정하는 순수 함수
//!
//! [`decide`]는 I/O 없이 [`WorkloadSnapshot`] 하나만 보고
//! [`ShutdownCommand`]를 도출합니다. 같은 입력에는 항상 같은 출력을
//! 반환하므로 reconcile이 몇 번 반복되어도 결과가 달라지지 않습니다.
//!
//! # 판정 규칙
//!
//! 1. 관측 완전성 가드: 모든 컨테이너가 실행 중이거나 완료 상태여야 함.
//!    중간 상태(시작 중, 강제 종료 등)가 하나라도 있으면 판정을 보류합니다.
//! 2. 규칙 A (메인 완료): 선언된 메인 컨테이너가 모두 완료되었고 아직
//!    실행 중인 컨테이너가 남아 있으면, 남은 컨테이너들을 종료 대상으로.
//! 3. 규칙 B (사이드카만 잔존): 실행 중인 컨테이너 집합이 선언된 사이드카
//!    집합과 정확히 일치하면 그들을 종료 대상으로.
//!
//! 규칙 A가 B보다 우선합니다.

use std::fmt;

use tracing::debug;

use sidewinder_core::types::{
    ContainerStatus, MAIN_CONTAINERS_LABEL, NameSet, SIDECAR_CONTAINERS_LABEL, WorkloadKey,
    WorkloadSnapshot,
};

/// 스냅샷에서 도출한 컨테이너 이름 집합들
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSets {
    /// 유닛의 모든 컨테이너 이름
    pub all: NameSet,
    /// 실행 중인 컨테이너 이름
    pub running: NameSet,
    /// 완료된 컨테이너 이름 (정상 종료 + 에러 종료)
    pub completed: NameSet,
}

impl ContainerSets {
    /// 스냅샷의 컨테이너 상태 목록에서 집합들을 만듭니다.
    pub fn from_snapshot(snapshot: &WorkloadSnapshot) -> Self {
        let mut all = NameSet::new();
        let mut running = NameSet::new();
        let mut completed = NameSet::new();
        for container in &snapshot.containers {
            all.insert(container.name.clone());
            if container.ready {
                running.insert(container.name.clone());
            } else if container.is_completed() {
                completed.insert(container.name.clone());
            }
        }
        Self {
            all,
            running,
            completed,
        }
    }

    /// 관측이 완전한지 검사합니다: 모든 컨테이너가 실행 중 또는 완료 상태.
    pub fn observation_complete(&self) -> bool {
        self.running.union(&self.completed) == self.all
    }
}

/// 종료 명령 — 결정 엔진의 출력, 디스패처의 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownCommand {
    /// 대상 유닛 키
    pub key: WorkloadKey,
    /// 종료 시그널을 받을 컨테이너들
    pub targets: Vec<ContainerStatus>,
}

impl fmt::Display for ShutdownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = NameSet::from_names(self.targets.iter().map(|c| c.name.clone()));
        write!(f, "shutdown {} targets={}", self.key, names)
    }
}

/// 스냅샷을 판정하여 종료 명령을 도출합니다.
///
/// 추적 대상이 아니거나, 관측이 불완전하거나, 어떤 규칙에도 해당하지
/// 않으면 `None`을 반환합니다 (이번 주기에는 할 일 없음).
pub fn decide(snapshot: &WorkloadSnapshot) -> Option<ShutdownCommand> {
    let main_raw = snapshot.annotation(MAIN_CONTAINERS_LABEL);
    let sidecar_raw = snapshot.annotation(SIDECAR_CONTAINERS_LABEL);
    if main_raw.is_none() && sidecar_raw.is_none() {
        return None;
    }

    let main = NameSet::from_csv(main_raw.unwrap_or(""));
    let sidecars = NameSet::from_csv(sidecar_raw.unwrap_or(""));
    let sets = ContainerSets::from_snapshot(snapshot);

    if !sets.observation_complete() {
        debug!(
            key = %snapshot.key,
            all = %sets.all,
            running = %sets.running,
            completed = %sets.completed,
            "observation incomplete, deferring decision"
        );
        return None;
    }

    // 규칙 A: 메인이 선언되어 있고 전부 완료되었으며 잔존 컨테이너가 있음.
    // 빈 메인 선언은 규칙을 발동시키지 않음 (공집합은 자명하게 완료됨).
    if !main.is_empty() && sets.completed.contains_all(&main) && !sets.running.is_empty() {
        debug!(key = %snapshot.key, main = %main, running = %sets.running, "rule A: main processes finished");
        return Some(shutdown_running(snapshot, &sets.running));
    }

    // 규칙 B: 실행 중인 컨테이너가 정확히 선언된 사이드카들뿐임.
    if !sets.running.is_empty() && sets.running == sidecars {
        debug!(key = %snapshot.key, sidecars = %sidecars, "rule B: only sidecars remain");
        return Some(shutdown_running(snapshot, &sets.running));
    }

    None
}

fn shutdown_running(snapshot: &WorkloadSnapshot, running: &NameSet) -> ShutdownCommand {
    ShutdownCommand {
        key: snapshot.key.clone(),
        targets: snapshot
            .containers
            .iter()
            .filter(|c| running.contains(&c.name))
            .cloned()
            .collect(),
    }
}
