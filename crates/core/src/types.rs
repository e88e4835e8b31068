//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 추적 대상 워크로드 유닛과 컨테이너 상태를 표현하는 데이터 구조를 정의합니다.
//! 스냅샷은 reconcile 주기마다 새로 만들어지며 읽은 뒤에는 변경되지 않습니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// 워크로드 유닛을 식별하는 컨테이너 라벨
///
/// 같은 라벨 값을 가진 컨테이너들이 하나의 유닛을 구성합니다.
/// 값 형식은 `namespace/name` 또는 `name` (네임스페이스 생략 시 `default`)입니다.
pub const UNIT_LABEL: &str = "io.sidewinder.unit";

/// 메인 프로세스 컨테이너 목록 라벨 (쉼표 구분)
pub const MAIN_CONTAINERS_LABEL: &str = "io.sidewinder.main";

/// 사이드카 컨테이너 목록 라벨 (쉼표 구분)
pub const SIDECAR_CONTAINERS_LABEL: &str = "io.sidewinder.sidecars";

/// 라벨 값에 네임스페이스가 없을 때 사용하는 기본 네임스페이스
pub const DEFAULT_NAMESPACE: &str = "default";

/// 워크로드 유닛 키
///
/// 유닛의 수명 동안 변하지 않는 고유 식별자입니다.
/// 워크 큐의 유일한 페이로드 타입으로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadKey {
    /// 네임스페이스
    pub namespace: String,
    /// 유닛 이름
    pub name: String,
}

impl WorkloadKey {
    /// 네임스페이스와 이름으로 키를 생성합니다.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// 라벨 값에서 키를 파싱합니다.
    ///
    /// `"ns/name"` 형식이면 그대로, `"name"` 형식이면 네임스페이스에
    /// [`DEFAULT_NAMESPACE`]가 적용됩니다. 빈 문자열이거나 이름 부분이
    /// 비어 있으면 `None`을 반환합니다.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('/') {
            Some((ns, name)) => {
                if ns.is_empty() || name.is_empty() {
                    None
                } else {
                    Some(Self::new(ns, name))
                }
            }
            None => Some(Self::new(DEFAULT_NAMESPACE, raw)),
        }
    }
}

impl fmt::Display for WorkloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// 컨테이너 종료 사유
///
/// 종료 코드와 OOM 여부에서 도출됩니다. 정상 완료와 에러 종료만이
/// "완료됨"으로 분류되며, 강제 종료(OOM 등)는 제외됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    /// 정상 완료 (종료 코드 0)
    Completed,
    /// 에러 종료 (0이 아닌 종료 코드)
    Error,
    /// OOM으로 강제 종료됨
    OomKilled,
    /// 알 수 없는 종료 사유
    Unknown,
}

impl TerminationReason {
    /// 이 종료 사유가 "완료됨" 집합에 포함되는지 여부를 반환합니다.
    ///
    /// 정상 완료와 에러 종료만 완료로 취급합니다. 강제 종료된 컨테이너는
    /// 작업을 마친 것이 아니므로 제외됩니다.
    pub fn counts_as_completed(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::OomKilled => write!(f, "oom_killed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// 개별 컨테이너 상태
///
/// 런타임 inspect 결과에서 도출한 단일 컨테이너의 관측 상태입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// 런타임 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (유닛 내에서 유일)
    pub name: String,
    /// 실행 중 여부
    pub ready: bool,
    /// 종료 상태 (실행 중이면 `None`)
    pub terminated: Option<TerminationReason>,
}

impl ContainerStatus {
    /// 완료된 컨테이너로 분류되는지 여부를 반환합니다.
    pub fn is_completed(&self) -> bool {
        self.terminated
            .is_some_and(TerminationReason::counts_as_completed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.ready {
            "running".to_owned()
        } else {
            match self.terminated {
                Some(reason) => format!("terminated({reason})"),
                None => "waiting".to_owned(),
            }
        };
        write!(
            f,
            "{} ({}) {}",
            self.name,
            &self.id[..12.min(self.id.len())],
            state,
        )
    }
}

/// 워크로드 유닛 스냅샷
///
/// reconcile 시점에 관측한 유닛의 전체 상태입니다. 생성 후 변경되지 않으며,
/// 각 reconcile 주기마다 런타임에서 새로 읽어 만듭니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    /// 유닛 키
    pub key: WorkloadKey,
    /// 유닛이 실행 중인 노드(호스트) 식별자
    pub node: String,
    /// 유닛에 부착된 라벨(어노테이션) 키-값 쌍
    pub annotations: BTreeMap<String, String>,
    /// 컨테이너 상태 목록 (이름 순 정렬)
    pub containers: Vec<ContainerStatus>,
}

impl WorkloadSnapshot {
    /// 어노테이션 값을 조회합니다.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// 추적 대상 유닛인지 여부를 반환합니다.
    ///
    /// 메인 또는 사이드카 어노테이션 중 하나라도 있으면 추적 대상입니다.
    pub fn is_tracked(&self) -> bool {
        self.annotations.contains_key(MAIN_CONTAINERS_LABEL)
            || self.annotations.contains_key(SIDECAR_CONTAINERS_LABEL)
    }
}

impl fmt::Display for WorkloadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node={} containers={}",
            self.key,
            self.node,
            self.containers.len(),
        )
    }
}

/// 컨테이너 이름 집합
///
/// 합집합, 포함, 동등 비교만 지원하는 최소 집합 추상화입니다.
/// `BTreeSet` 기반이라 순회와 로그 출력 순서가 결정적입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSet(BTreeSet<String>);

impl NameSet {
    /// 빈 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 쉼표로 구분된 어노테이션 값에서 집합을 만듭니다.
    ///
    /// 항목 앞뒤 공백은 제거하고, 빈 항목은 버립니다. 따라서 빈 문자열은
    /// 빈 집합이 되며 실제 컨테이너 이름으로 취급되지 않습니다.
    pub fn from_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// 이름 목록에서 집합을 만듭니다.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// 이름을 추가합니다.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    /// 집합이 비어 있는지 여부를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 원소 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 특정 이름을 포함하는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// `other`의 모든 원소를 포함하는지 확인합니다 (상위집합 검사).
    pub fn contains_all(&self, other: &NameSet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// 두 집합의 합집합을 반환합니다.
    pub fn union(&self, other: &NameSet) -> NameSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// 이름을 정렬 순서대로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for NameSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<String> for NameSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parse_with_namespace() {
        let key = WorkloadKey::parse("batch/etl-job").unwrap();
        assert_eq!(key.namespace, "batch");
        assert_eq!(key.name, "etl-job");
    }

    #[test]
    fn key_parse_bare_name_gets_default_namespace() {
        let key = WorkloadKey::parse("etl-job").unwrap();
        assert_eq!(key.namespace, DEFAULT_NAMESPACE);
        assert_eq!(key.name, "etl-job");
    }

    #[test]
    fn key_parse_rejects_empty_parts() {
        assert!(WorkloadKey::parse("").is_none());
        assert!(WorkloadKey::parse("   ").is_none());
        assert!(WorkloadKey::parse("/name").is_none());
        assert!(WorkloadKey::parse("ns/").is_none());
    }

    #[test]
    fn key_display_roundtrip() {
        let key = WorkloadKey::new("batch", "etl-job");
        assert_eq!(key.to_string(), "batch/etl-job");
        assert_eq!(WorkloadKey::parse(&key.to_string()).unwrap(), key);
    }

    #[test]
    fn key_is_hashable_and_ordered() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(WorkloadKey::new("a", "b"));
        set.insert(WorkloadKey::new("a", "b"));
        assert_eq!(set.len(), 1);
        assert!(WorkloadKey::new("a", "b") < WorkloadKey::new("b", "a"));
    }

    #[test]
    fn termination_reason_completed_classification() {
        assert!(TerminationReason::Completed.counts_as_completed());
        assert!(TerminationReason::Error.counts_as_completed());
        assert!(!TerminationReason::OomKilled.counts_as_completed());
        assert!(!TerminationReason::Unknown.counts_as_completed());
    }

    #[test]
    fn termination_reason_display() {
        assert_eq!(TerminationReason::Completed.to_string(), "completed");
        assert_eq!(TerminationReason::OomKilled.to_string(), "oom_killed");
    }

    #[test]
    fn container_status_is_completed() {
        let running = ContainerStatus {
            id: "abc123def456".to_owned(),
            name: "app".to_owned(),
            ready: true,
            terminated: None,
        };
        assert!(!running.is_completed());

        let done = ContainerStatus {
            terminated: Some(TerminationReason::Completed),
            ready: false,
            ..running.clone()
        };
        assert!(done.is_completed());

        let oom = ContainerStatus {
            terminated: Some(TerminationReason::OomKilled),
            ready: false,
            ..running
        };
        assert!(!oom.is_completed());
    }

    #[test]
    fn container_status_display_states() {
        let status = ContainerStatus {
            id: "abc123def456789".to_owned(),
            name: "envoy".to_owned(),
            ready: true,
            terminated: None,
        };
        assert!(status.to_string().contains("running"));

        let terminated = ContainerStatus {
            ready: false,
            terminated: Some(TerminationReason::Error),
            ..status.clone()
        };
        assert!(terminated.to_string().contains("terminated(error)"));

        let waiting = ContainerStatus {
            ready: false,
            terminated: None,
            ..status
        };
        assert!(waiting.to_string().contains("waiting"));
    }

    fn sample_snapshot(annotations: &[(&str, &str)]) -> WorkloadSnapshot {
        WorkloadSnapshot {
            key: WorkloadKey::new("default", "job-1"),
            node: "node-a".to_owned(),
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            containers: Vec::new(),
        }
    }

    #[test]
    fn snapshot_is_tracked_with_either_annotation() {
        assert!(sample_snapshot(&[(MAIN_CONTAINERS_LABEL, "app")]).is_tracked());
        assert!(sample_snapshot(&[(SIDECAR_CONTAINERS_LABEL, "envoy")]).is_tracked());
        assert!(
            sample_snapshot(&[(MAIN_CONTAINERS_LABEL, "app"), (SIDECAR_CONTAINERS_LABEL, "e")])
                .is_tracked()
        );
        assert!(!sample_snapshot(&[("unrelated", "x")]).is_tracked());
    }

    #[test]
    fn snapshot_annotation_lookup() {
        let snap = sample_snapshot(&[(MAIN_CONTAINERS_LABEL, "app,worker")]);
        assert_eq!(snap.annotation(MAIN_CONTAINERS_LABEL), Some("app,worker"));
        assert_eq!(snap.annotation(SIDECAR_CONTAINERS_LABEL), None);
    }

    #[test]
    fn nameset_from_csv() {
        let set = NameSet::from_csv("app, worker ,envoy");
        assert_eq!(set.len(), 3);
        assert!(set.contains("app"));
        assert!(set.contains("worker"));
        assert!(set.contains("envoy"));
    }

    #[test]
    fn nameset_from_csv_drops_empty_entries() {
        // 빈 어노테이션 값은 빈 집합이 되어야 함 (빈 이름은 컨테이너가 아님)
        assert!(NameSet::from_csv("").is_empty());
        assert!(NameSet::from_csv("  ").is_empty());
        assert!(NameSet::from_csv(",,").is_empty());
        let set = NameSet::from_csv("app,,envoy,");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn nameset_dedupes() {
        let set = NameSet::from_csv("app,app,app");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn nameset_union() {
        let a = NameSet::from_csv("app,worker");
        let b = NameSet::from_csv("worker,envoy");
        let u = a.union(&b);
        assert_eq!(u.len(), 3);
        assert_eq!(u, NameSet::from_csv("app,worker,envoy"));
    }

    #[test]
    fn nameset_contains_all() {
        let big = NameSet::from_csv("app,worker,envoy");
        let small = NameSet::from_csv("app,envoy");
        assert!(big.contains_all(&small));
        assert!(!small.contains_all(&big));
        // 빈 집합은 모든 집합의 부분집합
        assert!(small.contains_all(&NameSet::new()));
    }

    #[test]
    fn nameset_equality_ignores_input_order() {
        assert_eq!(NameSet::from_csv("b,a,c"), NameSet::from_csv("c,b,a"));
    }

    #[test]
    fn nameset_display_is_deterministic() {
        let set = NameSet::from_csv("envoy,app,worker");
        assert_eq!(set.to_string(), "{app,envoy,worker}");
        assert_eq!(NameSet::new().to_string(), "{}");
    }

    #[test]
    fn nameset_iter_is_sorted() {
        let set = NameSet::from_csv("c,a,b");
        let names: Vec<&str> = set.iter().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
