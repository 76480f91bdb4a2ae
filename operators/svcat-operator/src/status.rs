//! 状态汇总
//!
//! 先更新 observedGeneration 与代数账本，再按 Available、Progressing、Degraded
//! 的固定顺序计算条件。每一步都是（上一轮状态，本周期事实）的纯函数。

use k8s_openapi::api::apps::v1::DaemonSet;
use svcat_common::{
    set_condition, set_generation, ConditionStatus, Error, ObjectIdentity, OperatorCondition, CONDITION_AVAILABLE,
    CONDITION_DEGRADED, CONDITION_PROGRESSING,
};

use crate::crd::ServiceCatalogControllerManagerStatus;

pub const REASON_NO_INSTANCES: &str = "NoInstancesAvailable";
pub const REASON_NOT_ACHIEVED: &str = "DesiredStateNotYetAchieved";
pub const REASON_SYNC_ERROR: &str = "SyncError";
pub const REASON_REMOVED: &str = "Removed";

const NO_INSTANCES_MESSAGE: &str = "no daemon pods available on any node.";

/// 某个子步骤在本周期产生的错误
#[derive(Debug)]
pub struct StepError {
    label: String,
    pub error: Error,
}

impl StepError {
    /// 以步骤标识作为前缀，如 `"configmap"`
    pub fn step(id: &str, error: Error) -> Self {
        Self {
            label: format!("{:?}", id),
            error,
        }
    }

    /// 以清单标识与资源类型作为前缀
    pub fn manifest(file: &str, kind: &str, error: Error) -> Self {
        Self {
            label: format!("{:?} ({})", file, kind),
            error,
        }
    }

    pub fn line(&self) -> String {
        format!("{}: {}", self.label, self.error)
    }
}

/// 本周期收集到的事实
#[derive(Debug)]
pub struct CycleFacts<'a> {
    /// 期望状态对象的名称
    pub record_name: &'a str,
    /// 期望状态对象的 spec 代数
    pub generation: i64,
    /// 应用后的工作负载，发布失败时为 None
    pub workload: Option<&'a DaemonSet>,
    pub errors: &'a [StepError],
}

fn workload_identity(ds: &DaemonSet) -> ObjectIdentity<'_> {
    ObjectIdentity {
        group: "apps",
        resource: "daemonsets",
        namespace: ds.metadata.namespace.as_deref().unwrap_or_default(),
        name: ds.metadata.name.as_deref().unwrap_or_default(),
    }
}

fn available(workload: Option<&DaemonSet>) -> OperatorCondition {
    let ready = workload
        .and_then(|ds| ds.status.as_ref())
        .and_then(|s| s.number_available)
        .unwrap_or_default();

    if ready > 0 {
        OperatorCondition::new(CONDITION_AVAILABLE, ConditionStatus::True)
    } else {
        OperatorCondition::new(CONDITION_AVAILABLE, ConditionStatus::False)
            .with_reason(REASON_NO_INSTANCES, NO_INSTANCES_MESSAGE)
    }
}

fn progressing(status: &ServiceCatalogControllerManagerStatus, facts: &CycleFacts<'_>) -> OperatorCondition {
    let mut lines = Vec::new();

    if let Some(ds) = facts.workload {
        let desired = ds.metadata.generation.unwrap_or_default();
        let observed = ds.status.as_ref().and_then(|s| s.observed_generation).unwrap_or_default();
        if observed != desired {
            lines.push(format!(
                "daemonset/{}: observed generation is {}, desired generation is {}.",
                ds.metadata.name.as_deref().unwrap_or_default(),
                observed,
                desired
            ));
        }
    }

    if status.observed_generation != facts.generation {
        lines.push(format!(
            "servicecatalogcontrollermanagers/{}: observed generation is {}, desired generation is {}.",
            facts.record_name, status.observed_generation, facts.generation
        ));
    }

    if lines.is_empty() {
        OperatorCondition::new(CONDITION_PROGRESSING, ConditionStatus::False)
    } else {
        OperatorCondition::new(CONDITION_PROGRESSING, ConditionStatus::True)
            .with_reason(REASON_NOT_ACHIEVED, lines.join("\n"))
    }
}

fn degraded(errors: &[StepError]) -> OperatorCondition {
    if errors.is_empty() {
        return OperatorCondition::new(CONDITION_DEGRADED, ConditionStatus::False);
    }

    let message = errors.iter().map(StepError::line).collect::<Vec<_>>().join("\n");
    OperatorCondition::new(CONDITION_DEGRADED, ConditionStatus::True).with_reason(REASON_SYNC_ERROR, message)
}

/// 根据上一轮状态与本周期事实计算新状态
pub fn aggregate(
    prior: &ServiceCatalogControllerManagerStatus,
    facts: &CycleFacts<'_>,
) -> ServiceCatalogControllerManagerStatus {
    let mut status = prior.clone();

    status.observed_generation = facts.generation;
    if let Some(ds) = facts.workload {
        if let Some(generation) = ds.metadata.generation {
            set_generation(&mut status.generations, &workload_identity(ds), generation);
        }
    }

    let available = available(facts.workload);
    set_condition(&mut status.conditions, available);
    let progressing = progressing(&status, facts);
    set_condition(&mut status.conditions, progressing);
    set_condition(&mut status.conditions, degraded(facts.errors));

    status
}

/// 工作负载被移除后的状态
pub fn removed(
    prior: &ServiceCatalogControllerManagerStatus,
    generation: i64,
    errors: &[StepError],
) -> ServiceCatalogControllerManagerStatus {
    let mut status = prior.clone();
    status.observed_generation = generation;

    set_condition(
        &mut status.conditions,
        OperatorCondition::new(CONDITION_AVAILABLE, ConditionStatus::False)
            .with_reason(REASON_REMOVED, "the operand has been removed"),
    );
    set_condition(
        &mut status.conditions,
        OperatorCondition::new(CONDITION_PROGRESSING, ConditionStatus::False),
    );
    set_condition(&mut status.conditions, degraded(errors));

    status
}
