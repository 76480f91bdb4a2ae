//! 状态条件模型
//!
//! Operator 对外报告的条件集合：每种类型至多一条，每个同步周期整体覆盖。

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 工作负载可用
pub const CONDITION_AVAILABLE: &str = "Available";
/// 工作负载仍在推进
pub const CONDITION_PROGRESSING: &str = "Progressing";
/// 本周期内有子步骤失败
pub const CONDITION_DEGRADED: &str = "WorkloadDegraded";

/// 条件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// 单条 Operator 条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    /// 条件类型
    #[serde(rename = "type")]
    pub type_: String,
    /// 条件状态
    pub status: ConditionStatus,
    /// 机器可读的原因
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// 人类可读的消息
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// 上次状态翻转的时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl OperatorCondition {
    /// 创建不带原因的条件
    pub fn new(type_: &str, status: ConditionStatus) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: String::new(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    /// 附加原因与消息
    pub fn with_reason(mut self, reason: &str, message: impl Into<String>) -> Self {
        self.reason = reason.to_string();
        self.message = message.into();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// 写入或覆盖一条条件
///
/// 状态未翻转时保留原有的 `last_transition_time`，这样重复运行已收敛的周期
/// 不会产生新的状态差异。
pub fn set_condition(conditions: &mut Vec<OperatorCondition>, mut condition: OperatorCondition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.or_else(|| Some(Utc::now()))
            } else {
                Some(Utc::now())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(Utc::now());
            conditions.push(condition);
        }
    }
}

/// 按类型查找条件
pub fn find_condition<'a>(conditions: &'a [OperatorCondition], type_: &str) -> Option<&'a OperatorCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, OperatorCondition::new(CONDITION_AVAILABLE, ConditionStatus::False));
        set_condition(&mut conditions, OperatorCondition::new(CONDITION_AVAILABLE, ConditionStatus::True));

        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].is_true());
    }

    #[test]
    fn test_transition_time_kept_without_flip() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            OperatorCondition::new(CONDITION_DEGRADED, ConditionStatus::True).with_reason("SyncError", "a"),
        );
        let first = conditions[0].last_transition_time;

        set_condition(
            &mut conditions,
            OperatorCondition::new(CONDITION_DEGRADED, ConditionStatus::True).with_reason("SyncError", "b"),
        );

        assert_eq!(conditions[0].last_transition_time, first);
        assert_eq!(conditions[0].message, "b");
    }

    #[test]
    fn test_condition_serializes_type_field() {
        let cond = OperatorCondition::new(CONDITION_PROGRESSING, ConditionStatus::False);
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Progressing");
        assert_eq!(json["status"], "False");
        assert!(json.get("reason").is_none());
    }
}
