//! 自定义资源定义模块
//!
//! 该模块定义了期望状态对象 ServiceCatalogControllerManager。管理员编辑其 spec，
//! Operator 只读取 spec，并且只在 status 发生变化时写回 status。

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use svcat_common::{GenerationStatus, LogLevel, ManagementState, OperatorCondition};

/// 期望状态对象规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "operator.svcat.io",
    version = "v1",
    kind = "ServiceCatalogControllerManager",
    plural = "servicecatalogcontrollermanagers",
    derive = "PartialEq"
)]
#[kube(status = "ServiceCatalogControllerManagerStatus")]
#[kube(printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".spec.managementState"}"#)]
#[kube(printcolumn = r#"{"name":"Observed", "type":"integer", "jsonPath":".status.observedGeneration"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCatalogControllerManagerSpec {
    /// 管理状态：Managed、Unmanaged 或 Removed
    #[serde(default)]
    pub management_state: ManagementState,

    /// 工作负载日志级别档位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// 管理员提供的不受支持的配置覆盖
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_config_overrides: Option<serde_json::Value>,

    /// 上一轮观察到的配置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_config: Option<serde_json::Value>,
}

/// 期望状态对象的状态
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCatalogControllerManagerStatus {
    /// 最近一次完整处理的 spec 代数
    #[serde(default)]
    pub observed_generation: i64,

    /// 条件集合
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,

    /// 受管工作负载的代数账本
    #[serde(default)]
    pub generations: Vec<GenerationStatus>,
}

impl ServiceCatalogControllerManager {
    /// spec 代数，未设置时视为 0
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// 上次观察到的代数
    pub fn observed_generation(&self) -> i64 {
        self.status.as_ref().map_or(0, |s| s.observed_generation)
    }
}
