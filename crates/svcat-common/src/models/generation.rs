//! 代数账本
//!
//! 记录每个受管工作负载上次观察到的 `metadata.generation`。条目只会新增或更新，
//! 不会被删除。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 单个受管对象的代数记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    /// API 组，如 `apps`
    pub group: String,
    /// 资源复数名，如 `daemonsets`
    pub resource: String,
    pub namespace: String,
    pub name: String,
    /// 上次观察到的代数
    pub last_generation: i64,
}

/// 对象身份（组、资源、命名空间、名称）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIdentity<'a> {
    pub group: &'a str,
    pub resource: &'a str,
    pub namespace: &'a str,
    pub name: &'a str,
}

impl GenerationStatus {
    fn matches(&self, id: &ObjectIdentity<'_>) -> bool {
        self.group == id.group
            && self.resource == id.resource
            && self.namespace == id.namespace
            && self.name == id.name
    }
}

/// 查询账本中记录的代数
pub fn expected_generation(ledger: &[GenerationStatus], id: &ObjectIdentity<'_>) -> Option<i64> {
    ledger.iter().find(|g| g.matches(id)).map(|g| g.last_generation)
}

/// 更新或追加一条账本记录
pub fn set_generation(ledger: &mut Vec<GenerationStatus>, id: &ObjectIdentity<'_>, generation: i64) {
    if let Some(existing) = ledger.iter_mut().find(|g| g.matches(id)) {
        existing.last_generation = generation;
        return;
    }

    ledger.push(GenerationStatus {
        group: id.group.to_string(),
        resource: id.resource.to_string(),
        namespace: id.namespace.to_string(),
        name: id.name.to_string(),
        last_generation: generation,
    });
}
