//! 错误处理模块
//!
//! 该模块提供 Svcat Operator 的统一错误类型。同步周期中的每个子步骤都返回
//! 这里定义的错误，由状态汇总步骤统一转换为 Degraded 条件中的一行消息。

use thiserror::Error;

/// Svcat 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 单个静态资源应用失败，不影响其他资源
    #[error("apply failed: {0}")]
    Apply(String),

    /// 被哈希的依赖对象不存在
    #[error("unable to resolve {kind} {namespace}/{name}: not found")]
    Resolution {
        kind: String,
        namespace: String,
        name: String,
    },

    /// 配置层不是合法的结构化数据
    #[error("unable to merge config: {0}")]
    Merge(String),

    /// 工作负载模板加载或应用失败
    #[error("rollout failed: {0}")]
    Rollout(String),

    /// 状态写入与其他写入者冲突
    #[error("status update conflict on {0}")]
    PersistenceConflict(String),

    /// 同步周期被取消或超时
    #[error("sync cycle cancelled before completion")]
    Cancelled,

    /// Operator 配置错误
    #[error("invalid operator settings: {0}")]
    Config(String),

    /// 来自 kube-rs 的错误
    #[error("kubernetes reported error: {0}")]
    Kube(#[from] kube::Error),

    /// YAML 错误
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON 错误
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Svcat 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 是否为依赖解析错误
    pub fn is_resolution(&self) -> bool {
        matches!(self, Error::Resolution { .. })
    }

    /// 是否为写入冲突
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::PersistenceConflict(_))
    }
}
